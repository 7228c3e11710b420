//! Common formatting helpers shared across models

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Convert a byte count to a short human-readable string (e.g. "1.5 GB").
///
/// Picks the largest unit in which the value is at least 1.0 and prints one
/// decimal. Values below one kilobyte are printed as a whole byte count.
pub fn size_to_string(bytes: u64) -> String {
    let size = bytes as f64;

    let n = size / GIB;
    if n >= 1.0 {
        return format!("{n:.1} GB");
    }

    let n = size / MIB;
    if n >= 1.0 {
        return format!("{n:.1} MB");
    }

    let n = size / KIB;
    if n >= 1.0 {
        return format!("{n:.1} kB");
    }

    format!("{bytes} B")
}
