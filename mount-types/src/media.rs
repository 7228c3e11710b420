//! Media classification

use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of storage object a device is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    #[default]
    Unknown,
    /// Whole drive without a partition table on top of it
    Drive,
    Partition,
    FloppyDrive,
    Optical,
}

impl MediaType {
    /// Whether a device of this kind can ever be ejected.
    ///
    /// Unknown media is never ejectable, whatever the backend reports.
    pub fn supports_eject(self) -> bool {
        !matches!(self, MediaType::Unknown)
    }

    /// Icon used when the backend does not provide a presentation hint.
    pub fn fallback_icon(self, external: bool) -> &'static str {
        match self {
            MediaType::Optical => "media-optical",
            MediaType::FloppyDrive => "media-floppy",
            _ if external => "drive-removable-media",
            _ => "drive-harddisk",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaType::Unknown => "unknown",
            MediaType::Drive => "drive",
            MediaType::Partition => "partition",
            MediaType::FloppyDrive => "floppy drive",
            MediaType::Optical => "optical",
        };
        f.write_str(name)
    }
}
