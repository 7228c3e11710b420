//! Device view model
//!
//! `DeviceInfo` is a detached copy of one tracked device. The live, shared
//! record lives in `mount-udisks`; this is what gets logged, serialized or
//! handed to code that must not hold on to the live handle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{MediaType, size_to_string};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceInfo {
    // === Identity ===
    /// Backend object path (e.g. "/org/freedesktop/UDisks2/block_devices/sdb1")
    pub path: String,

    /// Device file (e.g. "/dev/sdb1")
    pub dev_file: String,

    pub label: String,
    pub vendor: String,
    pub model: String,

    /// Filesystem type (e.g. "vfat", "ext4"), empty if none
    pub file_system: String,

    // === State ===
    /// Current mount directory, `None` while unmounted
    pub mount_path: Option<String>,

    /// Freedesktop icon name hint
    pub icon_name: String,

    /// Size in bytes
    pub size: u64,

    pub media_type: MediaType,

    pub is_valid: bool,
    pub is_external: bool,
    pub is_mounted: bool,
    pub is_ejectable: bool,
}

impl DeviceInfo {
    /// Human-readable size (e.g. "14.9 GB")
    pub fn size_string(&self) -> String {
        size_to_string(self.size)
    }

    /// Label if there is one, otherwise the device file.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.dev_file
        } else {
            &self.label
        }
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Type: {} Label: {:?} Mount path: {:?}",
            self.dev_file,
            self.media_type,
            self.label,
            self.mount_path.as_deref().unwrap_or("")
        )
    }
}
