use std::fmt;

use serde::{Deserialize, Serialize};

/// Device service protocol a backend adapter speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// UDisks2 (`org.freedesktop.UDisks2`)
    Modern,
    /// UDisks 1.x (`org.freedesktop.UDisks`)
    Legacy,
}

impl BackendKind {
    /// Probe order used when nothing else is configured.
    pub const DEFAULT_ORDER: [BackendKind; 2] = [BackendKind::Modern, BackendKind::Legacy];
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Modern => f.write_str("udisks2"),
            BackendKind::Legacy => f.write_str("udisks"),
        }
    }
}
