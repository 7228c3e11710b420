//! Error types for mount-udisks operations

use thiserror::Error;

use crate::bus::{BusError, Verb};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MountError {
    #[error("No usable device service backend")]
    BackendUnavailable,

    #[error("Device already tracked: {0}")]
    DuplicateDevice(String),

    #[error("Device not found: {0}")]
    UnknownDevice(String),

    #[error("Device is not valid: {0}")]
    InvalidDevice(String),

    #[error("Failed to {verb} {path}: {message}")]
    CommandFailed {
        path: String,
        verb: Verb,
        message: String,
    },

    #[error(transparent)]
    Bus(#[from] BusError),
}
