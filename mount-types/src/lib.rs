// SPDX-License-Identifier: GPL-3.0-only

//! Canonical device models for the mount device registry
//!
//! These types are backend independent. Both the UDisks2 and the legacy
//! UDisks adapters in `mount-udisks` describe devices with them, and consumers
//! only ever see these shapes:
//!
//! - `DeviceInfo` → plain snapshot of one tracked device
//! - `MediaType` → classification of the device
//! - `BackendKind` → which device service protocol produced it

pub mod backend;
pub mod common;
pub mod device;
pub mod media;

pub use backend::BackendKind;
pub use common::size_to_string;
pub use device::DeviceInfo;
pub use media::MediaType;
