// SPDX-License-Identifier: GPL-3.0-only

//! Device registry and state reconciliation over the UDisks device service
//!
//! `MountManager` selects one backend at startup (UDisks2 first, UDisks 1.x as
//! fallback), keeps an authoritative set of tracked devices in sync with the
//! service's notifications, and offers mount/unmount/eject on them.
//!
//! ```no_run
//! # async fn demo() {
//! use futures::StreamExt;
//! use mount_udisks::{ManagerConfig, MountManager};
//!
//! let mut manager = MountManager::system(ManagerConfig::default()).await;
//! for device in manager.devices() {
//!     println!("{device}");
//! }
//!
//! let mut events = manager.subscribe();
//! tokio::spawn(async move {
//!     while let Some(event) = events.next().await {
//!         println!("{event:?}");
//!     }
//! });
//! manager.run().await;
//! # }
//! ```

pub mod adapter;
pub mod bus;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod manager;
pub mod registry;

pub use adapter::{BackendAdapter, LegacyAdapter, ModernAdapter};
pub use bus::{
    BusError, BusSignal, BusSignalStream, CommandOptions, DeviceBus, InterfaceMap, PropertyMap,
    PropertyValue, Verb,
};
pub use config::ManagerConfig;
pub use device::{Device, DeviceCommands, DeviceRecord};
pub use error::MountError;
pub use events::{DeviceEvent, DeviceEventStream, EventBus};
pub use manager::MountManager;
pub use registry::DeviceRegistry;

pub use mount_types::{BackendKind, DeviceInfo, MediaType, size_to_string};
