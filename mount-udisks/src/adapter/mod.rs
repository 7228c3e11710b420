// SPDX-License-Identifier: GPL-3.0-only

//! Backend adapters
//!
//! An adapter owns the subscription to one device service protocol and turns
//! its notifications into registry changes and device events:
//! - `ModernAdapter` for UDisks2
//! - `LegacyAdapter` for UDisks 1.x
//!
//! Both route membership changes through the same `Reconciler`, so the
//! add/remove/change rules are identical whatever the protocol.

pub mod legacy;
pub mod modern;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use mount_types::BackendKind;
use tracing::{debug, info, warn};

use crate::bus::{BusError, BusSignal, BusSignalStream, Verb};
use crate::device::{Device, DeviceAttributes, DeviceCommands};
use crate::error::MountError;
use crate::events::{DeviceEvent, EventBus};
use crate::registry::DeviceRegistry;

pub use legacy::LegacyAdapter;
pub use modern::ModernAdapter;

#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether the service answers. A failed adapter must be dropped.
    async fn probe(&self) -> bool;

    /// Subscribe to the service's notifications.
    async fn watch(&self) -> Result<BusSignalStream, MountError>;

    /// Full resync: add what the service reports and is not tracked yet,
    /// remove what is tracked and no longer reported.
    async fn update(&mut self);

    /// Reconcile one notification.
    async fn handle(&mut self, signal: BusSignal);

    fn devices(&self) -> Vec<Device>;

    fn device(&self, path: &str) -> Option<Device>;

    fn events(&self) -> &EventBus;
}

/// Registry plus event emission shared by both adapters.
pub(crate) struct Reconciler {
    registry: DeviceRegistry,
    events: EventBus,
}

impl Reconciler {
    pub(crate) fn new(events: EventBus) -> Self {
        Self {
            registry: DeviceRegistry::new(),
            events,
        }
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    pub(crate) fn is_tracked(&self, path: &str) -> bool {
        self.registry.contains(path)
    }

    pub(crate) fn get(&self, path: &str) -> Option<Device> {
        self.registry.get(path).cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<Device> {
        self.registry.snapshot()
    }

    /// Tracked paths missing from a fresh enumeration.
    pub(crate) fn stale_paths(&self, reported: &[String]) -> Vec<String> {
        let reported: HashSet<&str> = reported.iter().map(String::as_str).collect();
        self.registry
            .paths()
            .iter()
            .filter(|p| !reported.contains(p.as_str()))
            .cloned()
            .collect()
    }

    /// Build a fresh record for `path`, mark it valid and register it.
    pub(crate) fn insert(
        &mut self,
        path: &str,
        attrs: DeviceAttributes,
        commands: Arc<dyn DeviceCommands>,
    ) -> Option<Device> {
        let device = Device::new(path, commands);
        device.update(|record| {
            record.apply(attrs);
            record.set_valid(true);
        });

        match self.registry.add(device.clone()) {
            Ok(()) => {
                info!("Device added: {}", device);
                self.events.emit(DeviceEvent::Added(device.clone()));
                Some(device)
            }
            Err(e) => {
                debug!("Ignoring add notification: {e}");
                None
            }
        }
    }

    /// Drop `path` from the registry and retire its record.
    pub(crate) fn remove(&mut self, path: &str) -> Option<Device> {
        match self.registry.remove(path) {
            Ok(device) => {
                device.update(|record| record.set_valid(false));
                info!("Device removed: {}", path);
                self.events.emit(DeviceEvent::Removed(device.clone()));
                Some(device)
            }
            Err(e) => {
                debug!("Ignoring remove notification: {e}");
                None
            }
        }
    }

    /// Re-apply attributes to a tracked device. Emits one `Changed` when
    /// anything differs, followed by `Mounted`/`Unmounted` on a mount flip.
    pub(crate) fn refresh(&self, device: &Device, attrs: DeviceAttributes) -> bool {
        let (changed, was_mounted, mounted) = device.update(|record| {
            let was_mounted = record.is_mounted();
            let changed = record.apply(attrs);
            (changed, was_mounted, record.is_mounted())
        });

        if !changed {
            debug!("Device unchanged: {}", device.path());
            return false;
        }

        self.events.emit(DeviceEvent::Changed(device.clone()));
        match (was_mounted, mounted) {
            (false, true) => self.events.emit(DeviceEvent::Mounted(device.clone())),
            (true, false) => self.events.emit(DeviceEvent::Unmounted(device.clone())),
            _ => {}
        }
        true
    }
}

/// Report a rejected command: error event for observers, error value for the caller.
pub(crate) fn command_failed(
    events: &EventBus,
    device: &Device,
    verb: Verb,
    error: BusError,
) -> MountError {
    let message = error.to_string();
    warn!("Failed to {verb} {}: {message}", device.path());

    events.emit(DeviceEvent::Error {
        device: device.clone(),
        message: message.clone(),
    });

    MountError::CommandFailed {
        path: device.path().to_string(),
        verb,
        message,
    }
}

pub(crate) fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub(crate) fn log_enumeration_failure(kind: BackendKind, error: &BusError) {
    warn!("Could not enumerate {kind} devices: {error}");
}
