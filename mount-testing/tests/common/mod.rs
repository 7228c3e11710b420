#![allow(dead_code)]

use std::sync::Arc;

use mount_testing::FakeBus;
use mount_udisks::{
    BackendAdapter, DeviceEvent, DeviceEventStream, LegacyAdapter, ManagerConfig, ModernAdapter,
    MountManager,
};

pub fn modern(bus: &FakeBus, config: ManagerConfig) -> Box<dyn BackendAdapter> {
    Box::new(ModernAdapter::new(Arc::new(bus.clone()), config))
}

pub fn legacy(bus: &FakeBus, config: ManagerConfig) -> Box<dyn BackendAdapter> {
    Box::new(LegacyAdapter::new(Arc::new(bus.clone()), config))
}

pub async fn modern_manager(bus: &FakeBus) -> MountManager {
    MountManager::with_candidates(vec![modern(bus, ManagerConfig::default())]).await
}

pub async fn legacy_manager(bus: &FakeBus) -> MountManager {
    MountManager::with_candidates(vec![legacy(bus, ManagerConfig::default())]).await
}

pub fn paths(manager: &MountManager) -> Vec<String> {
    manager
        .devices()
        .iter()
        .map(|d| d.path().to_string())
        .collect()
}

/// Every event queued so far.
pub fn drain(stream: &mut DeviceEventStream) -> Vec<DeviceEvent> {
    std::iter::from_fn(|| stream.try_next()).collect()
}

/// Compact `kind path` rendering for assertions.
pub fn describe(events: &[DeviceEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| {
            let kind = match event {
                DeviceEvent::Added(_) => "added",
                DeviceEvent::Removed(_) => "removed",
                DeviceEvent::Changed(_) => "changed",
                DeviceEvent::Mounted(_) => "mounted",
                DeviceEvent::Unmounted(_) => "unmounted",
                DeviceEvent::Error { .. } => "error",
            };
            format!("{kind} {}", event.device().path())
        })
        .collect()
}

/// Deliver `signal` and let the manager reconcile it.
pub async fn deliver(bus: &FakeBus, manager: &mut MountManager, signal: mount_udisks::BusSignal) {
    bus.emit(signal).await;
    assert!(manager.process_next().await);
}
