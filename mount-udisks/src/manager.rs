// SPDX-License-Identifier: GPL-3.0-only

//! Backend selection and the consumer-facing device surface
//!
//! `MountManager` probes its candidate adapters once, in order, and keeps the
//! first one that answers. When none does it stays degraded for its whole
//! lifetime: no devices, no-op resync and commands, and an event stream that
//! never yields.

use std::sync::Arc;

use futures::StreamExt;
use mount_types::BackendKind;
use tracing::{info, warn};

use crate::adapter::{BackendAdapter, LegacyAdapter, ModernAdapter};
use crate::bus::{BusSignal, BusSignalStream, Udisks1Bus, Udisks2Bus};
use crate::config::ManagerConfig;
use crate::device::Device;
use crate::error::MountError;
use crate::events::{DeviceEventStream, EventBus};

pub struct MountManager {
    adapter: Option<Box<dyn BackendAdapter>>,
    signals: Option<BusSignalStream>,
    // Handed out in degraded mode so subscribers get a stream that stays open.
    idle_events: EventBus,
}

impl MountManager {
    /// Connect to the system bus and select a backend in the configured order.
    pub async fn system(config: ManagerConfig) -> Self {
        let connection = match zbus::Connection::system().await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Could not connect to the system bus: {e}");
                return Self::with_candidates(Vec::new()).await;
            }
        };

        let candidates: Vec<Box<dyn BackendAdapter>> = config
            .backends
            .iter()
            .map(|kind| -> Box<dyn BackendAdapter> {
                match kind {
                    BackendKind::Modern => Box::new(ModernAdapter::new(
                        Arc::new(Udisks2Bus::new(connection.clone())),
                        config.clone(),
                    )),
                    BackendKind::Legacy => Box::new(LegacyAdapter::new(
                        Arc::new(Udisks1Bus::new(connection.clone())),
                        config.clone(),
                    )),
                }
            })
            .collect();

        Self::with_candidates(candidates).await
    }

    /// Probe `candidates` in order and keep the first valid one.
    ///
    /// The selected adapter subscribes to notifications before the initial
    /// resync so nothing that happens in between is lost.
    pub async fn with_candidates(candidates: Vec<Box<dyn BackendAdapter>>) -> Self {
        for mut adapter in candidates {
            let kind = adapter.kind();
            if !adapter.probe().await {
                info!("Discarding {kind} backend");
                continue;
            }

            let signals = match adapter.watch().await {
                Ok(signals) => signals,
                Err(e) => {
                    warn!("Could not subscribe to {kind} notifications: {e}");
                    continue;
                }
            };

            info!("Using {kind} backend");
            adapter.update().await;

            return Self {
                adapter: Some(adapter),
                signals: Some(signals),
                idle_events: EventBus::new(),
            };
        }

        warn!("{}, running without devices", MountError::BackendUnavailable);
        Self {
            adapter: None,
            signals: None,
            idle_events: EventBus::new(),
        }
    }

    /// Protocol of the selected backend, `None` when degraded.
    pub fn backend(&self) -> Option<BackendKind> {
        self.adapter.as_ref().map(|a| a.kind())
    }

    pub fn is_degraded(&self) -> bool {
        self.adapter.is_none()
    }

    /// Tracked devices in registration order.
    pub fn devices(&self) -> Vec<Device> {
        self.adapter
            .as_ref()
            .map(|a| a.devices())
            .unwrap_or_default()
    }

    pub fn device(&self, path: &str) -> Option<Device> {
        self.adapter.as_ref().and_then(|a| a.device(path))
    }

    /// Stream of every device event emitted from now on.
    pub fn subscribe(&self) -> DeviceEventStream {
        match &self.adapter {
            Some(adapter) => adapter.events().subscribe(),
            None => self.idle_events.subscribe(),
        }
    }

    /// Full resync with the backend.
    pub async fn update(&mut self) {
        match self.adapter.as_mut() {
            Some(adapter) => adapter.update().await,
            None => warn!("No backend available, nothing to update"),
        }
    }

    /// Reconcile one notification.
    pub async fn dispatch(&mut self, signal: BusSignal) {
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.handle(signal).await;
        }
    }

    /// Wait for the next notification and reconcile it. Returns `false` once
    /// the notification stream has ended or when degraded.
    pub async fn process_next(&mut self) -> bool {
        let Some(signals) = self.signals.as_mut() else {
            return false;
        };

        match signals.next().await {
            Some(signal) => {
                self.dispatch(signal).await;
                true
            }
            None => {
                warn!("Device notification stream closed");
                self.signals = None;
                false
            }
        }
    }

    /// Process notifications until the stream ends.
    pub async fn run(&mut self) {
        while self.process_next().await {}
    }

    pub async fn mount(&self, device: &Device) -> Result<(), MountError> {
        if self.is_degraded() {
            warn!("No backend available, ignoring mount of {}", device.path());
            return Ok(());
        }
        device.mount().await
    }

    pub async fn unmount(&self, device: &Device) -> Result<(), MountError> {
        if self.is_degraded() {
            warn!("No backend available, ignoring unmount of {}", device.path());
            return Ok(());
        }
        device.unmount().await
    }

    pub async fn eject(&self, device: &Device) -> Result<(), MountError> {
        if self.is_degraded() {
            warn!("No backend available, ignoring eject of {}", device.path());
            return Ok(());
        }
        device.eject().await
    }
}
