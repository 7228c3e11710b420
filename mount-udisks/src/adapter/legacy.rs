// SPDX-License-Identifier: GPL-3.0-only

//! Legacy UDisks (1.x) adapter
//!
//! Every device object carries one property bag, and notifications carry only
//! the object path, so each add or change triggers a full property query.

use std::sync::Arc;

use async_trait::async_trait;
use mount_types::{BackendKind, MediaType};
use tracing::{debug, info, warn};

use super::{BackendAdapter, Reconciler, command_failed, log_enumeration_failure, non_empty};
use crate::bus::udisks1::DEVICE_IFACE;
use crate::bus::{
    BusError, BusSignal, BusSignalStream, CommandOptions, DeviceBus, PropertyMap, Verb,
};
use crate::config::ManagerConfig;
use crate::device::{Device, DeviceAttributes, DeviceCommands};
use crate::error::MountError;
use crate::events::EventBus;

pub const DEVICE_PREFIX: &str = "/org/freedesktop/UDisks/devices/";

fn is_device_path(path: &str) -> bool {
    path.starts_with(DEVICE_PREFIX)
}

fn media_type(props: &PropertyMap) -> MediaType {
    let media = props.text("DriveMedia").unwrap_or_default();
    let compatibility = props.text_list("DriveMediaCompatibility");

    if props.bool("DeviceIsOpticalDisc") == Some(true)
        || media.starts_with("optical")
        || compatibility.iter().any(|m| m.starts_with("optical"))
    {
        MediaType::Optical
    } else if media.starts_with("floppy") || compatibility.iter().any(|m| m.starts_with("floppy"))
    {
        MediaType::FloppyDrive
    } else if props.bool("DeviceIsPartition") == Some(true) {
        MediaType::Partition
    } else if props.bool("DeviceIsDrive") == Some(true) {
        MediaType::Drive
    } else {
        MediaType::Unknown
    }
}

/// Derive device attributes from the single `org.freedesktop.UDisks.Device` bag.
pub(crate) fn derive_attributes(props: &PropertyMap) -> DeviceAttributes {
    let media_type = media_type(props);
    let external = props.bool("DeviceIsRemovable") == Some(true)
        || props.bool("DeviceIsSystemInternal") == Some(false);

    let mount_path = if props.bool("DeviceIsMounted") == Some(false) {
        None
    } else {
        props.text_list("DeviceMountPaths").into_iter().next()
    };

    let mut attrs = DeviceAttributes {
        dev_file: props.text("DeviceFile").unwrap_or_default(),
        label: String::new(),
        vendor: props.text("DriveVendor").unwrap_or_default(),
        model: props.text("DriveModel").unwrap_or_default(),
        file_system: props.text("IdType").unwrap_or_default(),
        mount_path,
        icon_name: String::new(),
        size: props.u64("DeviceSize").unwrap_or(0),
        media_type,
        external,
        ejectable: props.bool("DriveIsMediaEjectable").unwrap_or(false),
    };

    attrs.label = non_empty(props.text("IdLabel"))
        .or_else(|| non_empty(props.text("DevicePresentationName")))
        .unwrap_or_else(|| attrs.fallback_label());
    attrs.icon_name = non_empty(props.text("DevicePresentationIconName"))
        .unwrap_or_else(|| media_type.fallback_icon(external).to_string());

    attrs
}

/// UDisks 1.x implementation of the device commands.
pub struct LegacyCommands {
    bus: Arc<dyn DeviceBus>,
    config: ManagerConfig,
    events: EventBus,
}

impl LegacyCommands {
    /// Partitions are ejected through the drive they belong to.
    async fn eject_target(&self, path: &str) -> Result<String, BusError> {
        let props = self.bus.properties(path, DEVICE_IFACE).await?;
        if props.bool("DeviceIsPartition") == Some(true) {
            props.object_path("PartitionSlave").ok_or_else(|| {
                BusError::OperationFailed(format!("{path} has no parent drive to eject"))
            })
        } else {
            Ok(path.to_string())
        }
    }
}

#[async_trait]
impl DeviceCommands for LegacyCommands {
    async fn mount(&self, device: &Device) -> Result<(), MountError> {
        let mount_path = self
            .bus
            .command(device.path(), Verb::Mount, &self.config.mount_options())
            .await
            .map_err(|e| command_failed(&self.events, device, Verb::Mount, e))?;

        if let Some(mount_path) = mount_path {
            info!("Mounted {} at {}", device.path(), mount_path);
        }
        Ok(())
    }

    async fn unmount(&self, device: &Device) -> Result<(), MountError> {
        self.bus
            .command(device.path(), Verb::Unmount, &self.config.unmount_options())
            .await
            .map_err(|e| command_failed(&self.events, device, Verb::Unmount, e))?;
        Ok(())
    }

    async fn eject(&self, device: &Device) -> Result<(), MountError> {
        let fail = |e: BusError| command_failed(&self.events, device, Verb::Eject, e);

        let target = self.eject_target(device.path()).await.map_err(fail)?;

        if self.config.unmount_before_eject && device.is_mounted() {
            self.bus
                .command(device.path(), Verb::Unmount, &self.config.unmount_options())
                .await
                .map_err(fail)?;
        }

        self.bus
            .command(&target, Verb::Eject, &CommandOptions::default())
            .await
            .map_err(fail)?;
        Ok(())
    }
}

pub struct LegacyAdapter {
    bus: Arc<dyn DeviceBus>,
    show_ignored: bool,
    commands: Arc<LegacyCommands>,
    state: Reconciler,
}

impl LegacyAdapter {
    pub fn new(bus: Arc<dyn DeviceBus>, config: ManagerConfig) -> Self {
        let events = EventBus::new();
        Self {
            show_ignored: config.show_ignored,
            commands: Arc::new(LegacyCommands {
                bus: bus.clone(),
                config,
                events: events.clone(),
            }),
            bus,
            state: Reconciler::new(events),
        }
    }

    async fn fetch(&self, path: &str) -> Option<DeviceAttributes> {
        let props = match self.bus.properties(path, DEVICE_IFACE).await {
            Ok(props) => props,
            Err(e) => {
                warn!("Could not read device {path}: {e}");
                return None;
            }
        };

        if !self.show_ignored && props.bool("DevicePresentationHide") == Some(true) {
            debug!("Skipping hidden device {path}");
            return None;
        }

        let attrs = derive_attributes(&props);
        if attrs.dev_file.is_empty() {
            warn!("Device {path} has no device file");
            return None;
        }
        Some(attrs)
    }

    async fn add(&mut self, path: &str) {
        if self.state.is_tracked(path) {
            debug!("Device {path} already tracked");
            return;
        }

        if let Some(attrs) = self.fetch(path).await {
            let commands: Arc<dyn DeviceCommands> = self.commands.clone();
            self.state.insert(path, attrs, commands);
        }
    }

    async fn changed(&mut self, path: &str) {
        let Some(device) = self.state.get(path) else {
            self.add(path).await;
            return;
        };

        match self.fetch(path).await {
            Some(attrs) => {
                self.state.refresh(&device, attrs);
            }
            None => debug!("Keeping last known state of {path}"),
        }
    }
}

#[async_trait]
impl BackendAdapter for LegacyAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Legacy
    }

    async fn probe(&self) -> bool {
        match self.bus.probe().await {
            Ok(()) => true,
            Err(e) => {
                info!("UDisks is not available: {e}");
                false
            }
        }
    }

    async fn watch(&self) -> Result<BusSignalStream, MountError> {
        Ok(self.bus.watch().await?)
    }

    async fn update(&mut self) {
        let paths: Vec<String> = match self.bus.enumerate().await {
            Ok(paths) => paths.into_iter().filter(|p| is_device_path(p)).collect(),
            Err(e) => {
                log_enumeration_failure(BackendKind::Legacy, &e);
                return;
            }
        };

        for path in &paths {
            if !self.state.is_tracked(path) {
                self.add(path).await;
            }
        }

        for path in self.state.stale_paths(&paths) {
            self.state.remove(&path);
        }
    }

    async fn handle(&mut self, signal: BusSignal) {
        if !is_device_path(signal.path()) {
            debug!("Ignoring notification for {}", signal.path());
            return;
        }

        match signal {
            BusSignal::Added { path, .. } => self.add(&path).await,
            BusSignal::Removed { path } => {
                self.state.remove(&path);
            }
            BusSignal::Changed { path } => self.changed(&path).await,
        }
    }

    fn devices(&self) -> Vec<Device> {
        self.state.snapshot()
    }

    fn device(&self, path: &str) -> Option<Device> {
        self.state.get(path)
    }

    fn events(&self) -> &EventBus {
        self.state.events()
    }
}
