// SPDX-License-Identifier: GPL-3.0-only

//! UDisks2 adapter
//!
//! Devices are block objects under `/org/freedesktop/UDisks2/block_devices/`.
//! Their attributes are spread over three interfaces on the block object
//! (Block, Filesystem, Partition) plus the Drive object the block points to,
//! so a drive change is fanned out to every block that references it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mount_types::{BackendKind, MediaType};
use tracing::{debug, info, warn};

use super::{BackendAdapter, Reconciler, command_failed, log_enumeration_failure, non_empty};
use crate::bus::udisks2::{BLOCK_IFACE, DRIVE_IFACE, FILESYSTEM_IFACE, PARTITION_IFACE};
use crate::bus::{
    BusError, BusSignal, BusSignalStream, CommandOptions, DeviceBus, InterfaceMap, PropertyMap,
    Verb,
};
use crate::config::ManagerConfig;
use crate::device::{Device, DeviceAttributes, DeviceCommands};
use crate::error::MountError;
use crate::events::EventBus;

pub const BLOCK_PREFIX: &str = "/org/freedesktop/UDisks2/block_devices/";
pub const DRIVE_PREFIX: &str = "/org/freedesktop/UDisks2/drives/";

const EXTERNAL_BUSES: [&str; 3] = ["usb", "sdio", "ieee1394"];

fn is_block_path(path: &str) -> bool {
    path.starts_with(BLOCK_PREFIX)
}

/// Property bags gathered for one block object.
struct BlockSnapshot {
    attrs: DeviceAttributes,
    drive: Option<String>,
}

fn media_type(drive: Option<&PropertyMap>, is_partition: bool) -> MediaType {
    let Some(drive) = drive else {
        return if is_partition {
            MediaType::Partition
        } else {
            MediaType::Unknown
        };
    };

    let media = drive.text("Media").unwrap_or_default();
    let compatibility = drive.text_list("MediaCompatibility");
    let supports = |prefix: &str| {
        media.starts_with(prefix) || compatibility.iter().any(|m| m.starts_with(prefix))
    };

    if drive.bool("Optical") == Some(true) || supports("optical") {
        MediaType::Optical
    } else if supports("floppy") {
        MediaType::FloppyDrive
    } else if is_partition {
        MediaType::Partition
    } else {
        MediaType::Drive
    }
}

fn is_external(drive: Option<&PropertyMap>) -> bool {
    let Some(drive) = drive else {
        return false;
    };

    drive.bool("Removable") == Some(true)
        || drive.bool("MediaRemovable") == Some(true)
        || drive
            .text("ConnectionBus")
            .is_some_and(|bus| EXTERNAL_BUSES.contains(&bus.as_str()))
}

/// Derive device attributes from the Block, Drive and Filesystem bags.
pub(crate) fn derive_attributes(
    block: &PropertyMap,
    drive: Option<&PropertyMap>,
    filesystem: Option<&PropertyMap>,
    is_partition: bool,
) -> DeviceAttributes {
    let media_type = media_type(drive, is_partition);
    let external = is_external(drive);

    let mut attrs = DeviceAttributes {
        dev_file: non_empty(block.text("PreferredDevice"))
            .or_else(|| block.text("Device"))
            .unwrap_or_default(),
        label: String::new(),
        vendor: drive.and_then(|d| d.text("Vendor")).unwrap_or_default(),
        model: drive.and_then(|d| d.text("Model")).unwrap_or_default(),
        file_system: block.text("IdType").unwrap_or_default(),
        mount_path: filesystem.and_then(|fs| fs.text_list("MountPoints").into_iter().next()),
        icon_name: String::new(),
        size: block.u64("Size").unwrap_or(0),
        media_type,
        external,
        ejectable: drive.and_then(|d| d.bool("Ejectable")).unwrap_or(false),
    };

    attrs.label = non_empty(block.text("IdLabel"))
        .or_else(|| non_empty(block.text("HintName")))
        .unwrap_or_else(|| attrs.fallback_label());
    attrs.icon_name = non_empty(block.text("HintIconName"))
        .unwrap_or_else(|| media_type.fallback_icon(external).to_string());

    attrs
}

/// UDisks2 implementation of the device commands.
pub struct ModernCommands {
    bus: Arc<dyn DeviceBus>,
    config: ManagerConfig,
    events: EventBus,
}

impl ModernCommands {
    async fn drive_of(&self, path: &str) -> Result<String, BusError> {
        let block = self.bus.properties(path, BLOCK_IFACE).await?;
        block
            .object_path("Drive")
            .ok_or_else(|| BusError::OperationFailed(format!("{path} has no drive to eject")))
    }
}

#[async_trait]
impl DeviceCommands for ModernCommands {
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

    /// Unmount first when configured, then eject the drive the block sits on.
    async fn eject(&self, device: &Device) -> Result<(), MountError> {
        let fail = |e: BusError| command_failed(&self.events, device, Verb::Eject, e);

        let drive = self.drive_of(device.path()).await.map_err(fail)?;

        if self.config.unmount_before_eject && device.is_mounted() {
            self.bus
                .command(device.path(), Verb::Unmount, &self.config.unmount_options())
                .await
                .map_err(fail)?;
        }

        self.bus
            .command(&drive, Verb::Eject, &CommandOptions::default())
            .await
            .map_err(fail)?;
        Ok(())
    }
}

pub struct ModernAdapter {
    bus: Arc<dyn DeviceBus>,
    show_ignored: bool,
    commands: Arc<ModernCommands>,
    state: Reconciler,
    // block path -> drive path
    drives: HashMap<String, String>,
}

impl ModernAdapter {
    pub fn new(bus: Arc<dyn DeviceBus>, config: ManagerConfig) -> Self {
        let events = EventBus::new();
        Self {
            show_ignored: config.show_ignored,
            commands: Arc::new(ModernCommands {
                bus: bus.clone(),
                config,
                events: events.clone(),
            }),
            bus,
            state: Reconciler::new(events),
            drives: HashMap::new(),
        }
    }

    /// Gather and derive the attributes of one block object. Returns `None`
    /// when the Block bag is unreadable or the device is to be hidden.
    async fn fetch(&self, path: &str, payload: Option<&InterfaceMap>) -> Option<BlockSnapshot> {
        let block = match payload.and_then(|p| p.get(BLOCK_IFACE)) {
            Some(block) if !block.is_empty() => block.clone(),
            _ => match self.bus.properties(path, BLOCK_IFACE).await {
                Ok(block) => block,
                Err(e) => {
                    warn!("Could not read block device {path}: {e}");
                    return None;
                }
            },
        };

        if !self.show_ignored && block.bool("HintIgnore") == Some(true) {
            debug!("Skipping ignored block device {path}");
            return None;
        }

        let drive_path = block.object_path("Drive");
        let drive = match &drive_path {
            Some(drive_path) => match self.bus.properties(drive_path, DRIVE_IFACE).await {
                Ok(drive) => Some(drive),
                Err(e) => {
                    warn!("Could not read drive {drive_path}: {e}");
                    None
                }
            },
            None => None,
        };

        let (filesystem, is_partition) = match payload {
            Some(payload) => (
                payload.get(FILESYSTEM_IFACE).cloned(),
                payload.contains_key(PARTITION_IFACE),
            ),
            None => (
                self.bus.properties(path, FILESYSTEM_IFACE).await.ok(),
                self.bus.properties(path, PARTITION_IFACE).await.is_ok(),
            ),
        };

        let attrs = derive_attributes(&block, drive.as_ref(), filesystem.as_ref(), is_partition);
        if attrs.dev_file.is_empty() {
            warn!("Block device {path} has no device file");
            return None;
        }

        Some(BlockSnapshot {
            attrs,
            drive: drive_path,
        })
    }

    fn track_drive(&mut self, path: &str, drive: Option<String>) {
        match drive {
            Some(drive) => {
                self.drives.insert(path.to_string(), drive);
            }
            None => {
                self.drives.remove(path);
            }
        }
    }

    async fn add(&mut self, path: &str, payload: Option<&InterfaceMap>) {
        if self.state.is_tracked(path) {
            debug!("Block device {path} already tracked");
            return;
        }

        let Some(snapshot) = self.fetch(path, payload).await else {
            return;
        };

        let commands: Arc<dyn DeviceCommands> = self.commands.clone();
        if self.state.insert(path, snapshot.attrs, commands).is_some() {
            self.track_drive(path, snapshot.drive);
        }
    }

    async fn refresh(&mut self, path: &str) {
        let Some(device) = self.state.get(path) else {
            return;
        };

        let Some(snapshot) = self.fetch(path, None).await else {
            debug!("Keeping last known state of {path}");
            return;
        };

        self.track_drive(path, snapshot.drive);
        self.state.refresh(&device, snapshot.attrs);
    }

    fn remove(&mut self, path: &str) {
        self.state.remove(path);
        self.drives.remove(path);
    }

    async fn changed(&mut self, path: &str) {
        if path.starts_with(DRIVE_PREFIX) {
            let blocks: Vec<String> = self
                .drives
                .iter()
                .filter(|(_, drive)| drive.as_str() == path)
                .map(|(block, _)| block.clone())
                .collect();
            for block in blocks {
                self.refresh(&block).await;
            }
            return;
        }

        if !is_block_path(path) {
            return;
        }

        if self.state.is_tracked(path) {
            self.refresh(path).await;
        } else {
            // A change for an unknown block is how a hidden device surfaces
            // once the service stops ignoring it.
            self.add(path, None).await;
        }
    }
}

#[async_trait]
impl BackendAdapter for ModernAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Modern
    }

    async fn probe(&self) -> bool {
        match self.bus.probe().await {
            Ok(()) => true,
            Err(e) => {
                info!("UDisks2 is not available: {e}");
                false
            }
        }
    }

    async fn watch(&self) -> Result<BusSignalStream, MountError> {
        Ok(self.bus.watch().await?)
    }

    async fn update(&mut self) {
        let paths: Vec<String> = match self.bus.enumerate().await {
            Ok(paths) => paths.into_iter().filter(|p| is_block_path(p)).collect(),
            Err(e) => {
                log_enumeration_failure(BackendKind::Modern, &e);
                return;
            }
        };

        for path in &paths {
            if !self.state.is_tracked(path) {
                self.add(path, None).await;
            }
        }

        for path in self.state.stale_paths(&paths) {
            self.remove(&path);
        }
    }

    async fn handle(&mut self, signal: BusSignal) {
        match signal {
            BusSignal::Added { path, interfaces } if is_block_path(&path) => {
                self.add(&path, interfaces.as_ref()).await;
            }
            BusSignal::Removed { path } if is_block_path(&path) => self.remove(&path),
            BusSignal::Changed { path } => self.changed(&path).await,
            other => debug!("Ignoring notification for {}", other.path()),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::PropertyValue;

    fn text(value: &str) -> PropertyValue {
        PropertyValue::Str(value.to_string())
    }

    fn stick_block() -> PropertyMap {
        PropertyMap::new()
            .with("Device", PropertyValue::Bytes(b"/dev/sdb1\0".to_vec()))
            .with("PreferredDevice", PropertyValue::Bytes(b"/dev/sdb1\0".to_vec()))
            .with("IdType", text("vfat"))
            .with("IdLabel", text("STICK"))
            .with("Size", PropertyValue::U64(8 * 1024 * 1024 * 1024))
            .with("Drive", text("/org/freedesktop/UDisks2/drives/SanDisk_Cruzer"))
    }

    fn usb_drive() -> PropertyMap {
        PropertyMap::new()
            .with("Vendor", text("SanDisk"))
            .with("Model", text("Cruzer"))
            .with("ConnectionBus", text("usb"))
            .with("Removable", PropertyValue::Bool(true))
            .with("Ejectable", PropertyValue::Bool(true))
            .with("Optical", PropertyValue::Bool(false))
            .with("MediaCompatibility", PropertyValue::List(vec![text("thumb")]))
    }

    #[test]
    fn derives_usb_partition() {
        let filesystem = PropertyMap::new().with(
            "MountPoints",
            PropertyValue::List(vec![PropertyValue::Bytes(b"/run/media/user/STICK\0".to_vec())]),
        );

        let attrs = derive_attributes(&stick_block(), Some(&usb_drive()), Some(&filesystem), true);

        assert_eq!(attrs.dev_file, "/dev/sdb1");
        assert_eq!(attrs.label, "STICK");
        assert_eq!(attrs.vendor, "SanDisk");
        assert_eq!(attrs.model, "Cruzer");
        assert_eq!(attrs.file_system, "vfat");
        assert_eq!(attrs.mount_path.as_deref(), Some("/run/media/user/STICK"));
        assert_eq!(attrs.media_type, MediaType::Partition);
        assert!(attrs.external);
        assert!(attrs.ejectable);
        assert_eq!(attrs.icon_name, "drive-removable-media");
    }

    #[test]
    fn optical_drive_wins_over_partition() {
        let drive = usb_drive()
            .with("ConnectionBus", text("ata"))
            .with("Removable", PropertyValue::Bool(true))
            .with(
                "MediaCompatibility",
                PropertyValue::List(vec![text("optical_cd"), text("optical_dvd")]),
            );

        let attrs = derive_attributes(&stick_block(), Some(&drive), None, true);
        assert_eq!(attrs.media_type, MediaType::Optical);
        assert_eq!(attrs.icon_name, "media-optical");
        assert_eq!(attrs.mount_path, None);
    }

    #[test]
    fn internal_disk_without_drive_info() {
        let block = PropertyMap::new()
            .with("Device", PropertyValue::Bytes(b"/dev/loop0\0".to_vec()))
            .with("Size", PropertyValue::U64(0));

        let attrs = derive_attributes(&block, None, None, false);
        assert_eq!(attrs.media_type, MediaType::Unknown);
        assert!(!attrs.external);
        assert!(!attrs.ejectable);
        assert_eq!(attrs.label, "loop0");
        assert_eq!(attrs.icon_name, "drive-harddisk");
    }

    #[test]
    fn label_falls_back_to_hint_then_size() {
        let block = stick_block().with("IdLabel", text(""));
        let attrs = derive_attributes(&block, Some(&usb_drive()), None, true);
        assert_eq!(attrs.label, "8.0 GB Volume");

        let block = block.with("HintName", text("Backup"));
        let attrs = derive_attributes(&block, Some(&usb_drive()), None, true);
        assert_eq!(attrs.label, "Backup");
    }

    #[test]
    fn hint_icon_overrides_fallback() {
        let block = stick_block().with("HintIconName", text("media-flash"));
        let attrs = derive_attributes(&block, Some(&usb_drive()), None, true);
        assert_eq!(attrs.icon_name, "media-flash");
    }

    #[test]
    fn only_block_objects_are_candidates() {
        assert!(is_block_path("/org/freedesktop/UDisks2/block_devices/sda1"));
        assert!(!is_block_path("/org/freedesktop/UDisks2/drives/Foo"));
        assert!(!is_block_path("/org/freedesktop/UDisks/devices/sda1"));
    }
}
