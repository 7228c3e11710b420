// SPDX-License-Identifier: GPL-3.0-only

//! Tracked devices
//!
//! A `DeviceRecord` holds the attributes of one device object. It is owned by
//! the registry through a shared `Device` handle and updated in place, so any
//! holder of the handle sees the current state. Only adapters write to it.

use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use async_trait::async_trait;
use mount_types::{DeviceInfo, MediaType, size_to_string};

use crate::error::MountError;

/// Store `value` and report whether it differed from the current one.
fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Attributes derived from one round of property queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct DeviceAttributes {
    pub dev_file: String,
    pub label: String,
    pub vendor: String,
    pub model: String,
    pub file_system: String,
    pub mount_path: Option<String>,
    pub icon_name: String,
    pub size: u64,
    pub media_type: MediaType,
    pub external: bool,
    pub ejectable: bool,
}

impl DeviceAttributes {
    /// Label shown when the filesystem carries none.
    pub(crate) fn fallback_label(&self) -> String {
        if self.size > 0 {
            format!("{} Volume", size_to_string(self.size))
        } else {
            self.dev_file
                .rsplit('/')
                .next()
                .unwrap_or(&self.dev_file)
                .to_string()
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceRecord {
    path: String,
    dev_file: String,
    label: String,
    vendor: String,
    model: String,
    file_system: String,
    mount_path: Option<String>,
    icon_name: String,
    size: u64,
    media_type: MediaType,
    valid: bool,
    external: bool,
    mounted: bool,
    ejectable: bool,
}

impl DeviceRecord {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dev_file: String::new(),
            label: String::new(),
            vendor: String::new(),
            model: String::new(),
            file_system: String::new(),
            mount_path: None,
            icon_name: String::new(),
            size: 0,
            media_type: MediaType::Unknown,
            valid: false,
            external: false,
            mounted: false,
            ejectable: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn dev_file(&self) -> &str {
        &self.dev_file
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn vendor(&self) -> &str {
        &self.vendor
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn file_system(&self) -> &str {
        &self.file_system
    }

    pub fn mount_path(&self) -> Option<&str> {
        self.mount_path.as_deref()
    }

    pub fn icon_name(&self) -> &str {
        &self.icon_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn is_ejectable(&self) -> bool {
        self.ejectable
    }

    pub fn size_string(&self) -> String {
        size_to_string(self.size)
    }

    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            path: self.path.clone(),
            dev_file: self.dev_file.clone(),
            label: self.label.clone(),
            vendor: self.vendor.clone(),
            model: self.model.clone(),
            file_system: self.file_system.clone(),
            mount_path: self.mount_path.clone(),
            icon_name: self.icon_name.clone(),
            size: self.size,
            media_type: self.media_type,
            is_valid: self.valid,
            is_external: self.external,
            is_mounted: self.mounted,
            is_ejectable: self.ejectable,
        }
    }

    pub(crate) fn set_dev_file(&mut self, value: String) -> bool {
        replace(&mut self.dev_file, value)
    }

    pub(crate) fn set_label(&mut self, value: String) -> bool {
        replace(&mut self.label, value)
    }

    pub(crate) fn set_vendor(&mut self, value: String) -> bool {
        replace(&mut self.vendor, value)
    }

    pub(crate) fn set_model(&mut self, value: String) -> bool {
        replace(&mut self.model, value)
    }

    pub(crate) fn set_file_system(&mut self, value: String) -> bool {
        replace(&mut self.file_system, value)
    }

    /// Empty directories count as unmounted.
    pub(crate) fn set_mount_path(&mut self, value: Option<String>) -> bool {
        replace(&mut self.mount_path, value.filter(|p| !p.is_empty()))
    }

    pub(crate) fn set_icon_name(&mut self, value: String) -> bool {
        replace(&mut self.icon_name, value)
    }

    pub(crate) fn set_size(&mut self, value: u64) -> bool {
        replace(&mut self.size, value)
    }

    pub(crate) fn set_media_type(&mut self, value: MediaType) -> bool {
        replace(&mut self.media_type, value)
    }

    pub(crate) fn set_valid(&mut self, value: bool) -> bool {
        replace(&mut self.valid, value)
    }

    pub(crate) fn set_external(&mut self, value: bool) -> bool {
        replace(&mut self.external, value)
    }

    pub(crate) fn set_mounted(&mut self, value: bool) -> bool {
        replace(&mut self.mounted, value)
    }

    pub(crate) fn set_ejectable(&mut self, value: bool) -> bool {
        replace(&mut self.ejectable, value)
    }

    /// Run every setter and report whether anything changed.
    ///
    /// `mounted` follows the mount directory, and `ejectable` is only kept
    /// for external devices of a known media type.
    pub(crate) fn apply(&mut self, attrs: DeviceAttributes) -> bool {
        let mounted = attrs.mount_path.as_deref().is_some_and(|p| !p.is_empty());
        let ejectable = attrs.ejectable && attrs.external && attrs.media_type.supports_eject();

        let mut changed = false;
        changed |= self.set_dev_file(attrs.dev_file);
        changed |= self.set_label(attrs.label);
        changed |= self.set_vendor(attrs.vendor);
        changed |= self.set_model(attrs.model);
        changed |= self.set_file_system(attrs.file_system);
        changed |= self.set_mount_path(attrs.mount_path);
        changed |= self.set_mounted(mounted);
        changed |= self.set_icon_name(attrs.icon_name);
        changed |= self.set_size(attrs.size);
        changed |= self.set_media_type(attrs.media_type);
        changed |= self.set_external(attrs.external);
        changed |= self.set_ejectable(ejectable);
        changed
    }
}

/// Backend-specific implementation of the device commands.
///
/// Implementations issue the backend call only. They never touch the record;
/// its state follows from the change notification the service sends back.
#[async_trait]
pub trait DeviceCommands: Send + Sync {
    async fn mount(&self, device: &Device) -> Result<(), MountError>;
    async fn unmount(&self, device: &Device) -> Result<(), MountError>;
    async fn eject(&self, device: &Device) -> Result<(), MountError>;
}

struct DeviceShared {
    path: String,
    record: RwLock<DeviceRecord>,
    commands: Arc<dyn DeviceCommands>,
    // Held while a command for this device is in flight.
    command_lock: tokio::sync::Mutex<()>,
}

/// Shared handle to a tracked device.
///
/// Clones refer to the same record. A handle stays readable after the device
/// is removed, but then reports `is_valid() == false` and refuses commands.
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceShared>,
}

impl Device {
    pub(crate) fn new(path: impl Into<String>, commands: Arc<dyn DeviceCommands>) -> Self {
        let path = path.into();
        Self {
            inner: Arc::new(DeviceShared {
                record: RwLock::new(DeviceRecord::new(path.clone())),
                path,
                commands,
                command_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Read access to the live record.
    pub fn record(&self) -> RwLockReadGuard<'_, DeviceRecord> {
        self.inner.record.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut DeviceRecord) -> R) -> R {
        let mut record = self.inner.record.write().unwrap_or_else(|e| e.into_inner());
        f(&mut record)
    }

    /// Detached copy of the current attributes.
    pub fn info(&self) -> DeviceInfo {
        self.record().info()
    }

    pub fn is_valid(&self) -> bool {
        self.record().is_valid()
    }

    pub fn is_mounted(&self) -> bool {
        self.record().is_mounted()
    }

    pub fn mount_path(&self) -> Option<String> {
        self.record().mount_path().map(str::to_string)
    }

    pub fn media_type(&self) -> MediaType {
        self.record().media_type()
    }

    /// Whether both handles refer to the same record.
    pub fn same_as(&self, other: &Device) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub async fn mount(&self) -> Result<(), MountError> {
        let _guard = self.inner.command_lock.lock().await;
        self.ensure_valid()?;
        self.inner.commands.mount(self).await
    }

    pub async fn unmount(&self) -> Result<(), MountError> {
        let _guard = self.inner.command_lock.lock().await;
        self.ensure_valid()?;
        self.inner.commands.unmount(self).await
    }

    pub async fn eject(&self) -> Result<(), MountError> {
        let _guard = self.inner.command_lock.lock().await;
        self.ensure_valid()?;
        self.inner.commands.eject(self).await
    }

    fn ensure_valid(&self) -> Result<(), MountError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(MountError::UnknownDevice(self.path().to_string()))
        }
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Device").field(&self.info()).finish()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.info(), f)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Commands that always succeed without doing anything.
    pub(crate) struct NoopCommands;

    #[async_trait]
    impl DeviceCommands for NoopCommands {
        async fn mount(&self, _device: &Device) -> Result<(), MountError> {
            Ok(())
        }

        async fn unmount(&self, _device: &Device) -> Result<(), MountError> {
            Ok(())
        }

        async fn eject(&self, _device: &Device) -> Result<(), MountError> {
            Ok(())
        }
    }

    pub(crate) fn stick_attributes() -> DeviceAttributes {
        DeviceAttributes {
            dev_file: "/dev/sdb1".to_string(),
            label: "STICK".to_string(),
            vendor: "SanDisk".to_string(),
            model: "Cruzer".to_string(),
            file_system: "vfat".to_string(),
            mount_path: None,
            icon_name: "drive-removable-media".to_string(),
            size: 8 * 1024 * 1024 * 1024,
            media_type: MediaType::Partition,
            external: true,
            ejectable: true,
        }
    }

    pub(crate) fn valid_device(path: &str) -> Device {
        let device = Device::new(path, Arc::new(NoopCommands));
        device.update(|r| {
            r.apply(stick_attributes());
            r.set_valid(true);
        });
        device
    }

    #[test]
    fn setters_report_only_real_changes() {
        let mut record = DeviceRecord::new("/org/freedesktop/UDisks2/block_devices/sdb1");
        assert!(record.set_label("STICK".to_string()));
        assert!(!record.set_label("STICK".to_string()));
        assert!(record.set_size(42));
        assert!(!record.set_size(42));
        assert!(!record.set_media_type(MediaType::Unknown));
        assert!(!record.set_mount_path(Some(String::new())));
    }

    #[test]
    fn applying_same_attributes_twice_is_a_no_op() {
        let mut record = DeviceRecord::new("/org/freedesktop/UDisks2/block_devices/sdb1");
        assert!(record.apply(stick_attributes()));
        assert!(!record.apply(stick_attributes()));
    }

    #[test]
    fn mounted_follows_mount_path() {
        let mut record = DeviceRecord::new("/org/freedesktop/UDisks2/block_devices/sdb1");
        let mut attrs = stick_attributes();
        attrs.mount_path = Some("/run/media/user/STICK".to_string());
        record.apply(attrs.clone());
        assert!(record.is_mounted());
        assert_eq!(record.mount_path(), Some("/run/media/user/STICK"));

        attrs.mount_path = Some(String::new());
        assert!(record.apply(attrs));
        assert!(!record.is_mounted());
        assert_eq!(record.mount_path(), None);
    }

    #[test]
    fn ejectable_requires_external_known_media() {
        let mut record = DeviceRecord::new("/org/freedesktop/UDisks2/block_devices/sda1");
        let mut attrs = stick_attributes();
        attrs.external = false;
        record.apply(attrs.clone());
        assert!(!record.is_ejectable());

        attrs.external = true;
        attrs.media_type = MediaType::Unknown;
        record.apply(attrs.clone());
        assert!(!record.is_ejectable());

        attrs.media_type = MediaType::Optical;
        record.apply(attrs);
        assert!(record.is_ejectable());
    }

    #[test]
    fn fallback_label_prefers_size() {
        let mut attrs = stick_attributes();
        assert_eq!(attrs.fallback_label(), "8.0 GB Volume");
        attrs.size = 0;
        assert_eq!(attrs.fallback_label(), "sdb1");
    }

    #[test]
    fn clones_share_the_record() {
        let device = valid_device("/org/freedesktop/UDisks2/block_devices/sdb1");
        let observer = device.clone();
        device.update(|r| r.set_label("RENAMED".to_string()));
        assert_eq!(observer.record().label(), "RENAMED");
        assert!(observer.same_as(&device));
    }

    #[tokio::test]
    async fn retired_device_refuses_commands() {
        let device = valid_device("/org/freedesktop/UDisks2/block_devices/sdb1");
        assert!(device.mount().await.is_ok());

        device.update(|r| r.set_valid(false));
        let err = device.mount().await.unwrap_err();
        assert_eq!(
            err,
            MountError::UnknownDevice("/org/freedesktop/UDisks2/block_devices/sdb1".to_string())
        );
    }
}
