// SPDX-License-Identifier: GPL-3.0-only

//! Property bags of typical devices, shaped like the real services report them

use mount_udisks::bus::udisks1::DEVICE_IFACE;
use mount_udisks::bus::udisks2::{BLOCK_IFACE, DRIVE_IFACE, FILESYSTEM_IFACE, PARTITION_IFACE};
use mount_udisks::{BusSignal, InterfaceMap, PropertyMap, PropertyValue};

use crate::FakeBus;

pub const GIB: u64 = 1024 * 1024 * 1024;

fn text(value: &str) -> PropertyValue {
    PropertyValue::Str(value.to_string())
}

fn bytes(value: &str) -> PropertyValue {
    let mut raw = value.as_bytes().to_vec();
    raw.push(0);
    PropertyValue::Bytes(raw)
}

pub fn block_path(name: &str) -> String {
    format!("/org/freedesktop/UDisks2/block_devices/{name}")
}

pub fn drive_path(name: &str) -> String {
    format!("/org/freedesktop/UDisks2/drives/{name}")
}

pub fn legacy_path(name: &str) -> String {
    format!("/org/freedesktop/UDisks/devices/{name}")
}

/// Block bag of a labelled partition on `drive`.
pub fn block(name: &str, label: &str, drive: &str) -> PropertyMap {
    let dev_file = format!("/dev/{name}");
    PropertyMap::new()
        .with("Device", bytes(&dev_file))
        .with("PreferredDevice", bytes(&dev_file))
        .with("IdType", text("vfat"))
        .with("IdLabel", text(label))
        .with("Size", PropertyValue::U64(8 * GIB))
        .with("HintIgnore", PropertyValue::Bool(false))
        .with("Drive", text(drive))
}

pub fn usb_drive(model: &str) -> PropertyMap {
    PropertyMap::new()
        .with("Vendor", text("SanDisk"))
        .with("Model", text(model))
        .with("ConnectionBus", text("usb"))
        .with("Removable", PropertyValue::Bool(true))
        .with("MediaRemovable", PropertyValue::Bool(true))
        .with("Ejectable", PropertyValue::Bool(true))
        .with("Optical", PropertyValue::Bool(false))
        .with("MediaCompatibility", PropertyValue::List(vec![text("thumb")]))
}

pub fn filesystem(mount_points: &[&str]) -> PropertyMap {
    PropertyMap::new().with(
        "MountPoints",
        PropertyValue::List(mount_points.iter().map(|p| bytes(p)).collect()),
    )
}

pub fn partition(number: u64) -> PropertyMap {
    PropertyMap::new().with("Number", PropertyValue::U64(number))
}

/// The interfaces an `InterfacesAdded` signal carries for a new USB partition.
pub fn stick_interfaces(name: &str, label: &str, drive: &str) -> InterfaceMap {
    InterfaceMap::from([
        (BLOCK_IFACE.to_string(), block(name, label, drive)),
        (FILESYSTEM_IFACE.to_string(), filesystem(&[])),
        (PARTITION_IFACE.to_string(), partition(1)),
    ])
}

pub fn added(path: &str, interfaces: Option<InterfaceMap>) -> BusSignal {
    BusSignal::Added {
        path: path.to_string(),
        interfaces,
    }
}

pub fn removed(path: &str) -> BusSignal {
    BusSignal::Removed {
        path: path.to_string(),
    }
}

pub fn changed(path: &str) -> BusSignal {
    BusSignal::Changed {
        path: path.to_string(),
    }
}

/// Device bag of a mounted or unmounted USB partition on UDisks 1.x.
pub fn legacy_partition(name: &str, label: &str, slave: &str, mount: Option<&str>) -> PropertyMap {
    PropertyMap::new()
        .with("DeviceFile", text(&format!("/dev/{name}")))
        .with("DeviceIsPartition", PropertyValue::Bool(true))
        .with("DeviceIsDrive", PropertyValue::Bool(false))
        .with("DeviceIsRemovable", PropertyValue::Bool(false))
        .with("DeviceIsSystemInternal", PropertyValue::Bool(false))
        .with("DeviceIsMounted", PropertyValue::Bool(mount.is_some()))
        .with(
            "DeviceMountPaths",
            PropertyValue::List(mount.into_iter().map(text).collect()),
        )
        .with("DeviceSize", PropertyValue::U64(4 * GIB))
        .with("DevicePresentationHide", PropertyValue::Bool(false))
        .with("DriveVendor", text("Kingston"))
        .with("DriveModel", text("DataTraveler"))
        .with("DriveIsMediaEjectable", PropertyValue::Bool(true))
        .with("PartitionSlave", text(slave))
        .with("IdType", text("vfat"))
        .with("IdLabel", text(label))
}

impl FakeBus {
    /// Script a USB stick partition `name` on drive `drive` (UDisks2).
    pub fn add_stick(&self, name: &str, label: &str, drive: &str) -> String {
        let path = block_path(name);
        let drive = drive_path(drive);
        self.add_path(&path);
        self.set_properties(&path, BLOCK_IFACE, block(name, label, &drive));
        self.set_properties(&path, FILESYSTEM_IFACE, filesystem(&[]));
        self.set_properties(&path, PARTITION_IFACE, partition(1));
        self.set_properties(&drive, DRIVE_IFACE, usb_drive("Cruzer"));
        path
    }

    /// Set the mount points of a scripted UDisks2 block device.
    pub fn set_mount_points(&self, path: &str, mount_points: &[&str]) {
        self.set_properties(path, FILESYSTEM_IFACE, filesystem(mount_points));
    }

    /// Script a USB partition `name` whose parent is `slave` (UDisks 1.x).
    pub fn add_legacy_stick(&self, name: &str, label: &str, slave: &str) -> String {
        let path = legacy_path(name);
        self.add_path(&path);
        self.set_properties(
            &path,
            DEVICE_IFACE,
            legacy_partition(name, label, &legacy_path(slave), None),
        );
        path
    }
}
