// SPDX-License-Identifier: GPL-3.0-only

//! Authoritative set of tracked devices, keyed by backend object path

use std::collections::HashMap;

use crate::device::Device;
use crate::error::MountError;

/// Registry of tracked devices.
///
/// Membership here is what decides whether a device exists. Snapshots come
/// back in registration order.
#[derive(Default)]
pub struct DeviceRegistry {
    by_path: HashMap<String, Device>,
    order: Vec<String>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, device: Device) -> Result<(), MountError> {
        let path = device.path().to_string();
        if self.by_path.contains_key(&path) {
            return Err(MountError::DuplicateDevice(path));
        }
        if !device.is_valid() {
            return Err(MountError::InvalidDevice(path));
        }

        self.order.push(path.clone());
        self.by_path.insert(path, device);
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Result<Device, MountError> {
        let device = self
            .by_path
            .remove(path)
            .ok_or_else(|| MountError::UnknownDevice(path.to_string()))?;
        self.order.retain(|p| p != path);
        Ok(device)
    }

    pub fn get(&self, path: &str) -> Option<&Device> {
        self.by_path.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.by_path.contains_key(path)
    }

    pub fn paths(&self) -> &[String] {
        &self.order
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.order
            .iter()
            .filter_map(|p| self.by_path.get(p).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
