// SPDX-License-Identifier: GPL-3.0-only

//! Manager configuration

use std::path::Path;

use anyhow::{Context, Result};
use mount_types::BackendKind;
use serde::{Deserialize, Serialize};

use crate::bus::CommandOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Backends to probe, in order. The first one that answers is kept for
    /// the lifetime of the manager.
    pub backends: Vec<BackendKind>,

    /// Options passed with every mount request (e.g. `["noexec", "nosuid"]`)
    pub mount_options: Vec<String>,

    /// Request a forced unmount
    pub force_unmount: bool,

    /// Unmount a mounted device before ejecting its drive
    pub unmount_before_eject: bool,

    /// Surface devices the service asks to hide (`HintIgnore`,
    /// `DevicePresentationHide`)
    pub show_ignored: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            backends: BackendKind::DEFAULT_ORDER.to_vec(),
            mount_options: Vec::new(),
            force_unmount: false,
            unmount_before_eject: true,
            show_ignored: false,
        }
    }
}

impl ManagerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ManagerConfig =
            toml::from_str(contents).context("Invalid manager configuration")?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
    }

    pub(crate) fn mount_options(&self) -> CommandOptions {
        CommandOptions {
            mount_options: self.mount_options.clone(),
            force: false,
        }
    }

    pub(crate) fn unmount_options(&self) -> CommandOptions {
        CommandOptions {
            mount_options: Vec::new(),
            force: self.force_unmount,
        }
    }
}
