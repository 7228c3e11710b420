// SPDX-License-Identifier: GPL-3.0-only

//! Legacy UDisks (1.x) transport over the system bus
//!
//! The 1.x daemon exposes a single `org.freedesktop.UDisks.Device` interface
//! per device object and announces changes with its own
//! `DeviceAdded`/`DeviceRemoved`/`DeviceChanged` signals.

use async_trait::async_trait;
use tracing::warn;
use zbus::{
    Connection, MatchRule, Message, MessageStream,
    zvariant::{self, OwnedObjectPath},
};
use zbus_macros::proxy;

use super::udisks2::get_all;
use super::{BusError, BusSignal, BusSignalStream, CommandOptions, DeviceBus, PropertyMap, Verb};

pub const SERVICE: &str = "org.freedesktop.UDisks";
pub const DEVICE_IFACE: &str = "org.freedesktop.UDisks.Device";

#[proxy(
    default_service = "org.freedesktop.UDisks",
    default_path = "/org/freedesktop/UDisks",
    interface = "org.freedesktop.UDisks"
)]
pub trait UDisks {
    fn enumerate_devices(&self) -> zbus::Result<Vec<zvariant::OwnedObjectPath>>;

    #[zbus(property)]
    fn daemon_version(&self) -> zbus::Result<String>;
}

#[proxy(
    default_service = "org.freedesktop.UDisks",
    interface = "org.freedesktop.UDisks.Device"
)]
pub trait UDisksDevice {
    fn filesystem_mount(&self, filesystem_type: &str, options: &[&str]) -> zbus::Result<String>;

    fn filesystem_unmount(&self, options: &[&str]) -> zbus::Result<()>;

    fn drive_eject(&self, options: &[&str]) -> zbus::Result<()>;
}

#[derive(Clone)]
pub struct Udisks1Bus {
    connection: Connection,
}

impl Udisks1Bus {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

/// Map one daemon signal to a notification. The device path is the only
/// argument of all three.
fn translate(message: &Message) -> Option<BusSignal> {
    let header = message.header();
    let member = header.member()?.as_str();
    if !matches!(member, "DeviceAdded" | "DeviceRemoved" | "DeviceChanged") {
        return None;
    }

    let path = match message.body().deserialize::<OwnedObjectPath>() {
        Ok(path) => path.to_string(),
        Err(e) => {
            warn!("Failed to parse {member} signal args: {e}");
            return None;
        }
    };

    Some(match member {
        "DeviceAdded" => BusSignal::Added {
            path,
            interfaces: None,
        },
        "DeviceRemoved" => BusSignal::Removed { path },
        _ => BusSignal::Changed { path },
    })
}

#[async_trait]
impl DeviceBus for Udisks1Bus {
    async fn probe(&self) -> Result<(), BusError> {
        let daemon = UDisksProxy::new(&self.connection).await?;
        let version = daemon.daemon_version().await?;
        tracing::info!("UDisks daemon version {version}");
        Ok(())
    }

    async fn enumerate(&self) -> Result<Vec<String>, BusError> {
        let daemon = UDisksProxy::new(&self.connection).await?;
        let paths = daemon.enumerate_devices().await?;
        Ok(paths.into_iter().map(|p| p.to_string()).collect())
    }

    async fn properties(&self, path: &str, interface: &str) -> Result<PropertyMap, BusError> {
        get_all(&self.connection, SERVICE, path, interface).await
    }

    async fn command(
        &self,
        path: &str,
        verb: Verb,
        options: &CommandOptions,
    ) -> Result<Option<String>, BusError> {
        let proxy = UDisksDeviceProxy::builder(&self.connection)
            .path(path)?
            .build()
            .await?;

        match verb {
            Verb::Mount => {
                let opts: Vec<&str> = options.mount_options.iter().map(String::as_str).collect();
                // Empty filesystem type lets the daemon pick the detected one.
                let mount_point = proxy.filesystem_mount("", &opts).await?;
                Ok(Some(mount_point))
            }
            Verb::Unmount => {
                let opts: &[&str] = if options.force { &["force"] } else { &[] };
                proxy.filesystem_unmount(opts).await?;
                Ok(None)
            }
            Verb::Eject => {
                proxy.drive_eject(&[]).await?;
                Ok(None)
            }
        }
    }

    /// Daemon signals read from one subscription, in the order they were sent.
    async fn watch(&self) -> Result<BusSignalStream, BusError> {
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .sender(SERVICE)?
            .interface(SERVICE)?
            .build();
        let messages = MessageStream::for_match_rule(rule, &self.connection, None).await?;

        Ok(BusSignalStream::forward(messages, SERVICE, translate))
    }
}
