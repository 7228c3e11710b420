// SPDX-License-Identifier: GPL-3.0-only

//! UDisks2 transport over the system bus

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;
use udisks2::{drive::DriveProxy, filesystem::FilesystemProxy};
use zbus::{
    Connection, MatchRule, Message, MessageStream,
    zvariant::{self, OwnedObjectPath, OwnedValue, Value},
};
use zbus_macros::proxy;

use super::{
    BusError, BusSignal, BusSignalStream, CommandOptions, DeviceBus, InterfaceMap, PropertyMap,
    Verb,
};

pub const SERVICE: &str = "org.freedesktop.UDisks2";
pub const ROOT_PATH: &str = "/org/freedesktop/UDisks2";
pub const BLOCK_IFACE: &str = "org.freedesktop.UDisks2.Block";
pub const DRIVE_IFACE: &str = "org.freedesktop.UDisks2.Drive";
pub const FILESYSTEM_IFACE: &str = "org.freedesktop.UDisks2.Filesystem";
pub const PARTITION_IFACE: &str = "org.freedesktop.UDisks2.Partition";

const OBJECT_MANAGER_IFACE: &str = "org.freedesktop.DBus.ObjectManager";
const PROPERTIES_IFACE: &str = "org.freedesktop.DBus.Properties";

type RawInterfaces = HashMap<String, HashMap<String, OwnedValue>>;

#[proxy(
    default_service = "org.freedesktop.UDisks2",
    default_path = "/org/freedesktop/UDisks2/Manager",
    interface = "org.freedesktop.UDisks2.Manager"
)]
pub trait UDisks2Manager {
    fn get_block_devices(
        &self,
        options: HashMap<String, Value<'_>>,
    ) -> zbus::Result<Vec<zvariant::OwnedObjectPath>>;

    #[zbus(property)]
    fn version(&self) -> zbus::Result<String>;
}

/// Fetch every property of one interface with `org.freedesktop.DBus.Properties.GetAll`.
pub(crate) async fn get_all(
    connection: &Connection,
    service: &str,
    path: &str,
    interface: &str,
) -> Result<PropertyMap, BusError> {
    let proxy = zbus::Proxy::new(connection, service, path, PROPERTIES_IFACE).await?;

    let raw: HashMap<String, OwnedValue> = proxy.call("GetAll", &(interface,)).await?;
    Ok(PropertyMap::from_owned(raw))
}

#[derive(Clone)]
pub struct Udisks2Bus {
    connection: Connection,
}

impl Udisks2Bus {
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }
}

fn interface_map(raw: &RawInterfaces) -> InterfaceMap {
    raw.iter()
        .map(|(iface, props)| (iface.clone(), PropertyMap::from_owned(props.clone())))
        .collect()
}

/// Translate an `InterfacesAdded` signal. Objects gaining the Block interface
/// are new devices; anything else (a filesystem appearing on an existing
/// block, a drive object) is a change of that object.
fn added_signal(path: String, raw: &RawInterfaces) -> BusSignal {
    if raw.contains_key(BLOCK_IFACE) {
        BusSignal::Added {
            path,
            interfaces: Some(interface_map(raw)),
        }
    } else {
        BusSignal::Changed { path }
    }
}

fn removed_signal(path: String, interfaces: &[String]) -> BusSignal {
    if interfaces.iter().any(|i| i == BLOCK_IFACE) {
        BusSignal::Removed { path }
    } else {
        BusSignal::Changed { path }
    }
}

/// Map one UDisks2 signal message to a notification.
fn translate(message: &Message) -> Option<BusSignal> {
    let header = message.header();
    let interface = header.interface()?.as_str();
    let member = header.member()?.as_str();

    match (interface, member) {
        (OBJECT_MANAGER_IFACE, "InterfacesAdded") => {
            match message.body().deserialize::<(OwnedObjectPath, RawInterfaces)>() {
                Ok((path, raw)) => Some(added_signal(path.to_string(), &raw)),
                Err(e) => {
                    warn!("Failed to parse InterfacesAdded signal args: {e}");
                    None
                }
            }
        }
        (OBJECT_MANAGER_IFACE, "InterfacesRemoved") => {
            match message.body().deserialize::<(OwnedObjectPath, Vec<String>)>() {
                Ok((path, interfaces)) => Some(removed_signal(path.to_string(), &interfaces)),
                Err(e) => {
                    warn!("Failed to parse InterfacesRemoved signal args: {e}");
                    None
                }
            }
        }
        (PROPERTIES_IFACE, "PropertiesChanged") => header.path().map(|path| BusSignal::Changed {
            path: path.to_string(),
        }),
        _ => None,
    }
}

#[async_trait]
impl DeviceBus for Udisks2Bus {
    async fn probe(&self) -> Result<(), BusError> {
        let manager = UDisks2ManagerProxy::new(&self.connection).await?;
        let version = manager.version().await?;
        tracing::info!("UDisks2 daemon version {version}");
        Ok(())
    }

    async fn enumerate(&self) -> Result<Vec<String>, BusError> {
        let manager = UDisks2ManagerProxy::new(&self.connection).await?;
        let paths = manager.get_block_devices(HashMap::new()).await?;
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
        let mut opts: HashMap<&str, Value<'_>> = HashMap::new();

        match verb {
            Verb::Mount => {
                let proxy = FilesystemProxy::builder(&self.connection)
                    .path(path)?
                    .build()
                    .await?;

                if !options.mount_options.is_empty() {
                    opts.insert("options", Value::from(options.mount_options.join(",")));
                }

                let mount_point = proxy.mount(opts).await?;
                Ok(Some(mount_point))
            }
            Verb::Unmount => {
                let proxy = FilesystemProxy::builder(&self.connection)
                    .path(path)?
                    .build()
                    .await?;

                if options.force {
                    opts.insert("force", Value::from(true));
                }

                proxy.unmount(opts).await?;
                Ok(None)
            }
            Verb::Eject => {
                let proxy = DriveProxy::builder(&self.connection)
                    .path(path)?
                    .build()
                    .await?;

                proxy.eject(opts).await?;
                Ok(None)
            }
        }
    }

    /// Every signal the daemon emits under its root object, read from one
    /// subscription so object-manager and property notifications keep the
    /// order the daemon sent them in.
    async fn watch(&self) -> Result<BusSignalStream, BusError> {
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .sender(SERVICE)?
            .path_namespace(ROOT_PATH)?
            .build();
        let messages = MessageStream::for_match_rule(rule, &self.connection, None).await?;

        Ok(BusSignalStream::forward(messages, SERVICE, translate))
    }
}
