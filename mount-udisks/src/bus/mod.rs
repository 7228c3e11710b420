// SPDX-License-Identifier: GPL-3.0-only

//! Transport boundary to the device service
//!
//! Adapters never talk to zbus directly. They go through `DeviceBus`, which
//! knows how to probe the service, enumerate its device objects, fetch one
//! interface's properties, issue the three device commands and deliver
//! add/remove/change notifications. `Udisks2Bus` and `Udisks1Bus` are the
//! system implementations.

mod properties;
pub mod udisks1;
pub mod udisks2;

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

pub use properties::{InterfaceMap, PropertyMap, PropertyValue};
pub use udisks1::Udisks1Bus;
pub use udisks2::Udisks2Bus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("D-Bus error: {0}")]
    DBusError(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl From<zbus::Error> for BusError {
    fn from(e: zbus::Error) -> Self {
        match e {
            zbus::Error::MethodError(name, detail, _) => BusError::OperationFailed(match detail {
                Some(detail) => format!("{name}: {detail}"),
                None => name.to_string(),
            }),
            zbus::Error::InputOutput(e) => BusError::ConnectionFailed(e.to_string()),
            other => BusError::DBusError(other.to_string()),
        }
    }
}

/// Typed UDisks2 errors. Wrapped zbus errors keep the daemon's message.
impl From<::udisks2::Error> for BusError {
    fn from(e: ::udisks2::Error) -> Self {
        match e {
            ::udisks2::Error::Zbus(e) => e.into(),
            other => BusError::OperationFailed(other.to_string()),
        }
    }
}

impl From<zbus::zvariant::Error> for BusError {
    fn from(e: zbus::zvariant::Error) -> Self {
        BusError::InvalidPath(e.to_string())
    }
}

/// Device command understood by both protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Mount,
    Unmount,
    Eject,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Mount => f.write_str("mount"),
            Verb::Unmount => f.write_str("unmount"),
            Verb::Eject => f.write_str("eject"),
        }
    }
}

/// Options forwarded with a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// Mount options such as `ro` or `noexec`
    pub mount_options: Vec<String>,
    pub force: bool,
}

/// Raw notification from the device service.
#[derive(Debug, Clone, PartialEq)]
pub enum BusSignal {
    /// A device object appeared. UDisks2 delivers its interfaces and
    /// properties with the signal; UDisks 1.x does not.
    Added {
        path: String,
        interfaces: Option<InterfaceMap>,
    },
    Removed {
        path: String,
    },
    Changed {
        path: String,
    },
}

impl BusSignal {
    pub fn path(&self) -> &str {
        match self {
            BusSignal::Added { path, .. } | BusSignal::Removed { path } | BusSignal::Changed { path } => {
                path
            }
        }
    }
}

/// Notifications in delivery order.
pub struct BusSignalStream {
    receiver: mpsc::Receiver<BusSignal>,
}

impl BusSignalStream {
    pub fn new(receiver: mpsc::Receiver<BusSignal>) -> Self {
        Self { receiver }
    }

    /// Translate the messages of a single match-rule stream in arrival order.
    /// Messages `translate` does not recognise are dropped.
    pub(crate) fn forward<S, F>(mut messages: S, service: &'static str, translate: F) -> Self
    where
        S: Stream<Item = zbus::Result<zbus::Message>> + Unpin + Send + 'static,
        F: Fn(&zbus::Message) -> Option<BusSignal> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(64);

        tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Failed to read {service} signal: {e}");
                        continue;
                    }
                };
                let Some(signal) = translate(&message) else {
                    continue;
                };
                if let Err(e) = sender.send(signal).await {
                    warn!("{service} signal receiver dropped: {e}");
                    break;
                }
            }
        });

        Self::new(receiver)
    }
}

impl Stream for BusSignalStream {
    type Item = BusSignal;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[async_trait]
pub trait DeviceBus: Send + Sync {
    /// Check that the service answers. Called once, never retried.
    async fn probe(&self) -> Result<(), BusError>;

    /// Object paths of every device the service currently knows.
    async fn enumerate(&self) -> Result<Vec<String>, BusError>;

    /// All properties of `interface` on `path`.
    async fn properties(&self, path: &str, interface: &str) -> Result<PropertyMap, BusError>;

    /// Issue `verb` against `path`. Mount returns the mount directory.
    async fn command(
        &self,
        path: &str,
        verb: Verb,
        options: &CommandOptions,
    ) -> Result<Option<String>, BusError>;

    /// Subscribe to add/remove/change notifications.
    async fn watch(&self) -> Result<BusSignalStream, BusError>;
}
