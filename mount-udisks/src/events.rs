// SPDX-License-Identifier: GPL-3.0-only

//! Device events and their fan-out to subscribers

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::stream::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::device::Device;

#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Added(Device),
    /// The device has already left the registry and is no longer valid.
    Removed(Device),
    Changed(Device),
    Mounted(Device),
    Unmounted(Device),
    Error { device: Device, message: String },
}

impl DeviceEvent {
    pub fn device(&self) -> &Device {
        match self {
            DeviceEvent::Added(d)
            | DeviceEvent::Removed(d)
            | DeviceEvent::Changed(d)
            | DeviceEvent::Mounted(d)
            | DeviceEvent::Unmounted(d) => d,
            DeviceEvent::Error { device, .. } => device,
        }
    }
}

/// Fan-out of device events. Every subscriber gets every event in emission
/// order; closed subscribers are pruned on the next emit.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<DeviceEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> DeviceEventStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sender);
        DeviceEventStream { receiver }
    }

    pub(crate) fn emit(&self, event: DeviceEvent) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        debug!(
            "{:?} for {} ({} subscribers)",
            EventKind::of(&event),
            event.device().path(),
            subscribers.len()
        );
    }
}

#[derive(Debug)]
enum EventKind {
    Added,
    Removed,
    Changed,
    Mounted,
    Unmounted,
    Error,
}

impl EventKind {
    fn of(event: &DeviceEvent) -> Self {
        match event {
            DeviceEvent::Added(_) => EventKind::Added,
            DeviceEvent::Removed(_) => EventKind::Removed,
            DeviceEvent::Changed(_) => EventKind::Changed,
            DeviceEvent::Mounted(_) => EventKind::Mounted,
            DeviceEvent::Unmounted(_) => EventKind::Unmounted,
            DeviceEvent::Error { .. } => EventKind::Error,
        }
    }
}

pub struct DeviceEventStream {
    receiver: mpsc::UnboundedReceiver<DeviceEvent>,
}

impl DeviceEventStream {
    /// Next event if one is already queued.
    pub fn try_next(&mut self) -> Option<DeviceEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for DeviceEventStream {
    type Item = DeviceEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
