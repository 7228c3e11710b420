// SPDX-License-Identifier: GPL-3.0-only

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use mount_udisks::{
    BusError, BusSignal, BusSignalStream, CommandOptions, DeviceBus, PropertyMap, Verb,
};
use tokio::sync::mpsc;

/// Call recorded by `FakeBus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Probe,
    Enumerate,
    Properties {
        path: String,
        interface: String,
    },
    Command {
        path: String,
        verb: Verb,
        options: CommandOptions,
    },
    Watch,
}

#[derive(Default)]
struct FakeState {
    probe_error: Option<BusError>,
    watch_error: Option<BusError>,
    enumerate_error: Option<BusError>,
    paths: Vec<String>,
    properties: HashMap<(String, String), PropertyMap>,
    command_results: HashMap<Verb, Result<Option<String>, BusError>>,
    calls: Vec<Call>,
    sender: Option<mpsc::Sender<BusSignal>>,
}

/// Scriptable in-memory device service. Clones share their state.
#[derive(Clone, Default)]
pub struct FakeBus {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus whose service never answers the probe.
    pub fn unavailable() -> Self {
        let bus = Self::default();
        bus.set_probe_result(Err(BusError::ConnectionFailed(
            "The name is not activatable".to_string(),
        )));
        bus
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_probe_result(&self, res: Result<(), BusError>) {
        self.state().probe_error = res.err();
    }

    pub fn set_watch_result(&self, res: Result<(), BusError>) {
        self.state().watch_error = res.err();
    }

    pub fn set_enumerate_result(&self, res: Result<(), BusError>) {
        self.state().enumerate_error = res.err();
    }

    pub fn set_command_result(&self, verb: Verb, res: Result<Option<String>, BusError>) {
        self.state().command_results.insert(verb, res);
    }

    /// Add `path` to the enumeration.
    pub fn add_path(&self, path: &str) {
        let mut state = self.state();
        if !state.paths.iter().any(|p| p == path) {
            state.paths.push(path.to_string());
        }
    }

    /// Drop `path` from the enumeration together with its property bags.
    pub fn remove_path(&self, path: &str) {
        let mut state = self.state();
        state.paths.retain(|p| p != path);
        state.properties.retain(|(p, _), _| p != path);
    }

    pub fn set_properties(&self, path: &str, interface: &str, properties: PropertyMap) {
        self.state()
            .properties
            .insert((path.to_string(), interface.to_string()), properties);
    }

    pub fn clear_properties(&self, path: &str, interface: &str) {
        self.state()
            .properties
            .remove(&(path.to_string(), interface.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.state().calls)
    }

    /// Recorded commands as `(path, verb)` pairs.
    pub fn commands(&self) -> Vec<(String, Verb)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Command { path, verb, .. } => Some((path, verb)),
                _ => None,
            })
            .collect()
    }

    /// Deliver a notification to the watcher, if one subscribed.
    pub async fn emit(&self, signal: BusSignal) {
        let sender = self.state().sender.clone();
        if let Some(sender) = sender {
            let _ = sender.send(signal).await;
        }
    }

    /// Close the notification stream.
    pub fn disconnect(&self) {
        self.state().sender = None;
    }
}

#[async_trait]
impl DeviceBus for FakeBus {
    async fn probe(&self) -> Result<(), BusError> {
        let mut state = self.state();
        state.calls.push(Call::Probe);
        match &state.probe_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn enumerate(&self) -> Result<Vec<String>, BusError> {
        let mut state = self.state();
        state.calls.push(Call::Enumerate);
        match &state.enumerate_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.paths.clone()),
        }
    }

    async fn properties(&self, path: &str, interface: &str) -> Result<PropertyMap, BusError> {
        let mut state = self.state();
        state.calls.push(Call::Properties {
            path: path.to_string(),
            interface: interface.to_string(),
        });
        state
            .properties
            .get(&(path.to_string(), interface.to_string()))
            .cloned()
            .ok_or_else(|| {
                BusError::OperationFailed(format!(
                    "org.freedesktop.DBus.Error.UnknownInterface: {interface} on {path}"
                ))
            })
    }

    async fn command(
        &self,
        path: &str,
        verb: Verb,
        options: &CommandOptions,
    ) -> Result<Option<String>, BusError> {
        let mut state = self.state();
        state.calls.push(Call::Command {
            path: path.to_string(),
            verb,
            options: options.clone(),
        });
        state.command_results.get(&verb).cloned().unwrap_or(Ok(None))
    }

    async fn watch(&self) -> Result<BusSignalStream, BusError> {
        let mut state = self.state();
        state.calls.push(Call::Watch);
        if let Some(e) = &state.watch_error {
            return Err(e.clone());
        }

        let (sender, receiver) = mpsc::channel(64);
        state.sender = Some(sender);
        Ok(BusSignalStream::new(receiver))
    }
}
