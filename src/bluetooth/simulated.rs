// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! In-process Bluetooth backend.
//!
//! Behaves like a single adapter with a fixed set of paired robots. Every
//! platform call can be made to fail, writes are recorded, and adapter or
//! link events can be injected. Used by the test suite and by
//! `backend = "simulated"` for running without hardware.

use futures::future::BoxFuture;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tracing::{debug, info};

use super::platform::{
    AdapterState, BluetoothPlatform, DeviceHandle, DeviceRecord, Permission, PermissionGrant,
    RemoteDevice,
};
use crate::config::SimulatedConfig;
use crate::error::{BluetoothError, BluetoothResult};

/// How the simulated adapter answers an enable request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableBehavior {
    /// Power on.
    Allow,
    /// Stay off (the user declined).
    Refuse,
    /// No adapter present.
    Missing,
}

/// How a simulated device answers a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    Refuse,
    Fail,
}

/// A simulated robot.
///
/// The radio link (`connected`) and the local channel end (`holds_link`)
/// are tracked apart: when the robot goes away the channel stays held but
/// dead until it is released or reopened.
pub struct SimulatedDevice {
    record: DeviceRecord,
    connect_behavior: Mutex<ConnectBehavior>,
    connect_gate: Mutex<Option<Arc<Notify>>>,
    connect_calls: AtomicUsize,
    links_opened: AtomicUsize,
    disconnect_fails: AtomicBool,
    write_fails: AtomicBool,
    connected: AtomicBool,
    link_held: AtomicBool,
    written: Mutex<Vec<Vec<u8>>>,
    disconnect_tx: broadcast::Sender<String>,
}

impl SimulatedDevice {
    pub fn new(record: DeviceRecord) -> Self {
        let (disconnect_tx, _) = broadcast::channel(16);
        Self::with_events(record, disconnect_tx)
    }

    /// A device that reports its own link drops on `disconnect_tx`.
    fn with_events(record: DeviceRecord, disconnect_tx: broadcast::Sender<String>) -> Self {
        Self {
            record,
            connect_behavior: Mutex::new(ConnectBehavior::Accept),
            connect_gate: Mutex::new(None),
            connect_calls: AtomicUsize::new(0),
            links_opened: AtomicUsize::new(0),
            disconnect_fails: AtomicBool::new(false),
            write_fails: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            link_held: AtomicBool::new(false),
            written: Mutex::new(Vec::new()),
            disconnect_tx,
        }
    }

    pub fn set_connect_behavior(&self, behavior: ConnectBehavior) {
        *self.connect_behavior.lock() = behavior;
    }

    /// Make the next connect calls wait until the returned gate is notified.
    pub fn hold_connect(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.connect_gate.lock() = Some(gate.clone());
        gate
    }

    pub fn set_disconnect_fails(&self, fails: bool) {
        self.disconnect_fails.store(fails, Ordering::SeqCst);
    }

    pub fn set_write_fails(&self, fails: bool) {
        self.write_fails.store(fails, Ordering::SeqCst);
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of serial channels actually opened.
    pub fn links_opened(&self) -> usize {
        self.links_opened.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Whether the local end of a channel is still held, live or dead.
    pub fn holds_link(&self) -> bool {
        self.link_held.load(Ordering::SeqCst)
    }

    /// The robot went away: the link drops, the local channel stays held.
    fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Everything written so far, one entry per write.
    pub fn written(&self) -> Vec<String> {
        self.written
            .lock()
            .iter()
            .map(|data| String::from_utf8_lossy(data).into_owned())
            .collect()
    }
}

impl RemoteDevice for SimulatedDevice {
    fn record(&self) -> &DeviceRecord {
        &self.record
    }

    fn connect(&self) -> BoxFuture<'_, BluetoothResult<bool>> {
        Box::pin(async move {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);

            let gate = self.connect_gate.lock().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            let behavior = *self.connect_behavior.lock();
            match behavior {
                ConnectBehavior::Accept => {
                    if self.link_held.swap(true, Ordering::SeqCst) {
                        debug!("Reopening held channel to {}", self.record);
                    }
                    self.links_opened.fetch_add(1, Ordering::SeqCst);
                    self.connected.store(true, Ordering::SeqCst);
                    Ok(true)
                }
                ConnectBehavior::Refuse => Ok(false),
                ConnectBehavior::Fail => Err(BluetoothError::ConnectFailed {
                    name: self.record.name.clone(),
                    reason: "simulated connect failure".to_string(),
                }),
            }
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, BluetoothResult<bool>> {
        Box::pin(async move {
            self.link_held.store(false, Ordering::SeqCst);
            if self.disconnect_fails.load(Ordering::SeqCst) {
                return Err(BluetoothError::DisconnectFailed {
                    name: self.record.name.clone(),
                    reason: "simulated disconnect failure".to_string(),
                });
            }
            self.connected.store(false, Ordering::SeqCst);
            // The platform reports our own disconnects too.
            let _ = self.disconnect_tx.send(self.record.address.clone());
            Ok(true)
        })
    }

    fn release(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.link_held.store(false, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
        })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, BluetoothResult<()>> {
        Box::pin(async move {
            if self.write_fails.load(Ordering::SeqCst) {
                return Err(BluetoothError::WriteFailed {
                    name: self.record.name.clone(),
                    reason: "simulated write failure".to_string(),
                });
            }
            if !self.holds_link() || !self.is_connected() {
                return Err(BluetoothError::WriteFailed {
                    name: self.record.name.clone(),
                    reason: "link is down".to_string(),
                });
            }
            self.written.lock().push(data.to_vec());
            Ok(())
        })
    }
}

/// A simulated adapter.
pub struct SimulatedPlatform {
    enabled: AtomicBool,
    enable_behavior: Mutex<EnableBehavior>,
    enable_requests: AtomicUsize,
    denied: Mutex<Vec<Permission>>,
    query_fails: AtomicBool,
    devices: Mutex<Vec<Arc<SimulatedDevice>>>,
    state_tx: broadcast::Sender<AdapterState>,
    disconnect_tx: broadcast::Sender<String>,
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SimulatedPlatform {
    /// Create a disabled adapter with the given paired devices.
    pub fn new(devices: Vec<DeviceRecord>) -> Self {
        let (state_tx, _) = broadcast::channel(16);
        let (disconnect_tx, _) = broadcast::channel(16);

        Self {
            enabled: AtomicBool::new(false),
            enable_behavior: Mutex::new(EnableBehavior::Allow),
            enable_requests: AtomicUsize::new(0),
            denied: Mutex::new(Vec::new()),
            query_fails: AtomicBool::new(false),
            devices: Mutex::new(
                devices
                    .into_iter()
                    .map(|record| {
                        Arc::new(SimulatedDevice::with_events(record, disconnect_tx.clone()))
                    })
                    .collect(),
            ),
            state_tx,
            disconnect_tx,
        }
    }

    pub fn from_config(config: &SimulatedConfig) -> Self {
        let platform = Self::new(
            config
                .devices
                .iter()
                .map(|device| DeviceRecord::new(&device.name, &device.address))
                .collect(),
        );
        platform.enabled.store(config.start_enabled, Ordering::SeqCst);
        info!(
            "Simulated adapter with {} paired device(s), {}",
            config.devices.len(),
            if config.start_enabled { "enabled" } else { "disabled" }
        );
        platform
    }

    /// Look up a simulated device to inspect or script it.
    pub fn device(&self, address: &str) -> Option<Arc<SimulatedDevice>> {
        self.devices
            .lock()
            .iter()
            .find(|device| device.record.address == address)
            .cloned()
    }

    /// Replace the paired device list.
    pub fn set_devices(&self, devices: Vec<DeviceRecord>) {
        *self.devices.lock() = devices
            .into_iter()
            .map(|record| {
                Arc::new(SimulatedDevice::with_events(
                    record,
                    self.disconnect_tx.clone(),
                ))
            })
            .collect();
    }

    pub fn set_enable_behavior(&self, behavior: EnableBehavior) {
        *self.enable_behavior.lock() = behavior;
    }

    pub fn enable_requests(&self) -> usize {
        self.enable_requests.load(Ordering::SeqCst)
    }

    pub fn deny_permissions(&self, permissions: Vec<Permission>) {
        *self.denied.lock() = permissions;
    }

    pub fn set_query_fails(&self, fails: bool) {
        self.query_fails.store(fails, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Flip the adapter as if the user toggled it in system settings.
    pub fn emit_state(&self, state: AdapterState) {
        self.enabled.store(state.is_enabled(), Ordering::SeqCst);
        let _ = self.state_tx.send(state);
    }

    /// Drop the link to a device as if the robot went away.
    pub fn emit_disconnect(&self, address: &str) {
        if let Some(device) = self.device(address) {
            device.drop_link();
        }
        let _ = self.disconnect_tx.send(address.to_string());
    }
}

fn broadcast_stream<T: Clone + Send + 'static>(
    rx: broadcast::Receiver<T>,
) -> BoxStream<'static, T> {
    futures::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(value) => return Some((value, rx)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

impl BluetoothPlatform for SimulatedPlatform {
    fn backend_name(&self) -> &'static str {
        "Simulated"
    }

    fn request_enabled(&self) -> BoxFuture<'_, BluetoothResult<bool>> {
        Box::pin(async move {
            self.enable_requests.fetch_add(1, Ordering::SeqCst);

            let behavior = *self.enable_behavior.lock();
            match behavior {
                EnableBehavior::Allow => {
                    if !self.is_enabled() {
                        self.emit_state(AdapterState::Enabled);
                    }
                    Ok(true)
                }
                EnableBehavior::Refuse => Ok(self.is_enabled()),
                EnableBehavior::Missing => Err(BluetoothError::AdapterUnavailable(
                    "no simulated adapter".to_string(),
                )),
            }
        })
    }

    fn request_permissions<'a>(
        &'a self,
        permissions: &'a [Permission],
    ) -> BoxFuture<'a, BluetoothResult<PermissionGrant>> {
        Box::pin(async move {
            let denied = self.denied.lock();
            Ok(PermissionGrant {
                denied: permissions
                    .iter()
                    .filter(|permission| denied.contains(permission))
                    .copied()
                    .collect(),
            })
        })
    }

    fn bonded_devices(&self) -> BoxFuture<'_, BluetoothResult<Vec<DeviceHandle>>> {
        Box::pin(async move {
            if self.query_fails.load(Ordering::SeqCst) {
                return Err(BluetoothError::DeviceQueryFailed(
                    "simulated query failure".to_string(),
                ));
            }
            Ok(self
                .devices
                .lock()
                .iter()
                .map(|device| device.clone() as DeviceHandle)
                .collect())
        })
    }

    fn state_changes(&self) -> BoxFuture<'_, BluetoothResult<BoxStream<'static, AdapterState>>> {
        let rx = self.state_tx.subscribe();
        Box::pin(async move { Ok(broadcast_stream(rx)) })
    }

    fn device_disconnections(
        &self,
    ) -> BoxFuture<'_, BluetoothResult<BoxStream<'static, String>>> {
        let rx = self.disconnect_tx.subscribe();
        Box::pin(async move { Ok(broadcast_stream(rx)) })
    }
}
