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

//! Application state management.
//!
//! Every field has exactly one setter. Components hold an `Arc<AppState>`
//! and never keep their own copy of adapter, registry or connection state.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::bluetooth::{AdapterState, DeviceHandle, DeviceRecord};
use crate::control::DriveMode;
use crate::notice::Notice;

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "Disconnected",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
        }
    }

    pub fn icon_name(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "network-offline",
            ConnectionStatus::Connecting => "network-idle",
            ConnectionStatus::Connected => "network-transmit-receive",
        }
    }
}

/// Selected device and the connect-in-flight flag, guarded together.
///
/// `epoch` moves on every invalidation; a connect that started under an
/// older epoch may not select its device.
#[derive(Default)]
struct ConnectionSlot {
    selected: Option<DeviceHandle>,
    connecting: bool,
    epoch: u64,
}

/// Shared application state.
pub struct AppState {
    adapter: RwLock<AdapterState>,
    devices: RwLock<Vec<DeviceHandle>>,
    connection: RwLock<ConnectionSlot>,
    drive_mode: RwLock<DriveMode>,
    last_notice: RwLock<Option<Notice>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            adapter: RwLock::new(AdapterState::Disabled),
            devices: RwLock::new(Vec::new()),
            connection: RwLock::new(ConnectionSlot::default()),
            drive_mode: RwLock::new(DriveMode::Manual),
            last_notice: RwLock::new(None),
        }
    }
}

impl AppState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // Adapter

    pub fn set_adapter_state(&self, state: AdapterState) {
        *self.adapter.write() = state;
    }

    pub fn adapter_state(&self) -> AdapterState {
        *self.adapter.read()
    }

    // Registry

    /// Replace the paired device list wholesale.
    pub fn replace_devices(&self, devices: Vec<DeviceHandle>) {
        *self.devices.write() = devices;
    }

    pub fn devices(&self) -> Vec<DeviceHandle> {
        self.devices.read().clone()
    }

    pub fn device_records(&self) -> Vec<DeviceRecord> {
        self.devices
            .read()
            .iter()
            .map(|device| device.record().clone())
            .collect()
    }

    pub fn find_device(&self, address: &str) -> Option<DeviceHandle> {
        self.devices
            .read()
            .iter()
            .find(|device| device.record().address == address)
            .cloned()
    }

    // Connection

    /// Claim the connect slot for `address`, returning the current epoch.
    ///
    /// Fails when an attempt is already in flight or the device is already
    /// selected. Check and claim happen under one lock.
    pub fn try_begin_connect(&self, address: &str) -> Option<u64> {
        let mut slot = self.connection.write();
        let already_selected = slot
            .selected
            .as_ref()
            .map(|device| device.record().address == address)
            .unwrap_or(false);

        if slot.connecting || already_selected {
            return None;
        }
        slot.connecting = true;
        Some(slot.epoch)
    }

    /// Release the connect slot.
    pub fn finish_connect(&self) {
        self.connection.write().connecting = false;
    }

    /// Record a successfully connected device.
    pub fn select_device(&self, device: DeviceHandle) {
        self.connection.write().selected = Some(device);
    }

    /// Select `device` if nothing invalidated the connection since `epoch`.
    ///
    /// On success the previous selection is returned so the caller can close
    /// it. On a stale epoch the device is handed back untouched.
    pub fn select_if_current(
        &self,
        epoch: u64,
        device: DeviceHandle,
    ) -> Result<Option<DeviceHandle>, DeviceHandle> {
        let mut slot = self.connection.write();
        if slot.epoch != epoch {
            return Err(device);
        }
        Ok(slot.selected.replace(device))
    }

    /// Whether the connection was invalidated since `epoch`.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.connection.read().epoch == epoch
    }

    /// Forget the selected device, returning it.
    pub fn clear_selection(&self) -> Option<DeviceHandle> {
        self.connection.write().selected.take()
    }

    /// Forget the selected device and fence off any connect in flight.
    pub fn invalidate_connection(&self) -> Option<DeviceHandle> {
        let mut slot = self.connection.write();
        slot.epoch = slot.epoch.wrapping_add(1);
        slot.selected.take()
    }

    pub fn selected_device(&self) -> Option<DeviceHandle> {
        self.connection.read().selected.clone()
    }

    pub fn selected_record(&self) -> Option<DeviceRecord> {
        self.connection
            .read()
            .selected
            .as_ref()
            .map(|device| device.record().clone())
    }

    pub fn is_connecting(&self) -> bool {
        self.connection.read().connecting
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().selected.is_some()
    }

    pub fn get_status(&self) -> ConnectionStatus {
        let slot = self.connection.read();
        if slot.selected.is_some() {
            ConnectionStatus::Connected
        } else if slot.connecting {
            ConnectionStatus::Connecting
        } else {
            ConnectionStatus::Disconnected
        }
    }

    // Control

    pub fn set_drive_mode(&self, mode: DriveMode) {
        *self.drive_mode.write() = mode;
    }

    pub fn drive_mode(&self) -> DriveMode {
        *self.drive_mode.read()
    }

    // Notices

    pub fn set_last_notice(&self, notice: Notice) {
        *self.last_notice.write() = Some(notice);
    }

    pub fn last_notice(&self) -> Option<Notice> {
        self.last_notice.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::SimulatedDevice;

    fn handle(name: &str, address: &str) -> DeviceHandle {
        Arc::new(SimulatedDevice::new(DeviceRecord::new(name, address)))
    }

    #[test]
    fn test_initial_state() {
        let state = AppState::new();
        assert_eq!(state.adapter_state(), AdapterState::Disabled);
        assert_eq!(state.get_status(), ConnectionStatus::Disconnected);
        assert!(state.devices().is_empty());
        assert!(state.selected_device().is_none());
        assert_eq!(state.drive_mode(), DriveMode::Manual);
    }

    #[test]
    fn test_connect_slot_is_exclusive() {
        let state = AppState::new();

        assert!(state.try_begin_connect("AA").is_some());
        assert_eq!(state.get_status(), ConnectionStatus::Connecting);
        assert!(state.try_begin_connect("AA").is_none());
        assert!(state.try_begin_connect("BB").is_none());

        state.finish_connect();
        assert!(state.try_begin_connect("BB").is_some());
    }

    #[test]
    fn test_selected_device_blocks_reconnect() {
        let state = AppState::new();
        state.select_device(handle("RobotBT", "AA"));

        assert_eq!(state.get_status(), ConnectionStatus::Connected);
        assert!(state.try_begin_connect("AA").is_none());
        assert!(state.try_begin_connect("BB").is_some());
    }

    #[test]
    fn test_select_returns_previous() {
        let state = AppState::new();
        state.select_device(handle("One", "AA"));

        let epoch = state.try_begin_connect("BB").unwrap();
        let previous = state
            .select_if_current(epoch, handle("Two", "BB"))
            .ok()
            .flatten()
            .unwrap();
        assert_eq!(previous.record().address, "AA");
        assert_eq!(state.selected_record().unwrap().address, "BB");
    }

    #[test]
    fn test_invalidation_fences_connect_in_flight() {
        let state = AppState::new();
        let epoch = state.try_begin_connect("AA").unwrap();

        assert!(state.invalidate_connection().is_none());
        assert!(!state.is_current(epoch));

        let rejected = state.select_if_current(epoch, handle("RobotBT", "AA"));
        assert_eq!(rejected.err().unwrap().record().address, "AA");
        assert!(!state.is_connected());

        state.finish_connect();
        let epoch = state.try_begin_connect("AA").unwrap();
        assert!(state.select_if_current(epoch, handle("RobotBT", "AA")).is_ok());
        assert!(state.is_connected());
    }

    #[test]
    fn test_clear_selection() {
        let state = AppState::new();
        state.select_device(handle("RobotBT", "AA"));

        let previous = state.clear_selection().unwrap();
        assert_eq!(previous.record().address, "AA");
        assert!(state.clear_selection().is_none());
        assert_eq!(state.get_status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_replace_devices_is_wholesale() {
        let state = AppState::new();
        state.replace_devices(vec![handle("One", "AA"), handle("Two", "BB")]);
        state.replace_devices(vec![handle("Three", "CC")]);

        let records = state.device_records();
        assert_eq!(records, vec![DeviceRecord::new("Three", "CC")]);
        assert!(state.find_device("AA").is_none());
        assert!(state.find_device("CC").is_some());
    }
}
