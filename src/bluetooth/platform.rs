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

//! Capabilities offered by a Bluetooth backend.

use anyhow::{bail, Result};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::bluez::BluezPlatform;
use super::simulated::SimulatedPlatform;
use crate::config::{BluetoothConfig, SimulatedConfig};
use crate::error::BluetoothResult;

/// Adapter power state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Disabled,
    Enabled,
}

impl AdapterState {
    pub fn from_enabled(enabled: bool) -> Self {
        if enabled {
            AdapterState::Enabled
        } else {
            AdapterState::Disabled
        }
    }

    pub fn is_enabled(&self) -> bool {
        *self == AdapterState::Enabled
    }
}

/// A paired device as listed by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceRecord {
    pub name: String,
    pub address: String,
}

impl DeviceRecord {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// Runtime permissions a platform may ask the user for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Connect,
    Scan,
    FineLocation,
}

impl Permission {
    pub const REQUIRED: [Permission; 3] =
        [Permission::Connect, Permission::Scan, Permission::FineLocation];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Connect => "bluetooth-connect",
            Permission::Scan => "bluetooth-scan",
            Permission::FineLocation => "fine-location",
        }
    }
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionGrant {
    pub denied: Vec<Permission>,
}

impl PermissionGrant {
    pub fn all_granted() -> Self {
        Self::default()
    }

    pub fn is_granted(&self) -> bool {
        self.denied.is_empty()
    }
}

/// A remote device with a serial write channel.
pub trait RemoteDevice: Send + Sync {
    /// Name and address, stable for the lifetime of the handle.
    fn record(&self) -> &DeviceRecord;

    /// Open the serial channel. `Ok(false)` means the platform refused.
    fn connect(&self) -> BoxFuture<'_, BluetoothResult<bool>>;

    /// Close the serial channel and drop the link.
    fn disconnect(&self) -> BoxFuture<'_, BluetoothResult<bool>>;

    /// Drop the local end of the serial channel without touching the link.
    ///
    /// Called when the link is already gone, so the next `connect` opens a
    /// fresh channel.
    fn release(&self) -> BoxFuture<'_, ()>;

    /// Write raw bytes to the serial channel.
    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, BluetoothResult<()>>;
}

pub type DeviceHandle = Arc<dyn RemoteDevice>;

/// The platform adapter.
pub trait BluetoothPlatform: Send + Sync {
    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;

    /// Ask for the adapter to be switched on. Returns the resulting power state.
    fn request_enabled(&self) -> BoxFuture<'_, BluetoothResult<bool>>;

    /// Ask for runtime permissions.
    fn request_permissions<'a>(
        &'a self,
        permissions: &'a [Permission],
    ) -> BoxFuture<'a, BluetoothResult<PermissionGrant>>;

    /// List already-paired devices.
    fn bonded_devices(&self) -> BoxFuture<'_, BluetoothResult<Vec<DeviceHandle>>>;

    /// Adapter power changes for the rest of the session.
    fn state_changes(&self) -> BoxFuture<'_, BluetoothResult<BoxStream<'static, AdapterState>>>;

    /// Addresses of devices whose link went down, for any device.
    fn device_disconnections(&self) -> BoxFuture<'_, BluetoothResult<BoxStream<'static, String>>>;
}

/// Create the backend selected in the configuration.
///
/// - "bluez": BlueZ over D-Bus, RFCOMM serial streams
/// - "simulated": in-process robot, no hardware needed
pub async fn create_platform(
    config: &BluetoothConfig,
    simulated: &SimulatedConfig,
) -> Result<Arc<dyn BluetoothPlatform>> {
    match config.backend.to_lowercase().as_str() {
        "simulated" => {
            info!("Using simulated Bluetooth backend");
            Ok(Arc::new(SimulatedPlatform::from_config(simulated)))
        }
        "bluez" => {
            info!("Using BlueZ Bluetooth backend");
            Ok(Arc::new(BluezPlatform::new(config).await?))
        }
        other => bail!("Unknown Bluetooth backend '{}'", other),
    }
}
