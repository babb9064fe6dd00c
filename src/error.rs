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

//! Bluetooth error taxonomy.

use thiserror::Error;

/// Failures of the Bluetooth layer.
///
/// None of these are fatal: every call site catches them, logs them and
/// turns them into a user-visible notice.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BluetoothError {
    #[error("Bluetooth adapter is not available: {0}")]
    AdapterUnavailable(String),

    #[error("Bluetooth permissions were denied: {0}")]
    PermissionDenied(String),

    #[error("Failed to query paired devices: {0}")]
    DeviceQueryFailed(String),

    #[error("Failed to connect to {name}: {reason}")]
    ConnectFailed { name: String, reason: String },

    #[error("Failed to disconnect from {name}: {reason}")]
    DisconnectFailed { name: String, reason: String },

    #[error("Failed to write to {name}: {reason}")]
    WriteFailed { name: String, reason: String },

    #[error("No device is connected")]
    NotConnected,

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Bluetooth backend error: {0}")]
    Backend(String),
}

impl From<bluer::Error> for BluetoothError {
    fn from(err: bluer::Error) -> Self {
        BluetoothError::Backend(err.to_string())
    }
}

impl From<std::io::Error> for BluetoothError {
    fn from(err: std::io::Error) -> Self {
        BluetoothError::Backend(err.to_string())
    }
}

pub type BluetoothResult<T> = std::result::Result<T, BluetoothError>;
