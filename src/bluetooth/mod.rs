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

//! Bluetooth communication module.
//!
//! Classic Bluetooth serial links to paired robots: adapter availability,
//! the paired device list and the lifecycle of the one active connection.

mod adapter;
mod bluez;
mod listener;
mod manager;
mod platform;
mod registry;
mod simulated;

pub use adapter::AdapterTracker;
pub use bluez::BluezPlatform;
pub use listener::{DisconnectSubscription, StateSubscription};
pub use manager::{ConnectOutcome, ConnectionManager};
pub use platform::{
    create_platform, AdapterState, BluetoothPlatform, DeviceHandle, DeviceRecord, Permission,
    PermissionGrant, RemoteDevice,
};
pub use registry::DeviceRegistry;
pub use simulated::{ConnectBehavior, EnableBehavior, SimulatedDevice, SimulatedPlatform};
