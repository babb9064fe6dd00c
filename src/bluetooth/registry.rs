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

//! Paired device registry.

use std::sync::Arc;
use tracing::{error, info};

use super::platform::{BluetoothPlatform, DeviceHandle};
use crate::error::{BluetoothError, BluetoothResult};
use crate::notice::{NoticeKind, Notifier};
use crate::state::AppState;

/// Keeps `AppState`'s device list in step with the platform's paired devices.
pub struct DeviceRegistry {
    platform: Arc<dyn BluetoothPlatform>,
    state: Arc<AppState>,
    notifier: Notifier,
}

impl DeviceRegistry {
    pub fn new(
        platform: Arc<dyn BluetoothPlatform>,
        state: Arc<AppState>,
        notifier: Notifier,
    ) -> Self {
        Self {
            platform,
            state,
            notifier,
        }
    }

    /// Re-read the paired devices and replace the list wholesale.
    ///
    /// On failure the previous list is kept and the user is told.
    pub async fn refresh(&self) -> BluetoothResult<usize> {
        match self.platform.bonded_devices().await {
            Ok(devices) => {
                let count = devices.len();
                info!("Found {} paired device(s)", count);
                self.state.replace_devices(devices);
                Ok(count)
            }
            Err(e) => {
                error!("Failed to fetch paired devices: {}", e);
                self.notifier.notify(
                    NoticeKind::DeviceQueryFailed,
                    "Failed to fetch paired devices, check that Bluetooth is enabled",
                );
                Err(match e {
                    BluetoothError::DeviceQueryFailed(_) => e,
                    other => BluetoothError::DeviceQueryFailed(other.to_string()),
                })
            }
        }
    }

    pub fn find(&self, address: &str) -> Option<DeviceHandle> {
        self.state.find_device(address)
    }

    /// Forget every listed device.
    pub fn clear(&self) {
        self.state.replace_devices(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{DeviceRecord, SimulatedPlatform};

    fn setup(
        devices: Vec<DeviceRecord>,
    ) -> (
        Arc<SimulatedPlatform>,
        Arc<AppState>,
        DeviceRegistry,
        async_channel::Receiver<crate::notice::Notice>,
    ) {
        let sim = Arc::new(SimulatedPlatform::new(devices));
        let state = AppState::new();
        let (notifier, rx) = Notifier::channel();
        let registry = DeviceRegistry::new(sim.clone(), state.clone(), notifier);
        (sim, state, registry, rx)
    }

    #[tokio::test]
    async fn test_refresh_lists_paired_devices() {
        let (_sim, state, registry, _rx) = setup(vec![
            DeviceRecord::new("RobotBT", "00:11:22:33:44:55"),
            DeviceRecord::new("Speaker", "AA:BB:CC:DD:EE:FF"),
        ]);

        assert_eq!(registry.refresh().await.unwrap(), 2);
        assert_eq!(state.device_records().len(), 2);
        assert!(registry.find("AA:BB:CC:DD:EE:FF").is_some());
    }

    #[tokio::test]
    async fn test_refresh_replaces_wholesale() {
        let (sim, state, registry, _rx) =
            setup(vec![DeviceRecord::new("Old", "00:00:00:00:00:01")]);
        registry.refresh().await.unwrap();

        sim.set_devices(vec![DeviceRecord::new("New", "00:00:00:00:00:02")]);
        registry.refresh().await.unwrap();

        assert_eq!(
            state.device_records(),
            vec![DeviceRecord::new("New", "00:00:00:00:00:02")]
        );
    }

    #[tokio::test]
    async fn test_failed_query_keeps_list() {
        let (sim, state, registry, rx) =
            setup(vec![DeviceRecord::new("RobotBT", "00:11:22:33:44:55")]);
        registry.refresh().await.unwrap();

        sim.set_query_fails(true);
        let err = registry.refresh().await.unwrap_err();
        assert!(matches!(err, BluetoothError::DeviceQueryFailed(_)));
        assert_eq!(state.device_records().len(), 1);

        let notice = rx.try_recv().unwrap();
        assert_eq!(notice.kind, NoticeKind::DeviceQueryFailed);
    }

    #[tokio::test]
    async fn test_clear() {
        let (_sim, state, registry, _rx) =
            setup(vec![DeviceRecord::new("RobotBT", "00:11:22:33:44:55")]);
        registry.refresh().await.unwrap();
        registry.clear();
        assert!(state.devices().is_empty());
    }
}
