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

//! Connection lifecycle.
//!
//! Connect and disconnect the selected robot, and react to the robot
//! dropping the link on its own. At most one device is selected and at most
//! one disconnect subscription is live at any time.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::listener::DisconnectSubscription;
use super::platform::{BluetoothPlatform, DeviceHandle, DeviceRecord};
use crate::events::AppEvent;
use crate::notice::{NoticeKind, Notifier};
use crate::state::AppState;

/// Result of a connect request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    Failed,
    /// Another attempt was in flight, or the device was already selected.
    Ignored,
}

/// Releases the connect slot however the attempt ends.
struct ConnectAttempt<'a> {
    state: &'a AppState,
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        self.state.finish_connect();
    }
}

/// Connection manager.
pub struct ConnectionManager {
    platform: Arc<dyn BluetoothPlatform>,
    state: Arc<AppState>,
    notifier: Notifier,
    event_tx: mpsc::UnboundedSender<AppEvent>,
    listener: Mutex<Option<DisconnectSubscription>>,
    next_listener_id: AtomicU64,
}

impl ConnectionManager {
    pub fn new(
        platform: Arc<dyn BluetoothPlatform>,
        state: Arc<AppState>,
        notifier: Notifier,
        event_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            platform,
            state,
            notifier,
            event_tx,
            listener: Mutex::new(None),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// Connect to a listed device by address.
    pub async fn connect_address(&self, address: &str) -> ConnectOutcome {
        match self.state.find_device(address) {
            Some(device) => self.connect(device).await,
            None => {
                warn!("Device {} is not in the paired list", address);
                self.notifier.notify(
                    NoticeKind::ConnectFailed,
                    format!("Failed to connect to {}", address),
                );
                ConnectOutcome::Failed
            }
        }
    }

    /// Connect to a device.
    ///
    /// Ignored while another attempt is in flight or when the device is
    /// already selected. A failed attempt leaves the selection untouched.
    /// An attempt overtaken by [`invalidate`](Self::invalidate) fails and
    /// releases whatever link it opened.
    pub async fn connect(&self, device: DeviceHandle) -> ConnectOutcome {
        let record = device.record().clone();

        let Some(epoch) = self.state.try_begin_connect(&record.address) else {
            debug!("Ignoring connect to {}, attempt in flight or already connected", record);
            return ConnectOutcome::Ignored;
        };
        let _attempt = ConnectAttempt { state: &self.state };

        info!("Connecting to {}", record);
        match device.connect().await {
            Ok(true) => {
                let previous = match self.state.select_if_current(epoch, device) {
                    Ok(previous) => previous,
                    Err(device) => {
                        warn!("Connection to {} was invalidated while connecting", record);
                        device.release().await;
                        self.notify_connect_failed(&record);
                        return ConnectOutcome::Failed;
                    }
                };
                if let Some(previous) = previous {
                    self.close_previous(previous).await;
                }

                self.arm_listener(&record).await;
                if !self.state.is_current(epoch) {
                    // Invalidated while arming; the selection is already gone.
                    self.retire_listener();
                    self.notify_connect_failed(&record);
                    return ConnectOutcome::Failed;
                }

                info!("Connected to {}", record);
                self.notifier
                    .notify(NoticeKind::Connected, format!("Connected to {}", record.name));
                ConnectOutcome::Connected
            }
            Ok(false) => {
                warn!("Platform refused connection to {}", record);
                self.notify_connect_failed(&record);
                ConnectOutcome::Failed
            }
            Err(e) => {
                error!("Connection to {} failed: {}", record, e);
                self.notify_connect_failed(&record);
                ConnectOutcome::Failed
            }
        }
    }

    /// Disconnect the selected device.
    ///
    /// The selection is cleared and the disconnect subscription retired
    /// before the platform call, so the platform's report of our own
    /// disconnect is never taken for the robot dropping the link. Returns
    /// false when nothing was selected.
    pub async fn disconnect(&self) -> bool {
        let Some(device) = self.state.clear_selection() else {
            debug!("Disconnect requested with no device selected");
            return false;
        };
        self.retire_listener();
        let record = device.record().clone();

        info!("Disconnecting from {}", record);
        match device.disconnect().await {
            Ok(true) => {
                self.notifier
                    .notify(NoticeKind::Disconnected, "Disconnected from device");
            }
            Ok(false) => {
                warn!("Platform refused to disconnect {}", record);
                device.release().await;
                self.notify_disconnect_failed();
            }
            Err(e) => {
                error!("Disconnect from {} failed: {}", record, e);
                device.release().await;
                self.notify_disconnect_failed();
            }
        }
        true
    }

    /// React to a link-down event from disconnect subscription `subscription`.
    ///
    /// Only an event from the live subscription for the selected device
    /// counts. Returns true when the connection was reset.
    pub async fn handle_peer_disconnect(&self, address: &str, subscription: u64) -> bool {
        if self.listener_id() != Some(subscription) {
            debug!(
                "Ignoring disconnect of {} from retired subscription {}",
                address, subscription
            );
            return false;
        }
        let Some(record) = self.state.selected_record() else {
            debug!("Ignoring disconnect of {}, nothing selected", address);
            return false;
        };
        if record.address != address {
            debug!("Ignoring disconnect of {}, selected is {}", address, record);
            return false;
        }

        info!("{} dropped the connection", record);
        self.reset_connection().await;
        self.notifier.notify(
            NoticeKind::AutoDisconnected,
            format!("Automatically disconnected from {}", record.name),
        );
        true
    }

    /// Forget the selected device, retire its disconnect subscription and
    /// release its local channel.
    ///
    /// Used once the link is already down; no disconnect is sent.
    pub async fn reset_connection(&self) -> Option<DeviceHandle> {
        let previous = self.state.clear_selection();
        self.retire_listener();
        self.release(previous).await
    }

    /// Like [`reset_connection`](Self::reset_connection), and also fail any
    /// connect still in flight.
    pub async fn invalidate(&self) -> Option<DeviceHandle> {
        let previous = self.state.invalidate_connection();
        self.retire_listener();
        self.release(previous).await
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }

    /// Address the live disconnect subscription was armed for.
    pub fn listener_address(&self) -> Option<String> {
        self.listener
            .lock()
            .as_ref()
            .map(|listener| listener.address().to_string())
    }

    /// Id of the live disconnect subscription.
    pub fn listener_id(&self) -> Option<u64> {
        self.listener.lock().as_ref().map(DisconnectSubscription::id)
    }

    async fn release(&self, device: Option<DeviceHandle>) -> Option<DeviceHandle> {
        if let Some(device) = &device {
            device.release().await;
        }
        device
    }

    async fn arm_listener(&self, record: &DeviceRecord) {
        self.retire_listener();

        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        match DisconnectSubscription::arm(&self.platform, &record.address, id, self.event_tx.clone())
            .await
        {
            Ok(listener) => {
                // A listener armed meanwhile is dropped here.
                let _ = self.listener.lock().replace(listener);
            }
            Err(e) => warn!("Cannot watch {} for disconnects: {}", record, e),
        }
    }

    fn retire_listener(&self) {
        let listener = self.listener.lock().take();
        drop(listener);
    }

    async fn close_previous(&self, previous: DeviceHandle) {
        let record = previous.record().clone();
        self.retire_listener();

        info!("Closing previous connection to {}", record);
        match previous.disconnect().await {
            Ok(true) => {}
            Ok(false) => {
                warn!("Platform refused to close previous connection to {}", record);
                previous.release().await;
            }
            Err(e) => {
                warn!("Failed to close previous connection to {}: {}", record, e);
                previous.release().await;
            }
        }
    }

    fn notify_connect_failed(&self, record: &DeviceRecord) {
        self.notifier.notify(
            NoticeKind::ConnectFailed,
            format!("Failed to connect to {}", record.name),
        );
    }

    fn notify_disconnect_failed(&self) {
        self.notifier.notify(
            NoticeKind::DisconnectFailed,
            "Failed to disconnect from device, try restarting the app",
        );
    }
}
