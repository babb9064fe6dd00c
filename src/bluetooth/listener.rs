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

//! Owned platform event subscriptions.
//!
//! A subscription is a task forwarding a platform stream into the event
//! loop. Dropping the subscription aborts the task, so holding it in an
//! `Option` is enough to guarantee at most one live subscription.

use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::platform::{AdapterState, BluetoothPlatform};
use crate::error::BluetoothResult;
use crate::events::AppEvent;

/// Forwarding task that is aborted on drop.
struct ForwardTask {
    handle: JoinHandle<()>,
}

impl ForwardTask {
    fn spawn<T, F>(
        mut stream: BoxStream<'static, T>,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        wrap: F,
    ) -> Self
    where
        T: Send + 'static,
        F: Fn(T) -> AppEvent + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                if event_tx.send(wrap(item)).is_err() {
                    debug!("Event loop gone, stopping subscription");
                    break;
                }
            }
        });
        Self { handle }
    }
}

impl Drop for ForwardTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Peer-disconnect subscription armed for one connected device.
pub struct DisconnectSubscription {
    id: u64,
    address: String,
    _task: ForwardTask,
}

impl DisconnectSubscription {
    /// Subscribe to the platform's disconnect events on behalf of `address`.
    ///
    /// The platform reports disconnects for every device; filtering against
    /// the selected device happens when the event is handled. Every event is
    /// tagged with `id` so events queued by a retired subscription can be
    /// told apart from live ones.
    pub async fn arm(
        platform: &Arc<dyn BluetoothPlatform>,
        address: &str,
        id: u64,
        event_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> BluetoothResult<Self> {
        let stream = platform.device_disconnections().await?;
        info!("Watching for disconnects of {} (subscription {})", address, id);

        Ok(Self {
            id,
            address: address.to_string(),
            _task: ForwardTask::spawn(stream, event_tx, move |address| {
                AppEvent::PeerDisconnected {
                    address,
                    subscription: id,
                }
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Drop for DisconnectSubscription {
    fn drop(&mut self) {
        debug!(
            "Retired disconnect subscription {} for {}",
            self.id, self.address
        );
    }
}

/// Adapter power subscription for the lifetime of the session.
pub struct StateSubscription {
    _task: ForwardTask,
}

impl StateSubscription {
    pub async fn subscribe(
        platform: &Arc<dyn BluetoothPlatform>,
        event_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> BluetoothResult<Self> {
        let stream = platform.state_changes().await?;
        info!("Watching adapter state");

        Ok(Self {
            _task: ForwardTask::spawn(stream, event_tx, AppEvent::AdapterState),
        })
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        debug!("Adapter state subscription closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{DeviceRecord, SimulatedPlatform};
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_forwards_disconnects() {
        let sim = Arc::new(SimulatedPlatform::new(vec![DeviceRecord::new(
            "RobotBT",
            "00:11:22:33:44:55",
        )]));
        let platform: Arc<dyn BluetoothPlatform> = sim.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = DisconnectSubscription::arm(&platform, "00:11:22:33:44:55", 7, tx)
            .await
            .unwrap();
        assert_eq!(subscription.address(), "00:11:22:33:44:55");
        assert_eq!(subscription.id(), 7);

        sim.emit_disconnect("00:11:22:33:44:55");
        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(
            event,
            Some(AppEvent::PeerDisconnected {
                address: "00:11:22:33:44:55".to_string(),
                subscription: 7,
            })
        );
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_forwarding() {
        let sim = Arc::new(SimulatedPlatform::default());
        let platform: Arc<dyn BluetoothPlatform> = sim.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = DisconnectSubscription::arm(&platform, "AA", 1, tx).await.unwrap();
        drop(subscription);

        sim.emit_disconnect("AA");
        // Sender was owned by the aborted task, so the channel closes.
        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(event.is_none());
    }

    #[tokio::test]
    async fn test_forwards_adapter_state() {
        let sim = Arc::new(SimulatedPlatform::default());
        let platform: Arc<dyn BluetoothPlatform> = sim.clone();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let _subscription = StateSubscription::subscribe(&platform, tx).await.unwrap();
        sim.emit_state(AdapterState::Enabled);

        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert!(matches!(event, Some(AppEvent::AdapterState(AdapterState::Enabled))));
    }
}
