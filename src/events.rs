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

//! Event processing and action dispatch.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bluetooth::{
    AdapterState, AdapterTracker, BluetoothPlatform, ConnectOutcome, ConnectionManager,
    DeviceRegistry,
};
use crate::config::Config;
use crate::control::CommandSender;
use crate::notice::Notifier;
use crate::state::AppState;
use crate::ui::TrayAction;

/// Events raised by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Adapter power changed.
    AdapterState(AdapterState),
    /// The link to a device went down, as seen by disconnect subscription
    /// `subscription`.
    PeerDisconnected { address: String, subscription: u64 },
}

/// Owns the Bluetooth components and routes events and user actions to them.
pub struct EventProcessor {
    state: Arc<AppState>,
    tracker: AdapterTracker,
    manager: Arc<ConnectionManager>,
    sender: CommandSender,
    event_tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventProcessor {
    pub fn new(
        config: &Config,
        platform: Arc<dyn BluetoothPlatform>,
        state: Arc<AppState>,
        notifier: Notifier,
        event_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new(
            platform.clone(),
            state.clone(),
            notifier.clone(),
        ));
        let manager = Arc::new(ConnectionManager::new(
            platform.clone(),
            state.clone(),
            notifier.clone(),
            event_tx.clone(),
        ));
        let tracker = AdapterTracker::new(
            platform,
            state.clone(),
            registry,
            manager.clone(),
            notifier.clone(),
            &config.bluetooth,
        );
        let sender = CommandSender::new(state.clone(), notifier, &config.control);

        Self {
            state,
            tracker,
            manager,
            sender,
            event_tx,
        }
    }

    pub fn tracker(&self) -> &AdapterTracker {
        &self.tracker
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Subscribe to adapter changes, then bring the adapter up.
    ///
    /// Initialization failures are reported as notices; the user retries
    /// from the menu.
    pub async fn start(&self) {
        if let Err(e) = self.tracker.subscribe(self.event_tx.clone()).await {
            warn!("Cannot follow adapter state: {}", e);
        }
        if let Err(e) = self.tracker.initialize().await {
            warn!("Bluetooth initialization incomplete: {}", e);
        }
    }

    /// Process a single platform event.
    pub async fn process_event(&self, event: AppEvent) {
        match event {
            AppEvent::AdapterState(state) => {
                debug!("Adapter state event: {:?}", state);
                self.tracker.handle_state_change(state).await;
            }
            AppEvent::PeerDisconnected {
                address,
                subscription,
            } => {
                self.manager
                    .handle_peer_disconnect(&address, subscription)
                    .await;
            }
        }
    }

    /// Handle a user action. Returns false when the application should quit.
    pub async fn handle_action(&self, action: TrayAction) -> bool {
        match action {
            TrayAction::Connect(address) => {
                if self.manager.connect_address(&address).await == ConnectOutcome::Connected {
                    self.sender.on_connected().await;
                }
            }
            TrayAction::Disconnect => {
                self.manager.disconnect().await;
            }
            TrayAction::RefreshDevices => {
                let _ = self.tracker.refresh_devices().await;
            }
            TrayAction::RetryBluetooth => {
                let _ = self.tracker.retry().await;
            }
            TrayAction::Send(command) => {
                self.sender.send(command).await;
            }
            TrayAction::SetMode(mode) => {
                self.sender.set_mode(mode).await;
            }
            TrayAction::Quit => {
                info!("Quit requested");
                return false;
            }
        }
        true
    }

    /// Stop following the platform and drop the connection.
    pub async fn shutdown(&self) {
        self.tracker.unsubscribe();
        if self.state.is_connected() {
            self.manager.disconnect().await;
        }
        info!("Bluetooth shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{DeviceRecord, SimulatedPlatform};
    use crate::control::DriveMode;
    use crate::notice::{Notice, NoticeKind};

    const ROBOT: &str = "00:11:22:33:44:55";

    struct Harness {
        sim: Arc<SimulatedPlatform>,
        state: Arc<AppState>,
        processor: EventProcessor,
        notices: async_channel::Receiver<Notice>,
        events: mpsc::UnboundedReceiver<AppEvent>,
    }

    impl Harness {
        /// Feed every queued platform event back through the processor.
        async fn drain_events(&mut self) {
            // Let forwarding tasks catch up first.
            for _ in 0..8 {
                tokio::task::yield_now().await;
            }
            while let Ok(event) = self.events.try_recv() {
                self.processor.process_event(event).await;
            }
        }

        fn notice_kinds(&self) -> Vec<NoticeKind> {
            let mut kinds = Vec::new();
            while let Ok(notice) = self.notices.try_recv() {
                kinds.push(notice.kind);
            }
            kinds
        }
    }

    fn setup() -> Harness {
        let sim = Arc::new(SimulatedPlatform::new(vec![DeviceRecord::new(
            "RobotBT", ROBOT,
        )]));
        let state = AppState::new();
        let (notifier, notices) = Notifier::channel();
        let (event_tx, events) = mpsc::unbounded_channel();
        let processor =
            EventProcessor::new(&Config::default(), sim.clone(), state.clone(), notifier, event_tx);
        Harness {
            sim,
            state,
            processor,
            notices,
            events,
        }
    }

    #[tokio::test]
    async fn test_connect_action_sends_manual_mode() {
        let h = setup();
        h.processor.start().await;
        h.state.set_drive_mode(DriveMode::Auto);

        assert!(h.processor.handle_action(TrayAction::Connect(ROBOT.to_string())).await);
        assert!(h.state.is_connected());
        assert_eq!(h.state.drive_mode(), DriveMode::Manual);
        assert_eq!(h.sim.device(ROBOT).unwrap().written(), vec!["M"]);
    }

    #[tokio::test]
    async fn test_peer_disconnect_event() {
        let mut h = setup();
        h.processor.start().await;
        h.processor
            .handle_action(TrayAction::Connect(ROBOT.to_string()))
            .await;
        h.drain_events().await;
        h.notice_kinds();

        h.sim.emit_disconnect(ROBOT);
        h.drain_events().await;
        assert!(!h.state.is_connected());
        assert_eq!(h.notice_kinds(), vec![NoticeKind::AutoDisconnected]);
    }

    #[tokio::test]
    async fn test_user_disconnect_is_not_reported_as_drop() {
        let mut h = setup();
        h.processor.start().await;
        h.processor
            .handle_action(TrayAction::Connect(ROBOT.to_string()))
            .await;
        h.drain_events().await;
        h.notice_kinds();

        h.processor.handle_action(TrayAction::Disconnect).await;
        h.drain_events().await;
        assert!(!h.state.is_connected());
        assert_eq!(h.notice_kinds(), vec![NoticeKind::Disconnected]);
    }

    #[tokio::test]
    async fn test_adapter_event_refreshes_devices() {
        let h = setup();

        h.processor
            .process_event(AppEvent::AdapterState(AdapterState::Enabled))
            .await;
        assert_eq!(h.state.device_records().len(), 1);
    }

    #[tokio::test]
    async fn test_quit_action() {
        let h = setup();
        assert!(!h.processor.handle_action(TrayAction::Quit).await);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects() {
        let h = setup();
        h.processor.start().await;
        h.processor
            .handle_action(TrayAction::Connect(ROBOT.to_string()))
            .await;

        h.processor.shutdown().await;
        assert!(!h.state.is_connected());
        assert!(!h.sim.device(ROBOT).unwrap().is_connected());
        assert!(!h.processor.tracker().is_subscribed());
    }
}
