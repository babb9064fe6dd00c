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

//! Adapter availability tracking.
//!
//! Brings the adapter up at startup, asks for runtime permissions, and
//! follows power changes for the rest of the session.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::listener::StateSubscription;
use super::manager::ConnectionManager;
use super::platform::{AdapterState, BluetoothPlatform, Permission};
use super::registry::DeviceRegistry;
use crate::config::{AdapterPolicy, BluetoothConfig, RetryConfig};
use crate::error::{BluetoothError, BluetoothResult};
use crate::events::AppEvent;
use crate::notice::{NoticeKind, Notifier};
use crate::state::AppState;

/// Adapter tracker.
pub struct AdapterTracker {
    platform: Arc<dyn BluetoothPlatform>,
    state: Arc<AppState>,
    registry: Arc<DeviceRegistry>,
    manager: Arc<ConnectionManager>,
    notifier: Notifier,
    policy: AdapterPolicy,
    retry: RetryConfig,
    subscription: Mutex<Option<StateSubscription>>,
}

impl AdapterTracker {
    pub fn new(
        platform: Arc<dyn BluetoothPlatform>,
        state: Arc<AppState>,
        registry: Arc<DeviceRegistry>,
        manager: Arc<ConnectionManager>,
        notifier: Notifier,
        config: &BluetoothConfig,
    ) -> Self {
        Self {
            platform,
            state,
            registry,
            manager,
            notifier,
            policy: config.adapter_policy,
            retry: config.enable_retry.clone(),
            subscription: Mutex::new(None),
        }
    }

    /// Enable the adapter, request permissions, then list paired devices.
    ///
    /// Every failure is reported to the user before it is returned.
    pub async fn initialize(&self) -> BluetoothResult<()> {
        info!("Initializing {} adapter", self.platform.backend_name());

        match self.request_enabled_with_retry().await {
            Ok(true) => self.state.set_adapter_state(AdapterState::Enabled),
            Ok(false) => {
                self.state.set_adapter_state(AdapterState::Disabled);
                self.notifier.notify(
                    NoticeKind::AdapterUnavailable,
                    "Bluetooth must be enabled to connect to the robot",
                );
                return Err(BluetoothError::AdapterUnavailable(
                    "enable request was declined".to_string(),
                ));
            }
            Err(e) => {
                error!("Bluetooth adapter unavailable: {}", e);
                self.state.set_adapter_state(AdapterState::Disabled);
                self.notifier.notify(
                    NoticeKind::AdapterUnavailable,
                    "Bluetooth is not available on this device",
                );
                return Err(e);
            }
        }

        self.request_permissions().await?;
        self.registry.refresh().await?;
        Ok(())
    }

    /// Start following adapter power changes.
    ///
    /// Replaces any earlier subscription.
    pub async fn subscribe(
        &self,
        event_tx: mpsc::UnboundedSender<AppEvent>,
    ) -> BluetoothResult<()> {
        let subscription = StateSubscription::subscribe(&self.platform, event_tx).await?;
        let _ = self.subscription.lock().replace(subscription);
        Ok(())
    }

    pub fn unsubscribe(&self) {
        let subscription = self.subscription.lock().take();
        drop(subscription);
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    /// Apply an adapter power change reported by the platform.
    pub async fn handle_state_change(&self, new_state: AdapterState) {
        let previous = self.state.adapter_state();
        self.state.set_adapter_state(new_state);

        match new_state {
            AdapterState::Enabled => {
                if previous.is_enabled() {
                    debug!("Adapter already enabled");
                    return;
                }
                info!("Bluetooth adapter enabled");
                // A failed refresh is already reported.
                let _ = self.registry.refresh().await;
            }
            AdapterState::Disabled => {
                if !previous.is_enabled() {
                    debug!("Adapter already disabled");
                    return;
                }
                match self.policy {
                    AdapterPolicy::Strict => {
                        warn!("Bluetooth adapter disabled, dropping devices and connection");
                        self.manager.invalidate().await;
                        self.registry.clear();
                        self.notifier.notify(
                            NoticeKind::AdapterUnavailable,
                            "Bluetooth was turned off",
                        );
                    }
                    AdapterPolicy::Lenient => {
                        info!("Bluetooth adapter disabled, keeping device list and asking to re-enable");
                        if !self.ensure_enabled().await {
                            warn!("Adapter stays disabled until the next refresh");
                        }
                    }
                }
            }
        }
    }

    /// Make sure the adapter is on before touching devices.
    ///
    /// The lenient policy re-requests enablement silently, both here and as
    /// soon as the adapter goes off. The strict policy leaves that to an
    /// explicit retry.
    pub async fn ensure_enabled(&self) -> bool {
        if self.state.adapter_state().is_enabled() {
            return true;
        }
        if self.policy == AdapterPolicy::Strict {
            return false;
        }

        match self.request_enabled_with_retry().await {
            Ok(enabled) => {
                self.state
                    .set_adapter_state(AdapterState::from_enabled(enabled));
                enabled
            }
            Err(e) => {
                warn!("Silent enable request failed: {}", e);
                false
            }
        }
    }

    /// Refresh the device list if the adapter is (or can be made) available.
    pub async fn refresh_devices(&self) -> BluetoothResult<usize> {
        if !self.ensure_enabled().await {
            self.notifier.notify(
                NoticeKind::AdapterUnavailable,
                "Bluetooth must be enabled to list paired devices",
            );
            return Err(BluetoothError::AdapterUnavailable(
                "adapter is disabled".to_string(),
            ));
        }
        self.registry.refresh().await
    }

    /// Run initialization again after a failure.
    pub async fn retry(&self) -> BluetoothResult<()> {
        info!("Retrying Bluetooth initialization");
        self.initialize().await
    }

    async fn request_enabled_with_retry(&self) -> BluetoothResult<bool> {
        let mut last = Ok(false);

        for attempt in 1..=self.retry.max_attempts {
            let delay = self.retry.backoff(attempt);
            if !delay.is_zero() {
                debug!("Waiting {:?} before enable attempt {}", delay, attempt);
                tokio::time::sleep(delay).await;
            }

            match self.platform.request_enabled().await {
                Ok(true) => return Ok(true),
                Ok(false) => {
                    warn!(
                        "Adapter still disabled (attempt {}/{})",
                        attempt, self.retry.max_attempts
                    );
                    last = Ok(false);
                }
                Err(e) => {
                    warn!(
                        "Enable request failed (attempt {}/{}): {}",
                        attempt, self.retry.max_attempts, e
                    );
                    last = Err(e);
                }
            }
        }
        last
    }

    async fn request_permissions(&self) -> BluetoothResult<()> {
        let grant = match self.platform.request_permissions(&Permission::REQUIRED).await {
            Ok(grant) => grant,
            Err(e) => {
                error!("Permission request failed: {}", e);
                self.notifier.notify(
                    NoticeKind::PermissionDenied,
                    "Bluetooth permissions could not be requested",
                );
                return Err(BluetoothError::PermissionDenied(e.to_string()));
            }
        };

        if grant.is_granted() {
            debug!("All Bluetooth permissions granted");
            return Ok(());
        }

        let denied = grant
            .denied
            .iter()
            .map(|permission| permission.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        self.notifier.notify(
            NoticeKind::PermissionDenied,
            format!("Bluetooth permissions are required: {}", denied),
        );
        Err(BluetoothError::PermissionDenied(denied))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{ConnectOutcome, DeviceRecord, EnableBehavior, SimulatedPlatform};
    use crate::notice::Notice;
    use std::time::Duration;
    use tokio::time::timeout;

    const ROBOT: &str = "00:11:22:33:44:55";

    struct Harness {
        sim: Arc<SimulatedPlatform>,
        state: Arc<AppState>,
        manager: Arc<ConnectionManager>,
        tracker: AdapterTracker,
        notices: async_channel::Receiver<Notice>,
        event_tx: mpsc::UnboundedSender<AppEvent>,
        events: mpsc::UnboundedReceiver<AppEvent>,
    }

    impl Harness {
        fn new(policy: AdapterPolicy) -> Self {
            let sim = Arc::new(SimulatedPlatform::new(vec![DeviceRecord::new(
                "RobotBT", ROBOT,
            )]));
            let platform: Arc<dyn BluetoothPlatform> = sim.clone();
            let state = AppState::new();
            let (notifier, notices) = Notifier::channel();
            let (event_tx, events) = mpsc::unbounded_channel();

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
            let config = BluetoothConfig {
                adapter_policy: policy,
                enable_retry: RetryConfig {
                    max_attempts: 3,
                    initial_backoff_ms: 1,
                },
                ..Default::default()
            };
            let tracker = AdapterTracker::new(
                platform,
                state.clone(),
                registry,
                manager.clone(),
                notifier,
                &config,
            );

            Self {
                sim,
                state,
                manager,
                tracker,
                notices,
                event_tx,
                events,
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

    #[tokio::test]
    async fn test_initialize_lists_devices() {
        let h = Harness::new(AdapterPolicy::Strict);

        h.tracker.initialize().await.unwrap();
        assert_eq!(h.state.adapter_state(), AdapterState::Enabled);
        assert_eq!(
            h.state.device_records(),
            vec![DeviceRecord::new("RobotBT", ROBOT)]
        );
        assert!(h.notice_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_refused_enable_retries_then_reports() {
        let h = Harness::new(AdapterPolicy::Strict);
        h.sim.set_enable_behavior(EnableBehavior::Refuse);

        let err = h.tracker.initialize().await.unwrap_err();
        assert!(matches!(err, BluetoothError::AdapterUnavailable(_)));
        assert_eq!(h.sim.enable_requests(), 3);
        assert!(h.state.devices().is_empty());
        assert_eq!(h.notice_kinds(), vec![NoticeKind::AdapterUnavailable]);
    }

    #[tokio::test]
    async fn test_missing_adapter_reported() {
        let h = Harness::new(AdapterPolicy::Strict);
        h.sim.set_enable_behavior(EnableBehavior::Missing);

        assert!(h.tracker.initialize().await.is_err());
        assert_eq!(h.state.adapter_state(), AdapterState::Disabled);
        assert_eq!(h.notice_kinds(), vec![NoticeKind::AdapterUnavailable]);
    }

    #[tokio::test]
    async fn test_denied_permissions_stop_discovery() {
        let h = Harness::new(AdapterPolicy::Strict);
        h.sim.deny_permissions(vec![Permission::Scan]);

        let err = h.tracker.initialize().await.unwrap_err();
        assert_eq!(
            err,
            BluetoothError::PermissionDenied("bluetooth-scan".to_string())
        );
        assert!(h.state.devices().is_empty());
        assert_eq!(h.notice_kinds(), vec![NoticeKind::PermissionDenied]);
    }

    #[tokio::test]
    async fn test_retry_after_user_enables() {
        let h = Harness::new(AdapterPolicy::Strict);
        h.sim.set_enable_behavior(EnableBehavior::Refuse);
        assert!(h.tracker.initialize().await.is_err());

        h.sim.set_enable_behavior(EnableBehavior::Allow);
        h.tracker.retry().await.unwrap();
        assert_eq!(h.state.device_records().len(), 1);
    }

    #[tokio::test]
    async fn test_strict_disable_clears_devices_and_connection() {
        let h = Harness::new(AdapterPolicy::Strict);
        h.tracker.initialize().await.unwrap();
        let robot = h.state.find_device(ROBOT).unwrap();
        h.manager.connect(robot).await;
        h.notice_kinds();

        h.tracker.handle_state_change(AdapterState::Disabled).await;
        assert_eq!(h.state.adapter_state(), AdapterState::Disabled);
        assert!(h.state.devices().is_empty());
        assert!(h.state.selected_device().is_none());
        assert!(!h.manager.has_listener());
        assert_eq!(h.notice_kinds(), vec![NoticeKind::AdapterUnavailable]);
    }

    #[tokio::test]
    async fn test_strict_disable_during_connect_wins() {
        let h = Harness::new(AdapterPolicy::Strict);
        h.tracker.initialize().await.unwrap();
        let robot = h.sim.device(ROBOT).unwrap();
        let gate = robot.hold_connect();

        let manager = h.manager.clone();
        let handle = h.state.find_device(ROBOT).unwrap();
        let attempt = tokio::spawn(async move { manager.connect(handle).await });
        timeout(Duration::from_secs(1), async {
            while robot.connect_calls() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        h.tracker.handle_state_change(AdapterState::Disabled).await;
        gate.notify_one();

        assert_eq!(attempt.await.unwrap(), ConnectOutcome::Failed);
        assert!(!h.state.is_connected());
        assert!(!h.state.is_connecting());
        assert!(!h.manager.has_listener());
        assert!(h.state.devices().is_empty());
        assert!(!robot.holds_link());
        assert_eq!(
            h.notice_kinds(),
            vec![NoticeKind::AdapterUnavailable, NoticeKind::ConnectFailed]
        );
    }

    #[tokio::test]
    async fn test_lenient_disable_keeps_devices() {
        let h = Harness::new(AdapterPolicy::Lenient);
        h.tracker.initialize().await.unwrap();
        let before = h.sim.enable_requests();

        h.sim.emit_state(AdapterState::Disabled);
        h.tracker.handle_state_change(AdapterState::Disabled).await;
        assert!(h.sim.enable_requests() > before);
        assert!(h.sim.is_enabled());
        assert_eq!(h.state.adapter_state(), AdapterState::Enabled);
        assert_eq!(h.state.devices().len(), 1);
        assert!(h.notice_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_lenient_disable_stays_off_when_refused() {
        let h = Harness::new(AdapterPolicy::Lenient);
        h.tracker.initialize().await.unwrap();
        h.sim.set_enable_behavior(EnableBehavior::Refuse);
        h.sim.emit_state(AdapterState::Disabled);
        let before = h.sim.enable_requests();

        h.tracker.handle_state_change(AdapterState::Disabled).await;
        assert_eq!(h.sim.enable_requests(), before + 3);
        assert_eq!(h.state.adapter_state(), AdapterState::Disabled);
        assert_eq!(h.state.devices().len(), 1);
        assert!(h.notice_kinds().is_empty());
    }

    #[tokio::test]
    async fn test_enable_event_refreshes_once() {
        let h = Harness::new(AdapterPolicy::Strict);

        h.tracker.handle_state_change(AdapterState::Enabled).await;
        assert_eq!(h.state.devices().len(), 1);

        h.sim.set_devices(Vec::new());
        h.tracker.handle_state_change(AdapterState::Enabled).await;
        assert_eq!(h.state.devices().len(), 1);
    }

    #[tokio::test]
    async fn test_lenient_refresh_re_requests_enable() {
        let h = Harness::new(AdapterPolicy::Lenient);
        h.tracker.initialize().await.unwrap();
        h.sim.set_enable_behavior(EnableBehavior::Refuse);
        h.sim.emit_state(AdapterState::Disabled);
        h.tracker.handle_state_change(AdapterState::Disabled).await;
        h.sim.set_enable_behavior(EnableBehavior::Allow);
        let before = h.sim.enable_requests();

        assert_eq!(h.tracker.refresh_devices().await.unwrap(), 1);
        assert_eq!(h.sim.enable_requests(), before + 1);
        assert_eq!(h.state.adapter_state(), AdapterState::Enabled);
    }

    #[tokio::test]
    async fn test_strict_refresh_needs_enabled_adapter() {
        let h = Harness::new(AdapterPolicy::Strict);

        let err = h.tracker.refresh_devices().await.unwrap_err();
        assert!(matches!(err, BluetoothError::AdapterUnavailable(_)));
        assert_eq!(h.sim.enable_requests(), 0);
        assert_eq!(h.notice_kinds(), vec![NoticeKind::AdapterUnavailable]);
    }

    #[tokio::test]
    async fn test_subscription_forwards_state_changes() {
        let mut h = Harness::new(AdapterPolicy::Strict);
        h.tracker.subscribe(h.event_tx.clone()).await.unwrap();
        assert!(h.tracker.is_subscribed());

        h.sim.emit_state(AdapterState::Enabled);
        let event = timeout(Duration::from_secs(1), h.events.recv())
            .await
            .unwrap();
        assert!(matches!(
            event,
            Some(AppEvent::AdapterState(AdapterState::Enabled))
        ));

        h.tracker.unsubscribe();
        assert!(!h.tracker.is_subscribed());
    }
}
