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

//! Robot Remote Desktop Application

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use robot_remote::bluetooth::create_platform;
use robot_remote::config::Config;
use robot_remote::events::{AppEvent, EventProcessor};
use robot_remote::notice::Notifier;
use robot_remote::state::AppState;
use robot_remote::ui::{self, TrayAction};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("robot_remote=info".parse()?),
        )
        .init();

    info!("Starting Robot Remote v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let platform = create_platform(&config.bluetooth, &config.simulated).await?;
    info!("Bluetooth backend: {}", platform.backend_name());

    // Create application state
    let state = AppState::new();
    let (notifier, notice_rx) = Notifier::channel();
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<AppEvent>();

    let processor = Arc::new(EventProcessor::new(
        &config,
        platform,
        state.clone(),
        notifier,
        event_tx,
    ));

    // Start system tray
    let (mut action_rx, tray) =
        ui::run_tray(state.clone(), config.control.allow_autonomous_modes)?;

    // Show notices in the tray
    let state_notices = state.clone();
    let tray_notices = tray.clone();
    tokio::spawn(async move {
        while let Ok(notice) = notice_rx.recv().await {
            state_notices.set_last_notice(notice);
            tray_notices.update(|_| {});
        }
    });

    // Bring the adapter up in the background
    let processor_start = processor.clone();
    let tray_start = tray.clone();
    tokio::spawn(async move {
        processor_start.start().await;
        tray_start.update(|_| {});
    });

    info!("Ready. System tray active.");

    loop {
        tokio::select! {
            Some(event) = event_rx.recv() => {
                let processor = processor.clone();
                let tray = tray.clone();
                tokio::spawn(async move {
                    processor.process_event(event).await;
                    tray.update(|_| {});
                });
            }
            Some(action) = action_rx.recv() => {
                if action == TrayAction::Quit {
                    info!("Quit requested");
                    break;
                }
                let processor = processor.clone();
                let tray_action = tray.clone();
                tokio::spawn(async move {
                    processor.handle_action(action).await;
                    tray_action.update(|_| {});
                });
                // Show the connecting state while the action runs
                tokio::task::yield_now().await;
                tray.update(|_| {});
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    processor.shutdown().await;

    info!("Robot Remote stopped");
    Ok(())
}
