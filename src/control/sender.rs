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

//! Writes command tokens to the selected robot.

use std::sync::Arc;
use tracing::{debug, error, info};

use super::{Command, CommandVocabulary, DriveMode};
use crate::config::ControlConfig;
use crate::notice::{NoticeKind, Notifier};
use crate::state::AppState;

/// Command sender.
pub struct CommandSender {
    state: Arc<AppState>,
    notifier: Notifier,
    vocabulary: CommandVocabulary,
    allow_autonomous_modes: bool,
    send_mode_on_connect: bool,
}

impl CommandSender {
    pub fn new(state: Arc<AppState>, notifier: Notifier, config: &ControlConfig) -> Self {
        Self {
            state,
            notifier,
            vocabulary: config.vocabulary.clone(),
            allow_autonomous_modes: config.allow_autonomous_modes,
            send_mode_on_connect: config.send_mode_on_connect,
        }
    }

    /// Send a command. Returns true when it was written.
    ///
    /// Directional commands are dropped unless the robot is in manual mode.
    pub async fn send(&self, command: Command) -> bool {
        if command.is_directional() && self.state.drive_mode() != DriveMode::Manual {
            debug!("Ignoring {} outside manual mode", command.as_str());
            return false;
        }
        self.send_token(self.vocabulary.token(command)).await
    }

    /// Write a raw token to the selected device.
    ///
    /// Without a selected device this is a no-op. A failed write is reported
    /// but leaves the connection as it is.
    pub async fn send_token(&self, token: &str) -> bool {
        let Some(device) = self.state.selected_device() else {
            debug!("No device selected, dropping {:?}", token);
            return false;
        };

        match device.write(token.as_bytes()).await {
            Ok(()) => {
                debug!("Sent {:?} to {}", token, device.record());
                true
            }
            Err(e) => {
                error!("Failed to send {:?}: {}", token, e);
                self.notifier
                    .notify(NoticeKind::WriteFailed, "Failed to send command");
                false
            }
        }
    }

    /// Switch the robot's drive mode.
    ///
    /// The new mode is recorded only once the robot has been told.
    pub async fn set_mode(&self, mode: DriveMode) -> bool {
        if mode.is_autonomous() && !self.allow_autonomous_modes {
            debug!("{} mode is disabled", mode.label());
            return false;
        }
        if !self.send_token(self.vocabulary.token(Command::Mode(mode))).await {
            return false;
        }

        info!("Drive mode: {}", mode.label());
        self.state.set_drive_mode(mode);
        true
    }

    /// Bring the control state in line with a freshly connected robot.
    pub async fn on_connected(&self) {
        self.state.set_drive_mode(DriveMode::Manual);
        if self.send_mode_on_connect {
            self.send_token(self.vocabulary.token(Command::Mode(DriveMode::Manual)))
                .await;
        }
    }
}
