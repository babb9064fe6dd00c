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

//! Configuration management.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::control::CommandVocabulary;

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bluetooth settings.
    pub bluetooth: BluetoothConfig,

    /// Control panel settings.
    pub control: ControlConfig,

    /// Simulated backend settings.
    pub simulated: SimulatedConfig,
}

/// What happens when the adapter is switched off, or cannot be switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterPolicy {
    /// Clear the device list and drop the connection; the user retries by hand.
    #[default]
    Strict,
    /// Keep the device list; re-request enablement whenever the list is refreshed.
    Lenient,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,

    /// Delay before the second attempt, doubled after each failure.
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt (1-based). The first attempt is immediate.
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u64 << (attempt - 2).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Backend: "bluez" or "simulated".
    pub backend: String,

    /// Adapter name (e.g. "hci0"). The default adapter when unset.
    pub adapter: Option<String>,

    /// RFCOMM channel of the robot's serial port service.
    pub rfcomm_channel: u8,

    /// Adapter-off and enable-failure behaviour.
    pub adapter_policy: AdapterPolicy,

    /// Retry policy for enabling the adapter.
    pub enable_retry: RetryConfig,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        Self {
            backend: "bluez".to_string(),
            adapter: None,
            rfcomm_channel: 1,
            adapter_policy: AdapterPolicy::Strict,
            enable_retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Offer the autonomous and line-following modes.
    pub allow_autonomous_modes: bool,

    /// Send the manual-mode token right after connecting.
    pub send_mode_on_connect: bool,

    /// Tokens written for each command.
    pub vocabulary: CommandVocabulary,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            allow_autonomous_modes: false,
            send_mode_on_connect: true,
            vocabulary: CommandVocabulary::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedDeviceConfig {
    pub name: String,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Whether the simulated adapter starts powered.
    pub start_enabled: bool,

    /// Paired devices reported by the simulated adapter.
    pub devices: Vec<SimulatedDeviceConfig>,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            start_enabled: false,
            devices: vec![SimulatedDeviceConfig {
                name: "RobotBT".to_string(),
                address: "00:11:22:33:44:55".to_string(),
            }],
        }
    }
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("robot-remote")
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from the given file, writing defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            config.save_to(path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        match self.bluetooth.backend.to_lowercase().as_str() {
            "bluez" | "simulated" => {}
            other => bail!(
                "Unknown Bluetooth backend '{}', expected \"bluez\" or \"simulated\"",
                other
            ),
        }
        if let Some(command) = self.control.vocabulary.first_empty() {
            bail!("Command token for '{}' must not be empty", command);
        }
        if self.bluetooth.enable_retry.max_attempts == 0 {
            bail!("bluetooth.enable_retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}
