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

//! Robot command vocabulary.
//!
//! Maps control-panel actions to the opaque tokens written to the robot.

mod sender;

pub use sender::CommandSender;

use serde::{Deserialize, Serialize};

/// Robot driving mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriveMode {
    /// Driven from the direction buttons.
    #[default]
    Manual,
    /// Robot drives itself.
    Auto,
    /// Robot follows a line on the floor.
    LineFollow,
}

impl DriveMode {
    pub const ALL: [DriveMode; 3] = [DriveMode::Manual, DriveMode::Auto, DriveMode::LineFollow];

    /// Get display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::Auto => "Auto",
            Self::LineFollow => "Follow Line",
        }
    }

    pub fn is_autonomous(&self) -> bool {
        *self != DriveMode::Manual
    }
}

/// Motor speed level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedLevel {
    Low,
    Medium,
    High,
}

impl SpeedLevel {
    pub const ALL: [SpeedLevel; 3] = [SpeedLevel::Low, SpeedLevel::Medium, SpeedLevel::High];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "Full",
        }
    }
}

/// Control panel commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Forward,
    Backward,
    Left,
    Right,
    Mode(DriveMode),
    Speed(SpeedLevel),
}

impl Command {
    /// Parse from string code.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "FORWARD" => Some(Self::Forward),
            "BACKWARD" => Some(Self::Backward),
            "LEFT" => Some(Self::Left),
            "RIGHT" => Some(Self::Right),
            "MODE_MANUAL" => Some(Self::Mode(DriveMode::Manual)),
            "MODE_AUTO" => Some(Self::Mode(DriveMode::Auto)),
            "MODE_LINE" => Some(Self::Mode(DriveMode::LineFollow)),
            "SPEED_LOW" => Some(Self::Speed(SpeedLevel::Low)),
            "SPEED_MEDIUM" => Some(Self::Speed(SpeedLevel::Medium)),
            "SPEED_HIGH" => Some(Self::Speed(SpeedLevel::High)),
            _ => None,
        }
    }

    /// Get string code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forward => "FORWARD",
            Self::Backward => "BACKWARD",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Mode(DriveMode::Manual) => "MODE_MANUAL",
            Self::Mode(DriveMode::Auto) => "MODE_AUTO",
            Self::Mode(DriveMode::LineFollow) => "MODE_LINE",
            Self::Speed(SpeedLevel::Low) => "SPEED_LOW",
            Self::Speed(SpeedLevel::Medium) => "SPEED_MEDIUM",
            Self::Speed(SpeedLevel::High) => "SPEED_HIGH",
        }
    }

    /// Directional commands are only meaningful in manual mode.
    pub fn is_directional(&self) -> bool {
        matches!(self, Self::Forward | Self::Backward | Self::Left | Self::Right)
    }
}

/// Tokens written to the robot for each command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandVocabulary {
    pub forward: String,
    pub backward: String,
    pub left: String,
    pub right: String,
    pub mode_manual: String,
    pub mode_auto: String,
    pub mode_line: String,
    pub speed_low: String,
    pub speed_medium: String,
    pub speed_high: String,
}

impl Default for CommandVocabulary {
    fn default() -> Self {
        Self {
            forward: "F".to_string(),
            backward: "B".to_string(),
            left: "L".to_string(),
            right: "R".to_string(),
            mode_manual: "M".to_string(),
            mode_auto: "A".to_string(),
            mode_line: "T".to_string(),
            speed_low: "1".to_string(),
            speed_medium: "2".to_string(),
            speed_high: "3".to_string(),
        }
    }
}

impl CommandVocabulary {
    /// Token for a command.
    pub fn token(&self, command: Command) -> &str {
        match command {
            Command::Forward => &self.forward,
            Command::Backward => &self.backward,
            Command::Left => &self.left,
            Command::Right => &self.right,
            Command::Mode(DriveMode::Manual) => &self.mode_manual,
            Command::Mode(DriveMode::Auto) => &self.mode_auto,
            Command::Mode(DriveMode::LineFollow) => &self.mode_line,
            Command::Speed(SpeedLevel::Low) => &self.speed_low,
            Command::Speed(SpeedLevel::Medium) => &self.speed_medium,
            Command::Speed(SpeedLevel::High) => &self.speed_high,
        }
    }

    /// Code of the first command whose token is empty, if any.
    pub fn first_empty(&self) -> Option<&'static str> {
        self.entries()
            .into_iter()
            .find(|(_, token)| token.is_empty())
            .map(|(command, _)| command.as_str())
    }

    fn entries(&self) -> Vec<(Command, &str)> {
        let commands = [
            Command::Forward,
            Command::Backward,
            Command::Left,
            Command::Right,
        ]
        .into_iter()
        .chain(DriveMode::ALL.into_iter().map(Command::Mode))
        .chain(SpeedLevel::ALL.into_iter().map(Command::Speed));

        commands.map(|command| (command, self.token(command))).collect()
    }
}
