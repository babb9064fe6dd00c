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

//! One-shot user-visible notices.

use chrono::{DateTime, Local};
use tracing::{info, warn};

/// What a notice is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Connected,
    ConnectFailed,
    Disconnected,
    DisconnectFailed,
    /// The robot dropped the link on its own.
    AutoDisconnected,
    WriteFailed,
    AdapterUnavailable,
    PermissionDenied,
    DeviceQueryFailed,
}

impl NoticeKind {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Connected => "Connected",
            Self::ConnectFailed => "Connection Failed",
            Self::Disconnected => "Disconnected",
            Self::DisconnectFailed => "Disconnect Failed",
            Self::AutoDisconnected => "Disconnected",
            Self::WriteFailed => "Error",
            Self::AdapterUnavailable => "Bluetooth Unavailable",
            Self::PermissionDenied => "Permissions Required",
            Self::DeviceQueryFailed => "Error",
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            Self::Connected | Self::Disconnected | Self::AutoDisconnected
        )
    }
}

/// A notice shown to the user once.
#[derive(Debug, Clone)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub at: DateTime<Local>,
}

impl Notice {
    pub fn title(&self) -> &'static str {
        self.kind.title()
    }
}

/// Sending side of the notice channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: async_channel::Sender<Notice>,
}

impl Notifier {
    /// Create a notifier and the receiver the UI drains.
    pub fn channel() -> (Self, async_channel::Receiver<Notice>) {
        let (tx, rx) = async_channel::unbounded();
        (Self { tx }, rx)
    }

    /// Log and publish a notice.
    pub fn notify(&self, kind: NoticeKind, message: impl Into<String>) {
        let notice = Notice {
            kind,
            message: message.into(),
            at: Local::now(),
        };

        if kind.is_error() {
            warn!("{}: {}", notice.title(), notice.message);
        } else {
            info!("{}: {}", notice.title(), notice.message);
        }

        if self.tx.try_send(notice).is_err() {
            warn!("Notice channel closed, dropping notice");
        }
    }
}
