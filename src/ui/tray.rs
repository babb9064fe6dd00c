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

//! System tray implementation using ksni.

use anyhow::Result;
use ksni::menu::{RadioGroup, RadioItem, StandardItem, SubMenu};
use ksni::{self, Handle, MenuItem, Tray, TrayService};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

use crate::control::{Command, DriveMode, SpeedLevel};
use crate::state::{AppState, ConnectionStatus};

/// Actions that can be triggered from the tray menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayAction {
    /// Connect to the paired device with this address.
    Connect(String),
    Disconnect,
    RefreshDevices,
    RetryBluetooth,
    Send(Command),
    SetMode(DriveMode),
    Quit,
}

pub type TrayHandle = Handle<RobotTray>;

/// System tray icon and menu.
pub struct RobotTray {
    state: Arc<AppState>,
    allow_autonomous_modes: bool,
    action_tx: mpsc::UnboundedSender<TrayAction>,
}

impl RobotTray {
    pub fn new(
        state: Arc<AppState>,
        allow_autonomous_modes: bool,
        action_tx: mpsc::UnboundedSender<TrayAction>,
    ) -> Self {
        Self {
            state,
            allow_autonomous_modes,
            action_tx,
        }
    }

    fn status_text(&self) -> String {
        if !self.state.adapter_state().is_enabled() {
            return "✕ Bluetooth off".to_string();
        }
        match self.state.get_status() {
            status @ ConnectionStatus::Connecting => format!("◐ {}", status.as_str()),
            status @ ConnectionStatus::Disconnected => format!("○ {}", status.as_str()),
            ConnectionStatus::Connected => {
                let device = self
                    .state
                    .selected_record()
                    .map(|record| record.name)
                    .unwrap_or_else(|| "Unknown".to_string());
                format!("● Connected: {}", device)
            }
        }
    }

    fn device_menu(&self) -> Vec<MenuItem<Self>> {
        let connecting = self.state.is_connecting();
        let selected = self.state.selected_record();
        let records = self.state.device_records();

        if records.is_empty() {
            return vec![label_item("No paired devices")];
        }

        records
            .into_iter()
            .map(|record| {
                let is_selected = selected.as_ref() == Some(&record);
                let label = if is_selected {
                    format!("✓ {}", record)
                } else {
                    record.to_string()
                };
                action_item(
                    &label,
                    !connecting && !is_selected,
                    TrayAction::Connect(record.address),
                )
            })
            .collect()
    }

    fn control_menu(&self) -> Vec<MenuItem<Self>> {
        let manual = self.state.drive_mode() == DriveMode::Manual;
        let mut items = vec![];

        for (label, command) in [
            ("Forward", Command::Forward),
            ("Backward", Command::Backward),
            ("Left", Command::Left),
            ("Right", Command::Right),
        ] {
            items.push(action_item(label, manual, TrayAction::Send(command)));
        }

        items.push(MenuItem::Separator);

        let current = self.state.drive_mode();
        items.push(MenuItem::RadioGroup(RadioGroup {
            selected: DriveMode::ALL
                .iter()
                .position(|mode| *mode == current)
                .unwrap_or(0),
            select: Box::new(|tray: &mut Self, index: usize| {
                if let Some(mode) = DriveMode::ALL.get(index) {
                    let _ = tray.action_tx.send(TrayAction::SetMode(*mode));
                }
            }),
            options: DriveMode::ALL
                .iter()
                .map(|mode| RadioItem {
                    label: mode.label().to_string(),
                    enabled: self.allow_autonomous_modes || !mode.is_autonomous(),
                    ..Default::default()
                })
                .collect(),
        }));

        items.push(MenuItem::Separator);

        for speed in SpeedLevel::ALL {
            items.push(action_item(
                &format!("Speed: {}", speed.label()),
                true,
                TrayAction::Send(Command::Speed(speed)),
            ));
        }

        items
    }
}

fn label_item(label: &str) -> MenuItem<RobotTray> {
    MenuItem::Standard(StandardItem {
        label: label.to_string(),
        enabled: false,
        ..Default::default()
    })
}

fn action_item(label: &str, enabled: bool, action: TrayAction) -> MenuItem<RobotTray> {
    MenuItem::Standard(StandardItem {
        label: label.to_string(),
        enabled,
        activate: Box::new(move |tray: &mut RobotTray| {
            let _ = tray.action_tx.send(action.clone());
        }),
        ..Default::default()
    })
}

impl Tray for RobotTray {
    fn icon_name(&self) -> String {
        let status = self.state.get_status();
        status.icon_name().to_string()
    }

    fn title(&self) -> String {
        "Robot Remote".to_string()
    }

    fn tool_tip(&self) -> ksni::ToolTip {
        let description = match self.state.last_notice() {
            Some(notice) => format!("{}\n{}", self.status_text(), notice.message),
            None => self.status_text(),
        };

        ksni::ToolTip {
            icon_name: String::new(),
            icon_pixmap: Vec::new(),
            title: "Robot Remote".to_string(),
            description,
        }
    }

    fn menu(&self) -> Vec<MenuItem<Self>> {
        let adapter_enabled = self.state.adapter_state().is_enabled();
        let connected = self.state.is_connected();

        let mut items = vec![label_item(&self.status_text())];

        if let Some(notice) = self.state.last_notice() {
            items.push(label_item(&format!("{}: {}", notice.title(), notice.message)));
        }

        items.push(MenuItem::Separator);

        items.push(MenuItem::SubMenu(SubMenu {
            label: "Paired Devices".to_string(),
            enabled: adapter_enabled,
            submenu: self.device_menu(),
            ..Default::default()
        }));
        items.push(action_item(
            "Refresh Devices",
            true,
            TrayAction::RefreshDevices,
        ));
        items.push(action_item("Disconnect", connected, TrayAction::Disconnect));
        items.push(action_item(
            "Retry Bluetooth",
            !adapter_enabled,
            TrayAction::RetryBluetooth,
        ));

        items.push(MenuItem::Separator);

        items.push(MenuItem::SubMenu(SubMenu {
            label: "Control".to_string(),
            enabled: connected,
            submenu: self.control_menu(),
            ..Default::default()
        }));

        items.push(MenuItem::Separator);

        items.push(action_item("Quit", true, TrayAction::Quit));

        items
    }

    fn id(&self) -> String {
        "robot-remote".to_string()
    }

    fn category(&self) -> ksni::Category {
        ksni::Category::Hardware
    }
}

/// Run the system tray service.
pub fn run_tray(
    state: Arc<AppState>,
    allow_autonomous_modes: bool,
) -> Result<(mpsc::UnboundedReceiver<TrayAction>, TrayHandle)> {
    let (action_tx, action_rx) = mpsc::unbounded_channel();

    let tray = RobotTray::new(state, allow_autonomous_modes, action_tx);
    let service = TrayService::new(tray);
    let handle = service.handle();

    // Spawn the tray service
    std::thread::spawn(move || {
        let _ = service.run();
    });

    info!("System tray started");

    Ok((action_rx, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{AdapterState, DeviceRecord, SimulatedDevice};

    fn tray(state: Arc<AppState>) -> (RobotTray, mpsc::UnboundedReceiver<TrayAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RobotTray::new(state, false, tx), rx)
    }

    fn find_standard<'a>(
        items: &'a [MenuItem<RobotTray>],
        label: &str,
    ) -> Option<&'a StandardItem<RobotTray>> {
        items.iter().find_map(|item| match item {
            MenuItem::Standard(standard) if standard.label == label => Some(standard),
            _ => None,
        })
    }

    fn find_submenu<'a>(
        items: &'a [MenuItem<RobotTray>],
        label: &str,
    ) -> Option<&'a SubMenu<RobotTray>> {
        items.iter().find_map(|item| match item {
            MenuItem::SubMenu(submenu) if submenu.label == label => Some(submenu),
            _ => None,
        })
    }

    #[test]
    fn test_status_text() {
        let state = AppState::new();
        let (tray, _rx) = tray(state.clone());
        assert_eq!(tray.status_text(), "✕ Bluetooth off");

        state.set_adapter_state(AdapterState::Enabled);
        assert_eq!(tray.status_text(), "○ Disconnected");

        state.select_device(Arc::new(SimulatedDevice::new(DeviceRecord::new(
            "RobotBT",
            "00:11:22:33:44:55",
        ))));
        assert_eq!(tray.status_text(), "● Connected: RobotBT");
    }

    #[test]
    fn test_devices_disabled_while_connecting() {
        let state = AppState::new();
        state.set_adapter_state(AdapterState::Enabled);
        state.replace_devices(vec![Arc::new(SimulatedDevice::new(DeviceRecord::new(
            "RobotBT",
            "00:11:22:33:44:55",
        )))]);
        let (tray, _rx) = tray(state.clone());

        let items = tray.menu();
        let devices = find_submenu(&items, "Paired Devices").unwrap();
        let robot = find_standard(&devices.submenu, "RobotBT (00:11:22:33:44:55)").unwrap();
        assert!(robot.enabled);

        assert!(state.try_begin_connect("00:11:22:33:44:55").is_some());
        let items = tray.menu();
        let devices = find_submenu(&items, "Paired Devices").unwrap();
        let robot = find_standard(&devices.submenu, "RobotBT (00:11:22:33:44:55)").unwrap();
        assert!(!robot.enabled);
    }

    #[test]
    fn test_device_item_sends_connect() {
        let state = AppState::new();
        state.set_adapter_state(AdapterState::Enabled);
        state.replace_devices(vec![Arc::new(SimulatedDevice::new(DeviceRecord::new(
            "RobotBT",
            "00:11:22:33:44:55",
        )))]);
        let (mut tray, mut rx) = tray(state);

        let items = tray.menu();
        let devices = find_submenu(&items, "Paired Devices").unwrap();
        let robot = find_standard(&devices.submenu, "RobotBT (00:11:22:33:44:55)").unwrap();
        (robot.activate)(&mut tray);

        assert_eq!(
            rx.try_recv().unwrap(),
            TrayAction::Connect("00:11:22:33:44:55".to_string())
        );
    }

    #[test]
    fn test_directions_disabled_outside_manual() {
        let state = AppState::new();
        let (tray, _rx) = tray(state.clone());

        let controls = tray.control_menu();
        assert!(find_standard(&controls, "Forward").unwrap().enabled);

        state.set_drive_mode(DriveMode::Auto);
        let controls = tray.control_menu();
        assert!(!find_standard(&controls, "Forward").unwrap().enabled);
        assert!(find_standard(&controls, "Speed: Full").unwrap().enabled);
    }

    #[test]
    fn test_autonomous_modes_greyed_out() {
        let state = AppState::new();
        let (tray, _rx) = tray(state);

        let controls = tray.control_menu();
        let modes = controls
            .iter()
            .find_map(|item| match item {
                MenuItem::RadioGroup(group) => Some(group),
                _ => None,
            })
            .unwrap();
        let enabled: Vec<bool> = modes.options.iter().map(|option| option.enabled).collect();
        assert_eq!(enabled, vec![true, false, false]);
        assert_eq!(modes.selected, 0);
    }
}
