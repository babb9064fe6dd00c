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

//! BlueZ backend: paired devices and RFCOMM serial links via `bluer`.

use anyhow::Result;
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{
    Adapter, AdapterEvent, AdapterProperty, Address, Device, DeviceEvent, DeviceProperty, Session,
};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::platform::{
    AdapterState, BluetoothPlatform, DeviceHandle, DeviceRecord, Permission, PermissionGrant,
    RemoteDevice,
};
use crate::config::BluetoothConfig;
use crate::error::{BluetoothError, BluetoothResult};

/// Serial Port Profile UUID.
const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// BlueZ adapter.
pub struct BluezPlatform {
    // The session owns the D-Bus connection and must outlive the adapter.
    _session: Session,
    adapter: Adapter,
    rfcomm_channel: u8,
}

impl BluezPlatform {
    /// Open a BlueZ session and pick the adapter.
    pub async fn new(config: &BluetoothConfig) -> Result<Self> {
        info!("Initializing BlueZ backend...");

        let session = Session::new().await?;
        info!("BlueZ session created");

        let adapter = match &config.adapter {
            Some(name) => session.adapter(name)?,
            None => session.default_adapter().await?,
        };
        info!("Using Bluetooth adapter: {}", adapter.name());

        Ok(Self {
            _session: session,
            adapter,
            rfcomm_channel: config.rfcomm_channel,
        })
    }

    async fn device_record(&self, device: &Device) -> DeviceRecord {
        let address = device.address();
        let name = device
            .alias()
            .await
            .unwrap_or_else(|_| address.to_string());
        DeviceRecord::new(name, address.to_string())
    }

    async fn offers_serial_port(device: &Device) -> bool {
        match device.uuids().await {
            Ok(Some(uuids)) => uuids.contains(&SPP_UUID),
            _ => false,
        }
    }
}

impl BluetoothPlatform for BluezPlatform {
    fn backend_name(&self) -> &'static str {
        "BlueZ"
    }

    fn request_enabled(&self) -> BoxFuture<'_, BluetoothResult<bool>> {
        Box::pin(async move {
            let powered = self
                .adapter
                .is_powered()
                .await
                .map_err(|e| BluetoothError::AdapterUnavailable(e.to_string()))?;

            if !powered {
                info!("Powering on Bluetooth adapter...");
                if let Err(e) = self.adapter.set_powered(true).await {
                    warn!("Failed to power on adapter: {}", e);
                    return Ok(false);
                }
            }

            Ok(self.adapter.is_powered().await?)
        })
    }

    fn request_permissions<'a>(
        &'a self,
        permissions: &'a [Permission],
    ) -> BoxFuture<'a, BluetoothResult<PermissionGrant>> {
        Box::pin(async move {
            // BlueZ authorizes through D-Bus policy; there is no runtime prompt.
            debug!(
                "Permissions {:?} are governed by D-Bus policy",
                permissions.iter().map(|p| p.as_str()).collect::<Vec<_>>()
            );
            Ok(PermissionGrant::all_granted())
        })
    }

    fn bonded_devices(&self) -> BoxFuture<'_, BluetoothResult<Vec<DeviceHandle>>> {
        Box::pin(async move {
            let addresses = self
                .adapter
                .device_addresses()
                .await
                .map_err(|e| BluetoothError::DeviceQueryFailed(e.to_string()))?;

            let mut devices: Vec<DeviceHandle> = Vec::new();
            for address in addresses {
                let device = self
                    .adapter
                    .device(address)
                    .map_err(|e| BluetoothError::DeviceQueryFailed(e.to_string()))?;

                if !device.is_paired().await.unwrap_or(false) {
                    continue;
                }

                let record = self.device_record(&device).await;
                if !Self::offers_serial_port(&device).await {
                    debug!("{} does not advertise the serial port profile", record);
                }

                devices.push(Arc::new(BluezDevice {
                    record,
                    address,
                    device,
                    rfcomm_channel: self.rfcomm_channel,
                    stream: Mutex::new(None),
                }));
            }

            Ok(devices)
        })
    }

    fn state_changes(&self) -> BoxFuture<'_, BluetoothResult<BoxStream<'static, AdapterState>>> {
        Box::pin(async move {
            let events = self.adapter.events().await?;
            Ok(events
                .filter_map(|event| async move {
                    match event {
                        AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) => {
                            Some(AdapterState::from_enabled(powered))
                        }
                        _ => None,
                    }
                })
                .boxed())
        })
    }

    fn device_disconnections(
        &self,
    ) -> BoxFuture<'_, BluetoothResult<BoxStream<'static, String>>> {
        Box::pin(async move {
            let mut per_device = Vec::new();

            for address in self.adapter.device_addresses().await? {
                let device = self.adapter.device(address)?;
                let events = device.events().await?;
                per_device.push(
                    events
                        .filter_map(move |event| async move {
                            match event {
                                DeviceEvent::PropertyChanged(DeviceProperty::Connected(false)) => {
                                    Some(address.to_string())
                                }
                                _ => None,
                            }
                        })
                        .boxed(),
                );
            }

            Ok(stream::select_all(per_device).boxed())
        })
    }
}

/// A paired device reached over RFCOMM.
pub struct BluezDevice {
    record: DeviceRecord,
    address: Address,
    device: Device,
    rfcomm_channel: u8,
    stream: Mutex<Option<Stream>>,
}

impl RemoteDevice for BluezDevice {
    fn record(&self) -> &DeviceRecord {
        &self.record
    }

    fn connect(&self) -> BoxFuture<'_, BluetoothResult<bool>> {
        Box::pin(async move {
            let mut slot = self.stream.lock().await;
            if let Some(mut stale) = slot.take() {
                debug!("Dropping stale RFCOMM stream to {}", self.record);
                let _ = stale.shutdown().await;
            }

            info!(
                "Opening RFCOMM channel {} to {}",
                self.rfcomm_channel, self.record
            );
            let target = SocketAddr::new(self.address, self.rfcomm_channel);
            let stream = Stream::connect(target)
                .await
                .map_err(|e| BluetoothError::ConnectFailed {
                    name: self.record.name.clone(),
                    reason: e.to_string(),
                })?;

            *slot = Some(stream);
            Ok(true)
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, BluetoothResult<bool>> {
        Box::pin(async move {
            if let Some(mut stream) = self.stream.lock().await.take() {
                if let Err(e) = stream.shutdown().await {
                    debug!("RFCOMM shutdown for {}: {}", self.record, e);
                }
            }

            self.device
                .disconnect()
                .await
                .map_err(|e| BluetoothError::DisconnectFailed {
                    name: self.record.name.clone(),
                    reason: e.to_string(),
                })?;
            Ok(true)
        })
    }

    fn release(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.stream.lock().await.take().is_some() {
                debug!("Released RFCOMM stream to {}", self.record);
            }
        })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, BluetoothResult<()>> {
        Box::pin(async move {
            let mut slot = self.stream.lock().await;
            let stream = slot.as_mut().ok_or(BluetoothError::NotConnected)?;

            let write_failed = |e: std::io::Error| BluetoothError::WriteFailed {
                name: self.record.name.clone(),
                reason: e.to_string(),
            };
            stream.write_all(data).await.map_err(write_failed)?;
            stream.flush().await.map_err(write_failed)?;
            Ok(())
        })
    }
}
