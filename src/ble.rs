use btleplug::{
    api::{BDAddr, Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType},
    platform::{Manager, Peripheral},
};
use futures::stream::StreamExt;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, Mutex},
    time::timeout,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{Result, ZeTimeError},
    session::{Channel, Target, Transaction, TransportOp},
    types::{ConnectionParams, DeviceInfo},
    ZETIME_ACK_CHAR_UUID, ZETIME_NOTIFY_CHAR_UUID, ZETIME_SERVICE_UUID, ZETIME_WRITE_CHAR_UUID,
};

fn parse_uuid(text: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| ZeTimeError::Transport(format!("invalid {what} UUID: {e}")))
}

/// Match a discovered peripheral against the requested device.
///
/// A MAC address in `info` takes priority and compares case-insensitively;
/// otherwise the advertised local name must match exactly.
fn device_matches(local_name: Option<&str>, address: &str, info: &DeviceInfo) -> bool {
    if let Some(mac) = &info.mac_address {
        return mac.eq_ignore_ascii_case(address);
    }
    local_name == Some(info.name.as_str())
}

/// BLE manager for ZeTime watch communication
pub struct BleManager {
    manager: Manager,
    peripherals: Arc<Mutex<HashMap<BDAddr, Peripheral>>>,
}

impl BleManager {
    /// Create a new BLE manager
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::Ble`] if the Bluetooth adapter cannot be initialized.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;

        Ok(Self {
            manager,
            peripherals: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Scan for ZeTime watches
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::DeviceNotFound`] if no Bluetooth adapters are available,
    /// or [`ZeTimeError::Ble`] for other Bluetooth-related errors.
    pub async fn scan_for_devices(&self, params: &ConnectionParams) -> Result<Vec<DeviceInfo>> {
        info!("Starting scan for ZeTime watches...");

        let adapters = self.manager.adapters().await?;
        if adapters.is_empty() {
            return Err(ZeTimeError::DeviceNotFound);
        }

        let central = &adapters[0];

        let service_uuid = parse_uuid(ZETIME_SERVICE_UUID, "service")?;
        let scan_filter = ScanFilter {
            services: vec![service_uuid],
        };

        central.start_scan(scan_filter).await?;

        tokio::time::sleep(Duration::from_millis(params.scan_timeout_ms)).await;

        central.stop_scan().await?;

        let peripherals = central.peripherals().await?;
        let mut devices = Vec::new();
        for peripheral in peripherals {
            if self.is_zetime_device(&peripheral).await {
                let device_info = self.extract_device_info(&peripheral).await;
                devices.push(device_info.clone());

                self.peripherals
                    .lock()
                    .await
                    .insert(peripheral.address(), peripheral);

                info!("Found ZeTime watch: {}", device_info.name);
            }
        }

        info!("Scan completed. Found {} ZeTime watch(es)", devices.len());
        Ok(devices)
    }

    /// Connect to a specific watch and discover its characteristics
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::DeviceNotFound`] if the watch cannot be found,
    /// [`ZeTimeError::Timeout`] if connection times out,
    /// [`ZeTimeError::ConnectionFailed`] if connection fails,
    /// or [`ZeTimeError::Transport`] when a required characteristic is missing.
    pub async fn connect_to_device(
        &mut self,
        device_info: &DeviceInfo,
        params: &ConnectionParams,
    ) -> Result<ZeTimeConnection> {
        info!("Connecting to watch: {}", device_info.name);

        let peripheral = match self.find_peripheral(device_info).await {
            Some(peripheral) => peripheral,
            None => {
                // not seen yet (no prior scan, or the watch was off then)
                debug!("Watch not in scan cache, rescanning");
                self.scan_for_devices(params).await?;
                self.find_peripheral(device_info)
                    .await
                    .ok_or(ZeTimeError::DeviceNotFound)?
            }
        };

        let connect_future = peripheral.connect();
        timeout(Duration::from_millis(params.timeout_ms), connect_future)
            .await
            .map_err(|_| ZeTimeError::Timeout {
                timeout_ms: params.timeout_ms,
            })?
            .map_err(|e| ZeTimeError::ConnectionFailed(e.to_string()))?;

        peripheral.discover_services().await?;

        let service_uuid = parse_uuid(ZETIME_SERVICE_UUID, "service")?;
        let write_char_uuid = parse_uuid(ZETIME_WRITE_CHAR_UUID, "write characteristic")?;
        let ack_char_uuid = parse_uuid(ZETIME_ACK_CHAR_UUID, "ack characteristic")?;
        let notify_char_uuid = parse_uuid(ZETIME_NOTIFY_CHAR_UUID, "notify characteristic")?;

        let services = peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == service_uuid)
            .ok_or_else(|| ZeTimeError::Transport("ZeTime service not found".to_string()))?;

        let find_char = |uuid: Uuid, name: &str| -> Result<Characteristic> {
            service
                .characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| ZeTimeError::Transport(format!("{name} characteristic not found")))
        };

        let write_char = find_char(write_char_uuid, "write")?;
        let ack_char = find_char(ack_char_uuid, "ack")?;
        let notify_char = find_char(notify_char_uuid, "notify")?;

        info!("Successfully connected to {}", device_info.name);

        Ok(ZeTimeConnection {
            peripheral,
            write_char,
            ack_char,
            notify_char,
        })
    }

    /// Look up a previously scanned peripheral for the given device
    async fn find_peripheral(&self, device_info: &DeviceInfo) -> Option<Peripheral> {
        let peripherals = self.peripherals.lock().await;
        for peripheral in peripherals.values() {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };
            if device_matches(
                properties.local_name.as_deref(),
                &properties.address.to_string(),
                device_info,
            ) {
                return Some(peripheral.clone());
            }
        }
        None
    }

    /// Check if the advertisement looks like a ZeTime watch
    async fn is_zetime_device(&self, peripheral: &Peripheral) -> bool {
        if let Ok(Some(properties)) = peripheral.properties().await {
            if let Some(name) = &properties.local_name {
                if name.to_lowercase().contains("zetime") {
                    return true;
                }
            }

            if properties.services.iter().any(|uuid| {
                Uuid::parse_str(ZETIME_SERVICE_UUID)
                    .map(|service| *uuid == service)
                    .unwrap_or(false)
            }) {
                return true;
            }
        }

        false
    }

    /// Extract device information from BLE properties
    async fn extract_device_info(&self, peripheral: &Peripheral) -> DeviceInfo {
        if let Ok(Some(properties)) = peripheral.properties().await {
            let name = properties
                .local_name
                .clone()
                .unwrap_or_else(|| "Unknown ZeTime".to_string());

            let rssi = properties.rssi.unwrap_or(0);
            let mac_address = Some(properties.address.to_string());

            DeviceInfo {
                name,
                mac_address,
                rssi,
            }
        } else {
            DeviceInfo::new("Unknown ZeTime".to_string(), 0)
        }
    }
}

/// Active connection to a ZeTime watch
pub struct ZeTimeConnection {
    peripheral: Peripheral,
    write_char: Characteristic,
    ack_char: Characteristic,
    notify_char: Characteristic,
}

impl ZeTimeConnection {
    fn characteristic(&self, target: Target) -> &Characteristic {
        match target {
            Target::Write => &self.write_char,
            Target::Ack => &self.ack_char,
            Target::Notify => &self.notify_char,
        }
    }

    /// Submit one transaction's operations to the link, in order
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::Transport`] if a write or subscription fails.
    pub async fn submit_transaction(&self, transaction: &Transaction) -> Result<()> {
        debug!("Submitting transaction: {}", transaction.label);

        for op in &transaction.ops {
            match op {
                TransportOp::SubscribeNotifications(target) => {
                    self.peripheral
                        .subscribe(self.characteristic(*target))
                        .await
                        .map_err(|e| {
                            ZeTimeError::Transport(format!(
                                "failed to subscribe during {}: {e}",
                                transaction.label
                            ))
                        })?;
                }
                TransportOp::Write(target, data) => {
                    debug!("Writing {:02X?}", data);
                    self.peripheral
                        .write(self.characteristic(*target), data, WriteType::WithoutResponse)
                        .await
                        .map_err(|e| {
                            ZeTimeError::Transport(format!(
                                "failed to write during {}: {e}",
                                transaction.label
                            ))
                        })?;
                }
            }
        }

        Ok(())
    }

    /// UUIDs of the two inbound characteristics, for the notification pump
    #[must_use]
    pub fn inbound_uuids(&self) -> (Uuid, Uuid) {
        (self.ack_char.uuid, self.notify_char.uuid)
    }

    /// Clone of the underlying peripheral handle
    #[must_use]
    pub fn peripheral(&self) -> Peripheral {
        self.peripheral.clone()
    }

    /// Check if the watch is still connected
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Disconnect from the watch
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::Ble`] if disconnection fails.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    /// Get device address
    #[must_use]
    pub fn get_address(&self) -> BDAddr {
        self.peripheral.address()
    }
}

/// Forward raw notification chunks from both inbound characteristics.
///
/// Chunks are passed through untouched; fragment reassembly and frame
/// decoding belong to the session, which sees them in arrival order.
///
/// # Errors
///
/// Returns [`ZeTimeError::Ble`] if setting up the notification stream fails.
pub async fn pump_notifications(
    peripheral: Peripheral,
    ack_uuid: Uuid,
    notify_uuid: Uuid,
    sender: mpsc::UnboundedSender<(Channel, Vec<u8>)>,
) -> Result<()> {
    let mut notification_stream = peripheral.notifications().await?;

    while let Some(data) = notification_stream.next().await {
        let channel = if data.uuid == ack_uuid {
            Channel::Ack
        } else if data.uuid == notify_uuid {
            Channel::Notify
        } else {
            continue;
        };

        if sender.send((channel, data.value)).is_err() {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_parsing() {
        assert!(Uuid::parse_str(ZETIME_SERVICE_UUID).is_ok());
        assert!(Uuid::parse_str(ZETIME_WRITE_CHAR_UUID).is_ok());
        assert!(Uuid::parse_str(ZETIME_ACK_CHAR_UUID).is_ok());
        assert!(Uuid::parse_str(ZETIME_NOTIFY_CHAR_UUID).is_ok());
    }

    #[test]
    fn test_device_matching_by_name() {
        let info = DeviceInfo::new("ZeTime 1234".to_string(), -60);

        assert!(device_matches(
            Some("ZeTime 1234"),
            "AA:BB:CC:DD:EE:FF",
            &info
        ));
        assert!(!device_matches(
            Some("ZeTime 5678"),
            "AA:BB:CC:DD:EE:FF",
            &info
        ));
        assert!(!device_matches(None, "AA:BB:CC:DD:EE:FF", &info));
    }

    #[test]
    fn test_device_matching_prefers_mac_address() {
        let mut info = DeviceInfo::new("ZeTime 1234".to_string(), -60);
        info.mac_address = Some("AA:BB:CC:DD:EE:FF".to_string());

        // case-insensitive address match, name ignored entirely
        assert!(device_matches(None, "aa:bb:cc:dd:ee:ff", &info));
        assert!(device_matches(
            Some("some other name"),
            "AA:BB:CC:DD:EE:FF",
            &info
        ));
        assert!(!device_matches(
            Some("ZeTime 1234"),
            "11:22:33:44:55:66",
            &info
        ));
    }
}
