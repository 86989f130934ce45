use crate::{
    ble::{pump_notifications, BleManager, ZeTimeConnection},
    builders,
    error::{Result, ZeTimeError},
    session::{Channel, Session, SessionConfig, Transaction},
    types::{
        Alarm, BatteryReport, CalendarEvent, ConnectionParams, ConnectionState, DateTimeParts,
        DeviceEvent, DeviceInfo, DeviceVersion, EventSink, NotificationPush, PreferenceStore,
        SampleStore, WeatherSnapshot,
    },
};
use std::{
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Event sink wrapper that mirrors battery and version events into the
/// device's local caches before forwarding them to the host sink
struct StateRecordingSink {
    battery: Arc<RwLock<Option<BatteryReport>>>,
    version: Arc<RwLock<DeviceVersion>>,
    inner: Arc<dyn EventSink>,
}

impl EventSink for StateRecordingSink {
    fn on_event(&self, event: DeviceEvent) {
        match &event {
            DeviceEvent::Battery(report) => {
                *write_lock(&self.battery) = Some(*report);
            }
            DeviceEvent::FirmwareVersion(version) => {
                write_lock(&self.version).firmware = Some(version.clone());
            }
            DeviceEvent::HardwareVersion(version) => {
                write_lock(&self.version).hardware = Some(version.clone());
            }
            _ => {}
        }
        self.inner.on_event(event);
    }

    fn on_warning(&self, message: &str) {
        self.inner.on_warning(message);
    }
}

/// Main interface for talking to a MyKronoz ZeTime smartwatch
///
/// `ZeTimeDevice` provides a high-level, safe interface for connecting to
/// and operating ZeTime watches via Bluetooth Low Energy (BLE). It owns the
/// connection, runs the init handshake, pumps inbound notifications into
/// the protocol session, and serializes all outbound traffic through one
/// queue so messages never interleave on the link.
///
/// Typed events (battery reports, music and call controls, sync progress)
/// are delivered through the [`EventSink`] supplied at connect time, and
/// decoded activity records go to the [`SampleStore`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use zetimers::{ActivitySample, Result, ZeTimeDevice};
///
/// struct PrintStore;
///
/// impl zetimers::SampleStore for PrintStore {
///     fn add_sample(&self, sample: &ActivitySample) -> Result<()> {
///         println!("{sample:?}");
///         Ok(())
///     }
/// }
///
/// struct PrintSink;
///
/// impl zetimers::EventSink for PrintSink {
///     fn on_event(&self, event: zetimers::DeviceEvent) {
///         println!("{event:?}");
///     }
///     fn on_warning(&self, message: &str) {
///         eprintln!("{message}");
///     }
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let device = ZeTimeDevice::connect_first(Arc::new(PrintSink), Arc::new(PrintStore)).await?;
///
///     // Pull everything the watch recorded while offline
///     device.fetch_recorded_data().await?;
///
///     Ok(())
/// }
/// ```
pub struct ZeTimeDevice {
    connection: Arc<Mutex<Option<ZeTimeConnection>>>,
    session: Arc<Mutex<Session>>,
    device_info: DeviceInfo,
    prefs: Arc<dyn PreferenceStore>,
    battery: Arc<RwLock<Option<BatteryReport>>>,
    version: Arc<RwLock<DeviceVersion>>,
    outbound_tx: mpsc::UnboundedSender<Transaction>,
}

impl ZeTimeDevice {
    /// Connect to the first ZeTime watch found, with default parameters,
    /// preferences, and session configuration
    ///
    /// When multiple watches are in range the one with the strongest
    /// signal is chosen.
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::DeviceNotFound`] if no watch is found during
    /// the scan, or any connection/handshake error from the underlying
    /// connection process.
    pub async fn connect_first(
        sink: Arc<dyn EventSink>,
        store: Arc<dyn SampleStore>,
    ) -> Result<Self> {
        Self::connect_first_with_params(
            ConnectionParams::default(),
            SessionConfig::default(),
            Arc::new(crate::types::InMemoryPrefs::default()),
            sink,
            store,
        )
        .await
    }

    /// Connect to the first ZeTime watch found with custom parameters
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::DeviceNotFound`] if no watch is found during
    /// the scan, or any BLE connection/handshake error.
    pub async fn connect_first_with_params(
        params: ConnectionParams,
        config: SessionConfig,
        prefs: Arc<dyn PreferenceStore>,
        sink: Arc<dyn EventSink>,
        store: Arc<dyn SampleStore>,
    ) -> Result<Self> {
        let ble_manager = BleManager::new().await?;
        let devices = ble_manager.scan_for_devices(&params).await?;

        let mut sorted_devices = devices;
        sorted_devices.sort_by(|a, b| b.rssi.cmp(&a.rssi));

        let device_info = sorted_devices
            .into_iter()
            .next()
            .ok_or(ZeTimeError::DeviceNotFound)?;

        Self::connect_with_manager(ble_manager, device_info, params, config, prefs, sink, store)
            .await
    }

    /// Connect to a specific watch and run the init handshake
    ///
    /// The returned device is fully initialized: notifications are
    /// subscribed, the watch clock is synced, and profile, goals, and
    /// settings have been pushed.
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::Timeout`] if the handshake does not complete
    /// within `params.timeout_ms`, or any BLE connection error.
    pub async fn connect_to_device(
        device_info: DeviceInfo,
        params: ConnectionParams,
        config: SessionConfig,
        prefs: Arc<dyn PreferenceStore>,
        sink: Arc<dyn EventSink>,
        store: Arc<dyn SampleStore>,
    ) -> Result<Self> {
        // the manager scans on its own when the watch is not cached yet
        let ble_manager = BleManager::new().await?;
        Self::connect_with_manager(ble_manager, device_info, params, config, prefs, sink, store)
            .await
    }

    /// Establish the link using an already populated manager and run the
    /// init handshake
    #[allow(clippy::too_many_arguments)]
    async fn connect_with_manager(
        mut ble_manager: BleManager,
        device_info: DeviceInfo,
        params: ConnectionParams,
        config: SessionConfig,
        prefs: Arc<dyn PreferenceStore>,
        sink: Arc<dyn EventSink>,
        store: Arc<dyn SampleStore>,
    ) -> Result<Self> {
        let connection = ble_manager.connect_to_device(&device_info, &params).await?;

        let battery = Arc::new(RwLock::new(None));
        let version = Arc::new(RwLock::new(DeviceVersion::default()));
        let recording_sink = Arc::new(StateRecordingSink {
            battery: battery.clone(),
            version: version.clone(),
            inner: sink,
        });

        let mut session = Session::new(config, prefs.clone(), recording_sink, store);
        session.begin_connect();
        let init_batch = session.begin_initialization(DateTimeParts::now_local())?;
        let session = Arc::new(Mutex::new(session));

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (ack_uuid, notify_uuid) = connection.inbound_uuids();
        tokio::spawn(pump_notifications(
            connection.peripheral(),
            ack_uuid,
            notify_uuid,
            inbound_tx,
        ));

        let connection = Arc::new(Mutex::new(Some(connection)));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(
            connection.clone(),
            session.clone(),
            inbound_rx,
            outbound_rx,
        ));

        let device = Self {
            connection,
            session,
            device_info,
            prefs,
            battery,
            version,
            outbound_tx,
        };

        for transaction in init_batch {
            device.enqueue(transaction)?;
        }

        device.wait_for_initialized(params.timeout_ms).await?;
        info!("Watch {} initialized", device.device_info.name);

        Ok(device)
    }

    /// Get device information
    #[must_use]
    pub const fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Last battery report received from the watch
    #[must_use]
    pub fn battery(&self) -> Option<BatteryReport> {
        *read_lock(&self.battery)
    }

    /// Firmware and hardware versions reported during the handshake
    #[must_use]
    pub fn version(&self) -> DeviceVersion {
        read_lock(&self.version).clone()
    }

    /// Current session state
    pub async fn state(&self) -> ConnectionState {
        self.session.lock().await.state()
    }

    /// Check if the watch is still connected
    pub async fn is_connected(&self) -> bool {
        if let Some(conn) = self.connection.lock().await.as_ref() {
            conn.is_connected().await
        } else {
            false
        }
    }

    /// Pull all activity records the watch buffered while offline.
    ///
    /// The transfer runs in the background; progress and completion arrive
    /// as [`DeviceEvent::FetchProgress`] and [`DeviceEvent::FetchFinished`]
    /// on the event sink, and decoded samples land in the sample store.
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] if the session is not initialized
    /// or another long-running operation is in flight.
    pub async fn fetch_recorded_data(&self) -> Result<()> {
        info!("Starting activity backlog fetch");
        let transaction = self.session.lock().await.request_recorded_data()?;
        self.enqueue(transaction)
    }

    /// Create or update an alarm slot on the watch
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] if the session is not ready for
    /// commands.
    pub async fn set_alarm(&self, alarm: &Alarm) -> Result<()> {
        info!("Setting alarm in slot {}", alarm.slot);
        let mut session = self.session.lock().await;
        Self::check_ready(&session)?;
        let transaction = session.set_alarm(alarm);
        drop(session);
        self.enqueue(transaction)
    }

    /// Forward a phone notification to the watch
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] if the session is not ready for
    /// commands.
    pub async fn send_notification(&self, push: &NotificationPush) -> Result<()> {
        self.ensure_ready().await?;
        self.enqueue(Transaction::write_message(
            "push notification",
            &builders::notification(push),
        ))
    }

    /// Push a calendar event to the watch
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::InvalidParameters`] for events the wire
    /// format cannot represent, or [`ZeTimeError::NotReady`] if the
    /// session is not ready.
    pub async fn send_calendar_event(&self, event: &CalendarEvent) -> Result<()> {
        self.ensure_ready().await?;
        let message = builders::calendar_event(event)?;
        self.enqueue(Transaction::write_message("push calendar event", &message))
    }

    /// Push current weather and a three-day forecast to the watch
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] if the session is not ready for
    /// commands.
    pub async fn send_weather(&self, snapshot: &WeatherSnapshot) -> Result<()> {
        self.ensure_ready().await?;
        self.enqueue(Transaction::write_message(
            "push weather",
            &builders::weather(snapshot),
        ))
    }

    /// Set the notification/ringtone volume on the watch
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] if the session is not ready for
    /// commands.
    pub async fn set_music_volume(&self, volume: u8) -> Result<()> {
        self.ensure_ready().await?;
        self.enqueue(Transaction::write_message(
            "push volume",
            &builders::music_volume(volume),
        ))
    }

    /// Re-sync the watch clock to the phone's local time
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] if the session is not ready for
    /// commands.
    pub async fn sync_time(&self) -> Result<()> {
        self.ensure_ready().await?;
        self.enqueue(Transaction::write_message(
            "sync time",
            &builders::sync_time(DateTimeParts::now_local()),
        ))
    }

    /// Push the current preference values (screen timeout, display mode,
    /// vibration, do-not-disturb, inactivity alert) to the watch
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] if the session is not ready for
    /// commands.
    pub async fn apply_settings(&self) -> Result<()> {
        info!("Pushing settings to the watch");
        self.ensure_ready().await?;

        self.enqueue(Transaction::write_message(
            "push screen timeout",
            &builders::screen_timeout(self.prefs.screen_timeout_secs()),
        ))?;
        self.enqueue(Transaction::write_message(
            "push analog mode",
            &builders::analog_mode(self.prefs.analog_mode()),
        ))?;
        self.enqueue(Transaction::write_message(
            "push shock mode",
            &builders::shock_mode(self.prefs.shock_mode()),
        ))?;
        self.enqueue(Transaction::write_message(
            "push do-not-disturb",
            &builders::do_not_disturb(self.prefs.dnd_window()),
        ))?;
        self.enqueue(Transaction::write_message(
            "push inactivity alert",
            &builders::inactivity_alert(self.prefs.inactivity_alert()),
        ))
    }

    /// Disconnect from the watch and clean up resources
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::Ble`] if the disconnection itself fails; the
    /// session state is cleared either way.
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from watch");

        self.session.lock().await.on_disconnect();

        let conn = self.connection.lock().await.take();
        if let Some(conn) = conn {
            conn.disconnect().await?;
        }

        Ok(())
    }

    fn enqueue(&self, transaction: Transaction) -> Result<()> {
        self.outbound_tx
            .send(transaction)
            .map_err(|_| ZeTimeError::Disconnected)
    }

    fn check_ready(session: &Session) -> Result<()> {
        match session.state() {
            ConnectionState::Initialized => Ok(()),
            ConnectionState::Busy => Err(ZeTimeError::NotReady {
                reason: format!(
                    "busy with {}",
                    session.busy_task().unwrap_or("another task")
                ),
            }),
            other => Err(ZeTimeError::NotReady {
                reason: format!("session state is {other}"),
            }),
        }
    }

    async fn ensure_ready(&self) -> Result<()> {
        Self::check_ready(&*self.session.lock().await)
    }

    /// Poll the session until the hardware-version reply completes the
    /// handshake
    async fn wait_for_initialized(&self, timeout_ms: u64) -> Result<()> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            if self.session.lock().await.state() == ConnectionState::Initialized {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(ZeTimeError::Timeout { timeout_ms });
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

impl Drop for ZeTimeDevice {
    fn drop(&mut self) {
        let connection = self.connection.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Some(conn) = connection.lock().await.take() {
                    let _ = conn.disconnect().await;
                }
            });
        }
    }
}

async fn submit(
    connection: &Arc<Mutex<Option<ZeTimeConnection>>>,
    transaction: &Transaction,
) -> Result<()> {
    let guard = connection.lock().await;
    match guard.as_ref() {
        Some(conn) => conn.submit_transaction(transaction).await,
        None => Err(ZeTimeError::Disconnected),
    }
}

/// Single worker serializing all link traffic.
///
/// Inbound chunks are fed to the session in arrival order and any
/// follow-up transactions it produces are submitted before the next
/// queued outbound transaction, so the backlog fetch's page requests
/// never race host commands.
async fn run_worker(
    connection: Arc<Mutex<Option<ZeTimeConnection>>>,
    session: Arc<Mutex<Session>>,
    mut inbound_rx: mpsc::UnboundedReceiver<(Channel, Vec<u8>)>,
    mut outbound_rx: mpsc::UnboundedReceiver<Transaction>,
) {
    loop {
        tokio::select! {
            inbound = inbound_rx.recv() => {
                let Some((channel, chunk)) = inbound else {
                    info!("Notification stream closed, stopping worker");
                    break;
                };

                let dispatched = session.lock().await.handle_notification(channel, &chunk);
                match dispatched {
                    Ok(followups) => {
                        for transaction in followups {
                            if let Err(e) = submit(&connection, &transaction).await {
                                error!("Failed to submit {}: {e}", transaction.label);
                            }
                        }
                    }
                    Err(e) => {
                        error!("Inbound dispatch failed: {e}");
                        if e.is_connection_error() {
                            break;
                        }
                    }
                }
            }
            outbound = outbound_rx.recv() => {
                let Some(transaction) = outbound else {
                    info!("Outbound queue closed, stopping worker");
                    break;
                };

                if let Err(e) = submit(&connection, &transaction).await {
                    warn!("Failed to submit {}: {e}", transaction.label);
                }
            }
        }
    }

    session.lock().await.on_disconnect();
}
