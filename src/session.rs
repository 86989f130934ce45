//! Session state machine and inbound dispatcher.
//!
//! A [`Session`] owns everything per-connection: the init handshake, the
//! per-characteristic reassembly buffers, the opcode dispatch table, the
//! activity backlog fetch, and the reminder slot cache. It is transport
//! agnostic: inbound bytes come in through [`Session::handle_notification`]
//! and outbound work leaves as [`Transaction`] values for the BLE layer to
//! submit.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::builders::{self, ReminderSlotCache, VersionSub, REMINDER_CORE_LEN};
use crate::error::{Result, ZeTimeError};
use crate::fragment::{chunk_frame, ReassemblyBuffer};
use crate::protocol::{Message, Opcode, ACK_WRITE};
use crate::types::{
    ActivitySample, Alarm, BatteryReport, CalendarEvent, ConnectionState, DateTimeParts,
    DeviceEvent, EventSink, FetchProgress, MusicEvent, PreferenceStore, SampleKind, SampleStore,
    SettingKind, SleepStage,
};
use crate::types::CallEvent;

/// Seconds the watch's clock epoch leads UTC by.
///
/// Backlog record timestamps are watch-local; converting to UTC adds this
/// fixed lead and subtracts the phone's UTC offset.
pub const DEVICE_TIME_OFFSET: i64 = 28_800;

/// Inbound characteristic a chunk arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Acknowledgement/reply characteristic
    Ack,
    /// Unsolicited notification characteristic
    Notify,
}

impl Channel {
    /// Channel name for logs and error reports
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Notify => "notify",
        }
    }
}

/// Characteristic a transport operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Command write characteristic
    Write,
    /// Acknowledgement characteristic
    Ack,
    /// Notification characteristic
    Notify,
}

/// One primitive operation for the BLE layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOp {
    /// Enable notifications on a characteristic
    SubscribeNotifications(Target),
    /// Write raw bytes to a characteristic
    Write(Target, Vec<u8>),
}

/// An ordered batch of transport operations.
///
/// Operations within a transaction, and transactions themselves, are
/// submitted strictly first-in-first-out; two messages are never
/// interleaved on the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Short description for logs
    pub label: &'static str,
    /// Operations in submission order
    pub ops: Vec<TransportOp>,
}

impl Transaction {
    /// Create an empty transaction
    #[must_use]
    pub const fn new(label: &'static str) -> Self {
        Self { label, ops: Vec::new() }
    }

    /// Encode a message into link-sized writes followed by the ack byte
    #[must_use]
    pub fn write_message(label: &'static str, message: &Message) -> Self {
        let mut ops: Vec<TransportOp> = chunk_frame(&message.to_bytes())
            .into_iter()
            .map(|chunk| TransportOp::Write(Target::Write, chunk))
            .collect();
        ops.push(TransportOp::Write(Target::Ack, vec![ACK_WRITE]));
        Self { label, ops }
    }
}

/// Host-supplied session configuration
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// UTC offset in seconds used for backlog timestamp conversion;
    /// `None` uses the phone's current local offset
    pub utc_offset_seconds: Option<i32>,
    /// Calendar events pushed at the end of the init handshake
    pub upcoming_events: Vec<CalendarEvent>,
}

/// Per-category backlog record counters
#[derive(Debug, Clone, Copy, Default)]
struct PendingCounters {
    steps_total: u32,
    steps_received: u32,
    sleep_total: u32,
    sleep_received: u32,
    heart_rate_total: u32,
    heart_rate_received: u32,
}

impl PendingCounters {
    fn total(&self, kind: SampleKind) -> u32 {
        match kind {
            SampleKind::Steps => self.steps_total,
            SampleKind::Sleep => self.sleep_total,
            SampleKind::HeartRate => self.heart_rate_total,
        }
    }

    fn set_received(&mut self, kind: SampleKind, received: u32) {
        match kind {
            SampleKind::Steps => self.steps_received = received,
            SampleKind::Sleep => self.sleep_received = received,
            SampleKind::HeartRate => self.heart_rate_received = received,
        }
    }

    fn reset_category(&mut self, kind: SampleKind) {
        match kind {
            SampleKind::Steps => {
                self.steps_total = 0;
                self.steps_received = 0;
            }
            SampleKind::Sleep => {
                self.sleep_total = 0;
                self.sleep_received = 0;
            }
            SampleKind::HeartRate => {
                self.heart_rate_total = 0;
                self.heart_rate_received = 0;
            }
        }
    }

    /// Next category with outstanding records, in transfer order
    fn next_pending(&self) -> Option<SampleKind> {
        if self.steps_total > self.steps_received {
            Some(SampleKind::Steps)
        } else if self.heart_rate_total > self.heart_rate_received {
            Some(SampleKind::HeartRate)
        } else if self.sleep_total > self.sleep_received {
            Some(SampleKind::Sleep)
        } else {
            None
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

type HandlerFn = fn(&mut Session, &Message, &mut Vec<Transaction>) -> Result<()>;

/// Per-connection protocol session
pub struct Session {
    state: ConnectionState,
    busy_task: Option<&'static str>,
    ack_buffer: ReassemblyBuffer,
    notify_buffer: ReassemblyBuffer,
    counters: PendingCounters,
    reminder_cache: ReminderSlotCache,
    fetching: bool,
    config: SessionConfig,
    prefs: Arc<dyn PreferenceStore>,
    sink: Arc<dyn EventSink>,
    store: Arc<dyn SampleStore>,
    handlers: HashMap<(Channel, u8), HandlerFn>,
}

impl Session {
    /// Create a session in the disconnected state
    #[must_use]
    pub fn new(
        config: SessionConfig,
        prefs: Arc<dyn PreferenceStore>,
        sink: Arc<dyn EventSink>,
        store: Arc<dyn SampleStore>,
    ) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            busy_task: None,
            ack_buffer: ReassemblyBuffer::new(),
            notify_buffer: ReassemblyBuffer::new(),
            counters: PendingCounters::default(),
            reminder_cache: ReminderSlotCache::new(),
            fetching: false,
            config,
            prefs,
            sink,
            store,
            handlers: Self::build_handlers(),
        }
    }

    fn build_handlers() -> HashMap<(Channel, u8), HandlerFn> {
        let mut handlers: HashMap<(Channel, u8), HandlerFn> = HashMap::new();

        handlers.insert((Channel::Ack, Opcode::WatchId as u8), Self::handle_watch_id);
        handlers.insert(
            (Channel::Ack, Opcode::DeviceVersion as u8),
            Self::handle_device_version,
        );
        handlers.insert(
            (Channel::Ack, Opcode::BatteryPower as u8),
            Self::handle_battery,
        );
        handlers.insert(
            (Channel::Ack, Opcode::AvailableData as u8),
            Self::handle_available_data,
        );
        handlers.insert(
            (Channel::Ack, Opcode::GetStepCount as u8),
            Self::handle_step_page,
        );
        handlers.insert(
            (Channel::Ack, Opcode::GetSleepData as u8),
            Self::handle_sleep_page,
        );
        handlers.insert(
            (Channel::Ack, Opcode::GetHeartRateData as u8),
            Self::handle_heart_rate_page,
        );
        handlers.insert(
            (Channel::Ack, Opcode::Reminders as u8),
            Self::handle_reminders_readback,
        );

        // unsolicited pushes arrive on the notification characteristic
        handlers.insert(
            (Channel::Notify, Opcode::MusicControl as u8),
            Self::handle_music_control,
        );
        handlers.insert(
            (Channel::Notify, Opcode::CallControl as u8),
            Self::handle_call_control,
        );
        handlers.insert(
            (Channel::Notify, Opcode::GetStepCount as u8),
            Self::handle_realtime_steps,
        );
        handlers.insert(
            (Channel::Notify, Opcode::BatteryPower as u8),
            Self::handle_battery,
        );

        for opcode in [
            Opcode::DateTime,
            Opcode::TimeSurface,
            Opcode::Language,
            Opcode::ShockMode,
            Opcode::UserInfo,
            Opcode::UserGoals,
            Opcode::AnalogMode,
            Opcode::DoNotDisturb,
            Opcode::InactivityAlert,
            Opcode::VolumeSettings,
            Opcode::DisplayTimeout,
        ] {
            handlers.insert((Channel::Ack, opcode as u8), Self::handle_settings_ack);
        }

        handlers
    }

    /// Current session state
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a long-running operation owns the session
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.busy_task.is_some()
    }

    /// Name of the task currently holding the session busy, if any
    #[must_use]
    pub const fn busy_task(&self) -> Option<&'static str> {
        self.busy_task
    }

    /// Mark the BLE connection as being established
    pub fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Start the init handshake, returning the full ordered command batch.
    ///
    /// The session leaves `Initializing` only when the hardware-version
    /// reply lands, so the caller can poll [`Session::state`] to detect
    /// handshake completion.
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] unless the session is in the
    /// `Connecting` state.
    pub fn begin_initialization(&mut self, now: DateTimeParts) -> Result<Vec<Transaction>> {
        if self.state != ConnectionState::Connecting {
            return Err(ZeTimeError::NotReady {
                reason: format!("cannot initialize from state {}", self.state),
            });
        }
        self.state = ConnectionState::Initializing;
        info!("starting init handshake");

        let mut subscribe = Transaction::new("subscribe");
        subscribe
            .ops
            .push(TransportOp::SubscribeNotifications(Target::Ack));
        subscribe
            .ops
            .push(TransportOp::SubscribeNotifications(Target::Notify));

        let mut batch = vec![
            subscribe,
            Transaction::write_message("request watch id", &builders::request(Opcode::WatchId)),
            Transaction::write_message(
                "request firmware version",
                &builders::version_request(VersionSub::Firmware),
            ),
            Transaction::write_message(
                "request hardware version",
                &builders::version_request(VersionSub::Hardware),
            ),
            Transaction::write_message(
                "request battery",
                &builders::request(Opcode::BatteryPower),
            ),
            Transaction::write_message(
                "push user profile",
                &builders::user_profile(self.prefs.user_profile()),
            ),
            Transaction::write_message(
                "push user goals",
                &builders::user_goals(self.prefs.user_goals()),
            ),
            Transaction::write_message(
                "push language",
                &builders::language(self.prefs.language_code()),
            ),
            Transaction::write_message(
                "request available data",
                &builders::request(Opcode::AvailableData),
            ),
            Transaction::write_message("sync time", &builders::sync_time(now)),
            Transaction::write_message(
                "push volume",
                &builders::music_volume(self.prefs.music_volume()),
            ),
            Transaction::write_message("request reminders", &builders::request_reminders()),
        ];

        for event in self.config.upcoming_events.clone() {
            match builders::calendar_event(&event) {
                Ok(message) => {
                    batch.push(Transaction::write_message("push calendar event", &message));
                }
                Err(err) => {
                    warn!("skipping calendar event: {err}");
                    self.sink.on_warning(&format!("skipping calendar event: {err}"));
                }
            }
        }

        Ok(batch)
    }

    /// Feed one inbound notification chunk.
    ///
    /// Reassembles fragments, decodes the frame, and dispatches to the
    /// opcode handler. Malformed frames, unknown opcodes, and persistence
    /// failures are reported through the sink and skipped; only transport
    /// level failures propagate.
    ///
    /// # Errors
    ///
    /// Returns errors that are not wire-recoverable.
    pub fn handle_notification(
        &mut self,
        channel: Channel,
        chunk: &[u8],
    ) -> Result<Vec<Transaction>> {
        let buffer = match channel {
            Channel::Ack => &mut self.ack_buffer,
            Channel::Notify => &mut self.notify_buffer,
        };
        let Some(frame) = buffer.push_chunk(chunk) else {
            return Ok(Vec::new());
        };

        let message = match Message::from_bytes(&frame) {
            Ok(message) => message,
            Err(err) => {
                warn!("dropping frame on {} channel: {err}", channel.name());
                self.sink.on_warning(&format!("{err}"));
                return Ok(Vec::new());
            }
        };

        debug!(
            "dispatching opcode {:02X} on {} channel ({} payload bytes)",
            message.opcode,
            channel.name(),
            message.payload.len()
        );

        let Some(handler) = self.handlers.get(&(channel, message.opcode)).copied() else {
            let err = ZeTimeError::UnknownOpcode {
                channel: channel.name(),
                opcode: message.opcode,
            };
            warn!("{err}");
            self.sink.on_warning(&format!("{err}"));
            return Ok(Vec::new());
        };

        let mut followups = Vec::new();
        match handler(self, &message, &mut followups) {
            Ok(()) => Ok(followups),
            Err(err) if err.is_wire_recoverable() => {
                warn!("{err}");
                self.sink.on_warning(&format!("{err}"));
                Ok(followups)
            }
            Err(err) => Err(err),
        }
    }

    /// Start the activity backlog fetch.
    ///
    /// The returned transaction asks the watch for fresh record counts;
    /// the count reply drives the per-category page requests.
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] when the session is not
    /// initialized or another long-running task owns it.
    pub fn request_recorded_data(&mut self) -> Result<Transaction> {
        self.set_busy_task("activity sync")?;
        self.fetching = true;
        Ok(Transaction::write_message(
            "request available data",
            &builders::request(Opcode::AvailableData),
        ))
    }

    /// Build the create/edit command for one alarm slot and remember the
    /// new encoding for the next edit of the same slot
    #[must_use]
    pub fn set_alarm(&mut self, alarm: &Alarm) -> Transaction {
        let core = builders::reminder_core(alarm, self.prefs.alarm_signal_code());
        let previous = self.reminder_cache.get(alarm.slot).copied();
        let message = builders::alarm_message(core, previous.as_ref());
        self.reminder_cache.insert(alarm.slot, core);
        Transaction::write_message("set alarm", &message)
    }

    /// Claim the session for a long-running task
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::NotReady`] when the session is not
    /// initialized or already busy.
    pub fn set_busy_task(&mut self, task: &'static str) -> Result<()> {
        match self.state {
            ConnectionState::Initialized => {
                self.state = ConnectionState::Busy;
                self.busy_task = Some(task);
                Ok(())
            }
            ConnectionState::Busy => Err(ZeTimeError::NotReady {
                reason: format!(
                    "busy with {}",
                    self.busy_task.unwrap_or("another task")
                ),
            }),
            other => Err(ZeTimeError::NotReady {
                reason: format!("session state is {other}"),
            }),
        }
    }

    /// Release the session after a long-running task
    pub fn unset_busy_task(&mut self) {
        if self.state == ConnectionState::Busy {
            self.state = ConnectionState::Initialized;
        }
        self.busy_task = None;
    }

    /// Drop all per-connection state after the link goes away
    pub fn on_disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.busy_task = None;
        self.fetching = false;
        self.ack_buffer.reset();
        self.notify_buffer.reset();
        self.counters.clear();
        self.reminder_cache.clear();
    }

    fn utc_offset_seconds(&self) -> i32 {
        self.config
            .utc_offset_seconds
            .unwrap_or_else(crate::types::local_utc_offset_seconds)
    }

    /// Convert a watch-local record timestamp to UTC seconds.
    ///
    /// A raw value small enough to land before the epoch (unset watch
    /// clock with a large positive offset) clamps to zero instead of
    /// wrapping.
    fn decode_timestamp(&self, raw: u32) -> u32 {
        let adjusted = i64::from(raw) + DEVICE_TIME_OFFSET - i64::from(self.utc_offset_seconds());
        u32::try_from(adjusted).unwrap_or(0)
    }

    fn persist(&self, sample: &ActivitySample) {
        if let Err(err) = self.store.add_sample(sample) {
            warn!("failed to persist {} sample: {err}", sample.kind());
            self.sink
                .on_warning(&format!("failed to persist {} sample: {err}", sample.kind()));
        }
    }

    /// Account one backlog page and, on category completion, queue the
    /// delete command and the next category's request
    fn advance_fetch(&mut self, kind: SampleKind, seq: u32, out: &mut Vec<Transaction>) {
        let total = self.counters.total(kind);
        self.counters.set_received(kind, seq);
        self.sink.on_event(DeviceEvent::FetchProgress(FetchProgress {
            kind,
            received: seq,
            total,
        }));

        if seq < total {
            return;
        }

        info!("{kind} backlog complete ({total} records)");
        self.counters.reset_category(kind);
        if !self.prefs.keep_data_on_device() {
            out.push(Transaction::write_message(
                "delete transferred records",
                &builders::delete_category(kind),
            ));
        }

        match self.counters.next_pending() {
            Some(next) => {
                out.push(Transaction::write_message(
                    "request backlog page",
                    &builders::request_category(next),
                ));
            }
            None => {
                self.fetching = false;
                self.unset_busy_task();
                self.sink.on_event(DeviceEvent::FetchFinished);
            }
        }
    }

    // --- opcode handlers -------------------------------------------------

    fn handle_watch_id(&mut self, message: &Message, _out: &mut Vec<Transaction>) -> Result<()> {
        let id = String::from_utf8_lossy(&message.payload).trim().to_string();
        self.sink.on_event(DeviceEvent::WatchId(id));
        Ok(())
    }

    fn handle_device_version(
        &mut self,
        message: &Message,
        _out: &mut Vec<Transaction>,
    ) -> Result<()> {
        let (&sub, rest) = message.payload.split_first().ok_or_else(|| {
            ZeTimeError::MalformedFrame("empty version payload".to_string())
        })?;
        let version = String::from_utf8_lossy(rest).trim().to_string();

        match VersionSub::from_u8(sub) {
            Some(VersionSub::Firmware) => {
                self.sink.on_event(DeviceEvent::FirmwareVersion(version));
            }
            Some(VersionSub::Hardware) => {
                self.sink.on_event(DeviceEvent::HardwareVersion(version));
                // the hardware reply is the last init request answered on
                // this channel, so it completes the handshake
                if self.state == ConnectionState::Initializing {
                    info!("init handshake complete");
                    self.state = ConnectionState::Initialized;
                }
            }
            None => {
                return Err(ZeTimeError::MalformedFrame(format!(
                    "unknown version sub-request {sub:02X}"
                )));
            }
        }
        Ok(())
    }

    fn handle_battery(&mut self, message: &Message, _out: &mut Vec<Transaction>) -> Result<()> {
        if message.payload.is_empty() {
            return Err(ZeTimeError::MalformedFrame(
                "empty battery payload".to_string(),
            ));
        }
        let level = message.payload[0];
        let charging = message.payload.get(1).copied().unwrap_or(0);
        self.sink
            .on_event(DeviceEvent::Battery(BatteryReport::from_raw(level, charging)));
        Ok(())
    }

    fn handle_available_data(
        &mut self,
        message: &Message,
        out: &mut Vec<Transaction>,
    ) -> Result<()> {
        let steps = u32::from(read_u16_le(&message.payload, 0)?);
        let sleep = u32::from(read_u16_le(&message.payload, 2)?);
        let heart_rate = u32::from(read_u16_le(&message.payload, 4)?);

        self.counters.clear();
        self.counters.steps_total = steps;
        self.counters.sleep_total = sleep;
        self.counters.heart_rate_total = heart_rate;

        self.sink.on_event(DeviceEvent::BacklogCounts {
            steps,
            sleep,
            heart_rate,
        });

        if !self.fetching {
            // nonzero counts reported during init start the transfer on
            // their own; the handshake must already be complete, otherwise
            // the counts are only surfaced and the host asks later
            if self.counters.next_pending().is_none()
                || self.set_busy_task("activity sync").is_err()
            {
                return Ok(());
            }
            self.fetching = true;
        }

        match self.counters.next_pending() {
            Some(kind) => {
                info!("fetching backlog: {steps} step, {sleep} sleep, {heart_rate} heart-rate records");
                out.push(Transaction::write_message(
                    "request backlog page",
                    &builders::request_category(kind),
                ));
            }
            None => {
                self.fetching = false;
                self.unset_busy_task();
                self.sink.on_event(DeviceEvent::FetchFinished);
            }
        }
        Ok(())
    }

    fn handle_step_page(&mut self, message: &Message, out: &mut Vec<Transaction>) -> Result<()> {
        let seq = u32::from(read_u16_le(&message.payload, 0)?);
        let timestamp = self.decode_timestamp(read_u32_le(&message.payload, 2)?);
        let steps = read_u32_le(&message.payload, 6)?;

        self.persist(&ActivitySample::Steps { timestamp, steps });
        self.advance_fetch(SampleKind::Steps, seq, out);
        Ok(())
    }

    fn handle_sleep_page(&mut self, message: &Message, out: &mut Vec<Transaction>) -> Result<()> {
        let seq = u32::from(read_u16_le(&message.payload, 0)?);
        let timestamp = self.decode_timestamp(read_u32_le(&message.payload, 2)?);
        let stage = SleepStage::from_u8(read_u8(&message.payload, 6)?);

        self.persist(&ActivitySample::Sleep { timestamp, stage });
        self.advance_fetch(SampleKind::Sleep, seq, out);
        Ok(())
    }

    fn handle_heart_rate_page(
        &mut self,
        message: &Message,
        out: &mut Vec<Transaction>,
    ) -> Result<()> {
        let seq = u32::from(read_u16_le(&message.payload, 0)?);
        let records = &message.payload[2..];
        if records.len() % 5 != 0 {
            return Err(ZeTimeError::MalformedFrame(format!(
                "heart-rate page has {} trailing bytes",
                records.len() % 5
            )));
        }

        for record in records.chunks_exact(5) {
            let raw = u32::from_le_bytes([record[0], record[1], record[2], record[3]]);
            let sample = ActivitySample::HeartRate {
                timestamp: self.decode_timestamp(raw),
                bpm: record[4],
            };
            self.persist(&sample);
        }

        self.advance_fetch(SampleKind::HeartRate, seq, out);
        Ok(())
    }

    fn handle_reminders_readback(
        &mut self,
        message: &Message,
        _out: &mut Vec<Transaction>,
    ) -> Result<()> {
        if message.payload.len() % REMINDER_CORE_LEN != 0 {
            return Err(ZeTimeError::MalformedFrame(format!(
                "reminder readback of {} bytes is not slot-aligned",
                message.payload.len()
            )));
        }
        for chunk in message.payload.chunks_exact(REMINDER_CORE_LEN) {
            let mut core = [0u8; REMINDER_CORE_LEN];
            core.copy_from_slice(chunk);
            self.reminder_cache.insert(core[0], core);
        }
        debug!(
            "cached {} reminder slots from readback",
            message.payload.len() / REMINDER_CORE_LEN
        );
        Ok(())
    }

    fn handle_music_control(
        &mut self,
        message: &Message,
        _out: &mut Vec<Transaction>,
    ) -> Result<()> {
        let raw = read_u8(&message.payload, 0)?;
        let event = MusicEvent::from_u8(raw).ok_or_else(|| {
            ZeTimeError::MalformedFrame(format!("unknown music event {raw:02X}"))
        })?;
        self.sink.on_event(DeviceEvent::Music(event));
        Ok(())
    }

    fn handle_call_control(
        &mut self,
        message: &Message,
        _out: &mut Vec<Transaction>,
    ) -> Result<()> {
        let raw = read_u8(&message.payload, 0)?;
        let event = CallEvent::from_u8(raw).ok_or_else(|| {
            ZeTimeError::MalformedFrame(format!("unknown call event {raw:02X}"))
        })?;
        self.sink.on_event(DeviceEvent::Call(event));
        Ok(())
    }

    fn handle_realtime_steps(
        &mut self,
        message: &Message,
        _out: &mut Vec<Transaction>,
    ) -> Result<()> {
        let steps = read_u32_le(&message.payload, 0)?;
        self.sink.on_event(DeviceEvent::StepsToday(steps));
        Ok(())
    }

    fn handle_settings_ack(
        &mut self,
        message: &Message,
        _out: &mut Vec<Transaction>,
    ) -> Result<()> {
        let kind = match Opcode::from_u8(message.opcode) {
            Some(Opcode::DateTime) => SettingKind::DateTime,
            Some(Opcode::TimeSurface) => SettingKind::TimeSurface,
            Some(Opcode::Language) => SettingKind::Language,
            Some(Opcode::ShockMode) => SettingKind::ShockMode,
            Some(Opcode::UserInfo) => SettingKind::UserInfo,
            Some(Opcode::UserGoals) => SettingKind::UserGoals,
            Some(Opcode::AnalogMode) => SettingKind::AnalogMode,
            Some(Opcode::DoNotDisturb) => SettingKind::DoNotDisturb,
            Some(Opcode::InactivityAlert) => SettingKind::InactivityAlert,
            Some(Opcode::VolumeSettings) => SettingKind::Volume,
            Some(Opcode::DisplayTimeout) => SettingKind::DisplayTimeout,
            _ => {
                return Err(ZeTimeError::UnknownOpcode {
                    channel: Channel::Ack.name(),
                    opcode: message.opcode,
                })
            }
        };
        self.sink.on_event(DeviceEvent::SettingsConfirmed(kind));
        Ok(())
    }
}

fn read_u8(payload: &[u8], offset: usize) -> Result<u8> {
    payload.get(offset).copied().ok_or_else(|| {
        ZeTimeError::MalformedFrame(format!("payload too short for byte at offset {offset}"))
    })
}

fn read_u16_le(payload: &[u8], offset: usize) -> Result<u16> {
    payload
        .get(offset..offset + 2)
        .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
        .ok_or_else(|| {
            ZeTimeError::MalformedFrame(format!("payload too short for u16 at offset {offset}"))
        })
}

fn read_u32_le(payload: &[u8], offset: usize) -> Result<u32> {
    payload
        .get(offset..offset + 4)
        .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .ok_or_else(|| {
            ZeTimeError::MalformedFrame(format!("payload too short for u32 at offset {offset}"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Direction;
    use crate::types::InMemoryPrefs;
    use std::sync::Mutex;

    #[derive(Default)]
    struct TestSink {
        events: Mutex<Vec<DeviceEvent>>,
        warnings: Mutex<Vec<String>>,
    }

    impl TestSink {
        fn events(&self) -> Vec<DeviceEvent> {
            self.events.lock().unwrap().clone()
        }

        fn warnings(&self) -> Vec<String> {
            self.warnings.lock().unwrap().clone()
        }
    }

    impl EventSink for TestSink {
        fn on_event(&self, event: DeviceEvent) {
            self.events.lock().unwrap().push(event);
        }

        fn on_warning(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
    }

    #[derive(Default)]
    struct TestStore {
        samples: Mutex<Vec<ActivitySample>>,
        fail: bool,
    }

    impl SampleStore for TestStore {
        fn add_sample(&self, sample: &ActivitySample) -> Result<()> {
            if self.fail {
                return Err(ZeTimeError::Persistence("disk full".to_string()));
            }
            self.samples.lock().unwrap().push(sample.clone());
            Ok(())
        }
    }

    struct Fixture {
        session: Session,
        sink: Arc<TestSink>,
        store: Arc<TestStore>,
    }

    fn fixture_with(prefs: InMemoryPrefs, failing_store: bool) -> Fixture {
        let sink = Arc::new(TestSink::default());
        let store = Arc::new(TestStore {
            samples: Mutex::new(Vec::new()),
            fail: failing_store,
        });
        let config = SessionConfig {
            utc_offset_seconds: Some(3_600),
            upcoming_events: Vec::new(),
        };
        let session = Session::new(config, Arc::new(prefs), sink.clone(), store.clone());
        Fixture { session, sink, store }
    }

    fn fixture() -> Fixture {
        fixture_with(InMemoryPrefs::default(), false)
    }

    fn reply(opcode: Opcode, payload: Vec<u8>) -> Vec<u8> {
        Message::new(opcode, Direction::RequestRespond, payload)
            .to_bytes()
            .to_vec()
    }

    fn initialize(fixture: &mut Fixture) {
        fixture.session.begin_connect();
        fixture
            .session
            .begin_initialization(DateTimeParts {
                year: 2026,
                month: 8,
                day: 24,
                hour: 12,
                minute: 0,
                second: 0,
                utc_offset_quarter_hours: 4,
            })
            .unwrap();
        fixture
            .session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::DeviceVersion, b"\x02r2".to_vec()),
            )
            .unwrap();
        assert_eq!(fixture.session.state(), ConnectionState::Initialized);
    }

    fn step_page(seq: u16, raw_timestamp: u32, steps: u32) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&seq.to_le_bytes());
        payload.extend_from_slice(&raw_timestamp.to_le_bytes());
        payload.extend_from_slice(&steps.to_le_bytes());
        reply(Opcode::GetStepCount, payload)
    }

    fn sleep_page(seq: u16, raw_timestamp: u32, stage: u8) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&seq.to_le_bytes());
        payload.extend_from_slice(&raw_timestamp.to_le_bytes());
        payload.push(stage);
        reply(Opcode::GetSleepData, payload)
    }

    fn label_of(transaction: &Transaction) -> &'static str {
        transaction.label
    }

    #[test]
    fn test_init_batch_order() {
        let mut f = fixture();
        f.session.begin_connect();
        let batch = f
            .session
            .begin_initialization(DateTimeParts {
                year: 2026,
                month: 8,
                day: 24,
                hour: 12,
                minute: 0,
                second: 0,
                utc_offset_quarter_hours: 4,
            })
            .unwrap();

        let labels: Vec<&str> = batch.iter().map(label_of).collect();
        assert_eq!(
            labels,
            vec![
                "subscribe",
                "request watch id",
                "request firmware version",
                "request hardware version",
                "request battery",
                "push user profile",
                "push user goals",
                "push language",
                "request available data",
                "sync time",
                "push volume",
                "request reminders",
            ]
        );
        assert_eq!(f.session.state(), ConnectionState::Initializing);
    }

    #[test]
    fn test_init_requires_connecting_state() {
        let mut f = fixture();
        let result = f.session.begin_initialization(DateTimeParts {
            year: 2026,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            utc_offset_quarter_hours: 0,
        });
        assert!(matches!(result, Err(ZeTimeError::NotReady { .. })));
    }

    #[test]
    fn test_hardware_version_completes_handshake() {
        let mut f = fixture();
        f.session.begin_connect();
        f.session
            .begin_initialization(DateTimeParts {
                year: 2026,
                month: 8,
                day: 24,
                hour: 12,
                minute: 0,
                second: 0,
                utc_offset_quarter_hours: 4,
            })
            .unwrap();

        // the firmware reply alone must not complete the handshake
        f.session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::DeviceVersion, b"\x011.8.2".to_vec()),
            )
            .unwrap();
        assert_eq!(f.session.state(), ConnectionState::Initializing);

        f.session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::DeviceVersion, b"\x02r2".to_vec()),
            )
            .unwrap();
        assert_eq!(f.session.state(), ConnectionState::Initialized);

        let events = f.sink.events();
        assert!(events.contains(&DeviceEvent::FirmwareVersion("1.8.2".to_string())));
        assert!(events.contains(&DeviceEvent::HardwareVersion("r2".to_string())));
    }

    #[test]
    fn test_battery_report_event() {
        let mut f = fixture();
        initialize(&mut f);

        f.session
            .handle_notification(Channel::Ack, &reply(Opcode::BatteryPower, vec![18, 0]))
            .unwrap();

        assert!(f
            .sink
            .events()
            .contains(&DeviceEvent::Battery(BatteryReport::from_raw(18, 0))));
    }

    #[test]
    fn test_backlog_order_skips_empty_heart_rate() {
        let mut f = fixture();
        initialize(&mut f);

        f.session.request_recorded_data().unwrap();
        assert!(f.session.is_busy());

        // two step records, one sleep record, no heart-rate records
        let followups = f
            .session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![2, 0, 1, 0, 0, 0]),
            )
            .unwrap();
        assert_eq!(followups.len(), 1);
        assert_eq!(followups[0].label, "request backlog page");

        let followups = f
            .session
            .handle_notification(Channel::Ack, &step_page(1, 1_000, 500))
            .unwrap();
        assert!(followups.is_empty());

        // final step page: delete command, then straight to sleep because
        // the heart-rate category is empty
        let followups = f
            .session
            .handle_notification(Channel::Ack, &step_page(2, 1_060, 250))
            .unwrap();
        let labels: Vec<&str> = followups.iter().map(label_of).collect();
        assert_eq!(
            labels,
            vec!["delete transferred records", "request backlog page"]
        );
        assert_eq!(
            followups[1].ops[0],
            TransportOp::Write(
                Target::Write,
                builders::request_category(SampleKind::Sleep)
                    .to_bytes()
                    .to_vec()
            )
        );

        let followups = f
            .session
            .handle_notification(Channel::Ack, &sleep_page(1, 2_000, 2))
            .unwrap();
        assert_eq!(followups.len(), 1);
        assert_eq!(followups[0].label, "delete transferred records");

        assert!(!f.session.is_busy());
        assert_eq!(f.session.state(), ConnectionState::Initialized);
        assert!(f.sink.events().contains(&DeviceEvent::FetchFinished));
        assert_eq!(f.store.samples.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_keep_data_on_device_suppresses_delete() {
        let prefs = InMemoryPrefs {
            keep_data: true,
            ..InMemoryPrefs::default()
        };
        let mut f = fixture_with(prefs, false);
        initialize(&mut f);

        f.session.request_recorded_data().unwrap();
        f.session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![1, 0, 0, 0, 0, 0]),
            )
            .unwrap();

        let followups = f
            .session
            .handle_notification(Channel::Ack, &step_page(1, 1_000, 42))
            .unwrap();
        assert!(followups.is_empty());
        assert!(f.sink.events().contains(&DeviceEvent::FetchFinished));
    }

    #[test]
    fn test_empty_backlog_finishes_immediately() {
        let mut f = fixture();
        initialize(&mut f);

        f.session.request_recorded_data().unwrap();
        let followups = f
            .session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![0, 0, 0, 0, 0, 0]),
            )
            .unwrap();

        assert!(followups.is_empty());
        assert!(!f.session.is_busy());
        assert!(f.sink.events().contains(&DeviceEvent::FetchFinished));
    }

    #[test]
    fn test_init_counters_start_fetch_unprompted() {
        let mut f = fixture();
        initialize(&mut f);

        // counts arriving from the init batch's available-data request,
        // with no explicit fetch from the host
        let followups = f
            .session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![1, 0, 0, 0, 0, 0]),
            )
            .unwrap();

        assert!(f.session.is_busy());
        assert_eq!(followups.len(), 1);
        assert_eq!(followups[0].label, "request backlog page");

        let followups = f
            .session
            .handle_notification(Channel::Ack, &step_page(1, 1_000, 12))
            .unwrap();
        assert_eq!(followups[0].label, "delete transferred records");
        assert!(!f.session.is_busy());
        assert!(f.sink.events().contains(&DeviceEvent::FetchFinished));
        assert_eq!(f.store.samples.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_init_counters_with_empty_backlog_stay_idle() {
        let mut f = fixture();
        initialize(&mut f);

        let followups = f
            .session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![0, 0, 0, 0, 0, 0]),
            )
            .unwrap();

        assert!(followups.is_empty());
        assert!(!f.session.is_busy());
        assert!(f.sink.events().iter().any(|e| matches!(
            e,
            DeviceEvent::BacklogCounts {
                steps: 0,
                sleep: 0,
                heart_rate: 0,
            }
        )));
        assert!(!f.sink.events().contains(&DeviceEvent::FetchFinished));
    }

    #[test]
    fn test_counts_before_handshake_completion_only_surface() {
        let mut f = fixture();
        f.session.begin_connect();
        f.session
            .begin_initialization(DateTimeParts {
                year: 2026,
                month: 8,
                day: 24,
                hour: 12,
                minute: 0,
                second: 0,
                utc_offset_quarter_hours: 4,
            })
            .unwrap();

        // available-data reply arriving out of order, before the
        // hardware-version ack
        let followups = f
            .session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![3, 0, 0, 0, 0, 0]),
            )
            .unwrap();

        assert!(followups.is_empty());
        assert!(!f.session.is_busy());
        assert_eq!(f.session.state(), ConnectionState::Initializing);
    }

    #[test]
    fn test_timestamp_conversion() {
        // offset fixed to +3600 by the fixture; raw + 28800 - 3600
        let mut f = fixture();
        initialize(&mut f);

        f.session.request_recorded_data().unwrap();
        f.session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![1, 0, 0, 0, 0, 0]),
            )
            .unwrap();
        f.session
            .handle_notification(Channel::Ack, &step_page(1, 1_000_000, 77))
            .unwrap();

        let samples = f.store.samples.lock().unwrap();
        assert_eq!(
            samples[0],
            ActivitySample::Steps {
                timestamp: 1_000_000 + 28_800 - 3_600,
                steps: 77,
            }
        );
    }

    #[test]
    fn test_timestamp_clamps_below_epoch() {
        // +14h offset, the largest real UTC offset; a near-zero raw value
        // would otherwise wrap to a huge timestamp
        let sink = Arc::new(TestSink::default());
        let store = Arc::new(TestStore::default());
        let config = SessionConfig {
            utc_offset_seconds: Some(50_400),
            upcoming_events: Vec::new(),
        };
        let mut session = Session::new(
            config,
            Arc::new(InMemoryPrefs::default()),
            sink,
            store.clone(),
        );

        session.begin_connect();
        session
            .begin_initialization(DateTimeParts {
                year: 2026,
                month: 8,
                day: 24,
                hour: 12,
                minute: 0,
                second: 0,
                utc_offset_quarter_hours: 56,
            })
            .unwrap();
        session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::DeviceVersion, b"\x02r2".to_vec()),
            )
            .unwrap();

        session.request_recorded_data().unwrap();
        session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![1, 0, 0, 0, 0, 0]),
            )
            .unwrap();
        session
            .handle_notification(Channel::Ack, &step_page(1, 1_000, 5))
            .unwrap();

        let samples = store.samples.lock().unwrap();
        assert_eq!(
            samples[0],
            ActivitySample::Steps {
                timestamp: 0,
                steps: 5,
            }
        );
    }

    #[test]
    fn test_heart_rate_page_with_multiple_records() {
        let mut f = fixture();
        initialize(&mut f);

        f.session.request_recorded_data().unwrap();
        f.session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![0, 0, 0, 0, 1, 0]),
            )
            .unwrap();

        let mut payload = 1u16.to_le_bytes().to_vec();
        for (raw, bpm) in [(5_000u32, 62u8), (5_060, 64), (5_120, 71)] {
            payload.extend_from_slice(&raw.to_le_bytes());
            payload.push(bpm);
        }
        f.session
            .handle_notification(Channel::Ack, &reply(Opcode::GetHeartRateData, payload))
            .unwrap();

        let samples = f.store.samples.lock().unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(
            samples[2],
            ActivitySample::HeartRate {
                timestamp: 5_120 + 28_800 - 3_600,
                bpm: 71,
            }
        );
    }

    #[test]
    fn test_persistence_failure_does_not_abort_fetch() {
        let mut f = fixture_with(InMemoryPrefs::default(), true);
        initialize(&mut f);

        f.session.request_recorded_data().unwrap();
        f.session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![1, 0, 0, 0, 0, 0]),
            )
            .unwrap();
        f.session
            .handle_notification(Channel::Ack, &step_page(1, 1_000, 10))
            .unwrap();

        assert!(f
            .sink
            .warnings()
            .iter()
            .any(|w| w.contains("persist")));
        assert!(f.sink.events().contains(&DeviceEvent::FetchFinished));
    }

    #[test]
    fn test_unknown_opcode_is_warned_and_ignored() {
        let mut f = fixture();
        initialize(&mut f);

        let frame = Message {
            opcode: 0x42,
            direction: Direction::RequestRespond,
            payload: vec![0x00],
        }
        .to_bytes();

        let followups = f.session.handle_notification(Channel::Ack, &frame).unwrap();
        assert!(followups.is_empty());
        assert!(f.sink.warnings().iter().any(|w| w.contains("42")));
    }

    #[test]
    fn test_malformed_frame_is_warned_and_dropped() {
        let mut f = fixture();
        initialize(&mut f);

        let followups = f
            .session
            .handle_notification(Channel::Ack, &[0x01, 0x02, 0x03])
            .unwrap();
        assert!(followups.is_empty());
        assert!(!f.sink.warnings().is_empty());
    }

    #[test]
    fn test_music_and_call_events_on_notify_channel() {
        let mut f = fixture();
        initialize(&mut f);

        f.session
            .handle_notification(
                Channel::Notify,
                &Message::new(Opcode::MusicControl, Direction::Send, vec![0x01])
                    .to_bytes(),
            )
            .unwrap();
        f.session
            .handle_notification(
                Channel::Notify,
                &Message::new(Opcode::CallControl, Direction::Send, vec![0x03])
                    .to_bytes(),
            )
            .unwrap();

        let events = f.sink.events();
        assert!(events.contains(&DeviceEvent::Music(MusicEvent::Play)));
        assert!(events.contains(&DeviceEvent::Call(CallEvent::Mute)));
    }

    #[test]
    fn test_realtime_steps_on_notify_channel() {
        let mut f = fixture();
        initialize(&mut f);

        let mut payload = Vec::new();
        payload.extend_from_slice(&4_321u32.to_le_bytes());
        f.session
            .handle_notification(
                Channel::Notify,
                &Message::new(Opcode::GetStepCount, Direction::Send, payload).to_bytes(),
            )
            .unwrap();

        assert!(f.sink.events().contains(&DeviceEvent::StepsToday(4_321)));
    }

    #[test]
    fn test_settings_ack_event() {
        let mut f = fixture();
        initialize(&mut f);

        f.session
            .handle_notification(Channel::Ack, &reply(Opcode::Language, vec![0x01]))
            .unwrap();

        assert!(f
            .sink
            .events()
            .contains(&DeviceEvent::SettingsConfirmed(SettingKind::Language)));
    }

    #[test]
    fn test_alarm_edit_uses_cached_core() {
        let mut f = fixture();
        initialize(&mut f);

        let alarm = Alarm {
            slot: 1,
            year: 2026,
            month: 8,
            day: 25,
            hour: 7,
            minute: 0,
            repeat: 0,
            enabled: true,
        };
        let create = f.session.set_alarm(&alarm);
        let TransportOp::Write(_, create_bytes) = &create.ops[0] else {
            panic!("expected a write op");
        };
        let create_message = Message::from_bytes(create_bytes).unwrap();
        assert_eq!(create_message.payload.len(), 17);

        let mut edited = alarm;
        edited.minute = 30;
        let edit = f.session.set_alarm(&edited);
        let TransportOp::Write(_, edit_bytes) = &edit.ops[0] else {
            panic!("expected a write op");
        };
        let edit_message = Message::from_bytes(edit_bytes).unwrap();
        assert_eq!(edit_message.payload.len(), 27);
    }

    #[test]
    fn test_reminder_readback_populates_cache() {
        let mut f = fixture();
        initialize(&mut f);

        // one occupied slot reported by the watch
        let core = [3u8, 26, 8, 25, 6, 45, 0, 2, 1, 0];
        f.session
            .handle_notification(Channel::Ack, &reply(Opcode::Reminders, core.to_vec()))
            .unwrap();

        let alarm = Alarm {
            slot: 3,
            year: 2026,
            month: 8,
            day: 25,
            hour: 7,
            minute: 0,
            repeat: 0,
            enabled: true,
        };
        let txn = f.session.set_alarm(&alarm);
        let TransportOp::Write(_, bytes) = &txn.ops[0] else {
            panic!("expected a write op");
        };
        let message = Message::from_bytes(bytes).unwrap();
        // edit form, echoing the readback core
        assert_eq!(message.payload.len(), 27);
        assert_eq!(&message.payload[1..11], &core);
    }

    #[test]
    fn test_busy_session_rejects_second_task() {
        let mut f = fixture();
        initialize(&mut f);

        f.session.request_recorded_data().unwrap();
        let result = f.session.request_recorded_data();
        assert!(matches!(result, Err(ZeTimeError::NotReady { .. })));
    }

    #[test]
    fn test_disconnect_clears_session_state() {
        let mut f = fixture();
        initialize(&mut f);

        f.session.request_recorded_data().unwrap();
        f.session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![2, 0, 0, 0, 0, 0]),
            )
            .unwrap();

        // leave a partial frame buffered on the ack characteristic
        let oversized = reply(Opcode::Reminders, vec![0u8; 20]);
        let chunks = chunk_frame(&oversized);
        assert!(f
            .session
            .handle_notification(Channel::Ack, &chunks[0])
            .unwrap()
            .is_empty());

        f.session.on_disconnect();
        assert_eq!(f.session.state(), ConnectionState::Disconnected);
        assert!(!f.session.is_busy());

        // a reconnect starts from a clean slate: neither the old counters
        // nor the buffered partial frame may leak into the new fetch
        initialize(&mut f);
        f.session.request_recorded_data().unwrap();
        let followups = f
            .session
            .handle_notification(
                Channel::Ack,
                &reply(Opcode::AvailableData, vec![0, 0, 0, 0, 0, 0]),
            )
            .unwrap();
        assert!(followups.is_empty());
        assert!(f.sink.events().contains(&DeviceEvent::FetchFinished));
        assert!(f.sink.warnings().is_empty());
    }

    #[test]
    fn test_write_message_transaction_shape() {
        let message = builders::notification(&crate::types::NotificationPush {
            kind: crate::types::NotificationKind::Sms,
            title: "sender".to_string(),
            body: "a somewhat longer body that needs several chunks".to_string(),
        });
        let txn = Transaction::write_message("push notification", &message);

        let frame = message.to_bytes();
        let mut rejoined = Vec::new();
        for op in &txn.ops[..txn.ops.len() - 1] {
            let TransportOp::Write(Target::Write, chunk) = op else {
                panic!("expected write chunks first");
            };
            assert!(chunk.len() <= crate::fragment::MAX_CHUNK);
            rejoined.extend_from_slice(chunk);
        }
        assert_eq!(rejoined, frame.to_vec());
        assert_eq!(
            txn.ops.last(),
            Some(&TransportOp::Write(Target::Ack, vec![ACK_WRITE]))
        );
    }

    #[test]
    fn test_fragmented_inbound_frame_dispatches_once() {
        let mut f = fixture();
        initialize(&mut f);

        // a reply long enough to arrive in two notifications
        let core_a = [0u8, 26, 1, 1, 7, 0, 0, 2, 1, 0];
        let core_b = [1u8, 26, 1, 2, 8, 0, 0, 2, 1, 0];
        let mut payload = core_a.to_vec();
        payload.extend_from_slice(&core_b);
        let frame = reply(Opcode::Reminders, payload);
        assert!(frame.len() > crate::fragment::MAX_CHUNK);

        let chunks = chunk_frame(&frame);
        for chunk in &chunks[..chunks.len() - 1] {
            let followups = f.session.handle_notification(Channel::Ack, chunk).unwrap();
            assert!(followups.is_empty());
        }
        f.session
            .handle_notification(Channel::Ack, chunks.last().unwrap())
            .unwrap();
        assert!(f.sink.warnings().is_empty());
    }
}
