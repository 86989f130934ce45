use chrono::{Datelike, Local, Offset, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Connection/initialization state of one watch session
///
/// Transitions are one-directional (`Disconnected → Connecting →
/// Initializing → Initialized`) except `Initialized ⇄ Busy`, used for
/// long-running operations such as the activity backlog fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link to the watch
    Disconnected,
    /// BLE connection being established
    Connecting,
    /// Init handshake in flight
    Initializing,
    /// Handshake complete, watch accepts commands
    Initialized,
    /// A long-running operation owns the session
    Busy,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Initialized => write!(f, "Initialized"),
            Self::Busy => write!(f, "Busy"),
        }
    }
}

/// Battery charge state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryState {
    /// Discharging at a comfortable level
    Normal,
    /// Discharging, 25% or lower
    Low,
    /// On the charger
    Charging,
}

/// Battery report from the watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryReport {
    /// Charge level in percent
    pub level: u8,
    /// Charge state
    pub state: BatteryState,
}

impl BatteryReport {
    /// Build a report from the raw level and charging bytes
    #[must_use]
    pub const fn from_raw(level: u8, charging: u8) -> Self {
        let state = if charging != 0 {
            BatteryState::Charging
        } else if level <= 25 {
            BatteryState::Low
        } else {
            BatteryState::Normal
        };
        Self { level, state }
    }
}

/// Firmware and hardware version strings reported during init
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceVersion {
    /// Firmware revision string
    pub firmware: Option<String>,
    /// Hardware revision string
    pub hardware: Option<String>,
}

/// Category of backlog activity records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
    /// Step counter records
    Steps,
    /// Sleep stage records
    Sleep,
    /// Heart-rate measurements
    HeartRate,
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steps => write!(f, "steps"),
            Self::Sleep => write!(f, "sleep"),
            Self::HeartRate => write!(f, "heart rate"),
        }
    }
}

/// Sleep stage carried by a sleep record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SleepStage {
    /// Light sleep
    Light,
    /// Deep sleep
    Deep,
    /// Awake during the tracked window
    Awake,
}

impl SleepStage {
    /// Convert from the raw stage byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Awake,
            2 => Self::Deep,
            _ => Self::Light,
        }
    }
}

/// One decoded activity record, timestamped in UTC seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivitySample {
    /// A step-counter record
    Steps {
        /// UTC timestamp in seconds
        timestamp: u32,
        /// Steps accumulated in the record's interval
        steps: u32,
    },
    /// A sleep record
    Sleep {
        /// UTC timestamp in seconds
        timestamp: u32,
        /// Sleep stage
        stage: SleepStage,
    },
    /// A heart-rate measurement
    HeartRate {
        /// UTC timestamp in seconds
        timestamp: u32,
        /// Beats per minute
        bpm: u8,
    },
}

impl ActivitySample {
    /// Category of this sample
    #[must_use]
    pub const fn kind(&self) -> SampleKind {
        match self {
            Self::Steps { .. } => SampleKind::Steps,
            Self::Sleep { .. } => SampleKind::Sleep,
            Self::HeartRate { .. } => SampleKind::HeartRate,
        }
    }
}

/// One alarm occupying a reminder slot on the watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    /// Reminder slot index on the watch
    pub slot: u8,
    /// Four-digit year of the first occurrence
    pub year: u16,
    /// Month 1-12
    pub month: u8,
    /// Day of month 1-31
    pub day: u8,
    /// Hour 0-23
    pub hour: u8,
    /// Minute 0-59
    pub minute: u8,
    /// Weekday repeat bitmask, bit 0 = Monday; zero for one-shot
    pub repeat: u8,
    /// Whether the alarm rings
    pub enabled: bool,
}

/// Operation byte of a calendar event push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CalendarOperation {
    /// Add or replace the event
    Set = 0x00,
    /// Remove the event
    Delete = 0x01,
}

/// A calendar event pushed to the watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Set or delete
    pub operation: CalendarOperation,
    /// Four-digit year
    pub year: u16,
    /// Month 1-12
    pub month: u8,
    /// Day of month 1-31
    pub day: u8,
    /// Hour 0-23
    pub hour: u8,
    /// Minute 0-59
    pub minute: u8,
    /// Event title, truncated to the watch's cap when encoded
    pub title: String,
}

/// One forecast day in a weather push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastDay {
    /// Condition code from the watch's icon table
    pub condition: u8,
    /// Low temperature, degrees Celsius
    pub low: i8,
    /// High temperature, degrees Celsius
    pub high: i8,
}

/// Weather snapshot pushed to the watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    /// Current condition code
    pub condition: u8,
    /// Current temperature, degrees Celsius
    pub temperature: i8,
    /// Three-day forecast
    pub forecast: [ForecastDay; 3],
}

/// Category byte of a pushed notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NotificationKind {
    /// Incoming call alert
    IncomingCall = 0x01,
    /// Missed call alert
    MissedCall = 0x02,
    /// SMS
    Sms = 0x03,
    /// Email
    Email = 0x04,
    /// Social app message
    Social = 0x05,
    /// Calendar reminder
    Calendar = 0x06,
    /// Anything else
    Generic = 0x07,
}

/// A phone notification forwarded to the watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPush {
    /// Notification category
    pub kind: NotificationKind,
    /// Sender or title line
    pub title: String,
    /// Body text
    pub body: String,
}

/// Music control event echoed from the watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MusicEvent {
    /// Start playback
    Play,
    /// Pause playback
    Pause,
    /// Skip to the next track
    Next,
    /// Skip to the previous track
    Previous,
    /// Raise volume
    VolumeUp,
    /// Lower volume
    VolumeDown,
}

impl MusicEvent {
    /// Convert from the raw event byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Play),
            0x02 => Some(Self::Pause),
            0x03 => Some(Self::Next),
            0x04 => Some(Self::Previous),
            0x05 => Some(Self::VolumeUp),
            0x06 => Some(Self::VolumeDown),
            _ => None,
        }
    }
}

/// Call control event from the watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallEvent {
    /// Accept the incoming call
    Accept,
    /// Reject the incoming call
    Reject,
    /// Mute the ringer
    Mute,
}

impl CallEvent {
    /// Convert from the raw event byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Accept),
            0x02 => Some(Self::Reject),
            0x03 => Some(Self::Mute),
            _ => None,
        }
    }
}

/// Setting category acknowledged by the watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingKind {
    /// Watch-face settings
    TimeSurface,
    /// Vibration signaling
    ShockMode,
    /// Do-not-disturb window
    DoNotDisturb,
    /// Analog/digital mode
    AnalogMode,
    /// Inactivity alert
    InactivityAlert,
    /// Volume
    Volume,
    /// Display language
    Language,
    /// Date and time
    DateTime,
    /// User profile
    UserInfo,
    /// Daily goals
    UserGoals,
    /// Screen timeout
    DisplayTimeout,
}

/// Progress of one backlog category transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchProgress {
    /// Category being transferred
    pub kind: SampleKind,
    /// Records received so far
    pub received: u32,
    /// Records the watch reported as available
    pub total: u32,
}

impl FetchProgress {
    /// Fractional progress in percent
    #[must_use]
    pub const fn percent(&self) -> u32 {
        if self.total == 0 {
            100
        } else {
            self.received * 100 / self.total
        }
    }
}

/// Typed events emitted by the dispatcher toward the host application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Battery level/state, from init or a low-battery push
    Battery(BatteryReport),
    /// Watch identity string
    WatchId(String),
    /// Firmware revision string
    FirmwareVersion(String),
    /// Hardware revision string; receiving this completes initialization
    HardwareVersion(String),
    /// Realtime step total for today
    StepsToday(u32),
    /// Music control echoed from the watch
    Music(MusicEvent),
    /// Call control from the watch
    Call(CallEvent),
    /// The watch acknowledged a settings push
    SettingsConfirmed(SettingKind),
    /// Backlog record counts reported by the watch
    BacklogCounts {
        /// Buffered step records
        steps: u32,
        /// Buffered sleep records
        sleep: u32,
        /// Buffered heart-rate records
        heart_rate: u32,
    },
    /// One backlog page landed
    FetchProgress(FetchProgress),
    /// All backlog categories transferred
    FetchFinished,
}

/// Sink for typed device events and non-fatal error reports.
///
/// The session owns one sink per connection and calls it from the inbound
/// dispatch path; implementations must not block.
pub trait EventSink: Send + Sync {
    /// Deliver a typed event
    fn on_event(&self, event: DeviceEvent);

    /// Surface a non-fatal condition (malformed frame, unknown opcode,
    /// failed sample persistence) to the user-facing error channel
    fn on_warning(&self, message: &str);
}

/// Persistence boundary for decoded activity samples.
///
/// Failures are reported through the [`EventSink`] and the corresponding
/// page is marked failed, but a dropped sample never halts the backlog
/// transfer.
pub trait SampleStore: Send + Sync {
    /// Persist one decoded sample
    ///
    /// # Errors
    ///
    /// Returns [`crate::ZeTimeError::Persistence`] when the sample cannot
    /// be saved.
    fn add_sample(&self, sample: &ActivitySample) -> Result<()>;
}

/// User gender as encoded in the profile push
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Gender {
    /// Male
    Male = 0x00,
    /// Female
    Female = 0x01,
    /// Not specified
    Unspecified = 0x02,
}

/// User profile pushed during init
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Gender
    pub gender: Gender,
    /// Age in years
    pub age: u8,
    /// Height in centimeters
    pub height_cm: u8,
    /// Weight in kilograms
    pub weight_kg: u8,
}

impl Default for UserProfile {
    fn default() -> Self {
        Self {
            gender: Gender::Unspecified,
            age: 30,
            height_cm: 175,
            weight_kg: 70,
        }
    }
}

/// Daily goals pushed during init
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGoals {
    /// Daily step goal
    pub steps: u32,
    /// Sleep goal in minutes
    pub sleep_minutes: u16,
    /// Distance goal in meters
    pub distance_m: u16,
}

impl Default for UserGoals {
    fn default() -> Self {
        Self {
            steps: 10_000,
            sleep_minutes: 480,
            distance_m: 5_000,
        }
    }
}

/// Do-not-disturb window, start to end in watch-local time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DndWindow {
    /// Start hour 0-23
    pub start_hour: u8,
    /// Start minute 0-59
    pub start_minute: u8,
    /// End hour 0-23
    pub end_hour: u8,
    /// End minute 0-59
    pub end_minute: u8,
}

/// Inactivity alert configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivityAlert {
    /// Minutes of stillness before the watch nags
    pub threshold_minutes: u8,
    /// Active window start hour
    pub start_hour: u8,
    /// Active window start minute
    pub start_minute: u8,
    /// Active window end hour
    pub end_hour: u8,
    /// Active window end minute
    pub end_minute: u8,
    /// Weekday bitmask, bit 0 = Monday
    pub repeat: u8,
}

/// Configuration slice consumed by the outbound builders.
///
/// Each builder reads its own small slice; the session never caches
/// preference values across commands.
pub trait PreferenceStore: Send + Sync {
    /// User profile for the init push
    fn user_profile(&self) -> UserProfile;
    /// Daily goals for the init push
    fn user_goals(&self) -> UserGoals;
    /// Display language code byte
    fn language_code(&self) -> u8;
    /// Screen backlight timeout in seconds
    fn screen_timeout_secs(&self) -> u8;
    /// Do-not-disturb window, if enabled
    fn dnd_window(&self) -> Option<DndWindow>;
    /// Inactivity alert, if enabled
    fn inactivity_alert(&self) -> Option<InactivityAlert>;
    /// Analog/digital display mode byte
    fn analog_mode(&self) -> u8;
    /// Vibration signaling code
    fn shock_mode(&self) -> u8;
    /// Signaling code embedded in alarm payloads
    fn alarm_signal_code(&self) -> u8;
    /// Notification/ringtone volume 0-100
    fn music_volume(&self) -> u8;
    /// When set, confirmed-received backlog data is left on the watch
    /// instead of being deleted after transfer
    fn keep_data_on_device(&self) -> bool;
}

/// In-memory [`PreferenceStore`] with sensible defaults, used by demos
/// and tests
#[derive(Debug, Clone)]
pub struct InMemoryPrefs {
    /// User profile
    pub profile: UserProfile,
    /// Daily goals
    pub goals: UserGoals,
    /// Language code byte
    pub language: u8,
    /// Screen timeout seconds
    pub screen_timeout: u8,
    /// Do-not-disturb window
    pub dnd: Option<DndWindow>,
    /// Inactivity alert
    pub inactivity: Option<InactivityAlert>,
    /// Analog mode byte
    pub analog: u8,
    /// Shock mode byte
    pub shock: u8,
    /// Alarm signaling code
    pub alarm_signal: u8,
    /// Volume 0-100
    pub volume: u8,
    /// Keep backlog data on the watch after transfer
    pub keep_data: bool,
}

impl Default for InMemoryPrefs {
    fn default() -> Self {
        Self {
            profile: UserProfile::default(),
            goals: UserGoals::default(),
            language: 0x00,
            screen_timeout: 30,
            dnd: None,
            inactivity: None,
            analog: 0x00,
            shock: 0x02,
            alarm_signal: 0x02,
            volume: 60,
            keep_data: false,
        }
    }
}

impl PreferenceStore for InMemoryPrefs {
    fn user_profile(&self) -> UserProfile {
        self.profile
    }
    fn user_goals(&self) -> UserGoals {
        self.goals
    }
    fn language_code(&self) -> u8 {
        self.language
    }
    fn screen_timeout_secs(&self) -> u8 {
        self.screen_timeout
    }
    fn dnd_window(&self) -> Option<DndWindow> {
        self.dnd
    }
    fn inactivity_alert(&self) -> Option<InactivityAlert> {
        self.inactivity
    }
    fn analog_mode(&self) -> u8 {
        self.analog
    }
    fn shock_mode(&self) -> u8 {
        self.shock
    }
    fn alarm_signal_code(&self) -> u8 {
        self.alarm_signal
    }
    fn music_volume(&self) -> u8 {
        self.volume
    }
    fn keep_data_on_device(&self) -> bool {
        self.keep_data
    }
}

/// Wall-clock parts for the time-sync command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeParts {
    /// Four-digit year
    pub year: u16,
    /// Month 1-12
    pub month: u8,
    /// Day of month 1-31
    pub day: u8,
    /// Hour 0-23
    pub hour: u8,
    /// Minute 0-59
    pub minute: u8,
    /// Second 0-59
    pub second: u8,
    /// UTC offset including DST, in quarter hours
    pub utc_offset_quarter_hours: i8,
}

impl DateTimeParts {
    /// Capture the current local wall clock
    #[must_use]
    pub fn now_local() -> Self {
        let now = Local::now();
        let offset_seconds = now.offset().fix().local_minus_utc();
        Self {
            year: now.year() as u16,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
            utc_offset_quarter_hours: (offset_seconds / 900) as i8,
        }
    }
}

/// Current local timezone+DST offset from UTC, in seconds
#[must_use]
pub fn local_utc_offset_seconds() -> i32 {
    Local::now().offset().fix().local_minus_utc()
}

/// Information about a discovered watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Advertised device name
    pub name: String,
    /// MAC address, when the platform exposes it
    pub mac_address: Option<String>,
    /// Signal strength (RSSI)
    pub rssi: i16,
}

impl DeviceInfo {
    /// Create new device info
    #[must_use]
    pub const fn new(name: String, rssi: i16) -> Self {
        Self {
            name,
            mac_address: None,
            rssi,
        }
    }
}

/// Connection parameters
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    /// Connection and init-handshake timeout in milliseconds
    pub timeout_ms: u64,
    /// Scan duration in milliseconds
    pub scan_timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            scan_timeout_ms: 10_000,
        }
    }
}
