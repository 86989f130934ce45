#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # ZeTimers ⌚
//!
//! A Rust library for controlling MyKronoz ZeTime smartwatches via
//! Bluetooth Low Energy.
//!
//! The ZeTime speaks a framed binary protocol over a custom BLE service
//! with three characteristics: one the phone writes commands to, one the
//! watch answers on, and one the watch pushes unsolicited notifications
//! through. This crate implements the whole stack: the frame codec, the
//! 20-byte link fragmentation, the opcode dispatcher, the init handshake,
//! the offline activity backlog fetch, and builders for every outbound
//! command (alarms, notifications, weather, calendar, settings).
//!
//! ## Protocol Notes
//!
//! The wire format was worked out from captured traffic between the watch
//! and the official companion app:
//!
//! - **Framing**: preamble `0x6F`, opcode, direction byte, little-endian
//!   payload length, payload, terminator `0x8F`
//! - **Fragmentation**: at most 20 bytes per write or notification, with a
//!   single partial message in flight per characteristic
//! - **Handshake**: identity, versions, battery, profile, goals, clock
//!   sync, then the watch is ready for commands
//! - **Backlog**: step, heart-rate, and sleep records are pulled per
//!   category and deleted from the watch once confirmed received
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use zetimers::{
//!     ActivitySample, DeviceEvent, NotificationKind, NotificationPush, Result, ZeTimeDevice,
//! };
//!
//! struct Logger;
//!
//! impl zetimers::EventSink for Logger {
//!     fn on_event(&self, event: DeviceEvent) {
//!         println!("event: {event:?}");
//!     }
//!     fn on_warning(&self, message: &str) {
//!         eprintln!("warning: {message}");
//!     }
//! }
//!
//! impl zetimers::SampleStore for Logger {
//!     fn add_sample(&self, sample: &ActivitySample) -> Result<()> {
//!         println!("sample: {sample:?}");
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let logger = Arc::new(Logger);
//!     let watch = ZeTimeDevice::connect_first(logger.clone(), logger).await?;
//!
//!     watch
//!         .send_notification(&NotificationPush {
//!             kind: NotificationKind::Sms,
//!             title: "Alice".to_string(),
//!             body: "running late, see you at 7".to_string(),
//!         })
//!         .await?;
//!
//!     watch.fetch_recorded_data().await?;
//!
//!     Ok(())
//! }
//! ```

/// Bluetooth Low Energy communication module
pub mod ble;
/// Builders for outbound command payloads
pub mod builders;
/// Main device control interface
pub mod device;
/// Error types and handling
pub mod error;
/// Link-layer fragmentation and reassembly
pub mod fragment;
/// Frame codec: message structure, opcodes, and parsing
pub mod protocol;
/// Session state machine and inbound dispatcher
pub mod session;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use device::ZeTimeDevice;
pub use error::{Result, ZeTimeError};
pub use session::{Channel, Session, SessionConfig, Transaction};
pub use types::{
    ActivitySample, Alarm, BatteryReport, BatteryState, CalendarEvent, CalendarOperation,
    CallEvent, ConnectionParams, ConnectionState, DateTimeParts, DeviceEvent, DeviceInfo,
    DeviceVersion, DndWindow, EventSink, FetchProgress, ForecastDay, Gender, InMemoryPrefs,
    InactivityAlert,
    MusicEvent, NotificationKind, NotificationPush, PreferenceStore, SampleKind, SampleStore,
    SettingKind, SleepStage, UserGoals, UserProfile, WeatherSnapshot,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// ZeTime BLE service UUID
///
/// All protocol characteristics live under this custom service; it also
/// appears in the watch's advertisement data and is used to filter scan
/// results.
pub const ZETIME_SERVICE_UUID: &str = "00008000-0000-1000-8000-00805F9B34FB";

/// Write characteristic UUID for phone-to-watch commands
///
/// Encoded frames are written here in 20-byte chunks, followed by a
/// confirmation byte on the ack characteristic.
pub const ZETIME_WRITE_CHAR_UUID: &str = "00008001-0000-1000-8000-00805F9B34FB";

/// Ack characteristic UUID
///
/// The watch answers requests on this characteristic; the phone also
/// writes the end-of-message confirmation byte here after the final chunk
/// of each outgoing frame.
pub const ZETIME_ACK_CHAR_UUID: &str = "00008002-0000-1000-8000-00805F9B34FB";

/// Notify characteristic UUID for unsolicited watch-to-phone pushes
///
/// Music control, call control, and realtime step totals arrive here
/// without a preceding request.
pub const ZETIME_NOTIFY_CHAR_UUID: &str = "00008003-0000-1000-8000-00805F9B34FB";
