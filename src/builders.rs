//! Builders for every outbound command payload.
//!
//! Each builder is a pure function from typed inputs to a [`Message`];
//! nothing here touches the link or the session. Multi-byte integers are
//! little-endian throughout, matching the frame header's length field.

use crate::error::{Result, ZeTimeError};
use crate::protocol::{Direction, Message, Opcode};
use crate::types::{
    Alarm, CalendarEvent, DateTimeParts, DndWindow, InactivityAlert, NotificationPush, SampleKind,
    UserGoals, UserProfile, WeatherSnapshot,
};

/// Length of one encoded reminder slot
pub const REMINDER_CORE_LEN: usize = 10;

/// Number of reminder slots on the watch
pub const MAX_REMINDER_SLOTS: usize = 8;

/// Title cap for pushed notifications, in bytes
const MAX_TITLE: usize = 24;

/// Body cap for pushed notifications, in bytes
const MAX_BODY: usize = 120;

/// Sub-request byte selecting which version string to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VersionSub {
    /// Firmware revision
    Firmware = 0x01,
    /// Hardware revision
    Hardware = 0x02,
}

impl VersionSub {
    /// Convert from the sub-request byte echoed in the response
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Firmware),
            0x02 => Some(Self::Hardware),
            _ => None,
        }
    }
}

/// Last payload written to each reminder slot.
///
/// Editing a slot requires echoing the slot's previous 10-byte encoding
/// verbatim ahead of the new one, so the session remembers what it last
/// wrote. The cache is best-effort: it starts empty on connect and a slot
/// with no cached encoding is treated as free.
#[derive(Debug, Default)]
pub struct ReminderSlotCache {
    slots: [Option<[u8; REMINDER_CORE_LEN]>; MAX_REMINDER_SLOTS],
}

impl ReminderSlotCache {
    /// Create an empty cache
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [None; MAX_REMINDER_SLOTS],
        }
    }

    /// Last encoding written to a slot, if any
    #[must_use]
    pub fn get(&self, slot: u8) -> Option<&[u8; REMINDER_CORE_LEN]> {
        self.slots.get(slot as usize).and_then(Option::as_ref)
    }

    /// Record the encoding just written to a slot
    pub fn insert(&mut self, slot: u8, core: [u8; REMINDER_CORE_LEN]) {
        if let Some(entry) = self.slots.get_mut(slot as usize) {
            *entry = Some(core);
        }
    }

    /// Forget all slots (called on disconnect)
    pub fn clear(&mut self) {
        self.slots = [None; MAX_REMINDER_SLOTS];
    }
}

/// Encode the 10-byte core of one reminder slot
///
/// Layout: slot, year since 2000, month, day, hour, minute, weekday repeat
/// mask, signal code, enabled flag, reserved zero.
#[must_use]
pub fn reminder_core(alarm: &Alarm, signal_code: u8) -> [u8; REMINDER_CORE_LEN] {
    [
        alarm.slot,
        alarm.year.saturating_sub(2000) as u8,
        alarm.month,
        alarm.day,
        alarm.hour,
        alarm.minute,
        alarm.repeat,
        signal_code,
        u8::from(alarm.enabled),
        0x00,
    ]
}

/// Build a reminder create or edit command.
///
/// With no previous encoding the payload is an action byte plus the new
/// core (17 bytes total). With one, the watch expects the old core echoed
/// verbatim between the action byte and the new core (27 bytes total).
/// Both forms end with snooze interval, snooze count, and four reserved
/// bytes.
#[must_use]
pub fn alarm_message(
    core: [u8; REMINDER_CORE_LEN],
    previous: Option<&[u8; REMINDER_CORE_LEN]>,
) -> Message {
    let mut payload = Vec::with_capacity(1 + 2 * REMINDER_CORE_LEN + 6);

    match previous {
        None => {
            payload.push(0x00);
        }
        Some(old) => {
            payload.push(0x01);
            payload.extend_from_slice(old);
        }
    }
    payload.extend_from_slice(&core);
    // snooze interval (minutes), snooze count, reserved
    payload.extend_from_slice(&[5, 3, 0x00, 0x00, 0x00, 0x00]);

    Message::new(Opcode::Reminders, Direction::Send, payload)
}

/// Build the readback request for all reminder slots
#[must_use]
pub fn request_reminders() -> Message {
    request(Opcode::Reminders)
}

/// Build a time-sync command from wall-clock parts
#[must_use]
pub fn sync_time(parts: DateTimeParts) -> Message {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&parts.year.to_le_bytes());
    payload.push(parts.month);
    payload.push(parts.day);
    payload.push(parts.hour);
    payload.push(parts.minute);
    payload.push(parts.second);
    payload.push(parts.utc_offset_quarter_hours as u8);
    Message::new(Opcode::DateTime, Direction::Send, payload)
}

/// Build the user profile push
#[must_use]
pub fn user_profile(profile: UserProfile) -> Message {
    Message::new(
        Opcode::UserInfo,
        Direction::Send,
        vec![
            profile.gender as u8,
            profile.age,
            profile.height_cm,
            profile.weight_kg,
        ],
    )
}

/// Build the daily goals push
#[must_use]
pub fn user_goals(goals: UserGoals) -> Message {
    let mut payload = Vec::with_capacity(8);
    payload.extend_from_slice(&goals.steps.to_le_bytes());
    payload.extend_from_slice(&goals.sleep_minutes.to_le_bytes());
    payload.extend_from_slice(&goals.distance_m.to_le_bytes());
    Message::new(Opcode::UserGoals, Direction::Send, payload)
}

/// Build the display language push
#[must_use]
pub fn language(code: u8) -> Message {
    Message::new(Opcode::Language, Direction::Send, vec![code])
}

/// Build the screen backlight timeout push
#[must_use]
pub fn screen_timeout(seconds: u8) -> Message {
    Message::new(Opcode::DisplayTimeout, Direction::Send, vec![seconds])
}

/// Build the analog/digital mode push
#[must_use]
pub fn analog_mode(mode: u8) -> Message {
    Message::new(Opcode::AnalogMode, Direction::Send, vec![mode])
}

/// Build the vibration signaling push
#[must_use]
pub fn shock_mode(mode: u8) -> Message {
    Message::new(Opcode::ShockMode, Direction::Send, vec![mode])
}

/// Build the volume push
#[must_use]
pub fn music_volume(volume: u8) -> Message {
    Message::new(Opcode::VolumeSettings, Direction::Send, vec![volume])
}

/// Build the do-not-disturb window push.
///
/// `window` of `None` disables the feature; the watch keeps the last
/// configured times but stops honoring them.
#[must_use]
pub fn do_not_disturb(window: Option<DndWindow>) -> Message {
    let payload = match window {
        Some(w) => vec![0x01, w.start_hour, w.start_minute, w.end_hour, w.end_minute],
        None => vec![0x00, 0x00, 0x00, 0x00, 0x00],
    };
    Message::new(Opcode::DoNotDisturb, Direction::Send, payload)
}

/// Build the inactivity alert push
#[must_use]
pub fn inactivity_alert(alert: Option<InactivityAlert>) -> Message {
    let payload = match alert {
        Some(a) => vec![
            0x01,
            a.threshold_minutes,
            a.start_hour,
            a.start_minute,
            a.end_hour,
            a.end_minute,
            a.repeat,
        ],
        None => vec![0x00; 7],
    };
    Message::new(Opcode::InactivityAlert, Direction::Send, payload)
}

/// Truncate a string to at most `max` bytes on a char boundary
fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Build a phone notification push.
///
/// Title and body are truncated to the watch's display caps on UTF-8
/// character boundaries; the length prefixes always match the truncated
/// byte counts.
#[must_use]
pub fn notification(push: &NotificationPush) -> Message {
    let title = truncate_utf8(&push.title, MAX_TITLE);
    let body = truncate_utf8(&push.body, MAX_BODY);

    let mut payload = Vec::with_capacity(4 + title.len() + body.len());
    payload.push(push.kind as u8);
    payload.push(0x00);
    payload.push(title.len() as u8);
    payload.push(body.len() as u8);
    payload.extend_from_slice(title.as_bytes());
    payload.extend_from_slice(body.as_bytes());

    Message::new(Opcode::PushNotification, Direction::Send, payload)
}

/// Build a calendar event push
///
/// # Errors
///
/// Returns [`ZeTimeError::InvalidParameters`] for years before 2000, which
/// the single year-offset byte cannot represent.
pub fn calendar_event(event: &CalendarEvent) -> Result<Message> {
    if event.year < 2000 {
        return Err(ZeTimeError::InvalidParameters(format!(
            "calendar year {} predates the watch epoch",
            event.year
        )));
    }

    let title = truncate_utf8(&event.title, MAX_TITLE);
    let mut payload = Vec::with_capacity(7 + title.len());
    payload.push(event.operation as u8);
    payload.push((event.year - 2000) as u8);
    payload.push(event.month);
    payload.push(event.day);
    payload.push(event.hour);
    payload.push(event.minute);
    payload.push(title.len() as u8);
    payload.extend_from_slice(title.as_bytes());

    Ok(Message::new(
        Opcode::PushCalendarEvent,
        Direction::Send,
        payload,
    ))
}

/// Build a weather push: current conditions plus three forecast days
#[must_use]
pub fn weather(snapshot: &WeatherSnapshot) -> Message {
    let mut payload = Vec::with_capacity(12);
    payload.push(0x00);
    payload.push(snapshot.condition);
    payload.push(snapshot.temperature as u8);
    for day in &snapshot.forecast {
        payload.push(day.condition);
        payload.push(day.low as u8);
        payload.push(day.high as u8);
    }
    Message::new(Opcode::PushWeather, Direction::Send, payload)
}

/// Build a bare request for an opcode.
///
/// The length field can never be zero, so parameterless requests carry a
/// single placeholder byte.
#[must_use]
pub fn request(opcode: Opcode) -> Message {
    Message::new(opcode, Direction::Request, vec![0x00])
}

/// Build a firmware or hardware version request
#[must_use]
pub fn version_request(sub: VersionSub) -> Message {
    Message::new(Opcode::DeviceVersion, Direction::Request, vec![sub as u8])
}

/// Build the page request for one backlog category
#[must_use]
pub fn request_category(kind: SampleKind) -> Message {
    let opcode = match kind {
        SampleKind::Steps => Opcode::GetStepCount,
        SampleKind::Sleep => Opcode::GetSleepData,
        SampleKind::HeartRate => Opcode::GetHeartRateData,
    };
    request(opcode)
}

/// Build the delete command for one backlog category
#[must_use]
pub fn delete_category(kind: SampleKind) -> Message {
    let opcode = match kind {
        SampleKind::Steps => Opcode::DeleteStepCount,
        SampleKind::Sleep => Opcode::DeleteSleepData,
        SampleKind::HeartRate => Opcode::DeleteHeartRateData,
    };
    Message::new(opcode, Direction::Send, vec![0x00])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CalendarOperation, ForecastDay, Gender, NotificationKind};

    fn test_alarm() -> Alarm {
        Alarm {
            slot: 2,
            year: 2026,
            month: 8,
            day: 24,
            hour: 7,
            minute: 30,
            repeat: 0b0011111,
            enabled: true,
        }
    }

    #[test]
    fn test_reminder_core_layout() {
        let core = reminder_core(&test_alarm(), 0x02);
        assert_eq!(core, [2, 26, 8, 24, 7, 30, 0b0011111, 0x02, 1, 0]);
    }

    #[test]
    fn test_alarm_create_is_17_bytes() {
        let core = reminder_core(&test_alarm(), 0x02);
        let message = alarm_message(core, None);

        assert_eq!(message.payload.len(), 17);
        assert_eq!(message.payload[0], 0x00);
        assert_eq!(&message.payload[1..11], &core);
    }

    #[test]
    fn test_alarm_edit_is_27_bytes_and_echoes_old_core() {
        let mut old_alarm = test_alarm();
        old_alarm.hour = 6;
        let old_core = reminder_core(&old_alarm, 0x02);
        let new_core = reminder_core(&test_alarm(), 0x02);

        let message = alarm_message(new_core, Some(&old_core));

        assert_eq!(message.payload.len(), 27);
        assert_eq!(message.payload[0], 0x01);
        assert_eq!(&message.payload[1..11], &old_core);
        assert_eq!(&message.payload[11..21], &new_core);
    }

    #[test]
    fn test_slot_cache_round_trip() {
        let mut cache = ReminderSlotCache::new();
        assert!(cache.get(3).is_none());

        let core = reminder_core(&test_alarm(), 0x02);
        cache.insert(2, core);
        assert_eq!(cache.get(2), Some(&core));

        // out-of-range slots are ignored, not panics
        cache.insert(200, core);
        assert!(cache.get(200).is_none());

        cache.clear();
        assert!(cache.get(2).is_none());
    }

    #[test]
    fn test_sync_time_layout() {
        let message = sync_time(DateTimeParts {
            year: 2026,
            month: 8,
            day: 24,
            hour: 13,
            minute: 5,
            second: 42,
            utc_offset_quarter_hours: 8,
        });

        assert_eq!(message.opcode, Opcode::DateTime as u8);
        // 2026 = 0x07EA little-endian
        assert_eq!(message.payload, vec![0xEA, 0x07, 8, 24, 13, 5, 42, 8]);
    }

    #[test]
    fn test_sync_time_negative_offset() {
        let message = sync_time(DateTimeParts {
            year: 2026,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            utc_offset_quarter_hours: -20,
        });
        assert_eq!(message.payload[7], (-20i8) as u8);
    }

    #[test]
    fn test_user_goals_little_endian() {
        let message = user_goals(UserGoals {
            steps: 12_000,
            sleep_minutes: 480,
            distance_m: 8_000,
        });
        assert_eq!(
            message.payload,
            vec![0xE0, 0x2E, 0x00, 0x00, 0xE0, 0x01, 0x40, 0x1F]
        );
    }

    #[test]
    fn test_user_profile_layout() {
        let message = user_profile(UserProfile {
            gender: Gender::Female,
            age: 34,
            height_cm: 168,
            weight_kg: 61,
        });
        assert_eq!(message.payload, vec![0x01, 34, 168, 61]);
    }

    #[test]
    fn test_notification_truncates_on_char_boundary() {
        let push = NotificationPush {
            kind: NotificationKind::Sms,
            title: "héllo wörld this is a very long sender line".to_string(),
            body: "b".repeat(300),
        };
        let message = notification(&push);

        let title_len = message.payload[2] as usize;
        let body_len = message.payload[3] as usize;
        assert!(title_len <= 24);
        assert_eq!(body_len, 120);
        assert_eq!(message.payload.len(), 4 + title_len + body_len);

        // the truncated title must still be valid UTF-8
        let title = &message.payload[4..4 + title_len];
        assert!(std::str::from_utf8(title).is_ok());
    }

    #[test]
    fn test_calendar_event_layout() {
        let message = calendar_event(&CalendarEvent {
            operation: CalendarOperation::Set,
            year: 2026,
            month: 9,
            day: 1,
            hour: 10,
            minute: 0,
            title: "standup".to_string(),
        })
        .unwrap();

        assert_eq!(message.opcode, Opcode::PushCalendarEvent as u8);
        assert_eq!(&message.payload[..7], &[0x00, 26, 9, 1, 10, 0, 7]);
        assert_eq!(&message.payload[7..], b"standup");
    }

    #[test]
    fn test_calendar_event_rejects_pre_epoch_year() {
        let result = calendar_event(&CalendarEvent {
            operation: CalendarOperation::Set,
            year: 1999,
            month: 1,
            day: 1,
            hour: 0,
            minute: 0,
            title: String::new(),
        });
        assert!(matches!(result, Err(ZeTimeError::InvalidParameters(_))));
    }

    #[test]
    fn test_weather_is_12_bytes() {
        let day = ForecastDay {
            condition: 3,
            low: -2,
            high: 7,
        };
        let message = weather(&WeatherSnapshot {
            condition: 1,
            temperature: 4,
            forecast: [day; 3],
        });

        assert_eq!(message.payload.len(), 12);
        assert_eq!(message.payload[1], 1);
        assert_eq!(message.payload[2], 4);
        assert_eq!(message.payload[4], (-2i8) as u8);
    }

    #[test]
    fn test_requests_carry_placeholder_byte() {
        let message = request(Opcode::AvailableData);
        assert_eq!(message.direction, Direction::Request);
        assert_eq!(message.payload, vec![0x00]);

        let version = version_request(VersionSub::Hardware);
        assert_eq!(version.payload, vec![0x02]);
    }

    #[test]
    fn test_category_opcode_mapping() {
        assert_eq!(
            request_category(SampleKind::HeartRate).opcode,
            Opcode::GetHeartRateData as u8
        );
        assert_eq!(
            delete_category(SampleKind::Sleep).opcode,
            Opcode::DeleteSleepData as u8
        );
    }
}
