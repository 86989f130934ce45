use crate::error::{Result, ZeTimeError};
use bytes::{BufMut, Bytes, BytesMut};

/// Preamble byte opening every frame
pub const PREAMBLE: u8 = 0x6F;

/// Terminator byte closing every frame
pub const TERMINATOR: u8 = 0x8F;

/// Fixed per-frame overhead: preamble, opcode, direction, 2-byte length, terminator
pub const FRAME_OVERHEAD: usize = 6;

/// Byte written to the acknowledgement characteristic after the final chunk
/// of an outgoing message
pub const ACK_WRITE: u8 = 0x03;

/// Direction byte identifying who speaks and whether an answer is expected
///
/// Every frame carries one of these in byte 2. The watch answers `Request`
/// frames with `RequestRespond` frames on the acknowledgement channel;
/// `Send` frames push data without soliciting a payload back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Direction {
    /// Phone asks the watch for data
    Request = 0x70,
    /// Phone pushes data to the watch
    Send = 0x71,
    /// Watch answers a request
    RequestRespond = 0x80,
}

impl Direction {
    /// Convert from a raw direction byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x70 => Some(Self::Request),
            0x71 => Some(Self::Send),
            0x80 => Some(Self::RequestRespond),
            _ => None,
        }
    }
}

/// Command opcodes understood by the ZeTime protocol engine
///
/// The opcode is the single byte in frame position 1 identifying the
/// command/response category. Opcodes absent from this table are ignored
/// by the dispatcher (forward compatibility is by omission, the protocol
/// has no version negotiation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Watch identity string
    WatchId = 0x01,
    /// Firmware/hardware version, selected by a sub-request byte
    DeviceVersion = 0x02,
    /// Date and time synchronization
    DateTime = 0x04,
    /// Watch-face (time surface) settings
    TimeSurface = 0x05,
    /// Display language
    Language = 0x06,
    /// Battery level and charge state
    BatteryPower = 0x08,
    /// Vibration signaling strength
    ShockMode = 0x09,
    /// User profile (gender, age, height, weight)
    UserInfo = 0x10,
    /// Daily goals (steps, sleep, distance)
    UserGoals = 0x11,
    /// Analog/digital display mode
    AnalogMode = 0x18,
    /// Do-not-disturb window
    DoNotDisturb = 0x1A,
    /// Inactivity alert configuration
    InactivityAlert = 0x1C,
    /// Notification and ringtone volume
    VolumeSettings = 0x20,
    /// Screen backlight timeout
    DisplayTimeout = 0x25,
    /// Counts of buffered step/sleep/heart-rate records awaiting transfer
    AvailableData = 0x52,
    /// Delete confirmed-received step records from the watch
    DeleteStepCount = 0x53,
    /// Request one page of buffered step records
    GetStepCount = 0x54,
    /// Delete confirmed-received sleep records from the watch
    DeleteSleepData = 0x55,
    /// Request one page of buffered sleep records
    GetSleepData = 0x56,
    /// Delete confirmed-received heart-rate records from the watch
    DeleteHeartRateData = 0x5A,
    /// Request one page of buffered heart-rate records
    GetHeartRateData = 0x5B,
    /// Push a phone notification (SMS, email, app message, call)
    PushNotification = 0x76,
    /// Push a weather snapshot with a three-day forecast
    PushWeather = 0x77,
    /// Push a calendar event
    PushCalendarEvent = 0x78,
    /// Alarm/reminder slots
    Reminders = 0x97,
    /// Music control events echoed from the watch
    MusicControl = 0xD0,
    /// Call control events from the watch (accept/reject/mute)
    CallControl = 0xD1,
}

impl Opcode {
    /// Convert from a raw opcode byte
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::WatchId),
            0x02 => Some(Self::DeviceVersion),
            0x04 => Some(Self::DateTime),
            0x05 => Some(Self::TimeSurface),
            0x06 => Some(Self::Language),
            0x08 => Some(Self::BatteryPower),
            0x09 => Some(Self::ShockMode),
            0x10 => Some(Self::UserInfo),
            0x11 => Some(Self::UserGoals),
            0x18 => Some(Self::AnalogMode),
            0x1A => Some(Self::DoNotDisturb),
            0x1C => Some(Self::InactivityAlert),
            0x20 => Some(Self::VolumeSettings),
            0x25 => Some(Self::DisplayTimeout),
            0x52 => Some(Self::AvailableData),
            0x53 => Some(Self::DeleteStepCount),
            0x54 => Some(Self::GetStepCount),
            0x55 => Some(Self::DeleteSleepData),
            0x56 => Some(Self::GetSleepData),
            0x5A => Some(Self::DeleteHeartRateData),
            0x5B => Some(Self::GetHeartRateData),
            0x76 => Some(Self::PushNotification),
            0x77 => Some(Self::PushWeather),
            0x78 => Some(Self::PushCalendarEvent),
            0x97 => Some(Self::Reminders),
            0xD0 => Some(Self::MusicControl),
            0xD1 => Some(Self::CallControl),
            _ => None,
        }
    }
}

/// One complete protocol message
///
/// Frame layout on the wire:
/// - Byte 0: preamble (`0x6F`)
/// - Byte 1: opcode
/// - Byte 2: direction (`0x70` request, `0x71` send, `0x80` respond)
/// - Bytes 3-4: payload length, u16 little-endian, never zero
/// - Bytes 5..: payload
/// - Last byte: terminator (`0x8F`)
///
/// Total frame length is always `payload.len() + 6`. Messages are created
/// when encoding an outbound command or when reassembly completes for
/// inbound data, consumed immediately, and never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Raw opcode byte; kept raw so unknown opcodes survive to the
    /// dispatcher for logging
    pub opcode: u8,
    /// Direction byte
    pub direction: Direction,
    /// Payload data, at least one byte
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a new message
    #[must_use]
    pub fn new(opcode: Opcode, direction: Direction, payload: Vec<u8>) -> Self {
        Self {
            opcode: opcode as u8,
            direction,
            payload,
        }
    }

    /// Serialize the message to wire bytes
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + FRAME_OVERHEAD);

        buf.put_u8(PREAMBLE);
        buf.put_u8(self.opcode);
        buf.put_u8(self.direction as u8);
        buf.put_u16_le(self.payload.len() as u16);
        buf.extend_from_slice(&self.payload);
        buf.put_u8(TERMINATOR);

        buf.freeze()
    }

    /// Check whether a buffer is a structurally complete frame.
    ///
    /// Used by reassembly to distinguish a whole small frame from the
    /// first fragment of a larger one.
    #[must_use]
    pub fn is_well_formed(data: &[u8]) -> bool {
        if data.len() < FRAME_OVERHEAD + 1 {
            return false;
        }
        if data[0] != PREAMBLE || data[data.len() - 1] != TERMINATOR {
            return false;
        }
        let length = u16::from_le_bytes([data[3], data[4]]) as usize;
        length != 0 && length + FRAME_OVERHEAD == data.len()
    }

    /// Parse a message from wire bytes
    ///
    /// # Errors
    ///
    /// Returns [`ZeTimeError::MalformedFrame`] when the preamble or
    /// terminator byte is wrong, the length field is zero or disagrees
    /// with the buffer size, or the direction byte is unknown. Malformed
    /// frames are dropped by callers; the next notification may be an
    /// unrelated fragment or a fresh message.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < FRAME_OVERHEAD + 1 {
            return Err(ZeTimeError::MalformedFrame(format!(
                "frame too short: {} bytes",
                data.len()
            )));
        }

        if data[0] != PREAMBLE {
            return Err(ZeTimeError::MalformedFrame(format!(
                "bad preamble: {:02X}",
                data[0]
            )));
        }

        let opcode = data[1];
        let direction = Direction::from_u8(data[2]).ok_or_else(|| {
            ZeTimeError::MalformedFrame(format!("unknown direction byte: {:02X}", data[2]))
        })?;

        let length = u16::from_le_bytes([data[3], data[4]]) as usize;
        if length == 0 {
            return Err(ZeTimeError::MalformedFrame(
                "zero-length payload".to_string(),
            ));
        }
        if length + FRAME_OVERHEAD != data.len() {
            return Err(ZeTimeError::MalformedFrame(format!(
                "length field {} disagrees with frame size {}",
                length,
                data.len()
            )));
        }

        if data[data.len() - 1] != TERMINATOR {
            return Err(ZeTimeError::MalformedFrame(format!(
                "bad terminator: {:02X}",
                data[data.len() - 1]
            )));
        }

        Ok(Self {
            opcode,
            direction,
            payload: data[5..data.len() - 1].to_vec(),
        })
    }
}
