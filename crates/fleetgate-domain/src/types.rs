use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DomainError;

/// Vendor CAN dialect assigned to a device at registration.
///
/// Resolved once per session when the device identifies itself; never
/// re-guessed per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanDialect {
    J1939,
    Obd2,
    Volvo,
    Scania,
}

impl CanDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanDialect::J1939 => "j1939",
            CanDialect::Obd2 => "obd2",
            CanDialect::Volvo => "volvo",
            CanDialect::Scania => "scania",
        }
    }
}

impl std::str::FromStr for CanDialect {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "j1939" => Ok(CanDialect::J1939),
            "obd2" => Ok(CanDialect::Obd2),
            "volvo" => Ok(CanDialect::Volvo),
            "scania" => Ok(CanDialect::Scania),
            other => Err(DomainError::InvalidDialect(other.to_string())),
        }
    }
}

/// Wire frame type tag, closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Position,
    CanStandard,
    CanExtended,
    Event,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Position => "position",
            FrameType::CanStandard => "can_standard",
            FrameType::CanExtended => "can_extended",
            FrameType::Event => "event",
        }
    }
}

/// Domain representation of a field device.
///
/// Created on the first frame from an unseen identity, touched on every
/// subsequent frame; never deleted by the ingestion core.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub device_id: String,
    pub imei: Option<String>,
    pub name: String,
    pub tenant_id: Option<Uuid>,
    pub dialect: CanDialect,
    pub last_seen: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Input for the upsert performed at session identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertDeviceInput {
    pub device_id: String,
    pub seen_at: DateTime<Utc>,
}

/// One decoded GPS fix. Immutable after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub course: f64,
    pub altitude: Option<f64>,
    pub satellites: i16,
    pub hdop: Option<f64>,
    /// Fix time as reported by the device.
    pub fix_time: DateTime<Utc>,
    /// Server receipt time; non-decreasing within one session stream.
    pub received_at: DateTime<Utc>,
}

/// One decoded CAN bus frame (identifier + up to 8 payload bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    pub device_id: String,
    pub can_id: u32,
    pub extended: bool,
    pub data: Vec<u8>,
    pub received_at: DateTime<Utc>,
    /// Fix time of the nearest preceding position in the same session,
    /// used by the query side to geo-correlate CAN data.
    pub position_time: Option<DateTime<Utc>>,
}

/// One physical value extracted from a CAN frame by a signal definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CanSignal {
    pub device_id: String,
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
    pub pgn: Option<u16>,
    pub spn: Option<u32>,
    pub mode: Option<u8>,
    pub pid: Option<u8>,
    pub signal_time: DateTime<Utc>,
}

/// Audit copy of every syntactically framed input, kept even when the
/// downstream field decode fails.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub device_id: Option<String>,
    pub frame_type: FrameType,
    pub raw: String,
    /// Best-effort parsed structure for the query side.
    pub parsed: Option<serde_json::Value>,
    pub remote_addr: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Pipeline stage at which a decode failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStage {
    Framing,
    Field,
    Signal,
    Persist,
}

impl DecodeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecodeStage::Framing => "framing",
            DecodeStage::Field => "field",
            DecodeStage::Signal => "signal",
            DecodeStage::Persist => "persist",
        }
    }
}

/// A frame or payload that failed to parse. Purely observational; never
/// blocks the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub device_id: Option<String>,
    pub stage: DecodeStage,
    pub message: String,
    pub raw: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub name: String,
}

/// Quota resource types. One enforced kind today; the schema keeps room
/// for more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaKind {
    FramesPerDay,
}

impl QuotaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaKind::FramesPerDay => "frames_per_day",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    pub tenant_id: Uuid,
    pub kind: QuotaKind,
    pub limit: i64,
    pub used: i64,
    pub period_start: DateTime<Utc>,
}
