use chrono::{DateTime, Utc};

use crate::error::FrameError;
use crate::FRAME_MARKER;

/// Closed set of wire frame types, keyed by the type character that
/// follows the start marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Position,
    CanStandard,
    CanExtended,
    Event,
}

impl FrameKind {
    pub fn type_char(&self) -> char {
        match self {
            FrameKind::Position => 'A',
            FrameKind::CanStandard => 'T',
            FrameKind::CanExtended => 'X',
            FrameKind::Event => 'E',
        }
    }

    fn from_char(c: char) -> Result<Self, FrameError> {
        match c {
            'A' => Ok(FrameKind::Position),
            'T' => Ok(FrameKind::CanStandard),
            'X' => Ok(FrameKind::CanExtended),
            'E' => Ok(FrameKind::Event),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

/// Decoded positional frame. The wire carries no altitude field.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFrame {
    pub identity: String,
    pub fix_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub course: f64,
    pub satellites: u8,
    pub hdop: f64,
}

/// Decoded CAN frame as it appears on the wire, before signal extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct CanWireFrame {
    pub identity: String,
    pub can_id: u32,
    pub extended: bool,
    pub data: Vec<u8>,
}

/// Decoded event frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub identity: String,
    pub code: i32,
    pub event_time: DateTime<Utc>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Position(PositionFrame),
    Can(CanWireFrame),
    Event(EventFrame),
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Position(_) => FrameKind::Position,
            Frame::Can(f) if f.extended => FrameKind::CanExtended,
            Frame::Can(_) => FrameKind::CanStandard,
            Frame::Event(_) => FrameKind::Event,
        }
    }

    pub fn identity(&self) -> &str {
        match self {
            Frame::Position(f) => &f.identity,
            Frame::Can(f) => &f.identity,
            Frame::Event(f) => &f.identity,
        }
    }
}

/// Render the acknowledgement written back for one framed input.
pub fn ack_frame(kind: FrameKind, identity: &str) -> String {
    format!("~ACK,{},{}~", kind.type_char(), identity)
}

/// Decode one complete frame as yielded by [`crate::FrameExtractor`].
/// Markers are tolerated but not required.
pub fn decode_frame(raw: &[u8]) -> Result<Frame, FrameError> {
    let mut body = raw;
    if body.first() == Some(&FRAME_MARKER) {
        body = &body[1..];
    }
    if body.last() == Some(&FRAME_MARKER) {
        body = &body[..body.len() - 1];
    }
    if body.is_empty() {
        return Err(FrameError::Empty);
    }

    let text = std::str::from_utf8(body).map_err(|_| FrameError::NotUtf8)?;
    let mut chars = text.chars();
    let kind = FrameKind::from_char(chars.next().ok_or(FrameError::Empty)?)?;
    let rest = chars.as_str();

    let fields: Vec<&str> = rest.split(',').collect();
    let identity = parse_identity(fields[0])?;

    match kind {
        FrameKind::Position => decode_position(identity, &fields),
        FrameKind::CanStandard => decode_can(identity, &fields, false),
        FrameKind::CanExtended => decode_can(identity, &fields, true),
        FrameKind::Event => decode_event(identity, &fields),
    }
}

fn parse_identity(field: &str) -> Result<String, FrameError> {
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FrameError::InvalidIdentity(field.to_string()));
    }
    Ok(field.to_string())
}

fn parse_f64(field: &'static str, value: &str) -> Result<f64, FrameError> {
    value.parse::<f64>().map_err(|_| FrameError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, FrameError> {
    let secs = value.parse::<i64>().map_err(|_| FrameError::InvalidField {
        field,
        value: value.to_string(),
    })?;
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or(FrameError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn check_range(field: &'static str, value: f64, min: f64, max: f64) -> Result<f64, FrameError> {
    if value < min || value > max {
        return Err(FrameError::OutOfRange { field, value });
    }
    Ok(value)
}

fn decode_position(identity: String, fields: &[&str]) -> Result<Frame, FrameError> {
    if fields.len() != 8 {
        return Err(FrameError::FieldCount {
            expected: 8,
            actual: fields.len(),
        });
    }

    let fix_time = parse_timestamp("timestamp", fields[1])?;
    let latitude = check_range("latitude", parse_f64("latitude", fields[2])?, -90.0, 90.0)?;
    let longitude = check_range(
        "longitude",
        parse_f64("longitude", fields[3])?,
        -180.0,
        180.0,
    )?;
    let speed = parse_f64("speed", fields[4])?;
    if speed < 0.0 {
        return Err(FrameError::OutOfRange {
            field: "speed",
            value: speed,
        });
    }
    let course = parse_f64("course", fields[5])?;
    if !(0.0..360.0).contains(&course) {
        return Err(FrameError::OutOfRange {
            field: "course",
            value: course,
        });
    }
    let satellites = fields[6]
        .parse::<u8>()
        .map_err(|_| FrameError::InvalidField {
            field: "satellites",
            value: fields[6].to_string(),
        })?;
    let hdop = parse_f64("hdop", fields[7])?;
    if hdop <= 0.0 {
        return Err(FrameError::OutOfRange {
            field: "hdop",
            value: hdop,
        });
    }

    Ok(Frame::Position(PositionFrame {
        identity,
        fix_time,
        latitude,
        longitude,
        speed,
        course,
        satellites,
        hdop,
    }))
}

fn decode_can(identity: String, fields: &[&str], extended: bool) -> Result<Frame, FrameError> {
    // Identity, CAN id, then one field per payload byte.
    if fields.len() < 3 {
        return Err(FrameError::FieldCount {
            expected: 3,
            actual: fields.len(),
        });
    }

    let can_id = u32::from_str_radix(fields[1], 16).map_err(|_| FrameError::InvalidField {
        field: "can_id",
        value: fields[1].to_string(),
    })?;
    let id_bits = if extended { 0x1FFF_FFFF } else { 0x7FF };
    if can_id > id_bits {
        return Err(FrameError::InvalidField {
            field: "can_id",
            value: fields[1].to_string(),
        });
    }

    let payload_fields = &fields[2..];
    if payload_fields.is_empty() || payload_fields.len() > 8 {
        return Err(FrameError::BadPayloadLength(payload_fields.len()));
    }
    let mut data = Vec::with_capacity(payload_fields.len());
    for byte in payload_fields {
        data.push(
            u8::from_str_radix(byte, 16).map_err(|_| FrameError::InvalidField {
                field: "payload",
                value: byte.to_string(),
            })?,
        );
    }

    Ok(Frame::Can(CanWireFrame {
        identity,
        can_id,
        extended,
        data,
    }))
}

fn decode_event(identity: String, fields: &[&str]) -> Result<Frame, FrameError> {
    if fields.len() < 4 {
        return Err(FrameError::FieldCount {
            expected: 4,
            actual: fields.len(),
        });
    }

    let code = fields[1].parse::<i32>().map_err(|_| FrameError::InvalidField {
        field: "event_code",
        value: fields[1].to_string(),
    })?;
    let event_time = parse_timestamp("timestamp", fields[2])?;
    // Free text may contain the field delimiter.
    let description = fields[3..].join(",");

    Ok(Frame::Event(EventFrame {
        identity,
        code,
        event_time,
        description,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_position_frame() {
        let frame =
            decode_frame(b"~A123456789012345,1700000000,55.75,37.62,60.5,180.0,8,1.2~").unwrap();
        let Frame::Position(pos) = frame else {
            panic!("expected position frame");
        };
        assert_eq!(pos.identity, "123456789012345");
        assert_eq!(pos.fix_time.timestamp(), 1_700_000_000);
        assert_eq!(pos.latitude, 55.75);
        assert_eq!(pos.longitude, 37.62);
        assert_eq!(pos.speed, 60.5);
        assert_eq!(pos.course, 180.0);
        assert_eq!(pos.satellites, 8);
        assert_eq!(pos.hdop, 1.2);
    }

    #[test]
    fn ack_references_type_and_identity() {
        assert_eq!(
            ack_frame(FrameKind::Position, "123456789012345"),
            "~ACK,A,123456789012345~"
        );
        assert_eq!(ack_frame(FrameKind::CanExtended, "99"), "~ACK,X,99~");
    }

    #[test]
    fn decodes_standard_can_frame() {
        let frame = decode_frame(b"~T123456789012345,1F4,DE,AD,BE,EF~").unwrap();
        let Frame::Can(can) = frame else {
            panic!("expected CAN frame");
        };
        assert_eq!(can.can_id, 0x1F4);
        assert!(!can.extended);
        assert_eq!(can.data, vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(frame_kind(&can), FrameKind::CanStandard);
    }

    fn frame_kind(can: &CanWireFrame) -> FrameKind {
        Frame::Can(can.clone()).kind()
    }

    #[test]
    fn decodes_extended_can_frame() {
        let frame = decode_frame(b"~X42,18FEEE00,7D~").unwrap();
        let Frame::Can(can) = frame else {
            panic!("expected CAN frame");
        };
        assert_eq!(can.can_id, 0x18FE_EE00);
        assert!(can.extended);
        assert_eq!(can.data, vec![0x7D]);
    }

    #[test]
    fn standard_can_id_must_fit_eleven_bits() {
        let err = decode_frame(b"~T42,18FEEE00,7D~").unwrap_err();
        assert!(matches!(err, FrameError::InvalidField { field: "can_id", .. }));
    }

    #[test]
    fn can_payload_limited_to_eight_bytes() {
        let err = decode_frame(b"~T42,1F4,01,02,03,04,05,06,07,08,09~").unwrap_err();
        assert_eq!(err, FrameError::BadPayloadLength(9));

        let err = decode_frame(b"~T42,1F4~").unwrap_err();
        assert_eq!(
            err,
            FrameError::FieldCount {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn decodes_event_frame_with_commas_in_description() {
        let frame = decode_frame(b"~E42,7,1700000001,ignition on, engine warm~").unwrap();
        let Frame::Event(event) = frame else {
            panic!("expected event frame");
        };
        assert_eq!(event.identity, "42");
        assert_eq!(event.code, 7);
        assert_eq!(event.event_time.timestamp(), 1_700_000_001);
        assert_eq!(event.description, "ignition on, engine warm");
    }

    #[test]
    fn rejects_unknown_type() {
        let err = decode_frame(b"~Z42,1,2~").unwrap_err();
        assert_eq!(err, FrameError::UnknownType('Z'));
    }

    #[test]
    fn rejects_empty_frame() {
        assert_eq!(decode_frame(b"~~").unwrap_err(), FrameError::Empty);
    }

    #[test]
    fn rejects_bad_identity() {
        let err = decode_frame(b"~A,1700000000,55.75,37.62,60.5,180.0,8,1.2~").unwrap_err();
        assert!(matches!(err, FrameError::InvalidIdentity(_)));

        let err = decode_frame(b"~Aid-1,1700000000,55.75,37.62,60.5,180.0,8,1.2~").unwrap_err();
        assert!(matches!(err, FrameError::InvalidIdentity(_)));
    }

    #[test]
    fn rejects_position_arity_mismatch() {
        let err = decode_frame(b"~A42,1700000000,55.75,37.62~").unwrap_err();
        assert_eq!(
            err,
            FrameError::FieldCount {
                expected: 8,
                actual: 4
            }
        );
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let err = decode_frame(b"~A42,1700000000,95.0,37.62,60.5,180.0,8,1.2~").unwrap_err();
        assert!(matches!(
            err,
            FrameError::OutOfRange {
                field: "latitude",
                ..
            }
        ));

        let err = decode_frame(b"~A42,1700000000,55.75,37.62,60.5,360.0,8,1.2~").unwrap_err();
        assert!(matches!(err, FrameError::OutOfRange { field: "course", .. }));
    }

    #[test]
    fn rejects_unparsable_numeric_field() {
        let err = decode_frame(b"~A42,soon,55.75,37.62,60.5,180.0,8,1.2~").unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidField {
                field: "timestamp",
                ..
            }
        ));
    }

    #[test]
    fn rejects_non_utf8_frame() {
        assert_eq!(
            decode_frame(&[FRAME_MARKER, b'A', 0xFF, 0xFE, FRAME_MARKER]).unwrap_err(),
            FrameError::NotUtf8
        );
    }
}
