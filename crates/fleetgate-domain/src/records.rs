use uuid::Uuid;

use crate::types::{CanFrame, CanSignal, DecodeFailure, FrameType, Position, RawFrame};

/// Admission priority of a queued record.
///
/// Positions and events carry the operationally important data and survive
/// overload the longest; raw-frame archival and failure rows shed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RecordPriority {
    Low,
    Normal,
    Critical,
}

/// One record flowing from a session to the persistence writer.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestRecord {
    Position(Position),
    RawFrame(RawFrame),
    CanFrame(CanFrame),
    CanSignal(CanSignal),
    DecodeFailure(DecodeFailure),
}

impl IngestRecord {
    pub fn priority(&self) -> RecordPriority {
        match self {
            IngestRecord::Position(_) => RecordPriority::Critical,
            IngestRecord::RawFrame(raw) if raw.frame_type == FrameType::Event => {
                RecordPriority::Critical
            }
            IngestRecord::RawFrame(_) => RecordPriority::Low,
            IngestRecord::CanFrame(_) | IngestRecord::CanSignal(_) => RecordPriority::Normal,
            IngestRecord::DecodeFailure(_) => RecordPriority::Low,
        }
    }

    /// Destination table, used by the writer to group batches.
    pub fn table(&self) -> &'static str {
        match self {
            IngestRecord::Position(_) => "positions",
            IngestRecord::RawFrame(_) => "raw_frames",
            IngestRecord::CanFrame(_) => "can_frames",
            IngestRecord::CanSignal(_) => "can_signals",
            IngestRecord::DecodeFailure(_) => "decode_errors",
        }
    }

    /// Whether a committed record counts against the tenant frame quota.
    /// Exactly one archival row exists per wire frame, so only that row
    /// counts; derived rows (positions, CAN rows, signals) and failure rows
    /// would double-count.
    pub fn counts_against_quota(&self) -> bool {
        matches!(self, IngestRecord::RawFrame(_))
    }
}

/// A record stamped with the tenant it was admitted for, so the writer can
/// attribute quota usage at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedRecord {
    pub tenant_id: Option<Uuid>,
    pub record: IngestRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn raw(frame_type: FrameType) -> IngestRecord {
        IngestRecord::RawFrame(RawFrame {
            device_id: Some("123456789012345".to_string()),
            frame_type,
            raw: "~A...~".to_string(),
            parsed: None,
            remote_addr: None,
            received_at: Utc::now(),
        })
    }

    #[test]
    fn positions_and_events_are_critical() {
        let position = IngestRecord::Position(Position {
            device_id: "123456789012345".to_string(),
            latitude: 55.75,
            longitude: 37.62,
            speed: 0.0,
            course: 0.0,
            altitude: None,
            satellites: 8,
            hdop: Some(1.2),
            fix_time: Utc::now(),
            received_at: Utc::now(),
        });
        assert_eq!(position.priority(), RecordPriority::Critical);
        assert_eq!(raw(FrameType::Event).priority(), RecordPriority::Critical);
    }

    #[test]
    fn archival_records_are_low_priority() {
        assert_eq!(raw(FrameType::Position).priority(), RecordPriority::Low);
        assert_eq!(raw(FrameType::CanStandard).priority(), RecordPriority::Low);
    }

    #[test]
    fn table_routing_matches_record_kind() {
        assert_eq!(raw(FrameType::Position).table(), "raw_frames");
        let failure = IngestRecord::DecodeFailure(DecodeFailure {
            device_id: None,
            stage: crate::DecodeStage::Framing,
            message: "oversize".to_string(),
            raw: vec![0x7E],
            received_at: Utc::now(),
        });
        assert_eq!(failure.table(), "decode_errors");
        assert!(!failure.counts_against_quota());
    }

    #[test]
    fn only_archival_rows_count_against_quota() {
        assert!(raw(FrameType::Position).counts_against_quota());
        assert!(raw(FrameType::Event).counts_against_quota());

        let signal = IngestRecord::CanSignal(CanSignal {
            device_id: "42".to_string(),
            name: "EngineRPM".to_string(),
            value: 832.0,
            unit: Some("rpm".to_string()),
            pgn: Some(0xF004),
            spn: Some(190),
            mode: None,
            pid: None,
            signal_time: Utc::now(),
        });
        assert!(!signal.counts_against_quota());
    }
}
