//! CAN signal extraction for J1939, OBD-II and vendor dialects.
//!
//! Each dialect is a static table of [`SignalDefinition`]s. A device's
//! dialect is resolved once at session identification; [`decode`] then maps
//! every frame against the table, extracting raw bit fields per the
//! definition's byte order and applying `value = raw * scale + offset`.
//! Unmapped identifiers yield no signals and no failures; a payload too
//! short for one definition fails only that definition.

mod decoder;
mod tables;

pub use decoder::{decode, CanDecode, DecodedSignal, ShortPayload};
pub use tables::{definitions_for, ByteOrder, FrameMatch, SignalDefinition};

/// First OBD-II ECU response identifier (the range runs through 0x7EF).
pub const OBD2_RESPONSE_BASE: u32 = 0x7E8;
/// Positive-response mode byte for OBD-II mode 0x01 current data.
pub const OBD2_MODE_CURRENT_DATA: u8 = 0x41;

/// J1939 parameter group number from a 29-bit identifier; the low byte is
/// the source address.
pub fn j1939_pgn(can_id: u32) -> u16 {
    ((can_id >> 8) & 0xFFFF) as u16
}
