use thiserror::Error;

use crate::tables::{ByteOrder, FrameMatch, SignalDefinition};
use crate::{j1939_pgn, OBD2_RESPONSE_BASE};

/// One signal skipped because the frame's payload did not cover its span.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("signal {name}: payload covers {got} bytes, span needs {needed}")]
pub struct ShortPayload {
    pub name: &'static str,
    pub needed: usize,
    pub got: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSignal {
    pub name: &'static str,
    pub unit: &'static str,
    pub value: f64,
    pub pgn: Option<u16>,
    pub spn: Option<u32>,
    pub mode: Option<u8>,
    pub pid: Option<u8>,
}

/// Result of decoding one frame: extracted signals plus per-signal skips.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanDecode {
    pub signals: Vec<DecodedSignal>,
    pub failures: Vec<ShortPayload>,
}

/// Decode one CAN frame against a dialect's definition table.
///
/// Every matching definition is attempted independently: a short payload
/// skips only that definition, and an identifier with no matches produces
/// an empty result rather than an error.
pub fn decode(
    definitions: &[SignalDefinition],
    can_id: u32,
    extended: bool,
    payload: &[u8],
) -> CanDecode {
    let mut out = CanDecode::default();

    for def in definitions {
        let (data, pgn, mode, pid) = match def.matcher {
            FrameMatch::Pgn(want) => {
                if !extended || j1939_pgn(can_id) != want {
                    continue;
                }
                (payload, Some(want), None, None)
            }
            FrameMatch::ObdPid { mode, pid } => {
                if !(OBD2_RESPONSE_BASE..=OBD2_RESPONSE_BASE + 7).contains(&can_id) {
                    continue;
                }
                // payload[0] is the OBD length byte; mode and PID follow.
                if payload.len() < 3 || payload[1] != mode || payload[2] != pid {
                    continue;
                }
                (&payload[3..], None, Some(mode), Some(pid))
            }
            FrameMatch::IdRange { start, end } => {
                if !(start..=end).contains(&can_id) {
                    continue;
                }
                (payload, None, None, None)
            }
        };

        match extract_raw(data, def.bit_offset, def.bit_length, def.byte_order) {
            Ok(raw) => out.signals.push(DecodedSignal {
                name: def.name,
                unit: def.unit,
                value: raw as f64 * def.scale + def.offset,
                pgn,
                spn: def.spn,
                mode,
                pid,
            }),
            Err(failure) => out.failures.push(ShortPayload {
                name: def.name,
                ..failure
            }),
        }
    }

    out
}

/// Extract an unsigned bit field from a payload.
///
/// The field is addressed by its bit offset from the start of `data`. For
/// little-endian fields the covering bytes are assembled LSB-first before
/// shifting; for big-endian fields MSB-first, with the field anchored
/// `bit_offset` bits from the top of its span.
fn extract_raw(
    data: &[u8],
    bit_offset: u16,
    bit_length: u16,
    byte_order: ByteOrder,
) -> Result<u64, ShortPayload> {
    debug_assert!(bit_length >= 1 && bit_length <= 64);

    let first_byte = (bit_offset / 8) as usize;
    let bit_in_byte = (bit_offset % 8) as u32;
    let span = ((bit_in_byte as u16 + bit_length + 7) / 8) as usize;
    let needed = first_byte + span;
    if data.len() < needed {
        return Err(ShortPayload {
            name: "",
            needed,
            got: data.len(),
        });
    }

    let bytes = &data[first_byte..first_byte + span];
    let assembled = match byte_order {
        ByteOrder::LittleEndian => bytes
            .iter()
            .enumerate()
            .fold(0u64, |acc, (i, &b)| acc | (b as u64) << (8 * i)),
        ByteOrder::BigEndian => bytes.iter().fold(0u64, |acc, &b| acc << 8 | b as u64),
    };

    let shifted = match byte_order {
        ByteOrder::LittleEndian => assembled >> bit_in_byte,
        ByteOrder::BigEndian => assembled >> (span as u32 * 8 - bit_in_byte - bit_length as u32),
    };

    let mask = if bit_length == 64 {
        u64::MAX
    } else {
        (1u64 << bit_length) - 1
    };
    Ok(shifted & mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions_for;
    use fleetgate_domain::CanDialect;

    fn signal<'a>(decode: &'a CanDecode, name: &str) -> &'a DecodedSignal {
        decode
            .signals
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("missing signal {name}"))
    }

    #[test]
    fn j1939_engine_rpm_scales_little_endian_word() {
        let defs = definitions_for(CanDialect::J1939);
        // PGN 0xF004, source address 0x00. 0x1A00 LE = 6656 raw.
        let out = decode(defs, 0x0CF0_0400, true, &[0x00, 0x1A, 0xFF, 0xFF]);
        assert!(out.failures.is_empty());
        let rpm = signal(&out, "EngineRPM");
        assert_eq!(rpm.value, 6656.0 * 0.125);
        assert_eq!(rpm.unit, "rpm");
        assert_eq!(rpm.pgn, Some(0xF004));
        assert_eq!(rpm.spn, Some(190));
    }

    #[test]
    fn j1939_full_payload_decodes_exact_values() {
        let defs = definitions_for(CanDialect::J1939);
        // Engine temperature broadcast, 8-byte payload, first byte 0x7D.
        let out = decode(
            defs,
            0x18FE_EE00,
            true,
            &[0x7D, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
        );
        assert_eq!(out.failures, vec![]);
        assert_eq!(out.signals.len(), 1);
        let temp = &out.signals[0];
        assert_eq!(temp.name, "EngineTemp");
        assert_eq!(temp.value, 125.0 - 40.0);
        assert_eq!(temp.unit, "°C");
    }

    #[test]
    fn short_payload_skips_only_that_signal() {
        let defs = definitions_for(CanDialect::Scania);
        // One byte covers GearboxOilTemp but not the 32-bit fuel counter.
        let out = decode(defs, 0x18FF_4010, true, &[0x50]);
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].name, "GearboxOilTemp");
        assert_eq!(out.signals[0].value, 0x50 as f64 - 40.0);
        assert_eq!(
            out.failures,
            vec![ShortPayload {
                name: "TotalFuelUsed",
                needed: 5,
                got: 1
            }]
        );
    }

    #[test]
    fn unmapped_identifier_yields_empty_decode() {
        let defs = definitions_for(CanDialect::J1939);
        let out = decode(defs, 0x0CAB_CD00, true, &[0x01, 0x02]);
        assert_eq!(out, CanDecode::default());
    }

    #[test]
    fn standard_frame_never_matches_pgn_definitions() {
        let defs = definitions_for(CanDialect::J1939);
        let out = decode(defs, 0x7E8, false, &[0x00, 0x1A]);
        assert_eq!(out, CanDecode::default());
    }

    #[test]
    fn obd2_rpm_uses_big_endian_formula() {
        let defs = definitions_for(CanDialect::Obd2);
        // 41 0C response, A=0x1A, B=0xF8: (A*256 + B) / 4 = 1726.0.
        let out = decode(defs, 0x7E8, false, &[0x04, 0x41, 0x0C, 0x1A, 0xF8]);
        assert_eq!(out.failures, vec![]);
        let rpm = signal(&out, "EngineRPM");
        assert_eq!(rpm.value, (0x1A as f64 * 256.0 + 0xF8 as f64) / 4.0);
        assert_eq!(rpm.mode, Some(0x41));
        assert_eq!(rpm.pid, Some(0x0C));
    }

    #[test]
    fn obd2_coolant_temp_applies_offset() {
        let defs = definitions_for(CanDialect::Obd2);
        let out = decode(defs, 0x7EA, false, &[0x03, 0x41, 0x05, 0x5A]);
        assert_eq!(signal(&out, "EngineCoolantTemp").value, 0x5A as f64 - 40.0);
    }

    #[test]
    fn obd2_response_outside_range_is_ignored() {
        let defs = definitions_for(CanDialect::Obd2);
        let out = decode(defs, 0x7E0, false, &[0x03, 0x41, 0x05, 0x5A]);
        assert_eq!(out, CanDecode::default());
    }

    #[test]
    fn obd2_truncated_data_reports_failure() {
        let defs = definitions_for(CanDialect::Obd2);
        // RPM response with only one data byte after the preamble.
        let out = decode(defs, 0x7E8, false, &[0x04, 0x41, 0x0C, 0x1A]);
        assert!(out.signals.is_empty());
        assert_eq!(
            out.failures,
            vec![ShortPayload {
                name: "EngineRPM",
                needed: 2,
                got: 1
            }]
        );
    }

    #[test]
    fn vendor_range_matches_inclusive_bounds() {
        let defs = definitions_for(CanDialect::Volvo);
        let out = decode(defs, 0x18FF_10FF, true, &[0x00, 0xFA, 0x64]);
        assert_eq!(signal(&out, "RetarderTorque").value, 0xFA as f64 - 125.0);
        assert_eq!(signal(&out, "AdBlueLevel").value, 0x64 as f64 * 0.4);

        let out = decode(defs, 0x18FF_1100, true, &[0x00, 0xFA, 0x64]);
        assert_eq!(out, CanDecode::default());
    }

    #[test]
    fn mid_byte_bit_field_extraction() {
        // 4-bit field starting at bit 4, little-endian: high nibble of byte 0.
        let raw = extract_raw(&[0xA5], 4, 4, ByteOrder::LittleEndian).unwrap();
        assert_eq!(raw, 0xA);

        // Same addressing big-endian: low nibble of the span's top-aligned view.
        let raw = extract_raw(&[0xA5], 4, 4, ByteOrder::BigEndian).unwrap();
        assert_eq!(raw, 0x5);
    }

    #[test]
    fn thirty_two_bit_little_endian_counter() {
        let raw = extract_raw(&[0x00, 0x78, 0x56, 0x34, 0x12], 8, 32, ByteOrder::LittleEndian)
            .unwrap();
        assert_eq!(raw, 0x1234_5678);
    }
}
