use fleetgate_domain::CanDialect;

use crate::OBD2_MODE_CURRENT_DATA;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

/// How a definition is matched against an incoming frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMatch {
    /// J1939: parameter group number derived from the 29-bit identifier.
    Pgn(u16),
    /// OBD-II: mode/PID preamble inside an ECU response frame.
    ObdPid { mode: u8, pid: u8 },
    /// Vendor packs: inclusive identifier range.
    IdRange { start: u32, end: u32 },
}

/// One extractable signal. Bit offset and length address the data region:
/// the whole payload for J1939 and vendor frames, the bytes after the
/// mode/PID preamble for OBD-II.
#[derive(Debug, Clone, Copy)]
pub struct SignalDefinition {
    pub name: &'static str,
    pub unit: &'static str,
    pub matcher: FrameMatch,
    pub spn: Option<u32>,
    pub bit_offset: u16,
    pub bit_length: u16,
    pub byte_order: ByteOrder,
    pub scale: f64,
    pub offset: f64,
}

/// Resolve the static definition table for a device's dialect.
pub fn definitions_for(dialect: CanDialect) -> &'static [SignalDefinition] {
    match dialect {
        CanDialect::J1939 => J1939_DEFINITIONS,
        CanDialect::Obd2 => OBD2_DEFINITIONS,
        CanDialect::Volvo => VOLVO_DEFINITIONS,
        CanDialect::Scania => SCANIA_DEFINITIONS,
    }
}

const J1939_DEFINITIONS: &[SignalDefinition] = &[
    SignalDefinition {
        name: "EngineRPM",
        unit: "rpm",
        matcher: FrameMatch::Pgn(0xF004),
        spn: Some(190),
        bit_offset: 0,
        bit_length: 16,
        byte_order: ByteOrder::LittleEndian,
        scale: 0.125,
        offset: 0.0,
    },
    SignalDefinition {
        name: "VehicleSpeed",
        unit: "km/h",
        matcher: FrameMatch::Pgn(0xF003),
        spn: Some(84),
        bit_offset: 0,
        bit_length: 16,
        byte_order: ByteOrder::LittleEndian,
        scale: 0.003_906_25,
        offset: 0.0,
    },
    SignalDefinition {
        name: "FuelLevel",
        unit: "%",
        matcher: FrameMatch::Pgn(0xF00C),
        spn: Some(96),
        bit_offset: 0,
        bit_length: 8,
        byte_order: ByteOrder::LittleEndian,
        scale: 0.4,
        offset: 0.0,
    },
    SignalDefinition {
        name: "EngineTemp",
        unit: "°C",
        matcher: FrameMatch::Pgn(0xFEEE),
        spn: Some(110),
        bit_offset: 0,
        bit_length: 8,
        byte_order: ByteOrder::LittleEndian,
        scale: 1.0,
        offset: -40.0,
    },
    SignalDefinition {
        name: "EngineOilPressure",
        unit: "kPa",
        matcher: FrameMatch::Pgn(0xFEF1),
        spn: Some(100),
        bit_offset: 24,
        bit_length: 8,
        byte_order: ByteOrder::LittleEndian,
        scale: 4.0,
        offset: 0.0,
    },
    SignalDefinition {
        name: "EngineOilTemp",
        unit: "°C",
        matcher: FrameMatch::Pgn(0xFEF2),
        spn: Some(175),
        bit_offset: 16,
        bit_length: 16,
        byte_order: ByteOrder::LittleEndian,
        scale: 0.03125,
        offset: -273.0,
    },
];

const OBD2_DEFINITIONS: &[SignalDefinition] = &[
    SignalDefinition {
        name: "EngineRPM",
        unit: "rpm",
        matcher: FrameMatch::ObdPid {
            mode: OBD2_MODE_CURRENT_DATA,
            pid: 0x0C,
        },
        spn: None,
        bit_offset: 0,
        bit_length: 16,
        byte_order: ByteOrder::BigEndian,
        scale: 0.25,
        offset: 0.0,
    },
    SignalDefinition {
        name: "VehicleSpeed",
        unit: "km/h",
        matcher: FrameMatch::ObdPid {
            mode: OBD2_MODE_CURRENT_DATA,
            pid: 0x0D,
        },
        spn: None,
        bit_offset: 0,
        bit_length: 8,
        byte_order: ByteOrder::BigEndian,
        scale: 1.0,
        offset: 0.0,
    },
    SignalDefinition {
        name: "EngineCoolantTemp",
        unit: "°C",
        matcher: FrameMatch::ObdPid {
            mode: OBD2_MODE_CURRENT_DATA,
            pid: 0x05,
        },
        spn: None,
        bit_offset: 0,
        bit_length: 8,
        byte_order: ByteOrder::BigEndian,
        scale: 1.0,
        offset: -40.0,
    },
    SignalDefinition {
        name: "IntakeAirTemp",
        unit: "°C",
        matcher: FrameMatch::ObdPid {
            mode: OBD2_MODE_CURRENT_DATA,
            pid: 0x0F,
        },
        spn: None,
        bit_offset: 0,
        bit_length: 8,
        byte_order: ByteOrder::BigEndian,
        scale: 1.0,
        offset: -40.0,
    },
    SignalDefinition {
        name: "MAFAirFlow",
        unit: "g/s",
        matcher: FrameMatch::ObdPid {
            mode: OBD2_MODE_CURRENT_DATA,
            pid: 0x10,
        },
        spn: None,
        bit_offset: 0,
        bit_length: 16,
        byte_order: ByteOrder::BigEndian,
        scale: 0.01,
        offset: 0.0,
    },
    SignalDefinition {
        name: "ThrottlePosition",
        unit: "%",
        matcher: FrameMatch::ObdPid {
            mode: OBD2_MODE_CURRENT_DATA,
            pid: 0x11,
        },
        spn: None,
        bit_offset: 0,
        bit_length: 8,
        byte_order: ByteOrder::BigEndian,
        scale: 100.0 / 255.0,
        offset: 0.0,
    },
];

// Proprietary broadcast ranges.
const VOLVO_DEFINITIONS: &[SignalDefinition] = &[
    SignalDefinition {
        name: "RetarderTorque",
        unit: "%",
        matcher: FrameMatch::IdRange {
            start: 0x18FF_1000,
            end: 0x18FF_10FF,
        },
        spn: None,
        bit_offset: 8,
        bit_length: 8,
        byte_order: ByteOrder::LittleEndian,
        scale: 1.0,
        offset: -125.0,
    },
    SignalDefinition {
        name: "AdBlueLevel",
        unit: "%",
        matcher: FrameMatch::IdRange {
            start: 0x18FF_1000,
            end: 0x18FF_10FF,
        },
        spn: None,
        bit_offset: 16,
        bit_length: 8,
        byte_order: ByteOrder::LittleEndian,
        scale: 0.4,
        offset: 0.0,
    },
];

const SCANIA_DEFINITIONS: &[SignalDefinition] = &[
    SignalDefinition {
        name: "GearboxOilTemp",
        unit: "°C",
        matcher: FrameMatch::IdRange {
            start: 0x18FF_4000,
            end: 0x18FF_40FF,
        },
        spn: None,
        bit_offset: 0,
        bit_length: 8,
        byte_order: ByteOrder::LittleEndian,
        scale: 1.0,
        offset: -40.0,
    },
    SignalDefinition {
        name: "TotalFuelUsed",
        unit: "L",
        matcher: FrameMatch::IdRange {
            start: 0x18FF_4000,
            end: 0x18FF_40FF,
        },
        spn: None,
        bit_offset: 8,
        bit_length: 32,
        byte_order: ByteOrder::LittleEndian,
        scale: 0.5,
        offset: 0.0,
    },
];
