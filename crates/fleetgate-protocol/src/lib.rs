//! Wire protocol for fleet tracking devices.
//!
//! Frames are `~`-delimited text records: `~<TYPE><IDENTITY>,<fields...>~`
//! with type characters `A` (position), `T` (CAN standard), `X` (CAN
//! extended) and `E` (event). [`FrameExtractor`] turns a TCP byte stream
//! into complete frames independent of chunk boundaries; [`decode_frame`]
//! validates and decodes one frame; [`ack_frame`] renders the reply the
//! device expects for every successfully framed input.

mod error;
mod extractor;
mod frame;

pub use error::FrameError;
pub use extractor::{Extracted, FrameExtractor, DEFAULT_MAX_FRAME_LEN};
pub use frame::{
    ack_frame, decode_frame, CanWireFrame, EventFrame, Frame, FrameKind, PositionFrame,
};

/// Start and end delimiter of every wire frame.
pub const FRAME_MARKER: u8 = 0x7E;
