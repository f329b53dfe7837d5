use crate::error::FrameError;
use crate::FRAME_MARKER;

pub const DEFAULT_MAX_FRAME_LEN: usize = 4096;

/// Outcome of one extraction step.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// A complete frame, markers included.
    Frame(Vec<u8>),
    /// Bytes dropped from the buffer together with the reason, so the
    /// caller can archive them as a decode failure.
    Discarded { bytes: Vec<u8>, error: FrameError },
}

/// Accumulates raw socket bytes for one session and yields complete
/// `~...~` frames.
///
/// The buffer is bounded: once a started frame exceeds the maximum length
/// without an end marker, exactly that window is discarded and reported.
/// Extraction only ever looks at a fixed window from the start marker, so
/// the yielded sequence does not depend on how the stream was chunked.
#[derive(Debug)]
pub struct FrameExtractor {
    buf: Vec<u8>,
    max_frame_len: usize,
}

impl FrameExtractor {
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_len,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pull the next complete frame out of the buffer.
    ///
    /// Returns `None` when more bytes are needed; the partial frame stays
    /// buffered.
    pub fn next_frame(&mut self) -> Option<Extracted> {
        // Bytes before a start marker can never begin a frame.
        match self.buf.iter().position(|&b| b == FRAME_MARKER) {
            None => {
                self.buf.clear();
                return None;
            }
            Some(start) if start > 0 => {
                self.buf.drain(..start);
            }
            Some(_) => {}
        }

        let window = self.max_frame_len.min(self.buf.len());
        if let Some(end) = self.buf[1..window]
            .iter()
            .position(|&b| b == FRAME_MARKER)
        {
            let frame: Vec<u8> = self.buf.drain(..end + 2).collect();
            return Some(Extracted::Frame(frame));
        }

        if self.buf.len() >= self.max_frame_len {
            // Runaway frame: a started frame with no end marker inside the
            // ceiling. Drop the window, report it, keep the tail.
            let bytes: Vec<u8> = self.buf.drain(..self.max_frame_len).collect();
            return Some(Extracted::Discarded {
                bytes,
                error: FrameError::Oversize {
                    max: self.max_frame_len,
                },
            });
        }

        None
    }

    /// Remaining buffered bytes, drained. Called when a session closes so
    /// a trailing partial frame can be archived.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(extractor: &mut FrameExtractor) -> Vec<Extracted> {
        let mut out = Vec::new();
        while let Some(item) = extractor.next_frame() {
            out.push(item);
        }
        out
    }

    #[test]
    fn extracts_single_frame() {
        let mut ex = FrameExtractor::default();
        ex.push(b"~A123,1,2~");
        assert_eq!(
            drain(&mut ex),
            vec![Extracted::Frame(b"~A123,1,2~".to_vec())]
        );
    }

    #[test]
    fn extracts_back_to_back_frames() {
        let mut ex = FrameExtractor::default();
        ex.push(b"~A1,2~~T3,4~");
        assert_eq!(
            drain(&mut ex),
            vec![
                Extracted::Frame(b"~A1,2~".to_vec()),
                Extracted::Frame(b"~T3,4~".to_vec()),
            ]
        );
    }

    #[test]
    fn partial_frame_is_retained() {
        let mut ex = FrameExtractor::default();
        ex.push(b"~A123,17000");
        assert_eq!(drain(&mut ex), vec![]);
        assert!(ex.buffered() > 0);

        ex.push(b"00000,55.75~");
        assert_eq!(
            drain(&mut ex),
            vec![Extracted::Frame(b"~A123,1700000000,55.75~".to_vec())]
        );
    }

    #[test]
    fn garbage_before_start_marker_is_dropped() {
        let mut ex = FrameExtractor::default();
        ex.push(b"\r\nnoise~E1,2,3,boot~");
        assert_eq!(
            drain(&mut ex),
            vec![Extracted::Frame(b"~E1,2,3,boot~".to_vec())]
        );
    }

    #[test]
    fn garbage_without_marker_clears_buffer() {
        let mut ex = FrameExtractor::default();
        ex.push(b"no markers here");
        assert_eq!(drain(&mut ex), vec![]);
        assert_eq!(ex.buffered(), 0);
    }

    #[test]
    fn oversize_frame_is_discarded_with_error() {
        let mut ex = FrameExtractor::new(16);
        let mut stream = vec![FRAME_MARKER];
        stream.extend(std::iter::repeat(b'A').take(64));
        stream.extend(b"~E1,2,3,ok~");
        ex.push(&stream);

        let items = drain(&mut ex);
        assert_eq!(items.len(), 2);
        assert!(matches!(
            &items[0],
            Extracted::Discarded {
                bytes,
                error: FrameError::Oversize { max: 16 }
            } if bytes.len() == 16
        ));
        assert_eq!(items[1], Extracted::Frame(b"~E1,2,3,ok~".to_vec()));
    }

    #[test]
    fn byte_at_a_time_matches_bulk_feed() {
        let stream: &[u8] =
            b"junk~A123456789012345,1700000000,55.75,37.62,60.5,180.0,8,1.2~mid~T99,18FEEE00,01,02~~E7,4,1700000001,door open~tail";

        let mut bulk = FrameExtractor::new(64);
        bulk.push(stream);
        let bulk_items = drain(&mut bulk);

        let mut trickle = FrameExtractor::new(64);
        let mut trickle_items = Vec::new();
        for byte in stream {
            trickle.push(std::slice::from_ref(byte));
            trickle_items.extend(drain(&mut trickle));
        }

        assert_eq!(bulk_items, trickle_items);
        assert_eq!(bulk_items.len(), 3);
    }

    #[test]
    fn byte_at_a_time_matches_bulk_feed_with_oversize_run() {
        let mut stream = b"~T1,10,FF~".to_vec();
        stream.push(FRAME_MARKER);
        stream.extend(std::iter::repeat(b'x').take(40));
        stream.extend(b"~A2,1700000000,1.0,2.0,3.0,4.0,5,6.0~");

        let mut bulk = FrameExtractor::new(20);
        bulk.push(&stream);
        let bulk_items = drain(&mut bulk);

        let mut trickle = FrameExtractor::new(20);
        let mut trickle_items = Vec::new();
        for byte in &stream {
            trickle.push(std::slice::from_ref(byte));
            trickle_items.extend(drain(&mut trickle));
        }

        assert_eq!(bulk_items, trickle_items);
    }

    #[test]
    fn flush_returns_trailing_partial() {
        let mut ex = FrameExtractor::default();
        ex.push(b"~A123,17");
        assert_eq!(drain(&mut ex), vec![]);
        assert_eq!(ex.flush(), Some(b"~A123,17".to_vec()));
        assert_eq!(ex.flush(), None);
    }
}
