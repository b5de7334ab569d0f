//! Reassembles frames from notification sized chunks.
//!
//! The transport delivers the byte stream in arbitrary pieces. Bytes are
//! collected until a chunk ends with the frame terminator, then the buffer is
//! validated, decoded and cleared:
//! - a chunk starting with a start marker always begins a new frame, a pending
//!   partial frame is dropped without notice
//! - a buffer that grew past [`MAX_RESPONSE_SIZE`] is discarded on the next chunk
//! - a chunk that does not end with the terminator only extends the buffer
//!
//! There is no timeout here; a stalled partial frame is cleared by the next
//! start marker or by the size limit.
//!
//! # Example
//!
//! ```
//! use basenbms_lib::assembler::FrameAssembler;
//! use basenbms_lib::protocol::Record;
//!
//! let mut assembler = FrameAssembler::new();
//! let frame = [
//!     0x3a, 0x16, 0x2a, 0x18, 0x03, 0xe5, 0xff, 0xff, 0x06, 0x64, 0x00, 0x00, 0x12, 0x14,
//!     0x19, 0x19, 0x35, 0x3d, 0x00, 0x00, 0x80, 0x80, 0x00, 0x00, 0x0e, 0x02, 0x00, 0x00,
//!     0x82, 0x05, 0x0d, 0x0a,
//! ];
//!
//! assert!(assembler.feed(&frame[..20]).is_none());
//! match assembler.feed(&frame[20..]) {
//!     Some(Ok(Record::Status(status))) => assert_eq!(status.state_of_charge, 14),
//!     other => panic!("unexpected event {other:?}"),
//! }
//! ```

use crate::protocol::{is_start_of_frame, Frame, Record, END_OF_FRAME_2, MAX_RESPONSE_SIZE};
use crate::Error;

/// Accumulation buffer for one logical connection.
///
/// `feed` must be called sequentially; hosts delivering chunks from several
/// threads have to serialize them first.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_RESPONSE_SIZE),
        }
    }

    /// Consumes one chunk.
    ///
    /// Returns `None` while a frame is incomplete, otherwise the decoded
    /// record or the reason the frame was rejected. A size limit violation is
    /// only returned when the same chunk completes no frame.
    pub fn feed(&mut self, chunk: &[u8]) -> Option<Result<Record, Error>> {
        let first = *chunk.first()?;
        log::trace!("feed chunk: {chunk:02X?}");

        let mut overflow = None;
        if self.buffer.len() > MAX_RESPONSE_SIZE {
            log::warn!(
                "Maximum response size exceeded - buffered={} maximum={}",
                self.buffer.len(),
                MAX_RESPONSE_SIZE
            );
            overflow = Some(Error::BufferOverflow {
                size: self.buffer.len(),
            });
            self.buffer.clear();
        }

        if is_start_of_frame(first) {
            if !self.buffer.is_empty() {
                log::trace!("drop partial frame: {:02X?}", self.buffer);
            }
            self.buffer.clear();
        }

        self.buffer.extend_from_slice(chunk);

        if self.buffer.last() != Some(&END_OF_FRAME_2) {
            return overflow.map(Err);
        }

        let result = Frame::parse(&self.buffer).and_then(|frame| {
            log::debug!(
                "Frame 0x{:02X} received: {:02X?}",
                frame.frame_type(),
                frame.as_bytes()
            );
            Record::decode(&frame)
        });
        self.buffer.clear();
        Some(result)
    }

    /// Number of buffered bytes of the pending frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_command, checksum, StartOfFrame};
    use assert_matches::assert_matches;

    const STATUS_FRAME: [u8; 32] = [
        0x3a, 0x16, 0x2a, 0x18, 0x03, 0xe5, 0xff, 0xff, 0x06, 0x64, 0x00, 0x00, 0x12, 0x14, 0x19,
        0x19, 0x35, 0x3d, 0x00, 0x00, 0x80, 0x80, 0x00, 0x00, 0x0e, 0x02, 0x00, 0x00, 0x82, 0x05,
        0x0d, 0x0a,
    ];

    #[test]
    fn single_chunk_frame() {
        let mut assembler = FrameAssembler::new();
        let record = assembler.feed(&STATUS_FRAME).unwrap().unwrap();
        assert_matches!(record, Record::Status(status) => {
            assert_eq!(status.current, -6.909);
            assert_eq!(status.temperatures[0], 18);
        });
        assert!(assembler.is_empty());
    }

    #[test]
    fn split_frame_waits_for_terminator() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed(&STATUS_FRAME[..20]).is_none());
        assert_eq!(assembler.len(), 20);
        assert!(assembler.feed(&STATUS_FRAME[20..31]).is_none());
        assert_matches!(
            assembler.feed(&STATUS_FRAME[31..]),
            Some(Ok(Record::Status(_)))
        );
        assert!(assembler.is_empty());
    }

    #[test]
    fn empty_chunk_is_a_no_op() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed(&STATUS_FRAME[..10]).is_none());
        assert!(assembler.feed(&[]).is_none());
        assert_eq!(assembler.len(), 10);
    }

    #[test]
    fn start_marker_drops_partial_frame() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed(&STATUS_FRAME[..12]).is_none());
        assert_matches!(assembler.feed(&STATUS_FRAME), Some(Ok(Record::Status(_))));
        assert!(assembler.is_empty());
    }

    #[test]
    fn alternative_start_marker_is_accepted() {
        let mut assembler = FrameAssembler::new();
        let mut frame = STATUS_FRAME;
        frame[0] = 0x3b;
        assert_matches!(assembler.feed(&frame), Some(Ok(Record::Status(_))));
    }

    #[test]
    fn checksum_mismatch_discards_frame() {
        let mut assembler = FrameAssembler::new();
        let mut frame = STATUS_FRAME;
        frame[29] ^= 0xff;
        assert_matches!(
            assembler.feed(&frame),
            Some(Err(Error::ChecksumMismatch {
                computed: 0x0582,
                received: 0xfa82
            }))
        );
        assert!(assembler.is_empty());
        assert_matches!(assembler.feed(&STATUS_FRAME), Some(Ok(Record::Status(_))));
    }

    #[test]
    fn length_mismatch_discards_frame() {
        let mut assembler = FrameAssembler::new();
        let mut frame = STATUS_FRAME.to_vec();
        frame[3] = 0x1a;
        assert_matches!(
            assembler.feed(&frame),
            Some(Err(Error::LengthMismatch {
                expected: 34,
                actual: 32
            }))
        );
        assert!(assembler.is_empty());
    }

    #[test]
    fn stray_terminator_is_rejected() {
        let mut assembler = FrameAssembler::new();
        assert_matches!(
            assembler.feed(&[0x0d, 0x0a]),
            Some(Err(Error::LengthMismatch { actual: 2, .. }))
        );
        assert!(assembler.is_empty());
    }

    #[test]
    fn overflow_resets_buffer() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed(&[0x3a; 45][..]).is_none());
        assert_eq!(assembler.len(), 45);

        assert_matches!(
            assembler.feed(&[0x00, 0x01]),
            Some(Err(Error::BufferOverflow { size: 45 }))
        );
        assert_eq!(assembler.len(), 2);

        assert_matches!(assembler.feed(&STATUS_FRAME), Some(Ok(Record::Status(_))));
    }

    #[test]
    fn buffer_at_maximum_size_is_kept() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed(&[0x3a; MAX_RESPONSE_SIZE][..]).is_none());
        assert!(assembler.feed(&[0x00]).is_none());
        assert_eq!(assembler.len(), MAX_RESPONSE_SIZE + 1);
    }

    #[test]
    fn overflow_is_superseded_by_completed_frame() {
        let mut assembler = FrameAssembler::new();
        assembler.feed(&[0x3a; 50][..]);
        assert_matches!(assembler.feed(&STATUS_FRAME), Some(Ok(Record::Status(_))));
    }

    #[test]
    fn command_frame_is_too_short_for_status() {
        let mut assembler = FrameAssembler::new();
        let command = build_command(StartOfFrame::A, 0x2a, 0);
        assert_matches!(
            assembler.feed(&command),
            Some(Err(Error::PayloadTooShort {
                frame_type: 0x2a,
                ..
            }))
        );
    }

    #[test]
    fn unknown_frame_type_is_not_an_error() {
        let mut assembler = FrameAssembler::new();
        let mut frame = vec![0x3a, 0x16, 0x77, 0x01, 0x05];
        let crc = checksum(&frame[1..]).to_le_bytes();
        frame.extend_from_slice(&[crc[0], crc[1], 0x0d, 0x0a]);
        assert_matches!(
            assembler.feed(&frame),
            Some(Ok(Record::Unknown(unknown))) => {
                assert_eq!(unknown.frame_type, 0x77);
                assert_eq!(unknown.data, vec![0x05]);
            }
        );
    }
}
