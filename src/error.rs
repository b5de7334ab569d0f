/// Errors reported while assembling and decoding Basen BMS frames.
///
/// Every frame-level variant is recoverable: the assembler has already
/// discarded the offending bytes when it hands one out.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The accumulation buffer grew past the maximum frame size without a terminator.
    #[error("maximum response size exceeded ({size} bytes buffered)")]
    BufferOverflow { size: usize },
    /// The declared data length disagrees with the number of bytes received.
    #[error("invalid frame length - expected={expected} received={actual}")]
    LengthMismatch { expected: usize, actual: usize },
    /// The transmitted checksum does not match the one computed over the frame.
    #[error("checksum mismatch - calculated=0x{computed:04X} received=0x{received:04X}")]
    ChecksumMismatch { computed: u16, received: u16 },
    /// A decoder needs more bytes than the frame carries.
    #[error("payload too short for frame type 0x{frame_type:02X} - required={required} received={actual}")]
    PayloadTooShort {
        frame_type: u8,
        required: usize,
        actual: usize,
    },
    /// A decoder was handed a frame type it does not handle.
    #[error("unexpected frame type 0x{frame_type:02X}")]
    UnexpectedFrameType { frame_type: u8 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
