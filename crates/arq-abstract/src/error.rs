use thiserror::Error;

/// A datagram that could not be turned into a [`crate::Packet`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("frame truncated: needed {needed} more bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },
    #[error("unknown frame type 0x{0:02x}")]
    UnknownType(u8),
    #[error("invalid sequence number {0}")]
    InvalidNumber(i32),
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("{0} unexpected trailing bytes after frame body")]
    TrailingBytes(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("string field of {0} bytes exceeds the 65535-byte limit")]
    StringTooLong(usize),
    #[error("sequence number {0} does not fit the signed 32-bit wire field")]
    NumberOutOfRange(u32),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window length must be at least 1")]
    EmptyWindow,
    #[error("window length {0} exceeds the maximum of {max}", max = crate::config::MAX_WINDOW_LENGTH)]
    WindowTooLong(u32),
    #[error("sequence length {sequence_length} must exceed window length {window_length}")]
    SequenceTooShort {
        window_length: u32,
        sequence_length: u32,
    },
    #[error("sequence length {0} does not fit a signed 32-bit wire field")]
    SequenceTooLong(u32),
    #[error("drop rate {0} is outside [0, 1)")]
    InvalidDropRate(f64),
}
