use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DecodeError, EncodeError};

/// Type tags written in the first byte of a frame.
pub mod tags {
    // Supervisory
    pub const ACK: u8 = 0x10;
    pub const NAK_GO_BACK_N: u8 = 0x11;
    pub const NAK_SELECTIVE_REPEAT: u8 = 0x12;
    // Information
    pub const STRING: u8 = 0x20;
    pub const FILE_INFO: u8 = 0x21;
}

/// Fixed prefix: type tag + sequence number.
pub const HEADER_LEN: usize = 5;

/// Wire value of the sequence number field for unnumbered frames.
pub const NO_NUMBER: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    Ack,
    NakGoBackN,
    NakSelectiveRepeat,
    String,
    FileInfo,
}

impl PacketType {
    pub fn tag(self) -> u8 {
        match self {
            PacketType::Ack => tags::ACK,
            PacketType::NakGoBackN => tags::NAK_GO_BACK_N,
            PacketType::NakSelectiveRepeat => tags::NAK_SELECTIVE_REPEAT,
            PacketType::String => tags::STRING,
            PacketType::FileInfo => tags::FILE_INFO,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            tags::ACK => Some(PacketType::Ack),
            tags::NAK_GO_BACK_N => Some(PacketType::NakGoBackN),
            tags::NAK_SELECTIVE_REPEAT => Some(PacketType::NakSelectiveRepeat),
            tags::STRING => Some(PacketType::String),
            tags::FILE_INFO => Some(PacketType::FileInfo),
            _ => None,
        }
    }

    /// Information frames go through the receive window; everything else is
    /// supervisory.
    pub fn is_data(self) -> bool {
        matches!(self, PacketType::String | PacketType::FileInfo)
    }
}

/// Type-specific body of a frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    Ack,
    NakGoBackN,
    NakSelectiveRepeat,
    Text { message: String },
    FileInfo { name: String, size: u32 },
}

impl Content {
    pub fn text(message: impl Into<String>) -> Self {
        Content::Text {
            message: message.into(),
        }
    }

    pub fn file_info(name: impl Into<String>, size: u32) -> Self {
        Content::FileInfo {
            name: name.into(),
            size,
        }
    }

    pub fn kind(&self) -> PacketType {
        match self {
            Content::Ack => PacketType::Ack,
            Content::NakGoBackN => PacketType::NakGoBackN,
            Content::NakSelectiveRepeat => PacketType::NakSelectiveRepeat,
            Content::Text { .. } => PacketType::String,
            Content::FileInfo { .. } => PacketType::FileInfo,
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Ack => write!(f, "ACK"),
            Content::NakGoBackN => write!(f, "NAK (go-back-n)"),
            Content::NakSelectiveRepeat => write!(f, "NAK (selective repeat)"),
            Content::Text { message } => write!(f, "{message}"),
            Content::FileInfo { name, size } => {
                write!(f, "File name: {name} - File size: {size}")
            }
        }
    }
}

/// One frame. Immutable once built; use the constructors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    number: Option<u32>,
    content: Content,
}

impl Packet {
    pub fn new(number: u32, content: Content) -> Self {
        Self {
            number: Some(number),
            content,
        }
    }

    /// Frame without a sequence number (legacy stop-and-wait peers).
    pub fn unnumbered(content: Content) -> Self {
        Self {
            number: None,
            content,
        }
    }

    pub fn ack(number: u32) -> Self {
        Self::new(number, Content::Ack)
    }

    pub fn nak_go_back_n(number: u32) -> Self {
        Self::new(number, Content::NakGoBackN)
    }

    pub fn nak_selective_repeat(number: u32) -> Self {
        Self::new(number, Content::NakSelectiveRepeat)
    }

    pub fn text(number: u32, message: impl Into<String>) -> Self {
        Self::new(number, Content::text(message))
    }

    pub fn file_info(number: u32, name: impl Into<String>, size: u32) -> Self {
        Self::new(number, Content::file_info(name, size))
    }

    pub fn number(&self) -> Option<u32> {
        self.number
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn into_content(self) -> Content {
        self.content
    }

    pub fn kind(&self) -> PacketType {
        self.content.kind()
    }

    pub fn is_data(&self) -> bool {
        self.kind().is_data()
    }

    /// Serialise into a newly allocated buffer.
    ///
    /// Layout, big-endian: one type tag byte, the sequence number as `i32`
    /// (`-1` when unnumbered), then the body. Text is a `u16` length and
    /// UTF-8 bytes; file info is the same for the name followed by a `u32`
    /// size. Control frames have no body.
    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let number = match self.number {
            Some(n) => i32::try_from(n).map_err(|_| EncodeError::NumberOutOfRange(n))?,
            None => NO_NUMBER,
        };

        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.body_len());
        buf.put_u8(self.kind().tag());
        buf.put_i32(number);
        match &self.content {
            Content::Ack | Content::NakGoBackN | Content::NakSelectiveRepeat => {}
            Content::Text { message } => put_string(&mut buf, message)?,
            Content::FileInfo { name, size } => {
                put_string(&mut buf, name)?;
                buf.put_u32(*size);
            }
        }
        Ok(buf.freeze())
    }

    /// Parse a frame from one complete datagram.
    ///
    /// Dispatches on the type tag alone. Trailing bytes after the body are
    /// rejected so a datagram maps to exactly one frame.
    pub fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = buf;
        ensure_remaining(&buf, HEADER_LEN)?;

        let tag = buf.get_u8();
        let kind = PacketType::from_tag(tag).ok_or(DecodeError::UnknownType(tag))?;
        let number = match buf.get_i32() {
            NO_NUMBER => None,
            n if n >= 0 => Some(n as u32),
            n => return Err(DecodeError::InvalidNumber(n)),
        };

        let content = match kind {
            PacketType::Ack => Content::Ack,
            PacketType::NakGoBackN => Content::NakGoBackN,
            PacketType::NakSelectiveRepeat => Content::NakSelectiveRepeat,
            PacketType::String => Content::Text {
                message: get_string(&mut buf)?,
            },
            PacketType::FileInfo => {
                let name = get_string(&mut buf)?;
                ensure_remaining(&buf, 4)?;
                Content::FileInfo {
                    name,
                    size: buf.get_u32(),
                }
            }
        };

        if buf.has_remaining() {
            return Err(DecodeError::TrailingBytes(buf.remaining()));
        }
        Ok(Self { number, content })
    }

    fn body_len(&self) -> usize {
        match &self.content {
            Content::Ack | Content::NakGoBackN | Content::NakSelectiveRepeat => 0,
            Content::Text { message } => 2 + message.len(),
            Content::FileInfo { name, .. } => 2 + name.len() + 4,
        }
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            Some(n) => write!(f, "#{n} {}", self.content),
            None => write!(f, "#- {}", self.content),
        }
    }
}

fn ensure_remaining(buf: &&[u8], needed: usize) -> Result<(), DecodeError> {
    if buf.remaining() < needed {
        return Err(DecodeError::Truncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn put_string(buf: &mut BytesMut, value: &str) -> Result<(), EncodeError> {
    let len = u16::try_from(value.len()).map_err(|_| EncodeError::StringTooLong(value.len()))?;
    buf.put_u16(len);
    buf.put_slice(value.as_bytes());
    Ok(())
}

fn get_string(buf: &mut &[u8]) -> Result<String, DecodeError> {
    ensure_remaining(buf, 2)?;
    let len = usize::from(buf.get_u16());
    ensure_remaining(buf, len)?;
    let raw = buf.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8)
}
