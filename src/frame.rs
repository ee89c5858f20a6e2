//! SPDY/3 frame model and header-word packing.
//!
//! Control frames share an 8-byte header:
//! ```text
//! +----------------------------------+
//! |1| Version(15bits) | Type(16bits) |
//! +----------------------------------+
//! | flags (8)  |  Length (24 bits)   |
//! +----------------------------------+
//! |               Data               |
//! +----------------------------------+
//! ```
//! Data frames replace the first word with the stream id (control bit 0):
//! ```text
//! +----------------------------------+
//! |0|       Stream-ID (31bits)       |
//! +----------------------------------+
//! | flags (8)  |  Length (24 bits)   |
//! +----------------------------------+
//! |               Data               |
//! +----------------------------------+
//! ```

use bytes::Bytes;

use crate::headers::Headers;
use crate::settings::SettingsFlagIdValue;

/// Protocol version this crate implements.
pub const VERSION: u16 = 3;

/// Size of the fixed frame header in bytes (control and data alike).
pub const FRAME_HEADER_LEN: usize = 8;

/// Maximum number of payload bytes a data frame's 24-bit length can carry.
pub const MAX_DATA_LENGTH: usize = 0x00ff_ffff;

// Control frame type discriminants. 0x0005 (NOOP) was removed in SPDY/3
// and 0x000A (CREDENTIAL) is reserved, so neither appears here.
pub const TYPE_SYN_STREAM: u16 = 0x0001;
pub const TYPE_SYN_REPLY: u16 = 0x0002;
pub const TYPE_RST_STREAM: u16 = 0x0003;
pub const TYPE_SETTINGS: u16 = 0x0004;
pub const TYPE_PING: u16 = 0x0006;
pub const TYPE_GOAWAY: u16 = 0x0007;
pub const TYPE_HEADERS: u16 = 0x0008;
pub const TYPE_WINDOW_UPDATE: u16 = 0x0009;

// Control frame flags.
pub const CONTROL_FLAG_FIN: u8 = 0x01;
/// SYN_STREAM only.
pub const CONTROL_FLAG_UNIDIRECTIONAL: u8 = 0x02;

// Data frame flags.
pub const DATA_FLAG_FIN: u8 = 0x01;
pub const DATA_FLAG_COMPRESSED: u8 = 0x02;

pub(crate) const CONTROL_BIT: u32 = 0x8000_0000;
pub(crate) const STREAM_ID_MASK: u32 = 0x7fff_ffff;
pub(crate) const LENGTH_MASK: u32 = 0x00ff_ffff;

/// Bytes of fixed payload preceding the header block in SYN_STREAM.
pub(crate) const SYN_STREAM_PREFIX_LEN: u32 = 10;
/// Bytes of fixed payload preceding the header block in SYN_REPLY / HEADERS.
pub(crate) const SYN_REPLY_PREFIX_LEN: u32 = 4;

/// RST_STREAM status code. Zero is invalid on the wire; codes this
/// implementation does not name still round-trip verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RstStreamStatus(pub u32);

impl RstStreamStatus {
    pub const PROTOCOL_ERROR: Self = Self(1);
    pub const INVALID_STREAM: Self = Self(2);
    pub const REFUSED_STREAM: Self = Self(3);
    pub const UNSUPPORTED_VERSION: Self = Self(4);
    pub const CANCEL: Self = Self(5);
    pub const INTERNAL_ERROR: Self = Self(6);
    pub const FLOW_CONTROL_ERROR: Self = Self(7);
    pub const STREAM_IN_USE: Self = Self(8);
    pub const STREAM_ALREADY_CLOSED: Self = Self(9);
    pub const INVALID_CREDENTIALS: Self = Self(10);
    pub const FRAME_TOO_LARGE: Self = Self(11);
}

/// GOAWAY status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GoAwayStatus(pub u32);

impl GoAwayStatus {
    pub const OK: Self = Self(0);
    pub const PROTOCOL_ERROR: Self = Self(1);
    pub const INTERNAL_ERROR: Self = Self(2);
}

/// The fields of the control frame header that belong to the in-memory
/// frame value: the 15-bit protocol version (3 on emission, preserved on
/// parse) and the flags byte. Type and length are derived on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlFrameHeader {
    pub version: u16,
    pub flags: u8,
}

impl Default for ControlFrameHeader {
    fn default() -> Self {
        Self {
            version: VERSION,
            flags: 0,
        }
    }
}

impl ControlFrameHeader {
    /// Header at protocol version 3 with the given flags.
    pub fn with_flags(flags: u8) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }
}

/// SYN_STREAM: opens a stream, carrying a compressed header block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SynStreamFrame {
    pub header: ControlFrameHeader,
    pub stream_id: u32,
    pub associated_stream_id: u32,
    /// 3-bit priority (0 highest, 7 lowest).
    pub priority: u8,
    /// Credential slot.
    pub slot: u8,
    pub headers: Headers,
}

/// SYN_REPLY: the response half of a stream, carrying a header block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SynReplyFrame {
    pub header: ControlFrameHeader,
    pub stream_id: u32,
    pub headers: Headers,
}

/// RST_STREAM: abnormal stream termination.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RstStreamFrame {
    pub header: ControlFrameHeader,
    pub stream_id: u32,
    pub status: RstStreamStatus,
}

/// SETTINGS: a list of flag/id/value configuration entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SettingsFrame {
    pub header: ControlFrameHeader,
    pub flag_id_values: Vec<SettingsFlagIdValue>,
}

/// PING: connection liveness check with an opaque non-zero id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PingFrame {
    pub header: ControlFrameHeader,
    pub id: u32,
}

/// GOAWAY: graceful shutdown, naming the last accepted stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GoAwayFrame {
    pub header: ControlFrameHeader,
    pub last_good_stream_id: u32,
    pub status: GoAwayStatus,
}

/// HEADERS: additional header block on an existing stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeadersFrame {
    pub header: ControlFrameHeader,
    pub stream_id: u32,
    pub headers: Headers,
}

/// WINDOW_UPDATE: flow control window increment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowUpdateFrame {
    pub header: ControlFrameHeader,
    pub stream_id: u32,
    /// 31-bit window delta.
    pub delta_window_size: u32,
}

/// DATA: payload bytes for one stream (control bit 0).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataFrame {
    pub stream_id: u32,
    pub flags: u8,
    pub data: Bytes,
}

/// A single SPDY frame in its unpacked in-memory representation.
///
/// Use [`crate::framer::Framer`] to read and write frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SynStream(SynStreamFrame),
    SynReply(SynReplyFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    Headers(HeadersFrame),
    WindowUpdate(WindowUpdateFrame),
    Data(DataFrame),
}

impl Frame {
    /// True for the eight control variants, false for data.
    pub fn is_control(&self) -> bool {
        !matches!(self, Frame::Data(_))
    }

    /// The stream id the frame addresses, or 0 for frames without one
    /// (SETTINGS, PING, GOAWAY).
    pub fn stream_id(&self) -> u32 {
        match self {
            Frame::SynStream(f) => f.stream_id,
            Frame::SynReply(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
            Frame::Headers(f) => f.stream_id,
            Frame::WindowUpdate(f) => f.stream_id,
            Frame::Data(f) => f.stream_id,
            Frame::Settings(_) | Frame::Ping(_) | Frame::GoAway(_) => 0,
        }
    }
}

// -- Header word packing --

/// First word of a control frame: control bit, 15-bit version, 16-bit type.
pub(crate) fn pack_control_word(version: u16, frame_type: u16) -> u32 {
    CONTROL_BIT | (u32::from(version & 0x7fff) << 16) | u32::from(frame_type)
}

/// Second word of either frame kind: 8-bit flags over a 24-bit length.
pub(crate) fn pack_flags_length(flags: u8, length: u32) -> u32 {
    (u32::from(flags) << 24) | (length & LENGTH_MASK)
}

pub(crate) fn unpack_flags_length(word: u32) -> (u8, u32) {
    ((word >> 24) as u8, word & LENGTH_MASK)
}
