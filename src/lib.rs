//! Synchronous SPDY/3 framing layer.
//!
//! This crate implements the framing core of SPDY version 3
//! (`draft-mbelshe-httpbis-spdy-00`): a bidirectional codec that
//! serializes typed [`Frame`] values to a byte sink and parses them from a
//! byte source, transparently compressing and decompressing the header
//! blocks carried by SYN_STREAM, SYN_REPLY, and HEADERS through a shared
//! zlib stream primed with the fixed SPDY/3 dictionary.
//!
//! # Architecture
//!
//! ```text
//!    Frame values                      Frame values
//!         |                                 ^
//!   +-----v------+                   +------+------+
//!   | FrameWriter|  deflate stream   | FrameReader |  inflate stream
//!   | sink + zlib|                   | source+zlib |  (lazy)
//!   +-----+------+                   +------+------+
//!         |                                 ^
//!         v        caller's transport       |
//!        bytes  ------------------------> bytes
//! ```
//!
//! The codec owns no sockets and runs no state machines: stream lifecycle,
//! flow control, priority scheduling, and HTTP semantics live in the
//! caller. Reads and writes are blocking and must stay in order per
//! direction, because the zlib header compression is stateful across
//! frames.
//!
//! # Example
//!
//! ```
//! use protocol_spdy::{Frame, Framer, Headers, SynStreamFrame};
//!
//! let mut headers = Headers::new();
//! headers.add(":method", "GET");
//! headers.add(":path", "/");
//!
//! // In-memory transport: write into a Vec, read back from a slice.
//! let mut framer = Framer::new(Vec::new(), std::io::empty()).unwrap();
//! framer.write_frame(&Frame::SynStream(SynStreamFrame {
//!     stream_id: 1,
//!     priority: 3,
//!     headers,
//!     ..Default::default()
//! })).unwrap();
//! ```

pub mod error;
pub mod frame;
pub mod framer;
pub mod headers;
pub mod settings;
mod zlib;

pub use error::Error;
pub use frame::{
    ControlFrameHeader, DataFrame, Frame, GoAwayFrame, GoAwayStatus, HeadersFrame, PingFrame,
    RstStreamFrame, RstStreamStatus, SettingsFrame, SynReplyFrame, SynStreamFrame,
    WindowUpdateFrame, CONTROL_FLAG_FIN, CONTROL_FLAG_UNIDIRECTIONAL, DATA_FLAG_COMPRESSED,
    DATA_FLAG_FIN, MAX_DATA_LENGTH, VERSION,
};
pub use framer::{Config, FrameReader, FrameWriter, Framer};
pub use headers::Headers;
pub use settings::SettingsFlagIdValue;
