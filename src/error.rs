//! Error types for SPDY framing.

use crate::frame::Frame;

/// Errors produced by the SPDY framing layer.
///
/// Frame-level variants carry the stream id they relate to (0 when the
/// error is not tied to a stream). The two header diagnostics,
/// [`Error::UnlowercasedHeaderName`] and [`Error::DuplicateHeaders`], are
/// recoverable: the block was parsed to completion and the normalized frame
/// rides along inside the error, retrievable via [`Error::into_frame`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A header name arrived with uppercase characters. The name was
    /// lowercased and parsing continued; the parsed frame is attached.
    #[error("header was not lowercased")]
    UnlowercasedHeaderName { stream_id: u32, frame: Box<Frame> },

    /// Two header entries shared the same post-lowercase name. Their values
    /// were merged in arrival order; the parsed frame is attached.
    #[error("multiple headers with same name")]
    DuplicateHeaders { stream_id: u32, frame: Box<Frame> },

    /// The zlib stream did not line up with the frame's compressed payload
    /// length. Fatal for the connection: the shared compression state can
    /// no longer be trusted.
    #[error("compressed payload size was incorrect")]
    WrongCompressedPayloadSize,

    /// A control frame carried a type discriminant this implementation does
    /// not know. The source is positioned just past the 8-byte header.
    #[error("unknown frame type: {0:#06x}")]
    UnknownFrameType(u16),

    /// A reserved flag was non-zero, a length was wrong, or a RST_STREAM
    /// status was zero.
    #[error("invalid control frame")]
    InvalidControlFrame { stream_id: u32 },

    /// A data frame had its reserved stream-id bit set or a payload too
    /// large for the 24-bit length field.
    #[error("invalid data frame")]
    InvalidDataFrame { stream_id: u32 },

    /// A header block contained a name that is banned for its direction
    /// (e.g. `connection` in a response).
    #[error("frame contained invalid header")]
    InvalidHeaderPresent { stream_id: u32 },

    /// A frame that requires a non-zero stream id carried zero.
    #[error("stream id zero is disallowed")]
    ZeroStreamId,

    /// Transport error from the underlying byte stream, propagated verbatim.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The header compressor failed.
    #[error("zlib deflate failed: {0}")]
    Compress(#[from] flate2::CompressError),

    /// The header decompressor failed.
    #[error("zlib inflate failed: {0}")]
    Decompress(#[from] flate2::DecompressError),
}

impl Error {
    /// The stream id this error relates to, or 0 when not applicable.
    pub fn stream_id(&self) -> u32 {
        match self {
            Error::UnlowercasedHeaderName { stream_id, .. }
            | Error::DuplicateHeaders { stream_id, .. }
            | Error::InvalidControlFrame { stream_id }
            | Error::InvalidDataFrame { stream_id }
            | Error::InvalidHeaderPresent { stream_id } => *stream_id,
            _ => 0,
        }
    }

    /// Returns true for the recoverable header diagnostics.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::UnlowercasedHeaderName { .. } | Error::DuplicateHeaders { .. }
        )
    }

    /// The fully parsed frame attached to a recoverable diagnostic.
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Error::UnlowercasedHeaderName { frame, .. }
            | Error::DuplicateHeaders { frame, .. } => Some(frame),
            _ => None,
        }
    }

    /// Consumes the error, yielding the recovered frame if there is one.
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Error::UnlowercasedHeaderName { frame, .. }
            | Error::DuplicateHeaders { frame, .. } => Some(*frame),
            _ => None,
        }
    }
}
