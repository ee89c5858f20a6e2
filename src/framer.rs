//! The framer: serializes and parses SPDY frames over caller-supplied byte
//! streams, compressing and decompressing header blocks along the way.
//!
//! The session state splits cleanly along the read/write seam:
//! [`FrameWriter`] owns the sink, the scratch buffers, and the deflate
//! stream; [`FrameReader`] owns the source, its buffers, and the lazily
//! created inflate stream. [`Framer`] composes one of each for callers who
//! want a single duplex handle; the halves can be [`Framer::split`] apart
//! and driven from different threads.
//!
//! All operations are synchronous and blocking. The framer issues many
//! small reads and writes; pass buffered streams.

use std::io::{Read, Write};

use bytes::Bytes;

use crate::error::Error;
use crate::frame::{
    pack_control_word, pack_flags_length, unpack_flags_length, ControlFrameHeader, DataFrame,
    Frame, GoAwayFrame, GoAwayStatus, HeadersFrame, PingFrame, RstStreamFrame, RstStreamStatus,
    SettingsFrame, SynReplyFrame, SynStreamFrame, WindowUpdateFrame, MAX_DATA_LENGTH,
    STREAM_ID_MASK, SYN_REPLY_PREFIX_LEN, SYN_STREAM_PREFIX_LEN, TYPE_GOAWAY, TYPE_HEADERS,
    TYPE_PING, TYPE_RST_STREAM, TYPE_SETTINGS, TYPE_SYN_REPLY, TYPE_SYN_STREAM,
    TYPE_WINDOW_UPDATE, VERSION,
};
use crate::headers::{self, BlockDiagnostic, Headers};
use crate::settings::{self, SettingsFlagIdValue, SETTINGS_ENTRY_LEN};
use crate::zlib::{HeaderCompressor, HeaderDecompressor};

/// Framer configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Compress header blocks with the shared-dictionary zlib stream.
    /// Disabling this writes and reads blocks as raw bytes; both peers
    /// must agree.
    pub header_compression: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            header_compression: true,
        }
    }
}

/// The write half: serializes frames to a byte sink.
///
/// Owns the persistent deflate stream; every header-bearing frame written
/// through it advances that stream, so frames must reach the peer in write
/// order.
pub struct FrameWriter<W: Write> {
    sink: W,
    /// Serialized (uncompressed) name/value block for the frame in flight.
    block_buf: Vec<u8>,
    /// Header payload as it goes on the wire; its length drives the
    /// frame's 24-bit length field.
    scratch: Vec<u8>,
    compressor: Option<HeaderCompressor>,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(sink: W) -> Result<Self, Error> {
        Self::with_config(sink, &Config::default())
    }

    pub fn with_config(sink: W, config: &Config) -> Result<Self, Error> {
        let compressor = if config.header_compression {
            Some(HeaderCompressor::new()?)
        } else {
            None
        };
        Ok(Self {
            sink,
            block_buf: Vec::new(),
            scratch: Vec::new(),
            compressor,
        })
    }

    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Serialize one frame. Version, type, and length on the wire header
    /// are derived here; the frame's own fields are emitted unchanged.
    ///
    /// Validation runs before the first byte is written: on a validation
    /// error the sink has not been touched. An I/O error mid-frame leaves
    /// the sink unusable for framing.
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        match frame {
            Frame::SynStream(f) => self.write_syn_stream(f),
            Frame::SynReply(f) => self.write_syn_reply(f),
            Frame::RstStream(f) => self.write_rst_stream(f),
            Frame::Settings(f) => self.write_settings(f),
            Frame::Ping(f) => self.write_ping(f),
            Frame::GoAway(f) => self.write_go_away(f),
            Frame::Headers(f) => self.write_headers(f),
            Frame::WindowUpdate(f) => self.write_window_update(f),
            Frame::Data(f) => self.write_data(f),
        }
    }

    fn write_u32(&mut self, value: u32) -> Result<(), Error> {
        self.sink.write_all(&value.to_be_bytes())?;
        Ok(())
    }

    fn write_control_header(&mut self, frame_type: u16, flags: u8, length: u32) -> Result<(), Error> {
        self.sink
            .write_all(&pack_control_word(VERSION, frame_type).to_be_bytes())?;
        self.sink
            .write_all(&pack_flags_length(flags, length).to_be_bytes())?;
        Ok(())
    }

    /// Serialize `headers` into the scratch buffer, through the deflate
    /// stream when compression is on. The scratch ends at a SYNC_FLUSH
    /// boundary so the peer can decode this frame in isolation.
    fn prepare_header_block(&mut self, headers: &Headers) -> Result<(), Error> {
        self.scratch.clear();
        match &mut self.compressor {
            Some(compressor) => {
                self.block_buf.clear();
                headers::encode_block(headers, &mut self.block_buf);
                compressor.compress_block(&self.block_buf, &mut self.scratch)?;
            }
            None => headers::encode_block(headers, &mut self.scratch),
        }
        Ok(())
    }

    fn write_syn_stream(&mut self, frame: &SynStreamFrame) -> Result<(), Error> {
        if frame.stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        self.prepare_header_block(&frame.headers)?;
        let length = self.scratch.len() as u32 + SYN_STREAM_PREFIX_LEN;
        self.write_control_header(TYPE_SYN_STREAM, frame.header.flags, length)?;
        self.write_u32(frame.stream_id & STREAM_ID_MASK)?;
        self.write_u32(frame.associated_stream_id & STREAM_ID_MASK)?;
        // Priority rides the top 3 bits; the low 5 bits and the slot's
        // byte follow reserved-as-zero rules.
        self.sink
            .write_all(&[(frame.priority & 0x07) << 5, frame.slot])?;
        self.sink.write_all(&self.scratch)?;
        self.scratch.clear();
        Ok(())
    }

    fn write_syn_reply(&mut self, frame: &SynReplyFrame) -> Result<(), Error> {
        if frame.stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        self.prepare_header_block(&frame.headers)?;
        let length = self.scratch.len() as u32 + SYN_REPLY_PREFIX_LEN;
        self.write_control_header(TYPE_SYN_REPLY, frame.header.flags, length)?;
        self.write_u32(frame.stream_id & STREAM_ID_MASK)?;
        self.sink.write_all(&self.scratch)?;
        self.scratch.clear();
        Ok(())
    }

    fn write_rst_stream(&mut self, frame: &RstStreamFrame) -> Result<(), Error> {
        if frame.stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        if frame.status.0 == 0 {
            return Err(Error::InvalidControlFrame {
                stream_id: frame.stream_id,
            });
        }
        self.write_control_header(TYPE_RST_STREAM, 0, 8)?;
        self.write_u32(frame.stream_id & STREAM_ID_MASK)?;
        self.write_u32(frame.status.0)?;
        Ok(())
    }

    fn write_settings(&mut self, frame: &SettingsFrame) -> Result<(), Error> {
        let length = 4 + SETTINGS_ENTRY_LEN * frame.flag_id_values.len() as u32;
        self.write_control_header(TYPE_SETTINGS, frame.header.flags, length)?;
        self.write_u32(frame.flag_id_values.len() as u32)?;
        for entry in &frame.flag_id_values {
            self.write_u32(settings::pack_flag_id(entry.flag, entry.id))?;
            self.write_u32(entry.value)?;
        }
        Ok(())
    }

    fn write_ping(&mut self, frame: &PingFrame) -> Result<(), Error> {
        if frame.id == 0 {
            return Err(Error::ZeroStreamId);
        }
        self.write_control_header(TYPE_PING, 0, 4)?;
        self.write_u32(frame.id)?;
        Ok(())
    }

    fn write_go_away(&mut self, frame: &GoAwayFrame) -> Result<(), Error> {
        self.write_control_header(TYPE_GOAWAY, 0, 8)?;
        self.write_u32(frame.last_good_stream_id & STREAM_ID_MASK)?;
        self.write_u32(frame.status.0)?;
        Ok(())
    }

    fn write_headers(&mut self, frame: &HeadersFrame) -> Result<(), Error> {
        if frame.stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        self.prepare_header_block(&frame.headers)?;
        let length = self.scratch.len() as u32 + SYN_REPLY_PREFIX_LEN;
        self.write_control_header(TYPE_HEADERS, frame.header.flags, length)?;
        self.write_u32(frame.stream_id & STREAM_ID_MASK)?;
        self.sink.write_all(&self.scratch)?;
        self.scratch.clear();
        Ok(())
    }

    fn write_window_update(&mut self, frame: &WindowUpdateFrame) -> Result<(), Error> {
        if frame.stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        self.write_control_header(TYPE_WINDOW_UPDATE, 0, 8)?;
        self.write_u32(frame.stream_id & STREAM_ID_MASK)?;
        self.write_u32(frame.delta_window_size & STREAM_ID_MASK)?;
        Ok(())
    }

    fn write_data(&mut self, frame: &DataFrame) -> Result<(), Error> {
        if frame.stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        if frame.stream_id & !STREAM_ID_MASK != 0 || frame.data.len() >= MAX_DATA_LENGTH {
            return Err(Error::InvalidDataFrame {
                stream_id: frame.stream_id,
            });
        }
        self.write_u32(frame.stream_id)?;
        self.write_u32(pack_flags_length(frame.flags, frame.data.len() as u32))?;
        self.sink.write_all(&frame.data)?;
        Ok(())
    }
}

/// The read half: parses frames from a byte source.
///
/// Owns the persistent inflate stream (created on the first header-bearing
/// frame); every header-bearing frame read through it advances that
/// stream, so frames must be read in arrival order.
pub struct FrameReader<R: Read> {
    source: R,
    /// One frame's compressed payload, fenced by the frame's length field.
    payload_buf: Vec<u8>,
    /// The inflated name/value block.
    block_buf: Vec<u8>,
    decompressor: Option<HeaderDecompressor>,
    header_compression: bool,
}

impl<R: Read> FrameReader<R> {
    pub fn new(source: R) -> Self {
        Self::with_config(source, &Config::default())
    }

    pub fn with_config(source: R, config: &Config) -> Self {
        Self {
            source,
            payload_buf: Vec::new(),
            block_buf: Vec::new(),
            decompressor: None,
            header_compression: config.header_compression,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.source
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Read exactly one frame.
    ///
    /// On [`Error::UnknownFrameType`] the source is positioned just past
    /// the 8-byte header; the caller must discard the payload or close.
    /// Any other parse error leaves the read direction in an undefined
    /// state.
    pub fn read_frame(&mut self) -> Result<Frame, Error> {
        let first = self.read_u32()?;
        if first & crate::frame::CONTROL_BIT != 0 {
            let version = ((first >> 16) & 0x7fff) as u16;
            let frame_type = (first & 0xffff) as u16;
            self.read_control_frame(version, frame_type)
        } else {
            self.read_data_frame(first & STREAM_ID_MASK)
        }
    }

    fn read_u32(&mut self) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        self.source.read_exact(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    fn read_control_frame(&mut self, version: u16, frame_type: u16) -> Result<Frame, Error> {
        let (flags, length) = unpack_flags_length(self.read_u32()?);
        let header = ControlFrameHeader { version, flags };
        match frame_type {
            TYPE_SYN_STREAM => self.read_syn_stream(header, length),
            TYPE_SYN_REPLY => self.read_syn_reply(header, length),
            TYPE_RST_STREAM => self.read_rst_stream(header, length),
            TYPE_SETTINGS => self.read_settings(header, length),
            TYPE_PING => self.read_ping(header, length),
            TYPE_GOAWAY => self.read_go_away(header, length),
            TYPE_HEADERS => self.read_headers(header, length),
            TYPE_WINDOW_UPDATE => self.read_window_update(header, length),
            other => Err(Error::UnknownFrameType(other)),
        }
    }

    fn read_syn_stream(&mut self, header: ControlFrameHeader, length: u32) -> Result<Frame, Error> {
        if length < SYN_STREAM_PREFIX_LEN {
            return Err(Error::InvalidControlFrame { stream_id: 0 });
        }
        let stream_id = self.read_u32()? & STREAM_ID_MASK;
        let associated_stream_id = self.read_u32()? & STREAM_ID_MASK;
        let mut priority_slot = [0u8; 2];
        self.source.read_exact(&mut priority_slot)?;
        let priority = priority_slot[0] >> 5;
        let slot = priority_slot[1];

        let (headers, diagnostic) =
            self.read_header_block((length - SYN_STREAM_PREFIX_LEN) as usize, stream_id)?;
        if headers::has_invalid_request_header(&headers) {
            return Err(Error::InvalidHeaderPresent { stream_id });
        }
        if stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        deliver(
            Frame::SynStream(SynStreamFrame {
                header,
                stream_id,
                associated_stream_id,
                priority,
                slot,
                headers,
            }),
            stream_id,
            diagnostic,
        )
    }

    fn read_syn_reply(&mut self, header: ControlFrameHeader, length: u32) -> Result<Frame, Error> {
        if length < SYN_REPLY_PREFIX_LEN {
            return Err(Error::InvalidControlFrame { stream_id: 0 });
        }
        let stream_id = self.read_u32()? & STREAM_ID_MASK;
        let (headers, diagnostic) =
            self.read_header_block((length - SYN_REPLY_PREFIX_LEN) as usize, stream_id)?;
        if headers::has_invalid_response_header(&headers) {
            return Err(Error::InvalidHeaderPresent { stream_id });
        }
        if stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        deliver(
            Frame::SynReply(SynReplyFrame {
                header,
                stream_id,
                headers,
            }),
            stream_id,
            diagnostic,
        )
    }

    fn read_rst_stream(&mut self, header: ControlFrameHeader, length: u32) -> Result<Frame, Error> {
        if length != 8 {
            return Err(Error::InvalidControlFrame { stream_id: 0 });
        }
        let stream_id = self.read_u32()? & STREAM_ID_MASK;
        let status = RstStreamStatus(self.read_u32()?);
        if status.0 == 0 {
            return Err(Error::InvalidControlFrame { stream_id });
        }
        if stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        Ok(Frame::RstStream(RstStreamFrame {
            header,
            stream_id,
            status,
        }))
    }

    fn read_settings(&mut self, header: ControlFrameHeader, length: u32) -> Result<Frame, Error> {
        let count = self.read_u32()?;
        // The length field must agree with the entry count, or the frame
        // boundary is ambiguous.
        let expected = count
            .checked_mul(SETTINGS_ENTRY_LEN)
            .and_then(|n| n.checked_add(4));
        if expected != Some(length) {
            return Err(Error::InvalidControlFrame { stream_id: 0 });
        }
        let mut flag_id_values = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (flag, id) = settings::unpack_flag_id(self.read_u32()?);
            let value = self.read_u32()?;
            flag_id_values.push(SettingsFlagIdValue { flag, id, value });
        }
        Ok(Frame::Settings(SettingsFrame {
            header,
            flag_id_values,
        }))
    }

    fn read_ping(&mut self, header: ControlFrameHeader, length: u32) -> Result<Frame, Error> {
        if length != 4 {
            return Err(Error::InvalidControlFrame { stream_id: 0 });
        }
        let id = self.read_u32()?;
        if id == 0 {
            return Err(Error::ZeroStreamId);
        }
        if header.flags != 0 {
            return Err(Error::InvalidControlFrame { stream_id: id });
        }
        Ok(Frame::Ping(PingFrame { header, id }))
    }

    fn read_go_away(&mut self, header: ControlFrameHeader, length: u32) -> Result<Frame, Error> {
        if header.flags != 0 || length != 8 {
            return Err(Error::InvalidControlFrame { stream_id: 0 });
        }
        let last_good_stream_id = self.read_u32()? & STREAM_ID_MASK;
        let status = GoAwayStatus(self.read_u32()?);
        Ok(Frame::GoAway(GoAwayFrame {
            header,
            last_good_stream_id,
            status,
        }))
    }

    fn read_headers(&mut self, header: ControlFrameHeader, length: u32) -> Result<Frame, Error> {
        if length < SYN_REPLY_PREFIX_LEN {
            return Err(Error::InvalidControlFrame { stream_id: 0 });
        }
        let stream_id = self.read_u32()? & STREAM_ID_MASK;
        let (headers, diagnostic) =
            self.read_header_block((length - SYN_REPLY_PREFIX_LEN) as usize, stream_id)?;
        // Clients open odd streams, so an odd stream carries request
        // headers and an even (pushed) stream carries response headers.
        let banned = if stream_id % 2 == 1 {
            headers::has_invalid_request_header(&headers)
        } else {
            headers::has_invalid_response_header(&headers)
        };
        if banned {
            return Err(Error::InvalidHeaderPresent { stream_id });
        }
        if stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        deliver(
            Frame::Headers(HeadersFrame {
                header,
                stream_id,
                headers,
            }),
            stream_id,
            diagnostic,
        )
    }

    fn read_window_update(&mut self, header: ControlFrameHeader, length: u32) -> Result<Frame, Error> {
        if header.flags != 0 || length != 8 {
            return Err(Error::InvalidControlFrame { stream_id: 0 });
        }
        let stream_id = self.read_u32()? & STREAM_ID_MASK;
        let delta_window_size = self.read_u32()? & STREAM_ID_MASK;
        if stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        Ok(Frame::WindowUpdate(WindowUpdateFrame {
            header,
            stream_id,
            delta_window_size,
        }))
    }

    fn read_data_frame(&mut self, stream_id: u32) -> Result<Frame, Error> {
        let (flags, length) = unpack_flags_length(self.read_u32()?);
        let mut data = vec![0u8; length as usize];
        self.source.read_exact(&mut data)?;
        if stream_id == 0 {
            return Err(Error::ZeroStreamId);
        }
        Ok(Frame::Data(DataFrame {
            stream_id,
            flags,
            data: Bytes::from(data),
        }))
    }

    /// Read one frame's header payload (`payload_len` bytes, as fenced by
    /// the frame's length field) and parse it into a header map. With
    /// compression on, the payload runs through the persistent inflate
    /// stream and must be consumed exactly.
    fn read_header_block(
        &mut self,
        payload_len: usize,
        stream_id: u32,
    ) -> Result<(Headers, Option<BlockDiagnostic>), Error> {
        self.payload_buf.clear();
        self.payload_buf.resize(payload_len, 0);
        self.source.read_exact(&mut self.payload_buf)?;

        if self.header_compression {
            // A block that really ends on a SYNC_FLUSH boundary ends with
            // the empty-stored-block trailer; a payload that does not has
            // been cut short or padded, and inflating it would desync the
            // shared stream.
            if !self.payload_buf.ends_with(&crate::zlib::SYNC_FLUSH_TRAILER) {
                return Err(Error::WrongCompressedPayloadSize);
            }
            let decompressor = self
                .decompressor
                .get_or_insert_with(HeaderDecompressor::new);
            self.block_buf.clear();
            let consumed = decompressor.decompress_block(&self.payload_buf, &mut self.block_buf)?;
            if consumed != self.payload_buf.len() {
                return Err(Error::WrongCompressedPayloadSize);
            }
            headers::parse_block(&self.block_buf)
                .map_err(|_| Error::WrongCompressedPayloadSize)
        } else {
            headers::parse_block(&self.payload_buf)
                .map_err(|_| Error::InvalidControlFrame { stream_id })
        }
    }
}

/// Hand the parsed frame to the caller, as an error if a recoverable
/// diagnostic was recorded during block parsing.
fn deliver(
    frame: Frame,
    stream_id: u32,
    diagnostic: Option<BlockDiagnostic>,
) -> Result<Frame, Error> {
    match diagnostic {
        None => Ok(frame),
        Some(BlockDiagnostic::UnlowercasedName) => Err(Error::UnlowercasedHeaderName {
            stream_id,
            frame: Box::new(frame),
        }),
        Some(BlockDiagnostic::DuplicateName) => Err(Error::DuplicateHeaders {
            stream_id,
            frame: Box::new(frame),
        }),
    }
}

/// A duplex SPDY framer: one [`FrameWriter`] plus one [`FrameReader`].
pub struct Framer<W: Write, R: Read> {
    writer: FrameWriter<W>,
    reader: FrameReader<R>,
}

impl<W: Write, R: Read> Framer<W, R> {
    /// Framer with header compression enabled, the interoperable default.
    pub fn new(sink: W, source: R) -> Result<Self, Error> {
        Self::with_config(sink, source, Config::default())
    }

    pub fn with_config(sink: W, source: R, config: Config) -> Result<Self, Error> {
        Ok(Self {
            writer: FrameWriter::with_config(sink, &config)?,
            reader: FrameReader::with_config(source, &config),
        })
    }

    /// See [`FrameWriter::write_frame`].
    pub fn write_frame(&mut self, frame: &Frame) -> Result<(), Error> {
        self.writer.write_frame(frame)
    }

    /// See [`FrameReader::read_frame`].
    pub fn read_frame(&mut self) -> Result<Frame, Error> {
        self.reader.read_frame()
    }

    /// Split into independently owned halves, e.g. to drive reads and
    /// writes from two threads.
    pub fn split(self) -> (FrameWriter<W>, FrameReader<R>) {
        (self.writer, self.reader)
    }
}
