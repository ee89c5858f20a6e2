//! Persistent zlib streams for header-block compression.
//!
//! SPDY/3 compresses every header block through one deflate stream per
//! direction, primed with a fixed dictionary and flushed with Z_SYNC_FLUSH
//! after each block so the receiver can inflate frame by frame. The stream
//! state is shared across frames; losing sync on either side poisons the
//! connection.

use flate2::{
    Compress, CompressError, Compression, Decompress, DecompressError, FlushCompress,
    FlushDecompress, Status,
};

/// The SPDY/3 header compression dictionary, including the terminal NUL
/// byte (Chrome sends it even though the protocol draft omits it; peers
/// must agree on the exact bytes or the DICTID check fails).
pub(crate) const HEADER_DICTIONARY: &[u8] =
    b"\x00\x00\x00\x07options\x00\x00\x00\x04head\x00\x00\x00\x04post\
      \x00\x00\x00\x03put\x00\x00\x00\x06delete\x00\x00\x00\x05trace\
      \x00\x00\x00\x06accept\x00\x00\x00\x0eaccept-charset\
      \x00\x00\x00\x0faccept-encoding\x00\x00\x00\x0faccept-language\
      \x00\x00\x00\x0daccept-ranges\x00\x00\x00\x03age\x00\x00\x00\x05allow\
      \x00\x00\x00\x0dauthorization\x00\x00\x00\x0dcache-control\
      \x00\x00\x00\x0aconnection\x00\x00\x00\x0ccontent-base\
      \x00\x00\x00\x10content-encoding\x00\x00\x00\x10content-language\
      \x00\x00\x00\x0econtent-length\x00\x00\x00\x10content-location\
      \x00\x00\x00\x0bcontent-md5\x00\x00\x00\x0dcontent-range\
      \x00\x00\x00\x0ccontent-type\x00\x00\x00\x04date\x00\x00\x00\x04etag\
      \x00\x00\x00\x06expect\x00\x00\x00\x07expires\x00\x00\x00\x04from\
      \x00\x00\x00\x04host\x00\x00\x00\x08if-match\
      \x00\x00\x00\x11if-modified-since\x00\x00\x00\x0dif-none-match\
      \x00\x00\x00\x08if-range\x00\x00\x00\x13if-unmodified-since\
      \x00\x00\x00\x0dlast-modified\x00\x00\x00\x08location\
      \x00\x00\x00\x0cmax-forwards\x00\x00\x00\x06pragma\
      \x00\x00\x00\x12proxy-authenticate\x00\x00\x00\x13proxy-authorization\
      \x00\x00\x00\x05range\x00\x00\x00\x07referer\x00\x00\x00\x0bretry-after\
      \x00\x00\x00\x06server\x00\x00\x00\x02te\x00\x00\x00\x07trailer\
      \x00\x00\x00\x11transfer-encoding\x00\x00\x00\x07upgrade\
      \x00\x00\x00\x0auser-agent\x00\x00\x00\x04vary\x00\x00\x00\x03via\
      \x00\x00\x00\x07warning\x00\x00\x00\x10www-authenticate\
      \x00\x00\x00\x06method\x00\x00\x00\x03get\x00\x00\x00\x06status\
      \x00\x00\x00\x06200 OK\x00\x00\x00\x07version\x00\x00\x00\x08HTTP/1.1\
      \x00\x00\x00\x03url\x00\x00\x00\x06public\x00\x00\x00\x0aset-cookie\
      \x00\x00\x00\x0akeep-alive\x00\x00\x00\x06origin\
      100101201202205206300302303304305306307402405406407408409410411412\
      413414415416417502504505\
      203 Non-Authoritative Information204 No Content301 Moved Permanently\
      400 Bad Request401 Unauthorized403 Forbidden404 Not Found\
      500 Internal Server Error501 Not Implemented503 Service Unavailable\
      Jan Feb Mar Apr May Jun Jul Aug Sept Oct Nov Dec 00:00:00 Mon, Tue, \
      Wed, Thu, Fri, Sat, Sun, GMTchunked,text/html,image/png,image/jpg,\
      image/gif,application/xml,application/xhtml+xml,text/plain,\
      text/javascript,publicprivatemax-age=gzip,deflate,sdchcharset=utf-8\
      charset=iso-8859-1,utf-,*,enq=0.\x00";

/// The four bytes a zlib SYNC_FLUSH leaves at the end of its output: the
/// LEN/NLEN words of the empty stored block that realigns the stream.
/// Every conforming header payload ends with them.
pub(crate) const SYNC_FLUSH_TRAILER: [u8; 4] = [0x00, 0x00, 0xff, 0xff];

/// Growth step for the output buffers handed to zlib.
const VEC_CHUNK: usize = 512;

/// The write half's deflate stream. One per connection direction.
pub(crate) struct HeaderCompressor {
    state: Compress,
}

impl HeaderCompressor {
    pub(crate) fn new() -> Result<Self, CompressError> {
        let mut state = Compress::new(Compression::best(), true);
        state.set_dictionary(HEADER_DICTIONARY)?;
        Ok(Self { state })
    }

    /// Deflate `block` into `out`, ending on a SYNC_FLUSH boundary so the
    /// receiver can inflate this block without waiting for more input.
    pub(crate) fn compress_block(
        &mut self,
        block: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), CompressError> {
        let mut pos = 0;
        while pos < block.len() {
            if out.len() == out.capacity() {
                out.reserve(VEC_CHUNK);
            }
            let before = self.state.total_in();
            self.state
                .compress_vec(&block[pos..], out, FlushCompress::None)?;
            pos += (self.state.total_in() - before) as usize;
        }
        // Drain the flush; done once deflate leaves output space unused.
        loop {
            if out.len() == out.capacity() {
                out.reserve(VEC_CHUNK);
            }
            self.state.compress_vec(&[], out, FlushCompress::Sync)?;
            if out.len() < out.capacity() {
                return Ok(());
            }
        }
    }
}

/// The read half's inflate stream, created lazily on the first
/// header-bearing inbound frame.
pub(crate) struct HeaderDecompressor {
    state: Decompress,
}

impl HeaderDecompressor {
    pub(crate) fn new() -> Self {
        Self {
            state: Decompress::new(true),
        }
    }

    /// Inflate one frame's compressed payload into `out` and report how
    /// many input bytes were consumed. The caller is responsible for
    /// checking that the whole payload was consumed; a mismatch means the
    /// frame length and the zlib stream disagree.
    pub(crate) fn decompress_block(
        &mut self,
        input: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<usize, DecompressError> {
        let mut pos = 0;
        loop {
            if out.len() == out.capacity() {
                out.reserve(VEC_CHUNK);
            }
            let before_in = self.state.total_in();
            let before_out = self.state.total_out();
            let result = self
                .state
                .decompress_vec(&input[pos..], out, FlushDecompress::Sync);
            let consumed = (self.state.total_in() - before_in) as usize;
            let produced = (self.state.total_out() - before_out) as usize;
            pos += consumed;
            match result {
                Ok(Status::StreamEnd) => return Ok(pos),
                Ok(_) => {
                    if pos == input.len() && out.len() < out.capacity() {
                        return Ok(pos);
                    }
                    if consumed == 0 && produced == 0 {
                        // Inflate is stalled waiting for bytes beyond this
                        // frame's payload.
                        return Ok(pos);
                    }
                }
                Err(err) => {
                    // A zlib stream with a preset dictionary asks for it
                    // on first inflate; install ours and continue.
                    if err.needs_dictionary().is_some() {
                        self.state.set_dictionary(HEADER_DICTIONARY)?;
                    } else {
                        return Err(err);
                    }
                }
            }
        }
    }
}
