//! Header multimap and the name/value block wire form.
//!
//! A header block is serialized as:
//! ```text
//! +----------------------------------+
//! | # of Name/Value pair (int 32)    |
//! +----------------------------------+
//! |     Length of name (int 32)      |
//! +----------------------------------+
//! |          Name (string)           |
//! +----------------------------------+
//! |     Length of value (int 32)     |
//! +----------------------------------+
//! |          Value (string)          |
//! +----------------------------------+
//! |            (repeat)              |
//! +----------------------------------+
//! ```
//! Multiple values for one name are joined by a single NUL byte into one
//! wire value.

/// Separator between multiple values of one header on the wire.
pub const HEADER_VALUE_SEPARATOR: char = '\0';

/// Header names that must not appear in a request block (SYN_STREAM).
const INVALID_REQUEST_HEADERS: &[&str] = &[
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
];

/// Header names that must not appear in a response block (SYN_REPLY).
const INVALID_RESPONSE_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
];

/// An ordered multimap of header names to value lists.
///
/// Names are lowercased on insertion (SPDY header names are defined to be
/// lowercase on the wire). Iteration yields names in order of first
/// insertion; values keep arrival order, duplicates included.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `name`, creating the entry on first use.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => values.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// Replace all values under `name` with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let name = name.to_ascii_lowercase();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, values)) => {
                values.clear();
                values.push(value.into());
            }
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// First value under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .and_then(|(_, values)| values.first().map(String::as_str))
    }

    /// All values under `name`, in arrival order.
    pub fn get_all(&self, name: &str) -> &[String] {
        let name = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, values)| values.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains_name(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.entries.iter().any(|(n, _)| *n == name)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, values)` in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(n, values)| (n.as_str(), values.as_slice()))
    }
}

/// Recoverable condition noticed while parsing a block. The block is
/// always parsed to completion regardless, so the zlib stream stays in
/// sync; the framer decides how to report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockDiagnostic {
    /// A wire name contained uppercase characters (it was normalized).
    UnlowercasedName,
    /// Two entries shared the same post-lowercase name (values merged).
    DuplicateName,
}

/// Structural failure while parsing a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockError {
    /// The block ended before the advertised entries were complete.
    Truncated,
    /// Bytes remained after the advertised entries.
    TrailingBytes,
}

/// Serialize `headers` into `buf` in block wire form.
pub(crate) fn encode_block(headers: &Headers, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&(headers.len() as u32).to_be_bytes());
    for (name, values) in headers.iter() {
        buf.extend_from_slice(&(name.len() as u32).to_be_bytes());
        buf.extend_from_slice(name.as_bytes());
        let joined = values.join("\0");
        buf.extend_from_slice(&(joined.len() as u32).to_be_bytes());
        buf.extend_from_slice(joined.as_bytes());
    }
}

/// Parse one complete block. The slice must contain exactly the block:
/// anything short is [`BlockError::Truncated`], anything left over is
/// [`BlockError::TrailingBytes`]. The first diagnostic encountered is
/// returned alongside the headers.
pub(crate) fn parse_block(block: &[u8]) -> Result<(Headers, Option<BlockDiagnostic>), BlockError> {
    let mut pos = 0usize;
    let count = read_u32(block, &mut pos)?;
    let mut headers = Headers::new();
    let mut diagnostic = None;

    for _ in 0..count {
        let name_len = read_u32(block, &mut pos)? as usize;
        let name_bytes = read_bytes(block, &mut pos, name_len)?;
        let mut name = String::from_utf8_lossy(name_bytes).into_owned();
        if name.bytes().any(|b| b.is_ascii_uppercase()) {
            diagnostic.get_or_insert(BlockDiagnostic::UnlowercasedName);
            name.make_ascii_lowercase();
        }
        if headers.contains_name(&name) {
            diagnostic.get_or_insert(BlockDiagnostic::DuplicateName);
        }

        let value_len = read_u32(block, &mut pos)? as usize;
        let value_bytes = read_bytes(block, &mut pos, value_len)?;
        let value = String::from_utf8_lossy(value_bytes);
        for part in value.split(HEADER_VALUE_SEPARATOR) {
            headers.add(&name, part);
        }
    }

    if pos != block.len() {
        return Err(BlockError::TrailingBytes);
    }
    Ok((headers, diagnostic))
}

/// True if the block contains a name banned in requests.
pub(crate) fn has_invalid_request_header(headers: &Headers) -> bool {
    INVALID_REQUEST_HEADERS
        .iter()
        .any(|name| headers.contains_name(name))
}

/// True if the block contains a name banned in responses.
pub(crate) fn has_invalid_response_header(headers: &Headers) -> bool {
    INVALID_RESPONSE_HEADERS
        .iter()
        .any(|name| headers.contains_name(name))
}

fn read_u32(block: &[u8], pos: &mut usize) -> Result<u32, BlockError> {
    let bytes = read_bytes(block, pos, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_bytes<'a>(block: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], BlockError> {
    let end = pos.checked_add(len).ok_or(BlockError::Truncated)?;
    if end > block.len() {
        return Err(BlockError::Truncated);
    }
    let bytes = &block[*pos..end];
    *pos = end;
    Ok(bytes)
}
