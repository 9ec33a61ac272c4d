//! Content-Length framing for the LSP wire format.
//!
//! Each message on the wire is `Content-Length: N\r\n\r\n` followed by
//! exactly `N` bytes of UTF-8 JSON. [`FrameDecoder`] is a streaming state
//! machine: append whatever bytes arrived, then pull out zero or more
//! complete frames. [`encode_frame`] is the inverse.

/// Maximum frame size (4 MiB) to prevent unbounded memory allocation.
const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A header block that cannot be turned into a body length.
///
/// Unlike a truncated body (which simply waits for more bytes), these leave
/// the stream with no way to find the next frame boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("missing Content-Length header")]
    MissingContentLength,
    #[error("invalid Content-Length value `{0}`")]
    InvalidContentLength(String),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES}-byte limit")]
    FrameTooLarge(usize),
}

/// Prepend the `Content-Length` header to a serialized JSON body.
///
/// The length is the UTF-8 byte count, not the character count.
#[must_use]
pub fn encode_frame(body: &str) -> Vec<u8> {
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(body.as_bytes());
    out
}

/// Streaming decoder over an append-only byte buffer.
///
/// A single [`extend`](Self::extend) may complete zero, one, or many frames;
/// keep calling [`next_frame`](Self::next_frame) until it returns `Ok(None)`.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Extract the next complete frame body, if the buffer holds one.
    ///
    /// `Ok(None)` means the header or body is still incomplete and more
    /// bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FramingError> {
        let Some(header_end) = find(&self.buf, HEADER_TERMINATOR) else {
            return Ok(None);
        };

        let content_length = parse_content_length(&self.buf[..header_end])?;
        if content_length > MAX_FRAME_BYTES {
            return Err(FramingError::FrameTooLarge(content_length));
        }

        let body_start = header_end + HEADER_TERMINATOR.len();
        if self.buf.len() < body_start + content_length {
            return Ok(None);
        }

        let body = self.buf[body_start..body_start + content_length].to_vec();
        self.buf.drain(..body_start + content_length);
        Ok(Some(body))
    }
}

/// Parse `Content-Length` out of a complete header block.
///
/// The key is matched case-insensitively and other headers (Content-Type)
/// are ignored.
fn parse_content_length(header: &[u8]) -> Result<usize, FramingError> {
    let text = String::from_utf8_lossy(header);
    for line in text.split("\r\n") {
        if let Some((key, value)) = line.split_once(':')
            && key.trim().eq_ignore_ascii_case("Content-Length")
        {
            let value = value.trim();
            return value
                .parse()
                .map_err(|_| FramingError::InvalidContentLength(value.to_string()));
        }
    }
    Err(FramingError::MissingContentLength)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
