//! Length-prefixed framing.
//!
//! A frame is a fixed 16-byte header holding the body length as decimal ASCII,
//! followed by exactly that many body bytes. The header digits are terminated
//! by `\r\n\r\n` and padded with spaces up to [`HEADER_LEN`]:
//!
//! ```text
//! "42\r\n\r\n          " <42 body bytes>
//! ```
//!
//! Parsing is lenient about padding (spaces, NUL, surrounding whitespace) so
//! older clients that left-pad or omit the terminator are still understood.

/// Width of the length header in bytes.
pub const HEADER_LEN: usize = 16;

/// Terminator written after the header digits.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Largest body length whose digits still fit in the header.
pub const MAX_ENCODABLE_LEN: usize = 999_999_999_999;

/// Errors from encoding or parsing a frame header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame header: {0:?}")]
    InvalidHeader(String),
    #[error("body length {0} does not fit in a frame header")]
    TooLong(usize),
}

/// Builds the 16-byte header announcing a body of `len` bytes.
///
/// # Errors
///
/// Returns `FrameError::TooLong` if `len` exceeds [`MAX_ENCODABLE_LEN`].
pub fn encode_header(len: usize) -> Result<[u8; HEADER_LEN], FrameError> {
    if len > MAX_ENCODABLE_LEN {
        return Err(FrameError::TooLong(len));
    }
    let mut header = [b' '; HEADER_LEN];
    let digits = len.to_string();
    let end = digits.len() + HEADER_TERMINATOR.len();
    header[..digits.len()].copy_from_slice(digits.as_bytes());
    header[digits.len()..end].copy_from_slice(HEADER_TERMINATOR);
    Ok(header)
}

/// Parses a header into the declared body length.
///
/// # Errors
///
/// Returns `FrameError::InvalidHeader` if the header does not contain a
/// single decimal number.
pub fn parse_header(header: &[u8]) -> Result<usize, FrameError> {
    let invalid = || FrameError::InvalidHeader(String::from_utf8_lossy(header).into_owned());

    let trimmed = trim_padding(header);
    let digits = trimmed
        .strip_suffix(HEADER_TERMINATOR)
        .unwrap_or(trimmed)
        .trim_ascii();

    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(invalid)
}

/// Encodes `body` as a complete frame (header followed by body).
///
/// # Errors
///
/// Returns `FrameError::TooLong` if the body is too large to announce.
pub fn encode_frame(body: &[u8]) -> Result<Vec<u8>, FrameError> {
    let header = encode_header(body.len())?;
    let mut frame = Vec::with_capacity(HEADER_LEN + body.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(body);
    Ok(frame)
}

fn trim_padding(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| *b != b' ' && *b != 0)
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn header_layout() {
        let header = encode_header(42).unwrap();
        assert_eq!(&header, b"42\r\n\r\n          ");
    }

    #[test]
    fn parses_bare_and_padded_forms() {
        assert_eq!(parse_header(b"42\r\n\r\n          ").unwrap(), 42);
        assert_eq!(parse_header(b"0000000000000042").unwrap(), 42);
        assert_eq!(parse_header(b"            42\r\n").unwrap(), 42);
        assert_eq!(parse_header(b"7\0\0\0\0\0\0\0\0\0\0\0\0\0\0\0").unwrap(), 7);
    }

    #[test]
    fn rejects_non_numeric_headers() {
        assert!(parse_header(b"").is_err());
        assert!(parse_header(b"                ").is_err());
        assert!(parse_header(b"abc\r\n\r\n        ").is_err());
        assert!(parse_header(b"-5\r\n\r\n         ").is_err());
        assert!(parse_header(b"1 2\r\n\r\n        ").is_err());
    }

    #[test]
    fn too_long_body_cannot_be_encoded() {
        assert_eq!(
            encode_header(MAX_ENCODABLE_LEN + 1),
            Err(FrameError::TooLong(MAX_ENCODABLE_LEN + 1))
        );
        assert!(encode_header(MAX_ENCODABLE_LEN).is_ok());
    }

    #[test]
    fn frame_is_header_then_body() {
        let frame = encode_frame(b"hello").unwrap();
        assert_eq!(frame.len(), HEADER_LEN + 5);
        assert_eq!(parse_header(&frame[..HEADER_LEN]).unwrap(), 5);
        assert_eq!(&frame[HEADER_LEN..], b"hello");
    }

    proptest! {
        #[test]
        fn any_encodable_length_parses_back(len in 0usize..=MAX_ENCODABLE_LEN) {
            let header = encode_header(len).unwrap();
            prop_assert_eq!(parse_header(&header).unwrap(), len);
        }

        #[test]
        fn parse_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..=HEADER_LEN)) {
            let _ = parse_header(&bytes);
        }
    }
}
