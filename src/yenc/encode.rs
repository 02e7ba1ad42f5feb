use crate::error::{PostError, Result};

/// Line width written to `=ybegin line=` and used for the encoded body
pub const DEFAULT_LINE_LENGTH: usize = 256;

/// Maximum line length allowed by the yEnc draft
const MAX_LINE_LENGTH: usize = 997;

/// Binary-to-text transform used for article bodies
///
/// Implementations must be pure: the same input always produces the same
/// output and nothing outside `out` is touched.
pub trait ContentEncoder {
    /// Line width advertised in the envelope header
    fn line_length(&self) -> usize;

    /// Append the encoded form of `data` (CRLF-terminated lines) to `out`
    fn encode(&self, data: &[u8], out: &mut Vec<u8>);
}

/// yEnc body encoder
///
/// # Example
///
/// ```
/// use nntp_poster::yenc::{ContentEncoder, YencEncoder};
///
/// let encoder = YencEncoder::default();
/// let mut out = Vec::new();
/// encoder.encode(b"Hello", &mut out);
/// assert!(out.ends_with(b"\r\n"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YencEncoder {
    line_length: usize,
}

impl Default for YencEncoder {
    fn default() -> Self {
        Self {
            line_length: DEFAULT_LINE_LENGTH,
        }
    }
}

impl YencEncoder {
    /// Create an encoder with a custom line length
    ///
    /// # Errors
    ///
    /// Returns [`PostError::Config`] if `line_length` is not within 1-997.
    pub fn new(line_length: usize) -> Result<Self> {
        if line_length == 0 || line_length > MAX_LINE_LENGTH {
            return Err(PostError::Config(format!(
                "Invalid yEnc line length: {} (must be 1-{})",
                line_length, MAX_LINE_LENGTH
            )));
        }
        Ok(Self { line_length })
    }
}

impl ContentEncoder for YencEncoder {
    fn line_length(&self) -> usize {
        self.line_length
    }

    /// yEnc encoding: output = (input + 42) mod 256
    ///
    /// Always escaped: NUL, LF, CR, '='.
    /// Escaped at line start: TAB, SPACE, '.' (keeps lines clear of the NNTP
    /// dot-terminator without dot-stuffing).
    /// Escaped at line end: TAB, SPACE.
    ///
    /// Escape sequence: '=' followed by (encoded + 64)
    fn encode(&self, data: &[u8], out: &mut Vec<u8>) {
        let line_length = self.line_length;
        out.reserve(data.len() + data.len() / 32 + 2 * (data.len() / line_length + 1));

        let mut column = 0usize;
        for (i, &byte) in data.iter().enumerate() {
            let encoded = byte.wrapping_add(42);

            let at_line_start = column == 0;
            let at_line_end = column + 1 >= line_length || i + 1 == data.len();
            let needs_escape = is_critical_byte(encoded)
                || (at_line_start && matches!(encoded, b'\t' | b' ' | b'.'))
                || (at_line_end && matches!(encoded, b'\t' | b' '));

            if needs_escape {
                // Don't split an escape pair across lines
                if column > 0 && column + 2 > line_length {
                    // The byte before the wrap is now the last on its line
                    if let Some(&last) = out.last()
                        && matches!(last, b'\t' | b' ')
                    {
                        out.pop();
                        out.push(b'=');
                        out.push(last.wrapping_add(64));
                    }
                    out.extend_from_slice(b"\r\n");
                    column = 0;
                }
                out.push(b'=');
                out.push(encoded.wrapping_add(64));
                column += 2;
            } else {
                out.push(encoded);
                column += 1;
            }

            if column >= line_length {
                out.extend_from_slice(b"\r\n");
                column = 0;
            }
        }

        if column > 0 {
            out.extend_from_slice(b"\r\n");
        }
    }
}

/// Check if a byte is a critical byte that must always be escaped
fn is_critical_byte(byte: u8) -> bool {
    matches!(
        byte,
        0x00 |  // NUL
        0x0A |  // LF
        0x0D |  // CR
        0x3D // '='
    )
}
