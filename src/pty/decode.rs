//! Incremental UTF-8 decoding of PTY output
//!
//! A 4096-byte read can end in the middle of a multi-byte character; the
//! incomplete tail is held back until the next chunk arrives.

/// Streaming UTF-8 decoder
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk
    ///
    /// Invalid sequences become U+FFFD; a trailing incomplete sequence is kept
    /// for the next call.
    pub fn decode(&mut self, input: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(input);

        let mut out = String::with_capacity(buf.len());
        let mut start = 0;

        while start < buf.len() {
            match std::str::from_utf8(&buf[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = buf.len();
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&buf[start..valid_end]) {
                        out.push_str(text);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            // Incomplete sequence at the end of the chunk
                            self.pending = buf[valid_end..].to_vec();
                            return out;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is still pending, lossily
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}
