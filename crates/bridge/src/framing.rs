//! Newline framing for the process byte stream.
//!
//! Raw chunks arrive with arbitrary boundaries; a frame is only complete at
//! a `\n`. Trailing partial bytes stay buffered until the next chunk, an
//! incomplete message is never emitted.

/// Accumulates raw bytes and yields complete newline-terminated messages.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every message completed by it.
    ///
    /// Empty lines are dropped. A trailing `\r` (CRLF peers) is stripped.
    /// Bytes that are not valid UTF-8 are replaced lossily rather than
    /// poisoning the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            out.push(String::from_utf8_lossy(line).into_owned());
        }
        out
    }

    /// Bytes currently buffered without a terminating newline.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}
