//! Incremental line reassembly over a chunked byte stream.
//!
//! Upstream SSE bodies arrive in arbitrary chunk boundaries; a single wire
//! line (or even a single UTF-8 character) may be split across chunks. The
//! buffer splits on `\n` at the byte level, which is boundary-safe: `0x0A`
//! never occurs as a UTF-8 continuation byte, so a partially received
//! character can only ever sit in the unterminated tail.

/// Accumulates raw chunks and yields complete, newline-terminated lines.
///
/// The last segment after the final `\n` is retained as the tail for the
/// next `feed` call. The tail is never reported as a line: upstream
/// providers terminate every frame with a newline before closing, so an
/// unterminated final line is dropped at stream end.
#[derive(Debug, Default)]
pub struct LineBuffer {
    tail: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk; returns every line completed by it, in order,
    /// with the trailing `\n` (and any `\r` before it) stripped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.tail.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(rel) = self.tail[start..].iter().position(|&b| b == b'\n') {
            let mut end = start + rel;
            if end > start && self.tail[end - 1] == b'\r' {
                end -= 1;
            }
            lines.push(String::from_utf8_lossy(&self.tail[start..end]).into_owned());
            start += rel + 1;
        }
        if start > 0 {
            self.tail.drain(..start);
        }
        lines
    }

    /// Bytes currently held back as the unterminated tail.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.tail
    }
}
