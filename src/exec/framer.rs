// src/exec/framer.rs

//! Newline framing for child process output.
//!
//! [`LineFramer`] is the pure part: it buffers bytes and yields complete
//! lines, independent of how the bytes were chunked on delivery.
//! [`FramedReader`] drives a framer from any `AsyncRead`.

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Default cap for a single line. Longer runs without a newline are split.
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Splits a byte stream into newline-delimited text lines.
///
/// - The trailing partial fragment is buffered until a newline arrives or
///   [`LineFramer::finish`] is called.
/// - Lines that are empty after trimming are suppressed; forwarded lines keep
///   their surrounding whitespace except a trailing `\r`.
/// - Bytes are decoded as (lossy) UTF-8 once the line is complete, so a
///   multi-byte character split across chunks survives intact.
#[derive(Debug)]
pub struct LineFramer {
    partial: Vec<u8>,
    max_line_bytes: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_max_line_bytes(DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            partial: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Feed one chunk, returning every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in chunk {
            if byte == b'\n' {
                let raw = std::mem::take(&mut self.partial);
                if let Some(line) = decode_line(raw) {
                    lines.push(line);
                }
                continue;
            }

            self.partial.push(byte);
            if self.partial.len() >= self.max_line_bytes {
                let cut = char_boundary_cut(&self.partial);
                let rest = self.partial.split_off(cut);
                let raw = std::mem::replace(&mut self.partial, rest);
                if let Some(line) = decode_line(raw) {
                    lines.push(line);
                }
            }
        }

        lines
    }

    /// End of stream: flush the unterminated tail, if it has content.
    pub fn finish(self) -> Option<String> {
        decode_line(self.partial)
    }

    /// Number of bytes waiting for a newline.
    pub fn buffered(&self) -> usize {
        self.partial.len()
    }
}

/// Where to split a full buffer so a trailing, still incomplete UTF-8
/// sequence moves to the next line instead of being cut in half.
fn char_boundary_cut(buf: &[u8]) -> usize {
    let len = buf.len();
    let lead = buf
        .iter()
        .rev()
        .take(4)
        .position(|&b| b & 0b1100_0000 != 0b1000_0000)
        .map(|back| len - 1 - back);

    let Some(lead) = lead else {
        return len;
    };
    let width = match buf[lead] {
        b if b & 0b1110_0000 == 0b1100_0000 => 2,
        b if b & 0b1111_0000 == 0b1110_0000 => 3,
        b if b & 0b1111_1000 == 0b1111_0000 => 4,
        _ => 1,
    };

    if lead + width > len && lead > 0 {
        lead
    } else {
        len
    }
}

fn decode_line(mut raw: Vec<u8>) -> Option<String> {
    if raw.last() == Some(&b'\r') {
        raw.pop();
    }
    let line = match String::from_utf8(raw) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    };
    if line.trim().is_empty() {
        None
    } else {
        Some(line)
    }
}

/// Async line reader over one output pipe.
///
/// `next_line` is cancel safe: framer state only changes after a read has
/// completed, so dropping the future inside `tokio::select!` loses nothing.
pub struct FramedReader<R> {
    reader: R,
    framer: Option<LineFramer>,
    ready: VecDeque<String>,
    buf: Box<[u8]>,
}

impl<R: AsyncRead + Unpin> FramedReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_max_line_bytes(reader, DEFAULT_MAX_LINE_BYTES)
    }

    pub fn with_max_line_bytes(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            framer: Some(LineFramer::with_max_line_bytes(max_line_bytes)),
            ready: VecDeque::new(),
            buf: vec![0u8; READ_CHUNK].into_boxed_slice(),
        }
    }

    /// Next complete line, or `None` once the stream has ended and every
    /// buffered line was handed out.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }

            let Some(framer) = self.framer.as_mut() else {
                return Ok(None);
            };

            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                // EOF: the framer is discarded after flushing its tail.
                if let Some(tail) = self.framer.take().and_then(LineFramer::finish) {
                    self.ready.push_back(tail);
                }
                continue;
            }

            self.ready.extend(framer.push(&self.buf[..n]));
        }
    }

    /// True once end-of-stream was observed and all lines were consumed.
    pub fn is_finished(&self) -> bool {
        self.framer.is_none() && self.ready.is_empty()
    }
}
