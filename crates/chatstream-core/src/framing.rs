//! Buffers that turn arbitrarily chunked bytes into logical units.
//!
//! Both buffers hold raw bytes rather than decoded text, so a multi-byte
//! character split across two network reads is only decoded once complete.
//! At any time the buffer holds exactly the received bytes that have not yet
//! been resolved into a complete unit.

/// Blank-line delimited event framing (server-sent events).
///
/// An event is complete once a line ending is followed by an empty line.
/// `\n\n`, `\r\n\r\n` and mixed endings are all accepted.
#[derive(Debug, Default)]
pub struct EventBuffer {
    buf: Vec<u8>,
}

impl EventBuffer {
    /// Appends a chunk and returns every event it completed, oldest first.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some((idx, delim_len)) = find_event_delimiter(&self.buf) {
            let event = String::from_utf8_lossy(&self.buf[..idx]).into_owned();
            self.buf.drain(..idx + delim_len);
            events.push(event);
        }
        events
    }

    /// Takes bytes that never saw a closing blank line.
    pub fn take_remainder(&mut self) -> Option<String> {
        take_all(&mut self.buf)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Newline delimited framing, used for NDJSON and SSE-like provider output.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    /// Appends a chunk and returns every line it completed, oldest first.
    ///
    /// Returned lines exclude the `\n` but may still end with `\r`.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let Some(last_newline) = self.buf.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let complete: Vec<u8> = self.buf.drain(..=last_newline).collect();
        complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Takes the trailing fragment that never saw a newline.
    pub fn take_remainder(&mut self) -> Option<String> {
        take_all(&mut self.buf)
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

// Position of the line ending that closes an event, plus the length of that
// ending and the following blank line.
fn find_event_delimiter(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' {
            if buf[i + 1] == b'\n' {
                return Some((i, 2));
            }
            if i + 2 < buf.len() && buf[i + 1] == b'\r' && buf[i + 2] == b'\n' {
                return Some((i, 3));
            }
        }
        i += 1;
    }
    None
}

fn take_all(buf: &mut Vec<u8>) -> Option<String> {
    if buf.is_empty() {
        return None;
    }
    let bytes = std::mem::take(buf);
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
