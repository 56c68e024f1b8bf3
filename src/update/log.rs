//! Container log output, read from the multiplexed stream of the logs endpoint
//!
//! Each frame starts with an 8 byte header: the stream type (0 stdin,
//! 1 stdout, 2 stderr), three padding bytes and the big-endian payload size.

use std::fmt;
use std::io::{self, Read};

use crate::error::{DockerError, Result};

const HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    StdIn,
    StdOut,
    StdErr,
}

impl StreamType {
    fn for_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(StreamType::StdIn),
            1 => Ok(StreamType::StdOut),
            2 => Ok(StreamType::StdErr),
            other => Err(DockerError::protocol(format!("Unknown log stream type {}", other))),
        }
    }
}

/// One frame of container output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogUpdateEvent {
    stream_type: StreamType,
    payload: Vec<u8>,
}

impl LogUpdateEvent {
    pub fn new(stream_type: StreamType, payload: Vec<u8>) -> Self {
        Self { stream_type, payload }
    }

    pub fn stream_type(&self) -> StreamType {
        self.stream_type
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// The payload as text, without ANSI color codes or line breaks
impl fmt::Display for LogUpdateEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = String::from_utf8_lossy(&self.payload);
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\u{1b}' if chars.peek() == Some(&'[') => {
                    chars.next();
                    // SGR sequence: digits and ';' terminated by 'm'
                    while let Some(&next) = chars.peek() {
                        chars.next();
                        if next == 'm' || !(next.is_ascii_digit() || next == ';') {
                            break;
                        }
                    }
                }
                '\r' | '\n' => {}
                c => write!(f, "{}", c)?,
            }
        }
        Ok(())
    }
}

/// Iterator over the frames of a multiplexed log stream
pub struct LogFrames<R> {
    reader: R,
    done: bool,
}

impl<R: Read> LogFrames<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, done: false }
    }

    fn read_frame(&mut self) -> Result<Option<LogUpdateEvent>> {
        let mut header = [0u8; HEADER_SIZE];
        if !fill(&mut self.reader, &mut header)? {
            return Ok(None);
        }
        let stream_type = StreamType::for_id(header[0])?;
        let size = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        // grows with the bytes received, not with the size announced in the header
        let mut payload = Vec::new();
        (&mut self.reader).take(u64::from(size)).read_to_end(&mut payload)?;
        if payload.len() as u64 != u64::from(size) {
            return Err(DockerError::protocol("Log stream ended inside a frame"));
        }
        Ok(Some(LogUpdateEvent::new(stream_type, payload)))
    }
}

impl<R: Read> Iterator for LogFrames<R> {
    type Item = Result<LogUpdateEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let frame = self.read_frame().transpose();
        if !matches!(frame, Some(Ok(_))) {
            self.done = true;
        }
        frame
    }
}

/// Fill `buf` completely. `Ok(false)` on a clean end of stream before the
/// first byte, a protocol error when the stream ends part way.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    let mut read = 0;
    while read < buf.len() {
        match reader.read(&mut buf[read..]) {
            Ok(0) if read == 0 => return Ok(false),
            Ok(0) => return Err(DockerError::protocol("Log stream ended inside a frame")),
            Ok(n) => read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Read every frame of `reader`, passing each to `consumer` as it arrives
pub fn read_all<R, F>(reader: R, mut consumer: F) -> Result<()>
where
    R: Read,
    F: FnMut(LogUpdateEvent) -> Result<()>,
{
    for frame in LogFrames::new(reader) {
        consumer(frame?)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn frame(stream: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![stream, 0, 0, 0];
    bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_demultiplexed() {
        let mut bytes = frame(1, b"Building app\n");
        bytes.extend(frame(2, b"warning: slow\n"));
        bytes.extend(frame(1, b""));

        let events: Vec<LogUpdateEvent> = LogFrames::new(bytes.as_slice()).collect::<Result<_>>().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].stream_type(), StreamType::StdOut);
        assert_eq!(events[0].to_string(), "Building app");
        assert_eq!(events[1].stream_type(), StreamType::StdErr);
        assert_eq!(events[1].payload(), b"warning: slow\n");
        assert!(events[2].payload().is_empty());
    }

    #[test]
    fn test_empty_stream_has_no_frames() {
        assert_eq!(LogFrames::new(&b""[..]).count(), 0);
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let mut bytes = frame(1, b"complete line");
        bytes.truncate(bytes.len() - 3);
        let results: Vec<Result<LogUpdateEvent>> = LogFrames::new(bytes.as_slice()).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(DockerError::Protocol(_))));

        let results: Vec<_> = LogFrames::new(&[1u8, 0, 0][..]).collect();
        assert!(matches!(results[0], Err(DockerError::Protocol(_))));
    }

    #[test]
    fn test_oversized_frame_header_with_short_payload() {
        let mut bytes = vec![1u8, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF];
        bytes.push(b'x');
        let mut frames = LogFrames::new(bytes.as_slice());
        assert!(matches!(frames.next(), Some(Err(DockerError::Protocol(_)))));
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_unknown_stream_type_is_an_error() {
        let bytes = frame(7, b"?");
        let mut frames = LogFrames::new(bytes.as_slice());
        assert!(matches!(frames.next(), Some(Err(DockerError::Protocol(_)))));
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_ansi_codes_are_removed() {
        let event = LogUpdateEvent::new(StreamType::StdOut, b"\x1b[0;31mred\x1b[0m text\r\n".to_vec());
        assert_eq!(event.to_string(), "red text");
    }

    #[test]
    fn test_read_all_stops_on_consumer_error() {
        let mut bytes = frame(1, b"one");
        bytes.extend(frame(1, b"two"));
        let mut seen = Vec::new();
        let result = read_all(bytes.as_slice(), |event| {
            seen.push(event.to_string());
            Err(DockerError::Aborted("enough".to_string()))
        });
        assert!(matches!(result, Err(DockerError::Aborted(_))));
        assert_eq!(seen, vec!["one"]);
    }
}
