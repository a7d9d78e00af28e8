//! RESP2 framing: parser and serializer.
//!
//! Frames are the five RESP2 kinds, tagged by their first byte: `+` simple
//! string, `-` error, `:` integer, `$` bulk string (length-prefixed, `-1`
//! for null), `*` array (`-1` for null). Commands arrive as arrays of bulk
//! strings; replies may be any frame.
//!
//! The reader exposes [`RespReader::buffered`] so the request loop can
//! detect pipelining: when more bytes already sit in the buffer after a
//! complete request, the dispatcher turns off per-reply flushing and
//! flushes once at the end of the burst.

use ember_core::{Error, Result};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};

/// Hard cap on one bulk string (512 MB, the conventional proto limit).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;
/// Hard cap on array arity.
const MAX_ARRAY_LEN: i64 = 1024 * 1024;
/// Cap on a single simple/error line.
const MAX_LINE_LEN: usize = 64 * 1024;

/// One RESP2 frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    NullBulk,
    Array(Vec<Frame>),
    NullArray,
}

impl Frame {
    /// Bulk frame from anything byte-like.
    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Frame {
        Frame::Bulk(bytes.into())
    }

    /// The conventional `+OK`.
    pub fn ok() -> Frame {
        Frame::Simple("OK".to_string())
    }

    /// Array of bulk frames.
    pub fn bulk_array<I, T>(items: I) -> Frame
    where
        I: IntoIterator<Item = T>,
        T: Into<Vec<u8>>,
    {
        Frame::Array(items.into_iter().map(Frame::bulk).collect())
    }

    /// Null-or-bulk from an optional value.
    pub fn maybe_bulk(value: Option<Vec<u8>>) -> Frame {
        match value {
            Some(v) => Frame::Bulk(v),
            None => Frame::NullBulk,
        }
    }
}

// ----------------------------------------------------------------------
// Reader
// ----------------------------------------------------------------------

/// Buffered RESP parser over a byte stream.
pub struct RespReader<R: Read> {
    inner: BufReader<R>,
}

impl<R: Read> RespReader<R> {
    pub fn new(stream: R) -> RespReader<R> {
        RespReader {
            inner: BufReader::new(stream),
        }
    }

    /// Whether unconsumed bytes are already buffered (pipelining probe).
    /// Never touches the underlying stream.
    pub fn buffered(&self) -> bool {
        !self.inner.buffer().is_empty()
    }

    /// The wrapped stream.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }

    /// Parse one frame. `Ok(None)` means the stream closed cleanly at a
    /// frame boundary; a close mid-frame is a protocol error.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        let mut tag = [0u8; 1];
        match self.inner.read(&mut tag) {
            Ok(0) => return Ok(None),
            Ok(_) => {}
            Err(e) => return Err(Error::Io(e)),
        }
        self.parse_after_tag(tag[0]).map(Some)
    }

    fn parse_frame(&mut self) -> Result<Frame> {
        let mut tag = [0u8; 1];
        self.inner
            .read_exact(&mut tag)
            .map_err(|_| Error::Protocol("unexpected end of stream".into()))?;
        self.parse_after_tag(tag[0])
    }

    fn parse_after_tag(&mut self, tag: u8) -> Result<Frame> {
        match tag {
            b'+' => Ok(Frame::Simple(self.read_line_utf8()?)),
            b'-' => Ok(Frame::Error(self.read_line_utf8()?)),
            b':' => {
                let line = self.read_line_utf8()?;
                let n = line
                    .parse::<i64>()
                    .map_err(|_| Error::Protocol(format!("invalid integer '{}'", line)))?;
                Ok(Frame::Integer(n))
            }
            b'$' => {
                let len = self.read_len()?;
                if len == -1 {
                    return Ok(Frame::NullBulk);
                }
                if len < 0 || len > MAX_BULK_LEN {
                    return Err(Error::Protocol(format!("invalid bulk length {}", len)));
                }
                let mut buf = vec![0u8; len as usize];
                self.inner
                    .read_exact(&mut buf)
                    .map_err(|_| Error::Protocol("short bulk payload".into()))?;
                self.expect_crlf()?;
                Ok(Frame::Bulk(buf))
            }
            b'*' => {
                let len = self.read_len()?;
                if len == -1 {
                    return Ok(Frame::NullArray);
                }
                if len < 0 || len > MAX_ARRAY_LEN {
                    return Err(Error::Protocol(format!("invalid multibulk length {}", len)));
                }
                let mut items = Vec::with_capacity(len.min(1024) as usize);
                for _ in 0..len {
                    items.push(self.parse_frame()?);
                }
                Ok(Frame::Array(items))
            }
            other => Err(Error::Protocol(format!(
                "unexpected byte '{}'",
                other as char
            ))),
        }
    }

    fn read_len(&mut self) -> Result<i64> {
        let line = self.read_line_utf8()?;
        line.parse::<i64>()
            .map_err(|_| Error::Protocol(format!("invalid length '{}'", line)))
    }

    /// One CRLF-terminated line, rejected when overlong or bare-LF.
    fn read_line_utf8(&mut self) -> Result<String> {
        let mut line = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            self.inner
                .read_exact(&mut byte)
                .map_err(|_| Error::Protocol("unexpected end of line".into()))?;
            match byte[0] {
                b'\r' => {
                    let mut lf = [0u8; 1];
                    self.inner
                        .read_exact(&mut lf)
                        .map_err(|_| Error::Protocol("bare CR".into()))?;
                    if lf[0] != b'\n' {
                        return Err(Error::Protocol("CR without LF".into()));
                    }
                    return String::from_utf8(line)
                        .map_err(|_| Error::Protocol("non-utf8 line".into()));
                }
                b'\n' => return Err(Error::Protocol("bare LF".into())),
                b => {
                    if line.len() >= MAX_LINE_LEN {
                        return Err(Error::Protocol("line too long".into()));
                    }
                    line.push(b);
                }
            }
        }
    }

    fn expect_crlf(&mut self) -> Result<()> {
        let mut crlf = [0u8; 2];
        self.inner
            .read_exact(&mut crlf)
            .map_err(|_| Error::Protocol("missing CRLF".into()))?;
        if &crlf != b"\r\n" {
            return Err(Error::Protocol("malformed CRLF".into()));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Writer
// ----------------------------------------------------------------------

/// Buffered RESP serializer with toggleable per-frame flushing.
pub struct RespWriter<W: Write> {
    inner: BufWriter<W>,
    auto_flush: bool,
}

impl<W: Write> RespWriter<W> {
    pub fn new(stream: W) -> RespWriter<W> {
        RespWriter {
            inner: BufWriter::new(stream),
            auto_flush: true,
        }
    }

    /// In auto-flush mode every frame is flushed as written; when off the
    /// caller flushes once per batch (pipelining).
    pub fn set_auto_flush(&mut self, on: bool) {
        self.auto_flush = on;
    }

    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.encode(frame)?;
        if self.auto_flush {
            self.inner.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Write pre-serialized frame bytes (pub/sub fanout).
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }

    fn encode(&mut self, frame: &Frame) -> Result<()> {
        match frame {
            Frame::Simple(s) => {
                self.inner.write_all(b"+")?;
                self.inner.write_all(s.as_bytes())?;
                self.inner.write_all(b"\r\n")?;
            }
            Frame::Error(s) => {
                self.inner.write_all(b"-")?;
                self.inner.write_all(s.as_bytes())?;
                self.inner.write_all(b"\r\n")?;
            }
            Frame::Integer(n) => {
                self.inner.write_all(b":")?;
                self.inner.write_all(n.to_string().as_bytes())?;
                self.inner.write_all(b"\r\n")?;
            }
            Frame::Bulk(bytes) => {
                self.inner.write_all(b"$")?;
                self.inner.write_all(bytes.len().to_string().as_bytes())?;
                self.inner.write_all(b"\r\n")?;
                self.inner.write_all(bytes)?;
                self.inner.write_all(b"\r\n")?;
            }
            Frame::NullBulk => self.inner.write_all(b"$-1\r\n")?,
            Frame::Array(items) => {
                self.inner.write_all(b"*")?;
                self.inner.write_all(items.len().to_string().as_bytes())?;
                self.inner.write_all(b"\r\n")?;
                for item in items {
                    self.encode(item)?;
                }
            }
            Frame::NullArray => self.inner.write_all(b"*-1\r\n")?,
        }
        Ok(())
    }
}

/// Serialize a frame to a standalone buffer (pub/sub fanout, EXEC reply
/// capture).
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(frame, &mut out);
    out
}

fn encode_into(frame: &Frame, out: &mut Vec<u8>) {
    match frame {
        Frame::Simple(s) => {
            out.push(b'+');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Frame::Error(s) => {
            out.push(b'-');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Frame::Integer(n) => {
            out.push(b':');
            out.extend_from_slice(n.to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        Frame::Bulk(bytes) => {
            out.push(b'$');
            out.extend_from_slice(bytes.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(bytes);
            out.extend_from_slice(b"\r\n");
        }
        Frame::NullBulk => out.extend_from_slice(b"$-1\r\n"),
        Frame::Array(items) => {
            out.push(b'*');
            out.extend_from_slice(items.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
            for item in items {
                encode_into(item, out);
            }
        }
        Frame::NullArray => out.extend_from_slice(b"*-1\r\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(bytes: &[u8]) -> Frame {
        RespReader::new(Cursor::new(bytes.to_vec()))
            .read_frame()
            .unwrap()
            .unwrap()
    }

    fn parse_err(bytes: &[u8]) -> Error {
        match RespReader::new(Cursor::new(bytes.to_vec())).read_frame() {
            Err(e) => e,
            Ok(f) => panic!("expected protocol error, got {:?}", f),
        }
    }

    #[test]
    fn test_parse_simple_kinds() {
        assert_eq!(parse(b"+OK\r\n"), Frame::Simple("OK".into()));
        assert_eq!(parse(b"-ERR boom\r\n"), Frame::Error("ERR boom".into()));
        assert_eq!(parse(b":1234\r\n"), Frame::Integer(1234));
        assert_eq!(parse(b":-7\r\n"), Frame::Integer(-7));
    }

    #[test]
    fn test_parse_bulk() {
        assert_eq!(parse(b"$5\r\nhello\r\n"), Frame::Bulk(b"hello".to_vec()));
        assert_eq!(parse(b"$0\r\n\r\n"), Frame::Bulk(Vec::new()));
        assert_eq!(parse(b"$-1\r\n"), Frame::NullBulk);
        // Binary payloads pass through untouched.
        assert_eq!(
            parse(b"$3\r\n\x00\xff\x01\r\n"),
            Frame::Bulk(vec![0x00, 0xff, 0x01])
        );
    }

    #[test]
    fn test_parse_array() {
        assert_eq!(
            parse(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n"),
            Frame::Array(vec![Frame::Bulk(b"GET".to_vec()), Frame::Bulk(b"k".to_vec())])
        );
        assert_eq!(parse(b"*0\r\n"), Frame::Array(Vec::new()));
        assert_eq!(parse(b"*-1\r\n"), Frame::NullArray);
    }

    #[test]
    fn test_parse_nested_array() {
        assert_eq!(
            parse(b"*2\r\n*1\r\n:1\r\n+x\r\n"),
            Frame::Array(vec![
                Frame::Array(vec![Frame::Integer(1)]),
                Frame::Simple("x".into())
            ])
        );
    }

    #[test]
    fn test_malformed_frames_are_protocol_errors() {
        assert!(matches!(parse_err(b"?what\r\n"), Error::Protocol(_)));
        assert!(matches!(parse_err(b":12x\r\n"), Error::Protocol(_)));
        assert!(matches!(parse_err(b"$5\r\nhi\r\n"), Error::Protocol(_)));
        assert!(matches!(parse_err(b"$-2\r\n"), Error::Protocol(_)));
        assert!(matches!(parse_err(b"+no-crlf\n"), Error::Protocol(_)));
        assert!(matches!(parse_err(b"*1\r\n"), Error::Protocol(_)));
    }

    #[test]
    fn test_eof_at_boundary_is_clean_close() {
        let mut reader = RespReader::new(Cursor::new(b"".to_vec()));
        assert!(reader.read_frame().unwrap().is_none());

        let mut reader = RespReader::new(Cursor::new(b"+OK\r\n".to_vec()));
        assert!(reader.read_frame().unwrap().is_some());
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_buffered_detects_pipelined_bytes() {
        let mut reader = RespReader::new(Cursor::new(b"+A\r\n+B\r\n".to_vec()));
        assert_eq!(reader.read_frame().unwrap(), Some(Frame::Simple("A".into())));
        assert!(reader.buffered());
        assert_eq!(reader.read_frame().unwrap(), Some(Frame::Simple("B".into())));
        assert!(!reader.buffered());
    }

    #[test]
    fn test_writer_round_trip() {
        let frames = vec![
            Frame::Simple("PONG".into()),
            Frame::Error("ERR nope".into()),
            Frame::Integer(-1),
            Frame::Bulk(b"payload".to_vec()),
            Frame::NullBulk,
            Frame::Array(vec![Frame::ok(), Frame::Integer(2)]),
            Frame::NullArray,
        ];
        let mut sink = Vec::new();
        {
            let mut writer = RespWriter::new(&mut sink);
            for frame in &frames {
                writer.write_frame(frame).unwrap();
            }
            writer.flush().unwrap();
        }
        let mut reader = RespReader::new(Cursor::new(sink));
        for frame in &frames {
            assert_eq!(reader.read_frame().unwrap().as_ref(), Some(frame));
        }
    }

    #[test]
    fn test_encode_frame_matches_writer() {
        let frame = Frame::Array(vec![
            Frame::bulk("message"),
            Frame::bulk("chan"),
            Frame::bulk("payload"),
        ]);
        let standalone = encode_frame(&frame);
        let mut sink = Vec::new();
        {
            let mut writer = RespWriter::new(&mut sink);
            writer.write_frame(&frame).unwrap();
            writer.flush().unwrap();
        }
        assert_eq!(standalone, sink);
    }

    #[test]
    fn test_scripted_ping_forms() {
        assert_eq!(encode_frame(&Frame::Simple("PONG".into())), b"+PONG\r\n");
        assert_eq!(
            encode_frame(&Frame::Bulk(b"hello".to_vec())),
            b"$5\r\nhello\r\n"
        );
    }
}
