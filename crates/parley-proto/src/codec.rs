//! Frame codec for the chat relay stream.
//!
//! Every frame starts with a 5-byte type tag. What follows depends on the
//! wire mode in use by both ends.
//!
//! ```text
//! framed (default):
//!   CHAT:  [len u32 BE][utf-8 text]
//!   FILE:  [name_len u16 BE][utf-8 name][size u64 BE][payload: size bytes]
//!   text:  [len u32 BE][utf-8 text]                 (handshake only)
//!
//! legacy:
//!   CHAT:  [utf-8 text]                             one read, <= 4096 bytes
//!   FILE:  [utf-8 name][ascii decimal size][payload]
//!          name one read <= 1024, size one read <= 16
//!   text:  [utf-8 text]                             one read, <= 1024 bytes
//! ```
//!
//! Legacy mode has no field boundaries on the wire and relies on each write
//! arriving as its own read. It exists for compatibility with peers that
//! speak the unframed protocol.

use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{DecodeError, Error, Result};
use crate::storage::sanitize_file_name;

/// Width of the type tag that opens every frame.
pub const TAG_LEN: usize = 5;

pub const TAG_CHAT: &[u8; TAG_LEN] = b"CHAT:";
pub const TAG_FILE: &[u8; TAG_LEN] = b"FILE:";

/// Legacy: bound of the single read that carries a chat body.
pub const CHAT_READ_LIMIT: usize = 4096;

/// Legacy: bound of the single read that carries a file name or handshake text.
pub const NAME_READ_LIMIT: usize = 1024;

/// Legacy: bound of the single read that carries the decimal file size.
pub const SIZE_READ_LIMIT: usize = 16;

/// Payload bytes moved per read/write during a file transfer.
pub const CHUNK_SIZE: usize = 4096;

/// Framed: largest chat body a client may send.
pub const MAX_CHAT_LEN: usize = 64 * 1024;

/// Framed: largest accepted file name.
pub const MAX_NAME_LEN: usize = 1024;

/// Framed: largest accepted handshake text.
pub const MAX_TEXT_LEN: usize = 4096;

/// Framed: largest chat frame on the wire. Leaves room for the relay's
/// `{name}: ` prefix on a body of [`MAX_CHAT_LEN`].
pub const MAX_CHAT_FRAME_LEN: usize = MAX_CHAT_LEN + MAX_TEXT_LEN + 2;

/// Largest chat frame text that `mode` can carry.
pub fn chat_frame_limit(mode: WireMode) -> usize {
    match mode {
        WireMode::Framed => MAX_CHAT_FRAME_LEN,
        WireMode::Legacy => CHAT_READ_LIMIT,
    }
}

/// Largest chat body a client may send in `mode`.
pub fn chat_body_limit(mode: WireMode) -> usize {
    match mode {
        WireMode::Framed => MAX_CHAT_LEN,
        WireMode::Legacy => CHAT_READ_LIMIT,
    }
}

/// How frame fields are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WireMode {
    /// Explicit length prefixes on every variable field.
    #[default]
    Framed,
    /// Unprefixed fields recovered by single bounded reads.
    Legacy,
}

impl FromStr for WireMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "framed" => Ok(Self::Framed),
            "legacy" => Ok(Self::Legacy),
            other => Err(format!("unknown wire mode '{}' (expected 'framed' or 'legacy')", other)),
        }
    }
}

impl fmt::Display for WireMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Framed => f.write_str("framed"),
            Self::Legacy => f.write_str("legacy"),
        }
    }
}

/// Metadata announced at the start of a file transfer. The payload follows
/// on the stream and is consumed with [`FrameReader::read_payload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Base name, already stripped of any directory components.
    pub name: String,
    /// Exact number of payload bytes that follow.
    pub size: u64,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Chat text with trailing whitespace removed. May be empty.
    Chat(String),
    File(FileHeader),
}

/// Encode a chat frame.
pub fn encode_chat(text: &str, mode: WireMode) -> Bytes {
    let mut buf = BytesMut::with_capacity(TAG_LEN + 4 + text.len());
    buf.put_slice(TAG_CHAT);
    if mode == WireMode::Framed {
        buf.put_u32(text.len() as u32);
    }
    buf.put_slice(text.as_bytes());
    buf.freeze()
}

/// Encode the header of a file frame. The caller streams `size` payload
/// bytes immediately afterwards.
pub fn encode_file_header(name: &str, size: u64, mode: WireMode) -> Bytes {
    let mut buf = BytesMut::with_capacity(TAG_LEN + 2 + name.len() + 20);
    buf.put_slice(TAG_FILE);
    match mode {
        WireMode::Framed => {
            buf.put_u16(name.len() as u16);
            buf.put_slice(name.as_bytes());
            buf.put_u64(size);
        }
        WireMode::Legacy => {
            buf.put_slice(name.as_bytes());
            buf.put_slice(size.to_string().as_bytes());
        }
    }
    buf.freeze()
}

/// Encode handshake text (name prompt or name reply). Carries no tag.
pub fn encode_text(text: &str, mode: WireMode) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + text.len());
    if mode == WireMode::Framed {
        buf.put_u32(text.len() as u32);
    }
    buf.put_slice(text.as_bytes());
    buf.freeze()
}

fn too_long(what: &str, len: usize, limit: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{} of {} bytes exceeds limit of {}", what, len, limit),
    )
}

/// Reads frames from a byte stream.
pub struct FrameReader<R> {
    reader: R,
    mode: WireMode,
    read_timeout: Option<Duration>,
}

impl<R> FrameReader<R> {
    pub fn new(reader: R, mode: WireMode) -> Self {
        Self {
            reader,
            mode,
            read_timeout: None,
        }
    }

    /// Fail any single read that stalls longer than `timeout` with
    /// [`io::ErrorKind::TimedOut`].
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// One read from the underlying stream, bounded by the read timeout.
    async fn read_some(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.reader.read(buf))
                .await
                .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "read timed out"))?,
            None => self.reader.read(buf).await,
        }
    }

    /// Fill `buf` completely. Returns the number of bytes read, which is
    /// short only when the stream ended.
    async fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_some(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    /// Fill `buf` completely; a stream that ends first is [`Error::StreamClosed`].
    async fn fill_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.fill(buf).await? < buf.len() {
            return Err(Error::StreamClosed);
        }
        Ok(())
    }

    async fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.fill_exact(&mut buf).await?;
        Ok(u16::from_be_bytes(buf))
    }

    async fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.fill_exact(&mut buf).await?;
        Ok(u32::from_be_bytes(buf))
    }

    async fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.fill_exact(&mut buf).await?;
        Ok(u64::from_be_bytes(buf))
    }

    /// A single read of at most `limit` bytes. An empty result means the
    /// stream ended.
    async fn read_bounded(&mut self, limit: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; limit];
        let n = self.read_some(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Length-prefixed field of at most `limit` bytes.
    async fn read_prefixed(&mut self, len: usize, limit: usize) -> Result<Vec<u8>> {
        if len > limit {
            return Err(DecodeError::FrameTooLarge { len, limit }.into());
        }
        let mut buf = vec![0u8; len];
        self.fill_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Read the next type tag. `None` when the stream has closed.
    pub async fn read_tag(&mut self) -> Result<Option<[u8; TAG_LEN]>> {
        let mut tag = [0u8; TAG_LEN];
        let n = self.fill(&mut tag).await?;
        if n < TAG_LEN {
            if n > 0 {
                debug!("stream closed inside a frame tag ({} of {} bytes)", n, TAG_LEN);
            }
            return Ok(None);
        }
        Ok(Some(tag))
    }

    /// Decode the next frame. `Ok(None)` means the peer closed the stream.
    ///
    /// For [`Frame::File`] the payload is still on the stream and must be
    /// consumed before the next call.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(tag) = self.read_tag().await? else {
            return Ok(None);
        };

        if &tag == TAG_CHAT {
            let text = self.read_chat_body().await?;
            Ok(Some(Frame::Chat(text)))
        } else if &tag == TAG_FILE {
            let header = self.read_file_header().await?;
            Ok(Some(Frame::File(header)))
        } else {
            Err(DecodeError::UnknownHeader(String::from_utf8_lossy(&tag).into_owned()).into())
        }
    }

    async fn read_chat_body(&mut self) -> Result<String> {
        let raw = match self.mode {
            WireMode::Framed => {
                let len = self.read_u32().await? as usize;
                self.read_prefixed(len, MAX_CHAT_FRAME_LEN).await?
            }
            WireMode::Legacy => self.read_bounded(CHAT_READ_LIMIT).await?,
        };
        let text = String::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
        Ok(text.trim_end().to_string())
    }

    async fn read_file_header(&mut self) -> Result<FileHeader> {
        match self.mode {
            WireMode::Framed => {
                let name_len = self.read_u16().await? as usize;
                let raw_name = self.read_prefixed(name_len, MAX_NAME_LEN).await?;
                let size = self.read_u64().await?;

                let name = match parse_name(raw_name) {
                    Ok(name) => name,
                    Err(e) => {
                        // The payload is still coming; skip it to stay aligned.
                        self.discard(size).await?;
                        return Err(e.into());
                    }
                };
                Ok(FileHeader { name, size })
            }
            WireMode::Legacy => {
                let raw_name = self.read_bounded(NAME_READ_LIMIT).await?;
                let name = parse_name(raw_name)?;

                let raw_size = self.read_bounded(SIZE_READ_LIMIT).await?;
                let size = parse_size(&raw_size)?;
                Ok(FileHeader { name, size })
            }
        }
    }

    /// Read handshake text (prompt or name reply), untrimmed.
    pub async fn read_text(&mut self) -> Result<String> {
        let raw = match self.mode {
            WireMode::Framed => {
                let len = self.read_u32().await? as usize;
                self.read_prefixed(len, MAX_TEXT_LEN).await?
            }
            WireMode::Legacy => {
                let raw = self.read_bounded(NAME_READ_LIMIT).await?;
                if raw.is_empty() {
                    return Err(Error::StreamClosed);
                }
                raw
            }
        };
        String::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8.into())
    }

    /// Read up to `buf.len()` payload bytes. Returns 0 when the stream ended.
    pub async fn read_payload(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.read_some(buf).await?)
    }

    /// Skip `len` bytes. Returns how many were actually skipped before the
    /// stream ended.
    pub async fn discard(&mut self, len: u64) -> Result<u64> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut remaining = len;
        while remaining > 0 {
            let want = remaining.min(CHUNK_SIZE as u64) as usize;
            let n = self.read_some(&mut buf[..want]).await?;
            if n == 0 {
                break;
            }
            remaining -= n as u64;
        }
        Ok(len - remaining)
    }
}

fn parse_name(raw: Vec<u8>) -> std::result::Result<String, DecodeError> {
    let name = String::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
    sanitize_file_name(&name).ok_or(DecodeError::EmptyFilename)
}

fn parse_size(raw: &[u8]) -> std::result::Result<u64, DecodeError> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DecodeError::InvalidSize(text.to_string()));
    }
    text.parse::<u64>()
        .map_err(|_| DecodeError::InvalidSize(text.to_string()))
}

/// Writes frames to a byte stream.
pub struct FrameWriter<W> {
    writer: W,
    mode: WireMode,
}

impl<W> FrameWriter<W> {
    pub fn new(writer: W, mode: WireMode) -> Self {
        Self { writer, mode }
    }

    pub fn mode(&self) -> WireMode {
        self.mode
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Write a chat frame of at most [`chat_frame_limit`] bytes.
    pub async fn write_chat(&mut self, text: &str) -> io::Result<()> {
        let limit = chat_frame_limit(self.mode);
        if text.len() > limit {
            return Err(too_long("chat message", text.len(), limit));
        }
        self.writer.write_all(&encode_chat(text, self.mode)).await?;
        self.writer.flush().await
    }

    pub async fn write_text(&mut self, text: &str) -> io::Result<()> {
        let limit = match self.mode {
            WireMode::Framed => MAX_TEXT_LEN,
            WireMode::Legacy => NAME_READ_LIMIT,
        };
        if text.len() > limit {
            return Err(too_long("handshake text", text.len(), limit));
        }
        self.writer.write_all(&encode_text(text, self.mode)).await?;
        self.writer.flush().await
    }

    /// Write the header of a file frame. Exactly `size` payload bytes must
    /// follow via [`FrameWriter::write_payload`].
    pub async fn write_file_header(&mut self, name: &str, size: u64) -> io::Result<()> {
        let limit = match self.mode {
            WireMode::Framed => MAX_NAME_LEN,
            WireMode::Legacy => NAME_READ_LIMIT,
        };
        if name.len() > limit {
            return Err(too_long("file name", name.len(), limit));
        }
        match self.mode {
            WireMode::Framed => {
                self.writer.write_all(&encode_file_header(name, size, self.mode)).await?;
            }
            WireMode::Legacy => {
                // Separate writes, one per field the receiver reads.
                self.writer.write_all(TAG_FILE).await?;
                self.writer.flush().await?;
                self.writer.write_all(name.as_bytes()).await?;
                self.writer.flush().await?;
                self.writer.write_all(size.to_string().as_bytes()).await?;
            }
        }
        self.writer.flush().await
    }

    pub async fn write_payload(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.writer.write_all(chunk).await
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.writer.shutdown().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use tokio::io::ReadBuf;

    use super::*;

    /// Serves one scripted chunk per read call, like a socket receiving
    /// separate segments.
    pub(crate) struct ChunkedReader {
        chunks: VecDeque<Vec<u8>>,
    }

    impl ChunkedReader {
        pub(crate) fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
            }
        }
    }

    impl AsyncRead for ChunkedReader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if let Some(mut chunk) = self.chunks.pop_front() {
                let n = chunk.len().min(buf.remaining());
                buf.put_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.chunks.push_front(chunk.split_off(n));
                }
            }
            Poll::Ready(Ok(()))
        }
    }

    fn framed(bytes: Bytes) -> FrameReader<Cursor<Vec<u8>>> {
        FrameReader::new(Cursor::new(bytes.to_vec()), WireMode::Framed)
    }

    #[test]
    fn wire_mode_parses_case_insensitively() {
        assert_eq!("Framed".parse::<WireMode>().unwrap(), WireMode::Framed);
        assert_eq!(" legacy ".parse::<WireMode>().unwrap(), WireMode::Legacy);
        assert!("json".parse::<WireMode>().is_err());
        assert_eq!(WireMode::default(), WireMode::Framed);
    }

    #[test]
    fn legacy_encoding_is_unprefixed() {
        assert_eq!(&encode_chat("hello", WireMode::Legacy)[..], b"CHAT:hello");
        assert_eq!(&encode_file_header("a.txt", 11, WireMode::Legacy)[..], b"FILE:a.txt11");
    }

    #[test]
    fn framed_encoding_layout() {
        let chat = encode_chat("hi", WireMode::Framed);
        assert_eq!(&chat[..], b"CHAT:\x00\x00\x00\x02hi");

        let file = encode_file_header("a.txt", 11, WireMode::Framed);
        assert_eq!(&file[..5], b"FILE:");
        assert_eq!(&file[5..7], &[0, 5]);
        assert_eq!(&file[7..12], b"a.txt");
        assert_eq!(&file[12..], &11u64.to_be_bytes());
    }

    #[tokio::test]
    async fn framed_chat_is_trimmed() {
        let mut reader = framed(encode_chat("hello \r\n", WireMode::Framed));
        let frame = reader.next_frame().await.unwrap();
        assert_eq!(frame, Some(Frame::Chat("hello".into())));
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn framed_chat_split_across_reads() {
        let bytes = encode_chat("split message", WireMode::Framed);
        let (a, b) = bytes.split_at(3);
        let mut reader = FrameReader::new(ChunkedReader::new(&[a, b]), WireMode::Framed);
        let frame = reader.next_frame().await.unwrap();
        assert_eq!(frame, Some(Frame::Chat("split message".into())));
    }

    #[tokio::test]
    async fn oversized_chat_is_fatal() {
        let mut raw = b"CHAT:".to_vec();
        raw.extend_from_slice(&((MAX_CHAT_FRAME_LEN as u32) + 1).to_be_bytes());
        let mut reader = framed(Bytes::from(raw));
        match reader.next_frame().await {
            Err(Error::Decode(e)) => assert!(e.is_fatal()),
            other => panic!("expected fatal decode error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_tag_then_resync() {
        let mut raw = b"PING:".to_vec();
        raw.extend_from_slice(&encode_chat("after", WireMode::Framed));
        let mut reader = framed(Bytes::from(raw));

        match reader.next_frame().await {
            Err(Error::Decode(DecodeError::UnknownHeader(tag))) => assert_eq!(tag, "PING:"),
            other => panic!("expected unknown header, got {:?}", other),
        }
        let frame = reader.next_frame().await.unwrap();
        assert_eq!(frame, Some(Frame::Chat("after".into())));
    }

    #[tokio::test]
    async fn empty_stream_is_end_of_stream() {
        let mut reader = FrameReader::new(&b""[..], WireMode::Legacy);
        assert!(reader.next_frame().await.unwrap().is_none());

        let mut reader = FrameReader::new(&b"CH"[..], WireMode::Legacy);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn framed_file_header_strips_directories() {
        let mut raw = encode_file_header("../../etc/passwd", 3, WireMode::Framed).to_vec();
        raw.extend_from_slice(b"abc");
        let mut reader = framed(Bytes::from(raw));
        let frame = reader.next_frame().await.unwrap();
        assert_eq!(
            frame,
            Some(Frame::File(FileHeader {
                name: "passwd".into(),
                size: 3,
            }))
        );
    }

    #[tokio::test]
    async fn framed_empty_name_skips_payload() {
        let mut raw = encode_file_header("   ", 4, WireMode::Framed).to_vec();
        raw.extend_from_slice(b"junk");
        raw.extend_from_slice(&encode_chat("still aligned", WireMode::Framed));
        let mut reader = framed(Bytes::from(raw));

        assert!(matches!(
            reader.next_frame().await,
            Err(Error::Decode(DecodeError::EmptyFilename))
        ));
        let frame = reader.next_frame().await.unwrap();
        assert_eq!(frame, Some(Frame::Chat("still aligned".into())));
    }

    #[tokio::test]
    async fn legacy_chat_single_read() {
        let mut reader = FrameReader::new(
            ChunkedReader::new(&[b"CHAT:", b"hello\n", b"CHAT:", b"again"]),
            WireMode::Legacy,
        );
        assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::Chat("hello".into())));
        assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::Chat("again".into())));
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn legacy_file_header() {
        let mut reader = FrameReader::new(
            ChunkedReader::new(&[b"FILE:", b"a.txt", b"11", b"hello world"]),
            WireMode::Legacy,
        );
        let frame = reader.next_frame().await.unwrap();
        assert_eq!(
            frame,
            Some(Frame::File(FileHeader {
                name: "a.txt".into(),
                size: 11,
            }))
        );
    }

    #[tokio::test]
    async fn legacy_invalid_size() {
        let mut reader = FrameReader::new(
            ChunkedReader::new(&[b"FILE:", b"a.txt", b"abc", b"CHAT:", b"next"]),
            WireMode::Legacy,
        );
        match reader.next_frame().await {
            Err(Error::Decode(DecodeError::InvalidSize(s))) => assert_eq!(s, "abc"),
            other => panic!("expected invalid size, got {:?}", other),
        }
        assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::Chat("next".into())));
    }

    #[tokio::test]
    async fn legacy_empty_filename() {
        let mut reader = FrameReader::new(
            ChunkedReader::new(&[b"FILE:", b"  \n"]),
            WireMode::Legacy,
        );
        assert!(matches!(
            reader.next_frame().await,
            Err(Error::Decode(DecodeError::EmptyFilename))
        ));
    }

    #[tokio::test]
    async fn handshake_text_in_both_modes() {
        let mut reader = framed(encode_text("Please enter your name: ", WireMode::Framed));
        assert_eq!(reader.read_text().await.unwrap(), "Please enter your name: ");

        let mut reader = FrameReader::new(ChunkedReader::new(&[b"alice"]), WireMode::Legacy);
        assert_eq!(reader.read_text().await.unwrap(), "alice");
        assert!(matches!(reader.read_text().await, Err(Error::StreamClosed)));
    }

    #[tokio::test]
    async fn writer_round_trips_through_duplex() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut writer = FrameWriter::new(client, WireMode::Framed);
        let mut reader = FrameReader::new(server, WireMode::Framed);

        writer.write_text("bob").await.unwrap();
        writer.write_chat("one").await.unwrap();
        writer.write_file_header("x.bin", 2).await.unwrap();
        writer.write_payload(&[7, 9]).await.unwrap();
        writer.shutdown().await.unwrap();

        assert_eq!(reader.read_text().await.unwrap(), "bob");
        assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::Chat("one".into())));
        assert_eq!(
            reader.next_frame().await.unwrap(),
            Some(Frame::File(FileHeader {
                name: "x.bin".into(),
                size: 2,
            }))
        );
        let mut buf = [0u8; 8];
        let n = reader.read_payload(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &[7, 9]);
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn legacy_writer_rejects_oversized_chat() {
        let (client, _server) = tokio::io::duplex(64);
        let mut writer = FrameWriter::new(client, WireMode::Legacy);
        let long = "x".repeat(CHAT_READ_LIMIT + 1);
        let err = writer.write_chat(&long).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn relayed_max_body_fits_a_frame() {
        let (client, server) = tokio::io::duplex(256 * 1024);
        let mut writer = FrameWriter::new(client, WireMode::Framed);
        let mut reader = FrameReader::new(server, WireMode::Framed);

        let name = "n".repeat(MAX_TEXT_LEN);
        let line = format!("{}: {}", name, "x".repeat(MAX_CHAT_LEN));
        assert_eq!(line.len(), MAX_CHAT_FRAME_LEN);
        writer.write_chat(&line).await.unwrap();

        match reader.next_frame().await.unwrap() {
            Some(Frame::Chat(text)) => assert_eq!(text.len(), MAX_CHAT_FRAME_LEN),
            other => panic!("expected chat, got {:?}", other),
        }
        assert!(chat_body_limit(WireMode::Framed) < chat_frame_limit(WireMode::Framed));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_read_times_out() {
        let (_client, server) = tokio::io::duplex(64);
        let mut reader = FrameReader::new(server, WireMode::Framed)
            .with_read_timeout(Some(Duration::from_secs(5)));
        match reader.next_frame().await {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::TimedOut),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
