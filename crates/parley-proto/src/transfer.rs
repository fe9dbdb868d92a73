//! File transfer over an established frame stream.
//!
//! Sender: `FILE:` header (name, size), then exactly `size` raw bytes in
//! [`CHUNK_SIZE`] pieces. There is no trailer and no checksum.
//!
//! Receiver: after [`FrameReader::next_frame`] yields a [`FileHeader`], pull
//! `min(CHUNK_SIZE, remaining)` bytes at a time into a freshly created file
//! until `remaining` hits zero or the stream ends.

use std::io;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::codec::{CHUNK_SIZE, FileHeader, FrameReader, FrameWriter};
use crate::error::Result;
use crate::storage::{FileStore, StoredFile, sanitize_file_name};

/// How a receive ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All announced bytes were stored.
    Complete(StoredFile),
    /// The stream ended early. The partial file is left on disk.
    Truncated { stored: StoredFile, expected: u64 },
}

impl TransferOutcome {
    pub fn stored(&self) -> &StoredFile {
        match self {
            Self::Complete(stored) | Self::Truncated { stored, .. } => stored,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Receive the payload announced by `header` into a new file in `store`.
///
/// Disk and stream errors are returned as-is; a stream that simply ends
/// before `header.size` bytes is a [`TransferOutcome::Truncated`].
pub async fn receive_file<R>(
    reader: &mut FrameReader<R>,
    header: &FileHeader,
    store: &FileStore,
) -> Result<TransferOutcome>
where
    R: AsyncRead + Unpin,
{
    let (mut file, name, path) = store.create_unique(&header.name).await?;
    debug!("Receiving '{}' ({} bytes) into {}", header.name, header.size, path.display());

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = header.size;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = reader.read_payload(&mut buf[..want]).await?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        remaining -= n as u64;
    }
    file.flush().await?;

    let stored = StoredFile {
        name,
        path,
        size: header.size - remaining,
    };

    if remaining > 0 {
        warn!(
            "Transfer of '{}' truncated: got {} of {} bytes, partial file kept at {}",
            header.name,
            stored.size,
            header.size,
            stored.path.display()
        );
        return Ok(TransferOutcome::Truncated {
            stored,
            expected: header.size,
        });
    }

    info!("Stored '{}' as {} ({} bytes)", header.name, stored.name, stored.size);
    Ok(TransferOutcome::Complete(stored))
}

/// Send `size` bytes from `source` as a file frame named `name`.
///
/// A source that runs dry early is an [`io::ErrorKind::UnexpectedEof`]
/// error; the peer has been promised more bytes, so the stream is no longer
/// usable.
pub async fn stream_file<W, S>(
    writer: &mut FrameWriter<W>,
    name: &str,
    size: u64,
    source: &mut S,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    S: AsyncRead + Unpin,
{
    writer.write_file_header(name, size).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut remaining = size;
    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = source.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("'{}' ended {} bytes short of its announced size", name, remaining),
            ));
        }
        writer.write_payload(&buf[..n]).await?;
        remaining -= n as u64;
    }
    writer.flush().await
}

/// Send the file at `path`. Returns the name and size that were announced.
pub async fn send_file<W>(writer: &mut FrameWriter<W>, path: &Path) -> io::Result<(String, u64)>
where
    W: AsyncWrite + Unpin,
{
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a file", path.display()),
        ));
    }
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(sanitize_file_name)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no usable file name", path.display()),
            )
        })?;

    let mut file = tokio::fs::File::open(path).await?;
    let size = metadata.len();
    stream_file(writer, &name, size, &mut file).await?;
    Ok((name, size))
}
