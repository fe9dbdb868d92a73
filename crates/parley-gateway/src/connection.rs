//! TCP chat relay.
//!
//! Accepts clients, runs the name handshake, then relays chat frames and
//! stores uploaded files, announcing each to every other connected client.
//! Each connection gets a reader (this task) and a writer task fed by the
//! registry through a bounded queue.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parley_proto::{
    Error, FileStore, Frame, FrameReader, FrameWriter, TransferOutcome, WireMode,
    chat_body_limit, chat_frame_limit, receive_file, sanitize_file_name, stream_file,
};

use crate::notice::{chat_line, file_notice, join_notice, truncate_line};
use crate::registry::{ClientRegistry, ConnId, Member, Outbound, OutboundFile};

/// Sent to every client right after accept.
pub const NAME_PROMPT: &str = "Please enter your name: ";

/// Name used when a client replies with an empty one.
pub const FALLBACK_NAME: &str = "Guest";

/// Relay tuning.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub mode: WireMode,
    /// Longest a single read may stall before the connection is dropped.
    pub read_timeout: Option<Duration>,
    pub handshake_timeout: Duration,
    /// Capacity of each connection's outbound queue.
    pub queue_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: WireMode::Framed,
            read_timeout: None,
            handshake_timeout: Duration::from_secs(30),
            queue_capacity: 256,
        }
    }
}

/// Shared state for all relay connections.
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    registry: ClientRegistry,
    store: FileStore,
    config: RelayConfig,
    shutdown: CancellationToken,
}

impl RelayState {
    pub fn new(config: RelayConfig, store: FileStore, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                registry: ClientRegistry::new(),
                store,
                config,
                shutdown,
            }),
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.inner.registry
    }

    pub fn store(&self) -> &FileStore {
        &self.inner.store
    }

    /// Cancelling this token closes every connection and stops [`RelayState::run`].
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Accept connections until shutdown.
    pub async fn run(self, listener: TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.inner.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, addr)) => {
                    info!(peer_addr = %addr, "Client connected");
                    let state = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = state.handle_connection(stream, addr).await {
                            if is_io_failure(&e) {
                                warn!(peer_addr = %addr, error = %e, "Connection closed with an I/O error");
                            } else {
                                error!(peer_addr = %addr, error = ?e, "Connection handler failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!("Relay accept error: {}", e);
                }
            }
        }
        info!("Relay stopped accepting connections");
    }

    async fn handle_connection(
        &self,
        stream: tokio::net::TcpStream,
        addr: SocketAddr,
    ) -> anyhow::Result<()> {
        let sock_ref = socket2::SockRef::from(&stream);
        sock_ref.set_nodelay(true)?;

        let config = &self.inner.config;
        let (read_half, write_half) = stream.into_split();
        let mut reader =
            FrameReader::new(read_half, config.mode).with_read_timeout(config.read_timeout);
        let mut writer = FrameWriter::new(write_half, config.mode);

        // --- Handshake ---
        let handshake = tokio::select! {
            _ = self.inner.shutdown.cancelled() => return Ok(()),
            result = self.handshake(&mut reader, &mut writer) => result,
        };
        let name = match handshake {
            Ok(name) => name,
            Err(e) => {
                info!(peer_addr = %addr, "Handshake failed: {:#}", e);
                return Ok(());
            }
        };

        // --- Register ---
        let conn_id: ConnId = Uuid::new_v4();
        let conn_token = self.inner.shutdown.child_token();
        let (tx, rx) = mpsc::channel::<Outbound>(config.queue_capacity);

        self.inner
            .registry
            .register(
                conn_id,
                Member {
                    name: name.clone(),
                    addr,
                    outbound: tx,
                },
            )
            .await;
        let write_handle = tokio::spawn(write_loop(writer, rx, conn_token.clone()));

        self.inner
            .registry
            .broadcast(Outbound::chat(join_notice(&name)), Some(conn_id))
            .await;

        // --- Read loop ---
        let result = self.read_loop(&mut reader, conn_id, &name, &conn_token).await;

        // --- Cleanup ---
        if self.inner.registry.unregister(conn_id).await.is_none() {
            debug!(username = %name, "Already removed from registry");
        }
        write_handle.abort();
        info!(username = %name, peer_addr = %addr, "Client disconnected");

        result
    }

    /// Prompt for a display name and wait for the reply.
    async fn handshake(
        &self,
        reader: &mut FrameReader<OwnedReadHalf>,
        writer: &mut FrameWriter<OwnedWriteHalf>,
    ) -> anyhow::Result<String> {
        writer.write_text(NAME_PROMPT).await?;

        let reply = tokio::time::timeout(self.inner.config.handshake_timeout, reader.read_text())
            .await
            .context("no name reply before handshake timeout")??;

        let name = reply.trim();
        if name.is_empty() {
            return Ok(FALLBACK_NAME.to_string());
        }
        Ok(name.to_string())
    }

    /// Decode frames from one client until it goes away.
    async fn read_loop(
        &self,
        reader: &mut FrameReader<OwnedReadHalf>,
        conn_id: ConnId,
        name: &str,
        token: &CancellationToken,
    ) -> anyhow::Result<()> {
        let mode = self.inner.config.mode;
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return Ok(()),
                next = reader.next_frame() => next,
            };

            match next {
                Ok(Some(Frame::Chat(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    if text.len() > chat_body_limit(mode) {
                        warn!(
                            username = %name,
                            "Discarding chat of {} bytes (limit {})",
                            text.len(),
                            chat_body_limit(mode)
                        );
                        continue;
                    }
                    info!("{}: {}", name, text);
                    let mut line = chat_line(name, &text);
                    // Framed lines always fit. A legacy peer reads at most
                    // one body's worth, so the name prefix can overflow it.
                    if truncate_line(&mut line, chat_frame_limit(mode)) {
                        warn!(username = %name, "Relayed chat truncated to {} bytes", line.len());
                    }
                    self.inner
                        .registry
                        .broadcast(Outbound::chat(line), Some(conn_id))
                        .await;
                }
                Ok(Some(Frame::File(header))) => {
                    let outcome = tokio::select! {
                        _ = token.cancelled() => return Ok(()),
                        outcome = receive_file(reader, &header, &self.inner.store) => outcome,
                    };
                    let outcome = match outcome {
                        Ok(outcome) => outcome,
                        Err(e) => return end_of_stream(name, e),
                    };
                    match outcome {
                        TransferOutcome::Complete(stored) => {
                            info!(username = %name, "Received file '{}'", stored.name);
                            self.inner
                                .registry
                                .broadcast(
                                    Outbound::chat(file_notice(name, &stored.name)),
                                    Some(conn_id),
                                )
                                .await;
                        }
                        // Already logged; the stream has ended and the next
                        // decode reports it.
                        TransferOutcome::Truncated { .. } => {}
                    }
                }
                Ok(None) => return Ok(()),
                Err(Error::Decode(e)) if !e.is_fatal() => {
                    warn!(username = %name, "Discarding frame: {}", e);
                }
                Err(e) => return end_of_stream(name, e),
            }
        }
    }

    /// Send a server chat line to every client.
    pub async fn broadcast_chat(&self, text: &str) -> usize {
        self.inner
            .registry
            .broadcast(Outbound::chat(text), None)
            .await
    }

    /// Stream a local file to every client. Returns how many clients it was
    /// queued for.
    pub async fn send_file_to_all(&self, path: &Path) -> anyhow::Result<usize> {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("File '{}' does not exist", path.display()))?;
        if !metadata.is_file() {
            bail!("'{}' is not a regular file", path.display());
        }
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(sanitize_file_name)
            .with_context(|| format!("'{}' has no usable file name", path.display()))?;

        let file = OutboundFile {
            name,
            size: metadata.len(),
            path: path.to_path_buf(),
        };
        Ok(self
            .inner
            .registry
            .broadcast(Outbound::File(Arc::new(file)), None)
            .await)
    }
}

/// Map an error that ends a read loop. A clean close or a read timeout is a
/// normal disconnect; anything else is reported to the caller.
fn end_of_stream(name: &str, e: Error) -> anyhow::Result<()> {
    match e {
        Error::StreamClosed => Ok(()),
        Error::Io(e) if e.kind() == io::ErrorKind::TimedOut => {
            info!(username = %name, "Read timed out, dropping connection");
            Ok(())
        }
        e => Err(e.into()),
    }
}

/// Whether a handler error came from the socket or disk rather than from
/// the protocol.
fn is_io_failure(e: &anyhow::Error) -> bool {
    e.downcast_ref::<io::Error>().is_some()
        || matches!(e.downcast_ref::<Error>(), Some(Error::Io(_)))
}

/// Drain one connection's outbound queue onto its socket.
///
/// A write failure ends the connection by cancelling `conn_token`.
async fn write_loop(
    mut writer: FrameWriter<OwnedWriteHalf>,
    mut rx: mpsc::Receiver<Outbound>,
    conn_token: CancellationToken,
) {
    while let Some(message) = rx.recv().await {
        let result = match &message {
            Outbound::Chat(text) => writer.write_chat(text).await,
            Outbound::File(file) => match tokio::fs::File::open(&file.path).await {
                Ok(mut source) => {
                    let sent = stream_file(&mut writer, &file.name, file.size, &mut source).await;
                    if sent.is_ok() {
                        debug!("Sent file '{}' ({} bytes)", file.name, file.size);
                    }
                    sent
                }
                Err(e) => {
                    warn!("Cannot open '{}' for sending: {}", file.path.display(), e);
                    continue;
                }
            },
        };

        match result {
            Ok(()) => {}
            // Nothing was written; the connection is still in sync.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                warn!("Skipping outbound message: {}", e);
            }
            Err(e) => {
                warn!("Write failed: {}", e);
                break;
            }
        }
    }
    conn_token.cancel();
}

#[cfg(test)]
mod tests {
    use parley_proto::DecodeError;

    use super::*;

    #[test]
    fn wrapped_io_errors_count_as_io_failures() {
        let reset = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(is_io_failure(&anyhow::Error::from(Error::Io(reset))));

        let raw = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        assert!(is_io_failure(&anyhow::Error::from(raw)));

        let decode = Error::Decode(DecodeError::FrameTooLarge { len: 9, limit: 1 });
        assert!(!is_io_failure(&anyhow::Error::from(decode)));
    }

    #[test]
    fn timeouts_and_closes_end_quietly() {
        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "read timed out");
        assert!(end_of_stream("A", Error::Io(timed_out)).is_ok());
        assert!(end_of_stream("A", Error::StreamClosed).is_ok());

        let disk = io::Error::new(io::ErrorKind::PermissionDenied, "read-only store");
        assert!(end_of_stream("A", Error::Io(disk)).is_err());
    }
}
