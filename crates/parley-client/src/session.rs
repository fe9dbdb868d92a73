//! Client side of a chat connection.
//!
//! A background task decodes inbound frames into [`ClientEvent`]s while the
//! foreground loop turns console commands into outbound frames.

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use parley_proto::{
    DecodeError, Error, FileStore, Frame, FrameReader, FrameWriter, TransferOutcome,
    chat_body_limit, receive_file, send_file,
};

use crate::command::ClientCommand;

/// Name sent when the user enters nothing.
pub const FALLBACK_NAME: &str = "Guest";

/// Something the receive task observed on the connection.
#[derive(Debug)]
pub enum ClientEvent {
    Chat(String),
    File(TransferOutcome),
    /// A malformed frame was skipped; the connection is still open.
    Discarded(DecodeError),
    /// The connection is gone. Carries the cause when it was not a clean close.
    Disconnected(Option<String>),
}

/// What a command did on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Chat,
    File { name: String, size: u64 },
    /// The write half was shut down.
    Closed,
}

/// The name to send for what the user typed.
pub fn resolve_name(input: &str) -> String {
    let name = input.trim();
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Wait for the server's name prompt.
pub async fn read_prompt<R>(reader: &mut FrameReader<R>) -> parley_proto::Result<String>
where
    R: AsyncRead + Unpin,
{
    reader.read_text().await
}

pub async fn send_name<W>(writer: &mut FrameWriter<W>, input: &str) -> io::Result<String>
where
    W: AsyncWrite + Unpin,
{
    let name = resolve_name(input);
    writer.write_text(&name).await?;
    Ok(name)
}

/// Decode inbound frames until the connection ends or `events` is dropped.
///
/// Files are stored in `store` as they arrive. The final event is always
/// [`ClientEvent::Disconnected`] unless the receiver went away first.
pub async fn receive_loop<R>(
    mut reader: FrameReader<R>,
    store: FileStore,
    events: mpsc::Sender<ClientEvent>,
) where
    R: AsyncRead + Unpin,
{
    let last = loop {
        let event = match reader.next_frame().await {
            Ok(Some(Frame::Chat(text))) => {
                if text.is_empty() {
                    continue;
                }
                ClientEvent::Chat(text)
            }
            Ok(Some(Frame::File(header))) => match receive_file(&mut reader, &header, &store).await {
                Ok(outcome) => ClientEvent::File(outcome),
                Err(e) => break ClientEvent::Disconnected(Some(e.to_string())),
            },
            Ok(None) | Err(Error::StreamClosed) => break ClientEvent::Disconnected(None),
            Err(Error::Decode(e)) if !e.is_fatal() => ClientEvent::Discarded(e),
            Err(e) => break ClientEvent::Disconnected(Some(e.to_string())),
        };
        if events.send(event).await.is_err() {
            debug!("Event receiver dropped, stopping receive loop");
            return;
        }
    };
    let _ = events.send(last).await;
}

/// Put one command on the wire.
///
/// A missing file is reported as [`io::ErrorKind::NotFound`] and a chat
/// body over [`chat_body_limit`] as [`io::ErrorKind::InvalidInput`], in both
/// cases with nothing written.
pub async fn dispatch<W>(writer: &mut FrameWriter<W>, command: ClientCommand) -> io::Result<Sent>
where
    W: AsyncWrite + Unpin,
{
    match command {
        ClientCommand::Chat(text) => {
            let limit = chat_body_limit(writer.mode());
            if text.len() > limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("message of {} bytes exceeds limit of {}", text.len(), limit),
                ));
            }
            writer.write_chat(&text).await?;
            Ok(Sent::Chat)
        }
        ClientCommand::SendFile(path) => {
            let (name, size) = send_file(writer, &path).await?;
            Ok(Sent::File { name, size })
        }
        ClientCommand::Exit => {
            if let Err(e) = writer.shutdown().await {
                warn!("Error closing connection: {}", e);
            }
            Ok(Sent::Closed)
        }
    }
}
