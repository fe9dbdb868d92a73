//! Server operator console.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::connection::RelayState;
use crate::notice::server_notice;

pub const HELP: &str = "\
--- Server Operator Interface ---
Commands:
/broadcast <message>   - Send a chat message to all clients
/sendfile <filepath>   - Send a file to all clients
/exit                  - Shut down the server
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Broadcast(String),
    SendFile(PathBuf),
    Exit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Unknown command: {0}")]
    Unknown(String),
}

impl OperatorCommand {
    /// Parse one console line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if line == "/exit" {
            return Ok(Some(Self::Exit));
        }
        if let Some(rest) = argument(line, "/broadcast") {
            if rest.is_empty() {
                return Err(CommandError::Usage("/broadcast <message>"));
            }
            return Ok(Some(Self::Broadcast(rest.to_string())));
        }
        if let Some(rest) = argument(line, "/sendfile") {
            if rest.is_empty() {
                return Err(CommandError::Usage("/sendfile <filepath>"));
            }
            return Ok(Some(Self::SendFile(PathBuf::from(rest))));
        }
        Err(CommandError::Unknown(line.to_string()))
    }
}

/// The trimmed text after `command`, if `line` invokes it.
fn argument<'a>(line: &'a str, command: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(command)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Apply operator commands until `/exit`, end of input, or shutdown.
pub async fn run_console(state: RelayState, mut lines: mpsc::Receiver<String>) {
    loop {
        let line = tokio::select! {
            _ = state.shutdown_token().cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            info!("Operator input closed; console disabled");
            break;
        };

        match OperatorCommand::parse(&line) {
            Ok(Some(command)) => execute(&state, command).await,
            Ok(None) => {}
            Err(e) => error!("{}", e),
        }
    }
}

pub async fn execute(state: &RelayState, command: OperatorCommand) {
    match command {
        OperatorCommand::Broadcast(message) => {
            let delivered = state.broadcast_chat(&server_notice(&message)).await;
            info!(recipients = delivered, "Operator broadcast sent");
        }
        OperatorCommand::SendFile(path) => match state.send_file_to_all(&path).await {
            Ok(0) => warn!("No clients connected; '{}' not sent", path.display()),
            Ok(n) => info!(recipients = n, "Queued '{}' for sending", path.display()),
            Err(e) => error!("{:#}", e),
        },
        OperatorCommand::Exit => {
            info!("Shutting down the server...");
            state.shutdown_token().cancel();
        }
    }
}
