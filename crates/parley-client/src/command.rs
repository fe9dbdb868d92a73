use std::path::PathBuf;

use thiserror::Error;

/// One line of client console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    Chat(String),
    SendFile(PathBuf),
    Exit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Usage: {0}")]
    Usage(&'static str),
}

impl ClientCommand {
    /// Parse one console line. Blank lines yield `Ok(None)`.
    ///
    /// Commands are matched case-insensitively; anything else is chat.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if line.eq_ignore_ascii_case("/exit") {
            return Ok(Some(Self::Exit));
        }
        if let Some(rest) = argument(line, "/file") {
            if rest.is_empty() {
                return Err(CommandError::Usage("/file <filepath>"));
            }
            return Ok(Some(Self::SendFile(PathBuf::from(rest))));
        }
        Ok(Some(Self::Chat(line.to_string())))
    }
}

fn argument<'a>(line: &'a str, command: &str) -> Option<&'a str> {
    let head = line.get(..command.len())?;
    if !head.eq_ignore_ascii_case(command) {
        return None;
    }
    let rest = &line[command.len()..];
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}
