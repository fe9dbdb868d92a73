//! Server-authored chat lines.

pub fn join_notice(name: &str) -> String {
    format!("SERVER: {} has joined the chat.", name)
}

pub fn departure_notice(name: &str) -> String {
    format!("SERVER: {} has left the chat.", name)
}

pub fn file_notice(name: &str, stored_name: &str) -> String {
    format!("SERVER: {} has sent a file '{}'.", name, stored_name)
}

/// Operator broadcast.
pub fn server_notice(message: &str) -> String {
    format!("SERVER: {}", message)
}

/// A member's chat line as relayed to everyone else.
pub fn chat_line(name: &str, text: &str) -> String {
    format!("{}: {}", name, text)
}

/// Cut `line` to at most `limit` bytes on a char boundary. Returns whether
/// anything was removed.
pub fn truncate_line(line: &mut String, limit: usize) -> bool {
    if line.len() <= limit {
        return false;
    }
    let mut end = limit;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    line.truncate(end);
    true
}
