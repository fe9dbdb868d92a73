//! Line input for the operator and client consoles.

use std::io::BufRead;

use tokio::sync::mpsc;

/// Forward lines from stdin on a dedicated thread.
///
/// The thread is never joined, so a pending read does not hold up process
/// exit. The channel closes at end of input.
pub fn spawn_stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}
