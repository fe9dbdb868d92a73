//! Parley chat client.
//!
//! - Console command parsing (`/file`, `/exit`, chat text)
//! - Name handshake and the background receive loop
//! - Environment configuration

pub mod command;
pub mod config;
pub mod session;

pub use command::{ClientCommand, CommandError};
pub use config::ClientConfig;
pub use session::{ClientEvent, FALLBACK_NAME, Sent, dispatch, receive_loop, resolve_name};
