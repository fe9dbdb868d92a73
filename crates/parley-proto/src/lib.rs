//! Parley wire protocol.
//!
//! - Frame codec for `CHAT:` / `FILE:` frames in framed or legacy wire mode
//! - Handshake text exchange
//! - Streaming file transfer with truncation detection
//! - Collision-free storage of received files
//! - Stdin line forwarding for the consoles

pub mod codec;
pub mod console;
pub mod error;
pub mod storage;
pub mod transfer;

pub use codec::{
    CHAT_READ_LIMIT, CHUNK_SIZE, FileHeader, Frame, FrameReader, FrameWriter, MAX_CHAT_FRAME_LEN,
    MAX_CHAT_LEN, TAG_CHAT, TAG_FILE, TAG_LEN, WireMode, chat_body_limit, chat_frame_limit,
    encode_chat, encode_file_header, encode_text,
};
pub use console::spawn_stdin_lines;
pub use error::{DecodeError, Error, Result};
pub use storage::{FileStore, StoredFile, sanitize_file_name};
pub use transfer::{TransferOutcome, receive_file, send_file, stream_file};
