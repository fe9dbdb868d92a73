use thiserror::Error;

/// A malformed frame or frame field.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("unknown frame header {0:?}")]
    UnknownHeader(String),

    #[error("empty filename")]
    EmptyFilename,

    #[error("invalid file size {0:?}")]
    InvalidSize(String),

    #[error("field is not valid UTF-8")]
    InvalidUtf8,

    #[error("frame field of {len} bytes exceeds limit of {limit}")]
    FrameTooLarge { len: usize, limit: usize },
}

impl DecodeError {
    /// Whether the stream can no longer be trusted after this error.
    ///
    /// Everything except an oversized length prefix only discards the
    /// current frame and leaves the connection usable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Peer closed the stream before a complete exchange.
    #[error("stream closed by peer")]
    StreamClosed,

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
