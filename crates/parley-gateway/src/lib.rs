pub mod connection;
pub mod notice;
pub mod operator;
pub mod registry;

pub use connection::{FALLBACK_NAME, NAME_PROMPT, RelayConfig, RelayState};
pub use registry::{ClientRegistry, ConnId, Member, Outbound, OutboundFile};
