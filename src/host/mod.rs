//! Host-facing side of the plugin.
//!
//! * **`protocol`**: JSON wire format: inbound events, outbound commands.
//! * **`connection`**: the WebSocket session that carries them.

pub mod connection;
mod protocol;

pub use protocol::{parse_event, registration, HostCommand, HostEvent};
