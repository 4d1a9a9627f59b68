//! TCP transport for the evalserve line protocol.
//!
//! Provides:
//! - Wire framing of replies and captured output
//! - `ServerConfig` - Listen address and greeting
//! - `Server` - Accept loop with graceful shutdown

pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;

pub use config::ServerConfig;
pub use protocol::CAPTURED_OUTPUT_TAG;
pub use server::{Server, ServerError, ShutdownHandle};
