//! Command handling for the evalserve line protocol.
//!
//! Provides:
//! - `Command` - Parsed command lines
//! - `render` - Text rendering of values for replies
//! - `Dispatcher` - Runs commands against the session store

pub mod command;
pub mod dispatch;
pub mod render;

pub use command::Command;
pub use dispatch::{Action, CommandError, Dispatcher, Frame, Reply};
