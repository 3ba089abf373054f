//! Shell service
//!
//! Spawns one interactive shell per terminal session and tracks the live
//! sessions.

mod manager;
mod session;

pub use manager::*;
pub use session::*;
