//! PTY management module
//!
//! Provides PTY terminal emulation for shells and supervised console programs.
//! Uses portable-pty for cross-platform compatibility (ConPTY on Windows).

mod decode;
mod process;

pub use decode::*;
pub use process::*;
