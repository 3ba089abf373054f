//! Session gateway
//!
//! HTTP and WebSocket front end: routes filesystem, terminal and process
//! requests to their services behind the access checks.

mod auth;
mod error;
mod extract;
mod handler;
mod http;
mod protocol;
mod routes;
mod terminal;

pub use error::*;
pub use http::*;
pub use protocol::*;
pub use routes::*;
