//! Wire protocol
//!
//! Requests and replies are RESP frames over TCP. Every session starts with
//! a challenge/response handshake keyed by the shared secret; only then are
//! store commands accepted. Values travel as JSON inside bulk strings.

pub mod auth;
pub mod clearif;
pub mod command;
pub mod connection;
pub mod del;
pub mod get;
pub mod resp;
pub mod set;

pub use auth::AuthError;
pub use command::Command;
pub use connection::{Connection, ConnectionError};
pub use resp::{FrameError, Parser, Value};
