//! Value encoding/decoding for the wire
//!
//! This module defines the values held by the shared store and how they are
//! carried inside protocol frames.

pub mod data;

pub use data::{Data, EncodingError};
