//! Client module
//!
//! Typed access to a running engine.

pub mod connection;

pub use connection::{ConnectionState, EngineClient};
