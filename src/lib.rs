//! per-connection framing and flow-control controller.
//!
//! sits between a non-blocking transport ([`Endpoint`]) and a protocol ([`codec::Decode`]
//! + [`codec::Encode`]) to turn a stream of raw bytes into a sequence of decoded
//! messages, and a sequence of application messages into a stream of bytes, including
//! the backpressure needed when either direction carries a streamed body
//! ([`pipe::Sink`]/[`pipe::Source`]).
//!
//! the protocol codec itself, and the reactor driving the endpoint, are both external
//! collaborators this crate is generic over, not something it implements.

pub mod codec;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod pipe;
pub mod proto;

#[cfg(test)]
mod test_support;

pub use config::ControllerConfig;
pub use endpoint::Endpoint;
pub use error::{ControllerError, OutputResult};
pub use proto::{ConnectionState, Controller};
