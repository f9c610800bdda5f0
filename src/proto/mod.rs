//! the connection lifecycle and its two state machines.

mod controller;
mod input;
mod output;

pub use controller::Controller;
pub use input::InputController;
pub use output::{Enqueued, OutputController};

/// lifecycle state of the connection the owning [`Controller`] is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// no endpoint bound yet (before [`Controller::connected`], or after teardown).
    NotConnected,
    /// normal operation.
    Connected,
    /// a graceful disconnect was requested; the current message/response pair is
    /// allowed to finish, but no new ones will start.
    Disconnecting,
}
