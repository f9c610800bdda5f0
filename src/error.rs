//! error types.

use core::fmt;

use std::{error, io};

/// top level error of the controller.
///
/// all variants are fatal to the owning connection: once observed at a public entry point
/// the caller must tear the connection down (see [`crate::proto::Controller::connection_lost`]).
pub enum ControllerError {
    /// caller drove the state machine from a state where the operation is not legal
    /// (programmer error, e.g. `connected` called while already connected).
    InvalidState(&'static str),
    /// a body pipe was terminated while still in use: the body is half read or half
    /// written and the connection can not be salvaged.
    PipeTerminated,
    /// codec or endpoint level io error.
    Io(io::Error),
    /// error surfaced by [`crate::codec::Decode`]/[`crate::codec::Encode`].
    Codec(Box<dyn error::Error + Send + Sync>),
}

impl fmt::Debug for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            Self::PipeTerminated => f.write_str("body pipe terminated while in use"),
            Self::Io(ref e) => fmt::Debug::fmt(e, f),
            Self::Codec(ref e) => fmt::Debug::fmt(e, f),
        }
    }
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl error::Error for ControllerError {}

/// outcome delivered to a queued message's `post_write` callback. every callback
/// accepted by [`crate::proto::OutputController::push`] fires exactly once, with
/// exactly one of these three, before the item is dropped from the controller's
/// bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputResult {
    /// the message's bytes were fully handed to the endpoint.
    Success,
    /// the endpoint or codec failed while this message was being written; the
    /// connection is being torn down.
    Failure,
    /// the message was dropped before (or instead of) being written, e.g. by
    /// [`crate::proto::OutputController::purge_pending`] or a connection teardown that
    /// found it still queued.
    Cancelled,
}

impl From<io::Error> for ControllerError {
    fn from(e: io::Error) -> Self {
        use io::ErrorKind;
        match e.kind() {
            ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof | ErrorKind::WriteZero => {
                Self::Io(io::ErrorKind::UnexpectedEof.into())
            }
            ErrorKind::WouldBlock | ErrorKind::Interrupted => {
                unreachable!("non-blocking endpoint must not report WouldBlock/Interrupted to the controller")
            }
            _ => Self::Io(e),
        }
    }
}
