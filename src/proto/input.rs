//! inbound decode/stream state machine.
//!
//! mirrors the read half of `xitca_http::h1::proto::dispatcher`'s request loop: keep
//! decoding frames out of the read buffer until it runs dry, handing streamed bodies off
//! to a [`Sink`](crate::pipe::Sink) when the codec reports one.

use core::{cell::Cell, mem};
use std::{error, rc::Rc};

use bytes::BytesMut;
use tracing::trace;

use crate::{
    codec::{Decode, DecodedResult},
    endpoint::Endpoint,
    error::ControllerError,
    pipe::{PushOutcome, Sink, Trigger},
};

use super::ConnectionState;

enum InputState {
    Decoding,
    ReadingStream(Sink),
    /// the pipe is at capacity; `pending` is the unconsumed remainder of the read buffer
    /// that still belongs to the in-flight body, retained for replay once `ready` is set.
    BlockedStream { sink: Sink, trigger: Trigger, pending: BytesMut, ready: Rc<Cell<bool>> },
    Terminated,
}

/// drives a [`Decode`] codec over inbound bytes, handing complete messages to the
/// application and streamed bodies to a [`Sink`].
///
/// a trigger fired while the connection is between `received_data` calls (because the
/// application drained the body's [`Source`](crate::pipe::Source) from outside this
/// call stack) only flips the `ready` flag — see the module doc on [`crate::pipe`] for
/// why this layer never hands the pipe a `'static` closure that reaches back into
/// `InputController` itself. [`InputController::received_data`] and
/// [`InputController::poll_unblock`] both check the flag before doing anything else, so
/// the resumption spec.md §4.3 describes happens at the next available entry point
/// rather than synchronously inside the producer's own call stack.
pub struct InputController {
    state: InputState,
    /// toggled by [`Self::pause_reads`]/[`Self::resume_reads`]; independent of the
    /// backpressure-driven disable a full body pipe applies (tracked in
    /// `InputState::BlockedStream`).
    reads_enabled: bool,
}

impl InputController {
    pub fn new() -> Self {
        Self { state: InputState::Decoding, reads_enabled: true }
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, InputState::Terminated)
    }

    /// stop delivering inbound bytes, regardless of body-pipe backpressure.
    pub fn pause_reads(&mut self, endpoint: &mut impl Endpoint) {
        self.reads_enabled = false;
        endpoint.disable_reads();
    }

    /// undo [`Self::pause_reads`]. a no-op on the endpoint while a body pipe is itself
    /// blocked (see `InputState::BlockedStream`) — reads resume once that clears.
    pub fn resume_reads(&mut self, endpoint: &mut impl Endpoint) {
        self.reads_enabled = true;
        if !matches!(self.state, InputState::BlockedStream { .. }) {
            endpoint.enable_reads();
        }
    }

    /// replay a blocked body's retained remainder if its trigger has fired since the
    /// last call. cheap no-op otherwise; safe to call opportunistically.
    pub fn poll_unblock<D, E>(
        &mut self,
        conn: ConnectionState,
        decode: &mut D,
        endpoint: &mut E,
        process_message: impl FnMut(D::Message),
    ) -> Result<(), ControllerError>
    where
        D: Decode,
        D::Error: error::Error + Send + Sync + 'static,
        E: Endpoint,
    {
        let ready = match &self.state {
            InputState::BlockedStream { ready, .. } => ready.get(),
            _ => false,
        };
        if !ready {
            return Ok(());
        }
        let (sink, mut pending) = match mem::replace(&mut self.state, InputState::Decoding) {
            InputState::BlockedStream { sink, pending, .. } => (sink, pending),
            _ => unreachable!("checked above"),
        };
        trace!(target: "controller", "body pipe drained, resuming reads");
        if self.reads_enabled {
            endpoint.enable_reads();
        }
        self.state = InputState::ReadingStream(sink);
        self.received_data(conn, &mut pending, decode, endpoint, process_message)
    }

    /// feed freshly read bytes through the decoder (and any in-flight body) until `buf`
    /// is drained or the connection must stop accepting more for now.
    pub fn received_data<D, E>(
        &mut self,
        conn: ConnectionState,
        buf: &mut BytesMut,
        decode: &mut D,
        endpoint: &mut E,
        mut process_message: impl FnMut(D::Message),
    ) -> Result<(), ControllerError>
    where
        D: Decode,
        D::Error: error::Error + Send + Sync + 'static,
        E: Endpoint,
    {
        loop {
            match mem::replace(&mut self.state, InputState::Terminated) {
                InputState::Decoding => match decode.decode(buf) {
                    Ok(DecodedResult::None) => {
                        self.state = InputState::Decoding;
                        return Ok(());
                    }
                    Ok(DecodedResult::Static(msg)) => {
                        self.state = InputState::Decoding;
                        process_message(msg);
                        if buf.is_empty() {
                            return Ok(());
                        }
                    }
                    Ok(DecodedResult::Streamed(msg, sink)) => {
                        self.state = InputState::ReadingStream(sink);
                        process_message(msg);
                        if buf.is_empty() {
                            return Ok(());
                        }
                    }
                    Err(e) => return Err(ControllerError::Codec(Box::new(e))),
                },
                InputState::ReadingStream(sink) => match sink.push(buf) {
                    PushOutcome::Accepted => {
                        self.state = InputState::ReadingStream(sink);
                        return Ok(());
                    }
                    PushOutcome::Complete => match conn {
                        ConnectionState::Disconnecting => {
                            endpoint.disable_reads();
                            self.state = InputState::Terminated;
                            return Ok(());
                        }
                        ConnectionState::Connected => {
                            self.state = InputState::Decoding;
                            if buf.is_empty() {
                                return Ok(());
                            }
                        }
                        ConnectionState::NotConnected => {
                            return Err(ControllerError::InvalidState(
                                "received_data while not connected",
                            ));
                        }
                    },
                    PushOutcome::Full(trigger) => {
                        trace!(target: "controller", "body pipe full, disabling reads until it drains");
                        endpoint.disable_reads();
                        let ready = Rc::new(Cell::new(false));
                        let ready_in_trigger = ready.clone();
                        trigger.fill(move || ready_in_trigger.set(true));
                        let pending = mem::take(buf);
                        self.state = InputState::BlockedStream { sink, trigger, pending, ready };
                        return Ok(());
                    }
                    PushOutcome::Terminated => {
                        self.state = InputState::Terminated;
                        return Err(ControllerError::PipeTerminated);
                    }
                },
                InputState::BlockedStream { sink, trigger, .. } => {
                    trigger.cancel();
                    sink.terminate("received_data called while input was blocked");
                    return Err(ControllerError::InvalidState(
                        "received_data while input blocked on a full body pipe",
                    ));
                }
                InputState::Terminated => {
                    return Err(ControllerError::InvalidState("received_data after input was terminated"));
                }
            }
        }
    }

    /// the endpoint reported the peer closed the connection (or it was torn down
    /// locally). any in-flight body is aborted; the controller above this one is
    /// responsible for discarding buffered input.
    pub fn input_on_closed(&mut self) {
        match mem::replace(&mut self.state, InputState::Terminated) {
            InputState::ReadingStream(sink) => sink.terminate("connection closed"),
            InputState::BlockedStream { sink, trigger, .. } => {
                trigger.cancel();
                sink.terminate("connection closed");
            }
            InputState::Decoding | InputState::Terminated => {}
        }
    }

    /// the connection is entering (or continuing) a graceful shutdown. if no message is
    /// currently being decoded or streamed, stop accepting further input right away;
    /// otherwise leave the in-flight body to finish — its own `PushOutcome::Complete`
    /// handling under `Disconnecting` (see `received_data`) reaches `Terminated` later.
    /// idempotent: a no-op once already `Terminated`.
    pub fn input_graceful_disconnect(&mut self, endpoint: &mut impl Endpoint) {
        if matches!(self.state, InputState::Decoding) {
            endpoint.disable_reads();
            self.state = InputState::Terminated;
        }
    }
}

impl Default for InputController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestEndpoint, TestLineCodec};

    #[test]
    fn static_message_with_trailing_bytes_loops_back_to_decoding() {
        let mut input = InputController::new();
        let mut codec = TestLineCodec::default();
        let mut endpoint = TestEndpoint::default();
        let mut buf = BytesMut::from(&b"a\nb\n"[..]);
        let mut seen = Vec::new();
        input
            .received_data(ConnectionState::Connected, &mut buf, &mut codec, &mut endpoint, |m| seen.push(m.head))
            .unwrap();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn streamed_body_blocks_then_replays_remainder_on_poll_unblock() {
        let mut input = InputController::new();
        let mut codec = TestLineCodec::body_len(8);
        let mut endpoint = TestEndpoint::default();
        // header frame "H\n" followed by an 8 byte body into a capacity-4 pipe.
        let mut buf = BytesMut::from(&b"H\nabcdefgh"[..]);
        let mut sinks = Vec::new();
        input
            .received_data(ConnectionState::Connected, &mut buf, &mut codec, &mut endpoint, |m| sinks.push(m))
            .unwrap();
        assert_eq!(sinks.len(), 1);
        assert!(matches!(input.state, InputState::BlockedStream { .. }));
        assert!(endpoint.reads_disabled);

        let source = sinks[0].body.take().unwrap();
        match source.try_pull() {
            crate::pipe::PullOutcome::Data(b) => assert_eq!(&b[..], b"abcd"),
            other => panic!("expected Data, got {other:?}"),
        }

        let mut more = Vec::new();
        input
            .poll_unblock(ConnectionState::Connected, &mut codec, &mut endpoint, |m| more.push(m))
            .unwrap();
        assert!(more.is_empty());
        assert!(matches!(input.state, InputState::Decoding));
    }

    #[test]
    fn graceful_disconnect_terminates_immediately_when_idle_between_messages() {
        let mut input = InputController::new();
        let mut endpoint = TestEndpoint::default();

        input.input_graceful_disconnect(&mut endpoint);
        assert!(input.is_terminated());
        assert!(endpoint.reads_disabled);
    }

    #[test]
    fn graceful_disconnect_leaves_an_in_flight_body_to_finish_on_its_own() {
        let mut input = InputController::new();
        let mut codec = TestLineCodec::body_len(4);
        let mut endpoint = TestEndpoint::default();
        let mut buf = BytesMut::from(&b"H\n"[..]);
        input
            .received_data(ConnectionState::Connected, &mut buf, &mut codec, &mut endpoint, |_| {})
            .unwrap();
        assert!(matches!(input.state, InputState::ReadingStream(_)));

        input.input_graceful_disconnect(&mut endpoint);
        assert!(!input.is_terminated(), "a body still mid-stream must not be cut short here");
        assert!(matches!(input.state, InputState::ReadingStream(_)));

        let mut body = BytesMut::from(&b"abcd"[..]);
        input
            .received_data(ConnectionState::Disconnecting, &mut body, &mut codec, &mut endpoint, |_| {})
            .unwrap();
        assert!(input.is_terminated());
    }

    #[test]
    fn resume_reads_is_a_no_op_while_a_body_pipe_is_still_blocked() {
        let mut input = InputController::new();
        let mut codec = TestLineCodec::body_len(8);
        let mut endpoint = TestEndpoint::default();
        let mut buf = BytesMut::from(&b"H\nabcdefgh"[..]);
        input
            .received_data(ConnectionState::Connected, &mut buf, &mut codec, &mut endpoint, |_| {})
            .unwrap();
        assert!(endpoint.reads_disabled);

        // the application asking to resume reads must not override backpressure the
        // pipe itself is still applying.
        input.resume_reads(&mut endpoint);
        assert!(endpoint.reads_disabled, "a still-blocked body pipe must keep reads disabled");
    }

    #[test]
    fn pause_reads_survives_a_later_trigger_fire() {
        let mut input = InputController::new();
        let mut codec = TestLineCodec::body_len(8);
        let mut endpoint = TestEndpoint::default();
        let mut buf = BytesMut::from(&b"H\nabcdefgh"[..]);
        let mut sinks = Vec::new();
        input
            .received_data(ConnectionState::Connected, &mut buf, &mut codec, &mut endpoint, |m| sinks.push(m))
            .unwrap();

        input.pause_reads(&mut endpoint);
        assert!(endpoint.reads_disabled);

        let source = sinks[0].body.take().unwrap();
        match source.try_pull() {
            crate::pipe::PullOutcome::Data(_) => {}
            other => panic!("expected Data, got {other:?}"),
        }
        input.poll_unblock(ConnectionState::Connected, &mut codec, &mut endpoint, |_| {}).unwrap();
        assert!(endpoint.reads_disabled, "poll_unblock must not re-enable reads while paused");
    }
}
