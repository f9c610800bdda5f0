//! the connection-lifecycle composition of [`InputController`] and [`OutputController`].

use std::error;

use bytes::BytesMut;
use tracing::trace;

use crate::{
    codec::{Decode, Encode},
    config::ControllerConfig,
    endpoint::Endpoint,
    error::{ControllerError, OutputResult},
};

use super::{
    input::InputController,
    output::{Enqueued, OutputController},
    ConnectionState,
};

type PostWrite = Box<dyn FnOnce(OutputResult)>;

/// per-connection controller: owns the input/output state machines and the endpoint
/// handle for exactly one connection, from [`Controller::connected`] through
/// [`Controller::connection_closed`]/[`Controller::connection_lost`].
///
/// `D` and `En` are the codec's decode and encode halves (commonly the same type
/// implementing both traits); `M` is the application's outbound message type.
pub struct Controller<D, En, M, Ep> {
    state: ConnectionState,
    input: InputController,
    output: OutputController<M>,
    output_buffer_size: usize,
    decode: D,
    encode: En,
    endpoint: Option<Ep>,
}

impl<D, En, M, Ep> Controller<D, En, M, Ep>
where
    D: Decode,
    D::Error: error::Error + Send + Sync + 'static,
    En: Encode<M>,
    En::Error: error::Error + Send + Sync + 'static,
    Ep: Endpoint,
{
    pub fn new(decode: D, encode: En, config: ControllerConfig) -> Self {
        let output_buffer_size = config.output_buffer_size();
        Self {
            state: ConnectionState::NotConnected,
            input: InputController::new(),
            output: OutputController::new(output_buffer_size),
            output_buffer_size,
            decode,
            encode,
            endpoint: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Connected)
    }

    /// bind the controller to a freshly accepted connection. per spec.md §3 ("the
    /// controller may be reused for a new connection only from `NotConnected`"), this
    /// rebuilds both the input and output state machines from scratch — otherwise a
    /// reused controller would still be sitting at `InputState::Terminated`/
    /// `OutputState::Terminated` from the previous connection's teardown, and every
    /// `received_data`/`send_message` on the new connection would immediately fault.
    pub fn connected(&mut self, endpoint: Ep) -> Result<(), ControllerError> {
        if !matches!(self.state, ConnectionState::NotConnected) {
            return Err(ControllerError::InvalidState("connected called while already connected"));
        }
        self.state = ConnectionState::Connected;
        self.input = InputController::new();
        self.output = OutputController::new(self.output_buffer_size);
        self.endpoint = Some(endpoint);
        trace!(target: "controller", "connection established");
        Ok(())
    }

    /// feed freshly read bytes in; drives the decoder and, transitively, any in-flight
    /// request body.
    pub fn received_data(
        &mut self,
        buf: &mut BytesMut,
        mut process_message: impl FnMut(D::Message),
    ) -> Result<(), ControllerError> {
        let endpoint = self.endpoint.as_mut().ok_or(ControllerError::InvalidState("received_data while not connected"))?;
        self.input.received_data(self.state, buf, &mut self.decode, endpoint, &mut process_message)
    }

    /// resume an inbound body blocked on a full pipe, if its trigger has fired since the
    /// last call.
    pub fn poll_unblock_input(&mut self, process_message: impl FnMut(D::Message)) -> Result<(), ControllerError> {
        let endpoint = self.endpoint.as_mut().ok_or(ControllerError::InvalidState("poll_unblock_input while not connected"))?;
        self.input.poll_unblock(self.state, &mut self.decode, endpoint, process_message)
    }

    /// enqueue an outbound message, then drive as much of the write queue as the
    /// endpoint currently accepts. rejected (with `post_write` left uncalled, per the
    /// push-return-signals-backpressure contract) once the connection is no longer
    /// `Connected` — including while `Disconnecting`, which accepts no new work — or
    /// once the queue is at capacity.
    pub fn send_message(&mut self, message: M, post_write: Option<PostWrite>) -> Result<(), ControllerError> {
        if !matches!(self.state, ConnectionState::Connected) {
            return Err(ControllerError::InvalidState("send_message while not connected"));
        }
        match self.output.push(message, post_write) {
            Enqueued::Queued => {}
            Enqueued::Full(_) => return Err(ControllerError::InvalidState("output queue is at capacity")),
        }
        self.drive_output()
    }

    /// resume writing a response body blocked on an empty (not-yet-produced) source.
    pub fn poll_unblock_output(&mut self) -> Result<(), ControllerError> {
        let endpoint = self.endpoint.as_mut().ok_or(ControllerError::InvalidState("poll_unblock_output while not connected"))?;
        self.output.poll_unblock(&mut self.encode, endpoint)
    }

    /// the endpoint's `readyForData` callback: write capacity has returned. resumes a
    /// partially-written buffer or a stalled streamed body (spec.md §4.4's
    /// `readyForData`) — the entry point scenario S2 requires and that, unlike
    /// [`Self::poll_unblock_output`], is not gated on a body source's own readiness.
    pub fn ready_for_data(&mut self) -> Result<(), ControllerError> {
        let endpoint = self.endpoint.as_mut().ok_or(ControllerError::InvalidState("ready_for_data while not connected"))?;
        self.output.ready_for_data(&mut self.encode, endpoint)
    }

    fn drive_output(&mut self) -> Result<(), ControllerError> {
        let endpoint = self.endpoint.as_mut().ok_or(ControllerError::InvalidState("send_message while not connected"))?;
        self.output.drive(&mut self.encode, endpoint)
    }

    /// stop delivering inbound bytes to the decoder, independent of any backpressure the
    /// input side may itself apply for a full body pipe.
    pub fn pause_reads(&mut self) {
        if let Some(endpoint) = self.endpoint.as_mut() {
            self.input.pause_reads(endpoint);
        }
    }

    /// undo [`Self::pause_reads`]. a no-op while a body pipe is itself applying
    /// backpressure; reads resume once that clears.
    pub fn resume_reads(&mut self) {
        if let Some(endpoint) = self.endpoint.as_mut() {
            self.input.resume_reads(endpoint);
        }
    }

    /// stop draining the outbound queue. an item already mid-write or mid-stream is left
    /// to finish.
    pub fn pause_writes(&mut self) {
        self.output.pause_writes();
    }

    /// undo [`Self::pause_writes`] and drive whatever is now due.
    pub fn resume_writes(&mut self) -> Result<(), ControllerError> {
        let endpoint = self.endpoint.as_mut().ok_or(ControllerError::InvalidState("resume_writes while not connected"))?;
        self.output.resume_writes(&mut self.encode, endpoint)
    }

    /// fail the in-flight outbound item (if any) with `Failure`, abandoning any
    /// in-progress body source.
    pub fn purge_outgoing(&mut self) {
        self.output.purge_outgoing();
    }

    /// cancel every message still queued (not yet being written), invoking each
    /// `post_write` with `Cancelled`.
    pub fn purge_pending(&mut self) {
        self.output.purge_pending();
    }

    /// [`Self::purge_outgoing`] followed by [`Self::purge_pending`].
    pub fn purge_all(&mut self) {
        self.output.purge_all();
    }

    /// the peer closed the connection (or the endpoint otherwise reported eof). tears
    /// down in- and outbound state without attempting any further writes.
    pub fn connection_closed(&mut self) {
        trace!(target: "controller", "connection closed");
        self.input.input_on_closed();
        self.output.output_on_closed();
        self.state = ConnectionState::NotConnected;
        self.endpoint = None;
    }

    /// the connection failed unrecoverably (io error, codec error, pipe termination).
    /// equivalent to [`Self::connection_closed`] plus a disconnect request to the
    /// endpoint, since the peer may not yet know the connection is dead.
    pub fn connection_lost(&mut self) {
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.disconnect();
        }
        self.connection_closed();
    }

    /// request an immediate, non-graceful teardown. only asks the endpoint to close;
    /// state is torn down when the endpoint later reports it via
    /// [`Self::connection_closed`]/[`Self::connection_lost`], same as a remotely
    /// initiated close.
    pub fn disconnect(&mut self) {
        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.disconnect();
        }
    }

    /// begin a graceful shutdown: let the in-flight request/response pair (if any)
    /// finish, then disconnect. call [`Self::check_controller_graceful_disconnect`]
    /// after every subsequent event to find out when that point is reached.
    pub fn graceful_disconnect(&mut self) {
        if matches!(self.state, ConnectionState::Connected) {
            self.state = ConnectionState::Disconnecting;
            trace!(target: "controller", "graceful disconnect requested");
            self.check_controller_graceful_disconnect();
        }
    }

    /// once a graceful disconnect is in progress, nudges each half toward `Terminated`
    /// if it is currently idle, then returns `true` (and issues the actual
    /// [`Endpoint::disconnect`]) exactly once both the decoder and the output queue
    /// (including any streamed body) have reached `Terminated`. an in-flight request
    /// body or response write is left to finish on its own; a later call (e.g. after the
    /// next `received_data`/`drive_output`) observes the transition.
    pub fn check_controller_graceful_disconnect(&mut self) -> bool {
        if !matches!(self.state, ConnectionState::Disconnecting) {
            return false;
        }
        if let Some(endpoint) = self.endpoint.as_mut() {
            self.input.input_graceful_disconnect(endpoint);
        }
        self.output.output_graceful_disconnect();
        let drained = self.input.is_terminated() && self.output.is_terminated();
        if drained {
            if let Some(endpoint) = self.endpoint.as_mut() {
                endpoint.disconnect();
            }
        }
        drained
    }
}
