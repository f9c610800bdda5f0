//! outbound encode/write state machine.
//!
//! mirrors `xitca_http::util::buffered_io::BufferedIo`'s write half: stage encoded bytes
//! in a buffer and hand them to the endpoint until either the buffer empties or the
//! endpoint stops accepting writes, except here the "buffer" for a streamed body is
//! refilled one [`Source`] chunk at a time instead of all at once.

use core::cell::Cell;
use std::{collections::VecDeque, error, rc::Rc};

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::{
    codec::{Encode, Encoded},
    endpoint::{Endpoint, WriteOutcome},
    error::{ControllerError, OutputResult},
    pipe::{PullOutcome, Source},
};

type PostWrite = Box<dyn FnOnce(OutputResult)>;

/// invoke `cb` with `result` if present. exists only so call sites read as one line;
/// the `Option::take` at each call site is what actually enforces at-most-once.
fn fire(cb: Option<PostWrite>, result: OutputResult) {
    if let Some(cb) = cb {
        cb(result);
    }
}

struct QueuedItem<M> {
    message: M,
    post_write: Option<PostWrite>,
}

enum OutputState {
    Idle,
    Writing,
    Streaming { source: Source, ready: Rc<Cell<bool>> },
    Terminated,
}

/// outcome of [`OutputController::push`].
pub enum Enqueued<M> {
    Queued,
    /// the bounded queue is at capacity; `M` is handed back unconsumed.
    Full(M),
}

/// drives an [`Encode`] codec and an [`Endpoint`] over a bounded FIFO of outbound
/// messages, including ones whose body is a [`Source`] rather than a ready-made buffer.
pub struct OutputController<M> {
    state: OutputState,
    waiting_to_send: VecDeque<QueuedItem<M>>,
    capacity: usize,
    write_buf: BytesMut,
    current_post_write: Option<PostWrite>,
    /// toggled by [`Self::pause_writes`]/[`Self::resume_writes`]; gates only the
    /// transition out of `Idle`, never an already in-flight write or stream.
    writes_enabled: bool,
}

impl<M> OutputController<M> {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: OutputState::Idle,
            waiting_to_send: VecDeque::new(),
            capacity,
            write_buf: BytesMut::new(),
            current_post_write: None,
            writes_enabled: true,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, OutputState::Idle) && self.waiting_to_send.is_empty()
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self.state, OutputState::Terminated)
    }

    /// enqueue a message for encoding and writing, in order. `post_write` (if given)
    /// fires once the message's bytes have all been handed to the endpoint.
    pub fn push(&mut self, message: M, post_write: Option<PostWrite>) -> Enqueued<M> {
        if self.waiting_to_send.len() >= self.capacity {
            trace!(target: "controller", capacity = self.capacity, "output queue full, rejecting message");
            return Enqueued::Full(message);
        }
        self.waiting_to_send.push_back(QueuedItem { message, post_write });
        Enqueued::Queued
    }

    /// pause draining the queue: an item already being written or streamed finishes
    /// normally, but [`Self::drive`] will not start a new one until [`Self::resume_writes`].
    pub fn pause_writes(&mut self) {
        self.writes_enabled = false;
    }

    /// undo [`Self::pause_writes`] and drive whatever is now due.
    pub fn resume_writes<En, Ep>(&mut self, encode: &mut En, endpoint: &mut Ep) -> Result<(), ControllerError>
    where
        En: Encode<M>,
        En::Error: error::Error + Send + Sync + 'static,
        Ep: Endpoint,
    {
        self.writes_enabled = true;
        self.drive(encode, endpoint)
    }

    /// drop every message that has not started encoding yet, invoking each one's
    /// `post_write` with [`OutputResult::Cancelled`]. messages already mid-write are left
    /// to finish or are cleared separately by [`Self::purge_outgoing`].
    pub fn purge_pending(&mut self) -> usize {
        let n = self.waiting_to_send.len();
        for item in self.waiting_to_send.drain(..) {
            fire(item.post_write, OutputResult::Cancelled);
        }
        n
    }

    /// fail the item currently being written or streamed (if any) with
    /// [`OutputResult::Failure`], abandoning any in-progress body source, and return the
    /// controller to `Idle` so a subsequent [`Self::drive`] can pick up the queue.
    pub fn purge_outgoing(&mut self) {
        match core::mem::replace(&mut self.state, OutputState::Idle) {
            OutputState::Streaming { source, .. } => {
                source.terminate("output purged");
                fire(self.current_post_write.take(), OutputResult::Failure);
            }
            OutputState::Writing => {
                fire(self.current_post_write.take(), OutputResult::Failure);
            }
            state @ (OutputState::Idle | OutputState::Terminated) => self.state = state,
        }
        self.write_buf.clear();
    }

    /// [`Self::purge_outgoing`] followed by [`Self::purge_pending`]: every message the
    /// controller currently knows about (in-flight or queued) is resolved.
    pub fn purge_all(&mut self) {
        self.purge_outgoing();
        self.purge_pending();
    }

    /// encode and write as much of the queue as the endpoint currently accepts. returns
    /// once the queue (and any in-flight body) is drained, or the endpoint stops
    /// accepting writes, or a body source has no data ready.
    pub fn drive<En, Ep>(&mut self, encode: &mut En, endpoint: &mut Ep) -> Result<(), ControllerError>
    where
        En: Encode<M>,
        En::Error: error::Error + Send + Sync + 'static,
        Ep: Endpoint,
    {
        loop {
            match &mut self.state {
                OutputState::Idle => {
                    if !self.writes_enabled {
                        return Ok(());
                    }
                    let Some(item) = self.waiting_to_send.pop_front() else {
                        return Ok(());
                    };
                    match encode.encode(item.message) {
                        Ok(Encoded::ByteBuffer(bytes)) => {
                            self.write_buf.extend_from_slice(&bytes);
                            self.current_post_write = item.post_write;
                            self.state = OutputState::Writing;
                        }
                        Ok(Encoded::DataStream(source)) => {
                            self.current_post_write = item.post_write;
                            self.state = OutputState::Streaming { source, ready: Rc::new(Cell::new(false)) };
                        }
                        Err(e) => {
                            fire(item.post_write, OutputResult::Failure);
                            self.state = OutputState::Terminated;
                            return Err(ControllerError::Codec(Box::new(e)));
                        }
                    }
                }
                OutputState::Writing => {
                    if self.write_buf.is_empty() {
                        fire(self.current_post_write.take(), OutputResult::Success);
                        self.state = OutputState::Idle;
                        continue;
                    }
                    match write_out(&mut self.write_buf, endpoint) {
                        Ok(true) => continue,
                        Ok(false) => return Ok(()),
                        Err(e) => {
                            fire(self.current_post_write.take(), OutputResult::Failure);
                            self.state = OutputState::Terminated;
                            return Err(e);
                        }
                    }
                }
                OutputState::Streaming { source, ready } => {
                    if self.write_buf.is_empty() {
                        match source.try_pull() {
                            PullOutcome::Data(chunk) => self.write_buf.extend_from_slice(&chunk),
                            PullOutcome::Closed => {
                                fire(self.current_post_write.take(), OutputResult::Success);
                                self.state = OutputState::Idle;
                                continue;
                            }
                            PullOutcome::Terminated => {
                                fire(self.current_post_write.take(), OutputResult::Failure);
                                self.state = OutputState::Terminated;
                                return Err(ControllerError::PipeTerminated);
                            }
                            PullOutcome::Pending => {
                                trace!(target: "controller", "response body has no data ready, pausing writes");
                                let ready = ready.clone();
                                source.on_ready(move || ready.set(true));
                                return Ok(());
                            }
                        }
                    } else {
                        match write_out(&mut self.write_buf, endpoint) {
                            Ok(true) => continue,
                            Ok(false) => return Ok(()),
                            Err(e) => {
                                fire(self.current_post_write.take(), OutputResult::Failure);
                                self.state = OutputState::Terminated;
                                return Err(e);
                            }
                        }
                    }
                }
                OutputState::Terminated => {
                    return Err(ControllerError::InvalidState("drive called after output was terminated"));
                }
            }
        }
    }

    /// resume a [`Self::drive`] call that returned early because a streamed body source
    /// had no data ready. cheap no-op if nothing is waiting on it.
    pub fn poll_unblock<En, Ep>(&mut self, encode: &mut En, endpoint: &mut Ep) -> Result<(), ControllerError>
    where
        En: Encode<M>,
        En::Error: error::Error + Send + Sync + 'static,
        Ep: Endpoint,
    {
        let ready = match &self.state {
            OutputState::Streaming { ready, .. } => ready.get(),
            _ => false,
        };
        if ready {
            self.drive(encode, endpoint)
        } else {
            Ok(())
        }
    }

    /// the endpoint's own `readyForData` callback: write capacity has returned. resumes
    /// [`OutputState::Writing`] (flushes the retained partial buffer, then fires
    /// `post_write` and drains whatever else is queued) or [`OutputState::Streaming`]
    /// (keeps pulling the body source). unlike [`Self::poll_unblock`] (which only fires
    /// once a streamed body source itself reports new data) this always re-drives,
    /// because a write-capacity signal is exactly the event `Writing`/`Streaming` are
    /// parked waiting for — see spec.md §4.4's `readyForData`. distinct from
    /// [`Self::resume_writes`], which toggles the application's own pause/resume request
    /// and must not be conflated with the endpoint's writability signal. a call while
    /// `Idle` or `Terminated` is a fault: nothing in this controller was waiting on write
    /// capacity, so the caller (the endpoint/reactor) is mis-wired.
    pub fn ready_for_data<En, Ep>(&mut self, encode: &mut En, endpoint: &mut Ep) -> Result<(), ControllerError>
    where
        En: Encode<M>,
        En::Error: error::Error + Send + Sync + 'static,
        Ep: Endpoint,
    {
        let awaiting_write_capacity = matches!(self.state, OutputState::Writing | OutputState::Streaming { .. });
        if awaiting_write_capacity {
            self.drive(encode, endpoint)
        } else {
            Err(ControllerError::InvalidState("ready_for_data called while not awaiting write capacity"))
        }
    }

    /// the endpoint reported the connection is gone. fails the in-flight item (if any)
    /// and cancels everything still queued, per the lifecycle rule that every
    /// outstanding `post_write` is resolved before the connection is fully torn down.
    pub fn output_on_closed(&mut self) {
        self.purge_all();
        self.state = OutputState::Terminated;
    }

    /// the connection is entering (or continuing) a graceful shutdown. if nothing is
    /// queued or in flight, finish right away; otherwise the queue drains normally
    /// through `drive` and this reaches `Terminated` the next time it is called once
    /// that drain empties the queue back out to `Idle`. idempotent: a no-op once already
    /// `Terminated`.
    pub fn output_graceful_disconnect(&mut self) {
        if self.is_idle() {
            self.state = OutputState::Terminated;
        }
    }
}

/// write as much of `buf` (always non-empty) to `endpoint` as it currently accepts,
/// draining the accepted prefix. returns `Ok(true)` if the endpoint accepted the whole
/// buffer (caller should loop for more work), `Ok(false)` if it accepted a partial amount
/// (caller must wait for the endpoint to report writability again via
/// [`OutputController::ready_for_data`]). per spec.md §4.4, a write that accepts zero
/// bytes of a non-empty buffer is not a benign stall to retry later — it is `Zero`, and
/// `Zero` is a fault exactly like `Failed`.
fn write_out(buf: &mut BytesMut, endpoint: &mut impl Endpoint) -> Result<bool, ControllerError> {
    match endpoint.write(buf) {
        WriteOutcome::Written(0) => Err(ControllerError::Io(std::io::ErrorKind::WriteZero.into())),
        WriteOutcome::Written(n) if n == buf.len() => {
            buf.clear();
            Ok(true)
        }
        WriteOutcome::Written(n) => {
            buf.advance(n);
            Ok(false)
        }
        WriteOutcome::Failed => Err(ControllerError::Io(std::io::ErrorKind::UnexpectedEof.into())),
    }
}
