//! bounded byte-buffer conduit with explicit backpressure, used for streamed message bodies
//! in both directions.
//!
//! modeled on [`xitca_http::h1::body`]'s request body channel: a single shared
//! `Rc<RefCell<Inner>>` with one producer handle ([`Sink`]) and one consumer handle
//! ([`Source`]). unlike that channel, wake-ups here are one-shot boxed closures rather
//! than a [`std::task::Waker`] — this crate has no executor to poll against.
//!
//! both directions resolve the other end's "wake me up" need with the same two-phase
//! shape: an immediate, borrow-friendly poll (`push`/`try_pull`) plus a decoupled,
//! `'static` one-shot notifier ([`Trigger`]/`on_ready`) registered only when the poll
//! comes back empty. this is what spec.md §9 calls "an opaque continuation slot": the
//! notifier never needs to reach back into the controller that armed it, so there is no
//! cyclic lifetime between `Pipe` and `InputController`/`OutputController` (see
//! `DESIGN.md`).

use core::fmt;
use std::cell::RefCell;
use std::{collections::VecDeque, rc::Rc};

use bytes::{Bytes, BytesMut};

/// outcome of [`Sink::push`].
pub enum PushOutcome {
    /// some or all of the buffer was accepted; there is still room for more.
    Accepted,
    /// the body is complete: either a bounded pipe reached its declared length, or the
    /// consumer closed the pipe early. no further pushes are expected.
    Complete,
    /// the pipe is at capacity; `buf` may still hold unconsumed bytes belonging to this
    /// same body. retry by calling [`Trigger::fill`] and replaying the remainder of `buf`
    /// once it fires.
    Full(Trigger),
    /// the pipe was aborted via [`Sink::terminate`]/[`Source::terminate`].
    Terminated,
}

impl fmt::Debug for PushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Accepted => f.write_str("Accepted"),
            Self::Complete => f.write_str("Complete"),
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Terminated => f.write_str("Terminated"),
        }
    }
}

/// outcome of [`Source::try_pull`].
#[derive(Debug)]
pub enum PullOutcome {
    /// a chunk of body data.
    Data(Bytes),
    /// the producer closed the pipe; the body is complete.
    Closed,
    /// the pipe was aborted via [`Sink::terminate`]/[`Source::terminate`].
    Terminated,
    /// no chunk is queued yet and the pipe is still open. call [`Source::on_ready`] to be
    /// notified when calling `try_pull` again is worth it.
    Pending,
}

type Notify = Box<dyn FnOnce()>;

struct Inner {
    queue: VecDeque<Bytes>,
    buffered_len: usize,
    capacity: usize,
    /// `Some(n)` for a bounded pipe with `n` bytes still expected; `None` for an
    /// indefinite-length pipe (completion is signalled only by the consumer closing).
    body_remaining: Option<u64>,
    consumer_closed: bool,
    producer_finished: bool,
    terminated: Option<&'static str>,
    /// fires once when `try_pull` is worth retrying (data queued, or pipe closed/terminated).
    data_ready: Option<Notify>,
    /// fires once when `push` is worth retrying (room freed up, or consumer closed).
    drain_ready: Option<Notify>,
}

impl Inner {
    fn room(&self) -> usize {
        self.capacity.saturating_sub(self.buffered_len)
    }

    fn wake_data_ready(&mut self) -> Option<Notify> {
        self.data_ready.take()
    }

    fn wake_drain_ready(&mut self) -> Option<Notify> {
        if self.room() > 0 || self.consumer_closed {
            self.drain_ready.take()
        } else {
            None
        }
    }
}

/// construct a pipe whose total body length is known in advance (e.g. a `Content-Length`
/// delimited body). `push` returns [`PushOutcome::Complete`] once `body_len` bytes have
/// been accepted.
pub fn bounded(capacity: usize, body_len: u64) -> (Sink, Source) {
    channel(capacity, Some(body_len))
}

/// construct a pipe whose end is signalled only by the producer calling
/// [`Sink::finish`] or the consumer calling [`Source::close`] (e.g. chunked/unbounded
/// transfer coding, handled by the codec above this layer).
pub fn unbounded(capacity: usize) -> (Sink, Source) {
    channel(capacity, None)
}

fn channel(capacity: usize, body_remaining: Option<u64>) -> (Sink, Source) {
    let finished_immediately = body_remaining == Some(0);
    let inner = Rc::new(RefCell::new(Inner {
        queue: VecDeque::new(),
        buffered_len: 0,
        capacity,
        body_remaining,
        consumer_closed: false,
        producer_finished: finished_immediately,
        terminated: None,
        data_ready: None,
        drain_ready: None,
    }));
    (Sink { inner: inner.clone() }, Source { inner })
}

/// producer handle of a pipe.
pub struct Sink {
    inner: Rc<RefCell<Inner>>,
}

impl Sink {
    /// accept as much of `buf` as capacity (and, for bounded pipes, remaining body
    /// length) allow, draining the accepted prefix out of `buf`. any bytes `buf` still
    /// holds when this returns belong to the caller, not to this pipe.
    pub fn push(&self, buf: &mut BytesMut) -> PushOutcome {
        let mut inner = self.inner.borrow_mut();

        if inner.terminated.is_some() {
            return PushOutcome::Terminated;
        }
        if inner.consumer_closed {
            inner.producer_finished = true;
            return PushOutcome::Complete;
        }

        let room = inner.room();
        if room == 0 {
            return PushOutcome::Full(Trigger { inner: self.inner.clone() });
        }

        let mut take = buf.len().min(room);
        if let Some(remaining) = inner.body_remaining {
            take = take.min(remaining as usize);
        }

        let mut notify = None;
        if take > 0 {
            let chunk = buf.split_to(take).freeze();
            inner.buffered_len += chunk.len();
            if let Some(remaining) = inner.body_remaining.as_mut() {
                *remaining -= chunk.len() as u64;
            }
            inner.queue.push_back(chunk);
            notify = inner.wake_data_ready();
        }

        // drop the borrow before the notify callback (which may itself call back into
        // this pipe, e.g. `try_pull`) and before `push_tail` takes its own borrow.
        drop(inner);
        if let Some(notify) = notify {
            notify();
        }
        self.push_tail(buf)
    }

    // shared tail of `push`: decide Complete vs Full vs Accepted once the current
    // chunk has been queued (or its consumer notified).
    fn push_tail(&self, buf: &BytesMut) -> PushOutcome {
        let mut inner = self.inner.borrow_mut();
        if inner.terminated.is_some() {
            return PushOutcome::Terminated;
        }
        if inner.body_remaining == Some(0) {
            inner.producer_finished = true;
            return PushOutcome::Complete;
        }
        if !buf.is_empty() {
            return PushOutcome::Full(Trigger { inner: self.inner.clone() });
        }
        PushOutcome::Accepted
    }

    /// signal that no further data will be pushed (used by indefinite-length pipes once
    /// the producer has emitted its last chunk).
    pub fn finish(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.terminated.is_some() {
            return;
        }
        inner.producer_finished = true;
        if inner.queue.is_empty() {
            if let Some(notify) = inner.wake_data_ready() {
                drop(inner);
                notify();
            }
        }
    }

    /// abort the pipe. wakes a pending [`Source::on_ready`] notifier (the next
    /// [`Source::try_pull`] reports [`PullOutcome::Terminated`]) and any outstanding
    /// [`Trigger`] (the next [`Sink::push`]/`Trigger::fill` call reports/fires against
    /// [`PushOutcome::Terminated`]), so a producer parked on a full pipe is not left
    /// blocked forever once its consumer is gone.
    pub fn terminate(&self, reason: &'static str) {
        terminate(&self.inner, reason);
    }
}

/// consumer handle of a pipe.
pub struct Source {
    inner: Rc<RefCell<Inner>>,
}

impl Source {
    /// immediate, non-blocking poll for the next chunk.
    pub fn try_pull(&self) -> PullOutcome {
        let mut inner = self.inner.borrow_mut();
        if let Some(data) = inner.queue.pop_front() {
            inner.buffered_len -= data.len();
            let notify = inner.wake_drain_ready();
            drop(inner);
            if let Some(notify) = notify {
                notify();
            }
            return PullOutcome::Data(data);
        }
        if inner.terminated.is_some() {
            return PullOutcome::Terminated;
        }
        if inner.producer_finished {
            return PullOutcome::Closed;
        }
        PullOutcome::Pending
    }

    /// register a one-shot callback fired the next time [`Source::try_pull`] is worth
    /// retrying. only meaningful after `try_pull` returned [`PullOutcome::Pending`].
    pub fn on_ready(&self, callback: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        let already_ready =
            !inner.queue.is_empty() || inner.terminated.is_some() || inner.producer_finished;
        if already_ready {
            drop(inner);
            callback();
            return;
        }
        inner.data_ready = Some(Box::new(callback));
    }

    /// tell the producer that no further data is wanted. a producer parked on a
    /// [`Trigger`] is woken so it can observe the close; any push still in flight (or
    /// the next one) resolves as [`PushOutcome::Complete`].
    pub fn close(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.terminated.is_some() || inner.consumer_closed {
            return;
        }
        inner.consumer_closed = true;
        let trigger = inner.drain_ready.take();
        drop(inner);
        if let Some(trigger) = trigger {
            trigger();
        }
    }

    /// abort the pipe. see [`Sink::terminate`].
    pub fn terminate(&self, reason: &'static str) {
        terminate(&self.inner, reason);
    }
}

fn terminate(inner: &Rc<RefCell<Inner>>, reason: &'static str) {
    let mut guard = inner.borrow_mut();
    if guard.terminated.is_some() {
        return;
    }
    guard.terminated = Some(reason);
    let data_notify = guard.data_ready.take();
    // a parked producer must be woken too, or it stays blocked forever: the
    // controller re-checks the pipe from its own `Trigger::fill` closure and sees
    // `PushOutcome::Terminated` on the next push, which is what actually tears its
    // state down. a plain `drain_ready = None` would leave it hanging.
    let drain_notify = guard.drain_ready.take();
    drop(guard);
    if let Some(notify) = data_notify {
        notify();
    }
    if let Some(notify) = drain_notify {
        notify();
    }
}

/// one-shot, idempotent-under-cancel notification that a [`Sink`] blocked on
/// [`PushOutcome::Full`] can retry.
///
/// the registered callback is moved out of the pipe's shared state and invoked at most
/// once by construction (`Option::take`), not by a runtime flag, per the "callbacks as
/// first-class values" guidance this controller follows throughout.
pub struct Trigger {
    inner: Rc<RefCell<Inner>>,
}

impl Trigger {
    /// register `callback` to run the next time the pipe drains enough to have room
    /// again (or the consumer closes). overwrites any previously registered callback on
    /// this trigger.
    pub fn fill(&self, callback: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        if inner.terminated.is_some() || inner.room() > 0 || inner.consumer_closed {
            drop(inner);
            callback();
            return;
        }
        inner.drain_ready = Some(Box::new(callback));
    }

    /// invalidate a previously filled registration. safe to call even if the trigger
    /// already fired or was never filled.
    pub fn cancel(&self) {
        self.inner.borrow_mut().drain_ready = None;
    }
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Trigger")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    #[test]
    fn bounded_completes_exactly_at_length() {
        let (sink, source) = bounded(1024, 5);
        let mut buf = BytesMut::from(&b"hello world"[..]);
        match sink.push(&mut buf) {
            PushOutcome::Complete => {}
            other => panic!("expected Complete, got {other:?}"),
        }
        assert_eq!(&buf[..], b" world");

        match source.try_pull() {
            PullOutcome::Data(b) => assert_eq!(&b[..], b"hello"),
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[test]
    fn zero_length_bounded_pipe_is_immediately_closed() {
        let (_sink, source) = bounded(1024, 0);
        assert!(matches!(source.try_pull(), PullOutcome::Closed));
    }

    #[test]
    fn pull_before_push_returns_pending_then_notifies() {
        let (sink, source) = unbounded(16);
        assert!(matches!(source.try_pull(), PullOutcome::Pending));

        let notified = Rc::new(Cell::new(false));
        let notified2 = notified.clone();
        source.on_ready(move || notified2.set(true));

        let mut buf = BytesMut::from(&b"hi"[..]);
        assert!(matches!(sink.push(&mut buf), PushOutcome::Accepted));
        assert!(notified.get(), "push must wake a registered on_ready callback");

        match source.try_pull() {
            PullOutcome::Data(b) => assert_eq!(&b[..], b"hi"),
            other => panic!("expected Data, got {other:?}"),
        }
    }

    #[test]
    fn full_then_trigger_then_resume() {
        let (sink, source) = unbounded(4);
        let mut buf = BytesMut::from(&b"abcdefgh"[..]);
        let trigger = match sink.push(&mut buf) {
            PushOutcome::Full(t) => t,
            other => panic!("expected Full, got {other:?}"),
        };
        // exactly `capacity` bytes were queued, the rest is left for the caller to retry.
        assert_eq!(&buf[..], b"efgh");

        let fired = Rc::new(Cell::new(false));
        let fired2 = fired.clone();
        trigger.fill(move || fired2.set(true));
        assert!(!fired.get(), "trigger must not fire before the pipe drains");

        match source.try_pull() {
            PullOutcome::Data(b) => assert_eq!(&b[..], b"abcd"),
            other => panic!("expected Data, got {other:?}"),
        }
        assert!(fired.get(), "draining the full pipe must fire the trigger");

        // replay the remainder, as the open-question resolution requires.
        match sink.push(&mut buf) {
            PushOutcome::Accepted => {}
            other => panic!("expected Accepted, got {other:?}"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn consumer_close_unblocks_a_waiting_producer() {
        let (sink, source) = unbounded(1);
        let mut buf = BytesMut::from(&b"xy"[..]);
        let trigger = match sink.push(&mut buf) {
            PushOutcome::Full(t) => t,
            other => panic!("expected Full, got {other:?}"),
        };
        let fired = Rc::new(Cell::new(false));
        let fired2 = fired.clone();
        trigger.fill(move || fired2.set(true));

        source.close();
        assert!(fired.get());

        match sink.push(&mut buf) {
            PushOutcome::Complete => {}
            other => panic!("expected Complete, got {other:?}"),
        }
    }

    #[test]
    fn terminate_fails_a_pending_pull() {
        let (sink, source) = unbounded(4);
        let notified = Rc::new(Cell::new(false));
        let notified2 = notified.clone();
        source.on_ready(move || notified2.set(true));

        sink.terminate("connection closed");
        assert!(notified.get());
        assert!(matches!(source.try_pull(), PullOutcome::Terminated));

        let mut buf = BytesMut::from(&b"z"[..]);
        match sink.push(&mut buf) {
            PushOutcome::Terminated => {}
            other => panic!("expected Terminated, got {other:?}"),
        }
    }

    #[test]
    fn terminate_wakes_a_producer_parked_on_a_trigger() {
        // a producer blocked on a full pipe must be woken by terminate, or it is stuck
        // parked forever with no way to learn the consumer is gone.
        let (sink, source) = unbounded(4);
        let mut buf = BytesMut::from(&b"abcdefgh"[..]);
        let trigger = match sink.push(&mut buf) {
            PushOutcome::Full(t) => t,
            other => panic!("expected Full, got {other:?}"),
        };
        let fired = Rc::new(Cell::new(false));
        let fired2 = fired.clone();
        trigger.fill(move || fired2.set(true));
        assert!(!fired.get());

        source.terminate("consumer gave up");
        assert!(fired.get(), "terminate must wake a trigger parked via Trigger::fill");

        match sink.push(&mut buf) {
            PushOutcome::Terminated => {}
            other => panic!("expected Terminated, got {other:?}"),
        }
    }

    #[test]
    fn fill_after_termination_fires_immediately() {
        let (sink, source) = unbounded(4);
        let mut buf = BytesMut::from(&b"abcdefgh"[..]);
        let trigger = match sink.push(&mut buf) {
            PushOutcome::Full(t) => t,
            other => panic!("expected Full, got {other:?}"),
        };
        source.terminate("consumer gave up");

        let fired = Rc::new(Cell::new(false));
        let fired2 = fired.clone();
        trigger.fill(move || fired2.set(true));
        assert!(fired.get(), "a trigger filled after termination must fire right away, not hang");
    }

    #[test]
    fn finish_with_empty_queue_closes_a_pending_pull() {
        let (sink, source) = unbounded(4);
        let notified = Rc::new(Cell::new(false));
        let notified2 = notified.clone();
        source.on_ready(move || notified2.set(true));
        sink.finish();
        assert!(notified.get());
        assert!(matches!(source.try_pull(), PullOutcome::Closed));
    }
}
