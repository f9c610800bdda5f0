//! the transport endpoint seam.
//!
//! the endpoint (a non-blocking socket wrapper sitting on top of the reactor) is an
//! external collaborator, out of scope for this crate. this trait is the minimal surface
//! [`crate::proto::Controller`] drives it through, mirroring how `xitca_io::io::AsyncIo`
//! is the seam `xitca-http`'s dispatcher is generic over rather than owning socket code
//! itself.

/// outcome of a single non-blocking [`Endpoint::write`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// `n` bytes of `buf` were accepted, `n <= buf.len()`. `n == 0` means the endpoint is
    /// not currently writable (the non-blocking equivalent of `WouldBlock`); anything
    /// less than `buf.len()` means the caller must retry with the remainder once the
    /// endpoint becomes writable again.
    Written(usize),
    /// the write failed; the connection must be torn down.
    Failed,
}

/// a non-blocking, single-connection transport handle.
pub trait Endpoint {
    /// write as many bytes of `buf` as the endpoint currently accepts, reporting how far
    /// it got. never blocks.
    fn write(&mut self, buf: &[u8]) -> WriteOutcome;

    /// resume delivering inbound bytes via `Controller::received_data`. idempotent.
    fn enable_reads(&mut self);

    /// stop delivering inbound bytes (backpressure toward the peer). idempotent.
    fn disable_reads(&mut self);

    /// initiate a graceful close; the reactor later delivers
    /// `Controller::connection_closed`.
    fn disconnect(&mut self);
}
