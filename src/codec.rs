//! the protocol codec seam.
//!
//! the codec itself (HTTP/1, memcache, redis, ...) is out of scope for this crate; this
//! module only defines the interface [`InputController`](crate::proto::InputController) and
//! [`OutputController`](crate::proto::OutputController) are generic over, the same way
//! [`xitca_service::Service`] is the seam `xitca-http`'s dispatcher is generic over its
//! request/response types.

use bytes::{Bytes, BytesMut};

use crate::pipe::Source;

/// result of [`Decode::decode`].
pub enum DecodedResult<M> {
    /// not enough bytes buffered yet to produce a complete message.
    None,
    /// a complete message with no body (or a body fully contained in the decoded frame).
    Static(M),
    /// the message head is complete; its body must be read from `sink` by pushing
    /// subsequent bytes into it (see [`crate::proto::InputController`]).
    Streamed(M, crate::pipe::Sink),
}

/// decodes inbound bytes into messages. implementations own the frame-boundary logic; the
/// controller only knows to keep calling `decode` while `buf` has unread data.
pub trait Decode {
    type Message;
    type Error;

    /// consume as much of `buf` as is needed to produce the next result, advancing
    /// `buf`'s read cursor. it is legal for `buf` to hold more than one frame: the
    /// caller re-invokes `decode` while bytes remain.
    fn decode(&mut self, buf: &mut BytesMut) -> Result<DecodedResult<Self::Message>, Self::Error>;
}

/// result of [`Encode::encode`].
pub enum Encoded {
    /// a fully materialized frame ready to hand to the endpoint.
    ByteBuffer(Bytes),
    /// a message whose body is produced incrementally; ownership of the body source
    /// transfers to the controller, which drains it as the endpoint accepts writes.
    DataStream(Source),
}

/// encodes outbound messages into bytes (or a body source) for the controller to write.
pub trait Encode<M> {
    type Error;

    /// synchronous: no backpressure exists at encode time, only at write time.
    fn encode(&mut self, message: M) -> Result<Encoded, Self::Error>;
}
