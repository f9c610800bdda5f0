//! fakes shared by the unit tests in [`crate::pipe`], [`crate::proto::input`],
//! [`crate::proto::output`] and [`crate::proto::controller`].
//!
//! deliberately hand-rolled rather than built on a mocking crate, matching how
//! `xitca_http::util::buf_list` and friends test themselves: plain structs that record
//! what happened and a tiny newline-delimited fake protocol.

use core::fmt;
use std::error;

use bytes::BytesMut;

use crate::{
    codec::{Decode, DecodedResult, Encode, Encoded},
    endpoint::{Endpoint, WriteOutcome},
    pipe::{self, Source},
};

#[derive(Debug)]
pub struct TestMessage {
    pub head: Vec<u8>,
    pub body: Option<Source>,
}

#[derive(Debug)]
pub struct TestCodecError(pub &'static str);

impl fmt::Display for TestCodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl error::Error for TestCodecError {}

/// decodes `<head>\n` frames; when constructed via [`TestLineCodec::body_len`], every
/// head frame is followed by a fixed-length body streamed through a small pipe (capacity
/// 4, deliberately smaller than the bodies the tests push, to exercise backpressure).
pub struct TestLineCodec {
    body_len: Option<u64>,
}

impl Default for TestLineCodec {
    fn default() -> Self {
        Self { body_len: None }
    }
}

impl TestLineCodec {
    pub fn body_len(len: u64) -> Self {
        Self { body_len: Some(len) }
    }
}

impl Decode for TestLineCodec {
    type Message = TestMessage;
    type Error = TestCodecError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<DecodedResult<TestMessage>, TestCodecError> {
        match buf.iter().position(|&b| b == b'\n') {
            None => Ok(DecodedResult::None),
            Some(pos) => {
                let line = buf.split_to(pos + 1);
                let head = line[..pos].to_vec();
                match self.body_len {
                    Some(len) => {
                        let (sink, source) = pipe::bounded(4, len);
                        Ok(DecodedResult::Streamed(TestMessage { head, body: Some(source) }, sink))
                    }
                    None => Ok(DecodedResult::Static(TestMessage { head, body: None })),
                }
            }
        }
    }
}

/// encodes a `Vec<u8>` message as `<bytes>\n`, unless a [`Source`] has been pre-seeded
/// via [`TestLineEncoder::next_stream`], in which case the message becomes a streamed
/// response body instead (used to exercise [`crate::proto::output::OutputController`]'s
/// streaming path without a real codec computing its own framing).
#[derive(Default)]
pub struct TestLineEncoder {
    pub next_stream: Option<Source>,
}

impl Encode<Vec<u8>> for TestLineEncoder {
    type Error = TestCodecError;

    fn encode(&mut self, message: Vec<u8>) -> Result<Encoded, TestCodecError> {
        if let Some(source) = self.next_stream.take() {
            return Ok(Encoded::DataStream(source));
        }
        let mut out = BytesMut::with_capacity(message.len() + 1);
        out.extend_from_slice(&message);
        out.extend_from_slice(b"\n");
        Ok(Encoded::ByteBuffer(out.freeze()))
    }
}

#[derive(Default)]
pub struct TestEndpoint {
    pub written: Vec<u8>,
    pub reads_disabled: bool,
    pub disconnected: bool,
    /// caps how many bytes a single `write` call accepts, to simulate a partially
    /// writable non-blocking socket. `None` accepts the whole buffer.
    pub write_cap: Option<usize>,
}

impl Endpoint for TestEndpoint {
    fn write(&mut self, buf: &[u8]) -> WriteOutcome {
        if self.disconnected {
            return WriteOutcome::Failed;
        }
        let n = self.write_cap.map_or(buf.len(), |cap| cap.min(buf.len()));
        self.written.extend_from_slice(&buf[..n]);
        WriteOutcome::Written(n)
    }

    fn enable_reads(&mut self) {
        self.reads_disabled = false;
    }

    fn disable_reads(&mut self) {
        self.reads_disabled = true;
    }

    fn disconnect(&mut self) {
        self.disconnected = true;
    }
}

