//! Request and response framing for the tagged binary protocol.
//!
//! One request frame is a `u32` payload length followed by the payload:
//! a `u32` argument count, then each argument as `u32` length + bytes.
//! One response frame is a `u32` body length followed by a single tagged
//! value. Every fixed-width integer on the wire is little-endian.

use mayfly_common::error::{MayflyError, MayflyResult};
use mayfly_core::command::{CommandFrame, CommandReply, ReplyError};

/// Frame payloads above this limit close the connection (requests) or are
/// replaced by an in-band error (responses).
pub const MAX_FRAME_BYTES: usize = 32 << 20;
/// Argument-count cap inside one request frame.
pub const MAX_FRAME_ARGS: usize = 200_000;

/// Incremental request parser with one reassembly buffer per connection.
#[derive(Debug, Default)]
pub struct RequestParser {
    buffer: Vec<u8>,
}

impl RequestParser {
    /// Creates a parser with an empty reassembly buffer.
    #[must_use]
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Appends raw socket bytes to the reassembly buffer.
    pub fn feed_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pops the next complete request frame, or `None` while bytes are
    /// still missing.
    ///
    /// # Errors
    ///
    /// Returns `MayflyError::Protocol` on an oversize or malformed frame;
    /// the connection must then be closed without a reply. The length
    /// header is validated before the payload finishes arriving, so an
    /// oversize announcement is rejected immediately.
    pub fn try_pop_frame(&mut self) -> MayflyResult<Option<CommandFrame>> {
        if self.buffer.len() < 4 {
            return Ok(None);
        }
        let frame_len =
            u32::from_le_bytes([self.buffer[0], self.buffer[1], self.buffer[2], self.buffer[3]])
                as usize;
        if frame_len > MAX_FRAME_BYTES {
            return Err(MayflyError::Protocol(format!(
                "request frame of {frame_len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
            )));
        }
        if self.buffer.len() < 4 + frame_len {
            return Ok(None);
        }
        let args = parse_payload(&self.buffer[4..4 + frame_len])?;
        let _ = self.buffer.drain(..4 + frame_len);
        Ok(Some(CommandFrame::new(args)))
    }
}

fn parse_payload(payload: &[u8]) -> MayflyResult<Vec<Vec<u8>>> {
    let mut at = 0_usize;
    let count = read_u32(payload, &mut at)? as usize;
    if count > MAX_FRAME_ARGS {
        return Err(MayflyError::Protocol(format!(
            "request with {count} arguments exceeds the {MAX_FRAME_ARGS} argument limit"
        )));
    }
    let mut args = Vec::with_capacity(count.min(64));
    while args.len() < count {
        let len = read_u32(payload, &mut at)? as usize;
        let end = at.checked_add(len).ok_or_else(truncated_payload)?;
        let Some(bytes) = payload.get(at..end) else {
            return Err(truncated_payload());
        };
        args.push(bytes.to_vec());
        at = end;
    }
    if at != payload.len() {
        return Err(MayflyError::Protocol(
            "request payload has trailing bytes".to_owned(),
        ));
    }
    Ok(args)
}

fn read_u32(payload: &[u8], at: &mut usize) -> MayflyResult<u32> {
    let Some(bytes) = payload.get(*at..*at + 4) else {
        return Err(truncated_payload());
    };
    *at += 4;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn truncated_payload() -> MayflyError {
    MayflyError::Protocol("request payload is truncated".to_owned())
}

/// Appends one length-framed response to `out`.
///
/// The body is encoded after a four-byte length placeholder; a body above
/// [`MAX_FRAME_BYTES`] is rolled back and replaced by an in-band TOO_BIG
/// error before the header is patched in.
pub fn append_response(out: &mut Vec<u8>, reply: &CommandReply) {
    let header = out.len();
    out.extend_from_slice(&[0_u8; 4]);
    reply.encode_into(out);
    let mut body_len = out.len() - header - 4;
    if body_len > MAX_FRAME_BYTES {
        out.truncate(header + 4);
        CommandReply::Error(ReplyError::TooBig, "response is too big.".to_owned())
            .encode_into(out);
        body_len = out.len() - header - 4;
    }
    let body_len = u32::try_from(body_len).unwrap_or(u32::MAX);
    out[header..header + 4].copy_from_slice(&body_len.to_le_bytes());
}

/// Encodes one request frame from raw arguments (client-side helper, also
/// used by the reactor's loopback tests).
#[must_use]
pub fn encode_request(args: &[&[u8]]) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&wire_len(args.len()).to_le_bytes());
    for arg in args {
        payload.extend_from_slice(&wire_len(arg.len()).to_le_bytes());
        payload.extend_from_slice(arg);
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&wire_len(payload.len()).to_le_bytes());
    frame.extend_from_slice(&payload);
    frame
}

fn wire_len(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::{append_response, encode_request, RequestParser, MAX_FRAME_BYTES};
    use googletest::prelude::*;
    use mayfly_core::command::{CommandReply, ReplyError, TAG_ERR, TAG_NIL};
    use rstest::rstest;

    #[rstest]
    fn frames_survive_an_encode_parse_cycle() {
        let mut parser = RequestParser::new();
        parser.feed_bytes(&encode_request(&[b"set", b"key", b""]));
        let frame = parser
            .try_pop_frame()
            .expect("well-formed frame must parse")
            .expect("complete frame must pop");
        assert_that!(frame.args.len(), eq(3_usize));
        assert_that!(frame.name(), eq(&b"set"[..]));
        assert_that!(&frame.args[2], eq(&Vec::<u8>::new()));
        let drained = parser.try_pop_frame().expect("empty buffer is not an error");
        assert_that!(drained, none());
    }

    #[rstest]
    fn partial_feeds_pop_nothing_until_the_frame_completes() {
        let mut parser = RequestParser::new();
        let frame = encode_request(&[b"get", b"key"]);
        for byte in &frame[..frame.len() - 1] {
            parser.feed_bytes(&[*byte]);
            let pending = parser.try_pop_frame().expect("prefix must stay pending");
            assert_that!(pending, none());
        }
        parser.feed_bytes(&frame[frame.len() - 1..]);
        let popped = parser.try_pop_frame().expect("complete frame must parse");
        assert_that!(popped.is_some(), eq(true));
    }

    #[rstest]
    fn pipelined_frames_pop_in_order() {
        let mut parser = RequestParser::new();
        let mut bytes = encode_request(&[b"set", b"a", b"1"]);
        bytes.extend_from_slice(&encode_request(&[b"get", b"a"]));
        parser.feed_bytes(&bytes);
        let first = parser
            .try_pop_frame()
            .expect("first frame must parse")
            .expect("first frame must pop");
        let second = parser
            .try_pop_frame()
            .expect("second frame must parse")
            .expect("second frame must pop");
        assert_that!(first.name(), eq(&b"set"[..]));
        assert_that!(second.name(), eq(&b"get"[..]));
    }

    #[rstest]
    fn oversize_length_header_is_rejected_before_the_payload_arrives() {
        let mut parser = RequestParser::new();
        let oversize = u32::try_from(MAX_FRAME_BYTES + 1).expect("limit fits in u32");
        parser.feed_bytes(&oversize.to_le_bytes());
        assert_that!(parser.try_pop_frame().is_err(), eq(true));
    }

    #[rstest]
    fn argument_count_above_the_cap_is_rejected() {
        let mut parser = RequestParser::new();
        let mut frame = Vec::new();
        frame.extend_from_slice(&4_u32.to_le_bytes());
        frame.extend_from_slice(&200_001_u32.to_le_bytes());
        parser.feed_bytes(&frame);
        assert_that!(parser.try_pop_frame().is_err(), eq(true));
    }

    #[rstest]
    fn truncated_argument_is_rejected() {
        let mut parser = RequestParser::new();
        // One argument announcing 8 bytes with only 2 present.
        let mut payload = Vec::new();
        payload.extend_from_slice(&1_u32.to_le_bytes());
        payload.extend_from_slice(&8_u32.to_le_bytes());
        payload.extend_from_slice(b"ab");
        let mut frame = Vec::new();
        frame.extend_from_slice(&wire(payload.len()).to_le_bytes());
        frame.extend_from_slice(&payload);
        parser.feed_bytes(&frame);
        assert_that!(parser.try_pop_frame().is_err(), eq(true));
    }

    #[rstest]
    fn trailing_bytes_after_the_last_argument_are_rejected() {
        let mut parser = RequestParser::new();
        let mut payload = Vec::new();
        payload.extend_from_slice(&1_u32.to_le_bytes());
        payload.extend_from_slice(&1_u32.to_le_bytes());
        payload.push(b'x');
        payload.push(b'!');
        let mut frame = Vec::new();
        frame.extend_from_slice(&wire(payload.len()).to_le_bytes());
        frame.extend_from_slice(&payload);
        parser.feed_bytes(&frame);
        assert_that!(parser.try_pop_frame().is_err(), eq(true));
    }

    #[rstest]
    fn responses_carry_a_little_endian_length_header() {
        let mut out = Vec::new();
        append_response(&mut out, &CommandReply::Nil);
        assert_that!(&out, eq(&vec![1, 0, 0, 0, TAG_NIL]));

        out.clear();
        append_response(&mut out, &CommandReply::Int(5));
        assert_that!(out.len(), eq(4 + 1 + 8));
        assert_that!(
            u32::from_le_bytes([out[0], out[1], out[2], out[3]]),
            eq(9_u32)
        );
    }

    #[rstest]
    fn consecutive_responses_share_one_buffer() {
        let mut out = Vec::new();
        append_response(&mut out, &CommandReply::Nil);
        append_response(&mut out, &CommandReply::Str(b"v".to_vec()));
        assert_that!(out[..5].to_vec(), eq(&vec![1, 0, 0, 0, TAG_NIL]));
        let second_len = u32::from_le_bytes([out[5], out[6], out[7], out[8]]);
        assert_that!(second_len as usize, eq(out.len() - 9));
    }

    #[rstest]
    fn oversize_response_collapses_to_an_in_band_error() {
        let mut out = Vec::new();
        let huge = CommandReply::Str(vec![b'x'; MAX_FRAME_BYTES]);
        append_response(&mut out, &huge);
        // Header + tag + code + message length + message.
        let message = "response is too big.";
        assert_that!(out[4], eq(TAG_ERR));
        assert_that!(
            u32::from_le_bytes([out[5], out[6], out[7], out[8]]),
            eq(ReplyError::TooBig as u32)
        );
        assert_that!(
            u32::from_le_bytes([out[9], out[10], out[11], out[12]]) as usize,
            eq(message.len())
        );
        assert_that!(&out[13..], eq(message.as_bytes()));
    }

    fn wire(len: usize) -> u32 {
        u32::try_from(len).expect("test payloads stay within u32 range")
    }
}
