use crate::session_id::SESSION_ID_LEN;
use crate::SENTINEL;

pub(crate) const OPCODE_HELLO: &str = "HELLO";
pub(crate) const OPCODE_HS: &str = "HS";
pub(crate) const OPCODE_OK: &str = "OK";
pub(crate) const OPCODE_TRANSFER: &str = "TRANSFER";
pub(crate) const OPCODE_RECEIVED: &str = "RECEIVED";
pub(crate) const OPCODE_DONE: &str = "DONE";
pub(crate) const OPCODE_REJECT: &str = "REJECT";
pub(crate) const OPCODE_DROP: &str = "DROP";

/// A decoded frame, borrowing its variable-length fields from the input
/// buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    Hello,
    Hs {
        file_size: u32,
        filename: &'a str,
    },
    Ok {
        session_id: &'a str,
    },
    Transfer {
        session_id: &'a str,
        chunk_no: u32,
        data: &'a [u8],
    },
    Received {
        session_id: &'a str,
        next_expected_chunk: u32,
    },
    Done {
        session_id: &'a str,
        next_expected_chunk: u32,
    },
    Reject,
    Drop,
}

/// Failures decoding an inbound buffer into a [`Frame`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("buffer is empty")]
    Empty,
    #[error("missing sentinel byte (got {0:#04x})")]
    MissingSentinel(u8),
    #[error("unrecognized opcode")]
    UnknownOpcode,
    #[error("payload shorter than the opcode's fixed fields")]
    PayloadTooShort,
    #[error("filename is not valid utf-8")]
    InvalidFilename(#[from] std::str::Utf8Error),
    #[error("session id is not {SESSION_ID_LEN} ascii bytes")]
    InvalidSessionId,
}

fn session_id_str(buf: &[u8]) -> Result<&str, FrameError> {
    if buf.len() < SESSION_ID_LEN {
        return Err(FrameError::PayloadTooShort);
    }
    let raw = &buf[..SESSION_ID_LEN];
    if !raw.is_ascii() {
        return Err(FrameError::InvalidSessionId);
    }
    std::str::from_utf8(raw).map_err(FrameError::InvalidFilename)
}

fn read_u32(buf: &[u8]) -> Result<u32, FrameError> {
    if buf.len() < 4 {
        return Err(FrameError::PayloadTooShort);
    }
    Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Decode a single frame from a contiguous buffer. Malformed input (bad
/// sentinel, unknown opcode, short payload) is reported, never panics.
pub fn decode(buf: &[u8]) -> Result<Frame<'_>, FrameError> {
    let Some(&tag) = buf.first() else {
        return Err(FrameError::Empty);
    };
    if tag != SENTINEL {
        return Err(FrameError::MissingSentinel(tag));
    }
    let rest = &buf[1..];

    if let Some(payload) = rest.strip_prefix(OPCODE_HELLO.as_bytes()) {
        let _ = payload;
        return Ok(Frame::Hello);
    }
    if let Some(payload) = rest.strip_prefix(OPCODE_HS.as_bytes()) {
        let file_size = read_u32(payload)?;
        let filename = std::str::from_utf8(&payload[4..])?;
        return Ok(Frame::Hs { file_size, filename });
    }
    if let Some(payload) = rest.strip_prefix(OPCODE_OK.as_bytes()) {
        let session_id = session_id_str(payload)?;
        return Ok(Frame::Ok { session_id });
    }
    if let Some(payload) = rest.strip_prefix(OPCODE_TRANSFER.as_bytes()) {
        let session_id = session_id_str(payload)?;
        let chunk_no = read_u32(&payload[SESSION_ID_LEN..])?;
        let data = &payload[SESSION_ID_LEN + 4..];
        return Ok(Frame::Transfer {
            session_id,
            chunk_no,
            data,
        });
    }
    if let Some(payload) = rest.strip_prefix(OPCODE_RECEIVED.as_bytes()) {
        let session_id = session_id_str(payload)?;
        let next_expected_chunk = read_u32(&payload[SESSION_ID_LEN..])?;
        return Ok(Frame::Received {
            session_id,
            next_expected_chunk,
        });
    }
    if let Some(payload) = rest.strip_prefix(OPCODE_DONE.as_bytes()) {
        let session_id = session_id_str(payload)?;
        let next_expected_chunk = read_u32(&payload[SESSION_ID_LEN..])?;
        return Ok(Frame::Done {
            session_id,
            next_expected_chunk,
        });
    }
    if rest.starts_with(OPCODE_REJECT.as_bytes()) {
        return Ok(Frame::Reject);
    }
    if rest.starts_with(OPCODE_DROP.as_bytes()) {
        return Ok(Frame::Drop);
    }
    Err(FrameError::UnknownOpcode)
}

fn with_sentinel(opcode: &str, extra: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + opcode.len() + extra);
    buf.push(SENTINEL);
    buf.extend_from_slice(opcode.as_bytes());
    buf
}

pub fn encode_hello() -> Vec<u8> {
    with_sentinel(OPCODE_HELLO, 0)
}

pub fn encode_hs(file_size: u32, filename: &str) -> Vec<u8> {
    let mut buf = with_sentinel(OPCODE_HS, 4 + filename.len());
    buf.extend_from_slice(&file_size.to_be_bytes());
    buf.extend_from_slice(filename.as_bytes());
    buf
}

pub fn encode_ok(session_id: &str) -> Vec<u8> {
    let mut buf = with_sentinel(OPCODE_OK, session_id.len());
    buf.extend_from_slice(session_id.as_bytes());
    buf
}

pub fn encode_transfer(session_id: &str, chunk_no: u32, data: &[u8]) -> Vec<u8> {
    let mut buf = with_sentinel(OPCODE_TRANSFER, session_id.len() + 4 + data.len());
    buf.extend_from_slice(session_id.as_bytes());
    buf.extend_from_slice(&chunk_no.to_be_bytes());
    buf.extend_from_slice(data);
    buf
}

pub fn encode_received(session_id: &str, next_expected_chunk: u32) -> Vec<u8> {
    let mut buf = with_sentinel(OPCODE_RECEIVED, session_id.len() + 4);
    buf.extend_from_slice(session_id.as_bytes());
    buf.extend_from_slice(&next_expected_chunk.to_be_bytes());
    buf
}

pub fn encode_done(session_id: &str, next_expected_chunk: u32) -> Vec<u8> {
    let mut buf = with_sentinel(OPCODE_DONE, session_id.len() + 4);
    buf.extend_from_slice(session_id.as_bytes());
    buf.extend_from_slice(&next_expected_chunk.to_be_bytes());
    buf
}

pub fn encode_reject() -> Vec<u8> {
    with_sentinel(OPCODE_REJECT, 0)
}

pub fn encode_drop() -> Vec<u8> {
    with_sentinel(OPCODE_DROP, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_hello() {
        let buf = encode_hello();
        assert_eq!(decode(&buf).unwrap(), Frame::Hello);
    }

    #[test]
    fn roundtrip_hs() {
        let buf = encode_hs(12, "a.bin");
        match decode(&buf).unwrap() {
            Frame::Hs { file_size, filename } => {
                assert_eq!(file_size, 12);
                assert_eq!(filename, "a.bin");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn roundtrip_transfer() {
        let sid = "01234567-89ab-cdef-0123-456789abcdef";
        let buf = encode_transfer(sid, 1, b"hello");
        match decode(&buf).unwrap() {
            Frame::Transfer { session_id, chunk_no, data } => {
                assert_eq!(session_id, sid);
                assert_eq!(chunk_no, 1);
                assert_eq!(data, b"hello");
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn roundtrip_received_and_done() {
        let sid = "01234567-89ab-cdef-0123-456789abcdef";
        match decode(&encode_received(sid, 2)).unwrap() {
            Frame::Received { session_id, next_expected_chunk } => {
                assert_eq!(session_id, sid);
                assert_eq!(next_expected_chunk, 2);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
        match decode(&encode_done(sid, 3)).unwrap() {
            Frame::Done { session_id, next_expected_chunk } => {
                assert_eq!(session_id, sid);
                assert_eq!(next_expected_chunk, 3);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn reject_and_drop_have_no_payload() {
        assert_eq!(decode(&encode_reject()).unwrap(), Frame::Reject);
        assert_eq!(decode(&encode_drop()).unwrap(), Frame::Drop);
    }

    #[test]
    fn rejects_bad_sentinel() {
        let mut buf = encode_hello();
        buf[0] = 0x00;
        assert!(matches!(decode(&buf), Err(FrameError::MissingSentinel(0x00))));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut buf = vec![SENTINEL];
        buf.extend_from_slice(b"BOGUS");
        assert!(matches!(decode(&buf), Err(FrameError::UnknownOpcode)));
    }

    #[test]
    fn rejects_empty_buffer() {
        assert!(matches!(decode(&[]), Err(FrameError::Empty)));
    }

    #[test]
    fn rejects_short_transfer_payload() {
        let mut buf = vec![SENTINEL];
        buf.extend_from_slice(OPCODE_TRANSFER.as_bytes());
        buf.extend_from_slice(b"short");
        assert!(matches!(decode(&buf), Err(FrameError::PayloadTooShort)));
    }
}
