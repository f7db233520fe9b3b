//! Wire framing for the chunked, stop-and-wait file transfer protocol.
//!
//! Every frame begins with a one-byte sentinel so the receiver can cheaply
//! reject stray traffic sharing a UDP port, followed by an ASCII opcode and
//! opcode-specific payload. Multi-byte integers are big-endian.

mod frame;
mod session_id;

pub use frame::{
    decode, encode_done, encode_drop, encode_hello, encode_hs, encode_ok, encode_received,
    encode_reject, encode_transfer, Frame, FrameError,
};
pub use session_id::{new_session_id, SESSION_ID_LEN};

/// The tag byte every frame starts with.
pub const SENTINEL: u8 = 0x0B;

/// Default chunk size, in bytes, used to size the sender's read buffer and
/// the receiver's frame buffer.
pub const DEFAULT_CHUNK_SIZE: u32 = 2048;

/// Default send/receive timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default directory received files are written under.
pub const DEFAULT_SAVE_ROOT: &str = "./received";

/// Bytes of fixed-field overhead a `TRANSFER` frame carries besides its data,
/// i.e. `sentinel + "TRANSFER" + session_id + chunk_no`.
pub const TRANSFER_OVERHEAD: usize = 1 + frame::OPCODE_TRANSFER.len() + SESSION_ID_LEN + 4;
