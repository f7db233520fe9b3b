use uuid::Uuid;

/// Session ids are 36 ASCII characters: hyphenated hex groups. The receiver
/// treats them as opaque; only their length is load-bearing on the wire.
pub const SESSION_ID_LEN: usize = 36;

/// Mint a fresh, time-ordered session id.
///
/// v7 UUIDs sort by creation time, which is convenient for log correlation
/// even though the protocol itself only requires uniqueness.
pub fn new_session_id() -> String {
    Uuid::now_v7().to_string()
}
