//! Receiver-side logic for the chunked file-transfer protocol: the session
//! table, the handler chain, the background reaper, and the multi-socket
//! supervisor. Split out of the binary so integration tests can drive a real
//! server over a loopback socket without shelling out to the built binary.

pub mod cli;
pub mod handlers;
pub mod reaper;
pub mod sandbox;
pub mod session;
pub mod supervisor;
