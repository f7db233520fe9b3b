//! Structured logging for transfer lifecycle events.
//!
//! Sender and receiver hand their lifecycle events to a [`TransferLogger`]
//! rather than printing directly, so the same event stream can be routed to
//! `tracing` in binaries and discarded in tests.

use std::fmt;

/// One structured lifecycle event, tagged with the component that observed
/// it and the session it concerns (when applicable).
#[derive(Debug, Clone)]
pub struct TransferLog {
    pub component: &'static str,
    pub session_id: Option<String>,
    pub event: TransferEvent,
}

#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// Receiver: a socket was bound and is being served.
    Bound { addr: String },
    /// Receiver: a candidate bind address failed.
    BindFailed { addr: String, reason: String },
    /// Receiver: HS accepted, session created.
    SessionCreated { filename: String, file_size: u32 },
    /// Receiver: HS rejected by the sandbox or session creation failed.
    SessionRejected { reason: String },
    /// Receiver: a chunk was accepted and written.
    ChunkAccepted { chunk_no: u32, written: u64 },
    /// Receiver: a chunk was rejected (unknown session, wrong chunk number, busy).
    ChunkRejected { reason: String },
    /// Receiver: session completed and the file was persisted.
    SessionCompleted { filesize: u64 },
    /// Receiver: a session was removed by the reaper.
    SessionReaped,
    /// Receiver: a malformed frame was dropped.
    MalformedFrame { reason: String },
    /// Receiver: reaper swept the table.
    ReaperSweep { examined: usize, reaped: usize },
    /// Receiver: the reaper's final, unconditional pass at shutdown.
    ReaperDrained { reaped: usize },
    /// Supervisor: shutdown signal observed.
    ShuttingDown { reason: String },
    /// Sender: hello probe round trip.
    HelloRoundTrip { attempt: u32, rtt_ms: u64 },
    /// Sender: a file transfer failed fatally.
    TransferFailed { reason: String },
    /// Generic error not covered above.
    Error { message: String },
}

impl fmt::Display for TransferEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bound { addr } => write!(f, "bound addr={addr}"),
            Self::BindFailed { addr, reason } => {
                write!(f, "bind_failed addr={addr} reason={reason}")
            }
            Self::SessionCreated { filename, file_size } => {
                write!(f, "session_created filename={filename} file_size={file_size}")
            }
            Self::SessionRejected { reason } => write!(f, "session_rejected reason={reason}"),
            Self::ChunkAccepted { chunk_no, written } => {
                write!(f, "chunk_accepted chunk_no={chunk_no} written={written}")
            }
            Self::ChunkRejected { reason } => write!(f, "chunk_rejected reason={reason}"),
            Self::SessionCompleted { filesize } => {
                write!(f, "session_completed filesize={filesize}")
            }
            Self::SessionReaped => write!(f, "session_reaped"),
            Self::MalformedFrame { reason } => write!(f, "malformed_frame reason={reason}"),
            Self::ReaperSweep { examined, reaped } => {
                write!(f, "reaper_sweep examined={examined} reaped={reaped}")
            }
            Self::ReaperDrained { reaped } => write!(f, "reaper_drained reaped={reaped}"),
            Self::ShuttingDown { reason } => write!(f, "shutting_down reason={reason}"),
            Self::HelloRoundTrip { attempt, rtt_ms } => {
                write!(f, "hello_round_trip attempt={attempt} rtt_ms={rtt_ms}")
            }
            Self::TransferFailed { reason } => write!(f, "transfer_failed reason={reason}"),
            Self::Error { message } => write!(f, "error: {message}"),
        }
    }
}

/// Trait for transfer logging. Implementations can send logs to `tracing` or
/// discard them.
pub trait TransferLogger: Send + Sync {
    fn log(&self, entry: TransferLog);
}

/// Logger that forwards to the `tracing` crate. Key lifecycle events are
/// logged at `info`; per-frame or per-sweep activity at `debug`.
pub struct TracingLogger;

impl TransferLogger for TracingLogger {
    fn log(&self, entry: TransferLog) {
        let session_id = entry.session_id.as_deref().unwrap_or("-");
        match &entry.event {
            TransferEvent::SessionCreated { .. }
            | TransferEvent::SessionRejected { .. }
            | TransferEvent::SessionCompleted { .. }
            | TransferEvent::Bound { .. }
            | TransferEvent::BindFailed { .. }
            | TransferEvent::ReaperDrained { .. }
            | TransferEvent::ShuttingDown { .. }
            | TransferEvent::TransferFailed { .. }
            | TransferEvent::Error { .. } => {
                tracing::info!(
                    component = entry.component,
                    session_id,
                    "{}",
                    entry.event,
                );
            }
            _ => {
                tracing::debug!(
                    component = entry.component,
                    session_id,
                    "{}",
                    entry.event,
                );
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl TransferLogger for NullLogger {
    fn log(&self, _entry: TransferLog) {}
}
