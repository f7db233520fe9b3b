use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::fs::File;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Advisory status, materialized for observability. No handler reads it
/// before a session's removal; dispatch is driven entirely by opcode and
/// `next_chunk`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Handshake,
    Transfering,
    Done,
}

pub struct SessionRecord {
    pub status: SessionStatus,
    pub filename: String,
    pub filesize: u64,
    pub absolute_path: PathBuf,
    pub written: u64,
    pub next_chunk: u32,
    pub sink: Option<File>,
    pub last_activity: Instant,
}

impl SessionRecord {
    pub fn new(filename: String, filesize: u64, absolute_path: PathBuf, sink: File) -> Self {
        Self {
            status: SessionStatus::Handshake,
            filename,
            filesize,
            absolute_path,
            written: 0,
            next_chunk: 1,
            sink: Some(sink),
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }
}

/// Outcome of a non-blocking attempt to locate and lock a session.
pub enum LockOutcome {
    Found(OwnedMutexGuard<SessionRecord>),
    Missing,
    Busy,
}

/// Process-wide session table: a table-level lock guarding the map itself,
/// and a per-session lock guarding each record. The table lock is never held
/// across socket or file I/O.
pub struct SessionTable {
    inner: Mutex<HashMap<String, Arc<Mutex<SessionRecord>>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, id: String, record: SessionRecord) {
        let mut table = self.inner.lock().await;
        table.insert(id, Arc::new(Mutex::new(record)));
    }

    /// Locate `id` under the table lock, then attempt its session lock
    /// non-blockingly. The table lock is released before returning, whether
    /// or not the session lock was acquired.
    pub async fn find_and_lock(&self, id: &str) -> LockOutcome {
        let entry = {
            let table = self.inner.lock().await;
            table.get(id).cloned()
        };
        let Some(entry) = entry else {
            return LockOutcome::Missing;
        };
        match entry.try_lock_owned() {
            Ok(guard) => LockOutcome::Found(guard),
            Err(_) => LockOutcome::Busy,
        }
    }

    /// Remove `id` from the table. The caller must already hold the
    /// session's lock; dropping the returned guard (which the caller does by
    /// letting it go out of scope) releases it once this entry's last `Arc`
    /// goes away.
    pub async fn remove(&self, id: &str) {
        let mut table = self.inner.lock().await;
        table.remove(id);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Sweep the table for sessions whose lock is free and whose
    /// `last_activity` predates `live_time`. Returns `(examined, reaped)`.
    pub async fn sweep(&self, live_time: Duration) -> (usize, usize) {
        self.sweep_inner(Some(live_time)).await
    }

    /// Reap every session whose lock can be acquired, regardless of age.
    /// Used for the supervisor's final, unconditional cleanup pass at
    /// shutdown.
    pub async fn drain(&self) -> usize {
        self.sweep_inner(None).await.1
    }

    async fn sweep_inner(&self, live_time: Option<Duration>) -> (usize, usize) {
        let snapshot: Vec<(String, Arc<Mutex<SessionRecord>>)> = {
            let table = self.inner.lock().await;
            table.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let examined = snapshot.len();
        let mut reaped = 0;
        for (id, entry) in snapshot {
            let Ok(mut guard) = entry.try_lock_owned() else {
                continue;
            };
            let expired = match live_time {
                Some(live_time) => guard.last_activity.elapsed() > live_time,
                None => true,
            };
            if !expired {
                continue;
            }
            cleanup_session(&mut guard).await;
            drop(guard);
            self.remove(&id).await;
            reaped += 1;
        }
        (examined, reaped)
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Close the sink and, if the transfer never completed, delete the partial
/// file. Shared by the reaper and the stream peer-close hook.
pub async fn cleanup_session(record: &mut SessionRecord) {
    record.sink.take();
    if record.written < record.filesize {
        let _ = tokio::fs::remove_file(&record.absolute_path).await;
    }
}
