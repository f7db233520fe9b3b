use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parcel_logging::{TransferEvent, TransferLog, TransferLogger};

use crate::session::SessionTable;

/// Background task that periodically removes sessions whose lock is free
/// and whose `last_activity` predates `live_time`. Runs until `running`
/// clears, then performs one final unconditional pass before returning.
pub async fn run(
    table: Arc<SessionTable>,
    live_time: Duration,
    check_interval: Duration,
    logger: Arc<dyn TransferLogger>,
    running: Arc<AtomicBool>,
) {
    let mut ticker = tokio::time::interval(check_interval);
    ticker.tick().await; // first tick fires immediately; skip it

    while running.load(Ordering::Acquire) {
        ticker.tick().await;
        let (examined, reaped) = table.sweep(live_time).await;
        logger.log(TransferLog {
            component: "reaper",
            session_id: None,
            event: TransferEvent::ReaperSweep { examined, reaped },
        });
    }

    let reaped = table.drain().await;
    logger.log(TransferLog {
        component: "reaper",
        session_id: None,
        event: TransferEvent::ReaperDrained { reaped },
    });
}

/// `live_time` defaults to the sum of the send and receive timeouts;
/// `check_interval` defaults to 1.5x `live_time`.
pub fn default_live_time(timeout: Duration) -> Duration {
    timeout + timeout
}

pub fn default_check_interval(live_time: Duration) -> Duration {
    live_time.mul_f64(1.5)
}
