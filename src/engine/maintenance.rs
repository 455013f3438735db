//! Background sync and compaction for the log engine

use super::log::Shared;
use crate::Result;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Handle to the maintenance thread of one engine
pub(crate) struct Maintenance {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// A task that runs every `interval`; a zero interval never runs
struct Timer {
    interval: Duration,
    next: Option<Instant>,
}

impl Timer {
    fn new(interval: Duration, now: Instant) -> Self {
        let next = (!interval.is_zero()).then(|| now + interval);
        Timer { interval, next }
    }

    fn due(&mut self, now: Instant) -> bool {
        match self.next {
            Some(at) if at <= now => {
                self.next = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

impl Maintenance {
    /// Start the worker. Returns `None` when both intervals are zero.
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        sync_interval: Duration,
        compaction_interval: Duration,
    ) -> Result<Option<Self>> {
        if sync_interval.is_zero() && compaction_interval.is_zero() {
            return Ok(None);
        }

        let (stop, stopped) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("hashstore-maintenance".into())
            .spawn(move || {
                let now = Instant::now();
                let mut sync = Timer::new(sync_interval, now);
                let mut compact = Timer::new(compaction_interval, now);

                loop {
                    let wake = [sync.next, compact.next].into_iter().flatten().min();
                    let wait = wake.map_or(Duration::MAX, |at| {
                        at.saturating_duration_since(Instant::now())
                    });
                    match stopped.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }

                    let now = Instant::now();
                    if sync.due(now) {
                        if let Err(e) = shared.sync() {
                            warn!(error = %e, "background sync failed");
                        }
                    }
                    if compact.due(now) {
                        if let Err(e) = shared.compact(false) {
                            warn!(error = %e, "background compaction failed");
                        }
                    }
                }
                debug!("maintenance worker stopped");
            })?;

        Ok(Some(Maintenance { stop, handle }))
    }

    /// Signal the worker and wait for it to exit
    pub(crate) fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("maintenance worker panicked");
        }
    }
}
