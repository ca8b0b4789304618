// Cached, single-flight liveness check in front of the game client.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::source::SessionSource;

/// Last known liveness of the game client.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionCache {
    /// Advisory: must be revalidated once `ttl` has elapsed.
    pub is_connected: bool,
    pub last_checked_at: Option<Instant>,
    pub ttl: Duration,
    /// Number of completed probes. Lets callers that queued behind an
    /// in-flight probe recognise that it has finished.
    probes: u64,
}

impl ConnectionCache {
    fn is_fresh(&self, now: Instant) -> bool {
        self.last_checked_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.ttl)
    }
}

/// Liveness gate shared by every engine in the process.
///
/// `is_live` answers from the cache while it is younger than the TTL and
/// otherwise performs exactly one probe, however many callers are waiting.
pub struct ConnectionGate {
    source: Arc<dyn SessionSource>,
    probe_timeout: Duration,
    cache: Mutex<ConnectionCache>,
    probe_lock: tokio::sync::Mutex<()>,
}

impl ConnectionGate {
    pub fn new(source: Arc<dyn SessionSource>, ttl: Duration, probe_timeout: Duration) -> Self {
        ConnectionGate {
            source,
            probe_timeout,
            cache: Mutex::new(ConnectionCache {
                is_connected: false,
                last_checked_at: None,
                ttl,
                probes: 0,
            }),
            probe_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Whether the game client is reachable.
    ///
    /// Never fails: a probe error or timeout counts as "not connected".
    pub async fn is_live(&self) -> bool {
        let seen_probes = {
            let cache = self.cache();
            if cache.is_fresh(Instant::now()) {
                return cache.is_connected;
            }
            cache.probes
        };

        let _probe = self.probe_lock.lock().await;

        {
            let cache = self.cache();
            if cache.probes != seen_probes {
                // Someone else probed while we were queued; share the result.
                return cache.is_connected;
            }
        }

        let live = self.probe().await;

        let mut cache = self.cache();
        cache.is_connected = live;
        cache.last_checked_at = Some(Instant::now());
        cache.probes += 1;
        live
    }

    /// Cached value without any I/O. May be stale.
    pub fn is_connected(&self) -> bool {
        self.cache().is_connected
    }

    /// Copy of the current cache state.
    pub fn snapshot(&self) -> ConnectionCache {
        *self.cache()
    }

    /// Expire the cached value so the next `is_live` probes. Used when the
    /// environment reports a connection change before the TTL runs out.
    pub fn invalidate(&self) {
        self.cache().last_checked_at = None;
    }

    async fn probe(&self) -> bool {
        match tokio::time::timeout(self.probe_timeout, self.source.check_live()).await {
            Ok(Ok(live)) => {
                debug!(live, "liveness probe completed");
                live
            }
            Ok(Err(e)) => {
                warn!(error = %e, "liveness probe failed");
                false
            }
            Err(_) => {
                warn!(timeout = ?self.probe_timeout, "liveness probe timed out");
                false
            }
        }
    }

    fn cache(&self) -> MutexGuard<'_, ConnectionCache> {
        self.cache.lock().expect("connection cache mutex poisoned")
    }
}
