//! Probe Cache
//!
//! Bounded LRU of endpoint health state. Each live entry owns one probe
//! worker that re-checks its endpoint on an interval and publishes the
//! result through an atomic flag; the DNS path reads the flag lock-free.
//!
//! Worker lifetime is tied to cache residency: the entry holds the
//! sending half of a oneshot channel, and the worker selects on the
//! receiving half. Evicting (or replacing) the entry drops the sender,
//! which wakes the worker and ends it. The worker additionally re-checks
//! membership at every wake-up, so a worker never outlives its entry by
//! more than one interval plus one probe.

use crate::domain::ports::HealthProbe;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

struct ProbeEntry {
    healthy: Arc<AtomicBool>,
    /// Dropped when the entry leaves the cache; wakes the worker.
    _shutdown: oneshot::Sender<()>,
}

/// Health state for the endpoints recently seen in answers.
pub struct ProbeCache {
    entries: Arc<Mutex<LruCache<String, ProbeEntry>>>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
}

impl ProbeCache {
    /// `capacity` and `interval` must be positive.
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        capacity: usize,
        interval: Duration,
    ) -> anyhow::Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| anyhow::anyhow!("probe cache capacity must be positive"))?;
        if interval.is_zero() {
            anyhow::bail!("probe interval must be positive");
        }

        Ok(Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            probe,
            interval,
        })
    }

    /// Cached health of a known endpoint, refreshing its recency.
    /// `None` means the endpoint has not been admitted yet.
    pub fn health(&self, endpoint: &str) -> Option<bool> {
        let mut entries = self.entries.lock();
        entries
            .get(endpoint)
            .map(|e| e.healthy.load(Ordering::Acquire))
    }

    /// Admit a newly-seen endpoint: probe it once synchronously, insert
    /// the entry and start its worker. If the insertion evicts another
    /// entry (or replaces an entry racing on the same key), the dropped
    /// entry's worker shuts down.
    pub async fn admit(&self, endpoint: &str) {
        let healthy = Arc::new(AtomicBool::new(self.probe.check(endpoint).await));
        let (shutdown, wakeup) = oneshot::channel();

        let entry = ProbeEntry {
            healthy: Arc::clone(&healthy),
            _shutdown: shutdown,
        };

        let displaced = self.entries.lock().push(endpoint.to_string(), entry);
        drop(displaced);

        self.spawn_worker(endpoint.to_string(), wakeup);
    }

    /// Number of endpoints currently tracked.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_worker(&self, endpoint: String, mut wakeup: oneshot::Receiver<()>) {
        let entries = Arc::clone(&self.entries);
        let probe = Arc::clone(&self.probe);
        let period = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick of a tokio interval fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut wakeup => {
                        tracing::debug!("probe worker for {} released by eviction", endpoint);
                        return;
                    }
                    _ = ticker.tick() => {
                        let flag = entries
                            .lock()
                            .peek(&endpoint)
                            .map(|e| Arc::clone(&e.healthy));
                        let Some(flag) = flag else {
                            tracing::debug!("probe worker for {} found entry gone", endpoint);
                            return;
                        };

                        flag.store(probe.check(&endpoint).await, Ordering::Release);
                        ticker.reset();
                    }
                }
            }
        });
    }
}
