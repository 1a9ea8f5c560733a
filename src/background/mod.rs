//! Background tasks: periodic housekeeping for the in-memory stores.
//!
//! Expired cache entries and idle rate-limit windows are only dropped lazily
//! on access. The [`Sweeper`] runs a Tokio interval task that purges them so
//! keys nobody asks for again do not linger for the life of the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// A store with dead entries that can be purged.
pub trait Sweep: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &'static str;

    /// Purges dead entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

/// Periodically sweeps a set of stores.
///
/// # Examples
///
/// ```rust,no_run
/// use std::{sync::Arc, time::Duration};
/// use tridivya_edge::background::Sweeper;
/// use tridivya_edge::cache::ResponseCache;
/// use tridivya_edge::security::RateLimiter;
///
/// # async fn example() {
/// let cache = Arc::new(ResponseCache::default());
/// let limiter = Arc::new(RateLimiter::default());
///
/// let handle = Sweeper::new(Duration::from_secs(30))
///     .track(cache)
///     .track(limiter)
///     .spawn();
///
/// handle.shutdown().await;
/// # }
/// ```
pub struct Sweeper {
    interval: Duration,
    stores: Vec<Arc<dyn Sweep>>,
}

impl Sweeper {
    /// Creates a sweeper ticking every `interval` (at least one millisecond).
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            stores: Vec::new(),
        }
    }

    /// Adds a store to sweep on every tick.
    ///
    /// # Arguments
    ///
    /// - `store`: a shared [`Sweep`] implementor, typically the same `Arc`
    ///   the middleware holds.
    #[must_use]
    pub fn track<S>(mut self, store: Arc<S>) -> Self
    where
        S: Sweep + 'static,
    {
        self.stores.push(store);
        self
    }

    /// Sweeps every tracked store once. Returns the total number of entries removed.
    pub fn run_once(&self) -> usize {
        self.stores
            .iter()
            .map(|store| {
                let removed = store.sweep();
                if removed > 0 {
                    tracing::debug!(store = store.name(), removed, "swept expired entries");
                }
                removed
            })
            .sum()
    }

    /// Starts the sweep loop on the current Tokio runtime.
    ///
    /// The first sweep happens one full interval after spawning.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        self.run_once();
                    }
                }
            }
            tracing::debug!("sweeper stopped");
        });

        SweeperHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Handle to a running [`Sweeper`] task.
pub struct SweeperHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stops the loop and waits for the task to finish.
    pub async fn shutdown(self) {
        // Err means the task already exited
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "sweeper task ended abnormally");
        }
    }
}
