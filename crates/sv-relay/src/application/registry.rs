//! Registry of streamers waiting for a viewer.
//!
//! A streamer that sends `REGISTER_STREAMER` gets a fresh 10-character code
//! and an entry here. A viewer that sends `FIND_STREAMER(code)` claims the
//! entry, which removes it: every code pairs at most once. Entries nobody
//! claims within `client_timeout` are evicted by a background task, and
//! dropping an evicted owner is what closes the streamer's connection.
//!
//! ```text
//!   register(owner) ──▶ "aZ3k9QpL0x" ──▶ entries
//!                                          │
//!        claim("aZ3k9QpL0x") ◀─────────────┤  (exactly one caller gets Some)
//!                                          │
//!   eviction task, every check_interval ───┘  drop owners older than timeout
//! ```
//!
//! The registry is generic over the owner type so its bookkeeping can be
//! tested without sockets; the relay stores a
//! [`StreamerHandle`](crate::application::pairing::StreamerHandle).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use sv_core::generate_session_code;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Smallest interval the eviction task will tick at. A configured interval of
/// zero is raised to this value.
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Timing settings for eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    /// How long an unclaimed entry may wait before it is evicted.
    pub client_timeout: Duration,
    /// How often the eviction task scans the entries.
    pub check_interval: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            client_timeout: Duration::from_secs(120),
            check_interval: Duration::from_secs(1),
        }
    }
}

struct PendingStreamer<H> {
    owner: H,
    created_at: Instant,
    profile: Option<String>,
}

type Entries<H> = Mutex<HashMap<String, PendingStreamer<H>>>;

struct Cleaner {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Cleaner {
    fn stop(self) {
        let _ = self.stop.send(true);
        self.task.abort();
    }
}

/// Code → waiting owner map with timed eviction.
pub struct SessionRegistry<H> {
    entries: Arc<Entries<H>>,
    config: RegistryConfig,
    cleaner: Mutex<Option<Cleaner>>,
}

impl<H> SessionRegistry<H>
where
    H: Send + 'static,
{
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            config,
            cleaner: Mutex::new(None),
        }
    }

    pub fn config(&self) -> RegistryConfig {
        self.config
    }

    /// Starts the background eviction task on the current tokio runtime.
    ///
    /// Calling it again while the task is running does nothing. The task
    /// stops on [`reset`](Self::reset) or when the registry is dropped.
    pub fn start_eviction(&self) {
        let mut cleaner = self.cleaner.lock().unwrap_or_else(PoisonError::into_inner);
        if cleaner.is_some() {
            return;
        }

        let (stop, mut stop_rx) = watch::channel(false);
        let entries = Arc::downgrade(&self.entries);
        let timeout = self.config.client_timeout;
        let period = self.config.check_interval.max(MIN_CHECK_INTERVAL);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(live) = entries.upgrade() else { break };
                        evict_older_than(&live, timeout);
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("session eviction task stopped");
        });

        debug!(
            "session eviction every {period:?}, timeout {:?}",
            self.config.client_timeout
        );
        *cleaner = Some(Cleaner { stop, task });
    }

    /// Stores `owner` under a new unique code and returns the code.
    pub fn register(&self, owner: H, profile: Option<String>) -> String {
        let mut rng = rand::rng();
        let mut entries = self.lock_entries();
        let code = loop {
            let candidate = generate_session_code(&mut rng);
            if !entries.contains_key(&candidate) {
                break candidate;
            }
        };
        entries.insert(
            code.clone(),
            PendingStreamer {
                owner,
                created_at: Instant::now(),
                profile,
            },
        );
        code
    }

    /// Removes the entry for `code` and hands its owner to the caller.
    ///
    /// Returns `None` if the code is unknown, already claimed, or evicted.
    pub fn claim(&self, code: &str) -> Option<H> {
        let pending = self.lock_entries().remove(code)?;
        debug!(
            "claimed {code} (profile {:?}) after {:?}",
            pending.profile,
            pending.created_at.elapsed()
        );
        Some(pending.owner)
    }

    /// One eviction sweep on the caller's thread. Returns how many entries
    /// were removed.
    #[cfg(test)]
    fn evict_expired(&self) -> usize {
        evict_older_than(&self.entries, self.config.client_timeout)
    }

    /// Number of entries waiting to be claimed.
    pub fn count(&self) -> usize {
        self.lock_entries().len()
    }

    /// Stops the eviction task and drops every entry.
    pub fn reset(&self) {
        self.stop_eviction();
        let drained: Vec<_> = self.lock_entries().drain().collect();
        if !drained.is_empty() {
            info!("dropping {} waiting streamer(s)", drained.len());
        }
    }

    fn stop_eviction(&self) {
        let cleaner = self
            .cleaner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cleaner) = cleaner {
            cleaner.stop();
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, PendingStreamer<H>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H> Drop for SessionRegistry<H> {
    fn drop(&mut self) {
        let cleaner = self
            .cleaner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cleaner) = cleaner {
            cleaner.stop();
        }
    }
}

fn evict_older_than<H>(entries: &Entries<H>, timeout: Duration) -> usize {
    let expired: Vec<(String, PendingStreamer<H>)> = {
        let mut entries = entries.lock().unwrap_or_else(PoisonError::into_inner);
        let codes: Vec<String> = entries
            .iter()
            .filter(|(_, pending)| pending.created_at.elapsed() > timeout)
            .map(|(code, _)| code.clone())
            .collect();
        codes
            .into_iter()
            .filter_map(|code| entries.remove_entry(&code))
            .collect()
    };

    // Owners are dropped here, after the lock is released.
    for (code, pending) in &expired {
        info!(
            "terminating streamer with code {code} (profile {:?})",
            pending.profile
        );
    }
    expired.len()
}
