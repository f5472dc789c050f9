//! Fixed-window request admission keyed by client identity.
//!
//! State lives in a [`QuotaStore`] handed to [`QuotaGate::new`], so tests run
//! without process globals and a shared external store can be dropped in
//! when the service runs as more than one process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use repoviz_shared::{QuotaConfig, RepoVizError, Result};

/// Number of tracked identities above which the in-memory store sweeps
/// expired records before inserting a new one.
const DEFAULT_SWEEP_THRESHOLD: usize = 10_000;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Per-identity window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaRecord {
    pub count: u32,
    pub window_start: Instant,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Request admitted; `count` is the number used in the current window.
    Allowed { count: u32 },
    /// Allowance exhausted; the window resets after `retry_after`.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Fixed limits for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl From<&QuotaConfig> for QuotaPolicy {
    fn from(config: &QuotaConfig) -> Self {
        Self {
            limit: config.limit,
            window: config.window(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Backing storage for quota records.
///
/// `check_and_increment` must be atomic per identity: two concurrent calls
/// for the same identity can never both observe `count == limit - 1`.
pub trait QuotaStore: Send + Sync {
    fn check_and_increment(&self, identity: &str, now: Instant, policy: QuotaPolicy) -> Admission;

    /// Drop records whose window ended before `now`. Returns how many were removed.
    fn sweep(&self, now: Instant, window: Duration) -> usize;
}

/// Process-local store guarded by one mutex.
#[derive(Debug)]
pub struct MemoryQuotaStore {
    records: Mutex<HashMap<String, QuotaRecord>>,
    sweep_threshold: usize,
}

impl MemoryQuotaStore {
    pub fn new() -> Self {
        Self::with_sweep_threshold(DEFAULT_SWEEP_THRESHOLD)
    }

    pub fn with_sweep_threshold(sweep_threshold: usize) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            sweep_threshold,
        }
    }

    /// Number of identities currently tracked.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, QuotaRecord>> {
        // A panic while holding the lock cannot leave a record half-written.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryQuotaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaStore for MemoryQuotaStore {
    fn check_and_increment(&self, identity: &str, now: Instant, policy: QuotaPolicy) -> Admission {
        let mut records = self.lock();

        if !records.contains_key(identity) && records.len() >= self.sweep_threshold {
            let before = records.len();
            records.retain(|_, r| !window_elapsed(r, now, policy.window));
            debug!(removed = before - records.len(), "swept expired quota records");
        }

        match records.get_mut(identity) {
            Some(record) if !window_elapsed(record, now, policy.window) => {
                if record.count < policy.limit {
                    record.count += 1;
                    Admission::Allowed {
                        count: record.count,
                    }
                } else {
                    Admission::Rejected {
                        retry_after: remaining(record, now, policy.window),
                    }
                }
            }
            _ if policy.limit == 0 => Admission::Rejected {
                retry_after: policy.window,
            },
            _ => {
                records.insert(
                    identity.to_string(),
                    QuotaRecord {
                        count: 1,
                        window_start: now,
                    },
                );
                Admission::Allowed { count: 1 }
            }
        }
    }

    fn sweep(&self, now: Instant, window: Duration) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|_, r| !window_elapsed(r, now, window));
        before - records.len()
    }
}

// Measured from `window_start` so huge windows never overflow `Instant`.
fn window_elapsed(record: &QuotaRecord, now: Instant, window: Duration) -> bool {
    now.saturating_duration_since(record.window_start) >= window
}

fn remaining(record: &QuotaRecord, now: Instant, window: Duration) -> Duration {
    window.saturating_sub(now.saturating_duration_since(record.window_start))
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Admission control in front of the pipeline.
pub struct QuotaGate {
    store: Box<dyn QuotaStore>,
    policy: QuotaPolicy,
}

impl QuotaGate {
    pub fn new(store: Box<dyn QuotaStore>, policy: QuotaPolicy) -> Self {
        Self { store, policy }
    }

    /// Gate backed by a fresh in-memory store.
    pub fn in_memory(policy: QuotaPolicy) -> Self {
        Self::new(Box::new(MemoryQuotaStore::new()), policy)
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.policy
    }

    /// Check and consume one request for `identity` at the current time.
    pub fn admit(&self, identity: &str) -> Admission {
        self.admit_at(identity, Instant::now())
    }

    /// Check and consume one request for `identity` at `now`.
    pub fn admit_at(&self, identity: &str, now: Instant) -> Admission {
        let admission = self.store.check_and_increment(identity, now, self.policy);
        match admission {
            Admission::Allowed { count } => {
                debug!(identity, count, limit = self.policy.limit, "request admitted");
            }
            Admission::Rejected { retry_after } => {
                warn!(
                    identity,
                    retry_after_secs = retry_after.as_secs(),
                    "request rejected by quota"
                );
            }
        }
        admission
    }

    /// Like [`admit`](Self::admit), but maps a rejection to [`RepoVizError::QuotaExceeded`].
    pub fn require(&self, identity: &str) -> Result<()> {
        match self.admit(identity) {
            Admission::Allowed { .. } => Ok(()),
            Admission::Rejected { retry_after } => Err(RepoVizError::QuotaExceeded {
                identity: identity.to_string(),
                // Round up so clients never retry a moment too early.
                retry_after_secs: retry_after
                    .as_secs()
                    .saturating_add(u64::from(retry_after.subsec_nanos() > 0)),
            }),
        }
    }

    /// Drop records whose window has ended.
    pub fn sweep(&self) -> usize {
        self.store.sweep(Instant::now(), self.policy.window)
    }
}
