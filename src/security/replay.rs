use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::errors::{AppError, AppResult};

const INIT_DATA_TTL: Duration = Duration::from_secs(300);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const MAX_ENTRIES: usize = 25_000;

#[derive(Debug, Default)]
struct ReplayState {
    seen: HashMap<String, Instant>,
    // Insertion order for the size cap; stale keys are skipped when popped.
    order: VecDeque<String>,
    last_cleanup: Option<Instant>,
}

/// Tracks consumed init-data payloads so a signed payload is accepted at most
/// once within its TTL window. In-memory only; a restart clears the history,
/// which is safe because the payload age limit still bounds exposure.
#[derive(Debug, Clone)]
pub struct ReplayGuard {
    ttl: Duration,
    cleanup_interval: Duration,
    max_entries: usize,
    inner: Arc<Mutex<ReplayState>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::with_config(INIT_DATA_TTL, CLEANUP_INTERVAL, MAX_ENTRIES)
    }

    pub fn with_config(ttl: Duration, cleanup_interval: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            cleanup_interval,
            max_entries,
            inner: Arc::new(Mutex::new(ReplayState::default())),
        }
    }

    /// Record `(user_id, hash)` as consumed, failing if the pair was already
    /// consumed within the TTL. An empty hash is a no-op success; the
    /// verifier rejects those before calling here.
    pub async fn consume(&self, user_id: i64, hash: &str) -> AppResult<()> {
        if hash.is_empty() {
            return Ok(());
        }
        let now = Instant::now();
        let mut state = self.inner.lock().await;
        self.prune(&mut state, now);

        let key = format!("{user_id}:{hash}");
        if let Some(&seen_at) = state.seen.get(&key) {
            if now.duration_since(seen_at) < self.ttl {
                return Err(AppError::Forbidden(
                    "init data has already been used, request a new session".into(),
                ));
            }
        }
        // The lock spans check and record; no await in between.
        state.seen.insert(key.clone(), now);
        state.order.push_back(key);
        Ok(())
    }

    /// Two-stage eviction: expire by TTL first, then trim oldest-inserted
    /// entries past the cap. Gated by a cooldown so a request burst does not
    /// turn every lookup into a full sweep.
    fn prune(&self, state: &mut ReplayState, now: Instant) {
        if let Some(last) = state.last_cleanup {
            if now.duration_since(last) < self.cleanup_interval {
                return;
            }
        }
        state.last_cleanup = Some(now);

        let ttl = self.ttl;
        let before = state.seen.len();
        let ReplayState { seen, order, .. } = &mut *state;
        seen.retain(|_, seen_at| now.duration_since(*seen_at) <= ttl);
        order.retain(|key| seen.contains_key(key));

        while state.seen.len() > self.max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.seen.remove(&oldest);
        }

        let removed = before.saturating_sub(state.seen.len());
        if removed > 0 {
            debug!(removed, "pruned replay guard entries");
        }
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_consume_of_the_same_pair_fails() {
        let guard = ReplayGuard::new();
        guard.consume(42, "h1").await.unwrap();
        let err = guard.consume(42, "h1").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn distinct_users_with_the_same_hash_both_pass() {
        let guard = ReplayGuard::new();
        guard.consume(42, "h1").await.unwrap();
        guard.consume(43, "h1").await.unwrap();
    }

    #[tokio::test]
    async fn empty_hash_is_a_no_op() {
        let guard = ReplayGuard::new();
        guard.consume(42, "").await.unwrap();
        guard.consume(42, "").await.unwrap();
    }

    #[tokio::test]
    async fn expired_entries_are_readmitted() {
        let guard =
            ReplayGuard::with_config(Duration::from_millis(40), Duration::ZERO, MAX_ENTRIES);
        guard.consume(42, "h1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        guard.consume(42, "h1").await.unwrap();
    }

    #[tokio::test]
    async fn size_cap_evicts_oldest_entries_first() {
        let guard = ReplayGuard::with_config(Duration::from_secs(60), Duration::ZERO, 2);
        guard.consume(1, "h").await.unwrap();
        guard.consume(2, "h").await.unwrap();
        guard.consume(3, "h").await.unwrap();
        // The oldest pair was evicted by the cap, so it is accepted again;
        // the most recent pair is still tracked.
        guard.consume(1, "h").await.unwrap();
        let err = guard.consume(3, "h").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }
}
