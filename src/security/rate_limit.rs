use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

const MIN_INTERVAL: Duration = Duration::from_millis(500);
const ACTIVITY_TTL: Duration = Duration::from_secs(600);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);
const MAX_TRACKED_KEYS: usize = 5000;

#[derive(Debug, Default)]
struct ThrottleState {
    last_seen: HashMap<String, Instant>,
    order: VecDeque<String>,
    last_cleanup: Option<Instant>,
}

/// Minimum-interval throttle keyed by caller identity. A second action
/// inside the window is dropped, not queued; the caller decides whether the
/// drop is silent (bot updates) or reported.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    ttl: Duration,
    cleanup_interval: Duration,
    max_tracked: usize,
    inner: Arc<Mutex<ThrottleState>>,
}

impl Throttle {
    pub fn new() -> Self {
        Self::with_config(MIN_INTERVAL, ACTIVITY_TTL, CLEANUP_INTERVAL, MAX_TRACKED_KEYS)
    }

    pub fn with_config(
        min_interval: Duration,
        ttl: Duration,
        cleanup_interval: Duration,
        max_tracked: usize,
    ) -> Self {
        Self {
            min_interval,
            ttl,
            cleanup_interval,
            max_tracked,
            inner: Arc::new(Mutex::new(ThrottleState::default())),
        }
    }

    /// Returns true when the action is admitted and records it; false means
    /// the caller must drop the request.
    pub async fn admit(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut state = self.inner.lock().await;
        self.prune(&mut state, now);

        if let Some(&last) = state.last_seen.get(key) {
            if now.duration_since(last) < self.min_interval {
                return false;
            }
        }
        // The lock spans check and record; no await in between.
        let fresh = state.last_seen.insert(key.to_string(), now).is_none();
        if fresh {
            state.order.push_back(key.to_string());
        }
        true
    }

    // Same two-stage sweep as the replay guard: inactivity TTL first, then
    // the key cap, oldest-inserted first.
    fn prune(&self, state: &mut ThrottleState, now: Instant) {
        if let Some(last) = state.last_cleanup {
            if now.duration_since(last) < self.cleanup_interval {
                return;
            }
        }
        state.last_cleanup = Some(now);

        let ttl = self.ttl;
        let ThrottleState {
            last_seen, order, ..
        } = &mut *state;
        last_seen.retain(|_, seen_at| now.duration_since(*seen_at) <= ttl);
        order.retain(|key| last_seen.contains_key(key));

        while state.last_seen.len() > self.max_tracked {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.last_seen.remove(&oldest);
        }
    }
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}

/// Sliding-window counting limiter for HTTP callers; exceeding the limit
/// yields an explicit 429 upstream.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    limit: usize,
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new_per_minute(limit: usize) -> Self {
        Self::with_window(Duration::from_secs(60), limit)
    }

    pub fn with_window(window: Duration, limit: usize) -> Self {
        Self {
            window,
            limit,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut map = self.inner.lock().await;
        let deque = map.entry(key.to_string()).or_default();
        // purge old
        while let Some(&front) = deque.front() {
            if now.duration_since(front) > self.window {
                deque.pop_front();
            } else {
                break;
            }
        }
        if deque.len() < self.limit {
            deque.push_back(now);
            true
        } else {
            debug!(key, "rate limit window exhausted");
            false
        }
    }
}
