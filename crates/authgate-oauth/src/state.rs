//! Flow state tracking.
//!
//! One [`FlowState`] exists per outstanding authorization request, keyed by
//! the `state` parameter minted on the initial redirect. The store is the
//! CSRF/replay guard: a callback is only honored while its `state` is live,
//! and [`FlowStateStore::consume`] hands the entry to exactly one caller.

use crate::errors::{OAuthError, Result};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default lifetime of a flow before the sweeper removes it.
pub const DEFAULT_FLOW_TTL: Duration = Duration::from_secs(600);

/// How often the background sweeper runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

const SHARD_COUNT: usize = 16;

/// One outstanding authorization flow.
#[derive(Debug, Clone)]
pub struct FlowState {
    /// Random identifier binding redirect and callback
    pub state: String,
    /// Replay-protection nonce; `None` when nonce is disabled
    pub nonce: Option<String>,
    /// Authorization code once the callback delivered it
    pub code: Option<String>,
    /// Monotonic creation time
    pub created_at: Instant,
}

impl FlowState {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.duration_since(self.created_at) >= ttl
    }
}

/// Sharded in-memory store of live flows.
///
/// Shards are selected by `state` hash so concurrent flows do not contend on
/// one lock. Expired entries are unreachable: every lookup checks the TTL and
/// purges on the spot, so the sweeper only bounds memory, never correctness.
#[derive(Clone)]
pub struct FlowStateStore {
    shards: Arc<Vec<RwLock<HashMap<String, FlowState>>>>,
    ttl: Duration,
}

impl Default for FlowStateStore {
    fn default() -> Self {
        Self::new(DEFAULT_FLOW_TTL)
    }
}

impl FlowStateStore {
    /// Create a store with the given flow TTL.
    pub fn new(ttl: Duration) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards: Arc::new(shards),
            ttl,
        }
    }

    fn shard(&self, state: &str) -> &RwLock<HashMap<String, FlowState>> {
        let mut hasher = DefaultHasher::new();
        state.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARD_COUNT]
    }

    /// Register a fresh flow. Fails if the `state` is already live.
    pub async fn add(&self, state: &str, nonce: Option<String>) -> Result<()> {
        let mut shard = self.shard(state).write().await;
        let now = Instant::now();
        if let Some(existing) = shard.get(state) {
            if !existing.is_expired(now, self.ttl) {
                return Err(OAuthError::FlowStateConflict);
            }
        }
        shard.insert(
            state.to_string(),
            FlowState {
                state: state.to_string(),
                nonce,
                code: None,
                created_at: now,
            },
        );
        Ok(())
    }

    /// Attach the authorization code delivered by the callback.
    ///
    /// Re-delivery of the same code is a no-op so browser-retried callbacks
    /// stay idempotent; a conflicting code is rejected.
    pub async fn add_code(&self, state: &str, code: &str) -> Result<()> {
        let mut shard = self.shard(state).write().await;
        let now = Instant::now();
        match shard.get_mut(state) {
            Some(entry) if entry.is_expired(now, self.ttl) => {
                shard.remove(state);
                Err(OAuthError::AuthorizationStateNotFound)
            }
            Some(entry) => match &entry.code {
                None => {
                    entry.code = Some(code.to_string());
                    Ok(())
                }
                Some(existing) if existing == code => Ok(()),
                Some(_) => Err(OAuthError::AuthorizationCodeConflict),
            },
            None => Err(OAuthError::AuthorizationStateNotFound),
        }
    }

    /// Whether the `state` is live.
    pub async fn exists(&self, state: &str) -> bool {
        let shard = self.shard(state).read().await;
        shard
            .get(state)
            .map(|entry| !entry.is_expired(Instant::now(), self.ttl))
            .unwrap_or(false)
    }

    /// Nonce registered for a live `state`, without consuming the flow.
    ///
    /// The outer `Option` distinguishes an unknown state from a flow that was
    /// minted with the nonce disabled.
    pub async fn nonce_for(&self, state: &str) -> Option<Option<String>> {
        let shard = self.shard(state).read().await;
        shard
            .get(state)
            .filter(|entry| !entry.is_expired(Instant::now(), self.ttl))
            .map(|entry| entry.nonce.clone())
    }

    /// Atomically remove and return the flow.
    ///
    /// Exactly one of any number of concurrent callers gets the entry; the
    /// rest see `None`.
    pub async fn consume(&self, state: &str) -> Option<FlowState> {
        let mut shard = self.shard(state).write().await;
        let entry = shard.remove(state)?;
        if entry.is_expired(Instant::now(), self.ttl) {
            return None;
        }
        Some(entry)
    }

    /// Remove entries older than the TTL. Returns how many were purged.
    pub async fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.write().await;
            let before = shard.len();
            shard.retain(|_, entry| !entry.is_expired(now, self.ttl));
            removed += before - shard.len();
        }
        removed
    }

    /// Number of live entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in self.shards.iter() {
            total += shard.read().await.len();
        }
        total
    }

    /// Whether the store holds no entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Start the background sweeper. The task runs until the handle is
    /// aborted or the runtime shuts down.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.sweep(Instant::now()).await;
                if removed > 0 {
                    debug!(removed, "swept expired authorization flows");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_exists() {
        let store = FlowStateStore::default();

        store.add("s1", Some("n1".to_string())).await.unwrap();

        assert!(store.exists("s1").await);
        assert!(!store.exists("s2").await);
        assert_eq!(store.nonce_for("s1").await, Some(Some("n1".to_string())));
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_state() {
        let store = FlowStateStore::default();

        store.add("s1", None).await.unwrap();
        let err = store.add("s1", None).await.unwrap_err();

        assert_eq!(err.kind(), "flow_state_conflict");
    }

    #[tokio::test]
    async fn test_add_code_is_idempotent_for_same_code() {
        let store = FlowStateStore::default();
        store.add("s1", Some("n1".to_string())).await.unwrap();

        store.add_code("s1", "abc").await.unwrap();
        store.add_code("s1", "abc").await.unwrap();

        let err = store.add_code("s1", "other").await.unwrap_err();
        assert_eq!(err.kind(), "authorization_code_conflict");
    }

    #[tokio::test]
    async fn test_add_code_unknown_state() {
        let store = FlowStateStore::default();

        let err = store.add_code("missing", "abc").await.unwrap_err();

        assert_eq!(err.kind(), "authorization_state_not_found");
    }

    #[tokio::test]
    async fn test_consume_removes_entry() {
        let store = FlowStateStore::default();
        store.add("s1", Some("n1".to_string())).await.unwrap();
        store.add_code("s1", "abc").await.unwrap();

        let flow = store.consume("s1").await.unwrap();

        assert_eq!(flow.nonce.as_deref(), Some("n1"));
        assert_eq!(flow.code.as_deref(), Some("abc"));
        assert!(!store.exists("s1").await);
        assert!(store.consume("s1").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_consume_yields_one_winner() {
        let store = FlowStateStore::default();
        store.add("s1", Some("n1".to_string())).await.unwrap();

        let a = {
            let store = store.clone();
            tokio::spawn(async move { store.consume("s1").await })
        };
        let b = {
            let store = store.clone();
            tokio::spawn(async move { store.consume("s1").await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let winners = results.iter().filter(|r| r.is_some()).count();

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_unreachable() {
        let store = FlowStateStore::new(Duration::from_millis(0));

        store.add("s1", Some("n1".to_string())).await.unwrap();

        assert!(!store.exists("s1").await);
        assert!(store.nonce_for("s1").await.is_none());
        assert!(store.consume("s1").await.is_none());
        assert!(store.add_code("s1", "abc").await.is_err());
    }

    #[tokio::test]
    async fn test_sweep_purges_expired_entries() {
        let store = FlowStateStore::new(Duration::from_secs(60));
        store.add("s1", None).await.unwrap();
        store.add("s2", None).await.unwrap();

        assert_eq!(store.sweep(Instant::now()).await, 0);
        assert_eq!(store.len().await, 2);

        // Pretend an hour passed for the sweep clock only.
        let removed = store
            .sweep(Instant::now() + Duration::from_secs(3600))
            .await;

        assert_eq!(removed, 2);
        assert!(store.is_empty().await);
    }
}
