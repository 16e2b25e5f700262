//! In-memory TTL caches for protocol state that never touches the database:
//! outstanding authorization codes and in-flight federated login state.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone)]
pub struct CacheEntry<T> {
    data: T,
    expires_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }

    pub fn data(&self) -> &T {
        &self.data
    }
}

/// Process-local TTL cache.
///
/// Every entry shares the TTL fixed at construction. `get` deliberately does
/// not check expiry: expired entries are removed by `sweep_expired`, which a
/// periodic task invokes out of band. A read racing the sweep can therefore
/// observe an entry slightly past its TTL; callers that care validate the
/// entry themselves.
#[derive(Clone)]
pub struct TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    entries: Arc<DashMap<K, CacheEntry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn put(&self, key: K, value: V) {
        self.entries.insert(key, CacheEntry::new(value, self.ttl));
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.data().clone())
    }

    /// Remove a consumed entry. Returns the value if it was present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, entry)| entry.data)
    }

    /// Drop every entry past its TTL. Invoked periodically from `main`.
    pub fn sweep_expired(&self) {
        self.entries.retain(|_, entry| !entry.is_expired());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Metadata an authorization code is bound to at issuance and that the token
/// endpoint validates at exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthzCode {
    pub client_id: String,
    pub user_id: String,
    pub scopes: Vec<String>,
    pub browser: Option<String>,
    pub os: Option<String>,
}

/// State parked between a federated login redirect and its callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederationState {
    pub state: String,
    pub return_to: String,
}

pub type AuthzCodeCache = TtlCache<String, AuthzCode>;
pub type FederationStateCache = TtlCache<String, FederationState>;

impl Default for AuthzCodeCache {
    fn default() -> Self {
        // Codes are exchanged within seconds; five minutes is generous.
        Self::new(Duration::from_secs(300))
    }
}

impl Default for FederationStateCache {
    fn default() -> Self {
        // Long enough to complete a provider consent screen.
        Self::new(Duration::from_secs(600))
    }
}
