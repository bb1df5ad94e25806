//! A cache of compiled plans, keyed by the SHA-256 of the operation text.

use std::fmt;
use std::fmt::Display;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

use crate::compiler::compile_with_config;
use crate::configuration;
use crate::configuration::Configuration;
use crate::configuration::ConfigurationError;
use crate::error::CompileError;
use crate::plan::Plan;
use crate::schema::Schema;

/// Hash of the operation text a plan was compiled from.
///
/// Textually different operations get different hashes, even when they are equivalent.
#[derive(Clone, Hash, PartialEq, Eq, Deserialize, Serialize)]
pub(crate) struct QueryHash(#[serde(with = "hex")] Vec<u8>);

impl QueryHash {
    pub(crate) fn new(query: &str, operation_name: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(query);
        if let Some(operation_name) = operation_name {
            // byte separator between each part that is hashed
            hasher.update([0xFF]);
            hasher.update(operation_name);
        }
        Self(hasher.finalize().as_slice().into())
    }
}

impl fmt::Debug for QueryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueryHash")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl Display for QueryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

struct CacheEntry {
    plan: Arc<Plan>,
    inserted_at: Instant,
}

struct Inner {
    entries: LruCache<QueryHash, CacheEntry>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Compiled plans for one schema.
///
/// Lookups promote the entry they hit; inserting over capacity evicts the least recently used
/// plan. Plans older than the configured TTL are recompiled on their next lookup.
///
/// Safe for concurrent use. Compilation happens outside the lock, so concurrent misses for
/// the same operation may each compile it; the last one wins.
pub struct PlanCache {
    schema: Schema,
    execution: configuration::Execution,
    ttl: Option<Duration>,
    inner: Mutex<Inner>,
}

static_assertions::assert_impl_all!(PlanCache: Send, Sync);

impl PlanCache {
    pub fn new(schema: Schema, configuration: &Configuration) -> Self {
        let entries = match configuration.cache.capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self {
            schema,
            execution: configuration.execution.clone(),
            ttl: configuration.cache.ttl,
            inner: Mutex::new(Inner {
                entries,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// A cache holding at most `capacity` plans (`None` for no bound), each usable for `ttl`
    /// (`None` for no expiry).
    ///
    /// A capacity or TTL of zero is rejected.
    pub fn with_capacity_and_ttl(
        schema: Schema,
        capacity: Option<usize>,
        ttl: Option<Duration>,
    ) -> Result<Self, ConfigurationError> {
        let cache = match capacity {
            Some(capacity) => {
                let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
                    ConfigurationError::InvalidConfiguration {
                        message: "cache.capacity",
                        error: "must be greater than zero, leave it unset for no bound"
                            .to_string(),
                    }
                })?;
                configuration::Cache::builder()
                    .capacity(capacity)
                    .and_ttl(ttl)
                    .build()
            }
            None => configuration::Cache::unbounded(ttl),
        };
        let configuration = Configuration::builder().cache(cache).build();
        configuration.validate()?;
        Ok(Self::new(schema, &configuration))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the plan of the first operation in `query`, compiling it on a miss.
    pub fn get_or_compile(&self, query: &str) -> Result<Arc<Plan>, CompileError> {
        self.get_or_compile_operation(query, None)
    }

    /// Returns the plan of the operation named `operation_name` in `query`, compiling it on a
    /// miss. Compilation errors are not cached.
    pub fn get_or_compile_operation(
        &self,
        query: &str,
        operation_name: Option<&str>,
    ) -> Result<Arc<Plan>, CompileError> {
        let key = QueryHash::new(query, operation_name);
        if let Some(plan) = self.lookup(&key) {
            return Ok(plan);
        }

        let plan = Arc::new(compile_with_config(
            &self.schema,
            query,
            operation_name,
            &self.execution,
        )?);
        self.insert(key, plan.clone());
        Ok(plan)
    }

    fn lookup(&self, key: &QueryHash) -> Option<Arc<Plan>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let expired = match inner.entries.get(key) {
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() >= ttl),
            None => {
                inner.misses += 1;
                tracing::info!(
                    monotonic_counter.graphql_jit.plan_cache.misses = 1u64,
                    kind = "missing"
                );
                return None;
            }
        };
        if expired {
            inner.entries.pop(key);
            inner.misses += 1;
            tracing::info!(
                monotonic_counter.graphql_jit.plan_cache.misses = 1u64,
                kind = "expired"
            );
            tracing::debug!(query_hash = %key, "plan expired");
            return None;
        }
        inner.hits += 1;
        tracing::info!(monotonic_counter.graphql_jit.plan_cache.hits = 1u64);
        inner.entries.peek(key).map(|entry| entry.plan.clone())
    }

    fn insert(&self, key: QueryHash, plan: Arc<Plan>) {
        let mut inner = self.inner.lock();
        let entry = CacheEntry {
            plan,
            inserted_at: Instant::now(),
        };
        if let Some((evicted, _)) = inner.entries.push(key.clone(), entry) {
            // `push` also hands back the previous entry when the key was already present
            if evicted != key {
                inner.evictions += 1;
                tracing::info!(monotonic_counter.graphql_jit.plan_cache.evictions = 1u64);
                tracing::debug!(query_hash = %evicted, "evicted plan");
            }
        }
    }

    /// Removes every plan and resets the counters.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        tracing::debug!("plan cache cleared");
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            capacity: self.capacity(&inner),
            ttl: self.ttl,
            // least recently used first
            keys: inner
                .entries
                .iter()
                .rev()
                .map(|(key, _)| key.to_string())
                .collect(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
        }
    }

    fn capacity(&self, inner: &Inner) -> Option<usize> {
        // An unbounded LruCache reports `usize::MAX`
        let capacity = inner.entries.cap().get();
        (capacity != usize::MAX).then_some(capacity)
    }
}

impl fmt::Debug for PlanCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanCache")
            .field("stats", &self.stats())
            .finish()
    }
}

/// A snapshot of the state of a [`PlanCache`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    /// `None` for an unbounded cache.
    pub capacity: Option<usize>,
    #[serde(with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// Hex encoded query hashes, least recently used first.
    pub keys: Vec<String>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    /// Returns true when the cache holds the plan for `query`.
    pub fn contains(&self, query: &str) -> bool {
        let key = QueryHash::new(query, None).to_string();
        self.keys.contains(&key)
    }
}
