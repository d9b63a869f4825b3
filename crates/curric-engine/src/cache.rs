//! Cache store backends.
//!
//! Three implementations of [`CacheStore`]:
//! - [`RedisCache`]: shared Redis through a `ConnectionManager`
//! - [`MemoryCache`]: in-process LRU with per-entry expiry
//! - [`DisabledCache`]: every read misses, every write is dropped
//!
//! Backends report failures as errors; [`crate::reads::CachedReads`] logs them
//! and falls through to the relational store.
//!
//! ## Configuration
//!
//! - `REDIS_ENABLED`: set to "false" to run without a cache (default: true)
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379)

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use curric_core::{
    defaults, CacheStore, CurriculumConfig, CurriculumType, Error, Result, TagId, TagType,
};

/// Cache key builders. Every cached value lives under one of these prefixes.
pub mod keys {
    use super::{CurriculumType, TagId, TagType};

    pub const TAG_PREFIX: &str = "curriculum:tag:";
    pub const PARENT_TAG_MAPPING_PREFIX: &str = "curriculum:parent_tag_mapping:";
    pub const TAG_ORDER_PREFIX: &str = "curriculum:tag_order:";
    pub const GRADE_PRODUCT_PREFIX: &str = "curriculum:grade_product:";
    pub const COUNTRY_PREFIX: &str = "curriculum:country:";
    pub const COUNTRY_ADMIN_PREFIX: &str = "curriculum:country:admin:";
    pub const TAG_LOCALE_MAPPING_PREFIX: &str = "curriculum:tag_locale_mapping:";
    pub const MULTI_GRADE_PREFIX: &str = "curriculum:multi_grade:";

    pub fn tag(id: TagId) -> String {
        format!("{}{}", TAG_PREFIX, id)
    }

    pub fn links(tag_id: TagId) -> String {
        format!("{}{}", PARENT_TAG_MAPPING_PREFIX, tag_id)
    }

    pub fn tag_order(parent_key: &str, tag_type: TagType) -> String {
        format!("{}{}:{}", TAG_ORDER_PREFIX, parent_key, tag_type)
    }

    pub fn grade_product(product_id: &str) -> String {
        format!("{}{}", GRADE_PRODUCT_PREFIX, product_id)
    }

    /// Page of a published listing by (curriculum type, tag type).
    pub fn country(ct: CurriculumType, tag_type: TagType, start: i64, limit: i64) -> String {
        format!("{}{}:{}:{}:{}", COUNTRY_PREFIX, ct, tag_type, start, limit)
    }

    /// Same page including unpublished tags.
    pub fn country_admin(ct: CurriculumType, tag_type: TagType, start: i64, limit: i64) -> String {
        format!("{}{}:{}:{}:{}", COUNTRY_ADMIN_PREFIX, ct, tag_type, start, limit)
    }

    /// Pattern matching every country listing, admin listing included.
    pub fn country_pattern() -> String {
        format!("{}*", COUNTRY_PREFIX)
    }

    pub fn tag_locale(tag_id: TagId, country_id: &str, locale: &str) -> String {
        format!(
            "{}{}:{}:{}",
            TAG_LOCALE_MAPPING_PREFIX, tag_id, country_id, locale
        )
    }

    pub fn multi_grade(country_id: &str, board: Option<TagId>, grade: TagId) -> String {
        match board {
            Some(board) => format!("{}{}:{}:{}", MULTI_GRADE_PREFIX, country_id, board, grade),
            None => format!("{}{}:{}", MULTI_GRADE_PREFIX, country_id, grade),
        }
    }
}

fn cache_error(op: &str, e: impl std::fmt::Display) -> Error {
    warn!(
        subsystem = "cache",
        component = "redis",
        op,
        error = %e,
        "Redis command failed"
    );
    Error::internal(format!("redis{}Error", op))
}

// =============================================================================
// REDIS
// =============================================================================

/// Cache backed by Redis.
#[derive(Clone)]
pub struct RedisCache {
    inner: Arc<RedisCacheInner>,
}

struct RedisCacheInner {
    /// Redis connection manager (None if disabled or unreachable).
    connection: RwLock<Option<ConnectionManager>>,
}

impl RedisCache {
    /// Connect using the process configuration.
    ///
    /// An invalid URL or an unreachable server leaves the cache disconnected;
    /// every call then misses.
    pub async fn from_config(config: &CurriculumConfig) -> Self {
        let connection = if config.redis_enabled {
            Self::connect(&config.redis_url).await
        } else {
            info!(
                subsystem = "cache",
                component = "redis",
                "Redis cache disabled via REDIS_ENABLED=false"
            );
            None
        };

        Self {
            inner: Arc::new(RedisCacheInner {
                connection: RwLock::new(connection),
            }),
        }
    }

    async fn connect(url: &str) -> Option<ConnectionManager> {
        let client = match redis::Client::open(url) {
            Ok(client) => client,
            Err(e) => {
                warn!(
                    subsystem = "cache",
                    component = "redis",
                    error = %e,
                    "Invalid Redis URL, cache disabled"
                );
                return None;
            }
        };
        match ConnectionManager::new(client).await {
            Ok(conn) => {
                info!(
                    subsystem = "cache",
                    component = "redis",
                    url = %url.replace(|c: char| c.is_ascii_alphanumeric(), "*"),
                    "Redis cache connected"
                );
                Some(conn)
            }
            Err(e) => {
                warn!(
                    subsystem = "cache",
                    component = "redis",
                    error = %e,
                    "Failed to connect to Redis, cache disabled"
                );
                None
            }
        }
    }

    /// A cache with no connection.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(RedisCacheInner {
                connection: RwLock::new(None),
            }),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.connection.read().await.is_some()
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        self.inner.connection.read().await.clone()
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(mut conn) = self.connection().await else {
            return Ok(None);
        };
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| cache_error("Get", e))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let Some(mut conn) = self.connection().await else {
            return Ok(vec![None; keys.len()]);
        };
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        redis::cmd("MGET")
            .arg(keys)
            .query_async::<Vec<Option<String>>>(&mut conn)
            .await
            .map_err(|e| cache_error("MGet", e))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let Some(mut conn) = self.connection().await else {
            return Ok(());
        };
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| cache_error("Set", e))?;
        debug!(
            subsystem = "cache",
            component = "redis",
            cache_key = %key,
            ttl_secs,
            "Cache SET"
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let Some(mut conn) = self.connection().await else {
            return Ok(());
        };
        conn.del::<_, ()>(keys)
            .await
            .map_err(|e| cache_error("Delete", e))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let Some(mut conn) = self.connection().await else {
            return Ok(Vec::new());
        };
        redis::cmd("KEYS")
            .arg(pattern)
            .query_async::<Vec<String>>(&mut conn)
            .await
            .map_err(|e| cache_error("Keys", e))
    }
}

// =============================================================================
// IN-PROCESS LRU
// =============================================================================

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process LRU cache with per-entry TTL.
///
/// Clones share the same entries. `fail(true)` makes every call error, which
/// exercises the fall-through path of the cached reads.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Arc<Mutex<LruCache<String, Entry>>>,
    failing: Arc<Mutex<bool>>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new(defaults::MEMORY_CACHE_CAPACITY)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Glob match supporting a single trailing `*`.
fn glob_matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
            failing: Arc::new(Mutex::new(false)),
        }
    }

    pub fn fail(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    fn check(&self, op: &str) -> Result<()> {
        if *lock(&self.failing) {
            return Err(Error::internal(format!("cache{}Error", op)));
        }
        Ok(())
    }

    /// Live (unexpired) entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        lock(&self.entries)
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        lock(&self.entries)
            .peek(key)
            .map_or(false, |e| e.expires_at > Instant::now())
    }

    fn read(&self, key: &str) -> Option<String> {
        let mut entries = lock(&self.entries);
        let expired = match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check("Get")?;
        Ok(self.read(key))
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check("MGet")?;
        Ok(keys.iter().map(|k| self.read(k)).collect())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        self.check("Set")?;
        lock(&self.entries).put(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_secs),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        self.check("Delete")?;
        let mut entries = lock(&self.entries);
        for key in keys {
            entries.pop(key);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check("Keys")?;
        Ok(lock(&self.entries)
            .iter()
            .filter(|(k, _)| glob_matches(pattern, k))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

// =============================================================================
// DISABLED
// =============================================================================

/// Cache that never stores anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

#[async_trait]
impl CacheStore for DisabledCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        Ok(vec![None; keys.len()])
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<()> {
        Ok(())
    }

    async fn del(&self, _keys: &[String]) -> Result<()> {
        Ok(())
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_builders() {
        assert_eq!(keys::tag(42), "curriculum:tag:42");
        assert_eq!(keys::links(42), "curriculum:parent_tag_mapping:42");
        assert_eq!(
            keys::tag_order("1.2.3", TagType::Chapter),
            "curriculum:tag_order:1.2.3:chapter"
        );
        assert_eq!(
            keys::tag_locale(5, "9", "ar"),
            "curriculum:tag_locale_mapping:5:9:ar"
        );
        assert_eq!(keys::multi_grade("9", None, 251), "curriculum:multi_grade:9:251");
        assert_eq!(
            keys::multi_grade("9", Some(20), 251),
            "curriculum:multi_grade:9:20:251"
        );
        assert_eq!(
            keys::country(CurriculumType::Root, TagType::Country, 0, 20),
            "curriculum:country:root:country:0:20"
        );
        assert_eq!(
            keys::country_admin(CurriculumType::Root, TagType::Country, 20, 20),
            "curriculum:country:admin:root:country:20:20"
        );
        assert!(keys::COUNTRY_ADMIN_PREFIX.starts_with(keys::COUNTRY_PREFIX));
        assert_eq!(keys::country_pattern(), "curriculum:country:*");
    }

    #[test]
    fn test_glob_matches() {
        assert!(glob_matches("curriculum:country:*", "curriculum:country:en"));
        assert!(glob_matches("curriculum:country:*", "curriculum:country:admin:"));
        assert!(!glob_matches("curriculum:country:*", "curriculum:tag:1"));
        assert!(glob_matches("exact", "exact"));
        assert!(!glob_matches("exact", "exact2"));
    }

    #[tokio::test]
    async fn test_memory_cache_roundtrip_and_delete() {
        let cache = MemoryCache::new(16);
        cache.set_ex("a", "1", 60).await.unwrap();
        cache.set_ex("b", "2", 60).await.unwrap();

        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));
        let values = cache
            .mget(&["a".to_string(), "missing".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("1".into()), None, Some("2".into())]);

        cache.del(&["a".to_string()]).await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_cache_zero_ttl_expires() {
        let cache = MemoryCache::new(4);
        cache.set_ex("k", "v", 0).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(!cache.contains("k"));
    }

    #[tokio::test]
    async fn test_memory_cache_evicts_least_recent() {
        let cache = MemoryCache::new(2);
        cache.set_ex("a", "1", 60).await.unwrap();
        cache.set_ex("b", "2", 60).await.unwrap();
        cache.get("a").await.unwrap();
        cache.set_ex("c", "3", 60).await.unwrap();
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[tokio::test]
    async fn test_memory_cache_pattern_keys() {
        let cache = MemoryCache::new(8);
        let public = keys::country(CurriculumType::Root, TagType::Country, 0, 10);
        let admin = keys::country_admin(CurriculumType::Root, TagType::Country, 0, 10);
        cache.set_ex(&public, "[]", 60).await.unwrap();
        cache.set_ex(&admin, "[]", 60).await.unwrap();
        cache.set_ex(&keys::tag(1), "{}", 60).await.unwrap();

        let mut found = cache.keys(&keys::country_pattern()).await.unwrap();
        found.sort();
        assert_eq!(found, vec![admin, public]);
    }

    #[tokio::test]
    async fn test_memory_cache_failure_mode() {
        let cache = MemoryCache::new(4);
        cache.fail(true);
        assert!(cache.get("k").await.is_err());
        assert!(cache.set_ex("k", "v", 10).await.is_err());
        cache.fail(false);
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_caches_miss() {
        let cache = DisabledCache;
        cache.set_ex("k", "v", 10).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
        assert_eq!(cache.mget(&["a".into(), "b".into()]).await.unwrap().len(), 2);

        let redis = RedisCache::disabled();
        assert!(!redis.is_connected().await);
        assert!(redis.get("k").await.unwrap().is_none());
        redis.del(&["k".to_string()]).await.unwrap();
    }
}
