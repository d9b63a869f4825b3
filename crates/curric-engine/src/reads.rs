//! Cache-aside reads over the relational store.
//!
//! Every read tries the cache first and falls back to the store on a miss,
//! a deserialization failure, or a backend error. Only non-empty results are
//! written back. Cache failures are logged and never surface to callers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use curric_core::{
    CacheStore, CurriculumConfig, CurriculumType, GradeProduct, ParentLink, Result, Tag, TagId,
    TagLocaleMapping, TagStore, TagType,
};

use crate::cache::keys;

/// Read-through wrapper pairing a [`TagStore`] with a [`CacheStore`].
#[derive(Clone)]
pub struct CachedReads {
    store: Arc<dyn TagStore>,
    cache: Arc<dyn CacheStore>,
    ttl_secs: u64,
    multi_grade_ttl_secs: u64,
}

impl CachedReads {
    pub fn new(
        store: Arc<dyn TagStore>,
        cache: Arc<dyn CacheStore>,
        config: &CurriculumConfig,
    ) -> Self {
        Self {
            store,
            cache,
            ttl_secs: config.cache_ttl_secs,
            multi_grade_ttl_secs: config.multi_grade_ttl_secs,
        }
    }

    pub fn store(&self) -> &Arc<dyn TagStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    // -------------------------------------------------------------------------
    // Raw cache access
    // -------------------------------------------------------------------------

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(subsystem = "cache", cache_key = %key, "Cache HIT");
                    Some(value)
                }
                Err(e) => {
                    warn!(
                        subsystem = "cache",
                        cache_key = %key,
                        error = %e,
                        "Cache deserialization error"
                    );
                    None
                }
            },
            Ok(None) => {
                debug!(subsystem = "cache", cache_key = %key, "Cache MISS");
                None
            }
            Err(e) => {
                warn!(
                    subsystem = "cache",
                    cache_key = %key,
                    error = %e,
                    "Cache read failed, falling through to store"
                );
                None
            }
        }
    }

    async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(
                    subsystem = "cache",
                    cache_key = %key,
                    error = %e,
                    "Cache serialization error"
                );
                return;
            }
        };
        if let Err(e) = self.cache.set_ex(key, &raw, ttl_secs).await {
            warn!(
                subsystem = "cache",
                cache_key = %key,
                error = %e,
                "Cache write failed"
            );
        }
    }

    /// Delete keys. Failures are logged only.
    pub async fn invalidate(&self, keys: &[String]) {
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.cache.del(keys).await {
            warn!(
                subsystem = "cache",
                key_count = keys.len(),
                error = %e,
                "Cache invalidation failed"
            );
        }
    }

    /// Delete every key matching a glob pattern.
    pub async fn invalidate_pattern(&self, pattern: &str) {
        match self.cache.keys(pattern).await {
            Ok(found) => self.invalidate(&found).await,
            Err(e) => warn!(
                subsystem = "cache",
                pattern,
                error = %e,
                "Cache pattern lookup failed"
            ),
        }
    }

    // -------------------------------------------------------------------------
    // Cached entities
    // -------------------------------------------------------------------------

    pub async fn tag(&self, id: TagId) -> Result<Option<Tag>> {
        let key = keys::tag(id);
        if let Some(tag) = self.get_json::<Tag>(&key).await {
            return Ok(Some(tag));
        }
        let tag = self.store.get_tag(id).await?;
        if let Some(tag) = &tag {
            self.set_json(&key, tag, self.ttl_secs).await;
        }
        Ok(tag)
    }

    /// Fetch several tags in input order. Unknown ids are skipped.
    pub async fn tags(&self, ids: &[TagId]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cache_keys: Vec<String> = ids.iter().map(|id| keys::tag(*id)).collect();
        let cached = match self.cache.mget(&cache_keys).await {
            Ok(values) if values.len() == ids.len() => values,
            Ok(_) => vec![None; ids.len()],
            Err(e) => {
                warn!(
                    subsystem = "cache",
                    error = %e,
                    "Cache MGET failed, falling through to store"
                );
                vec![None; ids.len()]
            }
        };

        let mut found: HashMap<TagId, Tag> = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for (id, raw) in ids.iter().zip(cached) {
            match raw.and_then(|raw| serde_json::from_str::<Tag>(&raw).ok()) {
                Some(tag) => {
                    found.insert(*id, tag);
                }
                None => missing.push(*id),
            }
        }

        if !missing.is_empty() {
            missing.sort_unstable();
            missing.dedup();
            for tag in self.store.get_tags(&missing).await? {
                self.set_json(&keys::tag(tag.id), &tag, self.ttl_secs).await;
                found.insert(tag.id, tag);
            }
        }

        debug!(
            subsystem = "cache",
            requested = ids.len(),
            result_count = found.len(),
            "Fetched tags"
        );
        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    /// Published links of a tag.
    pub async fn links(&self, tag_id: TagId) -> Result<Vec<ParentLink>> {
        let key = keys::links(tag_id);
        if let Some(links) = self.get_json::<Vec<ParentLink>>(&key).await {
            return Ok(links);
        }
        let links = self.store.links_for_tag(tag_id).await?;
        if !links.is_empty() {
            self.set_json(&key, &links, self.ttl_secs).await;
        }
        Ok(links)
    }

    /// Order rows for (parent key, tag type).
    pub async fn order_rows(&self, parent_key: &str, tag_type: TagType) -> Result<Vec<ParentLink>> {
        let key = keys::tag_order(parent_key, tag_type);
        if let Some(rows) = self.get_json::<Vec<ParentLink>>(&key).await {
            return Ok(rows);
        }
        let rows = self.store.order_rows(parent_key, tag_type).await?;
        if !rows.is_empty() {
            self.set_json(&key, &rows, self.ttl_secs).await;
        }
        Ok(rows)
    }

    pub async fn grade_products(&self, product_id: &str) -> Result<Vec<GradeProduct>> {
        let key = keys::grade_product(product_id);
        if let Some(rows) = self.get_json::<Vec<GradeProduct>>(&key).await {
            return Ok(rows);
        }
        let rows = self.store.grade_products(product_id).await?;
        if !rows.is_empty() {
            self.set_json(&key, &rows, self.ttl_secs).await;
        }
        Ok(rows)
    }

    /// Localized name of a tag for (country, locale), if one exists.
    pub async fn locale_name(
        &self,
        tag_id: TagId,
        country_id: &str,
        locale: &str,
    ) -> Result<Option<String>> {
        let key = keys::tag_locale(tag_id, country_id, locale);
        if let Some(mapping) = self.get_json::<TagLocaleMapping>(&key).await {
            return Ok(Some(mapping.name));
        }
        let mapping = self.store.locale_for(tag_id, country_id, locale).await?;
        if let Some(mapping) = &mapping {
            self.set_json(&key, mapping, self.ttl_secs).await;
        }
        Ok(mapping.map(|m| m.name))
    }

    /// One page of tags by (curriculum type, tag type).
    ///
    /// Only country listings are cached; `include_hidden` selects the admin
    /// key space. Empty pages are not written back.
    pub async fn tags_by_type(
        &self,
        ct: CurriculumType,
        tag_type: TagType,
        include_hidden: bool,
        start: i64,
        limit: i64,
    ) -> Result<Vec<Tag>> {
        if tag_type != TagType::Country {
            return self
                .store
                .tags_by_type(ct, tag_type, include_hidden, start, limit)
                .await;
        }
        let key = if include_hidden {
            keys::country_admin(ct, tag_type, start, limit)
        } else {
            keys::country(ct, tag_type, start, limit)
        };
        if let Some(tags) = self.get_json::<Vec<Tag>>(&key).await {
            return Ok(tags);
        }
        let tags = self
            .store
            .tags_by_type(ct, tag_type, include_hidden, start, limit)
            .await?;
        if !tags.is_empty() {
            self.set_json(&key, &tags, self.ttl_secs).await;
        }
        Ok(tags)
    }

    /// Cached multi-grade resolution result.
    pub async fn multi_grade(&self, key: &str) -> Option<Vec<Tag>> {
        self.get_json(key).await
    }

    pub async fn store_multi_grade(&self, key: &str, tags: &[Tag]) {
        if !tags.is_empty() {
            self.set_json(key, tags, self.multi_grade_ttl_secs).await;
        }
    }

    // -------------------------------------------------------------------------
    // Invalidation helpers
    // -------------------------------------------------------------------------

    /// Keys touched by writing edges of `tag_id` under the given (parent key, type) pairs.
    pub fn edge_keys<'a>(
        tag_id: TagId,
        tag_type: TagType,
        parent_keys: impl IntoIterator<Item = &'a str>,
    ) -> Vec<String> {
        let mut out = vec![keys::links(tag_id)];
        out.extend(
            parent_keys
                .into_iter()
                .map(|key| keys::tag_order(key, tag_type)),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use curric_core::fixtures::new_tag;
    use curric_db::MemoryTagStore;

    fn setup() -> (MemoryTagStore, MemoryCache, CachedReads) {
        let store = MemoryTagStore::new();
        let cache = MemoryCache::new(64);
        let reads = CachedReads::new(
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            &CurriculumConfig::default(),
        );
        (store, cache, reads)
    }

    #[tokio::test]
    async fn test_tag_read_through_populates_cache() {
        let (store, cache, reads) = setup();
        let tag = store.seed_tag(new_tag(TagType::Grade, "Grade 1", CurriculumType::K12));

        let fetched = reads.tag(tag.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Grade 1");
        assert!(cache.contains(&keys::tag(tag.id)));

        // Served from the cache even when the store is down.
        store.fail_reads(true);
        assert_eq!(reads.tag(tag.id).await.unwrap().unwrap().id, tag.id);
    }

    #[tokio::test]
    async fn test_unknown_tag_is_not_cached() {
        let (_store, cache, reads) = setup();
        assert!(reads.tag(999).await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_failure_falls_through() {
        let (store, cache, reads) = setup();
        let tag = store.seed_tag(new_tag(TagType::Grade, "Grade 2", CurriculumType::K12));
        cache.fail(true);
        assert_eq!(reads.tag(tag.id).await.unwrap().unwrap().id, tag.id);
        assert_eq!(reads.tags(&[tag.id]).await.unwrap().len(), 1);
        reads.invalidate(&[keys::tag(tag.id)]).await;
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_ignored() {
        let (store, cache, reads) = setup();
        let tag = store.seed_tag(new_tag(TagType::Board, "CBSE", CurriculumType::K12));
        cache.set_ex(&keys::tag(tag.id), "{not json", 60).await.unwrap();
        assert_eq!(reads.tag(tag.id).await.unwrap().unwrap().name, "CBSE");
    }

    #[tokio::test]
    async fn test_tags_preserve_input_order_and_skip_unknown() {
        let (store, _cache, reads) = setup();
        let a = store.seed_tag(new_tag(TagType::Grade, "A", CurriculumType::K12));
        let b = store.seed_tag(new_tag(TagType::Grade, "B", CurriculumType::K12));
        reads.tag(a.id).await.unwrap();

        let tags = reads.tags(&[b.id, 12345, a.id]).await.unwrap();
        let names: Vec<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[tokio::test]
    async fn test_invalidate_pattern_drops_country_listings() {
        let (_store, cache, reads) = setup();
        let public = keys::country(CurriculumType::Root, TagType::Country, 0, 10);
        let admin = keys::country_admin(CurriculumType::Root, TagType::Country, 0, 10);
        cache.set_ex(&public, "[]", 60).await.unwrap();
        cache.set_ex(&admin, "[]", 60).await.unwrap();
        cache.set_ex(&keys::tag(1), "{}", 60).await.unwrap();

        reads.invalidate_pattern(&keys::country_pattern()).await;
        assert!(!cache.contains(&public));
        assert!(!cache.contains(&admin));
        assert!(cache.contains(&keys::tag(1)));
    }

    #[tokio::test]
    async fn test_only_country_pages_are_cached() {
        let (store, cache, reads) = setup();
        store.seed_tag(new_tag(TagType::Country, "India", CurriculumType::Root));
        store.seed_tag(new_tag(TagType::Board, "CBSE", CurriculumType::K12));

        let countries = reads
            .tags_by_type(CurriculumType::Root, TagType::Country, false, 0, 10)
            .await
            .unwrap();
        assert_eq!(countries.len(), 1);
        assert!(cache.contains(&keys::country(CurriculumType::Root, TagType::Country, 0, 10)));

        let boards = reads
            .tags_by_type(CurriculumType::K12, TagType::Board, false, 0, 10)
            .await
            .unwrap();
        assert_eq!(boards.len(), 1);
        assert_eq!(cache.len(), 1);

        let empty = reads
            .tags_by_type(CurriculumType::Root, TagType::Country, false, 10, 10)
            .await
            .unwrap();
        assert!(empty.is_empty());
        assert!(!cache.contains(&keys::country(CurriculumType::Root, TagType::Country, 10, 10)));
    }

    #[test]
    fn test_edge_keys() {
        let keys = CachedReads::edge_keys(7, TagType::Chapter, ["1.2", "1.2.5"]);
        assert_eq!(
            keys,
            vec![
                "curriculum:parent_tag_mapping:7".to_string(),
                "curriculum:tag_order:1.2:chapter".to_string(),
                "curriculum:tag_order:1.2.5:chapter".to_string(),
            ]
        );
    }
}
