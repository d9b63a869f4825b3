//! Core traits for curric's external collaborators.
//!
//! The relational store, the search index, the cache store, and the
//! compensator are all consumed through these traits so the sync engine can
//! run against PostgreSQL/HTTP/Redis in production and in-memory fakes in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// RELATIONAL STORE
// =============================================================================

/// System of record for tags, parent links, locales, and reference data.
///
/// Reads go straight to the store; the cache layer wraps them.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Open a transaction. Handles are owned by exactly one unit of work.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Fetch a tag by id, published or not.
    async fn get_tag(&self, id: TagId) -> Result<Option<Tag>>;

    /// Fetch several tags. Missing ids are omitted; order is unspecified.
    async fn get_tags(&self, ids: &[TagId]) -> Result<Vec<Tag>>;

    /// Tags with `start <= id <= end`, ascending by id.
    async fn tags_in_range(&self, start: TagId, end: TagId) -> Result<Vec<Tag>>;

    /// One page of tags of a (curriculum type, tag type), ascending by id.
    /// Unpublished tags are included only when `include_hidden` is set.
    async fn tags_by_type(
        &self,
        curriculum_type: CurriculumType,
        tag_type: TagType,
        include_hidden: bool,
        start: i64,
        limit: i64,
    ) -> Result<Vec<Tag>>;

    /// Published links of a tag.
    async fn links_for_tag(&self, tag_id: TagId) -> Result<Vec<ParentLink>>;

    /// Published links under `parent_key` for `tag_type` (the order rows).
    async fn order_rows(&self, parent_key: &str, tag_type: TagType) -> Result<Vec<ParentLink>>;

    /// Published link of `tag_id` to `parent_key`, whatever its parent type.
    async fn link_to_parent(&self, tag_id: TagId, parent_key: &str) -> Result<Option<ParentLink>>;

    /// Published locale mappings of a tag.
    async fn locales_for_tag(&self, tag_id: TagId) -> Result<Vec<TagLocaleMapping>>;

    /// Published locale mapping for one (tag, country, locale).
    async fn locale_for(
        &self,
        tag_id: TagId,
        country_id: &str,
        locale: &str,
    ) -> Result<Option<TagLocaleMapping>>;

    /// Legacy mappings of the given tags.
    async fn legacy_for_tags(&self, tag_ids: &[TagId]) -> Result<Vec<LegacyTagMapping>>;

    /// Legacy mappings matching an external (type, id) pair.
    async fn legacy_by_external(
        &self,
        legacy_id_type: &str,
        legacy_id: &str,
    ) -> Result<Vec<LegacyTagMapping>>;

    /// Grade rows for a product.
    async fn grade_products(&self, product_id: &str) -> Result<Vec<GradeProduct>>;
}

/// Open relational transaction.
///
/// Dropping a handle without commit discards its writes.
#[async_trait]
pub trait StoreTx: Send {
    async fn insert_tag(&mut self, tag: &NewTag) -> Result<TagId>;

    async fn update_tag(&mut self, id: TagId, patch: &TagPatch) -> Result<()>;

    async fn insert_link(&mut self, link: &NewParentLink) -> Result<i64>;

    async fn set_link_hidden(&mut self, link_id: i64, hidden: bool) -> Result<()>;

    async fn set_link_order(&mut self, link_id: i64, order: i32) -> Result<()>;

    async fn insert_locale(&mut self, locale: &NewTagLocale) -> Result<i64>;

    /// Soft-delete a locale mapping.
    async fn delete_locale(&mut self, locale_id: i64) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

// =============================================================================
// SEARCH INDEX
// =============================================================================

/// Search/filter index. No transactions: callers compensate on failure.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create or replace a tag document.
    async fn upsert_tag(&self, doc: &IndexDocument) -> Result<()>;

    /// Filter query; `query.text` switches to free-text search.
    async fn query_tags(&self, query: &IndexQuery) -> Result<IndexPage>;

    /// Update the deleted flag and/or names. A call with neither is a no-op.
    async fn update_tag(&self, id: TagId, deleted: Option<bool>, names: &[TagName]) -> Result<()>;

    async fn add_parents(&self, id: TagId, parents: &[String]) -> Result<()>;

    async fn remove_parents(&self, id: TagId, parents: &[String]) -> Result<()>;

    /// Keep the parents on the document but exclude them from active-parent filters.
    async fn hide_parents(&self, id: TagId, parents: &[String]) -> Result<()>;
}

// =============================================================================
// CACHE STORE
// =============================================================================

/// Key/value cache holding opaque serialized blobs.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()>;

    async fn del(&self, keys: &[String]) -> Result<()>;

    /// Keys matching a glob pattern (`prefix*`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
}

// =============================================================================
// COMPENSATION
// =============================================================================

/// Corrective index call issued after a partial cross-store failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompensationTask {
    MarkDeleted { tag_id: TagId },
    AddParents { tag_id: TagId, parents: Vec<String> },
    RemoveParents { tag_id: TagId, parents: Vec<String> },
    HideParents { tag_id: TagId, parents: Vec<String> },
    /// Put back the deleted flag and/or names a failed update overwrote.
    Restore {
        tag_id: TagId,
        deleted: Option<bool>,
        names: Vec<TagName>,
    },
}

impl CompensationTask {
    pub fn tag_id(&self) -> TagId {
        match self {
            CompensationTask::MarkDeleted { tag_id }
            | CompensationTask::AddParents { tag_id, .. }
            | CompensationTask::RemoveParents { tag_id, .. }
            | CompensationTask::HideParents { tag_id, .. }
            | CompensationTask::Restore { tag_id, .. } => *tag_id,
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            CompensationTask::MarkDeleted { .. } => "mark_deleted",
            CompensationTask::AddParents { .. } => "add_parents",
            CompensationTask::RemoveParents { .. } => "remove_parents",
            CompensationTask::HideParents { .. } => "hide_parents",
            CompensationTask::Restore { .. } => "restore",
        }
    }

    /// True when the task has nothing to do.
    pub fn is_noop(&self) -> bool {
        match self {
            CompensationTask::MarkDeleted { .. } => false,
            CompensationTask::AddParents { parents, .. }
            | CompensationTask::RemoveParents { parents, .. }
            | CompensationTask::HideParents { parents, .. } => parents.is_empty(),
            CompensationTask::Restore { deleted, names, .. } => {
                deleted.is_none() && names.is_empty()
            }
        }
    }

    /// Apply the task against an index once.
    pub async fn apply(&self, index: &dyn SearchIndex) -> Result<()> {
        match self {
            CompensationTask::MarkDeleted { tag_id } => {
                index.update_tag(*tag_id, Some(true), &[]).await
            }
            CompensationTask::AddParents { tag_id, parents } => {
                index.add_parents(*tag_id, parents).await
            }
            CompensationTask::RemoveParents { tag_id, parents } => {
                index.remove_parents(*tag_id, parents).await
            }
            CompensationTask::HideParents { tag_id, parents } => {
                index.hide_parents(*tag_id, parents).await
            }
            CompensationTask::Restore {
                tag_id,
                deleted,
                names,
            } => index.update_tag(*tag_id, *deleted, names).await,
        }
    }
}

/// Best-effort, at-least-once executor of compensation tasks.
///
/// `submit` never blocks the caller and never reports failure; failures are
/// logged by the implementation.
pub trait Compensator: Send + Sync {
    fn submit(&self, task: CompensationTask);
}
