//! In-process [`TagStore`] for deterministic tests.
//!
//! Writes made through a [`StoreTx`] are journaled and only become visible
//! when the transaction commits, matching the relational store. Ids come from
//! shared counters, so ids allocated by a rolled-back transaction are never
//! reused (as with a Postgres sequence).
//!
//! Faults can be injected to exercise the sync engine's failure paths:
//!
//! ```rust,ignore
//! let store = MemoryTagStore::new();
//! store.fail_commits(true);
//! assert!(engine.create_tag(req).await.is_err());
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use curric_core::{
    CurriculumType, Error, GradeProduct, LegacyTagMapping, NewParentLink, NewTag, NewTagLocale, ParentLink,
    Result, StoreTx, Tag, TagId, TagLocaleMapping, TagPatch, TagStore, TagType,
};

#[derive(Default)]
struct State {
    tags: BTreeMap<TagId, Tag>,
    links: BTreeMap<i64, ParentLink>,
    locales: BTreeMap<i64, TagLocaleMapping>,
    legacy: Vec<LegacyTagMapping>,
    grade_products: Vec<GradeProduct>,
}

#[derive(Default)]
struct Faults {
    fail_begin: bool,
    fail_commit: bool,
    fail_reads: bool,
    fail_tag_names: HashSet<String>,
}

struct Inner {
    state: Mutex<State>,
    faults: Mutex<Faults>,
    next_tag_id: AtomicI64,
    next_row_id: AtomicI64,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    tag_fetches: AtomicUsize,
}

/// Shared in-memory tag store. Clones share state.
#[derive(Clone)]
pub struct MemoryTagStore {
    inner: Arc<Inner>,
}

impl Default for MemoryTagStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                faults: Mutex::new(Faults::default()),
                next_tag_id: AtomicI64::new(1),
                next_row_id: AtomicI64::new(1),
                commits: AtomicUsize::new(0),
                rollbacks: AtomicUsize::new(0),
                tag_fetches: AtomicUsize::new(0),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        lock(&self.inner.faults)
    }

    fn check_reads(&self) -> Result<()> {
        if self.faults().fail_reads {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn tag_id(&self) -> TagId {
        self.inner.next_tag_id.fetch_add(1, Ordering::SeqCst)
    }

    fn row_id(&self) -> i64 {
        self.inner.next_row_id.fetch_add(1, Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Fault injection
    // -------------------------------------------------------------------------

    pub fn fail_begins(&self, fail: bool) {
        self.faults().fail_begin = fail;
    }

    pub fn fail_commits(&self, fail: bool) {
        self.faults().fail_commit = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        self.faults().fail_reads = fail;
    }

    /// Make `insert_tag` fail for tags with this name.
    pub fn fail_insert_named(&self, name: impl Into<String>) {
        self.faults().fail_tag_names.insert(name.into());
    }

    pub fn commit_count(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    /// Calls to `get_tag` and `get_tags` served so far.
    pub fn tag_fetch_count(&self) -> usize {
        self.inner.tag_fetches.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Seeding and inspection
    // -------------------------------------------------------------------------

    /// Insert a committed tag directly.
    pub fn seed_tag(&self, new: NewTag) -> Tag {
        let tag = Tag::from_new(self.tag_id(), new, Utc::now());
        self.state().tags.insert(tag.id, tag.clone());
        tag
    }

    /// Insert a committed tag with a chosen id.
    pub fn seed_tag_with_id(&self, tag: Tag) -> Tag {
        self.inner
            .next_tag_id
            .fetch_max(tag.id + 1, Ordering::SeqCst);
        self.state().tags.insert(tag.id, tag.clone());
        tag
    }

    pub fn seed_link(&self, new: NewParentLink) -> ParentLink {
        let link = materialize_link(self.row_id(), new);
        self.state().links.insert(link.id, link.clone());
        link
    }

    pub fn seed_locale(&self, new: NewTagLocale) -> TagLocaleMapping {
        let locale = materialize_locale(self.row_id(), new);
        self.state().locales.insert(locale.id, locale.clone());
        locale
    }

    pub fn seed_legacy(
        &self,
        tag_id: TagId,
        tag_id_type: &str,
        legacy_id_type: &str,
        legacy_id: &str,
    ) -> LegacyTagMapping {
        let now = Utc::now();
        let row = LegacyTagMapping {
            id: self.row_id(),
            tag_id,
            tag_id_type: tag_id_type.to_string(),
            legacy_id_type: legacy_id_type.to_string(),
            legacy_id: legacy_id.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.state().legacy.push(row.clone());
        row
    }

    pub fn seed_grade_product(
        &self,
        product_id: &str,
        grade: Option<&str>,
        folder_id: Option<&str>,
    ) -> GradeProduct {
        let now = Utc::now();
        let row = GradeProduct {
            id: self.row_id(),
            folder_id: folder_id.map(str::to_string),
            product_id: product_id.to_string(),
            grade: grade.map(str::to_string),
            created_at: now,
            updated_at: now,
        };
        self.state().grade_products.push(row.clone());
        row
    }

    /// Committed tag row, published or not.
    pub fn tag(&self, id: TagId) -> Option<Tag> {
        self.state().tags.get(&id).cloned()
    }

    pub fn tag_named(&self, name: &str) -> Option<Tag> {
        self.state().tags.values().find(|t| t.name == name).cloned()
    }

    pub fn tag_count(&self) -> usize {
        self.state().tags.len()
    }

    /// Every committed link, including unpublished rows.
    pub fn all_links(&self) -> Vec<ParentLink> {
        self.state().links.values().cloned().collect()
    }

    pub fn links_of(&self, tag_id: TagId) -> Vec<ParentLink> {
        self.state()
            .links
            .values()
            .filter(|l| l.tag_id == tag_id)
            .cloned()
            .collect()
    }
}

fn materialize_link(id: i64, new: NewParentLink) -> ParentLink {
    let now = Utc::now();
    ParentLink {
        id,
        tag_id: new.tag_id,
        tag_type: new.tag_type,
        parent_tag_type: new.parent_tag_type,
        parent_tag_id: new.parent_tag_id,
        order: new.order,
        hidden: new.hidden,
        publish: true,
        created_at: now,
        updated_at: now,
    }
}

fn materialize_locale(id: i64, new: NewTagLocale) -> TagLocaleMapping {
    let now = Utc::now();
    TagLocaleMapping {
        id,
        tag_id: new.tag_id,
        country_id: new.country_id,
        locale: new.locale,
        name: new.name,
        tag_type: new.tag_type,
        publish: true,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        if self.faults().fail_begin {
            return Err(Error::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(Box::new(MemoryStoreTx {
            store: self.clone(),
            journal: Vec::new(),
        }))
    }

    async fn get_tag(&self, id: TagId) -> Result<Option<Tag>> {
        self.check_reads()?;
        self.inner.tag_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.tag(id))
    }

    async fn get_tags(&self, ids: &[TagId]) -> Result<Vec<Tag>> {
        self.check_reads()?;
        self.inner.tag_fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        Ok(ids.iter().filter_map(|id| state.tags.get(id).cloned()).collect())
    }

    async fn tags_in_range(&self, start: TagId, end: TagId) -> Result<Vec<Tag>> {
        self.check_reads()?;
        Ok(self
            .state()
            .tags
            .range(start..=end)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn tags_by_type(
        &self,
        curriculum_type: CurriculumType,
        tag_type: TagType,
        include_hidden: bool,
        start: i64,
        limit: i64,
    ) -> Result<Vec<Tag>> {
        self.check_reads()?;
        Ok(self
            .state()
            .tags
            .values()
            .filter(|t| t.curriculum_type == curriculum_type && t.tag_type == tag_type)
            .filter(|t| include_hidden || t.publish)
            .skip(start.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn links_for_tag(&self, tag_id: TagId) -> Result<Vec<ParentLink>> {
        self.check_reads()?;
        Ok(self
            .state()
            .links
            .values()
            .filter(|l| l.tag_id == tag_id && l.publish)
            .cloned()
            .collect())
    }

    async fn order_rows(&self, parent_key: &str, tag_type: TagType) -> Result<Vec<ParentLink>> {
        self.check_reads()?;
        let mut rows: Vec<ParentLink> = self
            .state()
            .links
            .values()
            .filter(|l| l.parent_tag_id == parent_key && l.tag_type == tag_type && l.publish)
            .cloned()
            .collect();
        rows.sort_by_key(|l| (l.order, l.id));
        Ok(rows)
    }

    async fn link_to_parent(&self, tag_id: TagId, parent_key: &str) -> Result<Option<ParentLink>> {
        self.check_reads()?;
        Ok(self
            .state()
            .links
            .values()
            .find(|l| l.tag_id == tag_id && l.parent_tag_id == parent_key && l.publish)
            .cloned())
    }

    async fn locales_for_tag(&self, tag_id: TagId) -> Result<Vec<TagLocaleMapping>> {
        self.check_reads()?;
        Ok(self
            .state()
            .locales
            .values()
            .filter(|l| l.tag_id == tag_id && l.publish)
            .cloned()
            .collect())
    }

    async fn locale_for(
        &self,
        tag_id: TagId,
        country_id: &str,
        locale: &str,
    ) -> Result<Option<TagLocaleMapping>> {
        self.check_reads()?;
        Ok(self
            .state()
            .locales
            .values()
            .find(|l| {
                l.tag_id == tag_id
                    && l.publish
                    && l.country_id == country_id
                    && l.locale.eq_ignore_ascii_case(locale)
            })
            .cloned())
    }

    async fn legacy_for_tags(&self, tag_ids: &[TagId]) -> Result<Vec<LegacyTagMapping>> {
        self.check_reads()?;
        Ok(self
            .state()
            .legacy
            .iter()
            .filter(|l| tag_ids.contains(&l.tag_id))
            .cloned()
            .collect())
    }

    async fn legacy_by_external(
        &self,
        legacy_id_type: &str,
        legacy_id: &str,
    ) -> Result<Vec<LegacyTagMapping>> {
        self.check_reads()?;
        Ok(self
            .state()
            .legacy
            .iter()
            .filter(|l| l.legacy_id_type == legacy_id_type && l.legacy_id == legacy_id)
            .cloned()
            .collect())
    }

    async fn grade_products(&self, product_id: &str) -> Result<Vec<GradeProduct>> {
        self.check_reads()?;
        Ok(self
            .state()
            .grade_products
            .iter()
            .filter(|g| g.product_id == product_id)
            .cloned()
            .collect())
    }
}

enum Op {
    InsertTag(Tag),
    UpdateTag(TagId, TagPatch),
    InsertLink(ParentLink),
    SetLinkHidden(i64, bool),
    SetLinkOrder(i64, i32),
    InsertLocale(TagLocaleMapping),
    DeleteLocale(i64),
}

/// Journaled transaction over a [`MemoryTagStore`].
pub struct MemoryStoreTx {
    store: MemoryTagStore,
    journal: Vec<Op>,
}

impl MemoryStoreTx {
    fn apply(state: &mut State, op: Op) {
        let now = Utc::now();
        match op {
            Op::InsertTag(tag) => {
                state.tags.insert(tag.id, tag);
            }
            Op::UpdateTag(id, patch) => {
                if let Some(tag) = state.tags.get_mut(&id) {
                    tag.apply(&patch, now);
                }
            }
            Op::InsertLink(link) => {
                state.links.insert(link.id, link);
            }
            Op::SetLinkHidden(id, hidden) => {
                if let Some(link) = state.links.get_mut(&id) {
                    link.hidden = hidden;
                    link.updated_at = now;
                }
            }
            Op::SetLinkOrder(id, order) => {
                if let Some(link) = state.links.get_mut(&id) {
                    link.order = order;
                    link.updated_at = now;
                }
            }
            Op::InsertLocale(locale) => {
                state.locales.insert(locale.id, locale);
            }
            Op::DeleteLocale(id) => {
                if let Some(locale) = state.locales.get_mut(&id) {
                    locale.publish = false;
                    locale.updated_at = now;
                }
            }
        }
    }
}

#[async_trait]
impl StoreTx for MemoryStoreTx {
    async fn insert_tag(&mut self, tag: &NewTag) -> Result<TagId> {
        if self.store.faults().fail_tag_names.contains(&tag.name) {
            return Err(Error::Database(sqlx::Error::RowNotFound));
        }
        let row = Tag::from_new(self.store.tag_id(), tag.clone(), Utc::now());
        let id = row.id;
        self.journal.push(Op::InsertTag(row));
        Ok(id)
    }

    async fn update_tag(&mut self, id: TagId, patch: &TagPatch) -> Result<()> {
        let known = self.store.state().tags.contains_key(&id)
            || self
                .journal
                .iter()
                .any(|op| matches!(op, Op::InsertTag(t) if t.id == id));
        if !known {
            return Err(Error::NotFound(curric_core::codes::TAG_NOT_FOUND.to_string()));
        }
        self.journal.push(Op::UpdateTag(id, patch.clone()));
        Ok(())
    }

    async fn insert_link(&mut self, link: &NewParentLink) -> Result<i64> {
        let row = materialize_link(self.store.row_id(), link.clone());
        let id = row.id;
        self.journal.push(Op::InsertLink(row));
        Ok(id)
    }

    async fn set_link_hidden(&mut self, link_id: i64, hidden: bool) -> Result<()> {
        self.journal.push(Op::SetLinkHidden(link_id, hidden));
        Ok(())
    }

    async fn set_link_order(&mut self, link_id: i64, order: i32) -> Result<()> {
        self.journal.push(Op::SetLinkOrder(link_id, order));
        Ok(())
    }

    async fn insert_locale(&mut self, locale: &NewTagLocale) -> Result<i64> {
        let row = materialize_locale(self.store.row_id(), locale.clone());
        let id = row.id;
        self.journal.push(Op::InsertLocale(row));
        Ok(id)
    }

    async fn delete_locale(&mut self, locale_id: i64) -> Result<()> {
        self.journal.push(Op::DeleteLocale(locale_id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.store.faults().fail_commit {
            self.store.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Database(sqlx::Error::PoolClosed));
        }
        let MemoryStoreTx { store, journal } = *self;
        {
            let mut state = store.state();
            for op in journal {
                Self::apply(&mut state, op);
            }
        }
        store.inner.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.store.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
