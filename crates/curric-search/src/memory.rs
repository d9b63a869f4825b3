//! In-process search index for deterministic testing.
//!
//! Keeps full documents, applies parent add/remove/hide the way the real
//! index does, and logs every call so tests can assert on what the sync
//! engine sent and in which order.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use curric_core::{
    defaults, Error, IndexDocument, IndexPage, IndexQuery, Result, SearchIndex, TagId, TagName,
};

/// A call received by [`MemorySearchIndex`].
#[derive(Debug, Clone, PartialEq)]
pub enum IndexCall {
    Upsert(TagId),
    Query(IndexQuery),
    Update {
        id: TagId,
        deleted: Option<bool>,
        names: Vec<TagName>,
    },
    AddParents(TagId, Vec<String>),
    RemoveParents(TagId, Vec<String>),
    HideParents(TagId, Vec<String>),
}

impl IndexCall {
    pub fn tag_id(&self) -> Option<TagId> {
        match self {
            IndexCall::Query(_) => None,
            IndexCall::Upsert(id)
            | IndexCall::Update { id, .. }
            | IndexCall::AddParents(id, _)
            | IndexCall::RemoveParents(id, _)
            | IndexCall::HideParents(id, _) => Some(*id),
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, IndexCall::Query(_))
    }
}

#[derive(Default)]
struct State {
    docs: BTreeMap<TagId, IndexDocument>,
    hidden: BTreeMap<TagId, BTreeSet<String>>,
    calls: Vec<IndexCall>,
}

#[derive(Default)]
struct Faults {
    fail_all: bool,
    fail_ids: HashSet<TagId>,
    fail_names: HashSet<String>,
    panic_names: HashSet<String>,
}

/// Shared in-memory index. Clones share state.
#[derive(Clone, Default)]
pub struct MemorySearchIndex {
    state: Arc<Mutex<State>>,
    faults: Arc<Mutex<Faults>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    /// Every write fails.
    pub fn fail_all(&self, fail: bool) {
        lock(&self.faults).fail_all = fail;
    }

    /// Writes touching this tag fail.
    pub fn fail_tag(&self, id: TagId) {
        lock(&self.faults).fail_ids.insert(id);
    }

    /// Upserts of documents carrying this name fail.
    pub fn fail_named(&self, name: impl Into<String>) {
        lock(&self.faults).fail_names.insert(name.into());
    }

    /// Upserts of documents carrying this name panic.
    pub fn panic_named(&self, name: impl Into<String>) {
        lock(&self.faults).panic_names.insert(name.into());
    }

    pub fn clear_faults(&self) {
        *lock(&self.faults) = Faults::default();
    }

    fn check_write(&self, id: TagId, code: &str) -> Result<()> {
        let faults = lock(&self.faults);
        if faults.fail_all || faults.fail_ids.contains(&id) {
            return Err(Error::Index(code.to_string()));
        }
        Ok(())
    }

    /// Insert a document without logging a call.
    pub fn seed(&self, doc: IndexDocument) {
        self.state().docs.insert(doc.id, doc);
    }

    pub fn document(&self, id: TagId) -> Option<IndexDocument> {
        self.state().docs.get(&id).cloned()
    }

    pub fn hidden_parents(&self, id: TagId) -> Vec<String> {
        self.state()
            .hidden
            .get(&id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Parents that are present and not hidden.
    pub fn active_parents(&self, id: TagId) -> Vec<String> {
        let state = self.state();
        let hidden = state.hidden.get(&id);
        state
            .docs
            .get(&id)
            .map(|doc| {
                doc.parents
                    .iter()
                    .filter(|p| hidden.map_or(true, |h| !h.contains(*p)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<IndexCall> {
        self.state().calls.clone()
    }

    pub fn writes(&self) -> Vec<IndexCall> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn matches(doc: &IndexDocument, hidden: Option<&BTreeSet<String>>, q: &IndexQuery) -> bool {
        if doc.deleted {
            return false;
        }
        if q.tag_type.map_or(false, |t| t != doc.tag_type)
            || q.curriculum_type.map_or(false, |c| c != doc.curriculum_type)
            || q.access.map_or(false, |a| a != doc.access)
            || q.tag_group.map_or(false, |g| g != doc.tag_group)
            || q.creator_id.map_or(false, |c| Some(c) != doc.creator_id)
        {
            return false;
        }
        if let Some(creator_type) = &q.creator_type {
            if doc.creator_type.as_deref() != Some(creator_type.as_str()) {
                return false;
            }
        }
        if let Some(country) = &q.country_id {
            if &doc.country_id != country {
                return false;
            }
        }
        let is_hidden = |p: &String| hidden.map_or(false, |h| h.contains(p));
        if !q.parents.is_empty()
            && !doc
                .parents
                .iter()
                .any(|p| q.parents.contains(p) && !is_hidden(p))
        {
            return false;
        }
        if !q.hidden_parents.is_empty()
            && !doc
                .parents
                .iter()
                .any(|p| q.hidden_parents.contains(p) && is_hidden(p))
        {
            return false;
        }
        if let Some(text) = &q.text {
            let needle = text.to_lowercase();
            if !doc
                .names
                .iter()
                .any(|n| n.value.to_lowercase().contains(&needle))
            {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn upsert_tag(&self, doc: &IndexDocument) -> Result<()> {
        self.state().calls.push(IndexCall::Upsert(doc.id));
        {
            let faults = lock(&self.faults);
            if doc.names.iter().any(|n| faults.panic_names.contains(&n.value)) {
                drop(faults);
                panic!("index upsert panicked for tag {}", doc.id);
            }
            if doc.names.iter().any(|n| faults.fail_names.contains(&n.value)) {
                return Err(Error::Index("createTagIndexError".to_string()));
            }
        }
        self.check_write(doc.id, "createTagIndexError")?;
        let mut state = self.state();
        state.hidden.remove(&doc.id);
        state.docs.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn query_tags(&self, query: &IndexQuery) -> Result<IndexPage> {
        let mut state = self.state();
        state.calls.push(IndexCall::Query(query.clone()));
        let matched: Vec<TagId> = state
            .docs
            .values()
            .filter(|doc| Self::matches(doc, state.hidden.get(&doc.id), query))
            .map(|doc| doc.id)
            .collect();

        let limit = if query.limit == 0 {
            defaults::DEFAULT_QUERY_LIMIT
        } else {
            query.limit
        };
        let ids = matched
            .iter()
            .skip(query.start.max(0) as usize)
            .take(limit.max(0) as usize)
            .copied()
            .collect();
        Ok(IndexPage {
            ids,
            total: matched.len() as i64,
        })
    }

    async fn update_tag(&self, id: TagId, deleted: Option<bool>, names: &[TagName]) -> Result<()> {
        if deleted.is_none() && names.is_empty() {
            return Ok(());
        }
        self.state().calls.push(IndexCall::Update {
            id,
            deleted,
            names: names.to_vec(),
        });
        self.check_write(id, "updateTagIndexError")?;
        let mut state = self.state();
        if let Some(doc) = state.docs.get_mut(&id) {
            if let Some(deleted) = deleted {
                doc.deleted = deleted;
            }
            if !names.is_empty() {
                doc.names = names.to_vec();
            }
        }
        Ok(())
    }

    async fn add_parents(&self, id: TagId, parents: &[String]) -> Result<()> {
        if parents.is_empty() {
            return Ok(());
        }
        self.state()
            .calls
            .push(IndexCall::AddParents(id, parents.to_vec()));
        self.check_write(id, "addParentTagsIndexError")?;
        let mut state = self.state();
        if let Some(hidden) = state.hidden.get_mut(&id) {
            for p in parents {
                hidden.remove(p);
            }
        }
        if let Some(doc) = state.docs.get_mut(&id) {
            for p in parents {
                if !doc.parents.contains(p) {
                    doc.parents.push(p.clone());
                }
            }
        }
        Ok(())
    }

    async fn remove_parents(&self, id: TagId, parents: &[String]) -> Result<()> {
        if parents.is_empty() {
            return Ok(());
        }
        self.state()
            .calls
            .push(IndexCall::RemoveParents(id, parents.to_vec()));
        self.check_write(id, "removeParentTagsIndexError")?;
        let mut state = self.state();
        if let Some(doc) = state.docs.get_mut(&id) {
            doc.parents.retain(|p| !parents.contains(p));
        }
        if let Some(hidden) = state.hidden.get_mut(&id) {
            for p in parents {
                hidden.remove(p);
            }
        }
        Ok(())
    }

    async fn hide_parents(&self, id: TagId, parents: &[String]) -> Result<()> {
        if parents.is_empty() {
            return Ok(());
        }
        self.state()
            .calls
            .push(IndexCall::HideParents(id, parents.to_vec()));
        self.check_write(id, "hideParentTagsIndexError")?;
        let mut state = self.state();
        let hidden = state.hidden.entry(id).or_default();
        for p in parents {
            hidden.insert(p.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curric_core::{Access, CurriculumType, TagGroup, TagType};

    fn doc(id: TagId, parents: &[&str]) -> IndexDocument {
        IndexDocument {
            id,
            tag_type: TagType::Chapter,
            names: vec![TagName {
                value: format!("chapter-{}", id),
                locale: "en".into(),
            }],
            curriculum_type: CurriculumType::K12,
            creator_id: Some(1),
            creator_type: Some("admin".into()),
            access: Access::Global,
            tag_group: TagGroup::Content,
            country_id: "0".into(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            deleted: false,
        }
    }

    fn under(parent: &str) -> IndexQuery {
        IndexQuery {
            tag_type: Some(TagType::Chapter),
            parents: vec![parent.to_string()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_hidden_parents_are_excluded_until_added() {
        let index = MemorySearchIndex::new();
        index.upsert_tag(&doc(1, &["1.2"])).await.unwrap();
        index.hide_parents(1, &["1.2".into()]).await.unwrap();
        assert!(index.query_tags(&under("1.2")).await.unwrap().ids.is_empty());

        index.add_parents(1, &["1.2".into()]).await.unwrap();
        assert_eq!(index.query_tags(&under("1.2")).await.unwrap().ids, vec![1]);
    }

    #[tokio::test]
    async fn test_deleted_documents_do_not_match() {
        let index = MemorySearchIndex::new();
        index.upsert_tag(&doc(1, &["1.2"])).await.unwrap();
        index.upsert_tag(&doc(2, &["1.2"])).await.unwrap();
        index.update_tag(1, Some(true), &[]).await.unwrap();

        let page = index.query_tags(&under("1.2")).await.unwrap();
        assert_eq!(page.ids, vec![2]);
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_faults_and_call_log() {
        let index = MemorySearchIndex::new();
        index.fail_tag(3);
        let err = index.upsert_tag(&doc(3, &[])).await.unwrap_err();
        assert_eq!(err.code(), "createTagIndexError");
        assert!(index.document(3).is_none());

        index.add_parents(4, &[]).await.unwrap();
        assert_eq!(index.writes(), vec![IndexCall::Upsert(3)]);
    }
}
