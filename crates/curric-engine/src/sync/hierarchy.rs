//! Attaching existing tags to parent chains and removing them again.

use std::collections::HashSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use curric_core::ordering::{next_order, resolve_sentinels};
use curric_core::{
    codes, defaults, CompensationTask, Error, LevelRule, NewParentLink, ParentLink, Result, Tag,
    TagGroup, TagId, TagType,
};

use super::{dedup_keys, ContentTarget};
use crate::batch::partial_success;
use crate::cache::keys;
use crate::engine::{CurriculumEngine, SyncTx};
use crate::reads::CachedReads;
use crate::requests::{BulkAttach, BulkAttachResult, HierarchyChange, TagSummary};

/// Edge changes computed by diffing existing links against a target.
#[derive(Debug, Default)]
struct EdgeDiff {
    /// New (parent_tag_type, parent key) pairs.
    added: Vec<(String, String)>,
    /// Hidden links to surface, with their parent keys.
    unhidden: Vec<(i64, String)>,
    /// The ordering edge already existed hidden and is being surfaced.
    ordering_unhidden: bool,
}

impl EdgeDiff {
    fn is_empty(&self) -> bool {
        self.added.is_empty() && self.unhidden.is_empty()
    }

    fn added_keys(&self) -> Vec<String> {
        dedup_keys(self.added.iter().map(|(_, key)| key.as_str()))
    }

    fn unhidden_keys(&self) -> Vec<String> {
        dedup_keys(self.unhidden.iter().map(|(_, key)| key.as_str()))
    }
}

/// Diff a content target against a tag's links.
///
/// With `strict`, a visible ordering edge fails `parentMappingExist`; without
/// it the edge is left alone.
fn diff_edges(existing: &[ParentLink], target: &ContentTarget, strict: bool) -> Result<EdgeDiff> {
    let mut diff = EdgeDiff::default();
    for (parent_tag_type, parent_key) in &target.edges {
        let is_ordering = target.is_ordering_edge(parent_tag_type, parent_key);
        let found = existing
            .iter()
            .find(|l| &l.parent_tag_type == parent_tag_type && &l.parent_tag_id == parent_key);
        match found {
            Some(link) if link.hidden => {
                diff.unhidden.push((link.id, parent_key.clone()));
                if is_ordering {
                    diff.ordering_unhidden = true;
                }
            }
            Some(_) if is_ordering && strict => {
                return Err(Error::bad_request(codes::PARENT_MAPPING_EXIST));
            }
            Some(_) => {}
            None => diff.added.push((parent_tag_type.clone(), parent_key.clone())),
        }
    }
    Ok(diff)
}

/// How a new ordering edge is placed.
#[derive(Debug, Clone, Copy)]
enum OrderingEdge {
    /// Hidden, with a real order.
    Pending(i32),
    /// Visible, with the sentinel order (or 0 for unordered types).
    Floating(i32),
}

impl CurriculumEngine {
    /// Attach an existing tag to an additional parent chain.
    pub async fn update_tag_hierarchy(&self, req: HierarchyChange) -> Result<TagSummary> {
        let start = Instant::now();
        let tag = self.existing_tag(req.id).await?;
        if tag.tag_group != req.tag_group {
            return Err(Error::bad_request(codes::TAG_GROUP_MISMATCH));
        }
        let hidden = match tag.tag_group {
            TagGroup::Curriculum => self.attach_curriculum(&tag, &req).await?,
            TagGroup::Content => self.attach_content(&tag, &req).await?,
            TagGroup::Identifier => return Err(Error::bad_request(codes::TAG_GROUP_MISMATCH)),
        };
        info!(
            subsystem = "sync",
            op = "update_tag_hierarchy",
            tag_id = tag.id,
            hidden,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tag hierarchy updated"
        );
        Ok(summary(&tag, hidden))
    }

    /// Curriculum tags have a single `hierarchy` edge per parent key.
    async fn attach_curriculum(&self, tag: &Tag, req: &HierarchyChange) -> Result<bool> {
        let (rule, key) = self.curriculum_key(tag, req).await?;
        let existing = self.store.link_to_parent(tag.id, &key).await?;
        let pending_order = match &existing {
            Some(link) if !link.hidden => {
                return Err(Error::bad_request(codes::PARENT_MAPPING_EXIST));
            }
            Some(_) => None,
            None => {
                let rows = self.store.order_rows(&key, tag.tag_type).await?;
                Some(next_order(rule, &rows)?)
            }
        };

        let cache_keys = CachedReads::edge_keys(tag.id, tag.tag_type, [key.as_str()]);
        self.reads.invalidate(&cache_keys).await;

        let mut sync = self.begin("updateTagHierarchy").await?;
        let keys = vec![key.clone()];
        let written = async {
            self.index.add_parents(tag.id, &keys).await?;
            match (&existing, pending_order) {
                (Some(link), _) => {
                    sync.owe(CompensationTask::HideParents {
                        tag_id: tag.id,
                        parents: keys.clone(),
                    });
                    sync.tx().set_link_hidden(link.id, false).await?;
                }
                (None, order) => {
                    sync.owe(CompensationTask::RemoveParents {
                        tag_id: tag.id,
                        parents: keys.clone(),
                    });
                    self.index.hide_parents(tag.id, &keys).await?;
                    sync.tx()
                        .insert_link(&NewParentLink {
                            tag_id: tag.id,
                            tag_type: tag.tag_type,
                            parent_tag_type: defaults::HIERARCHY_CURRICULUM.to_string(),
                            parent_tag_id: key.clone(),
                            order: order.unwrap_or(0),
                            hidden: true,
                        })
                        .await?;
                }
            }
            Ok::<(), Error>(())
        }
        .await;
        if let Err(e) = written {
            return Err(sync.abort(e).await);
        }
        sync.commit().await?;
        self.reads.invalidate(&cache_keys).await;

        Ok(existing.is_none())
    }

    async fn attach_content(&self, tag: &Tag, req: &HierarchyChange) -> Result<bool> {
        let target = self
            .content_target(&req.hierarchy, &req.identifiers, req.curriculum_type, tag.tag_type)
            .await?;
        let existing = self.store.links_for_tag(tag.id).await?;
        let diff = diff_edges(&existing, &target, true)?;

        let ordering = match (&target.ordering_key, target.rule) {
            (Some(key), Some(rule)) if diff.added.iter().any(|(_, k)| k == key) => {
                let rows = self.store.order_rows(key, tag.tag_type).await?;
                Some(OrderingEdge::Pending(next_order(rule, &rows)?))
            }
            _ => None,
        };

        self.apply_diff("updateTagHierarchy", tag, &target, &diff, ordering)
            .await?;
        Ok(!diff.ordering_unhidden)
    }

    /// Write a diff: index first, then the link rows, then commit.
    async fn apply_diff(
        &self,
        op: &'static str,
        tag: &Tag,
        target: &ContentTarget,
        diff: &EdgeDiff,
        ordering: Option<OrderingEdge>,
    ) -> Result<()> {
        if diff.is_empty() {
            return Ok(());
        }
        let cache_keys = CachedReads::edge_keys(tag.id, tag.tag_type, target.parent_keys());
        self.reads.invalidate(&cache_keys).await;

        let mut sync = self.begin(op).await?;
        if let Err(e) = self.write_diff(&mut sync, tag, target, diff, ordering).await {
            return Err(sync.abort(e).await);
        }
        sync.commit().await?;
        self.reads.invalidate(&cache_keys).await;
        Ok(())
    }

    async fn write_diff(
        &self,
        sync: &mut SyncTx,
        tag: &Tag,
        target: &ContentTarget,
        diff: &EdgeDiff,
        ordering: Option<OrderingEdge>,
    ) -> Result<()> {
        let added = diff.added_keys();
        let unhidden = diff.unhidden_keys();
        let mut surfaced = added.clone();
        surfaced.extend(unhidden.iter().cloned());

        self.index.add_parents(tag.id, &dedup_keys(surfaced.iter().map(String::as_str))).await?;
        sync.owe(CompensationTask::RemoveParents {
            tag_id: tag.id,
            parents: added,
        });
        sync.owe(CompensationTask::HideParents {
            tag_id: tag.id,
            parents: unhidden,
        });

        for (parent_tag_type, parent_key) in &diff.added {
            let (order, hidden) = if target.is_ordering_edge(parent_tag_type, parent_key) {
                match ordering {
                    Some(OrderingEdge::Pending(order)) => {
                        self.index
                            .hide_parents(tag.id, std::slice::from_ref(parent_key))
                            .await?;
                        (order, true)
                    }
                    Some(OrderingEdge::Floating(order)) => (order, false),
                    None => (0, false),
                }
            } else {
                (0, false)
            };
            sync.tx()
                .insert_link(&NewParentLink {
                    tag_id: tag.id,
                    tag_type: tag.tag_type,
                    parent_tag_type: parent_tag_type.clone(),
                    parent_tag_id: parent_key.clone(),
                    order,
                    hidden,
                })
                .await?;
        }
        for (link_id, _) in &diff.unhidden {
            sync.tx().set_link_hidden(*link_id, false).await?;
        }
        Ok(())
    }

    /// Hide a tag's edge to one parent chain, relationally and in the index.
    ///
    /// A chain the tag is not linked under is a no-op.
    pub async fn remove_from_hierarchy(&self, req: HierarchyChange) -> Result<TagSummary> {
        let start = Instant::now();
        let tag = self.existing_tag(req.id).await?;
        if tag.tag_group != req.tag_group {
            return Err(Error::bad_request(codes::TAG_GROUP_MISMATCH));
        }
        let links: Vec<ParentLink> = match tag.tag_group {
            TagGroup::Curriculum => {
                let (_, key) = self.curriculum_key(&tag, &req).await?;
                self.store
                    .link_to_parent(tag.id, &key)
                    .await?
                    .into_iter()
                    .collect()
            }
            TagGroup::Content => self.content_links_to_remove(&tag, &req).await?,
            TagGroup::Identifier => return Err(Error::bad_request(codes::TAG_GROUP_MISMATCH)),
        };
        if links.is_empty() {
            debug!(
                subsystem = "sync",
                op = "remove_from_hierarchy",
                tag_id = tag.id,
                "No matching edge, nothing to hide"
            );
            return Ok(summary(&tag, true));
        }

        let parent_keys = dedup_keys(links.iter().map(|l| l.parent_tag_id.as_str()));
        let cache_keys =
            CachedReads::edge_keys(tag.id, tag.tag_type, parent_keys.iter().map(String::as_str));
        self.reads.invalidate(&cache_keys).await;

        let mut sync = self.begin("removeHierarchy").await?;
        let written = async {
            for link in &links {
                sync.tx().set_link_hidden(link.id, true).await?;
            }
            self.index.hide_parents(tag.id, &parent_keys).await?;
            sync.owe(CompensationTask::AddParents {
                tag_id: tag.id,
                parents: parent_keys.clone(),
            });
            Ok::<(), Error>(())
        }
        .await;
        if let Err(e) = written {
            return Err(sync.abort(e).await);
        }
        sync.commit().await?;
        self.reads.invalidate(&cache_keys).await;

        info!(
            subsystem = "sync",
            op = "remove_from_hierarchy",
            tag_id = tag.id,
            result_count = links.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Tag removed from hierarchy"
        );
        Ok(summary(&tag, true))
    }

    /// Ordering edge under the chain plus edges to the named identifier tags.
    async fn content_links_to_remove(&self, tag: &Tag, req: &HierarchyChange) -> Result<Vec<ParentLink>> {
        let existing = self.store.links_for_tag(tag.id).await?;
        let mut links: Vec<ParentLink> = Vec::new();

        if !req.hierarchy.is_empty() {
            let target = self
                .content_target(&req.hierarchy, &[], req.curriculum_type, tag.tag_type)
                .await?;
            if let Some(key) = &target.ordering_key {
                links.extend(existing.iter().filter(|l| &l.parent_tag_id == key).cloned());
            }
        }
        for identifier in self.reads.tags(&req.identifiers).await? {
            let id = identifier.id.to_string();
            links.extend(
                existing
                    .iter()
                    .filter(|l| {
                        l.parent_tag_type == identifier.tag_type.as_str() && l.parent_tag_id == id
                    })
                    .cloned(),
            );
        }
        Ok(links)
    }

    /// Level rule and plain parent key of a curriculum tag under `req.hierarchy`.
    async fn curriculum_key(&self, tag: &Tag, req: &HierarchyChange) -> Result<(LevelRule, String)> {
        if req.hierarchy.is_empty() {
            return Err(Error::bad_request(codes::HIERARCHY_ABSENT));
        }
        let ancestors = self.ancestors(&req.hierarchy).await?;
        let ct = self.curriculum_for(req.curriculum_type, &ancestors)?;
        let rule = self
            .schema(ct)?
            .get(tag.tag_type)
            .ok_or_else(|| Error::bad_request(codes::TAG_TYPE_INVALID))?;
        if rule.level == 1 {
            return Err(Error::bad_request(codes::TAG_TYPE_INVALID));
        }
        let key = self
            .resolver()
            .resolve_parent_key(ct, &ancestors, rule.level)?;
        Ok((rule, key))
    }

    /// Attach many tags to one parent chain, collecting every outcome.
    ///
    /// New ordering edges float with the sentinel order; a follow-up pass
    /// assigns real orders to the succeeded ids in input order.
    pub async fn bulk_attach(&self, req: BulkAttach) -> Result<BulkAttachResult> {
        let start = Instant::now();
        if req.hierarchy.is_empty() {
            return Err(Error::bad_request(codes::HIERARCHY_ABSENT));
        }
        let target = self
            .content_target(&req.hierarchy, &[], req.curriculum_type, req.tag_type)
            .await?;
        let rule = target
            .rule
            .ok_or_else(|| Error::bad_request(codes::TAG_TYPE_INVALID))?;

        let mut ids: Vec<TagId> = Vec::with_capacity(req.ids.len());
        for id in &req.ids {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }

        let units: Vec<_> = ids
            .iter()
            .map(|id| {
                let engine = self.clone();
                let target = target.clone();
                let (id, tag_type) = (*id, req.tag_type);
                (id, async move { engine.attach_one(id, tag_type, rule, &target).await })
            })
            .collect();
        let outcomes = partial_success("updateMultipleAdminTags", units).await;

        let mut ok: HashSet<TagId> = HashSet::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    ok.insert(id);
                }
                Err(e) => warn!(
                    subsystem = "sync",
                    op = "bulk_attach",
                    tag_id = id,
                    error = %e,
                    "Attach failed"
                ),
            }
        }
        let (succeeded, failed): (Vec<TagId>, Vec<TagId>) =
            ids.into_iter().partition(|id| ok.contains(id));

        if rule.is_ordered && !succeeded.is_empty() {
            if let Some(key) = &target.ordering_key {
                self.resolve_pending_orders(key, req.tag_type, &succeeded).await;
            }
        }

        info!(
            subsystem = "sync",
            op = "bulk_attach",
            result_count = succeeded.len(),
            failed = failed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Bulk attach complete"
        );
        Ok(BulkAttachResult { succeeded, failed })
    }

    async fn attach_one(
        &self,
        id: TagId,
        tag_type: TagType,
        rule: LevelRule,
        target: &ContentTarget,
    ) -> Result<()> {
        let tag = self.existing_tag(id).await?;
        if tag.tag_type != tag_type {
            return Err(Error::bad_request(codes::TAG_TYPE_INVALID));
        }
        let existing = self.store.links_for_tag(id).await?;
        let diff = diff_edges(&existing, target, false)?;
        let floating = if rule.is_ordered {
            defaults::ORDER_MAX
        } else {
            0
        };
        self.apply_diff(
            "updateMultipleAdminTags",
            &tag,
            target,
            &diff,
            Some(OrderingEdge::Floating(floating)),
        )
        .await
    }

    /// Replace sentinel orders under `parent_key`. Failures are logged only.
    async fn resolve_pending_orders(&self, parent_key: &str, tag_type: TagType, succeeded: &[TagId]) {
        let mut cache_keys = vec![keys::tag_order(parent_key, tag_type)];
        cache_keys.extend(succeeded.iter().map(|id| keys::links(*id)));
        self.reads.invalidate(&cache_keys).await;

        let result = async {
            let rows = self.store.order_rows(parent_key, tag_type).await?;
            let assignments = resolve_sentinels(&rows, succeeded);
            if assignments.is_empty() {
                return Ok(0);
            }
            let mut sync = self.begin("updateTagOrder").await?;
            for (link_id, order) in &assignments {
                if let Err(e) = sync.tx().set_link_order(*link_id, *order).await {
                    return Err(sync.abort(e).await);
                }
            }
            sync.commit().await?;
            Ok::<usize, Error>(assignments.len())
        }
        .await;

        match result {
            Ok(count) => info!(
                subsystem = "sync",
                op = "resolve_pending_orders",
                parent_key,
                result_count = count,
                "Pending orders resolved"
            ),
            Err(e) => warn!(
                subsystem = "sync",
                op = "resolve_pending_orders",
                parent_key,
                error = %e,
                "Pending order resolution failed"
            ),
        }
        self.reads.invalidate(&cache_keys).await;
    }
}

fn summary(tag: &Tag, hidden: bool) -> TagSummary {
    TagSummary {
        id: tag.id,
        tag_type: tag.tag_type,
        name: tag.name.clone(),
        hidden,
    }
}
