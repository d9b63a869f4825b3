//! Tag creation: single creates per tag group and positional multi-create.

use std::time::Instant;

use tracing::{debug, info};

use curric_core::ordering::next_order;
use curric_core::{
    codes, defaults, CompensationTask, Error, NewParentLink, NewTag, Result, TagGroup, TagId,
};

use super::{dedup_keys, index_document, Placement};
use crate::batch::{fail_fast, isolated};
use crate::cache::keys;
use crate::engine::{CurriculumEngine, SyncTx};
use crate::requests::{CreateTag, TagSummary};

#[derive(Debug, Clone)]
struct PlannedEdge {
    parent_tag_type: String,
    parent_key: String,
    order: i32,
    hidden: bool,
}

impl PlannedEdge {
    fn visible(parent_tag_type: impl Into<String>, parent_key: impl Into<String>) -> Self {
        Self {
            parent_tag_type: parent_tag_type.into(),
            parent_key: parent_key.into(),
            order: 0,
            hidden: false,
        }
    }
}

/// Fully validated create, ready to write.
#[derive(Debug, Clone)]
pub(crate) struct CreatePlan {
    new: NewTag,
    edges: Vec<PlannedEdge>,
}

impl CreatePlan {
    fn parent_keys(&self) -> Vec<String> {
        dedup_keys(self.edges.iter().map(|e| e.parent_key.as_str()))
    }

    fn hidden_keys(&self) -> Vec<String> {
        dedup_keys(
            self.edges
                .iter()
                .filter(|e| e.hidden)
                .map(|e| e.parent_key.as_str()),
        )
    }

    fn order_cache_keys(&self) -> Vec<String> {
        self.parent_keys()
            .iter()
            .map(|key| keys::tag_order(key, self.new.tag_type))
            .collect()
    }

    fn summary(&self, id: TagId) -> TagSummary {
        TagSummary {
            id,
            tag_type: self.new.tag_type,
            name: self.new.name.clone(),
            hidden: self.edges.iter().any(|e| e.hidden),
        }
    }
}

impl CurriculumEngine {
    /// Create a tag under its parent chain.
    ///
    /// Curriculum and content tags start hidden at their ordering key with the
    /// next sibling order; identifier tags have no parents.
    pub async fn create_tag(&self, req: CreateTag) -> Result<TagSummary> {
        let start = Instant::now();
        let plan = self.plan_create(&req, Placement::Admin).await?;
        let summary = self.write_plan("createTag", &plan).await?;
        info!(
            subsystem = "sync",
            op = "create_tag",
            tag_id = summary.id,
            tag_type = %summary.tag_type,
            tag_group = %req.tag_group,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tag created"
        );
        Ok(summary)
    }

    /// Create several teacher tags, all-or-nothing on validation.
    ///
    /// Every item is validated concurrently first; the first invalid item
    /// fails the whole call before anything is written. Items are then
    /// written one at a time in input order, stopping at the first failure.
    pub async fn create_tags_positional(&self, reqs: Vec<CreateTag>) -> Result<Vec<TagSummary>> {
        let start = Instant::now();
        let units: Vec<_> = reqs
            .into_iter()
            .map(|req| {
                let engine = self.clone();
                async move { engine.plan_create(&req, Placement::Teacher).await }
            })
            .collect();
        let plans = fail_fast("createTag", units).await?;
        debug!(
            subsystem = "sync",
            op = "create_tags_positional",
            result_count = plans.len(),
            "Positional batch validated"
        );

        let mut created = Vec::with_capacity(plans.len());
        for plan in plans {
            let engine = self.clone();
            let summary =
                isolated("createTag", async move { engine.write_plan("createTag", &plan).await })
                    .await?;
            created.push(summary);
        }

        info!(
            subsystem = "sync",
            op = "create_tags_positional",
            result_count = created.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Positional batch created"
        );
        Ok(created)
    }

    pub(crate) async fn plan_create(&self, req: &CreateTag, placement: Placement) -> Result<CreatePlan> {
        match req.tag_group {
            TagGroup::Curriculum => self.plan_curriculum(req, placement).await,
            TagGroup::Content => self.plan_content(req, placement).await,
            TagGroup::Identifier => self.plan_identifier(req, placement),
        }
    }

    async fn plan_curriculum(&self, req: &CreateTag, placement: Placement) -> Result<CreatePlan> {
        if req.hierarchy.is_empty() {
            return Err(Error::bad_request(codes::HIERARCHY_ABSENT));
        }
        let ancestors = self.ancestors(&req.hierarchy).await?;
        let ct = self.curriculum_for(req.curriculum_type, &ancestors)?;
        let rule = self
            .schema(ct)?
            .get(req.tag_type)
            .ok_or_else(|| Error::bad_request(codes::TAG_TYPE_INVALID))?;
        if rule.level == 1 {
            return Err(Error::bad_request(codes::TAG_TYPE_INVALID));
        }
        let parent_key = self
            .resolver()
            .resolve_parent_key(ct, &ancestors, rule.level)?;

        let edge = match placement {
            Placement::Admin => {
                let rows = self.reads.order_rows(&parent_key, req.tag_type).await?;
                PlannedEdge {
                    parent_tag_type: defaults::HIERARCHY_CURRICULUM.to_string(),
                    parent_key,
                    order: next_order(rule, &rows)?,
                    hidden: true,
                }
            }
            Placement::Teacher => PlannedEdge::visible(defaults::HIERARCHY_CURRICULUM, parent_key),
        };
        Ok(CreatePlan {
            new: self.new_tag_for(req, ct, placement),
            edges: vec![edge],
        })
    }

    async fn plan_content(&self, req: &CreateTag, placement: Placement) -> Result<CreatePlan> {
        if req.hierarchy.is_empty() {
            return Err(Error::bad_request(codes::HIERARCHY_ABSENT));
        }
        let ancestors = self.ancestors(&req.hierarchy).await?;
        let ct = self.curriculum_for(req.curriculum_type, &ancestors)?;
        let target = self
            .content_target_for(Some((ancestors.as_slice(), ct)), &req.identifiers, req.tag_type)
            .await?;

        let mut edges = Vec::with_capacity(target.edges.len());
        for (parent_tag_type, parent_key) in &target.edges {
            let is_ordering = target.is_ordering_edge(parent_tag_type, parent_key);
            let edge = match (is_ordering, placement, target.rule) {
                (true, Placement::Admin, Some(rule)) => {
                    let rows = self.reads.order_rows(parent_key, req.tag_type).await?;
                    PlannedEdge {
                        parent_tag_type: parent_tag_type.clone(),
                        parent_key: parent_key.clone(),
                        order: next_order(rule, &rows)?,
                        hidden: true,
                    }
                }
                _ => PlannedEdge::visible(parent_tag_type.clone(), parent_key.clone()),
            };
            edges.push(edge);
        }

        Ok(CreatePlan {
            new: self.new_tag_for(req, ct, placement),
            edges,
        })
    }

    fn plan_identifier(&self, req: &CreateTag, placement: Placement) -> Result<CreatePlan> {
        let ct = self.curriculum_for(req.curriculum_type, &[])?;
        let rule = self
            .schema(ct)?
            .get(req.tag_type)
            .ok_or_else(|| Error::bad_request(codes::TAG_TYPE_INVALID))?;
        if !rule.is_identifier {
            return Err(Error::bad_request(codes::TAG_TYPE_INVALID));
        }
        Ok(CreatePlan {
            new: self.new_tag_for(req, ct, placement),
            edges: Vec::new(),
        })
    }

    async fn write_plan(&self, op: &'static str, plan: &CreatePlan) -> Result<TagSummary> {
        let cache_keys = plan.order_cache_keys();
        self.reads.invalidate(&cache_keys).await;

        let mut sync = self.begin(op).await?;
        let id = match self.write_planned(&mut sync, plan).await {
            Ok(id) => id,
            Err(e) => return Err(sync.abort(e).await),
        };
        sync.commit().await?;

        let mut cache_keys = cache_keys;
        cache_keys.push(keys::links(id));
        self.reads.invalidate(&cache_keys).await;
        Ok(plan.summary(id))
    }

    async fn write_planned(&self, sync: &mut SyncTx, plan: &CreatePlan) -> Result<TagId> {
        let id = sync.tx().insert_tag(&plan.new).await?;

        let doc = index_document(id, &plan.new, plan.parent_keys());
        self.index.upsert_tag(&doc).await?;
        sync.owe(CompensationTask::MarkDeleted { tag_id: id });

        let hidden = plan.hidden_keys();
        if !hidden.is_empty() {
            self.index.hide_parents(id, &hidden).await?;
        }

        for edge in &plan.edges {
            sync.tx()
                .insert_link(&NewParentLink {
                    tag_id: id,
                    tag_type: plan.new.tag_type,
                    parent_tag_type: edge.parent_tag_type.clone(),
                    parent_tag_id: edge.parent_key.clone(),
                    order: edge.order,
                    hidden: edge.hidden,
                })
                .await?;
        }
        Ok(id)
    }
}
