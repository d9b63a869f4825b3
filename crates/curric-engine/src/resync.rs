//! Rebuild index documents from the relational store.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info};

use curric_core::{codes, Error, IndexDocument, Result, Tag, TagId};

use crate::engine::CurriculumEngine;
use crate::sync::dedup_keys;

/// Outcome of one resync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    pub scanned: usize,
    pub rebuilt: usize,
    pub failed: Vec<TagId>,
}

impl ResyncReport {
    pub fn absorb(&mut self, other: ResyncReport) {
        self.scanned += other.scanned;
        self.rebuilt += other.rebuilt;
        self.failed.extend(other.failed);
    }
}

impl CurriculumEngine {
    /// Rewrite the index document of every tag with an id in `start..=end`.
    ///
    /// A tag that fails is recorded and the pass continues.
    pub async fn resync(&self, start: TagId, end: TagId) -> Result<ResyncReport> {
        if start > end {
            return Err(Error::bad_request(codes::START_GREATER_THAN_END));
        }
        let started = Instant::now();
        let tags = self.store.tags_in_range(start, end).await?;
        let mut report = ResyncReport {
            scanned: tags.len(),
            ..Default::default()
        };
        for tag in &tags {
            match self.resync_tag(tag).await {
                Ok(()) => report.rebuilt += 1,
                Err(e) => {
                    error!(
                        subsystem = "resync",
                        tag_id = tag.id,
                        error = %e,
                        "Tag resync failed"
                    );
                    report.failed.push(tag.id);
                }
            }
        }
        info!(
            subsystem = "resync",
            start,
            end,
            result_count = report.rebuilt,
            failed = report.failed.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Resync range complete"
        );
        Ok(report)
    }

    async fn resync_tag(&self, tag: &Tag) -> Result<()> {
        let links = self.store.links_for_tag(tag.id).await?;
        let parents = dedup_keys(links.iter().map(|l| l.parent_tag_id.as_str()));
        // A key is hidden only when no visible edge shares it.
        let hidden: Vec<String> = parents
            .iter()
            .filter(|key| {
                links
                    .iter()
                    .filter(|l| &l.parent_tag_id == *key)
                    .all(|l| l.hidden)
            })
            .cloned()
            .collect();

        let doc = IndexDocument {
            id: tag.id,
            tag_type: tag.tag_type,
            names: self.index_names(tag, &tag.name).await?,
            curriculum_type: tag.curriculum_type,
            creator_id: tag.creator_id,
            creator_type: tag.creator_type.clone(),
            access: tag.access,
            tag_group: tag.tag_group,
            country_id: tag.country_id.clone(),
            parents,
            deleted: !tag.publish,
        };
        self.index.upsert_tag(&doc).await?;
        if !hidden.is_empty() {
            self.index.hide_parents(tag.id, &hidden).await?;
        }
        debug!(
            subsystem = "resync",
            tag_id = tag.id,
            parents = doc.parents.len(),
            hidden = hidden.len(),
            "Index document rebuilt"
        );
        Ok(())
    }
}
