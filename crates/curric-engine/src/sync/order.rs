use std::time::Instant;

use tracing::info;

use curric_core::{codes, AccessMode, CompensationTask, Error, Result, TagGroup, TagId};

use crate::cache::keys;
use crate::engine::CurriculumEngine;
use crate::requests::UpdateTagOrder;

impl CurriculumEngine {
    /// Apply explicit sibling orders under one parent chain.
    ///
    /// Every listed tag must already have a row under the resolved key. All
    /// orders are written in a single transaction; hidden rows that receive an
    /// order are surfaced, in the index first.
    pub async fn update_tag_order(&self, req: UpdateTagOrder) -> Result<()> {
        let start = Instant::now();
        let ancestors = self.ancestors(&req.hierarchy).await?;
        let ct = self.curriculum_for(req.curriculum_type, &ancestors)?;
        let rule = self
            .schema(ct)?
            .get(req.tag_type)
            .ok_or_else(|| Error::bad_request(codes::TAG_TYPE_INVALID))?;
        if !rule.is_ordered {
            return Err(Error::bad_request(codes::ORDERING_NOT_ALLOWED));
        }

        let parent_key = match req.tag_group {
            TagGroup::Curriculum => self
                .resolver()
                .resolve_parent_key(ct, &ancestors, rule.level)?,
            TagGroup::Content => {
                self.resolver()
                    .resolve_parent_keys_for_content(ct, req.tag_type, &ancestors, AccessMode::Write)?
                    .ordering_key
            }
            TagGroup::Identifier => return Err(Error::bad_request(codes::ORDERING_NOT_ALLOWED)),
        };

        let rows = self.store.order_rows(&parent_key, req.tag_type).await?;
        let mut assignments: Vec<(i64, i32)> = Vec::with_capacity(req.orders.len());
        let mut surfaced: Vec<(i64, TagId)> = Vec::new();
        for entry in &req.orders {
            let row = rows
                .iter()
                .find(|row| row.tag_id == entry.id)
                .ok_or_else(|| Error::bad_request(codes::TAG_ID_MISSING))?;
            assignments.push((row.id, entry.order));
            if row.hidden {
                surfaced.push((row.id, row.tag_id));
            }
        }

        let mut cache_keys = vec![keys::tag_order(&parent_key, req.tag_type)];
        cache_keys.extend(req.orders.iter().map(|entry| keys::links(entry.id)));
        self.reads.invalidate(&cache_keys).await;

        let parents = vec![parent_key.clone()];
        let mut sync = self.begin("updateTagOrder").await?;
        let written = async {
            for (link_id, order) in &assignments {
                sync.tx().set_link_order(*link_id, *order).await?;
            }
            for (link_id, tag_id) in &surfaced {
                self.index.add_parents(*tag_id, &parents).await?;
                sync.owe(CompensationTask::HideParents {
                    tag_id: *tag_id,
                    parents: parents.clone(),
                });
                sync.tx().set_link_hidden(*link_id, false).await?;
            }
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
            op = "update_tag_order",
            parent_key = %parent_key,
            tag_type = %req.tag_type,
            result_count = assignments.len(),
            surfaced = surfaced.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Tag order updated"
        );
        Ok(())
    }
}
