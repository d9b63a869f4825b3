//! Sibling-order allocation and ordering of tag lists.
//!
//! These functions are pure: callers supply the order rows for a
//! (parent key, tag type) pair, usually read through the cache layer.

use std::collections::HashMap;

use crate::defaults::{ORDER_MAX, TAG_LIMIT};
use crate::error::{codes, Error, Result};
use crate::models::{ParentLink, Tag, TagId};
use crate::schema::LevelRule;

/// Next order for a new sibling.
///
/// Unordered types always get 0. Ordered types get max+1 (1 on an empty
/// set), ignoring pending sentinel rows, and fail `tagLimitReached` at the cap.
pub fn next_order(rule: LevelRule, rows: &[ParentLink]) -> Result<i32> {
    if !rule.is_ordered {
        return Ok(0);
    }
    if rows.len() >= TAG_LIMIT {
        return Err(Error::bad_request(codes::TAG_LIMIT_REACHED));
    }
    Ok(max_order(rows) + 1)
}

/// Highest real order among `rows` (0 when none).
pub fn max_order(rows: &[ParentLink]) -> i32 {
    rows.iter()
        .map(|r| r.order)
        .filter(|o| *o != ORDER_MAX)
        .max()
        .unwrap_or(0)
}

/// Order `tags` for display.
///
/// Without order rows (or for unordered types) tags are sorted by
/// lowercase name. With order rows they follow the stored order; a tag
/// list longer than the row set fails `tagLengthMismatch`.
pub fn order_tags(tags: Vec<Tag>, rule: LevelRule, rows: &[ParentLink]) -> Result<Vec<Tag>> {
    if !rule.is_ordered || rows.is_empty() {
        return Ok(sort_by_name(tags));
    }
    if tags.len() > rows.len() {
        return Err(Error::internal(codes::TAG_LENGTH_MISMATCH));
    }

    let mut sorted: Vec<&ParentLink> = rows.iter().collect();
    sorted.sort_by_key(|r| r.order);

    let mut by_id: HashMap<TagId, Tag> = tags.into_iter().map(|t| (t.id, t)).collect();
    let mut ordered = Vec::with_capacity(by_id.len());
    for row in sorted {
        if let Some(tag) = by_id.remove(&row.tag_id) {
            ordered.push(tag);
        }
    }
    Ok(ordered)
}

pub fn sort_by_name(mut tags: Vec<Tag>) -> Vec<Tag> {
    tags.sort_by_cached_key(|t| t.name.to_lowercase());
    tags
}

/// Real orders for sentinel rows belonging to `succeeded`, in `succeeded` order.
///
/// Returns `(link id, order)` pairs starting after the highest real order.
pub fn resolve_sentinels(rows: &[ParentLink], succeeded: &[TagId]) -> Vec<(i64, i32)> {
    let pending: HashMap<TagId, i64> = rows
        .iter()
        .filter(|r| r.order == ORDER_MAX)
        .map(|r| (r.tag_id, r.id))
        .collect();
    let mut next = max_order(rows);
    let mut assignments = Vec::new();
    for tag_id in succeeded {
        if let Some(link_id) = pending.get(tag_id) {
            next += 1;
            assignments.push((*link_id, next));
        }
    }
    assignments
}
