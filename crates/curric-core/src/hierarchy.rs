//! Hierarchy resolution: validates ancestor sets against a curriculum schema
//! and derives the dot-joined parent keys used by both stores.

use std::collections::BTreeMap;

use tracing::debug;

use crate::defaults::PARENT_KEY_SEPARATOR;
use crate::error::{codes, Error, Result};
use crate::models::{AccessMode, CurriculumType, Tag, TagId, TagType};
use crate::schema::{HierarchySchema, SchemaRegistry};

/// Keys derived for a content tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentKeys {
    /// Non-identifier ancestors, level-ordered. Top-level grouping key.
    pub curriculum_key: String,
    /// Every supplied ancestor including identifiers, level-ordered.
    /// Sibling order and visibility are tracked under this key.
    pub ordering_key: String,
    /// Identifier tag type → identifier ancestor id.
    pub identifiers: BTreeMap<TagType, TagId>,
}

/// Join ids into a parent key.
pub fn join_parent_key<I>(ids: I) -> String
where
    I: IntoIterator<Item = TagId>,
{
    let mut key = String::new();
    for id in ids {
        if !key.is_empty() {
            key.push(PARENT_KEY_SEPARATOR);
        }
        key.push_str(&id.to_string());
    }
    key
}

/// Append a child id to an existing parent key.
pub fn child_key(parent_key: &str, id: TagId) -> String {
    if parent_key.is_empty() {
        id.to_string()
    } else {
        format!("{}{}{}", parent_key, PARENT_KEY_SEPARATOR, id)
    }
}

/// Resolver bound to a schema registry.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyResolver<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> HierarchyResolver<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'a SchemaRegistry {
        self.registry
    }

    /// Plain chain resolution for curriculum tags.
    ///
    /// Every ancestor must sit strictly above `target_level`. Intermediate
    /// levels may be absent.
    pub fn resolve_parent_key(
        &self,
        curriculum_type: CurriculumType,
        ancestors: &[Option<Tag>],
        target_level: usize,
    ) -> Result<String> {
        let schema = self.registry.curriculum(curriculum_type)?;
        let mapped = curriculum_type.canonical();

        let mut placed: Vec<(usize, TagId)> = Vec::with_capacity(ancestors.len());
        for ancestor in ancestors {
            let tag = ancestor
                .as_ref()
                .ok_or_else(|| Error::bad_request(codes::PARENT_TAG_TYPE_ABSENT))?;
            let rule = schema
                .get(tag.tag_type)
                .ok_or_else(|| Error::bad_request(codes::PARENT_TAG_INVALID))?;
            check_curriculum(tag, mapped)?;
            if rule.level >= target_level {
                return Err(Error::bad_request(format!(
                    "{} id: {}",
                    codes::PARENT_TAG_INVALID,
                    tag.id
                )));
            }
            placed.push((rule.level, tag.id));
        }
        placed.sort_by_key(|(level, _)| *level);

        let key = join_parent_key(placed.into_iter().map(|(_, id)| id));
        debug!(
            subsystem = "hierarchy",
            op = "resolve_parent_key",
            curriculum_type = %curriculum_type,
            parent_key = %key,
            "Resolved curriculum parent key"
        );
        Ok(key)
    }

    /// Content chain resolution.
    ///
    /// Classifies each ancestor as ordinary or identifier and requires every
    /// level above the target to be covered, except identifier levels on
    /// [`AccessMode::Read`] and the board level.
    pub fn resolve_parent_keys_for_content(
        &self,
        curriculum_type: CurriculumType,
        tag_type: TagType,
        ancestors: &[Option<Tag>],
        mode: AccessMode,
    ) -> Result<ContentKeys> {
        let schema = self.registry.curriculum(curriculum_type)?;
        let target = schema
            .get(tag_type)
            .ok_or_else(|| Error::bad_request(codes::TAG_TYPE_INVALID))?;
        if target.level == 1 {
            return Err(Error::bad_request(codes::NOT_ENOUGH_PARENT_TAGS));
        }
        let mapped = curriculum_type.canonical();
        let slots = target.level - 1;

        let mut all: Vec<Option<TagId>> = vec![None; slots];
        let mut ordinary: Vec<Option<TagId>> = vec![None; slots];
        let mut identifier_levels = vec![false; slots];
        let mut identifiers = BTreeMap::new();

        for ancestor in ancestors {
            let tag = ancestor
                .as_ref()
                .ok_or_else(|| Error::bad_request(codes::PARENT_TAG_TYPE_ABSENT))?;
            let rule = schema
                .get(tag.tag_type)
                .ok_or_else(|| Error::bad_request(codes::HIERARCHY_INVALID))?;
            check_curriculum(tag, mapped)?;
            if rule.level > slots {
                return Err(Error::bad_request(codes::HIERARCHY_INVALID));
            }
            let slot = rule.level - 1;
            all[slot] = Some(tag.id);
            if rule.is_identifier {
                if identifier_levels[slot] {
                    return Err(Error::bad_request(codes::ILLEGAL_PARENT_IDENTIFIER_TAGS));
                }
                identifier_levels[slot] = true;
                identifiers.insert(tag.tag_type, tag.id);
            } else {
                ordinary[slot] = Some(tag.id);
            }
        }

        check_coverage(schema, &all, mode)?;

        let keys = ContentKeys {
            curriculum_key: join_parent_key(ordinary.into_iter().flatten()),
            ordering_key: join_parent_key(all.into_iter().flatten()),
            identifiers,
        };
        debug!(
            subsystem = "hierarchy",
            op = "resolve_parent_keys_for_content",
            curriculum_type = %curriculum_type,
            tag_type = %tag_type,
            parent_key = %keys.ordering_key,
            "Resolved content parent keys"
        );
        Ok(keys)
    }
}

fn check_curriculum(tag: &Tag, mapped: CurriculumType) -> Result<()> {
    if tag.curriculum_type != CurriculumType::Root && tag.curriculum_type != mapped {
        return Err(Error::bad_request(codes::PARENT_TAG_TYPE_INVALID));
    }
    Ok(())
}

fn check_coverage(schema: &HierarchySchema, filled: &[Option<TagId>], mode: AccessMode) -> Result<()> {
    for (tag_type, rule) in schema.iter() {
        if rule.level > filled.len() || filled[rule.level - 1].is_some() {
            continue;
        }
        if rule.is_identifier && mode == AccessMode::Read {
            continue;
        }
        if tag_type == TagType::Board {
            continue;
        }
        return Err(Error::bad_request(codes::PARENT_TAG_MISSING));
    }
    Ok(())
}
