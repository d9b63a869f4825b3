//! Sync engine: writes that keep the relational store and the search index
//! aligned.
//!
//! Each operation resolves its parent chain first, then runs through a
//! [`SyncTx`](crate::engine::SyncTx) so index writes made before a failed
//! commit are compensated. Affected cache keys are deleted before the
//! relational write and again after commit.

mod create;
mod hierarchy;
mod order;
mod tag;

use std::collections::BTreeMap;

use curric_core::{
    codes, defaults, root_or_derived, Access, AccessMode, CurriculumType, Error, IndexDocument,
    LevelRule, NewTag, Result, Tag, TagGroup, TagId, TagName, TagType,
};

use crate::engine::CurriculumEngine;
use crate::requests::CreateTag;

/// How a new placement is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Placement {
    /// Global tag; the ordering edge starts hidden with a fresh order.
    Admin,
    /// Teacher tag; every edge is visible with order 0.
    Teacher,
}

impl Placement {
    fn access(self) -> Access {
        match self {
            Placement::Admin => Access::Global,
            Placement::Teacher => Access::Teacher,
        }
    }
}

/// Desired edge set of a content tag under one parent chain.
#[derive(Debug, Clone)]
pub(crate) struct ContentTarget {
    /// Level rule of the tag type; `None` for identifier-only targets.
    pub rule: Option<LevelRule>,
    pub ordering_key: Option<String>,
    /// (parent_tag_type, parent key) pairs, ordering edge included.
    pub edges: Vec<(String, String)>,
}

impl ContentTarget {
    fn is_ordering_edge(&self, parent_tag_type: &str, parent_key: &str) -> bool {
        parent_tag_type == defaults::HIERARCHY_CURRICULUM
            && self.ordering_key.as_deref() == Some(parent_key)
    }

    fn parent_keys(&self) -> impl Iterator<Item = &str> {
        self.edges.iter().map(|(_, key)| key.as_str())
    }
}

/// Index document for a freshly inserted tag.
pub(crate) fn index_document(id: TagId, new: &NewTag, parents: Vec<String>) -> IndexDocument {
    IndexDocument {
        id,
        tag_type: new.tag_type,
        names: vec![TagName {
            value: new.name.clone(),
            locale: defaults::DEFAULT_LOCALE.to_string(),
        }],
        curriculum_type: new.curriculum_type,
        creator_id: new.creator_id,
        creator_type: new.creator_type.clone(),
        access: new.access,
        tag_group: new.tag_group,
        country_id: new.country_id.clone(),
        parents,
        deleted: false,
    }
}

/// Keep the first occurrence of every key.
pub(crate) fn dedup_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for key in keys {
        if !out.iter().any(|k| k == key) {
            out.push(key.to_string());
        }
    }
    out
}

impl CurriculumEngine {
    /// Resolve the edges a content tag of `tag_type` needs under `hierarchy`,
    /// plus one edge per extra identifier tag not already covered.
    pub(crate) async fn content_target(
        &self,
        hierarchy: &[TagId],
        identifiers: &[TagId],
        curriculum_type: CurriculumType,
        tag_type: TagType,
    ) -> Result<ContentTarget> {
        if hierarchy.is_empty() {
            return self.content_target_for(None, identifiers, tag_type).await;
        }
        let ancestors = self.ancestors(hierarchy).await?;
        let ct = self.curriculum_for(curriculum_type, &ancestors)?;
        self.content_target_for(Some((ancestors.as_slice(), ct)), identifiers, tag_type)
            .await
    }

    /// [`Self::content_target`] over an already fetched chain and its
    /// resolved curriculum type.
    pub(crate) async fn content_target_for(
        &self,
        chain: Option<(&[Option<Tag>], CurriculumType)>,
        identifiers: &[TagId],
        tag_type: TagType,
    ) -> Result<ContentTarget> {
        let mut identifier_ids: BTreeMap<TagType, TagId> = BTreeMap::new();
        let mut edges = Vec::new();
        let mut rule = None;
        let mut ordering_key = None;

        if let Some((ancestors, ct)) = chain {
            let keys = self.resolver().resolve_parent_keys_for_content(
                ct,
                tag_type,
                ancestors,
                AccessMode::Write,
            )?;
            rule = Some(self.schema(ct)?.rule(tag_type)?);
            edges.push((root_or_derived(ct).to_string(), keys.curriculum_key));
            edges.push((
                defaults::HIERARCHY_CURRICULUM.to_string(),
                keys.ordering_key.clone(),
            ));
            ordering_key = Some(keys.ordering_key);
            identifier_ids = keys.identifiers;
        }

        for extra in self.reads.tags(identifiers).await? {
            if extra.tag_group != TagGroup::Identifier {
                return Err(Error::bad_request(codes::ILLEGAL_PARENT_IDENTIFIER_TAGS));
            }
            identifier_ids.entry(extra.tag_type).or_insert(extra.id);
        }
        edges.extend(
            identifier_ids
                .into_iter()
                .map(|(t, id)| (t.as_str().to_string(), id.to_string())),
        );

        Ok(ContentTarget {
            rule,
            ordering_key,
            edges,
        })
    }

    /// Insert payload for a create request.
    pub(crate) fn new_tag_for(
        &self,
        req: &CreateTag,
        curriculum_type: CurriculumType,
        placement: Placement,
    ) -> NewTag {
        let mut attributes = req.attributes.clone();
        if matches!(
            req.tag_type,
            TagType::Subject | TagType::Test | TagType::Skill | TagType::Course
        ) {
            attributes.apply_display_defaults(&self.config.default_color, &self.config.default_pic);
        }
        NewTag {
            tag_type: req.tag_type,
            name: req.name.clone(),
            curriculum_type: curriculum_type.canonical(),
            creator_id: req.creator_id,
            creator_type: req.creator_type.clone(),
            access: placement.access(),
            tag_group: req.tag_group,
            country_id: req.country(),
            attributes,
        }
    }

    /// Names pushed to the index: the English name first, then every locale.
    pub(crate) async fn index_names(&self, tag: &Tag, name: &str) -> Result<Vec<TagName>> {
        let mut names = vec![TagName {
            value: name.to_string(),
            locale: defaults::DEFAULT_LOCALE.to_string(),
        }];
        if tag.locale_available {
            names.extend(
                self.store
                    .locales_for_tag(tag.id)
                    .await?
                    .into_iter()
                    .map(|m| TagName {
                        value: m.name,
                        locale: m.locale,
                    }),
            );
        }
        Ok(names)
    }
}
