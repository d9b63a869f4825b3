//! Decoded domain requests and responses for engine operations.
//!
//! These types arrive already validated by the transport layer; the engine
//! only enforces hierarchy and ordering rules on them.

use serde::{Deserialize, Serialize};

use curric_core::{
    defaults, Access, Attributes, CurriculumType, Tag, TagGroup, TagId, TagLocaleMapping, TagType,
};

// =============================================================================
// WRITES
// =============================================================================

/// Create one tag under a parent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTag {
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub name: String,
    pub tag_group: TagGroup,
    pub curriculum_type: CurriculumType,
    /// Ancestor tag ids, any order.
    #[serde(default)]
    pub hierarchy: Vec<TagId>,
    /// Extra identifier tags to link the new tag to.
    #[serde(default)]
    pub identifiers: Vec<TagId>,
    #[serde(default)]
    pub creator_id: Option<i64>,
    #[serde(default)]
    pub creator_type: Option<String>,
    #[serde(default)]
    pub country_id: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl CreateTag {
    pub fn new(
        tag_type: TagType,
        name: impl Into<String>,
        tag_group: TagGroup,
        curriculum_type: CurriculumType,
    ) -> Self {
        Self {
            tag_type,
            name: name.into(),
            tag_group,
            curriculum_type,
            hierarchy: Vec::new(),
            identifiers: Vec::new(),
            creator_id: None,
            creator_type: None,
            country_id: None,
            attributes: Attributes::new(),
        }
    }

    pub fn under(mut self, hierarchy: impl Into<Vec<TagId>>) -> Self {
        self.hierarchy = hierarchy.into();
        self
    }

    pub fn with_identifiers(mut self, identifiers: impl Into<Vec<TagId>>) -> Self {
        self.identifiers = identifiers.into();
        self
    }

    pub fn with_creator(mut self, id: i64, creator_type: impl Into<String>) -> Self {
        self.creator_id = Some(id);
        self.creator_type = Some(creator_type.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub(crate) fn country(&self) -> String {
        self.country_id
            .clone()
            .unwrap_or_else(|| defaults::DEFAULT_COUNTRY_ID.to_string())
    }
}

/// Short result of a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSummary {
    pub id: TagId,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub name: String,
    pub hidden: bool,
}

/// Attach a tag to, or detach it from, one parent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyChange {
    pub id: TagId,
    pub tag_group: TagGroup,
    pub curriculum_type: CurriculumType,
    #[serde(default)]
    pub hierarchy: Vec<TagId>,
    #[serde(default)]
    pub identifiers: Vec<TagId>,
}

pub type UpdateTagHierarchy = HierarchyChange;
pub type RemoveHierarchy = HierarchyChange;

/// Patch of a tag's own columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTag {
    pub id: TagId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attributes: Option<Attributes>,
    #[serde(default)]
    pub hidden: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocaleAction {
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleEntry {
    pub locale: String,
    pub country_id: String,
}

/// Add or remove localized names of one tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagLocaleUpdate {
    pub action: LocaleAction,
    pub id: TagId,
    /// Localized name written for every entry on `add`.
    #[serde(default)]
    pub name: String,
    pub locales: Vec<LocaleEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub id: TagId,
    pub order: i32,
}

/// Reorder siblings under one parent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateTagOrder {
    pub tag_group: TagGroup,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub curriculum_type: CurriculumType,
    pub hierarchy: Vec<TagId>,
    pub orders: Vec<OrderEntry>,
}

/// Attach many existing tags to one parent chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkAttach {
    pub ids: Vec<TagId>,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub curriculum_type: CurriculumType,
    pub hierarchy: Vec<TagId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkAttachResult {
    pub succeeded: Vec<TagId>,
    pub failed: Vec<TagId>,
}

// =============================================================================
// READS
// =============================================================================

/// Index filter for `get_tags`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTagsFilter {
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub tag_type: Option<TagType>,
    pub curriculum_type: Option<CurriculumType>,
    pub creator_id: Option<i64>,
    pub creator_type: Option<String>,
    pub access: Option<Access>,
    pub tag_group: Option<TagGroup>,
    pub country_id: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub hidden_parents: Vec<String>,
    #[serde(default)]
    pub start: i64,
    /// Page size; 0 means the default.
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagsPage {
    pub tags: Vec<Tag>,
    /// Offset of the next page, `-1` when exhausted.
    pub next: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocaleView {
    pub locale: String,
    pub country_id: String,
    pub name: String,
}

impl From<&TagLocaleMapping> for LocaleView {
    fn from(m: &TagLocaleMapping) -> Self {
        Self {
            locale: m.locale.clone(),
            country_id: m.country_id.clone(),
            name: m.name.clone(),
        }
    }
}

/// A tag as returned to readers, with display enrichment applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagView {
    pub id: TagId,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub name: String,
    pub curriculum_type: CurriculumType,
    pub tag_group: TagGroup,
    pub access: Access,
    pub country_id: String,
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub locales: Vec<LocaleView>,
}

impl From<Tag> for TagView {
    fn from(tag: Tag) -> Self {
        Self {
            id: tag.id,
            tag_type: tag.tag_type,
            name: tag.name,
            curriculum_type: tag.curriculum_type,
            tag_group: tag.tag_group,
            access: tag.access,
            country_id: tag.country_id,
            attributes: tag.attributes,
            grade: None,
            locales: Vec::new(),
        }
    }
}

/// Id lookup with optional localization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTagsByIds {
    pub ids: Vec<TagId>,
    pub country_id: Option<String>,
    pub locale: Option<String>,
    #[serde(default)]
    pub with_locales: bool,
}

impl GetTagsByIds {
    pub fn new(ids: impl Into<Vec<TagId>>) -> Self {
        Self {
            ids: ids.into(),
            ..Default::default()
        }
    }

    pub fn localized(mut self, country_id: impl Into<String>, locale: impl Into<String>) -> Self {
        self.country_id = Some(country_id.into());
        self.locale = Some(locale.into());
        self
    }
}

/// Children of one type under an ancestor set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyQuery {
    pub hierarchy: Vec<TagId>,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub curriculum_type: CurriculumType,
    pub tag_group: TagGroup,
    /// Country tag id used to scope multi-grade expansion.
    pub country_id: Option<String>,
    /// Teacher whose own tags are merged into the listing.
    pub creator_id: Option<i64>,
    pub text: Option<String>,
    pub locale: Option<String>,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub limit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateHierarchy {
    pub curriculum_type: CurriculumType,
    pub paths: Vec<Vec<TagId>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedCurriculumRequest {
    pub tag_ids: Vec<TagId>,
    pub curriculum_type: CurriculumType,
}

/// Chapter (with its topics) or topic in a suggested tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedTag {
    pub id: TagId,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub name: String,
    pub attributes: Attributes,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub topics: Vec<SuggestedTag>,
}

impl SuggestedTag {
    pub(crate) fn leaf(tag: Tag) -> Self {
        Self {
            id: tag.id,
            tag_type: tag.tag_type,
            name: tag.name,
            attributes: tag.attributes,
            topics: Vec::new(),
        }
    }
}

/// Reference to the other side of a legacy mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyRef {
    /// Tag the mapping belongs to, set on multi-tag lookups.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_id: Option<TagId>,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultTags {
    pub misc: Tag,
    pub resource: Tag,
}
