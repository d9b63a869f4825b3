//! Domain models for curric.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;

/// Numeric id of a tag row.
pub type TagId = i64;

/// Declares a string-backed enum with `as_str`, `Display`, and `FromStr`.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $value:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $value)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    _ => Err(format!(concat!("Invalid ", stringify!($name), ": {}"), s)),
                }
            }
        }
    };
}

string_enum! {
    /// Named schema selecting tag types and their nesting order.
    pub enum CurriculumType {
        Default => "default",
        Misc => "misc",
        Root => "root",
        K12 => "k12",
        University => "university",
        TestPrep => "test_prep",
        GeneralTestPrep => "general_test_prep",
        K12TestPrep => "k12_test_prep",
        UniversityTestPrep => "university_test_prep",
        Skill => "skill",
        GeneralSkill => "general_skill",
        K12Skill => "k12_skill",
        UniversitySkill => "university_skill",
    }
}

string_enum! {
    /// Kind of taxonomy node.
    pub enum TagType {
        Country => "country",
        Board => "board",
        Grade => "grade",
        Subject => "subject",
        Curriculum => "curriculum",
        Degree => "degree",
        Major => "major",
        Course => "course",
        Section => "section",
        Test => "test",
        Skill => "skill",
        Chapter => "chapter",
        Topic => "topic",
    }
}

string_enum! {
    /// Role a tag plays in the hierarchy.
    pub enum TagGroup {
        Curriculum => "curriculum",
        Content => "content",
        Identifier => "identifier",
    }
}

string_enum! {
    /// Visibility scope of a tag.
    pub enum Access {
        Global => "global",
        Teacher => "teacher",
    }
}

impl Default for Access {
    fn default() -> Self {
        Access::Global
    }
}

impl CurriculumType {
    /// Fold a variant onto its canonical root (e.g. `k12_skill` → `k12`).
    pub fn canonical(self) -> CurriculumType {
        match self {
            CurriculumType::K12 | CurriculumType::K12TestPrep | CurriculumType::K12Skill => {
                CurriculumType::K12
            }
            CurriculumType::University
            | CurriculumType::UniversityTestPrep
            | CurriculumType::UniversitySkill => CurriculumType::University,
            CurriculumType::GeneralTestPrep => CurriculumType::TestPrep,
            CurriculumType::GeneralSkill => CurriculumType::Skill,
            other => other,
        }
    }
}

/// Whether a resolution is validating a read path or a write path.
///
/// Identifier levels may be skipped on reads; writes must name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

// =============================================================================
// RELATIONAL ROWS
// =============================================================================

/// One taxonomy node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    pub name: String,
    pub curriculum_type: CurriculumType,
    pub creator_id: Option<i64>,
    pub creator_type: Option<String>,
    pub access: Access,
    pub tag_group: TagGroup,
    pub locale_available: bool,
    pub country_id: String,
    pub publish: bool,
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tag {
    /// Materialize an inserted row.
    pub fn from_new(id: TagId, new: NewTag, now: DateTime<Utc>) -> Self {
        Self {
            id,
            tag_type: new.tag_type,
            name: new.name,
            curriculum_type: new.curriculum_type,
            creator_id: new.creator_id,
            creator_type: new.creator_type,
            access: new.access,
            tag_group: new.tag_group,
            locale_available: false,
            country_id: new.country_id,
            publish: true,
            attributes: new.attributes,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a patch in place.
    pub fn apply(&mut self, patch: &TagPatch, now: DateTime<Utc>) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(attributes) = &patch.attributes {
            self.attributes = attributes.clone();
        }
        if let Some(publish) = patch.publish {
            self.publish = publish;
        }
        if let Some(locale_available) = patch.locale_available {
            self.locale_available = locale_available;
        }
        self.updated_at = now;
    }
}

/// Insert payload for a tag row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTag {
    pub tag_type: TagType,
    pub name: String,
    pub curriculum_type: CurriculumType,
    pub creator_id: Option<i64>,
    pub creator_type: Option<String>,
    pub access: Access,
    pub tag_group: TagGroup,
    pub country_id: String,
    pub attributes: Attributes,
}

/// Partial update of a tag row. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagPatch {
    pub name: Option<String>,
    pub attributes: Option<Attributes>,
    pub publish: Option<bool>,
    pub locale_available: Option<bool>,
}

impl TagPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.attributes.is_none()
            && self.publish.is_none()
            && self.locale_available.is_none()
    }
}

/// Edge from a tag to one parent key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentLink {
    pub id: i64,
    pub tag_id: TagId,
    pub tag_type: TagType,
    /// `root`, `derived`, `hierarchy`, or the identifier tag type.
    pub parent_tag_type: String,
    /// Dot-joined parent key.
    pub parent_tag_id: String,
    pub order: i32,
    pub hidden: bool,
    pub publish: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewParentLink {
    pub tag_id: TagId,
    pub tag_type: TagType,
    pub parent_tag_type: String,
    pub parent_tag_id: String,
    pub order: i32,
    pub hidden: bool,
}

/// Localized name of a tag for one (country, locale).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagLocaleMapping {
    pub id: i64,
    pub tag_id: TagId,
    pub country_id: String,
    pub locale: String,
    pub name: String,
    pub tag_type: TagType,
    pub publish: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TagLocaleMapping {
    /// Identity of a locale mapping: lowercase `locale:country`.
    pub fn locale_key(&self) -> String {
        locale_key(&self.locale, &self.country_id)
    }
}

pub fn locale_key(locale: &str, country_id: &str) -> String {
    format!("{}:{}", locale.to_lowercase(), country_id)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTagLocale {
    pub tag_id: TagId,
    pub country_id: String,
    pub locale: String,
    pub name: String,
    pub tag_type: TagType,
}

/// Bridge between a tag and an external (legacy_id_type, legacy_id) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyTagMapping {
    pub id: i64,
    pub tag_id: TagId,
    pub tag_id_type: String,
    pub legacy_id_type: String,
    pub legacy_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only product → grade reference row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeProduct {
    pub id: i64,
    pub folder_id: Option<String>,
    pub product_id: String,
    pub grade: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// INDEX DOCUMENTS
// =============================================================================

/// Localized name carried by an index document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagName {
    pub value: String,
    pub locale: String,
}

/// Full index document for a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: TagId,
    #[serde(rename = "type")]
    pub tag_type: TagType,
    #[serde(rename = "name")]
    pub names: Vec<TagName>,
    pub curriculum_type: CurriculumType,
    pub creator_id: Option<i64>,
    pub creator_type: Option<String>,
    pub access: Access,
    pub tag_group: TagGroup,
    pub country_id: String,
    pub parents: Vec<String>,
    pub deleted: bool,
}

/// Filter for an index query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub tag_type: Option<TagType>,
    pub curriculum_type: Option<CurriculumType>,
    pub creator_id: Option<i64>,
    pub creator_type: Option<String>,
    pub access: Option<Access>,
    pub tag_group: Option<TagGroup>,
    pub country_id: Option<String>,
    #[serde(rename = "hidden_active_parents")]
    pub hidden_parents: Vec<String>,
    pub parents: Vec<String>,
    pub start: i64,
    pub limit: i64,
}

/// One page of index results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexPage {
    pub ids: Vec<TagId>,
    pub total: i64,
}

impl IndexPage {
    /// Offset of the next page, or `-1` when this page is the last.
    pub fn next(&self, start: i64, limit: i64) -> i64 {
        if start + limit < self.total {
            start + limit
        } else {
            crate::defaults::NO_NEXT_PAGE
        }
    }
}
