//! Builders for domain values used by tests across the workspace.

use chrono::Utc;

use crate::attributes::Attributes;
use crate::defaults::HIERARCHY_CURRICULUM;
use crate::models::{Access, CurriculumType, NewTag, ParentLink, Tag, TagGroup, TagId, TagType};

/// Group a tag type falls into when no explicit group is given.
pub fn default_group(tag_type: TagType) -> TagGroup {
    match tag_type {
        TagType::Chapter | TagType::Topic => TagGroup::Content,
        TagType::Curriculum | TagType::Section => TagGroup::Identifier,
        _ => TagGroup::Curriculum,
    }
}

/// Insert payload with sensible defaults.
pub fn new_tag(tag_type: TagType, name: &str, curriculum_type: CurriculumType) -> NewTag {
    NewTag {
        tag_type,
        name: name.to_string(),
        curriculum_type,
        creator_id: Some(1),
        creator_type: Some("admin".to_string()),
        access: Access::Global,
        tag_group: default_group(tag_type),
        country_id: "0".to_string(),
        attributes: Attributes::new(),
    }
}

/// Published tag row named after its type and id.
pub fn tag(id: TagId, tag_type: TagType, curriculum_type: CurriculumType) -> Tag {
    Tag::from_new(
        id,
        new_tag(tag_type, &format!("{}-{}", tag_type, id), curriculum_type),
        Utc::now(),
    )
}

/// Visible ordering edge of a chapter under `parent_key`.
pub fn link(id: i64, tag_id: TagId, parent_key: &str, order: i32) -> ParentLink {
    let now = Utc::now();
    ParentLink {
        id,
        tag_id,
        tag_type: TagType::Chapter,
        parent_tag_type: HIERARCHY_CURRICULUM.to_string(),
        parent_tag_id: parent_key.to_string(),
        order,
        hidden: false,
        publish: true,
        created_at: now,
        updated_at: now,
    }
}
