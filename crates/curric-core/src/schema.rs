//! Schema registry: per-curriculum-type level/ordering/identifier tables.
//!
//! The registry is built once at startup and shared by reference; nothing
//! mutates it afterwards.

use std::collections::HashMap;

use crate::defaults::{DERIVED_CURRICULUM, ROOT_CURRICULUM};
use crate::error::{codes, Error, Result};
use crate::models::{CurriculumType, Tag, TagType};

/// Placement rule of one tag type inside a curriculum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelRule {
    /// 1-based depth; level 1 is the root.
    pub level: usize,
    pub is_identifier: bool,
    pub is_ordered: bool,
}

impl LevelRule {
    const fn plain(level: usize) -> Self {
        Self {
            level,
            is_identifier: false,
            is_ordered: false,
        }
    }

    const fn ordered(level: usize) -> Self {
        Self {
            level,
            is_identifier: false,
            is_ordered: true,
        }
    }

    const fn identifier(level: usize) -> Self {
        Self {
            level,
            is_identifier: true,
            is_ordered: false,
        }
    }
}

/// Tag type → rule table for one curriculum type, kept sorted by level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchySchema {
    rules: Vec<(TagType, LevelRule)>,
}

impl HierarchySchema {
    fn new(mut rules: Vec<(TagType, LevelRule)>) -> Self {
        rules.sort_by_key(|(_, rule)| rule.level);
        Self { rules }
    }

    pub fn get(&self, tag_type: TagType) -> Option<LevelRule> {
        self.rules
            .iter()
            .find(|(t, _)| *t == tag_type)
            .map(|(_, rule)| *rule)
    }

    /// Rule for `tag_type`, failing `typeInvalid` when the type is not part of this schema.
    pub fn rule(&self, tag_type: TagType) -> Result<LevelRule> {
        self.get(tag_type)
            .ok_or_else(|| Error::bad_request(codes::TYPE_INVALID))
    }

    pub fn iter(&self) -> impl Iterator<Item = (TagType, LevelRule)> + '_ {
        self.rules.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Deepest level in the schema (0 for an empty schema).
    pub fn depth(&self) -> usize {
        self.rules.last().map(|(_, r)| r.level).unwrap_or(0)
    }
}

/// Registry of every supported curriculum schema.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    schemas: HashMap<CurriculumType, HierarchySchema>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl SchemaRegistry {
    /// The built-in k12 / university / test-prep / skill / misc tables.
    pub fn standard() -> Self {
        use TagType::*;

        let k12 = HierarchySchema::new(vec![
            (Country, LevelRule::plain(1)),
            (Board, LevelRule::ordered(2)),
            (Grade, LevelRule::ordered(3)),
            (Subject, LevelRule::plain(4)),
            (Curriculum, LevelRule::identifier(5)),
            (Chapter, LevelRule::ordered(6)),
            (Topic, LevelRule::ordered(7)),
        ]);
        let university = HierarchySchema::new(vec![
            (Country, LevelRule::plain(1)),
            (Degree, LevelRule::plain(2)),
            (Major, LevelRule::plain(3)),
            (Course, LevelRule::plain(4)),
            (Section, LevelRule::identifier(5)),
            (Chapter, LevelRule::ordered(6)),
            (Topic, LevelRule::ordered(7)),
        ]);
        let branch = |head: TagType| {
            HierarchySchema::new(vec![
                (Country, LevelRule::plain(1)),
                (head, LevelRule::plain(2)),
                (Section, LevelRule::identifier(3)),
                (Chapter, LevelRule::ordered(4)),
                (Topic, LevelRule::ordered(5)),
            ])
        };

        let mut schemas = HashMap::new();
        schemas.insert(CurriculumType::K12, k12);
        schemas.insert(CurriculumType::University, university);
        for ct in [
            CurriculumType::K12TestPrep,
            CurriculumType::UniversityTestPrep,
            CurriculumType::GeneralTestPrep,
        ] {
            schemas.insert(ct, branch(Test));
        }
        for ct in [
            CurriculumType::K12Skill,
            CurriculumType::UniversitySkill,
            CurriculumType::GeneralSkill,
        ] {
            schemas.insert(ct, branch(Skill));
        }
        schemas.insert(CurriculumType::Misc, HierarchySchema::new(Vec::new()));

        Self { schemas }
    }

    /// Schema for `curriculum_type`; unregistered types fail `curriculumTypeInvalid`.
    pub fn curriculum(&self, curriculum_type: CurriculumType) -> Result<&HierarchySchema> {
        self.schemas
            .get(&curriculum_type)
            .ok_or_else(|| Error::bad_request(codes::CURRICULUM_TYPE_INVALID))
    }

    pub fn curriculum_types(&self) -> impl Iterator<Item = CurriculumType> + '_ {
        self.schemas.keys().copied()
    }
}

/// Tag type acting as the identifier boundary for content under `curriculum_type`.
pub fn filter_identifier(curriculum_type: CurriculumType) -> TagType {
    if curriculum_type == CurriculumType::K12 {
        TagType::Curriculum
    } else {
        TagType::Section
    }
}

/// parent_tag_type of a content tag's curriculum-key edge.
pub fn root_or_derived(curriculum_type: CurriculumType) -> &'static str {
    match curriculum_type {
        CurriculumType::K12
        | CurriculumType::University
        | CurriculumType::GeneralTestPrep
        | CurriculumType::GeneralSkill => ROOT_CURRICULUM,
        _ => DERIVED_CURRICULUM,
    }
}

/// Infer a concrete curriculum type from an ancestor set, for requests sent as `default`.
pub fn curriculum_from_parents<'a>(
    ancestors: impl IntoIterator<Item = &'a Tag>,
) -> Option<CurriculumType> {
    for tag in ancestors {
        match tag.tag_type {
            TagType::Grade => return Some(CurriculumType::K12),
            TagType::Degree => return Some(CurriculumType::University),
            TagType::Test => {
                return Some(match tag.curriculum_type {
                    CurriculumType::K12 => CurriculumType::K12TestPrep,
                    CurriculumType::University => CurriculumType::UniversityTestPrep,
                    _ => CurriculumType::GeneralTestPrep,
                })
            }
            TagType::Skill => {
                return Some(match tag.curriculum_type {
                    CurriculumType::K12 => CurriculumType::K12Skill,
                    CurriculumType::University => CurriculumType::UniversitySkill,
                    _ => CurriculumType::GeneralSkill,
                })
            }
            _ => {}
        }
    }
    None
}
