//! Shared in-memory stack for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use curric_core::fixtures::new_tag;
use curric_core::{
    defaults, Attributes, CurriculumConfig, CurriculumType, IndexDocument, NewParentLink, Tag, TagId, TagName,
    TagType,
};
use curric_db::MemoryTagStore;
use curric_engine::{CurriculumEngine, MemoryCache, RecordingCompensator};
use curric_search::{IndexCall, MemorySearchIndex};

pub struct Harness {
    pub store: MemoryTagStore,
    pub index: MemorySearchIndex,
    pub cache: MemoryCache,
    pub compensator: RecordingCompensator,
    pub engine: CurriculumEngine,
}

/// A seeded k12 chain: country, board, grade, subject, and a curriculum identifier.
pub struct Chain {
    pub country: Tag,
    pub board: Tag,
    pub grade: Tag,
    pub subject: Tag,
    pub curriculum: Tag,
}

impl Chain {
    /// Ancestors of a chapter.
    pub fn path(&self) -> Vec<TagId> {
        vec![
            self.country.id,
            self.board.id,
            self.grade.id,
            self.subject.id,
            self.curriculum.id,
        ]
    }

    pub fn grade_key(&self) -> String {
        format!("{}.{}", self.country.id, self.board.id)
    }

    pub fn subject_key(&self) -> String {
        format!("{}.{}.{}", self.country.id, self.board.id, self.grade.id)
    }

    /// Curriculum key of a chapter (identifier excluded).
    pub fn chapter_curriculum_key(&self) -> String {
        format!("{}.{}", self.subject_key(), self.subject.id)
    }

    /// Ordering key of a chapter (identifier included).
    pub fn chapter_key(&self) -> String {
        format!("{}.{}", self.chapter_curriculum_key(), self.curriculum.id)
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(CurriculumConfig::default())
    }

    pub fn with_config(config: CurriculumConfig) -> Self {
        let store = MemoryTagStore::new();
        let index = MemorySearchIndex::new();
        let cache = MemoryCache::new(1024);
        let compensator = RecordingCompensator::applying_to(Arc::new(index.clone()));
        let engine = CurriculumEngine::new(
            Arc::new(store.clone()),
            Arc::new(index.clone()),
            Arc::new(cache.clone()),
            Arc::new(compensator.clone()),
            config,
        );
        Self {
            store,
            index,
            cache,
            compensator,
            engine,
        }
    }

    /// Committed k12 tag with visible `hierarchy` edges, mirrored in the index.
    pub fn seed(&self, tag_type: TagType, name: &str, parent_keys: &[String]) -> Tag {
        self.seed_with(tag_type, name, parent_keys, Attributes::new())
    }

    pub fn seed_with(
        &self,
        tag_type: TagType,
        name: &str,
        parent_keys: &[String],
        attributes: Attributes,
    ) -> Tag {
        let mut new = new_tag(tag_type, name, CurriculumType::K12);
        new.attributes = attributes;
        let tag = self.store.seed_tag(new);
        for key in parent_keys {
            self.store.seed_link(NewParentLink {
                tag_id: tag.id,
                tag_type,
                parent_tag_type: defaults::HIERARCHY_CURRICULUM.to_string(),
                parent_tag_id: key.clone(),
                order: 0,
                hidden: false,
            });
        }
        self.index.seed(IndexDocument {
            id: tag.id,
            tag_type,
            names: vec![TagName {
                value: name.to_string(),
                locale: "en".to_string(),
            }],
            curriculum_type: tag.curriculum_type,
            creator_id: tag.creator_id,
            creator_type: tag.creator_type.clone(),
            access: tag.access,
            tag_group: tag.tag_group,
            country_id: tag.country_id.clone(),
            parents: parent_keys.to_vec(),
            deleted: false,
        });
        tag
    }

    pub fn k12(&self) -> Chain {
        let country = self.seed(TagType::Country, "India", &[]);
        let board = self.seed(TagType::Board, "CBSE", &[country.id.to_string()]);
        let grade = self.seed(
            TagType::Grade,
            "Grade 5",
            &[format!("{}.{}", country.id, board.id)],
        );
        let subject = self.seed(
            TagType::Subject,
            "Maths",
            &[format!("{}.{}.{}", country.id, board.id, grade.id)],
        );
        let curriculum = self.seed(TagType::Curriculum, "NCERT", &[]);
        Chain {
            country,
            board,
            grade,
            subject,
            curriculum,
        }
    }

    pub fn upserts(&self) -> usize {
        self.index
            .calls()
            .iter()
            .filter(|c| matches!(c, IndexCall::Upsert(_)))
            .count()
    }
}
