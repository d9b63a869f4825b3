//! Bridges between tags and the external ids of the legacy catalogue.

use tracing::debug;

use curric_core::{defaults, LegacyTagMapping, Result, TagId, TagType};

use crate::engine::CurriculumEngine;
use crate::requests::LegacyRef;

const PRODUCT: &str = "product";
const FOLDER: &str = "folder";

fn grade_ref(grade: &str) -> Option<LegacyRef> {
    defaults::grade_tag_id(grade).map(|id| LegacyRef {
        tag_id: None,
        id: id.to_string(),
        kind: TagType::Grade.as_str().to_string(),
    })
}

fn tag_ref(mapping: LegacyTagMapping) -> LegacyRef {
    LegacyRef {
        tag_id: None,
        id: mapping.tag_id.to_string(),
        kind: mapping.tag_id_type,
    }
}

impl CurriculumEngine {
    /// External ids mapped to one tag.
    pub async fn legacy_ids_for_tag(&self, id: TagId) -> Result<Vec<LegacyRef>> {
        Ok(self
            .store
            .legacy_for_tags(&[id])
            .await?
            .into_iter()
            .map(|m| LegacyRef {
                tag_id: None,
                id: m.legacy_id,
                kind: m.legacy_id_type,
            })
            .collect())
    }

    /// External ids of several tags, each tagged with its owner.
    pub async fn legacy_ids_for_tags(&self, ids: &[TagId]) -> Result<Vec<LegacyRef>> {
        let mut unique: Vec<TagId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }
        Ok(self
            .store
            .legacy_for_tags(&unique)
            .await?
            .into_iter()
            .map(|m| LegacyRef {
                tag_id: Some(m.tag_id),
                id: m.legacy_id,
                kind: m.legacy_id_type,
            })
            .collect())
    }

    /// Tags mapped to an external (type, id) pair.
    ///
    /// University products all resolve to the configured degree, major,
    /// course, and section tags.
    pub async fn tag_for_legacy_id(&self, legacy_type: &str, legacy_id: &str) -> Result<Vec<LegacyRef>> {
        if legacy_type == PRODUCT && defaults::is_university_product(legacy_id) {
            let placement = [
                (TagType::Degree, self.config.degree_tag_id),
                (TagType::Major, self.config.major_tag_id),
                (TagType::Course, self.config.course_tag_id),
                (TagType::Section, self.config.university_section_tag_id),
            ];
            return Ok(placement
                .into_iter()
                .filter_map(|(tag_type, id)| {
                    id.map(|id| LegacyRef {
                        tag_id: None,
                        id: id.to_string(),
                        kind: tag_type.as_str().to_string(),
                    })
                })
                .collect());
        }
        Ok(self
            .store
            .legacy_by_external(legacy_type, legacy_id)
            .await?
            .into_iter()
            .map(tag_ref)
            .collect())
    }

    /// Grade tags of a product.
    ///
    /// `13` selects the product's highest grade and `0` every grade. A grade
    /// row with a folder resolves through the folder's legacy mapping;
    /// otherwise the grade number maps through the grade tag table.
    pub async fn grade_tags(&self, grade: &str, product_id: &str) -> Result<Vec<LegacyRef>> {
        let university = defaults::is_university_product(product_id);
        if university && (grade == defaults::HIGHEST_GRADE || grade == defaults::ALL_GRADES) {
            return Ok(Vec::new());
        }
        let rows = self.reads.grade_products(product_id).await?;
        let mut refs = Vec::new();

        if grade == defaults::HIGHEST_GRADE {
            let mut highest: Option<(i32, Option<&str>)> = None;
            for row in &rows {
                let Some(number) = row.grade.as_deref().and_then(|g| g.parse::<i32>().ok()) else {
                    continue;
                };
                if number > highest.map_or(0, |(top, _)| top) {
                    highest = Some((number, row.folder_id.as_deref()));
                }
            }
            match highest.and_then(|(_, folder)| folder) {
                Some(folder) => refs.extend(self.folder_grades(folder).await?),
                None => refs.extend(grade_ref("12")),
            }
        } else if grade == defaults::ALL_GRADES {
            for row in &rows {
                match (&row.folder_id, &row.grade) {
                    (Some(folder), _) => refs.extend(self.folder_grades(folder).await?),
                    (None, Some(number)) => refs.extend(grade_ref(number)),
                    (None, None) => {}
                }
            }
        } else {
            for row in rows.iter().filter(|r| r.grade.as_deref() == Some(grade)) {
                match &row.folder_id {
                    Some(folder) => refs.extend(self.folder_grades(folder).await?),
                    None => refs.extend(grade_ref(grade)),
                }
            }
            if refs.is_empty() {
                refs.extend(grade_ref(grade));
            }
        }

        debug!(
            subsystem = "legacy",
            op = "grade_tags",
            grade,
            product_id,
            result_count = refs.len(),
            "Resolved grade tags"
        );
        Ok(refs)
    }

    async fn folder_grades(&self, folder_id: &str) -> Result<Vec<LegacyRef>> {
        Ok(self
            .store
            .legacy_by_external(FOLDER, folder_id)
            .await?
            .into_iter()
            .map(tag_ref)
            .collect())
    }
}
