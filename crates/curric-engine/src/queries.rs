//! Read operations: id lookups, filtered listings, hierarchy browsing,
//! path validation, and suggested curriculum.
//!
//! Reads go through [`CachedReads`](crate::reads::CachedReads); listing and
//! browsing use the search index for membership and the relational store for
//! ordering.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use curric_core::ordering::{order_tags, sort_by_name};
use curric_core::{
    child_key, codes, defaults, Access, AccessMode, Attributes, CurriculumType, Error, IndexPage,
    IndexQuery, Result, Tag, TagGroup, TagId, TagType,
};

use crate::batch::fail_fast;
use crate::cache::keys;
use crate::engine::CurriculumEngine;
use crate::requests::{
    DefaultTags, GetTagsByIds, GetTagsFilter, HierarchyQuery, LocaleView, SuggestedCurriculumRequest,
    SuggestedTag, TagView, TagsPage, ValidateHierarchy,
};

/// Page ids in page order, dropping repeats and anything in `seen`.
fn merged_ids(pages: Vec<IndexPage>, seen: &[TagId]) -> Vec<TagId> {
    let mut ids: Vec<TagId> = Vec::new();
    for id in pages.into_iter().flat_map(|page| page.ids) {
        if !seen.contains(&id) && !ids.contains(&id) {
            ids.push(id);
        }
    }
    ids
}

fn page_limit(limit: i64) -> i64 {
    if limit <= 0 {
        defaults::DEFAULT_QUERY_LIMIT
    } else {
        limit
    }
}

impl CurriculumEngine {
    /// One tag with all of its locale mappings.
    pub async fn get_tag(&self, id: TagId) -> Result<TagView> {
        let tag = self
            .reads
            .tag(id)
            .await?
            .ok_or_else(|| Error::NotFound(codes::TAG_NOT_FOUND.to_string()))?;
        let locales = if tag.locale_available {
            self.store.locales_for_tag(id).await?
        } else {
            Vec::new()
        };
        let mut view = TagView::from(tag);
        view.locales = locales.iter().map(LocaleView::from).collect();
        Ok(view)
    }

    /// Filtered listing served by the search index.
    pub async fn get_tags(&self, filter: GetTagsFilter) -> Result<TagsPage> {
        let start = Instant::now();
        let limit = page_limit(filter.limit);
        let query = IndexQuery {
            text: filter.text,
            tag_type: filter.tag_type,
            curriculum_type: filter.curriculum_type.map(CurriculumType::canonical),
            creator_id: filter.creator_id,
            creator_type: filter.creator_type,
            access: filter.access,
            tag_group: filter.tag_group,
            country_id: filter.country_id,
            hidden_parents: filter.hidden_parents,
            parents: filter.parents,
            start: filter.start,
            limit,
        };
        let page = self.index.query_tags(&query).await?;
        let tags = self.reads.tags(&page.ids).await?;
        let next = page.next(filter.start, limit);
        debug!(
            subsystem = "query",
            op = "get_tags",
            result_count = tags.len(),
            total = page.total,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tags listed"
        );
        Ok(TagsPage { tags, next })
    }

    /// Enriched tags for a list of ids, in input order. Unknown ids are skipped.
    pub async fn get_tags_by_ids(&self, req: GetTagsByIds) -> Result<Vec<TagView>> {
        let GetTagsByIds {
            ids,
            country_id,
            locale,
            with_locales,
        } = req;
        let units: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let engine = self.clone();
                let country_id = country_id.clone();
                let locale = locale.clone();
                async move {
                    match engine.reads.tag(id).await? {
                        Some(tag) => engine
                            .enrich(tag, country_id.as_deref(), locale.as_deref(), with_locales)
                            .await
                            .map(Some),
                        None => Ok(None),
                    }
                }
            })
            .collect();
        Ok(fail_fast("getTags", units)
            .await?
            .into_iter()
            .flatten()
            .collect())
    }

    async fn enrich(
        &self,
        tag: Tag,
        country_id: Option<&str>,
        locale: Option<&str>,
        with_locales: bool,
    ) -> Result<TagView> {
        let localized = match (tag.locale_available, country_id, locale) {
            (true, Some(country_id), Some(locale)) => {
                self.reads.locale_name(tag.id, country_id, locale).await?
            }
            _ => None,
        };
        let locales = if with_locales && tag.locale_available {
            self.store.locales_for_tag(tag.id).await?
        } else {
            Vec::new()
        };

        let mut view = TagView::from(tag);
        if let Some(name) = localized {
            view.name = name;
        }
        match view.tag_type {
            TagType::Grade => {
                view.grade = Some(
                    defaults::grade_for_tag_id(&view.id.to_string())
                        .unwrap_or(defaults::DEFAULT_GRADE),
                );
            }
            TagType::Board if self.config.board_tag_id == Some(view.id) => {
                let mut attributes = Attributes::new();
                attributes.set_is_default(true);
                view.attributes = attributes;
            }
            TagType::Country if locale.unwrap_or(defaults::DEFAULT_LOCALE) == defaults::DEFAULT_LOCALE => {
                if let Some(full_name) = view.attributes.full_name() {
                    view.name = full_name.to_string();
                }
            }
            _ => {}
        }
        view.locales = locales.iter().map(LocaleView::from).collect();
        Ok(view)
    }

    /// Children of `tag_type` under the given ancestors.
    ///
    /// In multi-grade countries a grade ancestor also pulls in the grades that
    /// share it, and children of every such grade are merged. With a
    /// `creator_id` the teacher's own tags under the same scopes are appended
    /// and the whole list is re-sorted by name.
    pub async fn get_tags_by_hierarchy(&self, req: HierarchyQuery) -> Result<Vec<TagView>> {
        let start = Instant::now();
        let ancestors = self.ancestors(&req.hierarchy).await?;
        let ct = self.curriculum_for(req.curriculum_type, &ancestors)?;
        let rule = self
            .schema(ct)?
            .get(req.tag_type)
            .ok_or_else(|| Error::bad_request(codes::TAG_TYPE_INVALID))?;
        if rule.level == 1 {
            return Err(Error::bad_request(codes::TAG_TYPE_INVALID));
        }
        let parent_key = match req.tag_group {
            TagGroup::Content => {
                self.resolver()
                    .resolve_parent_keys_for_content(ct, req.tag_type, &ancestors, AccessMode::Read)?
                    .ordering_key
            }
            _ => self
                .resolver()
                .resolve_parent_key(ct, &ancestors, rule.level)?,
        };

        let scopes = self.hierarchy_scopes(&req, &ancestors, parent_key).await?;
        let limit = page_limit(req.limit);
        let scoped = |scope: &String, access: Access, creator_id: Option<i64>| IndexQuery {
            text: req.text.clone(),
            tag_type: Some(req.tag_type),
            curriculum_type: Some(ct.canonical()),
            creator_id,
            access: Some(access),
            tag_group: Some(req.tag_group),
            parents: vec![scope.clone()],
            start: req.start,
            limit,
            ..Default::default()
        };
        let mut queries: Vec<IndexQuery> = scopes
            .iter()
            .map(|scope| scoped(scope, Access::Global, None))
            .collect();
        if let Some(creator_id) = req.creator_id {
            queries.extend(
                scopes
                    .iter()
                    .map(|scope| scoped(scope, Access::Teacher, Some(creator_id))),
            );
        }
        let units: Vec<_> = queries
            .into_iter()
            .map(|query| {
                let index = self.index.clone();
                async move { index.query_tags(&query).await }
            })
            .collect();
        let mut pages = fail_fast("getTagsByHierarchy", units).await?;
        let own_pages = pages.split_off(scopes.len());

        let tags = self.reads.tags(&merged_ids(pages, &[])).await?;
        let mut tags = match scopes.as_slice() {
            [scope] => {
                let rows = self.reads.order_rows(scope, req.tag_type).await?;
                order_tags(tags, rule, &rows)?
            }
            _ => sort_by_name(tags),
        };
        let global: Vec<TagId> = tags.iter().map(|t| t.id).collect();
        let own = self.reads.tags(&merged_ids(own_pages, &global)).await?;
        if !own.is_empty() {
            tags.extend(own);
            tags = sort_by_name(tags);
        }

        let mut views = Vec::with_capacity(tags.len());
        for tag in tags {
            views.push(
                self.enrich(tag, req.country_id.as_deref(), req.locale.as_deref(), false)
                    .await?,
            );
        }
        info!(
            subsystem = "query",
            op = "get_tags_by_hierarchy",
            tag_type = %req.tag_type,
            scopes = scopes.len(),
            result_count = views.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Hierarchy listed"
        );
        Ok(views)
    }

    /// Parent keys a hierarchy listing fans out over.
    ///
    /// Only a grade sitting deepest in the chain is expanded; every other
    /// chain lists the single resolved key.
    async fn hierarchy_scopes(
        &self,
        req: &HierarchyQuery,
        ancestors: &[Option<Tag>],
        parent_key: String,
    ) -> Result<Vec<String>> {
        let known: Vec<&Tag> = ancestors.iter().flatten().collect();
        let Some(grade) = known.iter().find(|t| t.tag_type == TagType::Grade) else {
            return Ok(vec![parent_key]);
        };
        let deepest = parent_key.rsplit(defaults::PARENT_KEY_SEPARATOR).next();
        if deepest != Some(grade.id.to_string().as_str()) {
            return Ok(vec![parent_key]);
        }
        let country_id = match (&req.country_id, known.iter().find(|t| t.tag_type == TagType::Country)) {
            (Some(country_id), _) => country_id.clone(),
            (None, Some(country)) => country.id.to_string(),
            (None, None) => return Ok(vec![parent_key]),
        };
        if !defaults::is_multi_grade_country(&country_id) {
            return Ok(vec![parent_key]);
        }

        let prefix = parent_key
            .rsplit_once(defaults::PARENT_KEY_SEPARATOR)
            .map(|(prefix, _)| prefix.to_string())
            .unwrap_or_default();
        let board = known.iter().find(|t| t.tag_type == TagType::Board).map(|b| b.id);
        let grades = self.multi_grades(&country_id, board, grade, &prefix).await?;
        Ok(grades.iter().map(|g| child_key(&prefix, g.id)).collect())
    }

    /// The grade plus every sibling grade whose `multi_grade` entry lists it.
    async fn multi_grades(
        &self,
        country_id: &str,
        board: Option<TagId>,
        grade: &Tag,
        prefix: &str,
    ) -> Result<Vec<Tag>> {
        let cache_key = keys::multi_grade(country_id, board, grade.id);
        if let Some(grades) = self.reads.multi_grade(&cache_key).await {
            return Ok(grades);
        }

        let query = IndexQuery {
            tag_type: Some(TagType::Grade),
            curriculum_type: Some(CurriculumType::K12),
            tag_group: Some(TagGroup::Curriculum),
            parents: vec![prefix.to_string()],
            limit: defaults::DEFAULT_QUERY_LIMIT,
            ..Default::default()
        };
        let page = self.index.query_tags(&query).await?;
        let grade_id = grade.id.to_string();
        let mut grades: Vec<Tag> = self
            .reads
            .tags(&page.ids)
            .await?
            .into_iter()
            .filter(|t| t.id != grade.id && t.attributes.shares_grade(country_id, &grade_id))
            .collect();
        grades.insert(0, grade.clone());

        self.reads.store_multi_grade(&cache_key, &grades).await;
        debug!(
            subsystem = "query",
            op = "multi_grades",
            tag_id = grade.id,
            result_count = grades.len(),
            "Resolved multi-grade set"
        );
        Ok(grades)
    }

    /// Published countries, one page at a time.
    pub async fn countries(&self, start: i64, limit: i64) -> Result<TagsPage> {
        self.country_page(false, start, limit).await
    }

    /// Countries including unpublished ones.
    pub async fn countries_for_admin(&self, start: i64, limit: i64) -> Result<TagsPage> {
        self.country_page(true, start, limit).await
    }

    async fn country_page(&self, include_hidden: bool, start: i64, limit: i64) -> Result<TagsPage> {
        let limit = page_limit(limit);
        let start = start.max(0);
        let tags = self
            .reads
            .tags_by_type(CurriculumType::Root, TagType::Country, include_hidden, start, limit)
            .await?;
        let next = if tags.len() as i64 >= limit {
            start + limit
        } else {
            -1
        };
        debug!(
            subsystem = "query",
            op = "countries",
            include_hidden,
            result_count = tags.len(),
            "Countries listed"
        );
        Ok(TagsPage { tags, next })
    }

    /// Check that each path names an existing, visible placement.
    ///
    /// The deepest tag of a path is the target; the rest must resolve to a
    /// parent key the target is linked under without being hidden.
    pub async fn validate_hierarchy(&self, req: ValidateHierarchy) -> Result<()> {
        if req.paths.is_empty() || req.paths.iter().any(|p| p.is_empty()) {
            return Err(Error::bad_request(codes::HIERARCHY_INVALID));
        }
        let mut ids: Vec<TagId> = req.paths.iter().flatten().copied().collect();
        ids.sort_unstable();
        ids.dedup();
        let found = self.reads.tags(&ids).await?;
        if found.len() != ids.len() {
            return Err(Error::bad_request(codes::HIERARCHY_INVALID));
        }
        let by_id: Arc<HashMap<TagId, Tag>> = Arc::new(found.into_iter().map(|t| (t.id, t)).collect());

        let requested = req.curriculum_type;
        let units: Vec<_> = req
            .paths
            .into_iter()
            .map(|path| {
                let engine = self.clone();
                let by_id = by_id.clone();
                async move {
                    let tags: Vec<Tag> = path.iter().filter_map(|id| by_id.get(id).cloned()).collect();
                    engine.validate_path(requested, tags).await
                }
            })
            .collect();
        fail_fast("validateHierarchy", units).await?;
        Ok(())
    }

    async fn validate_path(&self, requested: CurriculumType, tags: Vec<Tag>) -> Result<()> {
        let ancestors: Vec<Option<Tag>> = tags.iter().cloned().map(Some).collect();
        let ct = self.curriculum_for(requested, &ancestors)?;
        let schema = self.schema(ct)?;

        let mut deepest: Option<(usize, &Tag)> = None;
        for tag in &tags {
            let rule = schema
                .get(tag.tag_type)
                .ok_or_else(|| Error::bad_request(codes::PARENT_TAG_TYPE_INVALID))?;
            if deepest.map_or(true, |(level, _)| rule.level > level) {
                deepest = Some((rule.level, tag));
            }
        }
        let (_, target) = deepest.ok_or_else(|| Error::bad_request(codes::HIERARCHY_INVALID))?;

        let others: Vec<Option<Tag>> = tags
            .iter()
            .filter(|t| t.id != target.id)
            .cloned()
            .map(Some)
            .collect();
        if others.is_empty() {
            return Ok(());
        }
        let key = self
            .resolver()
            .resolve_parent_keys_for_content(ct, target.tag_type, &others, AccessMode::Read)?
            .ordering_key;
        let links = self.reads.links(target.id).await?;
        match links.iter().find(|l| l.parent_tag_id == key) {
            None => Err(Error::bad_request(codes::HIERARCHY_INVALID)),
            Some(link) if link.hidden => Err(Error::bad_request(codes::PARENT_HIDDEN)),
            Some(_) => Ok(()),
        }
    }

    /// Chapters under the given ancestors, each with its topics.
    pub async fn get_suggested_curriculum(
        &self,
        req: SuggestedCurriculumRequest,
    ) -> Result<Vec<SuggestedTag>> {
        let start = Instant::now();
        let ancestors = self.ancestors(&req.tag_ids).await?;
        let ct = self.curriculum_for(req.curriculum_type, &ancestors)?;
        let chapter_key = self
            .resolver()
            .resolve_parent_keys_for_content(ct, TagType::Chapter, &ancestors, AccessMode::Read)?
            .ordering_key;

        let chapters = self
            .child_tags(ct, &chapter_key, TagType::Chapter)
            .await
            .map_err(|e| {
                warn!(
                    subsystem = "query",
                    op = "get_suggested_curriculum",
                    error = %e,
                    "Chapter lookup failed"
                );
                Error::bad_request(codes::INVALID_CHAPTER)
            })?;
        if chapters.is_empty() {
            return Ok(Vec::new());
        }

        let units: Vec<_> = chapters
            .iter()
            .map(|chapter| {
                let engine = self.clone();
                let topic_key = child_key(&chapter_key, chapter.id);
                async move { engine.child_tags(ct, &topic_key, TagType::Topic).await }
            })
            .collect();
        let topics = fail_fast("getTags", units).await?;

        let suggested: Vec<SuggestedTag> = chapters
            .into_iter()
            .zip(topics)
            .map(|(chapter, topics)| {
                let mut node = SuggestedTag::leaf(chapter);
                node.topics = topics.into_iter().map(SuggestedTag::leaf).collect();
                node
            })
            .collect();
        info!(
            subsystem = "query",
            op = "get_suggested_curriculum",
            parent_key = %chapter_key,
            result_count = suggested.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Suggested curriculum built"
        );
        Ok(suggested)
    }

    /// Visible global content children of one type, in sibling order.
    async fn child_tags(&self, ct: CurriculumType, parent_key: &str, tag_type: TagType) -> Result<Vec<Tag>> {
        let rule = self.schema(ct)?.rule(tag_type)?;
        let query = IndexQuery {
            tag_type: Some(tag_type),
            curriculum_type: Some(ct.canonical()),
            access: Some(Access::Global),
            tag_group: Some(TagGroup::Content),
            parents: vec![parent_key.to_string()],
            limit: defaults::DEFAULT_QUERY_LIMIT,
            ..Default::default()
        };
        let page = self.index.query_tags(&query).await?;
        let tags = self.reads.tags(&page.ids).await?;
        let rows = if rule.is_ordered {
            self.reads.order_rows(parent_key, tag_type).await?
        } else {
            Vec::new()
        };
        order_tags(tags, rule, &rows)
    }

    /// The configured misc and resource tags.
    pub async fn default_tags(&self) -> Result<DefaultTags> {
        let ids: Vec<TagId> = [self.config.misc_tag_id, self.config.resource_tag_id]
            .into_iter()
            .flatten()
            .collect();
        let tags = self.reads.tags(&ids).await?;
        let pick = |id: Option<TagId>| {
            id.and_then(|id| tags.iter().find(|t| t.id == id).cloned())
                .ok_or_else(|| Error::internal(codes::PARENT_TAG_TYPE_INVALID))
        };
        Ok(DefaultTags {
            misc: pick(self.config.misc_tag_id)?,
            resource: pick(self.config.resource_tag_id)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_limit_defaults_non_positive() {
        assert_eq!(page_limit(0), defaults::DEFAULT_QUERY_LIMIT);
        assert_eq!(page_limit(-5), defaults::DEFAULT_QUERY_LIMIT);
        assert_eq!(page_limit(20), 20);
    }
}
