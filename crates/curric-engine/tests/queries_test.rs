//! Read paths: listings, id lookups, hierarchy browsing, validation, and
//! suggested curriculum.

mod common;

use common::Harness;
use curric_core::fixtures::{new_tag, tag};
use curric_core::{codes, Attributes, CurriculumConfig, CurriculumType, TagGroup, TagId, TagType};
use curric_engine::cache::keys;
use curric_engine::{
    CreateTag, GetTagsByIds, GetTagsFilter, HierarchyQuery, LocaleAction, LocaleEntry, OrderEntry,
    SuggestedCurriculumRequest, TagLocaleUpdate, UpdateTag, UpdateTagOrder, ValidateHierarchy,
};
use serde_json::json;

fn chapter(name: &str, path: Vec<TagId>) -> CreateTag {
    CreateTag::new(TagType::Chapter, name, TagGroup::Content, CurriculumType::K12).under(path)
}

fn topic(name: &str, path: Vec<TagId>) -> CreateTag {
    CreateTag::new(TagType::Topic, name, TagGroup::Content, CurriculumType::K12).under(path)
}

fn listing(hierarchy: Vec<TagId>, tag_type: TagType, tag_group: TagGroup) -> HierarchyQuery {
    HierarchyQuery {
        hierarchy,
        tag_type,
        curriculum_type: CurriculumType::K12,
        tag_group,
        country_id: None,
        creator_id: None,
        text: None,
        locale: None,
        start: 0,
        limit: 0,
    }
}

fn reorder(tag_type: TagType, hierarchy: Vec<TagId>, ids: &[TagId]) -> UpdateTagOrder {
    UpdateTagOrder {
        tag_group: TagGroup::Content,
        tag_type,
        curriculum_type: CurriculumType::K12,
        hierarchy,
        orders: ids
            .iter()
            .enumerate()
            .map(|(i, id)| OrderEntry {
                id: *id,
                order: i as i32 + 1,
            })
            .collect(),
    }
}

#[tokio::test]
async fn test_get_tags_pages_through_index() {
    let h = Harness::new();
    for name in ["Alpha", "Beta", "Gamma"] {
        h.seed(TagType::Topic, name, &[]);
    }
    let filter = GetTagsFilter {
        tag_type: Some(TagType::Topic),
        limit: 2,
        ..Default::default()
    };

    let first = h.engine.get_tags(filter.clone()).await.unwrap();
    assert_eq!(first.tags.len(), 2);
    assert_eq!(first.next, 2);

    let second = h
        .engine
        .get_tags(GetTagsFilter {
            start: first.next,
            ..filter
        })
        .await
        .unwrap();
    assert_eq!(second.tags.len(), 1);
    assert_eq!(second.next, -1);
}

#[tokio::test]
async fn test_get_tags_text_filter() {
    let h = Harness::new();
    h.seed(TagType::Topic, "Photosynthesis", &[]);
    h.seed(TagType::Topic, "Respiration", &[]);

    let page = h
        .engine
        .get_tags(GetTagsFilter {
            text: Some("photo".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(page.tags.len(), 1);
    assert_eq!(page.tags[0].name, "Photosynthesis");
}

#[tokio::test]
async fn test_get_tag_unknown_is_not_found() {
    let h = Harness::new();
    let err = h.engine.get_tag(404).await.unwrap_err();
    assert!(err.is(codes::TAG_NOT_FOUND));
}

#[tokio::test]
async fn test_get_tags_by_ids_enriches_in_input_order() {
    let h = Harness::with_config(CurriculumConfig::default().with_board_tag_id(700));
    h.store.seed_tag_with_id(tag(255, TagType::Grade, CurriculumType::K12));
    let mut board = tag(700, TagType::Board, CurriculumType::K12);
    board.attributes.insert("color", "#000000");
    h.store.seed_tag_with_id(board);
    let mut country = tag(800, TagType::Country, CurriculumType::K12);
    country.attributes.insert("full_name", "Republic of India");
    h.store.seed_tag_with_id(country);

    let views = h
        .engine
        .get_tags_by_ids(GetTagsByIds::new(vec![800, 9_999, 255, 700]))
        .await
        .unwrap();
    let ids: Vec<TagId> = views.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![800, 255, 700]);

    assert_eq!(views[0].name, "Republic of India");
    assert_eq!(views[1].grade, Some(5));
    assert!(views[2].attributes.is_default());
    assert!(views[2].attributes.color().is_none());
}

#[tokio::test]
async fn test_get_tags_by_ids_unmapped_grade_uses_default() {
    let h = Harness::new();
    let grade = h.seed(TagType::Grade, "Grade X", &[]);

    let views = h
        .engine
        .get_tags_by_ids(GetTagsByIds::new(vec![grade.id]))
        .await
        .unwrap();
    assert_eq!(views[0].grade, Some(curric_core::defaults::DEFAULT_GRADE));
}

#[tokio::test]
async fn test_get_tags_by_ids_localizes_names() {
    let h = Harness::new();
    let chain = h.k12();
    let id = h
        .engine
        .create_tag(chapter("Fractions", chain.path()))
        .await
        .unwrap()
        .id;
    h.engine
        .update_tag_locale(TagLocaleUpdate {
            action: LocaleAction::Add,
            id,
            name: "Bhinn".into(),
            locales: vec![LocaleEntry {
                locale: "hi".into(),
                country_id: "91".into(),
            }],
        })
        .await
        .unwrap();

    let localized = h
        .engine
        .get_tags_by_ids(GetTagsByIds::new(vec![id]).localized("91", "hi"))
        .await
        .unwrap();
    assert_eq!(localized[0].name, "Bhinn");
    assert!(localized[0].locales.is_empty());

    let mut with_locales = GetTagsByIds::new(vec![id]).localized("91", "ta");
    with_locales.with_locales = true;
    let fallback = h.engine.get_tags_by_ids(with_locales).await.unwrap();
    assert_eq!(fallback[0].name, "Fractions");
    assert_eq!(fallback[0].locales.len(), 1);
}

#[tokio::test]
async fn test_hierarchy_listing_follows_sibling_order() {
    let h = Harness::new();
    let chain = h.k12();
    let mut ids = Vec::new();
    for name in ["A", "B", "C"] {
        ids.push(h.engine.create_tag(chapter(name, chain.path())).await.unwrap().id);
    }

    let hidden = h
        .engine
        .get_tags_by_hierarchy(listing(chain.path(), TagType::Chapter, TagGroup::Content))
        .await
        .unwrap();
    assert!(hidden.is_empty());

    h.engine
        .update_tag_order(reorder(TagType::Chapter, chain.path(), &[ids[2], ids[0], ids[1]]))
        .await
        .unwrap();
    let views = h
        .engine
        .get_tags_by_hierarchy(listing(chain.path(), TagType::Chapter, TagGroup::Content))
        .await
        .unwrap();
    let names: Vec<&str> = views.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["C", "A", "B"]);
}

#[tokio::test]
async fn test_hierarchy_listing_rejects_root_type() {
    let h = Harness::new();
    let chain = h.k12();
    let err = h
        .engine
        .get_tags_by_hierarchy(listing(vec![chain.country.id], TagType::Country, TagGroup::Curriculum))
        .await
        .unwrap_err();
    assert!(err.is(codes::TAG_TYPE_INVALID));
}

#[tokio::test]
async fn test_hierarchy_listing_merges_multi_grade_siblings() {
    let h = Harness::new();
    let chain = h.k12();
    let mut attributes = Attributes::new();
    attributes.insert(
        "multi_grade",
        json!([{ "country_id": "9", "grade_tag_ids": [chain.grade.id.to_string()] }]),
    );
    let shared = h.seed_with(TagType::Grade, "Grade 5 (new)", &[chain.grade_key()], attributes);
    let shared_key = format!("{}.{}", chain.grade_key(), shared.id);
    h.seed(TagType::Subject, "Physics", &[shared_key]);
    let path = vec![chain.country.id, chain.board.id, chain.grade.id];

    let single = h
        .engine
        .get_tags_by_hierarchy(listing(path.clone(), TagType::Subject, TagGroup::Curriculum))
        .await
        .unwrap();
    let names: Vec<&str> = single.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["Maths"]);

    let mut query = listing(path, TagType::Subject, TagGroup::Curriculum);
    query.country_id = Some("9".into());
    let merged = h.engine.get_tags_by_hierarchy(query).await.unwrap();
    let names: Vec<&str> = merged.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, vec!["Maths", "Physics"]);
    assert!(h
        .cache
        .contains(&keys::multi_grade("9", Some(chain.board.id), chain.grade.id)));
}

#[tokio::test]
async fn test_hierarchy_listing_merges_own_teacher_tags() {
    let h = Harness::new();
    let chain = h.k12();
    let zeta = h.engine.create_tag(chapter("Zeta", chain.path())).await.unwrap();
    let beta = h.engine.create_tag(chapter("Beta", chain.path())).await.unwrap();
    h.engine
        .update_tag_order(reorder(TagType::Chapter, chain.path(), &[zeta.id, beta.id]))
        .await
        .unwrap();
    h.engine
        .create_tags_positional(vec![chapter("alpha", chain.path()).with_creator(42, "teacher")])
        .await
        .unwrap();
    h.engine
        .create_tags_positional(vec![chapter("Gamma", chain.path()).with_creator(7, "teacher")])
        .await
        .unwrap();

    let names = |views: Vec<curric_engine::TagView>| -> Vec<String> {
        views.into_iter().map(|v| v.name).collect()
    };
    let global = h
        .engine
        .get_tags_by_hierarchy(listing(chain.path(), TagType::Chapter, TagGroup::Content))
        .await
        .unwrap();
    assert_eq!(names(global), vec!["Zeta", "Beta"]);

    let mut query = listing(chain.path(), TagType::Chapter, TagGroup::Content);
    query.creator_id = Some(42);
    let own = h.engine.get_tags_by_hierarchy(query).await.unwrap();
    assert_eq!(names(own), vec!["alpha", "Beta", "Zeta"]);

    let mut query = listing(chain.path(), TagType::Chapter, TagGroup::Content);
    query.creator_id = Some(99);
    let none = h.engine.get_tags_by_hierarchy(query).await.unwrap();
    assert_eq!(names(none), vec!["Zeta", "Beta"]);
}

#[tokio::test]
async fn test_country_listing_is_cached_until_a_country_changes() {
    let h = Harness::new();
    let india = h.store.seed_tag(new_tag(TagType::Country, "India", CurriculumType::Root));
    let oman = h.store.seed_tag(new_tag(TagType::Country, "Oman", CurriculumType::Root));
    let qatar = h.store.seed_tag(new_tag(TagType::Country, "Qatar", CurriculumType::Root));
    h.seed(TagType::Board, "CBSE", &[india.id.to_string()]);
    h.engine
        .update_tag(UpdateTag {
            id: qatar.id,
            name: None,
            attributes: None,
            hidden: Some(true),
        })
        .await
        .unwrap();

    let public = h.engine.countries(0, 10).await.unwrap();
    let names: Vec<&str> = public.tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["India", "Oman"]);
    assert_eq!(public.next, -1);

    let admin = h.engine.countries_for_admin(0, 2).await.unwrap();
    assert_eq!(admin.tags.len(), 2);
    assert_eq!(admin.next, 2);
    let rest = h.engine.countries_for_admin(2, 2).await.unwrap();
    assert_eq!(rest.tags[0].id, qatar.id);
    assert_eq!(rest.next, -1);

    let public_key = keys::country(CurriculumType::Root, TagType::Country, 0, 10);
    let admin_key = keys::country_admin(CurriculumType::Root, TagType::Country, 0, 2);
    assert!(h.cache.contains(&public_key));
    assert!(h.cache.contains(&admin_key));

    h.engine
        .update_tag(UpdateTag {
            id: oman.id,
            name: Some("Sultanate of Oman".into()),
            attributes: None,
            hidden: None,
        })
        .await
        .unwrap();
    assert!(!h.cache.contains(&public_key));
    assert!(!h.cache.contains(&admin_key));

    let renamed = h.engine.countries(0, 10).await.unwrap();
    let names: Vec<&str> = renamed.tags.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["India", "Sultanate of Oman"]);
}

#[tokio::test]
async fn test_validate_hierarchy_checks_edges() {
    let h = Harness::new();
    let chain = h.k12();
    let hidden = h
        .engine
        .create_tag(chapter("Admin draft", chain.path()))
        .await
        .unwrap();
    let visible = h
        .engine
        .create_tags_positional(vec![chapter("Teacher copy", chain.path())])
        .await
        .unwrap()
        .remove(0);
    let with = |id: TagId| {
        let mut path = chain.path();
        path.push(id);
        ValidateHierarchy {
            curriculum_type: CurriculumType::K12,
            paths: vec![path],
        }
    };

    h.engine.validate_hierarchy(with(visible.id)).await.unwrap();

    let err = h.engine.validate_hierarchy(with(hidden.id)).await.unwrap_err();
    assert!(err.is(codes::PARENT_HIDDEN));

    let err = h.engine.validate_hierarchy(with(9_999)).await.unwrap_err();
    assert!(err.is(codes::HIERARCHY_INVALID));

    let science = h.seed(TagType::Subject, "Science", &[chain.subject_key()]);
    let elsewhere = ValidateHierarchy {
        curriculum_type: CurriculumType::K12,
        paths: vec![vec![
            chain.country.id,
            chain.board.id,
            chain.grade.id,
            science.id,
            chain.curriculum.id,
            visible.id,
        ]],
    };
    let err = h.engine.validate_hierarchy(elsewhere).await.unwrap_err();
    assert!(err.is(codes::HIERARCHY_INVALID));

    let err = h
        .engine
        .validate_hierarchy(ValidateHierarchy {
            curriculum_type: CurriculumType::K12,
            paths: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(err.is(codes::HIERARCHY_INVALID));
}

#[tokio::test]
async fn test_suggested_curriculum_nests_topics_under_chapters() {
    let h = Harness::new();
    let chain = h.k12();
    let first = h.engine.create_tag(chapter("Numbers", chain.path())).await.unwrap();
    let second = h.engine.create_tag(chapter("Shapes", chain.path())).await.unwrap();
    h.engine
        .update_tag_order(reorder(TagType::Chapter, chain.path(), &[second.id, first.id]))
        .await
        .unwrap();

    let mut topic_path = chain.path();
    topic_path.push(second.id);
    let mut topic_ids = Vec::new();
    for name in ["Circles", "Triangles"] {
        topic_ids.push(
            h.engine
                .create_tag(topic(name, topic_path.clone()))
                .await
                .unwrap()
                .id,
        );
    }
    h.engine
        .update_tag_order(reorder(TagType::Topic, topic_path, &[topic_ids[1], topic_ids[0]]))
        .await
        .unwrap();

    let suggested = h
        .engine
        .get_suggested_curriculum(SuggestedCurriculumRequest {
            tag_ids: chain.path(),
            curriculum_type: CurriculumType::K12,
        })
        .await
        .unwrap();
    let chapters: Vec<&str> = suggested.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(chapters, vec!["Shapes", "Numbers"]);
    let topics: Vec<&str> = suggested[0].topics.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(topics, vec!["Triangles", "Circles"]);
    assert!(suggested[1].topics.is_empty());
}

#[tokio::test]
async fn test_suggested_curriculum_empty_when_no_chapters() {
    let h = Harness::new();
    let chain = h.k12();
    let suggested = h
        .engine
        .get_suggested_curriculum(SuggestedCurriculumRequest {
            tag_ids: chain.path(),
            curriculum_type: CurriculumType::K12,
        })
        .await
        .unwrap();
    assert!(suggested.is_empty());
}

#[tokio::test]
async fn test_default_tags_come_from_config() {
    let h = Harness::with_config(CurriculumConfig::default().with_default_tags(900, 901));
    h.store.seed_tag_with_id(tag(900, TagType::Topic, CurriculumType::K12));
    h.store.seed_tag_with_id(tag(901, TagType::Topic, CurriculumType::K12));

    let defaults = h.engine.default_tags().await.unwrap();
    assert_eq!(defaults.misc.id, 900);
    assert_eq!(defaults.resource.id, 901);

    let unconfigured = Harness::new();
    let err = unconfigured.engine.default_tags().await.unwrap_err();
    assert!(err.is(codes::PARENT_TAG_TYPE_INVALID));
}
