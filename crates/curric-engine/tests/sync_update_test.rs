//! Column updates, locale changes, and identifier removal.

mod common;

use common::Harness;
use curric_core::{codes, Attributes, CompensationTask, CurriculumType, TagGroup, TagName, TagType};
use curric_engine::{CreateTag, LocaleAction, LocaleEntry, TagLocaleUpdate, UpdateTag};

fn name(value: &str, locale: &str) -> TagName {
    TagName {
        value: value.to_string(),
        locale: locale.to_string(),
    }
}

async fn chapter(h: &Harness, title: &str) -> i64 {
    let chain = h.k12();
    h.engine
        .create_tag(
            CreateTag::new(TagType::Chapter, title, TagGroup::Content, CurriculumType::K12)
                .under(chain.path()),
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_rename_reaches_store_and_index() {
    let h = Harness::new();
    let id = chapter(&h, "Old").await;

    let updated = h
        .engine
        .update_tag(UpdateTag {
            id,
            name: Some("New".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.name, "New");
    assert_eq!(h.store.tag(id).unwrap().name, "New");
    assert_eq!(h.index.document(id).unwrap().names, vec![name("New", "en")]);
}

#[tokio::test]
async fn test_read_after_update_is_not_stale() {
    let h = Harness::new();
    let id = chapter(&h, "Old").await;

    assert_eq!(h.engine.get_tag(id).await.unwrap().name, "Old");
    h.engine
        .update_tag(UpdateTag {
            id,
            name: Some("New".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(h.engine.get_tag(id).await.unwrap().name, "New");
}

#[tokio::test]
async fn test_hide_unpublishes_and_marks_deleted() {
    let h = Harness::new();
    let id = chapter(&h, "Gone").await;

    h.engine
        .update_tag(UpdateTag {
            id,
            hidden: Some(true),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!h.store.tag(id).unwrap().publish);
    assert!(h.index.document(id).unwrap().deleted);
}

#[tokio::test]
async fn test_attributes_merge_over_existing() {
    let h = Harness::new();
    let chain = h.k12();
    let mut attributes = Attributes::new();
    attributes.insert("color", "#111111");
    let id = h
        .engine
        .create_tag(
            CreateTag::new(TagType::Chapter, "Tinted", TagGroup::Content, CurriculumType::K12)
                .under(chain.path())
                .with_attributes(attributes),
        )
        .await
        .unwrap()
        .id;

    let mut patch = Attributes::new();
    patch.insert("pic", "cover.png");
    h.engine
        .update_tag(UpdateTag {
            id,
            attributes: Some(patch),
            ..Default::default()
        })
        .await
        .unwrap();

    let stored = h.store.tag(id).unwrap();
    assert_eq!(stored.attributes.color(), Some("#111111"));
    assert_eq!(stored.attributes.pic(), Some("cover.png"));
}

#[tokio::test]
async fn test_empty_update_is_a_no_op() {
    let h = Harness::new();
    let id = chapter(&h, "Same").await;
    h.index.clear_calls();

    let tag = h
        .engine
        .update_tag(UpdateTag {
            id,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(tag.name, "Same");
    assert!(h.index.writes().is_empty());
}

#[tokio::test]
async fn test_rename_commit_failure_restores_index_names() {
    let h = Harness::new();
    let id = chapter(&h, "Old").await;
    h.store.fail_commits(true);

    let err = h
        .engine
        .update_tag(UpdateTag {
            id,
            name: Some("New".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.is(codes::DB_COMMIT_ERROR));
    assert_eq!(
        h.compensator.tasks(),
        vec![CompensationTask::Restore {
            tag_id: id,
            deleted: None,
            names: vec![name("Old", "en")],
        }]
    );

    h.compensator.settle().await;
    assert_eq!(h.index.document(id).unwrap().names, vec![name("Old", "en")]);
    assert_eq!(h.store.tag(id).unwrap().name, "Old");
}

#[tokio::test]
async fn test_update_unknown_tag_is_not_found() {
    let h = Harness::new();
    let err = h
        .engine
        .update_tag(UpdateTag {
            id: 777,
            name: Some("x".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.is(codes::TAG_NOT_FOUND));
}

#[tokio::test]
async fn test_locale_add_then_remove() {
    let h = Harness::new();
    let id = chapter(&h, "Fractions").await;
    let entry = LocaleEntry {
        locale: "hi".into(),
        country_id: "91".into(),
    };

    h.engine
        .update_tag_locale(TagLocaleUpdate {
            action: LocaleAction::Add,
            id,
            name: "Bhinn".into(),
            locales: vec![entry.clone()],
        })
        .await
        .unwrap();
    assert!(h.store.tag(id).unwrap().locale_available);
    assert_eq!(
        h.index.document(id).unwrap().names,
        vec![name("Fractions", "en"), name("Bhinn", "hi")]
    );
    let view = h.engine.get_tag(id).await.unwrap();
    assert_eq!(view.locales.len(), 1);
    assert_eq!(view.locales[0].name, "Bhinn");

    h.engine
        .update_tag_locale(TagLocaleUpdate {
            action: LocaleAction::Remove,
            id,
            name: String::new(),
            locales: vec![entry],
        })
        .await
        .unwrap();
    assert!(!h.store.tag(id).unwrap().locale_available);
    assert_eq!(
        h.index.document(id).unwrap().names,
        vec![name("Fractions", "en")]
    );
}

#[tokio::test]
async fn test_locale_add_replaces_existing_mapping() {
    let h = Harness::new();
    let id = chapter(&h, "Fractions").await;
    let entry = LocaleEntry {
        locale: "hi".into(),
        country_id: "91".into(),
    };
    for title in ["First", "Second"] {
        h.engine
            .update_tag_locale(TagLocaleUpdate {
                action: LocaleAction::Add,
                id,
                name: title.into(),
                locales: vec![entry.clone()],
            })
            .await
            .unwrap();
    }

    let view = h.engine.get_tag(id).await.unwrap();
    assert_eq!(view.locales.len(), 1);
    assert_eq!(view.locales[0].name, "Second");
}

#[tokio::test]
async fn test_remove_identifier_tag() {
    let h = Harness::new();
    let identifier = h
        .engine
        .create_tag(CreateTag::new(
            TagType::Curriculum,
            "Old Syllabus",
            TagGroup::Identifier,
            CurriculumType::K12,
        ))
        .await
        .unwrap();

    h.engine.remove_identifier_tag(identifier.id).await.unwrap();
    assert!(!h.store.tag(identifier.id).unwrap().publish);
    assert!(h.index.document(identifier.id).unwrap().deleted);

    let chapter_id = chapter(&h, "Not an identifier").await;
    let err = h.engine.remove_identifier_tag(chapter_id).await.unwrap_err();
    assert!(err.is(codes::NOT_IDENTIFIER));
}
