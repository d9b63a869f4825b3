//! Round trips against a live PostgreSQL.
//!
//! Run with `cargo test -p curric-db -- --ignored` and `DATABASE_URL` set.

use curric_core::fixtures::new_tag;
use curric_core::{
    Attributes, CurriculumType, NewParentLink, NewTagLocale, TagPatch, TagStore, TagType,
};
use curric_db::test_fixtures::{connect_test_database, unique_name};

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_insert_and_read_back_tag() {
    let db = connect_test_database().await.expect("connect");
    let name = unique_name("subject");

    let mut new = new_tag(TagType::Subject, &name, CurriculumType::K12);
    let mut attributes = Attributes::new();
    attributes.insert("color", "#112233");
    new.attributes = attributes;

    let mut tx = db.tags.begin().await.unwrap();
    let id = tx.insert_tag(&new).await.unwrap();
    tx.commit().await.unwrap();

    let tag = db.tags.get_tag(id).await.unwrap().expect("tag row");
    assert_eq!(tag.name, name);
    assert_eq!(tag.curriculum_type, CurriculumType::K12);
    assert_eq!(tag.attributes.color(), Some("#112233"));
    assert!(tag.publish);
    assert!(!tag.locale_available);
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_rolled_back_tag_is_absent() {
    let db = connect_test_database().await.expect("connect");
    let name = unique_name("rollback");

    let mut tx = db.tags.begin().await.unwrap();
    let id = tx
        .insert_tag(&new_tag(TagType::Subject, &name, CurriculumType::K12))
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert!(db.tags.get_tag(id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_links_orders_and_patch() {
    let db = connect_test_database().await.expect("connect");
    let parent_key = unique_name("1.2");

    let mut tx = db.tags.begin().await.unwrap();
    let a = tx
        .insert_tag(&new_tag(TagType::Chapter, &unique_name("a"), CurriculumType::K12))
        .await
        .unwrap();
    let b = tx
        .insert_tag(&new_tag(TagType::Chapter, &unique_name("b"), CurriculumType::K12))
        .await
        .unwrap();
    let link_a = tx
        .insert_link(&NewParentLink {
            tag_id: a,
            tag_type: TagType::Chapter,
            parent_tag_type: "hierarchy".into(),
            parent_tag_id: parent_key.clone(),
            order: 2,
            hidden: true,
        })
        .await
        .unwrap();
    tx.insert_link(&NewParentLink {
        tag_id: b,
        tag_type: TagType::Chapter,
        parent_tag_type: "hierarchy".into(),
        parent_tag_id: parent_key.clone(),
        order: 1,
        hidden: false,
    })
    .await
    .unwrap();
    tx.set_link_hidden(link_a, false).await.unwrap();
    tx.update_tag(
        a,
        &TagPatch {
            name: Some("renamed".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let rows = db.tags.order_rows(&parent_key, TagType::Chapter).await.unwrap();
    let ids: Vec<i64> = rows.iter().map(|r| r.tag_id).collect();
    assert_eq!(ids, vec![b, a]);
    assert!(rows.iter().all(|r| !r.hidden));

    let link = db.tags.link_to_parent(a, &parent_key).await.unwrap().unwrap();
    assert_eq!(link.order, 2);
    assert_eq!(db.tags.get_tag(a).await.unwrap().unwrap().name, "renamed");
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_locale_soft_delete() {
    let db = connect_test_database().await.expect("connect");

    let mut tx = db.tags.begin().await.unwrap();
    let id = tx
        .insert_tag(&new_tag(TagType::Subject, &unique_name("loc"), CurriculumType::K12))
        .await
        .unwrap();
    let locale_id = tx
        .insert_locale(&NewTagLocale {
            tag_id: id,
            country_id: "9".into(),
            locale: "ar".into(),
            name: "رياضيات".into(),
            tag_type: TagType::Subject,
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let found = db.tags.locale_for(id, "9", "AR").await.unwrap();
    assert_eq!(found.map(|l| l.id), Some(locale_id));

    let mut tx = db.tags.begin().await.unwrap();
    tx.delete_locale(locale_id).await.unwrap();
    tx.commit().await.unwrap();
    assert!(db.tags.locales_for_tag(id).await.unwrap().is_empty());
}
