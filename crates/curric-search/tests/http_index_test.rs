//! HTTP index client behavior.
//!
//! The live round trip runs with `cargo test -p curric-search -- --ignored`
//! and `INDEX_URL` pointing at a running index.

use std::time::Duration;

use curric_core::{
    Access, CurriculumType, IndexDocument, IndexQuery, SearchIndex, TagGroup, TagName, TagType,
};
use curric_search::{HttpSearchIndex, IndexOp};

const UNREACHABLE: &str = "http://127.0.0.1:9";

fn doc(id: i64, parents: &[&str]) -> IndexDocument {
    IndexDocument {
        id,
        tag_type: TagType::Chapter,
        names: vec![TagName {
            value: format!("index-test-{}", id),
            locale: "en".into(),
        }],
        curriculum_type: CurriculumType::K12,
        creator_id: Some(1),
        creator_type: Some("admin".into()),
        access: Access::Global,
        tag_group: TagGroup::Content,
        country_id: "0".into(),
        parents: parents.iter().map(|p| p.to_string()).collect(),
        deleted: false,
    }
}

#[tokio::test]
async fn test_unreachable_index_reports_operation_codes() {
    let index = HttpSearchIndex::new(UNREACHABLE, Duration::from_secs(2)).unwrap();
    let parents = vec!["1.2".to_string()];

    let err = index.upsert_tag(&doc(1, &[])).await.unwrap_err();
    assert_eq!(err.code(), IndexOp::Create.error_code());

    let err = index.add_parents(1, &parents).await.unwrap_err();
    assert_eq!(err.code(), IndexOp::AddParents.error_code());

    let err = index.hide_parents(1, &parents).await.unwrap_err();
    assert_eq!(err.code(), IndexOp::HideParents.error_code());

    let err = index
        .query_tags(&IndexQuery {
            text: Some("light".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), IndexOp::Search.error_code());
}

#[tokio::test]
async fn test_base_url_is_trimmed() {
    let index = HttpSearchIndex::new("http://index.local/", Duration::from_secs(1)).unwrap();
    assert_eq!(index.base_url(), "http://index.local");
}

#[tokio::test]
#[ignore = "requires a running search index"]
async fn test_live_parent_visibility_round_trip() {
    let url = std::env::var("INDEX_URL").expect("INDEX_URL");
    let index = HttpSearchIndex::new(url, Duration::from_secs(10)).unwrap();
    let id = 900_000_000 + (std::process::id() as i64);
    let key = format!("{}.{}", id, id + 1);
    let by_parent = IndexQuery {
        parents: vec![key.clone()],
        ..Default::default()
    };

    index.upsert_tag(&doc(id, &[&key])).await.unwrap();
    assert!(index.query_tags(&by_parent).await.unwrap().ids.contains(&id));

    index.hide_parents(id, &[key.clone()]).await.unwrap();
    assert!(!index.query_tags(&by_parent).await.unwrap().ids.contains(&id));

    index.add_parents(id, &[key.clone()]).await.unwrap();
    assert!(index.query_tags(&by_parent).await.unwrap().ids.contains(&id));

    index.update_tag(id, Some(true), &[]).await.unwrap();
    assert!(!index.query_tags(&by_parent).await.unwrap().ids.contains(&id));
}
