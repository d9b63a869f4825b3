//! Legacy id bridges, product grade lookups, and the index resync pass.

mod common;

use common::Harness;
use curric_core::{codes, CurriculumConfig, CurriculumType, TagGroup, TagType};
use curric_engine::{CreateTag, LegacyRef};

fn grade(id: &str) -> LegacyRef {
    LegacyRef {
        tag_id: None,
        id: id.to_string(),
        kind: "grade".to_string(),
    }
}

#[tokio::test]
async fn test_legacy_ids_for_one_and_many_tags() {
    let h = Harness::new();
    h.store.seed_legacy(10, "board", "board", "B-1");
    h.store.seed_legacy(10, "board", "folder", "F-1");
    h.store.seed_legacy(11, "subject", "subject", "S-9");

    let one = h.engine.legacy_ids_for_tag(10).await.unwrap();
    let ids: Vec<&str> = one.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["B-1", "F-1"]);
    assert!(one.iter().all(|r| r.tag_id.is_none()));

    let many = h.engine.legacy_ids_for_tags(&[11, 10, 11]).await.unwrap();
    assert_eq!(many.len(), 3);
    let subject = many.iter().find(|r| r.id == "S-9").unwrap();
    assert_eq!(subject.tag_id, Some(11));
    assert_eq!(subject.kind, "subject");
}

#[tokio::test]
async fn test_tag_for_legacy_id() {
    let h = Harness::with_config(CurriculumConfig::default().with_university_placement(1, 2, 3, 4));
    h.store.seed_legacy(42, "board", "board", "B-7");

    let mapped = h.engine.tag_for_legacy_id("board", "B-7").await.unwrap();
    assert_eq!(
        mapped,
        vec![LegacyRef {
            tag_id: None,
            id: "42".into(),
            kind: "board".into(),
        }]
    );

    let university = h.engine.tag_for_legacy_id("product", "24").await.unwrap();
    let kinds: Vec<&str> = university.iter().map(|r| r.kind.as_str()).collect();
    assert_eq!(kinds, vec!["degree", "major", "course", "section"]);
    let ids: Vec<&str> = university.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);

    assert!(h
        .engine
        .tag_for_legacy_id("board", "missing")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_grade_tags_by_product() {
    let h = Harness::new();
    h.store.seed_grade_product("P1", Some("5"), None);
    h.store.seed_grade_product("P1", Some("8"), Some("F8"));
    h.store.seed_legacy(300, "grade", "folder", "F8");

    assert_eq!(h.engine.grade_tags("5", "P1").await.unwrap(), vec![grade("255")]);
    assert_eq!(h.engine.grade_tags("8", "P1").await.unwrap(), vec![grade("300")]);
    assert_eq!(h.engine.grade_tags("3", "P1").await.unwrap(), vec![grade("253")]);
    assert_eq!(h.engine.grade_tags("13", "P1").await.unwrap(), vec![grade("300")]);
    assert_eq!(
        h.engine.grade_tags("0", "P1").await.unwrap(),
        vec![grade("255"), grade("300")]
    );
}

#[tokio::test]
async fn test_grade_tags_fallbacks() {
    let h = Harness::new();
    assert_eq!(h.engine.grade_tags("13", "P2").await.unwrap(), vec![grade("262")]);
    assert!(h.engine.grade_tags("0", "P2").await.unwrap().is_empty());
    assert!(h.engine.grade_tags("13", "24").await.unwrap().is_empty());
    assert!(h.engine.grade_tags("0", "24").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resync_rebuilds_document_with_hidden_keys() {
    let h = Harness::new();
    let chain = h.k12();
    let created = h
        .engine
        .create_tag(
            CreateTag::new(TagType::Chapter, "Fractions", TagGroup::Content, CurriculumType::K12)
                .under(chain.path()),
        )
        .await
        .unwrap();
    let mut stale = h.index.document(created.id).unwrap();
    stale.parents.clear();
    stale.names.clear();
    h.index.seed(stale);

    let report = h.engine.resync(created.id, created.id).await.unwrap();
    assert_eq!(report.scanned, 1);
    assert_eq!(report.rebuilt, 1);
    assert!(report.failed.is_empty());

    let doc = h.index.document(created.id).unwrap();
    assert_eq!(doc.parents.len(), 3);
    assert_eq!(doc.names[0].value, "Fractions");
    assert!(!doc.deleted);
    assert_eq!(h.index.hidden_parents(created.id), vec![chain.chapter_key()]);
    assert!(h.index.active_parents(created.id).contains(&chain.chapter_curriculum_key()));
}

#[tokio::test]
async fn test_resync_records_failures_and_continues() {
    let h = Harness::new();
    let chain = h.k12();
    h.index.fail_tag(chain.board.id);

    let report = h.engine.resync(0, 1_000).await.unwrap();
    assert_eq!(report.scanned, h.store.tag_count());
    assert_eq!(report.rebuilt, report.scanned - 1);
    assert_eq!(report.failed, vec![chain.board.id]);
}

#[tokio::test]
async fn test_resync_rejects_inverted_range() {
    let h = Harness::new();
    let err = h.engine.resync(10, 1).await.unwrap_err();
    assert!(err.is(codes::START_GREATER_THAN_END));
}
