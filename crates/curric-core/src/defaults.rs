//! Centralized default constants for curric.
//!
//! Values shared across crates live here so the sync engine, the query layer,
//! and the resync binary agree on them.

// =============================================================================
// PARENT LINK TYPES
// =============================================================================

/// parent_tag_type of the curriculum-key edge for canonical-root curricula.
pub const ROOT_CURRICULUM: &str = "root";

/// parent_tag_type of the curriculum-key edge for derived curricula.
pub const DERIVED_CURRICULUM: &str = "derived";

/// parent_tag_type of the ordering-key edge.
pub const HIERARCHY_CURRICULUM: &str = "hierarchy";

/// Separator used when joining ancestor ids into a parent key.
pub const PARENT_KEY_SEPARATOR: char = '.';

// =============================================================================
// ORDERING
// =============================================================================

/// Maximum number of siblings under one (parent, type).
pub const TAG_LIMIT: usize = 50;

/// Sentinel order marking a pending placement created by bulk attach.
pub const ORDER_MAX: i32 = 1000;

// =============================================================================
// TAG DEFAULTS
// =============================================================================

/// Locale of the tag's primary name.
pub const DEFAULT_LOCALE: &str = "en";

/// Country scope assigned to admin-created tags.
pub const DEFAULT_COUNTRY_ID: &str = "0";

/// Grade reported for grade tags outside the grade tag map.
pub const DEFAULT_GRADE: i32 = 99;

/// Default color for subject/test/skill/course tags.
pub const DEFAULT_COLOR: &str = "#5a5a5a";

/// Default picture for subject/test/skill/course tags.
pub const DEFAULT_PIC: &str = "";

/// Grade number → grade tag id.
pub const GRADE_TAG_MAP: [(&str, &str); 12] = [
    ("1", "251"),
    ("2", "252"),
    ("3", "253"),
    ("4", "254"),
    ("5", "255"),
    ("6", "256"),
    ("7", "257"),
    ("8", "258"),
    ("9", "259"),
    ("10", "260"),
    ("11", "261"),
    ("12", "262"),
];

/// Legacy product ids that belong to the university curriculum.
pub const UNIVERSITY_PRODUCTS: [&str; 9] = ["24", "27", "29", "30", "44", "54", "95", "98", "105"];

/// Country ids whose grades may be shared across several grade tags.
pub const MULTI_GRADE_COUNTRIES: [&str; 1] = ["9"];

/// Grade argument meaning "the highest grade of the product".
pub const HIGHEST_GRADE: &str = "13";

/// Grade argument meaning "every grade of the product".
pub const ALL_GRADES: &str = "0";

/// Look up the grade tag id for a grade number.
pub fn grade_tag_id(grade: &str) -> Option<&'static str> {
    GRADE_TAG_MAP
        .iter()
        .find(|(g, _)| *g == grade)
        .map(|(_, id)| *id)
}

/// Look up the grade number for a grade tag id.
pub fn grade_for_tag_id(tag_id: &str) -> Option<i32> {
    GRADE_TAG_MAP
        .iter()
        .find(|(_, id)| *id == tag_id)
        .and_then(|(g, _)| g.parse().ok())
}

pub fn is_university_product(product_id: &str) -> bool {
    UNIVERSITY_PRODUCTS.contains(&product_id)
}

pub fn is_multi_grade_country(country_id: &str) -> bool {
    MULTI_GRADE_COUNTRIES.contains(&country_id)
}

// =============================================================================
// QUERY
// =============================================================================

/// Page size used when the caller does not set one.
pub const DEFAULT_QUERY_LIMIT: i64 = 100;

/// `next` value returned when no further page exists.
pub const NO_NEXT_PAGE: i64 = -1;

// =============================================================================
// CACHE
// =============================================================================

/// Default cache TTL in seconds (24 hours).
pub const CACHE_TTL_SECS: u64 = 24 * 60 * 60;

/// TTL for multi-grade resolution results (30 minutes).
pub const MULTI_GRADE_TTL_SECS: u64 = 30 * 60;

/// Capacity of the in-process LRU cache.
pub const MEMORY_CACHE_CAPACITY: usize = 10_000;

// =============================================================================
// COMPENSATION
// =============================================================================

/// Attempts made for a single compensation task before it is logged as orphaned.
pub const COMPENSATION_MAX_ATTEMPTS: u32 = 3;

/// Base backoff between compensation attempts in milliseconds.
pub const COMPENSATION_BACKOFF_MS: u64 = 200;

// =============================================================================
// INDEX
// =============================================================================

/// Search index base URL.
pub const INDEX_URL: &str = "http://localhost:9200";

/// Timeout for index requests (seconds).
pub const INDEX_TIMEOUT_SECS: u64 = 10;

/// Tag ids rebuilt per batch by the resync pass.
pub const RESYNC_BATCH_SIZE: i64 = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_tag_map_lookup() {
        assert_eq!(grade_tag_id("1"), Some("251"));
        assert_eq!(grade_tag_id("12"), Some("262"));
        assert_eq!(grade_tag_id("13"), None);
    }

    #[test]
    fn test_grade_for_tag_id() {
        assert_eq!(grade_for_tag_id("259"), Some(9));
        assert_eq!(grade_for_tag_id("999"), None);
    }

    #[test]
    fn test_sentinel_is_above_limit() {
        assert!(ORDER_MAX as usize > TAG_LIMIT);
    }

    #[test]
    fn test_product_and_country_sets() {
        assert!(is_university_product("95"));
        assert!(!is_university_product("1"));
        assert!(is_multi_grade_country("9"));
        assert!(!is_multi_grade_country("1"));
    }
}
