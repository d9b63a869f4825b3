//! Structured logging field name constants for curric.
//!
//! All crates use these constants for consistent structured logging fields.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Orphan inconsistency between stores, compensation exhausted |
//! | WARN  | Cache failure or index fallback, automatic recovery applied |
//! | INFO  | Lifecycle events, completed mutations |
//! | DEBUG | Cache hits/misses, resolved parent keys |
//! | TRACE | Per-item iteration inside batches |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "database", "index", "cache", "sync", "batch", "query"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "http_index", "redis", "compensator", "allocator"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "create_tag", "bulk_attach", "hide_parents"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Tag id being operated on.
pub const TAG_ID: &str = "tag_id";

/// Dot-joined parent key.
pub const PARENT_KEY: &str = "parent_key";

/// Tag type of the subject tag.
pub const TAG_TYPE: &str = "tag_type";

/// Curriculum type of the request.
pub const CURRICULUM_TYPE: &str = "curriculum_type";

/// Cache key touched by the cache layer.
pub const CACHE_KEY: &str = "cache_key";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a query.
pub const RESULT_COUNT: &str = "result_count";

/// Attempt number of a retried compensation.
pub const ATTEMPT: &str = "attempt";
