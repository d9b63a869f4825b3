//! Error types for curric.
//!
//! Every failure surfaced to callers carries a stable camelCase code (see
//! [`codes`]) and belongs to one of four classes reported by [`Error::kind`].

use thiserror::Error;

/// Result type alias using curric's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes returned to callers.
pub mod codes {
    pub const CURRICULUM_TYPE_INVALID: &str = "curriculumTypeInvalid";
    pub const TYPE_INVALID: &str = "typeInvalid";
    pub const TAG_TYPE_INVALID: &str = "tagTypeInvalid";
    pub const TAG_GROUP_MISMATCH: &str = "tagGroupMismatch";
    pub const HIERARCHY_ABSENT: &str = "hierarchyAbsent";
    pub const HIERARCHY_INVALID: &str = "hierarchyInvalid";
    pub const NOT_ENOUGH_PARENT_TAGS: &str = "notEnoughParentTags";
    pub const PARENT_TAG_TYPE_ABSENT: &str = "parentTagTypeAbsent";
    pub const PARENT_TAG_INVALID: &str = "parentTagInvalid";
    pub const PARENT_TAG_TYPE_INVALID: &str = "parentTagTypeInvalid";
    pub const PARENT_TAG_MISSING: &str = "parentTagMissing";
    pub const PARENT_HIDDEN: &str = "parentHidden";
    pub const PARENT_MAPPING_EXIST: &str = "parentMappingExist";
    pub const ILLEGAL_PARENT_IDENTIFIER_TAGS: &str = "illegalParentIdentifierTags";
    pub const TAG_LIMIT_REACHED: &str = "tagLimitReached";
    pub const TAG_LENGTH_MISMATCH: &str = "tagLengthMismatch";
    pub const ORDERING_NOT_ALLOWED: &str = "orderingNotAllowed";
    pub const TAG_ID_MISSING: &str = "tagIdMissing";
    pub const NOT_IDENTIFIER: &str = "notIdentifier";
    pub const START_GREATER_THAN_END: &str = "startGreaterThanEnd";
    pub const INVALID_CHAPTER: &str = "invalidChapter";
    pub const TAG_NOT_FOUND: &str = "tagNotFound";
    pub const DB_COMMIT_ERROR: &str = "dbCommitError";
    pub const DB_ERROR: &str = "dbError";
    pub const TAG_MAPPER_ERROR: &str = "tagMapperError";
    pub const SERIALIZATION_ERROR: &str = "serializationError";
    pub const REQUEST_ERROR: &str = "requestError";
    pub const CONFIG_ERROR: &str = "configError";
}

/// Taxonomy class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    InternalServer,
    ParamMissing,
}

/// Core error type for curric operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid hierarchy, unknown type, sibling limit, identifier conflict
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unknown tag on direct fetch
    #[error("Not found: {0}")]
    NotFound(String),

    /// Store, transaction, or mapping failure; unexpected in-unit fault
    #[error("Internal error: {0}")]
    Internal(String),

    /// Required hierarchy field absent on a defensive re-check
    #[error("Missing parameter: {0}")]
    ParamMissing(String),

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Search index call failed; carries the index operation code
    #[error("Index error: {0}")]
    Index(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn bad_request(code: impl Into<String>) -> Self {
        Error::BadRequest(code.into())
    }

    pub fn internal(code: impl Into<String>) -> Self {
        Error::Internal(code.into())
    }

    /// Taxonomy class used by the transport layer to pick a status.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ParamMissing(_) => ErrorKind::ParamMissing,
            Error::Internal(_)
            | Error::Database(_)
            | Error::Serialization(_)
            | Error::Index(_)
            | Error::Request(_)
            | Error::Config(_) => ErrorKind::InternalServer,
        }
    }

    /// Stable code for the error.
    pub fn code(&self) -> &str {
        match self {
            Error::BadRequest(code)
            | Error::NotFound(code)
            | Error::Internal(code)
            | Error::ParamMissing(code)
            | Error::Index(code) => code,
            Error::Database(_) => codes::DB_ERROR,
            Error::Serialization(_) => codes::SERIALIZATION_ERROR,
            Error::Request(_) => codes::REQUEST_ERROR,
            Error::Config(_) => codes::CONFIG_ERROR,
        }
    }

    /// True when this error carries the given code.
    pub fn is(&self, code: &str) -> bool {
        self.code() == code
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_bad_request() {
        let err = Error::bad_request(codes::TAG_LIMIT_REACHED);
        assert_eq!(err.to_string(), "Bad request: tagLimitReached");
    }

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound(codes::TAG_NOT_FOUND.to_string());
        assert_eq!(err.to_string(), "Not found: tagNotFound");
    }

    #[test]
    fn test_error_display_internal() {
        let err = Error::internal("createTagPanicked");
        assert_eq!(err.to_string(), "Internal error: createTagPanicked");
    }

    #[test]
    fn test_error_display_param_missing() {
        let err = Error::ParamMissing("hierarchy".to_string());
        assert_eq!(err.to_string(), "Missing parameter: hierarchy");
    }

    #[test]
    fn test_error_display_index() {
        let err = Error::Index("addParentTagsElasticError".to_string());
        assert_eq!(err.to_string(), "Index error: addParentTagsElasticError");
    }

    #[test]
    fn test_error_kind_taxonomy() {
        assert_eq!(Error::bad_request("x").kind(), ErrorKind::BadRequest);
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::ParamMissing("x".into()).kind(), ErrorKind::ParamMissing);
        assert_eq!(Error::internal("x").kind(), ErrorKind::InternalServer);
        assert_eq!(Error::Index("x".into()).kind(), ErrorKind::InternalServer);
        assert_eq!(
            Error::Serialization("x".into()).kind(),
            ErrorKind::InternalServer
        );
    }

    #[test]
    fn test_error_code_passthrough() {
        let err = Error::bad_request(codes::ILLEGAL_PARENT_IDENTIFIER_TAGS);
        assert_eq!(err.code(), "illegalParentIdentifierTags");
        assert!(err.is(codes::ILLEGAL_PARENT_IDENTIFIER_TAGS));
        assert!(!err.is(codes::PARENT_TAG_MISSING));
    }

    #[test]
    fn test_error_code_for_wrapped_errors() {
        assert_eq!(Error::Database(sqlx::Error::RowNotFound).code(), "dbError");
        assert_eq!(Error::Request("timeout".into()).code(), "requestError");
        assert_eq!(Error::Config("bad".into()).code(), "configError");
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_error_from_sqlx() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Database(_)));
    }
}
