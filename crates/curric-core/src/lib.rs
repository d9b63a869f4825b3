//! # curric-core
//!
//! Core types, schema registry, and hierarchy resolution for curric.
//!
//! This crate provides:
//! - Domain models (tags, parent links, locales, legacy mappings)
//! - The per-curriculum schema registry and the hierarchy resolver
//! - Pure sibling-order allocation
//! - Traits for the relational store, search index, cache store, and compensator
//! - The error taxonomy shared by every crate

pub mod attributes;
pub mod config;
pub mod defaults;
pub mod error;
pub mod fixtures;
pub mod hierarchy;
pub mod logging;
pub mod models;
pub mod ordering;
pub mod schema;
pub mod traits;

// Re-export commonly used types
pub use attributes::{Attributes, MultiGrade};
pub use config::CurriculumConfig;
pub use error::{codes, Error, ErrorKind, Result};
pub use hierarchy::{child_key, join_parent_key, ContentKeys, HierarchyResolver};
pub use models::*;
pub use schema::{
    curriculum_from_parents, filter_identifier, root_or_derived, HierarchySchema, LevelRule,
    SchemaRegistry,
};
pub use traits::*;
