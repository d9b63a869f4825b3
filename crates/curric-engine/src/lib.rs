//! # curric-engine
//!
//! Keeps the relational store, the search index, and the cache consistent
//! while serving curriculum tag operations.
//!
//! This crate provides:
//! - [`CurriculumEngine`], the entry point for every sync and query operation
//! - Cache-aside reads over Redis or an in-process LRU ([`cache`], [`reads`])
//! - Index compensation for writes whose relational commit failed
//! - A batch executor with fail-fast and partial-success policies
//! - Legacy id bridges and the index resync pass
//!
//! ## Example
//!
//! ```rust,ignore
//! use curric_engine::{CreateTag, CurriculumEngine};
//!
//! let engine = CurriculumEngine::connect(CurriculumConfig::load()?).await?;
//! let chapter = engine
//!     .create_tag(CreateTag::new(TagType::Chapter, "Fractions", TagGroup::Content, CurriculumType::K12)
//!         .under(vec![country, board, grade, subject]))
//!     .await?;
//! ```

pub mod batch;
pub mod cache;
pub mod compensation;
pub mod engine;
mod legacy;
mod queries;
pub mod reads;
pub mod requests;
pub mod resync;
mod sync;

pub use batch::{fail_fast, isolated, partial_success};
pub use cache::{DisabledCache, MemoryCache, RedisCache};
pub use compensation::{RecordingCompensator, SpawnedCompensator};
pub use engine::CurriculumEngine;
pub use reads::CachedReads;
pub use requests::*;
pub use resync::ResyncReport;
