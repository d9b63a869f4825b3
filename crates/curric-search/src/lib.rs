//! # curric-search
//!
//! Clients for the external search/filter index that mirrors the tag tree.
//!
//! - [`HttpSearchIndex`] talks to the index's JSON RPC endpoints
//! - [`MemorySearchIndex`] keeps documents in process and records every call,
//!   with per-tag fault injection for sync-engine tests

pub mod http;
pub mod memory;

pub use http::{HttpSearchIndex, IndexOp};
pub use memory::{IndexCall, MemorySearchIndex};
