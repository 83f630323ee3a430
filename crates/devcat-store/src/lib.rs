//! devcat Store - Persistence, queries, and re-derivation of the criteria index
//!
//! This crate connects the pure derivations of `devcat-core` to a document store:
//! - A generic document-store capability and an in-memory implementation
//! - Repositories for criteria rows and aspect closure nodes
//! - The criteria query engine (semantic filters, aspect expansion)
//! - Reference-use checks for taxonomy deletes
//! - The catalog service serializing re-derivations per key

pub mod aspect;
pub mod catalog;
pub mod criteria;
pub mod index;
pub mod locks;
pub mod memory;
pub mod query;
pub mod store;
pub mod usage;

pub use aspect::AspectRepository;
pub use catalog::Catalog;
pub use criteria::{CriteriaField, CriteriaRepository};
pub use index::{CollectionNames, IndexConfig};
pub use locks::KeyedLocks;
pub use memory::MemoryStore;
pub use query::QueryEngine;
pub use store::{DocumentStore, Filter, Predicate, StoreError};
pub use usage::{ReferenceChecker, Usage, UsageLocation};
