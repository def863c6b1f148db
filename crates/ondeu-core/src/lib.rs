//! # ondeu-core
//!
//! Core types, traits, and abstractions for the ondeu document service.
//!
//! This crate provides the data structures and trait definitions the
//! database, identity and API crates build on, plus the in-memory step that
//! attaches documents to a listed tree.

pub mod attach;
pub mod defaults;
pub mod error;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use attach::{attach_documents, tree_ids};
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
