//! HTTP handlers for ondeu-api.

pub mod document;
pub mod health;
pub mod info;
pub mod tree;
