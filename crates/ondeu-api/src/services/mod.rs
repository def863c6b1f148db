//! Service layer for business logic.

pub mod document_service;
pub mod info_service;
pub mod tree_service;

pub use document_service::DocumentService;
pub use info_service::{AdminCredentials, InfoService};
pub use tree_service::TreeService;
