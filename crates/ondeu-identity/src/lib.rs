//! # ondeu-identity
//!
//! Identity provider integration for ondeu.
//!
//! This crate provides:
//! - A Keycloak client that verifies access tokens against the realm JWKS,
//!   performs client-credential logins and looks up client roles
//! - Bearer token extraction and role checks used by the API middleware
//! - A background refresher that keeps service-account tokens fresh
//! - An in-memory provider for tests (feature `mock`)

pub mod access;
pub mod config;
pub mod keycloak;
pub mod refresher;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use access::{
    authorize, bearer_token, check_access, identity_from_claims, realm_roles, resource_roles,
    validate,
};
pub use config::KeycloakConfig;
pub use keycloak::KeycloakClient;
pub use refresher::{CredentialRefresher, RefresherConfig};

#[cfg(any(test, feature = "mock"))]
pub use mock::MockIdentityProvider;
