//! # ondeu-api
//!
//! HTTP surface of the ondeu document service: tree and document CRUD,
//! share links, document filtering and realm role lookup, all behind
//! Keycloak bearer-token authorization.
//!
//! The binary in `main.rs` wires PostgreSQL, S3 and Keycloak into an
//! [`AppState`]; tests build the same router over in-memory backends.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod services;

use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use ondeu_core::{DocumentRepository, IdentityProvider, ObjectStorage, TreeRepository};
use ondeu_identity::CredentialRefresher;

pub use config::ServerConfig;
pub use error::ApiError;
use handlers::{document, health, info, tree};
pub use services::{AdminCredentials, DocumentService, InfoService, TreeService};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
#[derive(Clone, Default)]
pub struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// STATE
// =============================================================================

/// Everything the server needs from the outside world.
pub struct Backends {
    pub trees: Arc<dyn TreeRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub identity: Arc<dyn IdentityProvider>,
    pub refresher: Option<Arc<CredentialRefresher>>,
    pub admin: AdminCredentials,
    /// Client whose roles gate every protected route.
    pub application_client_id: String,
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub trees: TreeService,
    pub documents: DocumentService,
    pub info: InfoService,
    pub identity: Arc<dyn IdentityProvider>,
    pub application_client_id: String,
}

impl AppState {
    pub fn new(backends: Backends) -> Self {
        Self {
            trees: TreeService::new(backends.trees, backends.documents.clone()),
            documents: DocumentService::new(backends.documents, backends.storage),
            info: InfoService::new(
                backends.identity.clone(),
                backends.refresher,
                backends.admin,
            ),
            identity: backends.identity,
            application_client_id: backends.application_client_id,
        }
    }
}

// =============================================================================
// ROUTER
// =============================================================================

/// Build the full router with middleware.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let protected = Router::new()
        // Trees
        .route("/api/v1/tree", axum::routing::post(tree::create_tree))
        .route(
            "/api/v1/tree/:tree_id",
            get(tree::get_tree)
                .put(tree::update_tree)
                .delete(tree::delete_tree),
        )
        .route("/api/v1/tree/:tree_id/list", get(tree::list_tree))
        // Documents
        .route(
            "/api/v1/tree/:tree_id/document",
            axum::routing::post(document::create_document),
        )
        .route(
            "/api/v1/tree/:tree_id/document/filter",
            get(document::filter_documents),
        )
        .route(
            "/api/v1/tree/:tree_id/document/:doc_id",
            get(document::get_document)
                .put(document::update_document)
                .delete(document::delete_document),
        )
        .route(
            "/api/v1/tree/:tree_id/document/:doc_id/share",
            get(document::share_document),
        )
        // Realm information
        .route("/api/v1/info/roles", get(info::get_roles))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::authorize,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(protected)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(config.allowed_origins.clone()))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .max_age(std::time::Duration::from_secs(3600)),
        )
        .layer(axum::extract::DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_upload_bytes))
        .with_state(state)
}
