use axum::{
    extract::{FromRef, Request},
    http::HeaderName,
    Router,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Admission path, leaf-first.
pub mod auth;
pub mod authz;
pub mod validation;
pub mod pipeline;

// Shared types and services.
pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod repository;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::Identity;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// State types assembled by main.rs and the integration tests.

pub use authz::{Authorizer, AuthorizerState, RolePolicy};
pub use config::AppConfig;
pub use error::ApiError;
pub use memory::InMemoryRepository;
pub use pipeline::AdmissionPipeline;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI description of the catalog, assembled from the `#[utoipa::path]` handler
/// annotations and the `ToSchema` models. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::get_me,
        handlers::create_artist, handlers::list_artists, handlers::get_artist,
        handlers::update_artist, handlers::delete_artist,
        handlers::create_album, handlers::list_albums, handlers::get_album,
        handlers::update_album, handlers::delete_album,
        handlers::create_song, handlers::list_songs, handlers::get_song,
        handlers::update_song, handlers::delete_song,
        handlers::create_playlist, handlers::list_playlists, handlers::get_playlist,
        handlers::update_playlist, handlers::delete_playlist,
        handlers::list_users, handlers::get_user, handlers::update_user_role,
        handlers::delete_user
    ),
    components(
        schemas(
            models::Role, models::User, models::Artist, models::Album, models::Song,
            models::Playlist, models::CredentialsRequest, models::ArtistRequest,
            models::NewAlbumSong, models::CreateAlbumRequest, models::UpdateAlbumRequest,
            models::CreateSongRequest, models::UpdateSongRequest, models::CreatePlaylistRequest,
            models::UpdatePlaylistRequest, models::UpdateRoleRequest, models::SessionResponse,
            models::IdentityResponse, error::ErrorBody, error::FieldErrors,
        )
    ),
    tags(
        (name = "music-catalog", description = "Music catalog API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared, immutable container for everything a request needs. Cloned per request;
/// all members are cheap handles.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in deployments, the in-memory store locally and in tests.
    pub repo: RepositoryState,
    /// Role policy consulted by the pipeline's authorization stage.
    pub authorizer: AuthorizerState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// State with the default role policy.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        Self {
            repo,
            authorizer: Arc::new(RolePolicy),
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Handlers pull only the piece of state they need. Catalog handlers receive a ready
// `AdmissionPipeline` instead of the raw repository.

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for AdmissionPipeline {
    fn from_ref(app_state: &AppState) -> AdmissionPipeline {
        AdmissionPipeline::new(app_state.repo.clone(), app_state.authorizer.clone())
    }
}

/// auth_middleware
///
/// Rejects requests without a valid bearer token with 401 before routing reaches a
/// handler. Token verification is pure, so a rejected request never touches the store.
async fn auth_middleware(_identity: Identity, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, the authentication layer and the observability stack.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name used to correlate every log line of one request.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Protected Routes
    // Catalog and admin routes share one authentication layer. Role checks happen later,
    // inside the admission pipeline, once the identity is known.
    let protected = authenticated::authenticated_routes()
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // 3. Base Router Assembly
    let base_router = Router::new()
        // Documentation: the generated Swagger UI and OpenAPI document.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: health, register and login. No token required.
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    // 4. Observability and Correlation Layers (outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation: a fresh UUID per incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing: one `http_request` span around the whole exchange,
                // tagged with the generated request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation: echoes x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 5. CORS Layer (applied last)
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the `http_request` span for `TraceLayer`, tagged with method, uri and the
/// `x-request-id` so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    // Structured fields picked up by every event inside the span.
    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
