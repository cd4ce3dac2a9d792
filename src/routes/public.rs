use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints that accept anonymous callers. Registration and login are the only way to
/// obtain a bearer token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers. Never touches the store.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Creates a `viewer` account and returns a session for it.
        .route("/register", post(handlers::register_user))
        // POST /login
        // Exchanges email and password for a bearer token.
        .route("/login", post(handlers::login))
}
