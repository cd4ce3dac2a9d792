use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, put},
};

/// Admin Router Module
///
/// User administration. Mounted behind the same authentication layer as the catalog;
/// the pipeline rejects non-admin identities with 403 before any user row is read.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/users
        .route("/api/users", get(handlers::list_users))
        // GET/DELETE /api/user/{id}
        // Deleting a user also removes the playlists they own.
        .route(
            "/api/user/{id}",
            get(handlers::get_user).delete(handlers::delete_user),
        )
        // PUT /api/user/{id}/role
        .route("/api/user/{id}/role", put(handlers::update_user_role))
}
