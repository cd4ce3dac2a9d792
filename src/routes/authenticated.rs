use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// The catalog itself: songs, artists, albums and playlists. Every handler takes an
/// `Identity` and hands it to the admission pipeline, which decides read/write/delete
/// per role before looking anything up.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The identity carried by the caller's token.
        .route("/me", get(handlers::get_me))
        // --- Songs ---
        .route("/api/song", post(handlers::create_song))
        .route("/api/songs", get(handlers::list_songs))
        .route(
            "/api/song/{id}",
            get(handlers::get_song)
                .put(handlers::update_song)
                .delete(handlers::delete_song),
        )
        // --- Artists ---
        // Deleting an artist also removes its albums and songs.
        .route("/api/artist", post(handlers::create_artist))
        .route("/api/artists", get(handlers::list_artists))
        .route(
            "/api/artist/{id}",
            get(handlers::get_artist)
                .put(handlers::update_artist)
                .delete(handlers::delete_artist),
        )
        // --- Albums ---
        // POST accepts nested songs; PUT replaces membership without deleting songs.
        .route("/api/album", post(handlers::create_album))
        .route("/api/albums", get(handlers::list_albums))
        .route(
            "/api/album/{id}",
            get(handlers::get_album)
                .put(handlers::update_album)
                .delete(handlers::delete_album),
        )
        // --- Playlists ---
        // Updates and deletes are limited to the owner (or an admin).
        .route("/api/playlist", post(handlers::create_playlist))
        .route("/api/playlists", get(handlers::list_playlists))
        .route(
            "/api/playlist/{id}",
            get(handlers::get_playlist)
                .put(handlers::update_playlist)
                .delete(handlers::delete_playlist),
        )
}
