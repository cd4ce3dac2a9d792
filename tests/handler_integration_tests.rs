use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use music_catalog::{
    AdmissionPipeline, AppState, InMemoryRepository,
    auth::{self, Identity},
    config::AppConfig,
    handlers,
    models::{
        ArtistRequest, CreateAlbumRequest, CredentialsRequest, NewAlbumSong, Role,
        UpdateAlbumRequest, UpdateRoleRequest,
    },
    repository::RepositoryState,
};
use std::sync::Arc;
use tokio::test;

// --- Test Setup ---

fn app_state() -> (AppState, Arc<InMemoryRepository>) {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState::new(repo.clone() as RepositoryState, AppConfig::default());
    (state, repo)
}

fn pipeline(state: &AppState) -> State<AdmissionPipeline> {
    State(AdmissionPipeline::new(state.repo.clone(), state.authorizer.clone()))
}

fn admin() -> Identity {
    Identity { user_id: 1, role: Role::Admin }
}

fn credentials(email: &str, password: &str) -> CredentialsRequest {
    CredentialsRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

// --- Session Handlers ---

#[test]
async fn test_register_user_creates_viewer_session() {
    let (state, _) = app_state();

    let Json(session) = handlers::register_user(
        State(state.clone()),
        Ok(Json(credentials("  New.User@Example.com ", "long-enough"))),
    )
    .await
    .unwrap();

    assert_eq!(session.user.email, "new.user@example.com");
    assert_eq!(session.user.role, Role::Viewer);

    let identity = auth::verify_token(&state.config.jwt_secret, &session.token).unwrap();
    assert_eq!(identity.user_id, session.user.id);
    assert_eq!(identity.role, Role::Viewer);
}

#[test]
async fn test_register_user_rejects_duplicate_email() {
    let (state, _) = app_state();
    handlers::register_user(State(state.clone()), Ok(Json(credentials("dup@example.com", "password-1"))))
        .await
        .unwrap();

    let err = handlers::register_user(
        State(state.clone()),
        Ok(Json(credentials("DUP@example.com", "password-2"))),
    )
    .await
    .unwrap_err();

    assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
}

#[test]
async fn test_register_user_validates_input() {
    let (state, repo) = app_state();

    let err = handlers::register_user(State(state), Ok(Json(credentials("no-at-sign", "short"))))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "validation_error");
    assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    assert_eq!(repo.access_count(), 0);
}

#[test]
async fn test_login_success_and_failures() {
    let (state, _) = app_state();
    let Json(registered) = handlers::register_user(
        State(state.clone()),
        Ok(Json(credentials("listener@example.com", "hunter2hunter2"))),
    )
    .await
    .unwrap();

    let Json(session) = handlers::login(
        State(state.clone()),
        Ok(Json(credentials("Listener@Example.com", "hunter2hunter2"))),
    )
    .await
    .unwrap();
    assert_eq!(session.user, registered.user);

    let wrong_password = handlers::login(
        State(state.clone()),
        Ok(Json(credentials("listener@example.com", "not-the-password"))),
    )
    .await
    .unwrap_err();
    assert_eq!(wrong_password.into_response().status(), StatusCode::UNAUTHORIZED);

    let unknown = handlers::login(
        State(state),
        Ok(Json(credentials("ghost@example.com", "hunter2hunter2"))),
    )
    .await
    .unwrap_err();
    assert_eq!(unknown.into_response().status(), StatusCode::UNAUTHORIZED);
}

#[test]
async fn test_get_me_echoes_identity() {
    let identity = Identity { user_id: 42, role: Role::Editor };

    let Json(me) = handlers::get_me(identity).await;

    assert_eq!(me.user_id, 42);
    assert_eq!(me.role, Role::Editor);
}

// --- Catalog Handlers ---

#[test]
async fn test_create_and_get_artist() {
    let (state, _) = app_state();

    let Json(created) = handlers::create_artist(
        admin(),
        pipeline(&state),
        Ok(Json(ArtistRequest { name: " Aphex Twin ".to_string() })),
    )
    .await
    .unwrap();
    assert_eq!(created.name, "Aphex Twin");

    let Json(fetched) = handlers::get_artist(admin(), pipeline(&state), Ok(Path(created.id)))
        .await
        .unwrap();
    assert_eq!(fetched, created);
}

#[test]
async fn test_viewer_create_is_forbidden_response() {
    let (state, repo) = app_state();
    let viewer = Identity { user_id: 9, role: Role::Viewer };

    let err = handlers::create_artist(
        viewer,
        pipeline(&state),
        Ok(Json(ArtistRequest { name: "Autechre".to_string() })),
    )
    .await
    .unwrap_err();

    assert_eq!(err.into_response().status(), StatusCode::FORBIDDEN);
    assert_eq!(repo.access_count(), 0);
}

#[test]
async fn test_album_lifecycle_through_handlers() {
    let (state, _) = app_state();
    let Json(artist) = handlers::create_artist(
        admin(),
        pipeline(&state),
        Ok(Json(ArtistRequest { name: "Kraftwerk".to_string() })),
    )
    .await
    .unwrap();

    let Json(album) = handlers::create_album(
        admin(),
        pipeline(&state),
        Ok(Json(CreateAlbumRequest {
            name: "Computer World".to_string(),
            artist_id: artist.id,
            songs: Some(vec![NewAlbumSong { name: "Numbers".to_string(), artist_id: artist.id }]),
        })),
    )
    .await
    .unwrap();
    assert_eq!(album.songs.len(), 1);

    let Json(renamed) = handlers::update_album(
        admin(),
        pipeline(&state),
        Ok(Path(album.id)),
        Ok(Json(UpdateAlbumRequest { new_name: Some("Computerwelt".to_string()), songs: None })),
    )
    .await
    .unwrap();
    assert_eq!(renamed.name, "Computerwelt");
    assert_eq!(renamed.songs, album.songs);

    let Json(removed) = handlers::delete_album(admin(), pipeline(&state), Ok(Path(album.id)))
        .await
        .unwrap();
    assert_eq!(removed.name, "Computerwelt");

    let Json(songs) = handlers::list_songs(admin(), pipeline(&state)).await.unwrap();
    assert!(songs.is_empty());
}

#[test]
async fn test_missing_album_is_not_found_response() {
    let (state, _) = app_state();

    let err = handlers::get_album(admin(), pipeline(&state), Ok(Path(12)))
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "album with id: 12 does not exist.");
    assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
}

#[test]
async fn test_update_user_role_handler() {
    let (state, _) = app_state();
    let Json(session) = handlers::register_user(
        State(state.clone()),
        Ok(Json(credentials("promote@example.com", "password-ok"))),
    )
    .await
    .unwrap();

    let Json(user) = handlers::update_user_role(
        admin(),
        pipeline(&state),
        Ok(Path(session.user.id)),
        Ok(Json(UpdateRoleRequest { role: Role::Editor })),
    )
    .await
    .unwrap();

    assert_eq!(user.role, Role::Editor);
}
