use crate::{
    AppState,
    auth::{self, Identity},
    error::{ApiError, ErrorBody},
    models::{
        Album, Artist, ArtistRequest, CreateAlbumRequest, CreatePlaylistRequest,
        CreateSongRequest, CredentialsRequest, IdentityResponse, NewUser, Playlist, Role,
        SessionResponse, Song, UpdateAlbumRequest, UpdatePlaylistRequest, UpdateRoleRequest,
        UpdateSongRequest, User,
    },
    pipeline::AdmissionPipeline,
    validation::ResourceValidator,
};
use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};

// Rejections are kept so they reach the caller in the `ApiError` body shape.
type Body<T> = Result<Json<T>, JsonRejection>;
type Id = Result<Path<i64>, PathRejection>;

// --- Session Handlers ---

/// register_user
///
/// [Public Route] Creates an account with the `viewer` role and opens a session for it.
#[utoipa::path(
    post,
    path = "/register",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Registered", body = SessionResponse),
        (status = 400, description = "Invalid email or password", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    payload: Body<CredentialsRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Json(payload) = payload?;
    let credentials = ResourceValidator::new(state.repo.clone())
        .registration(payload)
        .await?;

    let password_hash = auth::hash_password(&credentials.password)?;
    let user = state
        .repo
        .insert_user(NewUser {
            email: credentials.email,
            password_hash,
            role: Role::Viewer,
        })
        .await?;

    tracing::info!(user_id = user.id, "user registered");
    let token = auth::issue_token(&state.config, &user)?;
    Ok(Json(SessionResponse { token, user }))
}

/// login
///
/// [Public Route] Exchanges an email and password for a bearer token.
/// Unknown emails and wrong passwords are indistinguishable to the caller.
#[utoipa::path(
    post,
    path = "/login",
    request_body = CredentialsRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Bad credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Body<CredentialsRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let Json(payload) = payload?;
    let email = payload.email.trim().to_lowercase();

    let Some(credentials) = state.repo.find_user_by_email(&email).await? else {
        tracing::warn!("login attempt for unknown email");
        return Err(ApiError::Unauthenticated);
    };
    if !auth::verify_password(&payload.password, &credentials.password_hash) {
        tracing::warn!(user_id = credentials.user.id, "login with wrong password");
        return Err(ApiError::Unauthenticated);
    }

    let token = auth::issue_token(&state.config, &credentials.user)?;
    Ok(Json(SessionResponse {
        token,
        user: credentials.user,
    }))
}

/// get_me
///
/// [Authenticated Route] Echoes the identity carried by the caller's token.
#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Caller identity", body = IdentityResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    )
)]
pub async fn get_me(identity: Identity) -> Json<IdentityResponse> {
    Json(IdentityResponse {
        user_id: identity.user_id,
        role: identity.role,
    })
}

// --- Artist Handlers ---

#[utoipa::path(
    post,
    path = "/api/artist",
    request_body = ArtistRequest,
    responses(
        (status = 200, description = "Artist created", body = Artist),
        (status = 409, description = "Artist name taken", body = ErrorBody)
    )
)]
pub async fn create_artist(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    payload: Body<ArtistRequest>,
) -> Result<Json<Artist>, ApiError> {
    let Json(payload) = payload?;
    pipeline.create_artist(&identity, payload).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/artists",
    responses((status = 200, description = "All artists", body = [Artist]))
)]
pub async fn list_artists(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
) -> Result<Json<Vec<Artist>>, ApiError> {
    pipeline.list_artists(&identity).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/artist/{id}",
    params(("id" = i64, Path, description = "Artist id")),
    responses(
        (status = 200, description = "Artist", body = Artist),
        (status = 404, description = "Unknown artist", body = ErrorBody)
    )
)]
pub async fn get_artist(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<Artist>, ApiError> {
    let Path(id) = id?;
    pipeline.get_artist(&identity, id).await.map(Json)
}

#[utoipa::path(
    put,
    path = "/api/artist/{id}",
    params(("id" = i64, Path, description = "Artist id")),
    request_body = ArtistRequest,
    responses((status = 200, description = "Artist renamed", body = Artist))
)]
pub async fn update_artist(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
    payload: Body<ArtistRequest>,
) -> Result<Json<Artist>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    pipeline.update_artist(&identity, id, payload).await.map(Json)
}

/// delete_artist
///
/// [Authenticated Route] Removes an artist with all of its albums and songs.
#[utoipa::path(
    delete,
    path = "/api/artist/{id}",
    params(("id" = i64, Path, description = "Artist id")),
    responses(
        (status = 200, description = "Removed artist", body = Artist),
        (status = 403, description = "Role lacks delete", body = ErrorBody)
    )
)]
pub async fn delete_artist(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<Artist>, ApiError> {
    let Path(id) = id?;
    pipeline.delete_artist(&identity, id).await.map(Json)
}

// --- Album Handlers ---

/// create_album
///
/// [Authenticated Route] Creates an album, optionally with inline songs. Either the album and
/// every song are stored, or nothing is.
#[utoipa::path(
    post,
    path = "/api/album",
    request_body = CreateAlbumRequest,
    responses(
        (status = 200, description = "Album created", body = Album),
        (status = 400, description = "Invalid payload or song/artist mismatch", body = ErrorBody),
        (status = 404, description = "Unknown artist", body = ErrorBody),
        (status = 409, description = "Album already exists for artist", body = ErrorBody)
    )
)]
pub async fn create_album(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    payload: Body<CreateAlbumRequest>,
) -> Result<Json<Album>, ApiError> {
    let Json(payload) = payload?;
    pipeline.create_album(&identity, payload).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/albums",
    responses((status = 200, description = "All albums with their songs", body = [Album]))
)]
pub async fn list_albums(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
) -> Result<Json<Vec<Album>>, ApiError> {
    pipeline.list_albums(&identity).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/album/{id}",
    params(("id" = i64, Path, description = "Album id")),
    responses(
        (status = 200, description = "Album", body = Album),
        (status = 404, description = "Unknown album", body = ErrorBody)
    )
)]
pub async fn get_album(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<Album>, ApiError> {
    let Path(id) = id?;
    pipeline.get_album(&identity, id).await.map(Json)
}

/// update_album
///
/// [Authenticated Route] Renames an album and/or replaces its song membership.
#[utoipa::path(
    put,
    path = "/api/album/{id}",
    params(("id" = i64, Path, description = "Album id")),
    request_body = UpdateAlbumRequest,
    responses(
        (status = 200, description = "Album updated", body = Album),
        (status = 409, description = "Name used by another album of the artist", body = ErrorBody)
    )
)]
pub async fn update_album(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
    payload: Body<UpdateAlbumRequest>,
) -> Result<Json<Album>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    pipeline.update_album(&identity, id, payload).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/album/{id}",
    params(("id" = i64, Path, description = "Album id")),
    responses(
        (status = 200, description = "Removed album, with the songs removed alongside it", body = Album),
        (status = 403, description = "Role lacks delete", body = ErrorBody)
    )
)]
pub async fn delete_album(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<Album>, ApiError> {
    let Path(id) = id?;
    pipeline.delete_album(&identity, id).await.map(Json)
}

// --- Song Handlers ---

#[utoipa::path(
    post,
    path = "/api/song",
    request_body = CreateSongRequest,
    responses(
        (status = 200, description = "Song created", body = Song),
        (status = 400, description = "Album belongs to another artist", body = ErrorBody)
    )
)]
pub async fn create_song(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    payload: Body<CreateSongRequest>,
) -> Result<Json<Song>, ApiError> {
    let Json(payload) = payload?;
    pipeline.create_song(&identity, payload).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/songs",
    responses((status = 200, description = "All songs", body = [Song]))
)]
pub async fn list_songs(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
) -> Result<Json<Vec<Song>>, ApiError> {
    pipeline.list_songs(&identity).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/song/{id}",
    params(("id" = i64, Path, description = "Song id")),
    responses(
        (status = 200, description = "Song", body = Song),
        (status = 404, description = "Unknown song", body = ErrorBody)
    )
)]
pub async fn get_song(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<Song>, ApiError> {
    let Path(id) = id?;
    pipeline.get_song(&identity, id).await.map(Json)
}

#[utoipa::path(
    put,
    path = "/api/song/{id}",
    params(("id" = i64, Path, description = "Song id")),
    request_body = UpdateSongRequest,
    responses((status = 200, description = "Song updated", body = Song))
)]
pub async fn update_song(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
    payload: Body<UpdateSongRequest>,
) -> Result<Json<Song>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    pipeline.update_song(&identity, id, payload).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/song/{id}",
    params(("id" = i64, Path, description = "Song id")),
    responses((status = 200, description = "Removed song", body = Song))
)]
pub async fn delete_song(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<Song>, ApiError> {
    let Path(id) = id?;
    pipeline.delete_song(&identity, id).await.map(Json)
}

// --- Playlist Handlers ---

/// create_playlist
///
/// [Authenticated Route] Creates a playlist owned by the caller.
#[utoipa::path(
    post,
    path = "/api/playlist",
    request_body = CreatePlaylistRequest,
    responses(
        (status = 200, description = "Playlist created", body = Playlist),
        (status = 409, description = "Caller already has a playlist with this name", body = ErrorBody)
    )
)]
pub async fn create_playlist(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    payload: Body<CreatePlaylistRequest>,
) -> Result<Json<Playlist>, ApiError> {
    let Json(payload) = payload?;
    pipeline.create_playlist(&identity, payload).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/playlists",
    responses((status = 200, description = "All playlists", body = [Playlist]))
)]
pub async fn list_playlists(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
) -> Result<Json<Vec<Playlist>>, ApiError> {
    pipeline.list_playlists(&identity).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/playlist/{id}",
    params(("id" = i64, Path, description = "Playlist id")),
    responses(
        (status = 200, description = "Playlist", body = Playlist),
        (status = 404, description = "Unknown playlist", body = ErrorBody)
    )
)]
pub async fn get_playlist(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<Playlist>, ApiError> {
    let Path(id) = id?;
    pipeline.get_playlist(&identity, id).await.map(Json)
}

/// update_playlist
///
/// [Authenticated Route] Owner or admin only.
#[utoipa::path(
    put,
    path = "/api/playlist/{id}",
    params(("id" = i64, Path, description = "Playlist id")),
    request_body = UpdatePlaylistRequest,
    responses(
        (status = 200, description = "Playlist updated", body = Playlist),
        (status = 403, description = "Caller does not own the playlist", body = ErrorBody)
    )
)]
pub async fn update_playlist(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
    payload: Body<UpdatePlaylistRequest>,
) -> Result<Json<Playlist>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    pipeline.update_playlist(&identity, id, payload).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/playlist/{id}",
    params(("id" = i64, Path, description = "Playlist id")),
    responses(
        (status = 200, description = "Removed playlist", body = Playlist),
        (status = 403, description = "Caller may not delete this playlist", body = ErrorBody)
    )
)]
pub async fn delete_playlist(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<Playlist>, ApiError> {
    let Path(id) = id?;
    pipeline.delete_playlist(&identity, id).await.map(Json)
}

// --- User Administration Handlers ---

/// list_users
///
/// [Admin Route] Every other role receives 403.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "All users", body = [User]),
        (status = 403, description = "Caller is not an admin", body = ErrorBody)
    )
)]
pub async fn list_users(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
) -> Result<Json<Vec<User>>, ApiError> {
    pipeline.list_users(&identity).await.map(Json)
}

#[utoipa::path(
    get,
    path = "/api/user/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses((status = 200, description = "User", body = User))
)]
pub async fn get_user(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<User>, ApiError> {
    let Path(id) = id?;
    pipeline.get_user(&identity, id).await.map(Json)
}

/// update_user_role
///
/// [Admin Route] Takes effect for tokens issued after the change.
#[utoipa::path(
    put,
    path = "/api/user/{id}/role",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateRoleRequest,
    responses((status = 200, description = "Role changed", body = User))
)]
pub async fn update_user_role(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
    payload: Body<UpdateRoleRequest>,
) -> Result<Json<User>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    pipeline.set_user_role(&identity, id, payload.role).await.map(Json)
}

#[utoipa::path(
    delete,
    path = "/api/user/{id}",
    params(("id" = i64, Path, description = "User id")),
    responses((status = 200, description = "Removed user and their playlists", body = User))
)]
pub async fn delete_user(
    identity: Identity,
    State(pipeline): State<AdmissionPipeline>,
    id: Id,
) -> Result<Json<User>, ApiError> {
    let Path(id) = id?;
    pipeline.delete_user(&identity, id).await.map(Json)
}
