use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::fmt;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Roles & Resource Kinds ---

/// Role
///
/// The RBAC tag carried by every user and every verified token.
/// Stored as lowercase text (`admin`, `editor`, `viewer`) in the `users.role` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Editor,
    #[default]
    Viewer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "editor" => Some(Role::Editor),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ResourceKind
///
/// The five record kinds managed by the catalog. Each kind knows its backing table and
/// the child kinds it owns, which drives the generic cascade in the mutation executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Song,
    Artist,
    Album,
    Playlist,
    User,
}

/// OwnedChild
///
/// A declared ownership edge: rows of `kind` whose `foreign_key` column points at the parent
/// are removed together with the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnedChild {
    pub kind: ResourceKind,
    pub foreign_key: &'static str,
}

const ARTIST_CHILDREN: &[OwnedChild] = &[
    OwnedChild { kind: ResourceKind::Album, foreign_key: "artist_id" },
    OwnedChild { kind: ResourceKind::Song, foreign_key: "artist_id" },
];
const ALBUM_CHILDREN: &[OwnedChild] = &[OwnedChild { kind: ResourceKind::Song, foreign_key: "album_id" }];
const USER_CHILDREN: &[OwnedChild] = &[OwnedChild { kind: ResourceKind::Playlist, foreign_key: "user_id" }];

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Song => "song",
            ResourceKind::Artist => "artist",
            ResourceKind::Album => "album",
            ResourceKind::Playlist => "playlist",
            ResourceKind::User => "user",
        }
    }

    /// Name of the SQL table holding rows of this kind.
    pub fn table(self) -> &'static str {
        match self {
            ResourceKind::Song => "songs",
            ResourceKind::Artist => "artists",
            ResourceKind::Album => "albums",
            ResourceKind::Playlist => "playlists",
            ResourceKind::User => "users",
        }
    }

    pub fn owned_children(self) -> &'static [OwnedChild] {
        match self {
            ResourceKind::Artist => ARTIST_CHILDREN,
            ResourceKind::Album => ALBUM_CHILDREN,
            ResourceKind::User => USER_CHILDREN,
            ResourceKind::Song | ResourceKind::Playlist => &[],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ResourceRef
///
/// A (kind, primary key) pair. Lives only for the duration of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub id: i64,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: i64) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

// --- Catalog Records (Mapped to Database) ---

/// User
///
/// Public view of a row in the `users` table. The password hash never leaves the repository
/// except through `UserCredentials` during login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// UserCredentials
///
/// Internal pairing of a user with the stored argon2 hash, returned only by the email lookup.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Artist {
    pub id: i64,
    pub name: String,
}

/// Song
///
/// A row from `songs`. `artist_id` is mandatory; `album_id` is set while the song is part of an album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Song {
    pub id: i64,
    pub name: String,
    pub artist_id: i64,
    pub album_id: Option<i64>,
}

/// Album
///
/// A row from `albums` together with its songs (loaded by a second query).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub artist_id: i64,
    #[sqlx(skip)]
    pub songs: Vec<Song>,
}

/// Playlist
///
/// A user-owned, ordered list of songs (many-to-many through `playlist_songs`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Playlist {
    pub id: i64,
    pub name: String,
    pub user_id: i64,
    #[sqlx(skip)]
    pub songs: Vec<Song>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ArtistRequest {
    pub name: String,
}

/// NewAlbumSong
///
/// A song declared inline in an album creation payload. Its `artist_id` must equal the album's.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct NewAlbumSong {
    pub name: String,
    pub artist_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateAlbumRequest {
    pub name: String,
    pub artist_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub songs: Option<Vec<NewAlbumSong>>,
}

/// UpdateAlbumRequest
///
/// Partial update. `songs`, when present, replaces the album's song membership with the given ids.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateAlbumRequest {
    #[serde(default, alias = "newAlbumName", skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub songs: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateSongRequest {
    pub name: String,
    pub artist_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateSongRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist_id: Option<i64>,
    /// Absent keeps the album, `null` takes the song out of its album.
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    #[ts(optional)]
    #[schema(value_type = Option<i64>)]
    pub album_id: Option<Option<i64>>,
}

/// Maps a present field to `Some`, so an explicit `null` reads as `Some(None)`.
/// Absent fields never reach this and fall back to `None` through `default`.
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreatePlaylistRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub songs: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdatePlaylistRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub songs: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

// --- Responses (Output Schemas) ---

/// SessionResponse
///
/// Returned by register and login: the bearer token plus the user it identifies.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionResponse {
    pub token: String,
    pub user: User,
}

/// IdentityResponse
///
/// Output of `GET /me`: what the verified token says about the caller.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct IdentityResponse {
    pub user_id: i64,
    pub role: Role,
}

// --- Store Inputs (validated, ready to persist) ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct NewSong {
    pub name: String,
    pub artist_id: i64,
    pub album_id: Option<i64>,
}

/// NewAlbum
///
/// An album insert with its nested songs; the store writes all of them or none.
#[derive(Debug, Clone)]
pub struct NewAlbum {
    pub name: String,
    pub artist_id: i64,
    pub songs: Vec<String>,
}

/// AlbumChanges
///
/// Resolved album update. `songs: Some` replaces membership; songs not listed are detached.
#[derive(Debug, Clone, Default)]
pub struct AlbumChanges {
    pub name: Option<String>,
    pub songs: Option<Vec<i64>>,
}

/// SongChanges
///
/// `album_id: Some(None)` detaches the song from its album.
#[derive(Debug, Clone, Default)]
pub struct SongChanges {
    pub name: Option<String>,
    pub artist_id: Option<i64>,
    pub album_id: Option<Option<i64>>,
}

#[derive(Debug, Clone)]
pub struct NewPlaylist {
    pub name: String,
    pub user_id: i64,
    pub songs: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct PlaylistChanges {
    pub name: Option<String>,
    pub songs: Option<Vec<i64>>,
}
