use crate::error::ApiError;
use crate::models::{
    Album, AlbumChanges, Artist, NewAlbum, NewPlaylist, NewSong, NewUser, OwnedChild, Playlist,
    PlaylistChanges, ResourceRef, Role, Song, SongChanges, User, UserCredentials,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor, PgPool};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// StoreError
///
/// Failures reported by a persistence backend. Constraint violations are kept apart because
/// the pipeline reports them as `Conflict`: two racing creates of the same album, or a row
/// whose referenced parent was removed between validation and the write.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    #[error("foreign key violated: {0}")]
    ForeignKeyViolation(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StoreError::ForeignKeyViolation(db.message().to_string())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(detail) => {
                tracing::warn!("storage reported conflict: {}", detail);
                ApiError::Conflict("resource already exists.".to_string())
            }
            StoreError::ForeignKeyViolation(detail) => {
                tracing::warn!("storage reported dangling reference: {}", detail);
                ApiError::Conflict("a referenced resource no longer exists.".to_string())
            }
            StoreError::Backend(detail) => {
                tracing::error!("storage error: {}", detail);
                ApiError::Persistence(detail)
            }
        }
    }
}

/// Repository Trait
///
/// The persistence store as seen by the admission pipeline: find-by-key, find-by-filter,
/// save and remove for each resource kind, plus the two generic operations the cascade
/// needs (`child_ids`, `remove_all`).
///
/// Every multi-row write (`insert_album`, `update_album`, `insert_playlist`,
/// `update_playlist`, `remove_all`) is atomic: it is applied completely or not at all.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn set_user_role(&self, id: i64, role: Role) -> Result<Option<User>, StoreError>;

    // --- Artists ---
    async fn find_artist(&self, id: i64) -> Result<Option<Artist>, StoreError>;
    async fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>, StoreError>;
    async fn list_artists(&self) -> Result<Vec<Artist>, StoreError>;
    async fn insert_artist(&self, name: String) -> Result<Artist, StoreError>;
    async fn rename_artist(&self, id: i64, name: String) -> Result<Option<Artist>, StoreError>;

    // --- Albums (always returned with their songs) ---
    async fn find_album(&self, id: i64) -> Result<Option<Album>, StoreError>;
    async fn find_album_by_name(&self, artist_id: i64, name: &str) -> Result<Option<Album>, StoreError>;
    async fn list_albums(&self) -> Result<Vec<Album>, StoreError>;
    async fn insert_album(&self, album: NewAlbum) -> Result<Album, StoreError>;
    async fn update_album(&self, id: i64, changes: AlbumChanges) -> Result<Option<Album>, StoreError>;

    // --- Songs ---
    async fn find_song(&self, id: i64) -> Result<Option<Song>, StoreError>;
    // Returns the songs that exist among `ids`, in no particular order.
    async fn find_songs(&self, ids: &[i64]) -> Result<Vec<Song>, StoreError>;
    async fn list_songs(&self) -> Result<Vec<Song>, StoreError>;
    async fn insert_song(&self, song: NewSong) -> Result<Song, StoreError>;
    async fn update_song(&self, id: i64, changes: SongChanges) -> Result<Option<Song>, StoreError>;

    // --- Playlists (always returned with their songs, in playlist order) ---
    async fn find_playlist(&self, id: i64) -> Result<Option<Playlist>, StoreError>;
    async fn find_playlist_by_name(&self, user_id: i64, name: &str) -> Result<Option<Playlist>, StoreError>;
    async fn list_playlists(&self) -> Result<Vec<Playlist>, StoreError>;
    async fn insert_playlist(&self, playlist: NewPlaylist) -> Result<Playlist, StoreError>;
    async fn update_playlist(&self, id: i64, changes: PlaylistChanges) -> Result<Option<Playlist>, StoreError>;

    // --- Generic ---
    /// Ids of the rows of `child.kind` whose `child.foreign_key` equals `parent.id`.
    async fn child_ids(&self, parent: ResourceRef, child: OwnedChild) -> Result<Vec<i64>, StoreError>;
    /// Removes every referenced row, in the given order, in one transaction.
    async fn remove_all(&self, refs: &[ResourceRef]) -> Result<(), StoreError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

// --- Row Types ---

/// UserRow
///
/// Raw `users` row. `role` is text in SQL and is parsed into `Role` on the way out.
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    email: String,
    role: String,
    password_hash: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserCredentials {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::from_str(&row.role)
            .ok_or_else(|| StoreError::Backend(format!("unknown role {:?} for user {}", row.role, row.id)))?;
        Ok(UserCredentials {
            user: User {
                id: row.id,
                email: row.email,
                role,
                created_at: row.created_at,
            },
            password_hash: row.password_hash,
        })
    }
}

fn user_from_row(row: UserRow) -> Result<User, StoreError> {
    UserCredentials::try_from(row).map(|creds| creds.user)
}

#[derive(Debug, FromRow)]
struct PlaylistSongRow {
    playlist_id: i64,
    id: i64,
    name: String,
    artist_id: i64,
    album_id: Option<i64>,
}

const USER_COLUMNS: &str = "id, email, role, password_hash, created_at";
const SONG_COLUMNS: &str = "id, name, artist_id, album_id";

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. The schema lives in `migrations/`.
/// Queries are built at runtime (`query_as` + `FromRow`), so the crate compiles without a
/// live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn album_songs<'e, E: PgExecutor<'e>>(executor: E, album_id: i64) -> Result<Vec<Song>, StoreError> {
        let songs = sqlx::query_as::<_, Song>(&format!(
            "SELECT {SONG_COLUMNS} FROM songs WHERE album_id = $1 ORDER BY id"
        ))
        .bind(album_id)
        .fetch_all(executor)
        .await?;
        Ok(songs)
    }

    async fn playlist_songs<'e, E: PgExecutor<'e>>(executor: E, playlist_id: i64) -> Result<Vec<Song>, StoreError> {
        let songs = sqlx::query_as::<_, Song>(
            r#"
            SELECT s.id, s.name, s.artist_id, s.album_id
            FROM playlist_songs ps
            JOIN songs s ON s.id = ps.song_id
            WHERE ps.playlist_id = $1
            ORDER BY ps.position
            "#,
        )
        .bind(playlist_id)
        .fetch_all(executor)
        .await?;
        Ok(songs)
    }

    async fn with_album_songs(&self, album: Option<Album>) -> Result<Option<Album>, StoreError> {
        match album {
            Some(mut album) => {
                album.songs = Self::album_songs(&self.pool, album.id).await?;
                Ok(Some(album))
            }
            None => Ok(None),
        }
    }

    async fn with_playlist_songs(&self, playlist: Option<Playlist>) -> Result<Option<Playlist>, StoreError> {
        match playlist {
            Some(mut playlist) => {
                playlist.songs = Self::playlist_songs(&self.pool, playlist.id).await?;
                Ok(Some(playlist))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(user_from_row)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .map(UserCredentials::try_from)
        .transpose()
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(user_from_row)
            .collect()
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, password_hash, role) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await?;
        user_from_row(row)
    }

    async fn set_user_role(&self, id: i64, role: Role) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?
        .map(user_from_row)
        .transpose()
    }

    async fn find_artist(&self, id: i64) -> Result<Option<Artist>, StoreError> {
        let artist = sqlx::query_as::<_, Artist>("SELECT id, name FROM artists WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(artist)
    }

    async fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>, StoreError> {
        let artist = sqlx::query_as::<_, Artist>("SELECT id, name FROM artists WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(artist)
    }

    async fn list_artists(&self) -> Result<Vec<Artist>, StoreError> {
        let artists = sqlx::query_as::<_, Artist>("SELECT id, name FROM artists ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(artists)
    }

    async fn insert_artist(&self, name: String) -> Result<Artist, StoreError> {
        let artist = sqlx::query_as::<_, Artist>("INSERT INTO artists (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(artist)
    }

    async fn rename_artist(&self, id: i64, name: String) -> Result<Option<Artist>, StoreError> {
        let artist = sqlx::query_as::<_, Artist>("UPDATE artists SET name = $2 WHERE id = $1 RETURNING id, name")
            .bind(id)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(artist)
    }

    async fn find_album(&self, id: i64) -> Result<Option<Album>, StoreError> {
        let album = sqlx::query_as::<_, Album>("SELECT id, name, artist_id FROM albums WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        self.with_album_songs(album).await
    }

    async fn find_album_by_name(&self, artist_id: i64, name: &str) -> Result<Option<Album>, StoreError> {
        let album = sqlx::query_as::<_, Album>(
            "SELECT id, name, artist_id FROM albums WHERE artist_id = $1 AND name = $2",
        )
        .bind(artist_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        self.with_album_songs(album).await
    }

    async fn list_albums(&self) -> Result<Vec<Album>, StoreError> {
        let mut albums = sqlx::query_as::<_, Album>("SELECT id, name, artist_id FROM albums ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let songs = sqlx::query_as::<_, Song>(&format!(
            "SELECT {SONG_COLUMNS} FROM songs WHERE album_id IS NOT NULL ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut by_album: HashMap<i64, Vec<Song>> = HashMap::new();
        for song in songs {
            if let Some(album_id) = song.album_id {
                by_album.entry(album_id).or_default().push(song);
            }
        }
        for album in &mut albums {
            album.songs = by_album.remove(&album.id).unwrap_or_default();
        }
        Ok(albums)
    }

    /// insert_album
    ///
    /// Inserts the album and its nested songs in one transaction.
    async fn insert_album(&self, album: NewAlbum) -> Result<Album, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut inserted = sqlx::query_as::<_, Album>(
            "INSERT INTO albums (name, artist_id) VALUES ($1, $2) RETURNING id, name, artist_id",
        )
        .bind(&album.name)
        .bind(album.artist_id)
        .fetch_one(&mut *tx)
        .await?;

        for song_name in album.songs {
            let song = sqlx::query_as::<_, Song>(&format!(
                "INSERT INTO songs (name, artist_id, album_id) VALUES ($1, $2, $3) RETURNING {SONG_COLUMNS}"
            ))
            .bind(song_name)
            .bind(album.artist_id)
            .bind(inserted.id)
            .fetch_one(&mut *tx)
            .await?;
            inserted.songs.push(song);
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// update_album
    ///
    /// Renames and/or replaces song membership in one transaction. Songs dropped from the
    /// membership list keep existing with `album_id = NULL`.
    async fn update_album(&self, id: i64, changes: AlbumChanges) -> Result<Option<Album>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let album = match changes.name {
            Some(name) => {
                sqlx::query_as::<_, Album>(
                    "UPDATE albums SET name = $2 WHERE id = $1 RETURNING id, name, artist_id",
                )
                .bind(id)
                .bind(name)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, Album>("SELECT id, name, artist_id FROM albums WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await?
            }
        };
        let Some(mut album) = album else {
            return Ok(None);
        };

        if let Some(song_ids) = changes.songs {
            sqlx::query("UPDATE songs SET album_id = NULL WHERE album_id = $1 AND NOT (id = ANY($2))")
                .bind(id)
                .bind(&song_ids)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE songs SET album_id = $1 WHERE id = ANY($2)")
                .bind(id)
                .bind(&song_ids)
                .execute(&mut *tx)
                .await?;
        }

        album.songs = Self::album_songs(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(Some(album))
    }

    async fn find_song(&self, id: i64) -> Result<Option<Song>, StoreError> {
        let song = sqlx::query_as::<_, Song>(&format!("SELECT {SONG_COLUMNS} FROM songs WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(song)
    }

    async fn find_songs(&self, ids: &[i64]) -> Result<Vec<Song>, StoreError> {
        let songs = sqlx::query_as::<_, Song>(&format!(
            "SELECT {SONG_COLUMNS} FROM songs WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(songs)
    }

    async fn list_songs(&self) -> Result<Vec<Song>, StoreError> {
        let songs = sqlx::query_as::<_, Song>(&format!("SELECT {SONG_COLUMNS} FROM songs ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        Ok(songs)
    }

    async fn insert_song(&self, song: NewSong) -> Result<Song, StoreError> {
        let inserted = sqlx::query_as::<_, Song>(&format!(
            "INSERT INTO songs (name, artist_id, album_id) VALUES ($1, $2, $3) RETURNING {SONG_COLUMNS}"
        ))
        .bind(song.name)
        .bind(song.artist_id)
        .bind(song.album_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(inserted)
    }

    /// update_song
    ///
    /// Uses `COALESCE` so that only the provided fields are written. `album_id` can be set to
    /// NULL, so it is guarded by an explicit flag instead.
    async fn update_song(&self, id: i64, changes: SongChanges) -> Result<Option<Song>, StoreError> {
        let song = sqlx::query_as::<_, Song>(&format!(
            r#"
            UPDATE songs
            SET name = COALESCE($2, name),
                artist_id = COALESCE($3, artist_id),
                album_id = CASE WHEN $4::boolean THEN $5::bigint ELSE album_id END
            WHERE id = $1
            RETURNING {SONG_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.name)
        .bind(changes.artist_id)
        .bind(changes.album_id.is_some())
        .bind(changes.album_id.flatten())
        .fetch_optional(&self.pool)
        .await?;
        Ok(song)
    }

    async fn find_playlist(&self, id: i64) -> Result<Option<Playlist>, StoreError> {
        let playlist = sqlx::query_as::<_, Playlist>(
            "SELECT id, name, user_id, created_at FROM playlists WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.with_playlist_songs(playlist).await
    }

    async fn find_playlist_by_name(&self, user_id: i64, name: &str) -> Result<Option<Playlist>, StoreError> {
        let playlist = sqlx::query_as::<_, Playlist>(
            "SELECT id, name, user_id, created_at FROM playlists WHERE user_id = $1 AND name = $2",
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        self.with_playlist_songs(playlist).await
    }

    async fn list_playlists(&self) -> Result<Vec<Playlist>, StoreError> {
        let mut playlists = sqlx::query_as::<_, Playlist>(
            "SELECT id, name, user_id, created_at FROM playlists ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        let rows = sqlx::query_as::<_, PlaylistSongRow>(
            r#"
            SELECT ps.playlist_id, s.id, s.name, s.artist_id, s.album_id
            FROM playlist_songs ps
            JOIN songs s ON s.id = ps.song_id
            ORDER BY ps.playlist_id, ps.position
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_playlist: HashMap<i64, Vec<Song>> = HashMap::new();
        for row in rows {
            by_playlist.entry(row.playlist_id).or_default().push(Song {
                id: row.id,
                name: row.name,
                artist_id: row.artist_id,
                album_id: row.album_id,
            });
        }
        for playlist in &mut playlists {
            playlist.songs = by_playlist.remove(&playlist.id).unwrap_or_default();
        }
        Ok(playlists)
    }

    async fn insert_playlist(&self, playlist: NewPlaylist) -> Result<Playlist, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut inserted = sqlx::query_as::<_, Playlist>(
            "INSERT INTO playlists (name, user_id) VALUES ($1, $2) RETURNING id, name, user_id, created_at",
        )
        .bind(&playlist.name)
        .bind(playlist.user_id)
        .fetch_one(&mut *tx)
        .await?;

        for (position, song_id) in playlist.songs.iter().enumerate() {
            sqlx::query("INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES ($1, $2, $3)")
                .bind(inserted.id)
                .bind(song_id)
                .bind(position as i32)
                .execute(&mut *tx)
                .await?;
        }

        inserted.songs = Self::playlist_songs(&mut *tx, inserted.id).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn update_playlist(&self, id: i64, changes: PlaylistChanges) -> Result<Option<Playlist>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let playlist = sqlx::query_as::<_, Playlist>(
            r#"
            UPDATE playlists SET name = COALESCE($2, name)
            WHERE id = $1
            RETURNING id, name, user_id, created_at
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(mut playlist) = playlist else {
            return Ok(None);
        };

        if let Some(song_ids) = changes.songs {
            sqlx::query("DELETE FROM playlist_songs WHERE playlist_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for (position, song_id) in song_ids.iter().enumerate() {
                sqlx::query("INSERT INTO playlist_songs (playlist_id, song_id, position) VALUES ($1, $2, $3)")
                    .bind(id)
                    .bind(song_id)
                    .bind(position as i32)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        playlist.songs = Self::playlist_songs(&mut *tx, id).await?;
        tx.commit().await?;
        Ok(Some(playlist))
    }

    async fn child_ids(&self, parent: ResourceRef, child: OwnedChild) -> Result<Vec<i64>, StoreError> {
        // Table and column names come from the static ownership declarations, never from input.
        let ids = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT id FROM {} WHERE {} = $1 ORDER BY id",
            child.kind.table(),
            child.foreign_key
        ))
        .bind(parent.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn remove_all(&self, refs: &[ResourceRef]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for target in refs {
            sqlx::query(&format!("DELETE FROM {} WHERE id = $1", target.kind.table()))
                .bind(target.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

