use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::{
    Album, AlbumChanges, Artist, NewAlbum, NewPlaylist, NewSong, NewUser, OwnedChild, Playlist,
    PlaylistChanges, ResourceKind, ResourceRef, Role, Song, SongChanges, User, UserCredentials,
};
use crate::repository::{Repository, StoreError};

#[derive(Debug, Clone)]
struct AlbumRow {
    id: i64,
    name: String,
    artist_id: i64,
}

#[derive(Debug, Clone)]
struct PlaylistRow {
    id: i64,
    name: String,
    user_id: i64,
    created_at: DateTime<Utc>,
}

/// Tables
///
/// The whole store. Multi-row writes run against a clone and replace the original only on
/// success, which gives them the same all-or-nothing behavior as a SQL transaction.
#[derive(Debug, Clone, Default)]
struct Tables {
    last_id: i64,
    users: BTreeMap<i64, UserCredentials>,
    artists: BTreeMap<i64, Artist>,
    albums: BTreeMap<i64, AlbumRow>,
    songs: BTreeMap<i64, Song>,
    playlists: BTreeMap<i64, PlaylistRow>,
    playlist_songs: BTreeMap<i64, Vec<i64>>,
}

fn fk_violation(what: impl std::fmt::Display) -> StoreError {
    StoreError::ForeignKeyViolation(what.to_string())
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn album(&self, row: &AlbumRow) -> Album {
        Album {
            id: row.id,
            name: row.name.clone(),
            artist_id: row.artist_id,
            songs: self
                .songs
                .values()
                .filter(|song| song.album_id == Some(row.id))
                .cloned()
                .collect(),
        }
    }

    fn playlist(&self, row: &PlaylistRow) -> Playlist {
        let songs = self
            .playlist_songs
            .get(&row.id)
            .map(|ids| ids.iter().filter_map(|id| self.songs.get(id)).cloned().collect())
            .unwrap_or_default();
        Playlist {
            id: row.id,
            name: row.name.clone(),
            user_id: row.user_id,
            songs,
            created_at: row.created_at,
        }
    }

    fn check_song_refs(&self, artist_id: i64, album_id: Option<i64>) -> Result<(), StoreError> {
        if !self.artists.contains_key(&artist_id) {
            return Err(fk_violation(format!("artist {artist_id}")));
        }
        if let Some(album_id) = album_id {
            if !self.albums.contains_key(&album_id) {
                return Err(fk_violation(format!("album {album_id}")));
            }
        }
        Ok(())
    }

    fn check_playlist_songs(&self, song_ids: &[i64]) -> Result<(), StoreError> {
        match song_ids.iter().find(|id| !self.songs.contains_key(id)) {
            Some(missing) => Err(fk_violation(format!("song {missing}"))),
            None => Ok(()),
        }
    }

    fn is_referenced(&self, target: ResourceRef) -> bool {
        match target.kind {
            ResourceKind::Artist => {
                self.albums.values().any(|a| a.artist_id == target.id)
                    || self.songs.values().any(|s| s.artist_id == target.id)
            }
            ResourceKind::Album => self.songs.values().any(|s| s.album_id == Some(target.id)),
            ResourceKind::User => self.playlists.values().any(|p| p.user_id == target.id),
            ResourceKind::Song | ResourceKind::Playlist => false,
        }
    }

    fn remove(&mut self, target: ResourceRef) -> Result<(), StoreError> {
        if self.is_referenced(target) {
            return Err(fk_violation(format!("{target} is still referenced")));
        }
        match target.kind {
            ResourceKind::Song => {
                self.songs.remove(&target.id);
                for ids in self.playlist_songs.values_mut() {
                    ids.retain(|id| *id != target.id);
                }
            }
            ResourceKind::Artist => {
                self.artists.remove(&target.id);
            }
            ResourceKind::Album => {
                self.albums.remove(&target.id);
            }
            ResourceKind::Playlist => {
                self.playlists.remove(&target.id);
                self.playlist_songs.remove(&target.id);
            }
            ResourceKind::User => {
                self.users.remove(&target.id);
            }
        }
        Ok(())
    }
}

/// InMemoryRepository
///
/// A mutex-guarded `Repository` with the same constraints as the Postgres schema: unique
/// keys, foreign keys without cascade, atomic multi-row writes. Used for local runs without
/// a database and by the test suite.
///
/// Every trait call is counted (`access_count`) so tests can assert that a rejected request
/// never reached persistence. `fail_writes(true)` simulates a storage outage on writes.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    tables: Mutex<Tables>,
    accesses: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of repository calls made so far.
    pub fn access_count(&self) -> usize {
        self.accesses.load(Ordering::SeqCst)
    }

    pub fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.accesses.fetch_add(1, Ordering::SeqCst);
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the store for a write, refusing when an outage is being simulated.
    fn writable(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        let guard = self.tables();
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("simulated storage outage".to_string()));
        }
        Ok(guard)
    }

    /// Runs `change` against a copy of the tables and commits the copy only on success.
    fn transaction<T>(
        &self,
        change: impl FnOnce(&mut Tables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.writable()?;
        let mut staged = guard.clone();
        let result = change(&mut staged)?;
        *guard = staged;
        Ok(result)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.tables().users.get(&id).map(|creds| creds.user.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserCredentials>, StoreError> {
        let tables = self.tables();
        Ok(tables
            .users
            .values()
            .find(|creds| creds.user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.tables().users.values().map(|creds| creds.user.clone()).collect())
    }

    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.transaction(|tables| {
            if tables.users.values().any(|c| c.user.email.eq_ignore_ascii_case(&user.email)) {
                return Err(StoreError::UniqueViolation("users_email_key".to_string()));
            }
            let id = tables.next_id();
            let created = User {
                id,
                email: user.email,
                role: user.role,
                created_at: Utc::now(),
            };
            tables.users.insert(
                id,
                UserCredentials {
                    user: created.clone(),
                    password_hash: user.password_hash,
                },
            );
            Ok(created)
        })
    }

    async fn set_user_role(&self, id: i64, role: Role) -> Result<Option<User>, StoreError> {
        self.transaction(|tables| {
            Ok(tables.users.get_mut(&id).map(|creds| {
                creds.user.role = role;
                creds.user.clone()
            }))
        })
    }

    async fn find_artist(&self, id: i64) -> Result<Option<Artist>, StoreError> {
        Ok(self.tables().artists.get(&id).cloned())
    }

    async fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>, StoreError> {
        Ok(self.tables().artists.values().find(|a| a.name == name).cloned())
    }

    async fn list_artists(&self) -> Result<Vec<Artist>, StoreError> {
        Ok(self.tables().artists.values().cloned().collect())
    }

    async fn insert_artist(&self, name: String) -> Result<Artist, StoreError> {
        self.transaction(|tables| {
            if tables.artists.values().any(|a| a.name == name) {
                return Err(StoreError::UniqueViolation("artists_name_key".to_string()));
            }
            let artist = Artist { id: tables.next_id(), name };
            tables.artists.insert(artist.id, artist.clone());
            Ok(artist)
        })
    }

    async fn rename_artist(&self, id: i64, name: String) -> Result<Option<Artist>, StoreError> {
        self.transaction(|tables| {
            if tables.artists.values().any(|a| a.name == name && a.id != id) {
                return Err(StoreError::UniqueViolation("artists_name_key".to_string()));
            }
            Ok(tables.artists.get_mut(&id).map(|artist| {
                artist.name = name;
                artist.clone()
            }))
        })
    }

    async fn find_album(&self, id: i64) -> Result<Option<Album>, StoreError> {
        let tables = self.tables();
        Ok(tables.albums.get(&id).map(|row| tables.album(row)))
    }

    async fn find_album_by_name(&self, artist_id: i64, name: &str) -> Result<Option<Album>, StoreError> {
        let tables = self.tables();
        Ok(tables
            .albums
            .values()
            .find(|row| row.artist_id == artist_id && row.name == name)
            .map(|row| tables.album(row)))
    }

    async fn list_albums(&self) -> Result<Vec<Album>, StoreError> {
        let tables = self.tables();
        Ok(tables.albums.values().map(|row| tables.album(row)).collect())
    }

    async fn insert_album(&self, album: NewAlbum) -> Result<Album, StoreError> {
        self.transaction(|tables| {
            if !tables.artists.contains_key(&album.artist_id) {
                return Err(fk_violation(format!("artist {}", album.artist_id)));
            }
            if tables
                .albums
                .values()
                .any(|row| row.artist_id == album.artist_id && row.name == album.name)
            {
                return Err(StoreError::UniqueViolation("albums_name_artist_id_key".to_string()));
            }
            let row = AlbumRow {
                id: tables.next_id(),
                name: album.name,
                artist_id: album.artist_id,
            };
            tables.albums.insert(row.id, row.clone());
            for name in album.songs {
                let song = Song {
                    id: tables.next_id(),
                    name,
                    artist_id: row.artist_id,
                    album_id: Some(row.id),
                };
                tables.songs.insert(song.id, song);
            }
            Ok(tables.album(&row))
        })
    }

    async fn update_album(&self, id: i64, changes: AlbumChanges) -> Result<Option<Album>, StoreError> {
        self.transaction(|tables| {
            let Some(mut row) = tables.albums.get(&id).cloned() else {
                return Ok(None);
            };
            if let Some(name) = changes.name {
                if tables
                    .albums
                    .values()
                    .any(|other| other.id != id && other.artist_id == row.artist_id && other.name == name)
                {
                    return Err(StoreError::UniqueViolation("albums_name_artist_id_key".to_string()));
                }
                row.name = name;
                tables.albums.insert(id, row.clone());
            }
            if let Some(song_ids) = changes.songs {
                for song in tables.songs.values_mut() {
                    if song_ids.contains(&song.id) {
                        song.album_id = Some(id);
                    } else if song.album_id == Some(id) {
                        song.album_id = None;
                    }
                }
            }
            Ok(Some(tables.album(&row)))
        })
    }

    async fn find_song(&self, id: i64) -> Result<Option<Song>, StoreError> {
        Ok(self.tables().songs.get(&id).cloned())
    }

    async fn find_songs(&self, ids: &[i64]) -> Result<Vec<Song>, StoreError> {
        let tables = self.tables();
        Ok(ids.iter().filter_map(|id| tables.songs.get(id)).cloned().collect())
    }

    async fn list_songs(&self) -> Result<Vec<Song>, StoreError> {
        Ok(self.tables().songs.values().cloned().collect())
    }

    async fn insert_song(&self, song: NewSong) -> Result<Song, StoreError> {
        self.transaction(|tables| {
            tables.check_song_refs(song.artist_id, song.album_id)?;
            let inserted = Song {
                id: tables.next_id(),
                name: song.name,
                artist_id: song.artist_id,
                album_id: song.album_id,
            };
            tables.songs.insert(inserted.id, inserted.clone());
            Ok(inserted)
        })
    }

    async fn update_song(&self, id: i64, changes: SongChanges) -> Result<Option<Song>, StoreError> {
        self.transaction(|tables| {
            let Some(mut song) = tables.songs.get(&id).cloned() else {
                return Ok(None);
            };
            if let Some(name) = changes.name {
                song.name = name;
            }
            if let Some(artist_id) = changes.artist_id {
                song.artist_id = artist_id;
            }
            if let Some(album_id) = changes.album_id {
                song.album_id = album_id;
            }
            tables.check_song_refs(song.artist_id, song.album_id)?;
            tables.songs.insert(id, song.clone());
            Ok(Some(song))
        })
    }

    async fn find_playlist(&self, id: i64) -> Result<Option<Playlist>, StoreError> {
        let tables = self.tables();
        Ok(tables.playlists.get(&id).map(|row| tables.playlist(row)))
    }

    async fn find_playlist_by_name(&self, user_id: i64, name: &str) -> Result<Option<Playlist>, StoreError> {
        let tables = self.tables();
        Ok(tables
            .playlists
            .values()
            .find(|row| row.user_id == user_id && row.name == name)
            .map(|row| tables.playlist(row)))
    }

    async fn list_playlists(&self) -> Result<Vec<Playlist>, StoreError> {
        let tables = self.tables();
        Ok(tables.playlists.values().map(|row| tables.playlist(row)).collect())
    }

    async fn insert_playlist(&self, playlist: NewPlaylist) -> Result<Playlist, StoreError> {
        self.transaction(|tables| {
            if !tables.users.contains_key(&playlist.user_id) {
                return Err(fk_violation(format!("user {}", playlist.user_id)));
            }
            if tables
                .playlists
                .values()
                .any(|row| row.user_id == playlist.user_id && row.name == playlist.name)
            {
                return Err(StoreError::UniqueViolation("playlists_name_user_id_key".to_string()));
            }
            tables.check_playlist_songs(&playlist.songs)?;
            let row = PlaylistRow {
                id: tables.next_id(),
                name: playlist.name,
                user_id: playlist.user_id,
                created_at: Utc::now(),
            };
            tables.playlists.insert(row.id, row.clone());
            tables.playlist_songs.insert(row.id, playlist.songs);
            Ok(tables.playlist(&row))
        })
    }

    async fn update_playlist(&self, id: i64, changes: PlaylistChanges) -> Result<Option<Playlist>, StoreError> {
        self.transaction(|tables| {
            let Some(mut row) = tables.playlists.get(&id).cloned() else {
                return Ok(None);
            };
            if let Some(name) = changes.name {
                if tables
                    .playlists
                    .values()
                    .any(|other| other.id != id && other.user_id == row.user_id && other.name == name)
                {
                    return Err(StoreError::UniqueViolation("playlists_name_user_id_key".to_string()));
                }
                row.name = name;
                tables.playlists.insert(id, row.clone());
            }
            if let Some(song_ids) = changes.songs {
                tables.check_playlist_songs(&song_ids)?;
                tables.playlist_songs.insert(id, song_ids);
            }
            Ok(Some(tables.playlist(&row)))
        })
    }

    async fn child_ids(&self, parent: ResourceRef, child: OwnedChild) -> Result<Vec<i64>, StoreError> {
        let tables = self.tables();
        let ids = match (child.kind, child.foreign_key) {
            (ResourceKind::Album, "artist_id") => tables
                .albums
                .values()
                .filter(|row| row.artist_id == parent.id)
                .map(|row| row.id)
                .collect(),
            (ResourceKind::Song, "artist_id") => tables
                .songs
                .values()
                .filter(|song| song.artist_id == parent.id)
                .map(|song| song.id)
                .collect(),
            (ResourceKind::Song, "album_id") => tables
                .songs
                .values()
                .filter(|song| song.album_id == Some(parent.id))
                .map(|song| song.id)
                .collect(),
            (ResourceKind::Playlist, "user_id") => tables
                .playlists
                .values()
                .filter(|row| row.user_id == parent.id)
                .map(|row| row.id)
                .collect(),
            (kind, column) => {
                return Err(StoreError::Backend(format!(
                    "no relation {}.{column}",
                    kind.table()
                )));
            }
        };
        Ok(ids)
    }

    async fn remove_all(&self, refs: &[ResourceRef]) -> Result<(), StoreError> {
        self.transaction(|tables| {
            for target in refs {
                tables.remove(*target)?;
            }
            Ok(())
        })
    }
}
