use crate::{
    auth::Identity,
    error::{ApiError, FieldErrors},
    models::{
        Album, AlbumChanges, Artist, ArtistRequest, CreateAlbumRequest, CreatePlaylistRequest,
        CreateSongRequest, CredentialsRequest, NewAlbum, NewPlaylist, NewSong, Playlist,
        PlaylistChanges, ResourceKind, Role, Song, SongChanges, UpdateAlbumRequest,
        UpdatePlaylistRequest, UpdateSongRequest, User,
    },
    repository::RepositoryState,
};

const MAX_NAME_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 8;

// --- Body Validation ---

/// Validate
///
/// Structural checks on an incoming payload, with no store access. Returns the payload
/// normalized (names trimmed, emails lowercased) or every failing field at once.
pub trait Validate: Sized {
    fn validate(self) -> Result<Self, ApiError>;
}

fn check_name(errors: &mut FieldErrors, field: &str, value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.add(field, "must not be empty");
    } else if trimmed.chars().count() > MAX_NAME_LEN {
        errors.add(field, format!("must be at most {MAX_NAME_LEN} characters"));
    }
    trimmed.to_string()
}

fn check_id(errors: &mut FieldErrors, field: &str, id: i64) {
    if id < 1 {
        errors.add(field, "must be a positive id");
    }
}

fn check_ids(errors: &mut FieldErrors, field: &str, ids: &[i64]) {
    for (index, id) in ids.iter().enumerate() {
        check_id(errors, &format!("{field}[{index}]"), *id);
    }
}

fn check_email(errors: &mut FieldErrors, value: &str) -> String {
    let email = value.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && !domain.is_empty() && !domain.contains('@') && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        errors.add("email", "must be a valid email address");
    }
    email
}

impl Validate for CredentialsRequest {
    fn validate(self) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let email = check_email(&mut errors, &self.email);
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.add("password", format!("must be at least {MIN_PASSWORD_LEN} characters"));
        }
        errors.into_result()?;
        Ok(Self { email, password: self.password })
    }
}

impl Validate for ArtistRequest {
    fn validate(self) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let name = check_name(&mut errors, "name", &self.name);
        errors.into_result()?;
        Ok(Self { name })
    }
}

impl Validate for CreateAlbumRequest {
    fn validate(self) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let name = check_name(&mut errors, "name", &self.name);
        check_id(&mut errors, "artist_id", self.artist_id);
        let songs = self.songs.map(|songs| {
            songs
                .into_iter()
                .enumerate()
                .map(|(index, mut song)| {
                    song.name = check_name(&mut errors, &format!("songs[{index}].name"), &song.name);
                    check_id(&mut errors, &format!("songs[{index}].artist_id"), song.artist_id);
                    song
                })
                .collect()
        });
        errors.into_result()?;
        Ok(Self { name, artist_id: self.artist_id, songs })
    }
}

impl Validate for UpdateAlbumRequest {
    fn validate(self) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let new_name = self
            .new_name
            .as_deref()
            .map(|name| check_name(&mut errors, "new_name", name));
        if let Some(songs) = &self.songs {
            check_ids(&mut errors, "songs", songs);
        }
        errors.into_result()?;
        Ok(Self { new_name, songs: self.songs })
    }
}

impl Validate for CreateSongRequest {
    fn validate(self) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let name = check_name(&mut errors, "name", &self.name);
        check_id(&mut errors, "artist_id", self.artist_id);
        if let Some(album_id) = self.album_id {
            check_id(&mut errors, "album_id", album_id);
        }
        errors.into_result()?;
        Ok(Self { name, ..self })
    }
}

impl Validate for UpdateSongRequest {
    fn validate(self) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let name = self.name.as_deref().map(|name| check_name(&mut errors, "name", name));
        if let Some(artist_id) = self.artist_id {
            check_id(&mut errors, "artist_id", artist_id);
        }
        if let Some(Some(album_id)) = self.album_id {
            check_id(&mut errors, "album_id", album_id);
        }
        errors.into_result()?;
        Ok(Self { name, ..self })
    }
}

impl Validate for CreatePlaylistRequest {
    fn validate(self) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let name = check_name(&mut errors, "name", &self.name);
        if let Some(songs) = &self.songs {
            check_ids(&mut errors, "songs", songs);
        }
        errors.into_result()?;
        Ok(Self { name, songs: self.songs })
    }
}

impl Validate for UpdatePlaylistRequest {
    fn validate(self) -> Result<Self, ApiError> {
        let mut errors = FieldErrors::new();
        let name = self.name.as_deref().map(|name| check_name(&mut errors, "name", name));
        if let Some(songs) = &self.songs {
            check_ids(&mut errors, "songs", songs);
        }
        errors.into_result()?;
        Ok(Self { name, songs: self.songs })
    }
}

// --- Resource Validator ---

/// ResourceValidator
///
/// Confirms existence, uniqueness, relationship and ownership constraints against the store
/// and turns a payload into a store input. It only reads; nothing is written until every
/// check of a request has passed, so a rejection leaves the store untouched.
#[derive(Clone)]
pub struct ResourceValidator {
    repo: RepositoryState,
}

impl ResourceValidator {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    // --- Existence ---

    pub async fn require_user(&self, id: i64) -> Result<User, ApiError> {
        self.repo
            .find_user(id)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::User, id))
    }

    pub async fn require_artist(&self, id: i64) -> Result<Artist, ApiError> {
        self.repo
            .find_artist(id)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::Artist, id))
    }

    pub async fn require_album(&self, id: i64) -> Result<Album, ApiError> {
        self.repo
            .find_album(id)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::Album, id))
    }

    pub async fn require_song(&self, id: i64) -> Result<Song, ApiError> {
        self.repo
            .find_song(id)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::Song, id))
    }

    pub async fn require_playlist(&self, id: i64) -> Result<Playlist, ApiError> {
        self.repo
            .find_playlist(id)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::Playlist, id))
    }

    /// Loads every song in `ids`, in the given order. The first missing id is `NotFound`.
    pub async fn require_songs(&self, ids: &[i64]) -> Result<Vec<Song>, ApiError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = self.repo.find_songs(ids).await?;
        ids.iter()
            .map(|id| {
                found
                    .iter()
                    .find(|song| song.id == *id)
                    .cloned()
                    .ok_or_else(|| ApiError::not_found(ResourceKind::Song, *id))
            })
            .collect()
    }

    // --- Accounts ---

    pub async fn registration(&self, req: CredentialsRequest) -> Result<CredentialsRequest, ApiError> {
        let req = req.validate()?;
        if self.repo.find_user_by_email(&req.email).await?.is_some() {
            return Err(ApiError::Conflict("a user with this email already exists.".to_string()));
        }
        Ok(req)
    }

    // --- Artists ---

    pub async fn artist_for_create(&self, req: ArtistRequest) -> Result<String, ApiError> {
        let req = req.validate()?;
        if self.repo.find_artist_by_name(&req.name).await?.is_some() {
            return Err(ApiError::Conflict(format!("artist {} already exists.", req.name)));
        }
        Ok(req.name)
    }

    pub async fn artist_for_update(&self, id: i64, req: ArtistRequest) -> Result<String, ApiError> {
        let req = req.validate()?;
        self.require_artist(id).await?;
        if let Some(other) = self.repo.find_artist_by_name(&req.name).await? {
            if other.id != id {
                return Err(ApiError::Conflict(format!("another artist named {} already exists.", req.name)));
            }
        }
        Ok(req.name)
    }

    // --- Albums ---

    /// album_for_create
    ///
    /// Artist must exist, (name, artist) must be free, and every nested song must declare the
    /// album's artist. One mismatching song rejects the whole album.
    pub async fn album_for_create(&self, req: CreateAlbumRequest) -> Result<NewAlbum, ApiError> {
        let req = req.validate()?;
        self.require_artist(req.artist_id).await?;

        if self.repo.find_album_by_name(req.artist_id, &req.name).await?.is_some() {
            return Err(ApiError::Conflict("album already exists for artist.".to_string()));
        }

        let songs = req.songs.unwrap_or_default();
        let mut errors = FieldErrors::new();
        for (index, song) in songs.iter().enumerate() {
            if song.artist_id != req.artist_id {
                errors.add(
                    format!("songs[{index}].artist_id"),
                    "song does not belong to the album's artist",
                );
            }
        }
        errors.into_result()?;

        Ok(NewAlbum {
            name: req.name,
            artist_id: req.artist_id,
            songs: songs.into_iter().map(|song| song.name).collect(),
        })
    }

    /// album_for_update
    ///
    /// The album must exist. A new name conflicts only with a *different* album of the same
    /// artist. A replacement song list must reference existing songs of the album's artist.
    pub async fn album_for_update(&self, id: i64, req: UpdateAlbumRequest) -> Result<AlbumChanges, ApiError> {
        let req = req.validate()?;
        let album = self.require_album(id).await?;

        if let Some(new_name) = &req.new_name {
            if let Some(other) = self.repo.find_album_by_name(album.artist_id, new_name).await? {
                if other.id != album.id {
                    return Err(ApiError::Conflict(format!(
                        "Another album with name {new_name} already exists for this artist."
                    )));
                }
            }
        }

        if let Some(song_ids) = &req.songs {
            let songs = self.require_songs(song_ids).await?;
            let mut errors = FieldErrors::new();
            for (index, song) in songs.iter().enumerate() {
                if song.artist_id != album.artist_id {
                    errors.add(format!("songs[{index}]"), "song does not belong to the album's artist");
                }
            }
            errors.into_result()?;
        }

        Ok(AlbumChanges { name: req.new_name, songs: req.songs })
    }

    // --- Songs ---

    async fn check_album_artist(&self, album_id: i64, artist_id: i64) -> Result<(), ApiError> {
        let album = self.require_album(album_id).await?;
        if album.artist_id != artist_id {
            return Err(ApiError::invalid("album_id", "album belongs to a different artist"));
        }
        Ok(())
    }

    pub async fn song_for_create(&self, req: CreateSongRequest) -> Result<NewSong, ApiError> {
        let req = req.validate()?;
        self.require_artist(req.artist_id).await?;
        if let Some(album_id) = req.album_id {
            self.check_album_artist(album_id, req.artist_id).await?;
        }
        Ok(NewSong { name: req.name, artist_id: req.artist_id, album_id: req.album_id })
    }

    /// song_for_update
    ///
    /// Checks the song's relationships as they will be *after* the update: a new artist must
    /// exist, and the (possibly unchanged) album must belong to the (possibly new) artist.
    pub async fn song_for_update(&self, id: i64, req: UpdateSongRequest) -> Result<SongChanges, ApiError> {
        let req = req.validate()?;
        let song = self.require_song(id).await?;

        let artist_id = req.artist_id.unwrap_or(song.artist_id);
        if req.artist_id.is_some() {
            self.require_artist(artist_id).await?;
        }
        let album_id = match req.album_id {
            Some(requested) => requested,
            None => song.album_id,
        };
        if let Some(album_id) = album_id {
            self.check_album_artist(album_id, artist_id).await?;
        }

        Ok(SongChanges { name: req.name, artist_id: req.artist_id, album_id: req.album_id })
    }

    // --- Playlists ---

    fn check_owner(identity: &Identity, playlist: &Playlist) -> Result<(), ApiError> {
        if identity.role == Role::Admin || playlist.user_id == identity.user_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }

    /// playlist_for_create
    ///
    /// The owner is the caller. A token can outlive its account, so the owner must still exist.
    pub async fn playlist_for_create(
        &self,
        identity: &Identity,
        req: CreatePlaylistRequest,
    ) -> Result<NewPlaylist, ApiError> {
        let req = req.validate()?;
        self.require_user(identity.user_id).await?;
        if self.repo.find_playlist_by_name(identity.user_id, &req.name).await?.is_some() {
            return Err(ApiError::Conflict(format!("playlist {} already exists.", req.name)));
        }
        let songs = req.songs.unwrap_or_default();
        self.require_songs(&songs).await?;
        Ok(NewPlaylist { name: req.name, user_id: identity.user_id, songs })
    }

    pub async fn playlist_for_update(
        &self,
        identity: &Identity,
        id: i64,
        req: UpdatePlaylistRequest,
    ) -> Result<PlaylistChanges, ApiError> {
        let req = req.validate()?;
        let playlist = self.require_playlist(id).await?;
        Self::check_owner(identity, &playlist)?;

        if let Some(name) = &req.name {
            if let Some(other) = self.repo.find_playlist_by_name(playlist.user_id, name).await? {
                if other.id != playlist.id {
                    return Err(ApiError::Conflict(format!("another playlist named {name} already exists.")));
                }
            }
        }
        if let Some(song_ids) = &req.songs {
            self.require_songs(song_ids).await?;
        }

        Ok(PlaylistChanges { name: req.name, songs: req.songs })
    }

    pub async fn playlist_for_delete(&self, identity: &Identity, id: i64) -> Result<Playlist, ApiError> {
        let playlist = self.require_playlist(id).await?;
        Self::check_owner(identity, &playlist)?;
        Ok(playlist)
    }
}
