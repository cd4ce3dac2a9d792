use std::collections::HashSet;
use std::fmt;
use std::future::Future;

use crate::{
    auth::Identity,
    authz::{AuthorizerState, Permission},
    error::ApiError,
    models::{
        Album, AlbumChanges, Artist, ArtistRequest, CreateAlbumRequest, CreatePlaylistRequest,
        CreateSongRequest, NewAlbum, NewPlaylist, NewSong, Playlist, PlaylistChanges,
        ResourceKind, ResourceRef, Role, Song, SongChanges, UpdateAlbumRequest,
        UpdatePlaylistRequest, UpdateSongRequest, User,
    },
    repository::RepositoryState,
    validation::ResourceValidator,
};

// --- Request Lifecycle ---

/// Stage
///
/// Lifecycle of one request through the admission pipeline:
/// `Received → Authenticating → Authorizing → Validating → Mutating → {Committed | Rejected}`.
/// Stages only move forward; a rejection at any stage is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Authenticating,
    Authorizing,
    Validating,
    Mutating,
    Committed,
    Rejected,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Authenticating => "authenticating",
            Stage::Authorizing => "authorizing",
            Stage::Validating => "validating",
            Stage::Mutating => "mutating",
            Stage::Committed => "committed",
            Stage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Admission
///
/// Tracks one admitted request. Created only after authorization succeeds, so holding an
/// `Admission` is proof that the identity holds the required permission. `mutate` and
/// `resolve` consume it, which keeps a request from writing twice.
#[derive(Debug)]
pub struct Admission {
    identity: Identity,
    permission: Permission,
    stage: Stage,
}

impl Admission {
    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn enter(&mut self, next: Stage) {
        debug_assert!(next > self.stage, "stage {next} entered after {}", self.stage);
        tracing::debug!(
            user_id = self.identity.user_id,
            kind = %self.permission.kind,
            from = %self.stage,
            to = %next,
            "admission stage"
        );
        self.stage = next;
    }

    fn reject(&mut self, err: ApiError) -> ApiError {
        tracing::warn!(
            user_id = self.identity.user_id,
            kind = %self.permission.kind,
            stage = %self.stage,
            error = err.kind(),
            "request rejected: {}",
            err
        );
        self.stage = Stage::Rejected;
        err
    }

    /// Runs the validation stage. Nothing may be written while `check` runs.
    pub async fn validate<T>(
        &mut self,
        check: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        self.enter(Stage::Validating);
        check.await.map_err(|err| self.reject(err))
    }

    /// Runs the mutation stage and ends the request.
    pub async fn mutate<T>(
        mut self,
        write: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        self.enter(Stage::Mutating);
        match write.await {
            Ok(value) => {
                self.enter(Stage::Committed);
                Ok(value)
            }
            Err(err) => Err(self.reject(err)),
        }
    }

    /// Ends a read-only request: looks the resource up and commits without a mutation stage.
    pub async fn resolve<T>(
        mut self,
        lookup: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        let value = self.validate(lookup).await?;
        self.enter(Stage::Committed);
        Ok(value)
    }
}

// --- Mutation Executor ---

/// MutationExecutor
///
/// Applies validated state transitions to the store. Deletes follow the declared
/// owned-children of each kind: descendants are removed before their parents, all in one
/// atomic batch.
#[derive(Clone)]
pub struct MutationExecutor {
    repo: RepositoryState,
}

impl MutationExecutor {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }

    /// deletion_plan
    ///
    /// Walks the ownership graph from `target` and returns every row to remove, each child
    /// listed before the parent that owns it. Rows reachable through two parents (a song owned
    /// by both its artist and its album) appear once.
    pub async fn deletion_plan(&self, target: ResourceRef) -> Result<Vec<ResourceRef>, ApiError> {
        let mut plan = Vec::new();
        let mut planned = HashSet::new();
        let mut stack = vec![(target, false)];

        while let Some((node, expanded)) = stack.pop() {
            if planned.contains(&node) {
                continue;
            }
            if expanded {
                planned.insert(node);
                plan.push(node);
                continue;
            }
            stack.push((node, true));
            for child in node.kind.owned_children() {
                for id in self.repo.child_ids(node, *child).await? {
                    let child_ref = ResourceRef::new(child.kind, id);
                    if !planned.contains(&child_ref) {
                        stack.push((child_ref, false));
                    }
                }
            }
        }
        Ok(plan)
    }

    /// Removes `target` and everything it owns. Returns the removal order that was applied.
    pub async fn delete(&self, target: ResourceRef) -> Result<Vec<ResourceRef>, ApiError> {
        let plan = self.deletion_plan(target).await?;
        self.repo.remove_all(&plan).await?;
        tracing::info!(root = %target, removed = plan.len(), "cascade delete applied");
        Ok(plan)
    }

    pub async fn create_artist(&self, name: String) -> Result<Artist, ApiError> {
        Ok(self.repo.insert_artist(name).await?)
    }

    pub async fn rename_artist(&self, id: i64, name: String) -> Result<Artist, ApiError> {
        self.repo
            .rename_artist(id, name)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::Artist, id))
    }

    pub async fn create_album(&self, album: NewAlbum) -> Result<Album, ApiError> {
        Ok(self.repo.insert_album(album).await?)
    }

    pub async fn update_album(&self, id: i64, changes: AlbumChanges) -> Result<Album, ApiError> {
        self.repo
            .update_album(id, changes)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::Album, id))
    }

    pub async fn create_song(&self, song: NewSong) -> Result<Song, ApiError> {
        Ok(self.repo.insert_song(song).await?)
    }

    pub async fn update_song(&self, id: i64, changes: SongChanges) -> Result<Song, ApiError> {
        self.repo
            .update_song(id, changes)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::Song, id))
    }

    pub async fn create_playlist(&self, playlist: NewPlaylist) -> Result<Playlist, ApiError> {
        Ok(self.repo.insert_playlist(playlist).await?)
    }

    pub async fn update_playlist(&self, id: i64, changes: PlaylistChanges) -> Result<Playlist, ApiError> {
        self.repo
            .update_playlist(id, changes)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::Playlist, id))
    }

    pub async fn set_user_role(&self, id: i64, role: Role) -> Result<User, ApiError> {
        self.repo
            .set_user_role(id, role)
            .await?
            .ok_or_else(|| ApiError::not_found(ResourceKind::User, id))
    }
}

// --- Request Admission Pipeline ---

/// AdmissionPipeline
///
/// Composes the role authorizer, the resource validator and the mutation executor into one
/// linear sequence per request. Authentication has already happened by the time a handler
/// calls in (the `Identity` extractor), so every operation starts at *Authorizing*.
#[derive(Clone)]
pub struct AdmissionPipeline {
    repo: RepositoryState,
    authorizer: AuthorizerState,
    validator: ResourceValidator,
    executor: MutationExecutor,
}

impl AdmissionPipeline {
    pub fn new(repo: RepositoryState, authorizer: AuthorizerState) -> Self {
        Self {
            validator: ResourceValidator::new(repo.clone()),
            executor: MutationExecutor::new(repo.clone()),
            repo,
            authorizer,
        }
    }

    pub fn validator(&self) -> &ResourceValidator {
        &self.validator
    }

    pub fn executor(&self) -> &MutationExecutor {
        &self.executor
    }

    /// admit
    ///
    /// The *Authorizing* stage. Runs before any store access; a missing permission ends the
    /// request with `Forbidden`.
    pub fn admit(&self, identity: &Identity, permission: Permission) -> Result<Admission, ApiError> {
        let mut admission = Admission {
            identity: *identity,
            permission,
            stage: Stage::Authenticating,
        };
        admission.enter(Stage::Authorizing);
        self.authorizer
            .authorize(identity, permission)
            .map_err(|err| admission.reject(err))?;
        Ok(admission)
    }

    /// Runs the full sequence for a single-record delete and returns the removed record.
    async fn delete_record<T>(
        &self,
        admission: Admission,
        target: ResourceRef,
        record: T,
    ) -> Result<T, ApiError> {
        admission
            .mutate(async {
                self.executor.delete(target).await?;
                Ok::<T, ApiError>(record)
            })
            .await
    }

    // --- Artists ---

    pub async fn list_artists(&self, identity: &Identity) -> Result<Vec<Artist>, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::Artist))?;
        admission.resolve(async { self.repo.list_artists().await.map_err(ApiError::from) }).await
    }

    pub async fn get_artist(&self, identity: &Identity, id: i64) -> Result<Artist, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::Artist))?;
        admission.resolve(self.validator.require_artist(id)).await
    }

    pub async fn create_artist(&self, identity: &Identity, req: ArtistRequest) -> Result<Artist, ApiError> {
        let mut admission = self.admit(identity, Permission::write(ResourceKind::Artist))?;
        let name = admission.validate(self.validator.artist_for_create(req)).await?;
        admission.mutate(self.executor.create_artist(name)).await
    }

    pub async fn update_artist(&self, identity: &Identity, id: i64, req: ArtistRequest) -> Result<Artist, ApiError> {
        let mut admission = self.admit(identity, Permission::write(ResourceKind::Artist))?;
        let name = admission.validate(self.validator.artist_for_update(id, req)).await?;
        admission.mutate(self.executor.rename_artist(id, name)).await
    }

    /// Removes the artist together with its albums and songs.
    pub async fn delete_artist(&self, identity: &Identity, id: i64) -> Result<Artist, ApiError> {
        let mut admission = self.admit(identity, Permission::delete(ResourceKind::Artist))?;
        let artist = admission.validate(self.validator.require_artist(id)).await?;
        self.delete_record(admission, ResourceRef::new(ResourceKind::Artist, id), artist)
            .await
    }

    // --- Albums ---

    pub async fn list_albums(&self, identity: &Identity) -> Result<Vec<Album>, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::Album))?;
        admission.resolve(async { self.repo.list_albums().await.map_err(ApiError::from) }).await
    }

    pub async fn get_album(&self, identity: &Identity, id: i64) -> Result<Album, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::Album))?;
        admission.resolve(self.validator.require_album(id)).await
    }

    /// create_album
    ///
    /// Creates the album and its nested songs, or nothing at all.
    pub async fn create_album(&self, identity: &Identity, req: CreateAlbumRequest) -> Result<Album, ApiError> {
        let mut admission = self.admit(identity, Permission::write(ResourceKind::Album))?;
        let album = admission.validate(self.validator.album_for_create(req)).await?;
        admission.mutate(self.executor.create_album(album)).await
    }

    pub async fn update_album(&self, identity: &Identity, id: i64, req: UpdateAlbumRequest) -> Result<Album, ApiError> {
        let mut admission = self.admit(identity, Permission::write(ResourceKind::Album))?;
        let changes = admission.validate(self.validator.album_for_update(id, req)).await?;
        admission.mutate(self.executor.update_album(id, changes)).await
    }

    /// delete_album
    ///
    /// Removes the album's songs, then the album. Returns the album as it was before removal.
    pub async fn delete_album(&self, identity: &Identity, id: i64) -> Result<Album, ApiError> {
        let mut admission = self.admit(identity, Permission::delete(ResourceKind::Album))?;
        let album = admission.validate(self.validator.require_album(id)).await?;
        self.delete_record(admission, ResourceRef::new(ResourceKind::Album, id), album)
            .await
    }

    // --- Songs ---

    pub async fn list_songs(&self, identity: &Identity) -> Result<Vec<Song>, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::Song))?;
        admission.resolve(async { self.repo.list_songs().await.map_err(ApiError::from) }).await
    }

    pub async fn get_song(&self, identity: &Identity, id: i64) -> Result<Song, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::Song))?;
        admission.resolve(self.validator.require_song(id)).await
    }

    pub async fn create_song(&self, identity: &Identity, req: CreateSongRequest) -> Result<Song, ApiError> {
        let mut admission = self.admit(identity, Permission::write(ResourceKind::Song))?;
        let song = admission.validate(self.validator.song_for_create(req)).await?;
        admission.mutate(self.executor.create_song(song)).await
    }

    pub async fn update_song(&self, identity: &Identity, id: i64, req: UpdateSongRequest) -> Result<Song, ApiError> {
        let mut admission = self.admit(identity, Permission::write(ResourceKind::Song))?;
        let changes = admission.validate(self.validator.song_for_update(id, req)).await?;
        admission.mutate(self.executor.update_song(id, changes)).await
    }

    pub async fn delete_song(&self, identity: &Identity, id: i64) -> Result<Song, ApiError> {
        let mut admission = self.admit(identity, Permission::delete(ResourceKind::Song))?;
        let song = admission.validate(self.validator.require_song(id)).await?;
        self.delete_record(admission, ResourceRef::new(ResourceKind::Song, id), song)
            .await
    }

    // --- Playlists ---

    pub async fn list_playlists(&self, identity: &Identity) -> Result<Vec<Playlist>, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::Playlist))?;
        admission.resolve(async { self.repo.list_playlists().await.map_err(ApiError::from) }).await
    }

    pub async fn get_playlist(&self, identity: &Identity, id: i64) -> Result<Playlist, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::Playlist))?;
        admission.resolve(self.validator.require_playlist(id)).await
    }

    pub async fn create_playlist(&self, identity: &Identity, req: CreatePlaylistRequest) -> Result<Playlist, ApiError> {
        let mut admission = self.admit(identity, Permission::write(ResourceKind::Playlist))?;
        let playlist = admission
            .validate(self.validator.playlist_for_create(identity, req))
            .await?;
        admission.mutate(self.executor.create_playlist(playlist)).await
    }

    pub async fn update_playlist(
        &self,
        identity: &Identity,
        id: i64,
        req: UpdatePlaylistRequest,
    ) -> Result<Playlist, ApiError> {
        let mut admission = self.admit(identity, Permission::write(ResourceKind::Playlist))?;
        let changes = admission
            .validate(self.validator.playlist_for_update(identity, id, req))
            .await?;
        admission.mutate(self.executor.update_playlist(id, changes)).await
    }

    pub async fn delete_playlist(&self, identity: &Identity, id: i64) -> Result<Playlist, ApiError> {
        let mut admission = self.admit(identity, Permission::delete(ResourceKind::Playlist))?;
        let playlist = admission
            .validate(self.validator.playlist_for_delete(identity, id))
            .await?;
        self.delete_record(admission, ResourceRef::new(ResourceKind::Playlist, id), playlist)
            .await
    }

    // --- Users ---

    pub async fn list_users(&self, identity: &Identity) -> Result<Vec<User>, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::User))?;
        admission.resolve(async { self.repo.list_users().await.map_err(ApiError::from) }).await
    }

    pub async fn get_user(&self, identity: &Identity, id: i64) -> Result<User, ApiError> {
        let admission = self.admit(identity, Permission::read(ResourceKind::User))?;
        admission.resolve(self.validator.require_user(id)).await
    }

    pub async fn set_user_role(&self, identity: &Identity, id: i64, role: Role) -> Result<User, ApiError> {
        let mut admission = self.admit(identity, Permission::write(ResourceKind::User))?;
        admission.validate(self.validator.require_user(id)).await?;
        admission.mutate(self.executor.set_user_role(id, role)).await
    }

    /// Removes the user and the playlists they own.
    pub async fn delete_user(&self, identity: &Identity, id: i64) -> Result<User, ApiError> {
        let mut admission = self.admit(identity, Permission::delete(ResourceKind::User))?;
        let user = admission.validate(self.validator.require_user(id)).await?;
        self.delete_record(admission, ResourceRef::new(ResourceKind::User, id), user)
            .await
    }
}
