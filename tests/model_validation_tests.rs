use axum::{http::StatusCode, response::IntoResponse};
use music_catalog::{
    ApiError,
    authz::{Authorizer, Capability, Permission, RolePolicy},
    auth::Identity,
    error::{ErrorBody, FieldErrors},
    models::{
        ArtistRequest, CreateAlbumRequest, CreatePlaylistRequest, CredentialsRequest,
        ResourceKind, Role, UpdateAlbumRequest, UpdateSongRequest,
    },
    validation::Validate,
};
use serde_json::json;

// --- Serialization ---

#[test]
fn test_role_serializes_lowercase() {
    assert_eq!(serde_json::to_value(Role::Editor).unwrap(), json!("editor"));
    let role: Role = serde_json::from_value(json!("admin")).unwrap();
    assert_eq!(role, Role::Admin);
    assert!(serde_json::from_value::<Role>(json!("root")).is_err());
    assert_eq!(Role::default(), Role::Viewer);
}

#[test]
fn test_update_album_accepts_both_field_names() {
    let snake: UpdateAlbumRequest = serde_json::from_value(json!({ "new_name": "A" })).unwrap();
    let camel: UpdateAlbumRequest = serde_json::from_value(json!({ "newAlbumName": "B", "songs": [1, 2] })).unwrap();

    assert_eq!(snake.new_name.as_deref(), Some("A"));
    assert!(snake.songs.is_none());
    assert_eq!(camel.new_name.as_deref(), Some("B"));
    assert_eq!(camel.songs, Some(vec![1, 2]));
}

#[test]
fn test_optional_song_fields_default_to_none() {
    let update: UpdateSongRequest = serde_json::from_value(json!({})).unwrap();
    assert!(update.name.is_none() && update.artist_id.is_none() && update.album_id.is_none());
}

#[test]
fn test_song_album_distinguishes_null_from_absent() {
    let cleared: UpdateSongRequest = serde_json::from_value(json!({ "album_id": null })).unwrap();
    let moved: UpdateSongRequest = serde_json::from_value(json!({ "album_id": 7 })).unwrap();

    assert_eq!(cleared.album_id, Some(None));
    assert_eq!(moved.album_id, Some(Some(7)));
    assert!(UpdateSongRequest { album_id: Some(Some(0)), ..Default::default() }.validate().is_err());
    assert!(UpdateSongRequest { album_id: Some(None), ..Default::default() }.validate().is_ok());
}

// --- Body Validation ---

#[test]
fn test_names_are_trimmed() {
    let req = ArtistRequest { name: "  Sun Ra \n".to_string() }.validate().unwrap();
    assert_eq!(req.name, "Sun Ra");
}

#[test]
fn test_blank_and_overlong_names_are_rejected() {
    let blank = ArtistRequest { name: "   ".to_string() }.validate();
    let long = ArtistRequest { name: "x".repeat(256) }.validate();
    let limit = ArtistRequest { name: "x".repeat(255) }.validate();

    assert!(matches!(blank, Err(ApiError::Validation(f)) if f.get("name").is_some()));
    assert!(matches!(long, Err(ApiError::Validation(f)) if f.get("name").is_some()));
    assert!(limit.is_ok());
}

#[test]
fn test_credentials_normalize_and_validate() {
    let ok = CredentialsRequest {
        email: " Someone@Example.COM ".to_string(),
        password: "12345678".to_string(),
    }
    .validate()
    .unwrap();
    assert_eq!(ok.email, "someone@example.com");

    for email in ["plain", "@example.com", "user@", "a@b@c", "a b@example.com"] {
        let result = CredentialsRequest { email: email.to_string(), password: "12345678".to_string() }.validate();
        assert!(matches!(result, Err(ApiError::Validation(f)) if f.get("email").is_some()), "{email}");
    }

    let short = CredentialsRequest { email: "a@b.c".to_string(), password: "1234567".to_string() }.validate();
    assert!(matches!(short, Err(ApiError::Validation(f)) if f.get("password").is_some()));
}

#[test]
fn test_non_positive_ids_are_rejected() {
    let result = CreatePlaylistRequest { name: "Mix".to_string(), songs: Some(vec![3, 0, -1]) }.validate();

    match result {
        Err(ApiError::Validation(fields)) => {
            assert!(fields.get("songs[0]").is_none());
            assert!(fields.get("songs[1]").is_some());
            assert!(fields.get("songs[2]").is_some());
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn test_album_without_songs_is_valid() {
    let req = CreateAlbumRequest { name: "Bitches Brew".to_string(), artist_id: 1, songs: None }
        .validate()
        .unwrap();
    assert!(req.songs.is_none());
}

#[test]
fn test_field_errors_keep_first_message() {
    let mut errors = FieldErrors::new();
    errors.add("name", "must not be empty");
    errors.add("name", "must be at most 255 characters");

    assert_eq!(errors.get("name"), Some("must not be empty"));
    assert!(errors.into_result().is_err());
    assert!(FieldErrors::new().into_result().is_ok());
}

// --- Error Mapping ---

#[test]
fn test_error_kinds_map_to_status_codes() {
    let cases = [
        (ApiError::Unauthenticated, StatusCode::UNAUTHORIZED),
        (ApiError::Forbidden, StatusCode::FORBIDDEN),
        (ApiError::not_found(ResourceKind::Song, 1), StatusCode::NOT_FOUND),
        (ApiError::Conflict("dup".to_string()), StatusCode::CONFLICT),
        (ApiError::invalid("name", "bad"), StatusCode::BAD_REQUEST),
        (ApiError::Persistence("disk on fire".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
        assert_eq!(err.status(), status);
        assert_eq!(err.into_response().status(), status);
    }
}

#[test]
fn test_error_body_shape() {
    let validation = ErrorBody::from(&ApiError::invalid("name", "must not be empty"));
    assert_eq!(
        serde_json::to_value(&validation).unwrap(),
        json!({
            "error": "validation_error",
            "message": "validation failed",
            "fields": { "name": "must not be empty" }
        })
    );

    let missing = serde_json::to_value(ErrorBody::from(&ApiError::not_found(ResourceKind::Album, 4))).unwrap();
    assert_eq!(missing, json!({ "error": "not_found", "message": "album with id: 4 does not exist." }));

    // Storage details are not leaked to the caller.
    let storage = ErrorBody::from(&ApiError::Persistence("connection refused at 10.0.0.3".to_string()));
    assert_eq!(storage.message, "internal storage error");
}

// --- Ownership Graph and Role Matrix ---

#[test]
fn test_owned_children_declarations() {
    let artist: Vec<_> = ResourceKind::Artist
        .owned_children()
        .iter()
        .map(|c| (c.kind, c.foreign_key))
        .collect();
    assert_eq!(
        artist,
        vec![(ResourceKind::Album, "artist_id"), (ResourceKind::Song, "artist_id")]
    );

    let album: Vec<_> = ResourceKind::Album.owned_children().iter().map(|c| (c.kind, c.foreign_key)).collect();
    assert_eq!(album, vec![(ResourceKind::Song, "album_id")]);

    let user: Vec<_> = ResourceKind::User.owned_children().iter().map(|c| (c.kind, c.foreign_key)).collect();
    assert_eq!(user, vec![(ResourceKind::Playlist, "user_id")]);

    assert!(ResourceKind::Song.owned_children().is_empty());
    assert!(ResourceKind::Playlist.owned_children().is_empty());
}

#[test]
fn test_role_policy_matrix() {
    let policy = RolePolicy;
    let catalog = [ResourceKind::Song, ResourceKind::Artist, ResourceKind::Album, ResourceKind::Playlist];
    let expected = [
        (Role::Admin, [true, true, true]),
        (Role::Editor, [true, true, false]),
        (Role::Viewer, [true, false, false]),
    ];

    for (role, allowed) in expected {
        let identity = Identity { user_id: 1, role };
        for kind in catalog {
            let granted = [
                policy.permits(&identity, Permission::read(kind)),
                policy.permits(&identity, Permission::write(kind)),
                policy.permits(&identity, Permission::delete(kind)),
            ];
            assert_eq!(granted, allowed, "{role} on {kind}");
        }
    }
}

#[test]
fn test_user_kind_is_admin_only() {
    let policy = RolePolicy;
    for capability in [Capability::Read, Capability::Write, Capability::Delete] {
        let permission = Permission { kind: ResourceKind::User, capability };
        assert!(policy.permits(&Identity { user_id: 1, role: Role::Admin }, permission));
        assert!(!policy.permits(&Identity { user_id: 2, role: Role::Editor }, permission));
        assert!(matches!(
            policy.authorize(&Identity { user_id: 3, role: Role::Viewer }, permission),
            Err(ApiError::Forbidden)
        ));
    }
}
