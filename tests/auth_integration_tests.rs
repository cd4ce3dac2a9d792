use axum::{
    extract::FromRequestParts,
    http::{Request, header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use music_catalog::{
    AppConfig, AppState, ApiError, InMemoryRepository,
    auth::{self, Claims, Identity},
    models::{Role, User},
    repository::RepositoryState,
};
use std::sync::Arc;

// --- Helpers ---

fn test_state() -> (AppState, Arc<InMemoryRepository>) {
    let repo = Arc::new(InMemoryRepository::new());
    let state = AppState::new(repo.clone() as RepositoryState, AppConfig::default());
    (state, repo)
}

fn user(id: i64, role: Role) -> User {
    User {
        id,
        email: format!("user{id}@example.com"),
        role,
        created_at: Utc::now(),
    }
}

fn parts_with_auth(value: Option<&str>) -> Parts {
    let mut builder = Request::builder().uri("/api/songs");
    if let Some(value) = value {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    let (parts, _) = builder.body(()).unwrap().into_parts();
    parts
}

fn signed(claims: &Claims, secret: &str) -> String {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

async fn extract(state: &AppState, header_value: Option<&str>) -> Result<Identity, ApiError> {
    let mut parts = parts_with_auth(header_value);
    Identity::from_request_parts(&mut parts, state).await
}

// --- Credential Verifier ---

#[tokio::test]
async fn test_identity_from_issued_token() {
    let (state, repo) = test_state();
    let token = auth::issue_token(&state.config, &user(7, Role::Editor)).unwrap();

    let identity = extract(&state, Some(&format!("Bearer {token}"))).await.unwrap();

    assert_eq!(identity, Identity { user_id: 7, role: Role::Editor });
    // Verification is pure: the store is never consulted.
    assert_eq!(repo.access_count(), 0);
}

#[tokio::test]
async fn test_missing_header_is_unauthenticated() {
    let (state, repo) = test_state();

    let result = extract(&state, None).await;

    assert!(matches!(result, Err(ApiError::Unauthenticated)));
    assert_eq!(repo.access_count(), 0);
}

#[tokio::test]
async fn test_non_bearer_scheme_is_unauthenticated() {
    let (state, _) = test_state();
    let token = auth::issue_token(&state.config, &user(1, Role::Admin)).unwrap();

    let result = extract(&state, Some(&format!("Basic {token}"))).await;

    assert!(matches!(result, Err(ApiError::Unauthenticated)));
}

#[tokio::test]
async fn test_empty_bearer_is_unauthenticated() {
    let (state, _) = test_state();
    let result = extract(&state, Some("Bearer ")).await;
    assert!(matches!(result, Err(ApiError::Unauthenticated)));
}

#[tokio::test]
async fn test_malformed_token_is_unauthenticated() {
    let (state, repo) = test_state();

    let result = extract(&state, Some("Bearer not.a.jwt")).await;

    assert!(matches!(result, Err(ApiError::Unauthenticated)));
    assert_eq!(repo.access_count(), 0);
}

#[tokio::test]
async fn test_wrong_secret_is_unauthenticated() {
    let (state, _) = test_state();
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: "1".to_string(),
        role: Role::Admin,
        iat: now,
        exp: now + 600,
    };
    let forged = signed(&claims, "some-other-secret");

    let result = extract(&state, Some(&format!("Bearer {forged}"))).await;

    assert!(matches!(result, Err(ApiError::Unauthenticated)));
}

#[tokio::test]
async fn test_expired_token_is_unauthenticated() {
    let (state, _) = test_state();
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: "1".to_string(),
        role: Role::Admin,
        iat: now - 7200,
        exp: now - 60,
    };
    let expired = signed(&claims, &state.config.jwt_secret);

    let result = extract(&state, Some(&format!("Bearer {expired}"))).await;

    assert!(matches!(result, Err(ApiError::Unauthenticated)));
}

#[test]
fn test_non_numeric_subject_is_unauthenticated() {
    let config = AppConfig::default();
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: "not-a-number".to_string(),
        role: Role::Viewer,
        iat: now,
        exp: now + 600,
    };
    let token = signed(&claims, &config.jwt_secret);

    let result = auth::verify_token(&config.jwt_secret, &token);

    assert!(matches!(result, Err(ApiError::Unauthenticated)));
}

#[test]
fn test_token_carries_role_and_expiry() {
    let config = AppConfig {
        token_ttl_seconds: 120,
        ..AppConfig::default()
    };
    let token = auth::issue_token(&config, &user(3, Role::Viewer)).unwrap();

    let identity = auth::verify_token(&config.jwt_secret, &token).unwrap();
    assert_eq!(identity.user_id, 3);
    assert_eq!(identity.role, Role::Viewer);

    // Same token, different verifier secret.
    assert!(auth::verify_token("another-secret", &token).is_err());
}

#[test]
fn test_oversized_ttl_saturates_expiry() {
    let config = AppConfig {
        token_ttl_seconds: u64::MAX,
        ..AppConfig::default()
    };
    let token = auth::issue_token(&config, &user(4, Role::Editor)).unwrap();

    let identity = auth::verify_token(&config.jwt_secret, &token).unwrap();
    assert_eq!(identity.user_id, 4);
}

// --- Password Hashing ---

#[test]
fn test_password_hash_round_trip() {
    let hash = auth::hash_password("correct horse battery").unwrap();

    assert_ne!(hash, "correct horse battery");
    assert!(auth::verify_password("correct horse battery", &hash));
    assert!(!auth::verify_password("wrong password", &hash));
}

#[test]
fn test_password_hashes_are_salted() {
    let first = auth::hash_password("same-password").unwrap();
    let second = auth::hash_password("same-password").unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_malformed_stored_hash_never_verifies() {
    assert!(!auth::verify_password("anything", "not-a-phc-string"));
}
