use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::Utc;
use jsonwebtoken::{
    DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    error::ApiError,
    models::{Role, User},
};

/// Claims
///
/// Payload carried inside every bearer token. The role travels with the token so that
/// verification needs no database access.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's primary key, as a decimal string.
    pub sub: String,
    /// The user's role at the time the token was issued.
    pub role: Role,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
}

/// Identity
///
/// The verified caller of one request. Produced by the credential verifier and passed
/// explicitly to every pipeline stage; never stored beyond the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub role: Role,
}

// --- Token Issuer ---

/// issue_token
///
/// Signs a token for `user` valid for `config.token_ttl_seconds`. Used by register and login.
pub fn issue_token(config: &AppConfig, user: &User) -> Result<String, ApiError> {
    let now = Utc::now().timestamp().max(0) as usize;
    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role,
        iat: now,
        exp: now.saturating_add(usize::try_from(config.token_ttl_seconds).unwrap_or(usize::MAX)),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("token signing failed: {:?}", e);
        ApiError::Persistence("token signing failed".to_string())
    })
}

// --- Credential Verifier ---

/// verify_token
///
/// Checks signature and expiry of `token` and extracts the identity claim. Pure: no I/O.
/// Every failure (bad signature, expired, malformed, non-numeric subject) is `Unauthenticated`.
pub fn verify_token(secret: &str, token: &str) -> Result<Identity, ApiError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::default();
    validation.validate_exp = true;
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => tracing::debug!("rejecting expired token"),
            other => tracing::debug!("rejecting token: {:?}", other),
        }
        ApiError::Unauthenticated
    })?;

    let user_id = token_data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| ApiError::Unauthenticated)?;

    Ok(Identity {
        user_id,
        role: token_data.claims.role,
    })
}

/// bearer_token
///
/// Pulls the raw token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthenticated)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(ApiError::Unauthenticated)
}

/// Identity Extractor Implementation
///
/// Makes `Identity` usable as a handler argument. This is the *Authenticating* stage of the
/// admission pipeline: it runs before the handler body, so a request without a valid token
/// never reaches authorization or persistence.
///
/// Rejection: `ApiError::Unauthenticated` (401) on any failure.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        let token = bearer_token(parts)?;
        let identity = verify_token(&config.jwt_secret, token)?;
        tracing::debug!(user_id = identity.user_id, role = %identity.role, "authenticated");
        Ok(identity)
    }
}

// --- Password Hashing ---

/// hash_password
///
/// Argon2id hash with a fresh random salt, in PHC string format.
pub fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            tracing::error!("password hashing failed: {}", e);
            ApiError::Persistence("password hashing failed".to_string())
        })
}

/// Returns false for a wrong password and for an unparseable stored hash.
pub fn verify_password(plain: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is malformed: {}", e);
            false
        }
    }
}
