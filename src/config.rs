use std::env;

const LOCAL_JWT_SECRET: &str = "super-secure-test-secret-value-local";
const DEFAULT_TOKEN_TTL_SECONDS: u64 = 3600;
const MAX_TOKEN_TTL_SECONDS: u64 = 30 * 24 * 3600;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and shared
/// through `AppState` via `FromRef`, so the token extractor and the startup code read the
/// same values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Postgres connection string. `None` (local only) selects the in-memory store.
    pub db_url: Option<String>,
    // Runtime environment marker. Controls log format and secret fallbacks.
    pub env: Env,
    // HMAC secret used to sign and verify bearer tokens.
    pub jwt_secret: String,
    // Lifetime of issued tokens, in seconds.
    pub token_ttl_seconds: u64,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
}

/// Env
///
/// Defines the runtime context: `Local` tolerates missing infrastructure settings,
/// `Production` refuses to start without them.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking configuration for test state setup. Uses the in-memory store.
    fn default() -> Self {
        Self {
            db_url: None,
            env: Env::Local,
            jwt_secret: LOCAL_JWT_SECRET.to_string(),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads all parameters from environment variables and implements the **fail-fast** principle.
    ///
    /// # Panics
    /// Panics in `production` when `DATABASE_URL` or `JWT_SECRET` is missing, or when
    /// `TOKEN_TTL_SECONDS` is set but not a positive integer.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = match env {
            Env::Production => {
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production.")
            }
            Env::Local => env::var("JWT_SECRET").unwrap_or_else(|_| LOCAL_JWT_SECRET.to_string()),
        };

        let db_url = match env {
            Env::Production => Some(
                env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in production"),
            ),
            Env::Local => env::var("DATABASE_URL").ok(),
        };

        let token_ttl_seconds = match env::var("TOKEN_TTL_SECONDS") {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(ttl) if (1..=MAX_TOKEN_TTL_SECONDS).contains(&ttl) => ttl,
                _ => panic!(
                    "FATAL: TOKEN_TTL_SECONDS must be between 1 and {MAX_TOKEN_TTL_SECONDS}, got {raw:?}"
                ),
            },
            Err(_) => DEFAULT_TOKEN_TTL_SECONDS,
        };

        Self {
            db_url,
            env,
            jwt_secret,
            token_ttl_seconds,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
        }
    }
}
