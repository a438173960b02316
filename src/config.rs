use anyhow::{bail, Context};
use std::env;
use std::path::PathBuf;

pub const TOKEN_COOKIE: &str = "token";

pub const USER_PREFIX: &str = "user:";
pub const USERNAME_PREFIX: &str = "username:";
pub const POST_PREFIX: &str = "post:";
pub const REVOKED_PREFIX: &str = "revoked:";

pub fn user_key(id: &str) -> String {
    format!("{}{}", USER_PREFIX, id)
}

pub fn username_key(username: &str) -> String {
    format!("{}{}", USERNAME_PREFIX, username)
}

pub fn post_key(id: &str) -> String {
    format!("{}{}", POST_PREFIX, id)
}

pub fn revoked_key(jti: &str) -> String {
    format!("{}{}", REVOKED_PREFIX, jti)
}

pub const SITE_DESCRIPTION: &str = "Simple blog built with Rust, actix-web and a JSON document store.";

pub fn token_expiration_hours() -> i64 {
    env::var("QUILL_TOKEN_EXPIRATION_HOURS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(24)
}

/// Runtime settings, read from the process environment (and `.env`).
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub token_expiration_hours: i64,
    /// JSON file backing the document store; in-memory when `None`.
    pub data_file: Option<PathBuf>,
    pub secure_cookie: bool,
    pub admin: Option<(String, String)>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("jwt_secret", &"<redacted>")
            .field("token_expiration_hours", &self.token_expiration_hours)
            .field("data_file", &self.data_file)
            .field("secure_cookie", &self.secure_cookie)
            .field("admin", &self.admin.as_ref().map(|(name, _)| name))
            .finish()
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() {
            bail!("JWT_SECRET must be set to a non-empty value");
        }

        let port = env::var("QUILL_PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .context("QUILL_PORT must be a valid port number")?;

        let admin = match (
            env::var("QUILL_ADMIN_USERNAME").ok().filter(|v| !v.is_empty()),
            env::var("QUILL_ADMIN_PASSWORD").ok().filter(|v| !v.is_empty()),
        ) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        };

        Ok(Config {
            host: env::var("QUILL_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            jwt_secret,
            token_expiration_hours: token_expiration_hours(),
            data_file: env::var("QUILL_DATA_FILE")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            secure_cookie: env::var("QUILL_SECURE_COOKIE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            admin,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
