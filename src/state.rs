use chrono::Duration;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::core::db::KvStore;
use crate::posts::Posts;
use crate::users::Users;

/// Everything a handler needs, built once at startup and shared through
/// `web::Data`.
pub struct AppState {
    pub users: Users,
    pub posts: Posts,
    pub tokens: TokenService,
    pub secure_cookie: bool,
}

impl AppState {
    pub fn new(kv: Arc<dyn KvStore>, jwt_secret: &str, token_ttl: Duration, secure_cookie: bool) -> Self {
        Self {
            users: Users::new(kv.clone()),
            posts: Posts::new(kv.clone()),
            tokens: TokenService::new(jwt_secret, token_ttl, kv),
            secure_cookie,
        }
    }
}
