//! Session tokens and the guard that protects admin routes.
//!
//! Tokens are HS256 JWTs carrying the user id, issue time, expiry and a
//! random `jti`. Nothing is stored per session; logging out writes the `jti`
//! to a denylist in the document store until the token would have expired
//! anyway.

use actix_web::body::MessageBody;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Next;
use actix_web::{web, Error, HttpMessage, ResponseError};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{revoked_key, REVOKED_PREFIX, TOKEN_COOKIE};
use crate::core::db::{KvStore, KvStoreExt, StoreError};
use crate::core::errors::ApiError;
use crate::models::models::{Claims, RevokedToken};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("invalid session token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
    #[error("session token has been revoked")]
    Revoked,
    #[error("failed to sign session token: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    kv: Arc<dyn KvStore>,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration, kv: Arc<dyn KvStore>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            kv,
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + self.ttl.num_seconds(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Signing)
    }

    /// Checks signature, expiry and the revocation list.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)?.claims;

        if self.kv.get(&revoked_key(&claims.jti))?.is_some() {
            return Err(TokenError::Revoked);
        }

        Ok(claims)
    }

    pub fn revoke(&self, claims: &Claims) -> Result<(), TokenError> {
        self.kv
            .set_json(&revoked_key(&claims.jti), &RevokedToken { exp: claims.exp })?;
        let pruned = self.prune_revoked()?;
        if pruned > 0 {
            tracing::debug!("pruned {} expired revocation entries", pruned);
        }
        Ok(())
    }

    /// Drops denylist entries for tokens that have expired on their own.
    pub fn prune_revoked(&self) -> Result<usize, TokenError> {
        let now = Utc::now().timestamp();
        let mut pruned = 0;
        for (key, value) in self.kv.scan_prefix(REVOKED_PREFIX)? {
            let expired = serde_json::from_value::<RevokedToken>(value)
                .map(|entry| entry.exp < now)
                .unwrap_or(true);
            if expired && self.kv.delete(&key)? {
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}

/// The authenticated caller, placed in request extensions by [`require_auth`].
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build(TOKEN_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .finish()
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::build(TOKEN_COOKIE, "")
        .path("/")
        .http_only(true)
        .finish();
    cookie.make_removal();
    cookie
}

/// Guard for protected routes: a request without a valid `token` cookie is
/// answered with 401 and never reaches the wrapped handler.
pub async fn require_auth(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    match authenticate(&req) {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        Err(err) => {
            tracing::debug!(path = %req.path(), "rejected request: {}", err);
            let response = err.error_response();
            Ok(req.into_response(response).map_into_right_body())
        }
    }
}

fn authenticate(req: &ServiceRequest) -> Result<Identity, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::InternalError("application state is not configured".to_string()))?;

    let cookie = req
        .request()
        .cookie(TOKEN_COOKIE)
        .ok_or(ApiError::Unauthorized)?;

    let claims = state.tokens.verify(cookie.value())?;
    Ok(Identity { user_id: claims.sub })
}
