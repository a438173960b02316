//! Admin workflow: login, registration, the dashboard and the post lifecycle.
//!
//! Every handler returns a single `Result`; the error side is turned into
//! the response by `ResponseError`, so each request gets exactly one answer.
//! Login and registration speak JSON on failure, the page routes render HTML.

use actix_web::http::header::{self, ContentType};
use actix_web::web::{self, Either, Form, Json, ReqData};
use actix_web::{HttpRequest, HttpResponse};

use crate::auth::{removal_cookie, session_cookie, Identity};
use crate::config::TOKEN_COOKIE;
use crate::core::db::StoreError;
use crate::core::errors::{ApiError, PageError};
use crate::core::helpers::{hash_password, verify_password};
use crate::models::models::{Credentials, PostForm, PublicUser};
use crate::state::AppState;
use crate::templates;

type CredentialsBody = Either<Json<Credentials>, Form<Credentials>>;
type PostBody = Either<Json<PostForm>, Form<PostForm>>;

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

fn payload<T>(body: Either<Json<T>, Form<T>>) -> T {
    match body {
        Either::Left(json) => json.into_inner(),
        Either::Right(form) => form.into_inner(),
    }
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type(ContentType::html()).body(body)
}

/// Public landing page; also where logout lands.
pub async fn index(state: web::Data<AppState>) -> Result<HttpResponse, PageError> {
    let posts = state.posts.list()?;
    Ok(html(templates::render_index(&posts)?))
}

pub async fn login_page() -> Result<HttpResponse, PageError> {
    Ok(html(templates::render_login()?))
}

pub async fn login(state: web::Data<AppState>, body: CredentialsBody) -> Result<HttpResponse, ApiError> {
    let Credentials { username, password } = payload(body);

    let Some(user) = state.users.find_by_username(&username)? else {
        tracing::warn!(%username, "login attempt for unknown user");
        return Err(ApiError::InvalidCredentials);
    };

    let hash = user.password_hash.clone();
    let valid = web::block(move || verify_password(&password, &hash)).await?;
    if !valid {
        tracing::warn!(%username, "login attempt with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state.tokens.issue(&user.id)?;
    tracing::info!(user_id = %user.id, %username, "user logged in");

    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, "/dashboard"))
        .cookie(session_cookie(token, state.secure_cookie))
        .finish())
}

pub async fn register(state: web::Data<AppState>, body: CredentialsBody) -> Result<HttpResponse, ApiError> {
    let Credentials { username, password } = payload(body);

    let hash = web::block(move || hash_password(&password)).await??;

    match state.users.create(&username, &hash) {
        Ok(user) => {
            tracing::info!(user_id = %user.id, %username, "user registered");
            Ok(HttpResponse::Created().json(serde_json::json!({
                "message": "UserCreated",
                "user": PublicUser::from(&user),
            })))
        }
        Err(StoreError::Conflict(_)) => {
            tracing::info!(%username, "registration for taken username");
            Err(ApiError::Conflict("user already in use.".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn dashboard(
    state: web::Data<AppState>,
    identity: ReqData<Identity>,
) -> Result<HttpResponse, PageError> {
    let posts = state.posts.list()?;
    tracing::debug!(user_id = %identity.user_id, count = posts.len(), "dashboard");
    Ok(html(templates::render_dashboard(&posts)?))
}

pub async fn add_post_page() -> Result<HttpResponse, PageError> {
    Ok(html(templates::render_post_form(None)?))
}

pub async fn create_post(
    state: web::Data<AppState>,
    identity: ReqData<Identity>,
    body: PostBody,
) -> Result<HttpResponse, PageError> {
    let PostForm { title, body } = payload(body);
    let post = state.posts.create(&title, &body)?;
    tracing::info!(post_id = %post.id, user_id = %identity.user_id, "post created");
    Ok(redirect("/dashboard"))
}

pub async fn edit_post_page(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, PageError> {
    let id = path.into_inner();
    let post = state
        .posts
        .get(&id)?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    Ok(html(templates::render_post_form(Some(&post))?))
}

pub async fn update_post(
    state: web::Data<AppState>,
    identity: ReqData<Identity>,
    path: web::Path<String>,
    body: PostBody,
) -> Result<HttpResponse, PageError> {
    let id = path.into_inner();
    let PostForm { title, body } = payload(body);

    let post = state
        .posts
        .update(&id, &title, &body)?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    tracing::info!(post_id = %post.id, user_id = %identity.user_id, "post updated");

    Ok(redirect(&format!("/edit-post/{}", post.id)))
}

pub async fn delete_post(
    state: web::Data<AppState>,
    identity: ReqData<Identity>,
    path: web::Path<String>,
) -> Result<HttpResponse, PageError> {
    let id = path.into_inner();
    if state.posts.delete(&id)? {
        tracing::info!(post_id = %id, user_id = %identity.user_id, "post deleted");
    }
    Ok(redirect("/dashboard"))
}

/// Revokes the caller's session token when it is still valid, clears the
/// cookie and sends the browser home. Always redirects.
pub async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    if let Some(cookie) = req.cookie(TOKEN_COOKIE) {
        if let Ok(claims) = state.tokens.verify(cookie.value()) {
            match state.tokens.revoke(&claims) {
                Ok(()) => tracing::info!(user_id = %claims.sub, "user logged out"),
                Err(e) => tracing::error!("Failed to revoke session token: {}", e),
            }
        }
    }

    HttpResponse::Found()
        .insert_header((header::LOCATION, "/"))
        .cookie(removal_cookie())
        .finish()
}
