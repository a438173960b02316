pub mod auth;
pub mod config;
pub mod core;
pub mod handlers;
pub mod models;
pub mod posts;
pub mod state;
pub mod static_server;
pub mod templates;
pub mod users;

use actix_web::middleware::from_fn;
use actix_web::web;

use crate::auth::require_auth;
use crate::core::errors::ApiError;

/// Registers every route. The caller supplies `web::Data<AppState>` and
/// wraps the app in [`crate::core::method_override::method_override`] so HTML
/// forms can reach the PUT and DELETE routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::FormConfig::default()
            .error_handler(|err, _req| ApiError::BadRequest(err.to_string()).into()),
    )
    .route("/", web::get().to(handlers::index))
    .service(
        web::resource("/admin")
            .route(web::get().to(handlers::login_page))
            .route(web::post().to(handlers::login)),
    )
    .route("/register", web::post().to(handlers::register))
    .route("/logout", web::get().to(handlers::logout))
    .route("/static/{file:.*}", web::get().to(static_server::serve_static))
    .service(
        web::resource("/dashboard")
            .wrap(from_fn(require_auth))
            .route(web::get().to(handlers::dashboard)),
    )
    .service(
        web::resource("/add-post")
            .wrap(from_fn(require_auth))
            .route(web::get().to(handlers::add_post_page))
            .route(web::post().to(handlers::create_post)),
    )
    .service(
        web::resource("/edit-post/{id}")
            .wrap(from_fn(require_auth))
            .route(web::get().to(handlers::edit_post_page))
            .route(web::put().to(handlers::update_post)),
    )
    .service(
        web::resource("/delete-post/{id}")
            .wrap(from_fn(require_auth))
            .route(web::delete().to(handlers::delete_post)),
    );
}
