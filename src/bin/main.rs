use actix_web::middleware::{from_fn, Logger};
use actix_web::{web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;

use quill::config::Config;
use quill::core::db::{init_admin_user, FileStore, KvStore, MemoryStore};
use quill::core::method_override::method_override;
use quill::state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(?config, "starting quill");

    let kv: Arc<dyn KvStore> = match &config.data_file {
        Some(path) => {
            let store = FileStore::open(path)?;
            tracing::info!("Using data file {}", store.path().display());
            Arc::new(store)
        }
        None => {
            tracing::warn!("QUILL_DATA_FILE not set, posts and users are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let state = web::Data::new(AppState::new(
        kv,
        &config.jwt_secret,
        chrono::Duration::hours(config.token_expiration_hours),
        config.secure_cookie,
    ));

    if let Some((username, password)) = &config.admin {
        if init_admin_user(&state.users, username, password).context("Failed to seed admin user")? {
            tracing::info!(%username, "created admin user");
        } else {
            tracing::info!(%username, "admin user already exists, skipping seed");
        }
    }

    let bind = config.bind_address();
    tracing::info!("Server listening on http://{}", bind);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(from_fn(method_override))
            .wrap(Logger::default())
            .configure(quill::configure)
    })
    .bind(&bind)
    .with_context(|| format!("Failed to bind {}", bind))?
    .run()
    .await
    .context("Server error")
}
