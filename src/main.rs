use std::sync::Arc;

use axum::{routing::get, Router};
use softvoices::{auth, chat, config::Config, store, AppState};
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("softvoices=info")),
        )
        .init();

    let config = Config::from_env()?;

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(&config.database_url)
        .await?;
    store::init_schema(&db_pool).await?;

    let state = AppState {
        store: store::MessageStore::new(db_pool.clone(), config.store_timeout),
        verifier: auth::IdentityVerifier::new(&config.jwt_secret),
        hub: Arc::new(chat::Hub::new()),
        db_pool,
    };

    let app = Router::new()
        .route("/", get(index))
        .nest("/api/auth", auth::router())
        .merge(chat::router())
        .with_state(state)
        .layer(CorsLayer::very_permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("server running on {}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index() -> &'static str {
    "Chat backend is running..."
}
