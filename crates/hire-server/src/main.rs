mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use hire_api::AppStateInner;
use hire_chat::ChatService;
use hire_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hire=debug,hire_api=debug,hire_chat=debug,hire_db=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&PathBuf::from(&config.db_path))?);
    if let Some(bundle_id) = &config.seed_bundle_id {
        db.create_app(&uuid::Uuid::new_v4().to_string(), bundle_id, bundle_id)?;
        info!(bundle_id = %bundle_id, "tenant registered");
    }

    let state = Arc::new(AppStateInner {
        chat: ChatService::new(db),
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = hire_api::router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("hire server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
