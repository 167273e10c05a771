//! tabla-rest server: exposes the allow-listed tables of one PostgreSQL schema over HTTP.

use tabla_rest::{
    app_router, ensure_database_exists, ensure_users_table, load_schema_cache, AppState, DatabaseProvider, Settings,
};
use tokio::net::TcpListener;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tabla_rest=info,tower_http=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    tracing::info!(provider = ?settings.provider, schema = %settings.schema, "starting");

    if settings.provider == DatabaseProvider::LocalDb {
        ensure_database_exists(&settings.database_url).await?;
    }
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;

    ensure_users_table(&pool, &settings).await?;
    let schema = load_schema_cache(&pool, &settings).await?;

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    let addr = listener.local_addr()?;
    let app = app_router(AppState::new(pool, schema, settings));
    tracing::info!("listening on http://{}", addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::warn!("received SIGTERM, shutting down"),
    }
}
