use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{routing::get, Router};
use http::HeaderValue;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
};
use tracing::info;

use food_ordering_api as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool)
            .await
            .context("applying schema migrations")?;
    }
    let db = Arc::new(db_pool);

    if cfg.seed_reference_data {
        let report =
            api::services::seed::seed_reference_data(db.clone(), cfg.seed_admin_email.as_deref())
                .await?;
        info!(
            menus_created = report.menus_created,
            grants_created = report.grants_created,
            "Reference data checked"
        );
    }

    let cors_layer = build_cors(&cfg)?;
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;

    let state = api::AppState::new(db, cfg);
    let app = Router::new()
        .route("/", get(|| async { "food-ordering-api up" }))
        .merge(api::app_router(state))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer);

    info!(%addr, "food-ordering-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn build_cors(cfg: &api::config::AppConfig) -> anyhow::Result<CorsLayer> {
    let origins = cfg
        .cors_origins()
        .into_iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .with_context(|| format!("CORS origin {origin:?} is not a valid header value"))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    if !origins.is_empty() {
        info!(count = origins.len(), "CORS restricted to configured origins");
        return Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    if cfg.permits_any_origin() {
        info!(environment = %cfg.environment, "CORS accepts any origin");
        return Ok(CorsLayer::permissive());
    }

    // load_config already rejects this combination.
    anyhow::bail!("no CORS origins configured for {}", cfg.environment)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
