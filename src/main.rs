use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use http::{HeaderValue, Method, header};
use secrecy::ExposeSecret;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shakergate::{
    config::Config, handlers, repositories::ActiveTokenStore, state::AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    if let Err(e) = run().await {
        tracing::error!(error = ?e, "起動または実行中に失敗");
        return Err(e);
    }

    tracing::info!("サーバー終了");
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "shakergate 起動中...");

    let config = Config::load().context("failed to load config from environment")?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let cors = cors_layer(config.cors_allowed_origin.as_deref())?;
    let cleanup_every = Duration::from_secs(config.token_cleanup_interval_secs.max(1));

    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url.expose_secret())
        .await
        .context("failed to connect to database")?;
    tracing::info!("データベース接続完了");

    let state = AppState::new(db_pool, config);
    tokio::spawn(purge_expired_tokens(state.clone(), cleanup_every));

    let app = router(state).layer(cors);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "サーバー起動");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

/// tracing の初期化（JSON形式、RUST_LOG で上書き可）
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shakergate=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health_check))
        .route(
            "/api/password/reset-request",
            post(handlers::request_password_reset),
        )
        .route("/api/password/reset", post(handlers::reset_password))
        .route("/api/otp/request", post(handlers::request_otp))
        .route("/api/otp/verify", post(handlers::verify_otp))
        .with_state(state)
}

/// CORS 設定（ゲームUIのオリジンのみ許可）
///
/// オリジン未設定時はクロスオリジンリクエストを許可しない
fn cors_layer(allowed_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let Some(origin) = allowed_origin else {
        return Ok(layer);
    };
    let origin = HeaderValue::from_str(origin)
        .with_context(|| format!("invalid CORS_ALLOWED_ORIGIN: {origin}"))?;
    tracing::info!(origin = ?origin, "CORS 許可オリジンを設定");

    Ok(layer.allow_origin(origin))
}

/// 期限切れトークンを定期的に削除
async fn purge_expired_tokens(state: AppState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match state.token_repo.delete_expired(state.clock.now()).await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "期限切れトークンを削除"),
            Err(e) => tracing::warn!(error = ?e, "期限切れトークンの削除に失敗"),
        }
    }
}

/// Ctrl+C / SIGTERM を待つ
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = ?e, "Ctrl+C ハンドラーのインストールに失敗");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => tracing::error!(error = ?e, "SIGTERM ハンドラーのインストールに失敗"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let source = tokio::select! {
        _ = ctrl_c => "ctrl_c",
        _ = terminate => "sigterm",
    };
    tracing::info!(signal = source, "シャットダウン開始");
}
