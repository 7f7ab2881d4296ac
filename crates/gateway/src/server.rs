use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        middleware,
        response::{IntoResponse, Response},
        routing::{get, post},
    },
    serde_json::json,
    tower_http::cors::{Any, CorsLayer},
    tracing::info,
};

use {
    waygate_config::WaygateConfig,
    waygate_otp::{OtpService, SqliteOtpStore},
    waygate_sessions::{
        ControllerOptions, CredentialStore, LogSink, ReconnectPolicy, SessionController,
        SessionRegistry,
    },
    waygate_transport::{ClientIdentity, TransportProvider},
};

use crate::{
    auth, envelope,
    envelope::ok,
    messages, otp, sessions,
    state::AppState,
};

// ── Router ───────────────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route(
            "/sessions/{session_id}",
            get(sessions::status).post(sessions::create),
        )
        .route("/sessions/{session_id}/chats", get(sessions::chats))
        .route("/sessions/{session_id}/logout", post(sessions::logout))
        .route("/send", post(messages::send))
        .route("/otp/generate", post(otp::generate))
        .route("/otp/verify", post(otp::verify))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

// ── Startup ──────────────────────────────────────────────────────────────────

/// Assemble the application state over an injected transport provider.
pub async fn build_state(
    config: WaygateConfig,
    provider: Arc<dyn TransportProvider>,
) -> anyhow::Result<AppState> {
    let creds = CredentialStore::new(&config.sessions.root_dir);
    let registry = Arc::new(SessionRegistry::new());
    let controller = SessionController::new(
        provider,
        Arc::clone(&registry),
        creds.clone(),
        ReconnectPolicy::new(config.sessions.max_retries),
        Arc::new(LogSink),
        ControllerOptions {
            identity: ClientIdentity::new(config.sessions.client_name.clone()),
            reconnect_interval: config.sessions.reconnect_interval(),
        },
    );
    let otp = Arc::new(OtpService::new(
        SqliteOtpStore::open(&config.otp.db_path).await?,
    ));

    Ok(AppState {
        config: Arc::new(config),
        controller,
        registry,
        creds,
        otp,
    })
}

/// Start the gateway: rehydrate persisted sessions, serve HTTP, and flush
/// chat metadata on shutdown.
pub async fn start_gateway(
    config: WaygateConfig,
    provider: Arc<dyn TransportProvider>,
) -> anyhow::Result<()> {
    let bind = config.server.bind.clone();
    let port = config.server.port;
    let state = build_state(config, provider).await?;

    let rehydrated = state.controller.rehydrate().await?;

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        rehydrated,
        "waygate gateway listening"
    );

    let controller = Arc::clone(&state.controller);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal(controller))
        .await?;
    Ok(())
}

/// Resolves on SIGINT/SIGTERM, after the chat snapshot flush completes.
async fn shutdown_signal(controller: Arc<SessionController>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown requested, flushing session metadata");
    controller.flush_metadata().await;
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn health() -> Response {
    ok(
        "PONG",
        json!({ "date": std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64 }),
    )
}

async fn not_found() -> Response {
    envelope::ApiError::not_found().into_response()
}
