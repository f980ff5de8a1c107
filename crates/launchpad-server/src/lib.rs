pub mod error;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use launchpad_core::Platform;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(platform: Platform) -> Router {
    let app_state = state::AppState::new(platform);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Services
        .route("/api/services", get(routes::services::list_services))
        .route("/api/services", post(routes::services::create_service))
        .route(
            "/api/services/{name}/dashboard",
            get(routes::services::get_dashboard),
        )
        .route(
            "/api/services/{name}/environments",
            get(routes::services::get_environments),
        )
        .route(
            "/api/services/{name}/artifacts",
            get(routes::services::list_artifacts),
        )
        .route(
            "/api/services/{name}/deploy",
            post(routes::services::deploy_service),
        )
        .route(
            "/api/services/{name}/rollback",
            post(routes::services::rollback_service),
        )
        // Artifacts
        .route("/api/artifacts", post(routes::artifacts::register_artifact))
        // Approvals
        .route("/api/approvals", get(routes::approvals::list_approvals))
        .route(
            "/api/approvals/{id}/approve",
            post(routes::approvals::approve),
        )
        .route(
            "/api/approvals/{id}/reject",
            post(routes::approvals::reject),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the HTTP API on `bind:port`.
pub async fn serve(platform: Platform, bind: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    serve_on(platform, listener).await
}

/// Start the HTTP API on a pre-bound listener.
///
/// Lets the caller read the actual port before starting (useful when
/// `port = 0` and the OS picks a free port).
pub async fn serve_on(platform: Platform, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(platform);

    tracing::info!(%addr, "launchpad API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
