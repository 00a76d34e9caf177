//! Web server module.

mod handlers;

pub use handlers::*;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{HeaderName, CONTENT_TYPE};
use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::db::Store;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

/// Build the API router.
pub fn router(store: Arc<Store>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, HeaderName::from_static("idempotency-key")]);

    Router::new()
        .route("/v1/targets", post(handlers::handle_create_target))
        .route("/v1/targets", get(handlers::handle_list_targets))
        .route(
            "/v1/targets/{target_id}/results",
            get(handlers::handle_get_results),
        )
        .route("/healthz", get(handlers::handle_healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { store })
}

/// API server for Linkwatch.
pub struct Server {
    port: u16,
    shutdown_grace: Duration,
    store: Arc<Store>,
}

impl Server {
    pub fn new(port: u16, shutdown_grace: Duration, store: Arc<Store>) -> Self {
        Self {
            port,
            shutdown_grace,
            store,
        }
    }

    /// Serve until `shutdown` fires, then drain open connections within the
    /// grace period.
    pub async fn start(
        &self,
        shutdown: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = router(self.store.clone());

        tracing::info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let signal = shutdown.clone();
        let serve = async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        };

        let grace = self.shutdown_grace;
        tokio::select! {
            result = serve => result?,
            _ = async {
                shutdown.cancelled().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!("shutdown grace period elapsed; aborting open connections");
            }
        }

        Ok(())
    }
}
