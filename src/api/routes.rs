//! API Routes
//!
//! Configures the Axum router with the admin endpoints.

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{clients_handler, health_handler, holders_handler, stats_handler, AppState};

/// Creates the admin router.
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/clients", get(clients_handler))
        .route("/holders/:key", get(holders_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::network::local::LocalHub;
    use crate::server::CacheServer;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn test_health_endpoint() {
        let server = CacheServer::new(ServerConfig::new("ciao"));
        let app = create_router(AppState::new(server.handle()));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stats_endpoint_unavailable_after_stop() {
        let server = CacheServer::new(ServerConfig::new("ciao"));
        server.stop().await;
        let app = create_router(AppState::new(server.handle()));

        let response = app
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_holders_endpoint() {
        let server = CacheServer::new(ServerConfig::new("ciao"));
        server.start(LocalHub::new().acceptor()).await;
        let app = create_router(AppState::new(server.handle()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/holders/pippo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        server.stop().await;
    }
}
