//! HTTP surface for the admin back-office, the public pages and the browser extension.

pub mod error;
pub mod handlers;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::{AppState, Collaborators};

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use hyper::Server;
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Builds the router with every route attached to `state`.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Catalog
        .route("/api/actors", get(handlers::list_actors).post(handlers::create_actor))
        .route(
            "/api/actors/:id",
            get(handlers::get_actor)
                .put(handlers::update_actor)
                .delete(handlers::delete_actor),
        )
        .route("/api/events", get(handlers::list_events).post(handlers::create_event))
        .route(
            "/api/events/:id",
            get(handlers::get_event)
                .put(handlers::update_event)
                .delete(handlers::delete_event),
        )
        .route("/api/bulk-delete", post(handlers::bulk_delete))
        // Ingestion
        .route("/api/scrape-events", post(handlers::scrape_events))
        .route("/api/clean-scraped-events", post(handlers::clean_scraped_events))
        .route("/api/extract", post(handlers::extract))
        .route("/api/extract/default-instructions", get(handlers::default_instructions))
        .route("/api/import-events", post(handlers::import_events))
        .route("/api/extract-facebook-event", post(handlers::extract_facebook_event))
        .route("/api/fetch-url", post(handlers::fetch_url))
        .route("/api/chrome-extension/import-event", post(handlers::import_extension_event))
        // Schedules and review
        .route(
            "/api/scraping-configs",
            get(handlers::list_configs).post(handlers::create_config),
        )
        .route(
            "/api/scraping-configs/:id",
            get(handlers::get_config)
                .put(handlers::update_config)
                .delete(handlers::delete_config),
        )
        .route("/api/scraping-configs/:id/run", post(handlers::run_config))
        .route("/api/scraped-events-pending", get(handlers::list_pending))
        .route("/api/scraped-events-pending/:id/validate", post(handlers::validate_pending))
        .route("/api/scraped-events-pending/:id/reject", post(handlers::reject_pending))
        // Collaborators and publication
        .route("/api/geocode", get(handlers::geocode_get).post(handlers::geocode_post))
        .route("/api/github-commit", post(handlers::github_commit))
        .route("/api/publish/:kind", post(handlers::publish))
        .route("/api/openai", post(handlers::openai))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(cors))
}

/// Serves the router on `0.0.0.0:port` until the process stops.
pub async fn start_server(state: AppState, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!("🚀 HTTP server running on http://localhost:{port}");
    info!("💚 Health check: http://localhost:{port}/health");

    Server::bind(&addr).serve(app.into_make_service()).await?;
    Ok(())
}
