//! HomeCare Server - care workflow HTTP and real-time API
//!
//! Wires the decide phase of `workflow-engine` to a `CareStore` and the
//! `events-bus`: every mutating request loads current state, asks the engine
//! for a decision, commits it atomically with its audit records and only
//! then notifies connected clients.

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod services;

pub use config::AppConfig;
pub use error::*;
pub use server::HomeCareServer;

use axum::{middleware::from_fn, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Create the main application router with all routes and middleware
pub fn create_app(server: HomeCareServer) -> Router {
    let cors = middleware::create_cors_layer(&server.config.server.cors_origins);

    routes::create_routes()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(from_fn(middleware::request_timing_middleware)),
        )
        .with_state(server)
}
