// Declare modules to be part of the library crate

pub mod config;
pub mod embedding;
pub mod error;
pub mod handlers;
pub mod models;
pub mod persistence;
pub mod state;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::ServerConfig;
pub use state::AppState;

/// All HTTP routes over the shared state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Incident reports
        .route("/reports", post(handlers::create_report))
        .route("/reports/similar", get(handlers::similar_reports))
        .route("/reports/:id", get(handlers::get_report).delete(handlers::delete_report))
        .route("/reports/:id/culprit", put(handlers::update_culprit))
        .route("/find-match", get(handlers::find_match))
        // Uploaded files
        .route("/documents", post(handlers::upload_documents))
        .route("/documents/similar", get(handlers::similar_documents))
        .route("/collections/:name/documents", get(handlers::list_documents))
        .layer(TraceLayer::new_for_http()) // Log requests/responses
        .layer(CorsLayer::permissive())
        .with_state(state)
}
