use axum::{routing::get, routing::post, Router};

use crate::AppState;
use crate::http::handlers;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn uploads() -> Router<AppState> {
    Router::new()
        .route("/uploads", post(handlers::create_upload))
        .route("/uploads/:id", get(handlers::get_upload))
}

pub fn gallery() -> Router<AppState> {
    Router::new()
        .route("/gallery/:media_type", get(handlers::get_gallery))
        .route("/gallery/:media_type/newer", post(handlers::advance_newer))
        .route("/gallery/:media_type/older", post(handlers::advance_older))
        .route("/gallery/:media_type/jump", post(handlers::jump_gallery))
        .route("/gallery/:media_type/timeline", get(handlers::get_timeline))
}
