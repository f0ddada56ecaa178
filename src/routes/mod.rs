pub mod auth;
pub mod pages;
pub mod posts;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router. All shared dependencies come in
/// through `state`; nothing is process-global.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::home))
        .route("/profile", get(pages::profile))
        .merge(auth::router())
        .merge(posts::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
