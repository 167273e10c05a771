//! Router assembly: common, account and table routes behind tracing, CORS and a body limit.

mod common;
mod entity;
mod users;

pub use common::common_routes;
pub use entity::entity_routes;
pub use users::user_routes;

use crate::state::AppState;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Full application router with state and middleware applied.
pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // The body limit sits outermost: its response body does not implement `Default`, which CORS needs.
    let middleware = ServiceBuilder::new()
        .layer(RequestBodyLimitLayer::new(state.settings.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    Router::new()
        .merge(common_routes())
        .merge(user_routes())
        .merge(entity_routes())
        .layer(middleware)
        .with_state(state)
}
