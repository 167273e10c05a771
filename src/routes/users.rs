//! Account routes.

use crate::handlers::users::{login, register};
use crate::state::AppState;
use axum::{routing::post, Router};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ControladorUsuarios/registrar", post(register))
        .route("/api/ControladorUsuarios/login", post(login))
}
