//! Table routes under `/api/:project`. The project segment is recorded in spans only.

use crate::handlers::entity::{
    complex_query, create, delete as delete_handler, list, list_tables, read_by_key, update,
    verify_password_handler,
};
use crate::handlers::procedure;
use crate::state::AppState;
use axum::{routing::get, routing::post, Router};

pub fn entity_routes() -> Router<AppState> {
    Router::new()
        .route("/api/ejecutar-procedimiento/:procedure_name", post(procedure::execute))
        .route("/api/:project/listar-entidades", get(list_tables))
        .route("/api/:project/consulta-compleja", post(complex_query))
        .route("/api/:project/:table", get(list).post(create))
        .route("/api/:project/:table/verificar-contrasena", post(verify_password_handler))
        .route(
            "/api/:project/:table/:key_name/:value",
            get(read_by_key).put(update).delete(delete_handler),
        )
}
