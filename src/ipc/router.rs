use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    tracing::debug!(id = %req.id, method = %req.method, "ipc request");

    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::hierarchy::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::readiness::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::orphans::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::diagnostics::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::consolidation::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
