use super::handlers;
use super::types::{AppState, Completion, Request};
use crate::ipc::error::err;

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::sections::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::grades::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::attendance::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::cash::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::pagination::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}

/// Commits a background result if it is still wanted. Returns the event to
/// push to the shell, or `None` when the result was dropped.
pub fn apply_completion(state: &mut AppState, completion: Completion) -> Option<serde_json::Value> {
    match completion {
        Completion::CashMovements { ticket, result } => {
            handlers::cash::apply_movements(state, ticket, result)
        }
        Completion::DashboardStats { token, result } => {
            handlers::cash::apply_dashboard_stats(state, token, result)
        }
    }
}
