//! Cash-session movements and dashboard statistics.
//!
//! Both load on worker threads. A movements result is committed only if its
//! ticket is still the current one; a dashboard result only if its token is
//! live and still the one the open dashboard is waiting on.

use crate::api::{ApiError, CashMovement};
use crate::guard::{CancelToken, Ticket};
use crate::ipc::error::{event, ok, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Completion, Request};
use serde_json::json;
use tracing::{debug, info, warn};

fn spawn_movements(state: &mut AppState, ticket: Ticket<String>) -> Result<(), HandlerErr> {
    let backend = state.backend.clone();
    state
        .jobs
        .spawn("cash-movements", move || {
            let result = backend.cash_movements(ticket.selector());
            Completion::CashMovements { ticket, result }
        })
        .map_err(|e| HandlerErr::new("api_error", format!("could not start load: {}", e)))
}

fn select_session(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let ticket = state.cash.guard.select(session_id.clone());
    // Movements of the previous session must not linger under the new one.
    if state.cash.loaded_for.as_deref() != Some(session_id.as_str()) {
        state.cash.movements.clear();
        state.cash.loaded_for = None;
    }
    let generation = ticket.generation();
    spawn_movements(state, ticket)?;
    debug!(session_id = %session_id, generation, "cash movements load started");
    Ok(json!({ "sessionId": session_id, "loading": true }))
}

fn movements(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let reload = params
        .get("reload")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false);
    if reload {
        let ticket = state
            .cash
            .guard
            .reload()
            .ok_or_else(|| HandlerErr::new("no_session", "Seleccione una sesión de caja"))?;
        spawn_movements(state, ticket)?;
    }
    Ok(json!({
        "sessionId": state.cash.guard.current(),
        "loadedFor": state.cash.loaded_for,
        "loading": reload || state.cash.loaded_for.as_ref() != state.cash.guard.current(),
        "movements": state.cash.movements,
    }))
}

fn dashboard_open(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    if let Some(prev) = state.dashboard.token.take() {
        prev.cancel();
    }
    let token = CancelToken::new();
    state.dashboard.token = Some(token.clone());
    let backend = state.backend.clone();
    state
        .jobs
        .spawn("dashboard-stats", move || {
            let result = backend.dashboard_stats();
            Completion::DashboardStats { token, result }
        })
        .map_err(|e| HandlerErr::new("api_error", format!("could not start load: {}", e)))?;
    Ok(json!({ "loading": true }))
}

fn dashboard_close(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let cancelled = match state.dashboard.token.take() {
        Some(token) => {
            token.cancel();
            info!("dashboard closed, stats load cancelled");
            true
        }
        None => false,
    };
    Ok(json!({ "closed": true, "cancelled": cancelled }))
}

fn dashboard_stats(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({
        "open": state.dashboard.token.is_some(),
        "stats": state.dashboard.stats,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "cash.selectSession" => select_session(state, &req.params),
        "cash.movements" => movements(state, &req.params),
        "dashboard.open" => dashboard_open(state),
        "dashboard.close" => dashboard_close(state),
        "dashboard.stats" => dashboard_stats(state),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}

fn failure_event(source: &str, e: &ApiError) -> serde_json::Value {
    event(
        "notification",
        json!({
            "level": "error",
            "source": source,
            "message": e.to_string(),
            "status": e.status(),
        }),
    )
}

pub fn apply_movements(
    state: &mut AppState,
    ticket: Ticket<String>,
    result: Result<Vec<CashMovement>, ApiError>,
) -> Option<serde_json::Value> {
    if !state.cash.guard.is_current(&ticket) {
        debug!(
            session_id = %ticket.selector(),
            generation = ticket.generation(),
            "stale cash movements discarded"
        );
        return None;
    }
    match result {
        Ok(movements) => {
            info!(session_id = %ticket.selector(), count = movements.len(), "cash movements loaded");
            state.cash.movements = movements;
            state.cash.loaded_for = Some(ticket.selector().clone());
            Some(event(
                "cash.movementsLoaded",
                json!({
                    "sessionId": ticket.selector(),
                    "movements": state.cash.movements,
                }),
            ))
        }
        Err(e) => {
            warn!(session_id = %ticket.selector(), error = %e, "cash movements load failed");
            Some(failure_event("cash.movements", &e))
        }
    }
}

pub fn apply_dashboard_stats(
    state: &mut AppState,
    token: CancelToken,
    result: Result<serde_json::Value, ApiError>,
) -> Option<serde_json::Value> {
    let wanted = state
        .dashboard
        .token
        .as_ref()
        .map(|current| current.same_as(&token))
        .unwrap_or(false);
    if token.is_cancelled() || !wanted {
        debug!("cancelled dashboard stats discarded");
        return None;
    }
    match result {
        Ok(stats) => {
            state.dashboard.stats = Some(stats);
            Some(event(
                "dashboard.statsLoaded",
                json!({ "stats": state.dashboard.stats }),
            ))
        }
        Err(e) => {
            warn!(error = %e, "dashboard stats load failed");
            Some(failure_event("dashboard.stats", &e))
        }
    }
}
