use crate::capabilities::Capabilities;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::get_optional_str;
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "apiBase": state.config.api_base(),
            "sectionId": state.section.as_ref().map(|s| s.id().to_string()),
        }),
    )
}

fn handle_auth_set_tokens(state: &mut AppState, req: &Request) -> serde_json::Value {
    let access = get_optional_str(&req.params, "access");
    let refresh = get_optional_str(&req.params, "refresh");
    let has_access = access.is_some();
    let has_refresh = refresh.is_some();
    state.backend.set_tokens(access, refresh);
    info!(has_access, has_refresh, "tokens updated");
    ok(
        &req.id,
        json!({ "hasAccess": has_access, "hasRefresh": has_refresh }),
    )
}

fn string_list(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()),
        Some(_) => Err(HandlerErr::bad_params(format!("{} must be an array", key))),
    }
}

fn handle_auth_set_capabilities(state: &mut AppState, req: &Request) -> serde_json::Value {
    let parsed = string_list(&req.params, "permissions")
        .and_then(|p| string_list(&req.params, "roles").map(|r| (p, r)));
    let (permissions, roles) = match parsed {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    state.capabilities = Capabilities::new(permissions, roles);
    ok(
        &req.id,
        json!({
            "capabilities": state.capabilities,
            "canReopenGrades": state.capabilities.can_reopen_grades(),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "auth.setTokens" => Some(handle_auth_set_tokens(state, req)),
        "auth.setCapabilities" => Some(handle_auth_set_capabilities(state, req)),
        _ => None,
    }
}
