use super::error::HandlerErr;
use super::types::AppState;
use crate::section::SectionView;
use serde_json::Value;

pub fn get_required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn get_required_usize(params: &Value, key: &str) -> Result<usize, HandlerErr> {
    params
        .get(key)
        .and_then(Value::as_u64)
        .map(|v| v as usize)
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn get_optional_usize(params: &Value, key: &str) -> Result<Option<usize>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a positive integer", key))),
    }
}

pub fn get_optional_bool(params: &Value, key: &str, default: bool) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Free-form input as typed: strings pass through, numbers are rendered,
/// null and missing read as empty.
pub fn get_raw_input(params: &Value, key: &str) -> Result<String, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be a string or number",
            key
        ))),
    }
}

pub fn selected_section(state: &AppState) -> Result<&SectionView, HandlerErr> {
    state
        .section
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_section", "Seleccione una sección"))
}

pub fn selected_section_mut(state: &mut AppState) -> Result<&mut SectionView, HandlerErr> {
    state
        .section
        .as_mut()
        .ok_or_else(|| HandlerErr::new("no_section", "Seleccione una sección"))
}
