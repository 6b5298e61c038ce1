use serde_json::Value;
use thiserror::Error;

pub const GENERIC_MESSAGE: &str = "Error en la solicitud";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("{message}")]
    Status { status: u16, message: String },
    #[error("{0}")]
    Transport(String),
    #[error("respuesta inválida del servidor: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Builds the error for a failed response from its raw body.
    pub fn from_body(status: u16, body: &str) -> Self {
        let message = match serde_json::from_str::<Value>(body) {
            Ok(v) => extract_message(&v),
            Err(_) => {
                let t = body.trim();
                (!t.is_empty() && !t.starts_with('<')).then(|| t.to_string())
            }
        };
        ApiError::Status {
            status,
            message: message.unwrap_or_else(|| format!("{GENERIC_MESSAGE} (HTTP {status})")),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

/// Human-readable message from the common error body shapes:
/// `detail` (string or list of `{loc, msg}`), `error.message`, `message`,
/// `error` as a string, then a per-field map such as `{"date": ["..."]}`.
pub fn extract_message(body: &Value) -> Option<String> {
    if let Some(s) = body.as_str() {
        return non_empty(s);
    }
    let obj = body.as_object()?;

    match obj.get("detail") {
        Some(Value::String(s)) => {
            if let Some(m) = non_empty(s) {
                return Some(m);
            }
        }
        Some(Value::Array(items)) => {
            let msgs: Vec<String> = items.iter().filter_map(detail_item_message).collect();
            if !msgs.is_empty() {
                return Some(msgs.join(" | "));
            }
        }
        _ => {}
    }

    if let Some(m) = obj
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .and_then(non_empty)
    {
        return Some(m);
    }
    if let Some(m) = obj.get("message").and_then(Value::as_str).and_then(non_empty) {
        return Some(m);
    }
    if let Some(m) = obj.get("error").and_then(Value::as_str).and_then(non_empty) {
        return Some(m);
    }

    let fields: Vec<String> = obj
        .iter()
        .filter_map(|(k, v)| field_text(v).map(|t| format!("{k}: {t}")))
        .collect();
    (!fields.is_empty()).then(|| fields.join(" | "))
}

fn detail_item_message(item: &Value) -> Option<String> {
    if let Some(s) = item.as_str() {
        return non_empty(s);
    }
    let msg = item.get("msg").and_then(Value::as_str).and_then(non_empty)?;
    let field = match item.get("loc") {
        Some(Value::Array(parts)) => {
            let joined = parts
                .iter()
                .map(|p| match p {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(".");
            non_empty(&joined)
        }
        Some(Value::String(s)) => non_empty(s),
        _ => None,
    };
    Some(match field {
        Some(f) => format!("{f}: {msg}"),
        None => msg,
    })
}

fn field_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|i| match i {
                    Value::String(s) => non_empty(s),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect();
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}
