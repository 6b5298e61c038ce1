use crate::acta::ActaError;
use crate::api::ApiError;
use crate::attendance::AttendanceError;
use crate::grading::GradeError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

/// Unsolicited line pushed to the shell when background work lands.
pub fn event(name: &str, data: serde_json::Value) -> serde_json::Value {
    json!({
        "event": name,
        "data": data,
    })
}

#[derive(Debug)]
pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<ApiError> for HandlerErr {
    fn from(e: ApiError) -> Self {
        let details = e.status().map(|s| json!({ "status": s }));
        Self {
            code: "api_error",
            message: e.to_string(),
            details,
        }
    }
}

impl From<GradeError> for HandlerErr {
    fn from(e: GradeError) -> Self {
        match e {
            GradeError::Incomplete { ref student_ids } => {
                let details = json!({ "studentIds": student_ids });
                HandlerErr::new("validation_failed", e.to_string()).with_details(details)
            }
            GradeError::CompetencyOutOfRange(_) => {
                HandlerErr::bad_params(e.to_string())
            }
        }
    }
}

impl From<AttendanceError> for HandlerErr {
    fn from(e: AttendanceError) -> Self {
        match e {
            AttendanceError::Api(api) => api.into(),
            AttendanceError::NoSession => HandlerErr::new("no_session", e.to_string()),
            AttendanceError::SessionClosed(_) => HandlerErr::new("session_closed", e.to_string()),
            AttendanceError::UnknownStudent(_) => HandlerErr::new("not_found", e.to_string()),
        }
    }
}

impl From<ActaError> for HandlerErr {
    fn from(e: ActaError) -> Self {
        match e {
            ActaError::Api(api) => api.into(),
            other => HandlerErr::new("acta_failed", other.to_string()),
        }
    }
}
