use super::error::ApiError;
use super::types::{
    AttendanceRow, AttendanceSessionSummary, CashMovement, DocumentResponse, GradeSheet,
    ImportPreview, Section, Student, TaskStatus,
};
use super::{decode_list, Backend};
use crate::config::Config;
use crate::grading::GradeMap;
use chrono::NaiveDate;
use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, info, warn};

const REFRESH_PATH: &str = "/auth/token/refresh/";
const LIST_KEYS: [&str; 2] = ["items", "results"];

#[derive(Debug, Default, Clone)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

/// `reqwest` blocking client against `{backend}/api`.
pub struct HttpBackend {
    client: Client,
    backend_url: String,
    api_base: String,
    tokens: RwLock<Tokens>,
}

impl HttpBackend {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .user_agent(concat!("academicd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            backend_url: config.backend_url.clone(),
            api_base: config.api_base(),
            tokens: RwLock::new(Tokens {
                access: config.access_token.clone(),
                refresh: config.refresh_token.clone(),
            }),
        })
    }

    fn tokens(&self) -> Tokens {
        self.tokens
            .read()
            .map(|t| t.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// `path` is relative to the API base; a leading `/api` is tolerated.
    fn api_url(&self, path: &str) -> String {
        let p = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let clean = p.strip_prefix("/api").filter(|r| r.starts_with('/')).unwrap_or(&p);
        format!("{}{}", self.api_base, clean)
    }

    /// Status and download URLs may come back relative to the server root.
    fn absolute_url(&self, url_or_path: &str) -> String {
        let lower = url_or_path.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return url_or_path.to_string();
        }
        if url_or_path.starts_with('/') {
            format!("{}{}", self.backend_url, url_or_path)
        } else {
            format!("{}/{}", self.backend_url, url_or_path)
        }
    }

    fn authorized(&self, rb: RequestBuilder) -> RequestBuilder {
        match self.tokens().access {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// Sends the request built by `build`; on a 401 refreshes the access
    /// token once and replays a freshly built request.
    fn send<F>(&self, label: &str, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> Result<RequestBuilder, ApiError>,
    {
        debug!(request = label, "backend call");
        let resp = self.authorized(build()?).send()?;
        if resp.status() != StatusCode::UNAUTHORIZED || label.contains(REFRESH_PATH) {
            return Ok(resp);
        }
        match self.refresh_access() {
            Ok(true) => {
                info!(request = label, "access token refreshed, retrying once");
                Ok(self.authorized(build()?).send()?)
            }
            Ok(false) => Ok(resp),
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                Ok(resp)
            }
        }
    }

    fn refresh_access(&self) -> Result<bool, ApiError> {
        let Some(refresh) = self.tokens().refresh else {
            return Ok(false);
        };
        let resp = self
            .client
            .post(self.api_url(REFRESH_PATH))
            .json(&json!({ "refresh": refresh }))
            .send()?;
        let body = read_json(resp)?;
        let Some(access) = body.get("access").and_then(Value::as_str) else {
            return Ok(false);
        };
        let mut guard = self
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.access = Some(access.to_string());
        Ok(true)
    }

    fn call(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let url = self.api_url(path);
        let label = format!("{method} {path}");
        let resp = self.send(&label, || {
            let rb = self.client.request(method.clone(), &url);
            Ok(match body {
                Some(b) => rb.json(b),
                None => rb,
            })
        })?;
        read_json(resp)
    }

    fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.call(Method::GET, path, None)
    }

    fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.call(Method::POST, path, Some(body))
    }

    fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.call(Method::PUT, path, Some(body))
    }
}

fn read_json(resp: Response) -> Result<Value, ApiError> {
    let status = resp.status();
    let text = resp.text()?;
    if !status.is_success() {
        return Err(ApiError::from_body(status.as_u16(), &text));
    }
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

fn read_bytes(resp: Response) -> Result<Vec<u8>, ApiError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().unwrap_or_default();
        return Err(ApiError::from_body(status.as_u16(), &text));
    }
    Ok(resp.bytes()?.to_vec())
}

/// `{session: {...}}` or the session object itself.
fn unwrap_session(data: Value) -> Result<AttendanceSessionSummary, ApiError> {
    let inner = match data {
        Value::Object(mut obj) if obj.contains_key("session") => {
            obj.remove("session").unwrap_or(Value::Null)
        }
        other => other,
    };
    Ok(serde_json::from_value(inner)?)
}

fn keys<'a>(primary: &'a str) -> [&'a str; 3] {
    [primary, LIST_KEYS[0], LIST_KEYS[1]]
}

impl Backend for HttpBackend {
    fn teacher_sections(&self, teacher_id: &str) -> Result<Vec<Section>, ApiError> {
        let data = self.get(&format!("/teachers/{teacher_id}/sections"))?;
        Ok(decode_list(data, &keys("sections")))
    }

    fn section_students(&self, section_id: &str) -> Result<Vec<Student>, ApiError> {
        let data = self.get(&format!("/sections/{section_id}/students"))?;
        Ok(decode_list(data, &keys("students")))
    }

    fn fetch_grades(&self, section_id: &str) -> Result<GradeSheet, ApiError> {
        let data = self.get(&format!("/sections/{section_id}/grades"))?;
        if data.is_null() {
            return Ok(GradeSheet::default());
        }
        Ok(serde_json::from_value(data)?)
    }

    fn save_grades(&self, section_id: &str, grades: &GradeMap) -> Result<(), ApiError> {
        self.post(
            "/grades/save",
            &json!({ "section_id": section_id, "grades": grades }),
        )?;
        Ok(())
    }

    fn submit_grades(
        &self,
        section_id: &str,
        grades: &GradeMap,
        idempotency_key: &str,
    ) -> Result<(), ApiError> {
        let url = self.api_url("/grades/submit");
        let body = json!({ "section_id": section_id, "grades": grades });
        let resp = self.send("POST /grades/submit", || {
            Ok(self
                .client
                .post(&url)
                .header("Idempotency-Key", idempotency_key)
                .json(&body))
        })?;
        read_json(resp)?;
        Ok(())
    }

    fn reopen_grades(&self, section_id: &str) -> Result<(), ApiError> {
        self.post("/grades/reopen", &json!({ "section_id": section_id }))?;
        Ok(())
    }

    fn create_attendance_session(
        &self,
        section_id: &str,
        date: NaiveDate,
    ) -> Result<AttendanceSessionSummary, ApiError> {
        let data = self.post(
            &format!("/sections/{section_id}/attendance/sessions"),
            &json!({ "date": date.format("%Y-%m-%d").to_string() }),
        )?;
        unwrap_session(data)
    }

    fn list_attendance_sessions(
        &self,
        section_id: &str,
    ) -> Result<Vec<AttendanceSessionSummary>, ApiError> {
        let data = self.get(&format!("/sections/{section_id}/attendance/sessions"))?;
        Ok(decode_list(data, &keys("sessions")))
    }

    fn set_attendance_rows(
        &self,
        section_id: &str,
        session_id: &str,
        rows: &[AttendanceRow],
    ) -> Result<(), ApiError> {
        self.put(
            &format!("/sections/{section_id}/attendance/sessions/{session_id}"),
            &json!({ "rows": rows }),
        )?;
        Ok(())
    }

    fn close_attendance_session(&self, section_id: &str, session_id: &str) -> Result<(), ApiError> {
        self.post(
            &format!("/sections/{section_id}/attendance/sessions/{session_id}/close"),
            &json!({}),
        )?;
        Ok(())
    }

    fn preview_attendance_import(
        &self,
        section_id: &str,
        file: &Path,
    ) -> Result<ImportPreview, ApiError> {
        let url = self.api_url("/attendance/import/preview");
        let resp = self.send("POST /attendance/import/preview", || {
            let form = multipart::Form::new()
                .text("section_id", section_id.to_string())
                .file("file", file)
                .map_err(|e| {
                    ApiError::Transport(format!("cannot read {}: {e}", file.to_string_lossy()))
                })?;
            Ok(self.client.post(&url).multipart(form))
        })?;
        let data = read_json(resp)?;
        if data.is_null() {
            return Ok(ImportPreview::default());
        }
        Ok(serde_json::from_value(data)?)
    }

    fn save_attendance_import(&self, section_id: &str, rows: &[Value]) -> Result<(), ApiError> {
        self.post(
            "/attendance/import/save",
            &json!({ "section_id": section_id, "attendance_data": rows }),
        )?;
        Ok(())
    }

    fn cash_movements(&self, cash_session_id: &str) -> Result<Vec<CashMovement>, ApiError> {
        let data = self.get(&format!(
            "/finance/cashbanks/sessions/{cash_session_id}/movements"
        ))?;
        Ok(decode_list(data, &keys("movements")))
    }

    fn dashboard_stats(&self) -> Result<Value, ApiError> {
        let data = self.get("/finance/dashboard/stats")?;
        Ok(match data {
            Value::Object(mut obj) if obj.get("stats").map(Value::is_object).unwrap_or(false) => {
                obj.remove("stats").unwrap_or(Value::Null)
            }
            Value::Null => json!({}),
            other => other,
        })
    }

    fn request_document(&self, path: &str) -> Result<DocumentResponse, ApiError> {
        let url = self.api_url(path);
        let resp = self.send(&format!("POST {path}"), || {
            Ok(self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/json"))
        })?;
        let status = resp.status();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if status == StatusCode::ACCEPTED {
            let body = read_json(resp)?;
            let status_url = body
                .get("statusUrl")
                .or_else(|| body.get("status_url"))
                .and_then(Value::as_str)
                .ok_or_else(|| ApiError::Decode("202 without statusUrl".to_string()))?;
            return Ok(DocumentResponse::Pending {
                status_url: status_url.to_string(),
            });
        }
        if status.is_success()
            && (content_type.contains("application/pdf")
                || content_type.contains("application/octet-stream"))
        {
            return Ok(DocumentResponse::Bytes(resp.bytes()?.to_vec()));
        }
        Ok(DocumentResponse::Json(read_json(resp)?))
    }

    fn task_status(&self, status_url: &str) -> Result<TaskStatus, ApiError> {
        let url = self.absolute_url(status_url);
        let resp = self.send(&format!("GET {status_url}"), || {
            Ok(self.client.get(&url).header(ACCEPT, "application/json"))
        })?;
        let data = read_json(resp)?;
        Ok(serde_json::from_value(data)?)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let abs = self.absolute_url(url);
        let resp = self.send(&format!("GET {url}"), || Ok(self.client.get(&abs)))?;
        read_bytes(resp)
    }

    fn set_tokens(&self, access: Option<String>, refresh: Option<String>) {
        let mut guard = self
            .tokens
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.access = access;
        guard.refresh = refresh;
    }
}
