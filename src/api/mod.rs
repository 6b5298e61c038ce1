//! Client side of the school REST API.
//!
//! Everything the daemon needs from the server goes through [`Backend`], so
//! view state can be driven against an in-memory implementation in tests.

mod error;
pub mod http;
mod types;

pub use error::{extract_message, ApiError, GENERIC_MESSAGE};
pub use http::HttpBackend;
pub use types::{
    id_string, AttendanceRow, AttendanceSessionSummary, AttendanceStatus, CashMovement,
    DocumentResponse, GradeSheet, ImportPreview, ImportRowError, Section, Student, TaskStatus,
};

use crate::grading::GradeMap;
use chrono::NaiveDate;
use serde_json::Value;
use std::path::Path;

pub trait Backend: Send + Sync {
    fn teacher_sections(&self, teacher_id: &str) -> Result<Vec<Section>, ApiError>;
    fn section_students(&self, section_id: &str) -> Result<Vec<Student>, ApiError>;

    fn fetch_grades(&self, section_id: &str) -> Result<GradeSheet, ApiError>;
    /// Draft save; does not lock the section.
    fn save_grades(&self, section_id: &str, grades: &GradeMap) -> Result<(), ApiError>;
    /// Final submission; the section is locked on success.
    fn submit_grades(
        &self,
        section_id: &str,
        grades: &GradeMap,
        idempotency_key: &str,
    ) -> Result<(), ApiError>;
    fn reopen_grades(&self, section_id: &str) -> Result<(), ApiError>;

    fn create_attendance_session(
        &self,
        section_id: &str,
        date: NaiveDate,
    ) -> Result<AttendanceSessionSummary, ApiError>;
    fn list_attendance_sessions(
        &self,
        section_id: &str,
    ) -> Result<Vec<AttendanceSessionSummary>, ApiError>;
    fn set_attendance_rows(
        &self,
        section_id: &str,
        session_id: &str,
        rows: &[AttendanceRow],
    ) -> Result<(), ApiError>;
    fn close_attendance_session(&self, section_id: &str, session_id: &str) -> Result<(), ApiError>;

    fn preview_attendance_import(&self, section_id: &str, file: &Path)
        -> Result<ImportPreview, ApiError>;
    fn save_attendance_import(&self, section_id: &str, rows: &[Value]) -> Result<(), ApiError>;

    fn cash_movements(&self, cash_session_id: &str) -> Result<Vec<CashMovement>, ApiError>;
    fn dashboard_stats(&self) -> Result<Value, ApiError>;

    /// `POST` to a document endpoint relative to the API base.
    fn request_document(&self, path: &str) -> Result<DocumentResponse, ApiError>;
    fn task_status(&self, status_url: &str) -> Result<TaskStatus, ApiError>;
    fn download(&self, url: &str) -> Result<Vec<u8>, ApiError>;

    fn set_tokens(&self, _access: Option<String>, _refresh: Option<String>) {}
}

/// List endpoints answer either a bare array or an object wrapping one.
pub fn pick_first_array(data: Value, keys: &[&str]) -> Vec<Value> {
    match data {
        Value::Array(items) => items,
        Value::Object(mut obj) => keys
            .iter()
            .find_map(|k| match obj.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Decodes each element, skipping ones that do not fit the expected shape.
pub fn decode_list<T: serde::de::DeserializeOwned>(data: Value, keys: &[&str]) -> Vec<T> {
    pick_first_array(data, keys)
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<T>(v) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed list item");
                None
            }
        })
        .collect()
}
