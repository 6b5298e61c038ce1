//! Acta (grade record) PDF and QR generation after a grade submission.
//!
//! The server either answers with the document directly, with a JSON body
//! that points at it, or with `202 Accepted` and a status URL to poll.
//! Failures here never undo the submission that triggered them.

use crate::api::{ApiError, Backend, DocumentResponse, Section, TaskStatus};
use crate::config::Config;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ActaError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("la generación falló: {0}")]
    Failed(String),
    #[error("tiempo de espera agotado tras {0} intentos")]
    TimedOut(u32),
    #[error("no se pudo escribir {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ActaSettings {
    pub output_dir: PathBuf,
    pub poll_attempts: u32,
    pub poll_interval: Duration,
}

impl From<&Config> for ActaSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            output_dir: cfg.output_dir.clone(),
            poll_attempts: cfg.acta_poll_attempts,
            poll_interval: cfg.acta_poll_interval,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActaReport {
    pub pdf_path: Option<String>,
    pub pdf_error: Option<String>,
    pub qr: Option<Value>,
    pub qr_error: Option<String>,
}

pub fn acta_file_name(section: &Section) -> String {
    let course = section
        .course_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("CURSO");
    format!("acta-{}-{}.pdf", sanitize(course), sanitize(&section.id))
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// PDF first; the QR is only requested once the PDF exists.
pub fn generate(backend: &dyn Backend, section: &Section, settings: &ActaSettings) -> ActaReport {
    let mut report = ActaReport::default();
    match generate_pdf(backend, section, settings) {
        Ok(path) => {
            info!(section_id = %section.id, path = %path.to_string_lossy(), "acta pdf written");
            report.pdf_path = Some(path.to_string_lossy().to_string());
        }
        Err(e) => {
            warn!(section_id = %section.id, error = %e, "acta pdf failed");
            report.pdf_error = Some(e.to_string());
            return report;
        }
    }
    match generate_qr(backend, section, settings) {
        Ok(qr) => report.qr = Some(qr),
        Err(e) => {
            warn!(section_id = %section.id, error = %e, "acta qr failed");
            report.qr_error = Some(e.to_string());
        }
    }
    report
}

pub fn generate_pdf(
    backend: &dyn Backend,
    section: &Section,
    settings: &ActaSettings,
) -> Result<PathBuf, ActaError> {
    let bytes = match backend.request_document(&format!("/sections/{}/acta", section.id))? {
        DocumentResponse::Bytes(b) => b,
        DocumentResponse::Pending { status_url } => {
            let done = poll(backend, &status_url, settings)?;
            let url = done
                .download_url
                .ok_or_else(|| ActaError::Failed("task finished without downloadUrl".into()))?;
            backend.download(&url)?
        }
        DocumentResponse::Json(body) => {
            let url = body
                .get("downloadUrl")
                .or_else(|| body.get("download_url"))
                .and_then(Value::as_str)
                .ok_or_else(|| ActaError::Failed("respuesta sin downloadUrl".into()))?;
            backend.download(url)?
        }
    };
    let path = settings.output_dir.join(acta_file_name(section));
    write_file(&path, &bytes)?;
    Ok(path)
}

pub fn generate_qr(
    backend: &dyn Backend,
    section: &Section,
    settings: &ActaSettings,
) -> Result<Value, ActaError> {
    match backend.request_document(&format!("/sections/{}/acta/qr", section.id))? {
        DocumentResponse::Pending { status_url } => {
            let done = poll(backend, &status_url, settings)?;
            Ok(serde_json::json!({
                "qrCodeData": done.qr_code_data,
                "downloadUrl": done.download_url,
            }))
        }
        DocumentResponse::Json(body) => Ok(body),
        DocumentResponse::Bytes(_) => Err(ActaError::Failed(
            "unexpected binary body for QR".to_string(),
        )),
    }
}

/// Polls until DONE or ERROR. A failed poll only aborts on the last attempt.
pub fn poll(
    backend: &dyn Backend,
    status_url: &str,
    settings: &ActaSettings,
) -> Result<TaskStatus, ActaError> {
    let attempts = settings.poll_attempts.max(1);
    for attempt in 1..=attempts {
        match backend.task_status(status_url) {
            Ok(status) if status.is_done() => return Ok(status),
            Ok(status) if status.is_error() => {
                return Err(ActaError::Failed(
                    status.error.unwrap_or_else(|| "Task failed".to_string()),
                ));
            }
            Ok(_) => {}
            Err(e) => {
                warn!(attempt, error = %e, "polling attempt failed");
                if attempt == attempts {
                    return Err(e.into());
                }
            }
        }
        if attempt < attempts {
            thread::sleep(settings.poll_interval);
        }
    }
    Err(ActaError::TimedOut(attempts))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ActaError> {
    let io_err = |source| ActaError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    std::fs::write(path, bytes).map_err(io_err)
}
