#![allow(dead_code)]

use academicd::api::{
    ApiError, AttendanceRow, AttendanceSessionSummary, Backend, CashMovement, DocumentResponse,
    GradeSheet, ImportPreview, Section, Student, TaskStatus,
};
use academicd::config::Config;
use academicd::grading::GradeMap;
use academicd::ipc::{self, AppState, Inbound, Jobs};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_academicd");
    let mut child = Command::new(exe)
        // Nothing listens here; only local methods are exercised.
        .env("ACADEMICD_BACKEND_URL", "http://127.0.0.1:9")
        .env("ACADEMICD_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn academicd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or(Value::Null)
}

pub fn error_code(value: &Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

pub fn student(id: &str, first: &str, last: &str) -> Student {
    Student {
        id: id.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
    }
}

/// Canned server state. Every operation named in `failing` answers HTTP 500.
#[derive(Debug, Default)]
pub struct FakeData {
    pub sections: Vec<Section>,
    pub students: HashMap<String, Vec<Student>>,
    pub grades: HashMap<String, GradeSheet>,
    pub sessions: HashMap<String, Vec<AttendanceSessionSummary>>,
    pub import_preview: ImportPreview,
    pub imported: Vec<Value>,
    pub movements: HashMap<String, Vec<CashMovement>>,
    pub stats: Value,
    pub documents: HashMap<String, DocumentResponse>,
    pub task_statuses: VecDeque<Result<TaskStatus, ApiError>>,
    pub downloads: HashMap<String, Vec<u8>>,
    pub submitted: Vec<(String, GradeMap, String)>,
    pub saved: Vec<(String, GradeMap)>,
    pub failing: HashSet<String>,
    pub next_session: u64,
}

#[derive(Debug, Default)]
pub struct FakeBackend {
    data: Mutex<FakeData>,
    calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> MutexGuard<'_, FakeData> {
        self.data.lock().expect("fake data")
    }

    pub fn fail(&self, op: &str) {
        self.data().failing.insert(op.to_string());
    }

    pub fn heal(&self, op: &str) {
        self.data().failing.remove(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls").clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == op).count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().expect("calls").clear();
    }

    /// One section with the given students, empty grades and no sessions.
    pub fn with_section(self, section_id: &str, students: Vec<Student>) -> Self {
        {
            let mut d = self.data();
            let mut section = Section::bare(section_id);
            section.course_code = Some("MAT101".to_string());
            section.course_name = Some("Matemática".to_string());
            d.sections.push(section);
            d.students.insert(section_id.to_string(), students);
            d.grades.insert(section_id.to_string(), GradeSheet::default());
            d.sessions.insert(section_id.to_string(), Vec::new());
        }
        self
    }

    fn enter(&self, op: &str) -> Result<MutexGuard<'_, FakeData>, ApiError> {
        self.calls.lock().expect("calls").push(op.to_string());
        let d = self.data();
        if d.failing.contains(op) {
            return Err(ApiError::Status {
                status: 500,
                message: format!("{} failed", op),
            });
        }
        Ok(d)
    }
}

impl Backend for FakeBackend {
    fn teacher_sections(&self, _teacher_id: &str) -> Result<Vec<Section>, ApiError> {
        Ok(self.enter("teacher_sections")?.sections.clone())
    }

    fn section_students(&self, section_id: &str) -> Result<Vec<Student>, ApiError> {
        let d = self.enter("section_students")?;
        Ok(d.students.get(section_id).cloned().unwrap_or_default())
    }

    fn fetch_grades(&self, section_id: &str) -> Result<GradeSheet, ApiError> {
        let d = self.enter("fetch_grades")?;
        Ok(d.grades.get(section_id).cloned().unwrap_or_default())
    }

    fn save_grades(&self, section_id: &str, grades: &GradeMap) -> Result<(), ApiError> {
        let mut d = self.enter("save_grades")?;
        d.saved.push((section_id.to_string(), grades.clone()));
        Ok(())
    }

    fn submit_grades(
        &self,
        section_id: &str,
        grades: &GradeMap,
        idempotency_key: &str,
    ) -> Result<(), ApiError> {
        let mut d = self.enter("submit_grades")?;
        d.submitted.push((
            section_id.to_string(),
            grades.clone(),
            idempotency_key.to_string(),
        ));
        let sheet = d.grades.entry(section_id.to_string()).or_default();
        sheet.grades = grades.clone();
        sheet.locked = true;
        Ok(())
    }

    fn reopen_grades(&self, section_id: &str) -> Result<(), ApiError> {
        let mut d = self.enter("reopen_grades")?;
        d.grades.entry(section_id.to_string()).or_default().locked = false;
        Ok(())
    }

    fn create_attendance_session(
        &self,
        section_id: &str,
        date: NaiveDate,
    ) -> Result<AttendanceSessionSummary, ApiError> {
        let mut d = self.enter("create_attendance_session")?;
        d.next_session += 1;
        let summary = AttendanceSessionSummary {
            id: format!("as-{}", d.next_session),
            date: date.format("%Y-%m-%d").to_string(),
            is_closed: false,
            rows: Vec::new(),
        };
        d.sessions
            .entry(section_id.to_string())
            .or_default()
            .push(summary.clone());
        Ok(summary)
    }

    fn list_attendance_sessions(
        &self,
        section_id: &str,
    ) -> Result<Vec<AttendanceSessionSummary>, ApiError> {
        let d = self.enter("list_attendance_sessions")?;
        Ok(d.sessions.get(section_id).cloned().unwrap_or_default())
    }

    fn set_attendance_rows(
        &self,
        section_id: &str,
        session_id: &str,
        rows: &[AttendanceRow],
    ) -> Result<(), ApiError> {
        let mut d = self.enter("set_attendance_rows")?;
        let session = d
            .sessions
            .get_mut(section_id)
            .and_then(|list| list.iter_mut().find(|s| s.id == session_id))
            .ok_or_else(|| ApiError::Status {
                status: 404,
                message: "session not found".to_string(),
            })?;
        session.rows = rows.to_vec();
        Ok(())
    }

    fn close_attendance_session(&self, section_id: &str, session_id: &str) -> Result<(), ApiError> {
        let mut d = self.enter("close_attendance_session")?;
        if let Some(session) = d
            .sessions
            .get_mut(section_id)
            .and_then(|list| list.iter_mut().find(|s| s.id == session_id))
        {
            session.is_closed = true;
        }
        Ok(())
    }

    fn preview_attendance_import(
        &self,
        _section_id: &str,
        _file: &Path,
    ) -> Result<ImportPreview, ApiError> {
        Ok(self.enter("preview_attendance_import")?.import_preview.clone())
    }

    fn save_attendance_import(&self, _section_id: &str, rows: &[Value]) -> Result<(), ApiError> {
        let mut d = self.enter("save_attendance_import")?;
        d.imported.extend(rows.iter().cloned());
        Ok(())
    }

    fn cash_movements(&self, cash_session_id: &str) -> Result<Vec<CashMovement>, ApiError> {
        let d = self.enter("cash_movements")?;
        Ok(d.movements.get(cash_session_id).cloned().unwrap_or_default())
    }

    fn dashboard_stats(&self) -> Result<Value, ApiError> {
        Ok(self.enter("dashboard_stats")?.stats.clone())
    }

    fn request_document(&self, path: &str) -> Result<DocumentResponse, ApiError> {
        let d = self.enter("request_document")?;
        d.documents.get(path).cloned().ok_or_else(|| ApiError::Status {
            status: 404,
            message: format!("no document at {}", path),
        })
    }

    fn task_status(&self, _status_url: &str) -> Result<TaskStatus, ApiError> {
        let mut d = self.enter("task_status")?;
        d.task_statuses.pop_front().unwrap_or_else(|| {
            Ok(TaskStatus {
                status: "PENDING".to_string(),
                ..TaskStatus::default()
            })
        })
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let d = self.enter("download")?;
        d.downloads.get(url).cloned().ok_or_else(|| ApiError::Status {
            status: 404,
            message: format!("nothing at {}", url),
        })
    }
}

pub fn test_config(output_dir: &Path) -> Config {
    Config {
        output_dir: output_dir.to_path_buf(),
        acta_poll_attempts: 3,
        acta_poll_interval: Duration::from_millis(1),
        ..Config::default()
    }
}

/// Loop state wired to `backend`, plus the receiving end of its job channel.
pub fn app(backend: &Arc<FakeBackend>, output_dir: &Path) -> (AppState, Receiver<Inbound>) {
    let (tx, rx) = mpsc::channel();
    let state = AppState::new(test_config(output_dir), backend.clone(), Jobs::new(tx));
    (state, rx)
}

pub fn call(state: &mut AppState, method: &str, params: Value) -> Value {
    let req: ipc::Request = serde_json::from_value(json!({
        "id": "t",
        "method": method,
        "params": params,
    }))
    .expect("request");
    ipc::handle_request(state, req)
}

pub fn call_ok(state: &mut AppState, method: &str, params: Value) -> Value {
    let resp = call(state, method, params);
    assert_eq!(
        resp.get("ok").and_then(|v| v.as_bool()),
        Some(true),
        "{} failed: {}",
        method,
        resp
    );
    resp.get("result").cloned().unwrap_or(Value::Null)
}

/// Waits for the next background completion and applies it.
pub fn pump(state: &mut AppState, rx: &Receiver<Inbound>) -> Option<Value> {
    match rx.recv_timeout(Duration::from_secs(5)).expect("completion") {
        Inbound::Completion(c) => ipc::apply_completion(state, c),
        other => panic!("unexpected inbound: {:?}", other),
    }
}
