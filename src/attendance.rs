use crate::api::{
    ApiError, AttendanceRow, AttendanceSessionSummary, AttendanceStatus, Backend, Student,
};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AttendanceError {
    #[error("no hay una sesión de asistencia abierta")]
    NoSession,
    #[error("la sesión {0} está cerrada")]
    SessionClosed(String),
    #[error("student {0} is not in this session")]
    UnknownStudent(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Session being taken: local draft rows plus the rows last acknowledged
/// by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenSession {
    pub session_id: String,
    pub date: String,
    draft: Vec<AttendanceRow>,
    committed: Vec<AttendanceRow>,
}

impl OpenSession {
    pub fn rows(&self) -> &[AttendanceRow] {
        &self.draft
    }

    pub fn is_dirty(&self) -> bool {
        self.draft != self.committed
    }

    pub fn status_of(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.draft
            .iter()
            .find(|r| r.student_id == student_id)
            .map(|r| r.status)
    }
}

fn default_rows(roster: &[Student]) -> Vec<AttendanceRow> {
    roster
        .iter()
        .map(|s| AttendanceRow {
            student_id: s.id.clone(),
            status: AttendanceStatus::Present,
        })
        .collect()
}

/// Persisted status when the session has one for the student, PRESENT otherwise.
pub fn merge_rows(roster: &[Student], persisted: &[AttendanceRow]) -> Vec<AttendanceRow> {
    roster
        .iter()
        .map(|s| AttendanceRow {
            student_id: s.id.clone(),
            status: persisted
                .iter()
                .find(|r| r.student_id == s.id)
                .map(|r| r.status)
                .unwrap_or(AttendanceStatus::Present),
        })
        .collect()
}

/// NoSession -> Open -> (closed on the server, NoSession locally).
/// Every remote step either succeeds and transitions, or leaves the
/// machine exactly as it was.
#[derive(Debug, Clone, Default)]
pub struct AttendanceMachine {
    open: Option<OpenSession>,
}

impl AttendanceMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&OpenSession> {
        self.open.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn create_session(
        &mut self,
        backend: &dyn Backend,
        section_id: &str,
        date: NaiveDate,
        roster: &[Student],
    ) -> Result<&OpenSession, AttendanceError> {
        let created = backend.create_attendance_session(section_id, date)?;
        info!(section_id, session_id = %created.id, %date, "attendance session created");
        let session_date = if created.date.is_empty() {
            date.format("%Y-%m-%d").to_string()
        } else {
            created.date
        };
        let rows = default_rows(roster);
        Ok(self.open.insert(OpenSession {
            session_id: created.id,
            date: session_date,
            draft: rows,
            committed: Vec::new(),
        }))
    }

    /// Re-enters an existing session from the list. Closed sessions stay closed.
    pub fn open_existing(
        &mut self,
        summary: &AttendanceSessionSummary,
        roster: &[Student],
    ) -> Result<&OpenSession, AttendanceError> {
        if summary.is_closed {
            return Err(AttendanceError::SessionClosed(summary.id.clone()));
        }
        let rows = merge_rows(roster, &summary.rows);
        Ok(self.open.insert(OpenSession {
            session_id: summary.id.clone(),
            date: summary.date.clone(),
            draft: rows,
            committed: summary.rows.clone(),
        }))
    }

    /// Local edit only; nothing is sent until `save` or `close`.
    pub fn set_row_status(
        &mut self,
        student_id: &str,
        status: AttendanceStatus,
    ) -> Result<(), AttendanceError> {
        let open = self.open.as_mut().ok_or(AttendanceError::NoSession)?;
        let row = open
            .draft
            .iter_mut()
            .find(|r| r.student_id == student_id)
            .ok_or_else(|| AttendanceError::UnknownStudent(student_id.to_string()))?;
        row.status = status;
        Ok(())
    }

    pub fn save(&mut self, backend: &dyn Backend, section_id: &str) -> Result<(), AttendanceError> {
        let open = self.open.as_mut().ok_or(AttendanceError::NoSession)?;
        backend.set_attendance_rows(section_id, &open.session_id, &open.draft)?;
        open.committed = open.draft.clone();
        Ok(())
    }

    /// Persists the rows, closes the session, and drops the local reference.
    /// Returns the id of the closed session.
    pub fn close(&mut self, backend: &dyn Backend, section_id: &str) -> Result<String, AttendanceError> {
        let open = self.open.as_mut().ok_or(AttendanceError::NoSession)?;
        backend.set_attendance_rows(section_id, &open.session_id, &open.draft)?;
        open.committed = open.draft.clone();
        backend.close_attendance_session(section_id, &open.session_id)?;
        let closed = open.session_id.clone();
        self.open = None;
        info!(section_id, session_id = %closed, "attendance session closed");
        Ok(closed)
    }
}
