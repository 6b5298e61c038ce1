use crate::api::{ApiError, AttendanceSessionSummary, Backend, ImportPreview, Section, Student};
use crate::attendance::AttendanceMachine;
use crate::grading::{GradeBook, GradeMap};
use crate::pagination::Paginator;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
struct SubmissionKey {
    fingerprint: String,
    key: String,
}

/// Everything the grades/attendance screen holds for the selected section.
/// The three paginators are independent of one another.
#[derive(Debug, Clone)]
pub struct SectionView {
    pub section: Section,
    roster: Vec<Student>,
    pub grades: GradeBook,
    pub attendance: AttendanceMachine,
    sessions: Vec<AttendanceSessionSummary>,
    pub grades_pager: Paginator,
    pub sessions_pager: Paginator,
    pub roster_pager: Paginator,
    pub import_preview: Option<ImportPreview>,
    submission: Option<SubmissionKey>,
}

impl SectionView {
    pub fn new(section: Section, page_size: usize) -> Self {
        Self {
            section,
            roster: Vec::new(),
            grades: GradeBook::default(),
            attendance: AttendanceMachine::new(),
            sessions: Vec::new(),
            grades_pager: Paginator::new(page_size),
            sessions_pager: Paginator::new(page_size),
            roster_pager: Paginator::new(page_size),
            import_preview: None,
            submission: None,
        }
    }

    /// Roster, grades and attendance sessions. Nothing is kept if any fails.
    pub fn load(backend: &dyn Backend, section: Section, page_size: usize) -> Result<Self, ApiError> {
        let mut view = SectionView::new(section, page_size);
        let id = view.section.id.clone();
        let roster = backend.section_students(&id)?;
        let sheet = backend.fetch_grades(&id)?;
        let sessions = backend.list_attendance_sessions(&id)?;
        view.set_roster(roster);
        view.grades = GradeBook::new(sheet.grades, sheet.locked);
        view.set_sessions(sessions);
        info!(
            section_id = %id,
            students = view.roster.len(),
            sessions = view.sessions.len(),
            locked = view.grades.is_locked(),
            "section loaded"
        );
        Ok(view)
    }

    pub fn id(&self) -> &str {
        &self.section.id
    }

    pub fn roster(&self) -> &[Student] {
        &self.roster
    }

    pub fn roster_ids(&self) -> impl Iterator<Item = &str> {
        self.roster.iter().map(|s| s.id.as_str())
    }

    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.roster.iter().find(|s| s.id == student_id)
    }

    pub fn set_roster(&mut self, roster: Vec<Student>) {
        self.grades_pager.set_item_count(roster.len());
        self.roster_pager.set_item_count(roster.len());
        self.roster = roster;
    }

    pub fn sessions(&self) -> &[AttendanceSessionSummary] {
        &self.sessions
    }

    pub fn session(&self, session_id: &str) -> Option<&AttendanceSessionSummary> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    pub fn set_sessions(&mut self, sessions: Vec<AttendanceSessionSummary>) {
        self.sessions_pager.set_item_count(sessions.len());
        self.sessions = sessions;
    }

    pub fn refresh_sessions(&mut self, backend: &dyn Backend) -> Result<(), ApiError> {
        let sessions = backend.list_attendance_sessions(self.id())?;
        self.set_sessions(sessions);
        Ok(())
    }

    pub fn refresh_grades(&mut self, backend: &dyn Backend) -> Result<(), ApiError> {
        let sheet = backend.fetch_grades(self.id())?;
        self.grades = GradeBook::new(sheet.grades, sheet.locked);
        Ok(())
    }

    pub fn grade_payload(&self) -> GradeMap {
        self.grades.payload_for(self.roster.iter().map(|s| s.id.as_str()))
    }

    /// Same section and payload reuse the same key, so a repeated submit
    /// is recognisable as a duplicate on the server.
    pub fn idempotency_key(&mut self, payload: &GradeMap) -> String {
        let fingerprint = fingerprint(&self.section.id, payload);
        if let Some(prev) = &self.submission {
            if prev.fingerprint == fingerprint {
                debug!(section_id = %self.section.id, "reusing idempotency key");
                return prev.key.clone();
            }
        }
        let key = Uuid::new_v4().to_string();
        self.submission = Some(SubmissionKey {
            fingerprint,
            key: key.clone(),
        });
        key
    }
}

fn fingerprint(section_id: &str, payload: &GradeMap) -> String {
    let ordered: BTreeMap<&String, _> = payload.iter().collect();
    let body = serde_json::to_vec(&ordered).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(section_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(&body);
    format!("{:x}", hasher.finalize())
}
