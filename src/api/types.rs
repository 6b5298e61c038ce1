use crate::grading::{lenient_grade_map, GradeMap};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ids arrive as numbers or strings depending on the endpoint.
pub fn id_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!("expected id, got {other}"))),
    }
}

fn lenient_f64<'de, D>(d: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(d)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub section_code: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl Section {
    pub fn bare(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Default::default()
        }
    }

    /// "Course - SECTION" as the section picker shows it.
    pub fn display_name(&self) -> String {
        let course = self
            .course_name
            .as_deref()
            .or(self.course_code.as_deref())
            .unwrap_or("Curso");
        let code = self
            .section_code
            .clone()
            .or_else(|| self.label.clone())
            .unwrap_or_else(|| format!("SEC-{}", self.id));
        format!("{course} - {code}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl Student {
    pub fn display_name(&self) -> String {
        match (self.last_name.trim(), self.first_name.trim()) {
            ("", first) => first.to_string(),
            (last, "") => last.to_string(),
            (last, first) => format!("{last}, {first}"),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GradeSheet {
    #[serde(default, deserialize_with = "lenient_grade_map")]
    pub grades: GradeMap,
    #[serde(default, alias = "is_locked", alias = "submitted")]
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "PRESENT" => Some(Self::Present),
            "ABSENT" => Some(Self::Absent),
            "LATE" => Some(Self::Late),
            "EXCUSED" => Some(Self::Excused),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Present => "Presente",
            Self::Absent => "Ausente",
            Self::Late => "Tardanza",
            Self::Excused => "Justificado",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRow {
    #[serde(deserialize_with = "id_string")]
    pub student_id: String,
    pub status: AttendanceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSessionSummary {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub date: String,
    #[serde(default, alias = "closed")]
    pub is_closed: bool,
    #[serde(default)]
    pub rows: Vec<AttendanceRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRowError {
    /// 1-based line of the uploaded file.
    #[serde(default)]
    pub row: u64,
    #[serde(default, alias = "error")]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportPreview {
    #[serde(default)]
    pub preview: Vec<Value>,
    #[serde(default)]
    pub errors: Vec<ImportRowError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashMovement {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default, alias = "type")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: f64,
    #[serde(default, alias = "note")]
    pub concept: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Body of `POST` document endpoints (acta PDF, acta QR).
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentResponse {
    /// The document itself.
    Bytes(Vec<u8>),
    /// 202 Accepted: poll `status_url` until done.
    Pending { status_url: String },
    Json(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub qr_code_data: Option<String>,
}

impl TaskStatus {
    pub fn is_done(&self) -> bool {
        self.status.eq_ignore_ascii_case("DONE")
    }

    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case("ERROR")
    }
}
