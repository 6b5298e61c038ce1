use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub const COMPETENCY_COUNT: usize = 3;
pub const PASSING_FINAL_SCORE: u8 = 11;
pub const MIN_COMPETENCY_SCORE: i64 = 1;
pub const MAX_COMPETENCY_SCORE: i64 = 5;
/// Rendered in place of any derived value that is undefined.
pub const UNDEFINED_MARK: &str = "—";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GradeError {
    #[error("competency must be between 1 and {COMPETENCY_COUNT}, got {0}")]
    CompetencyOutOfRange(usize),
    #[error("Complete todas las calificaciones antes de enviar")]
    Incomplete { student_ids: Vec<String> },
}

/// Ordered achievement scale, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CompetencyLevel {
    #[serde(rename = "PI")]
    BeforeStart,
    #[serde(rename = "I")]
    Start,
    #[serde(rename = "P")]
    InProgress,
    #[serde(rename = "L")]
    Achieved,
    #[serde(rename = "D")]
    Outstanding,
}

impl CompetencyLevel {
    pub const ALL: [CompetencyLevel; 5] = [
        CompetencyLevel::BeforeStart,
        CompetencyLevel::Start,
        CompetencyLevel::InProgress,
        CompetencyLevel::Achieved,
        CompetencyLevel::Outstanding,
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "PI" => Some(Self::BeforeStart),
            "I" => Some(Self::Start),
            "P" => Some(Self::InProgress),
            "L" => Some(Self::Achieved),
            "D" => Some(Self::Outstanding),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::BeforeStart => "PI",
            Self::Start => "I",
            Self::InProgress => "P",
            Self::Achieved => "L",
            Self::Outstanding => "D",
        }
    }

    pub fn score(self) -> i64 {
        match self {
            Self::BeforeStart => 1,
            Self::Start => 2,
            Self::InProgress => 3,
            Self::Achieved => 4,
            Self::Outstanding => 5,
        }
    }
}

/// Fixed level -> score mapping. Codes outside the scale have no score.
pub fn level_to_score(code: &str) -> Option<i64> {
    CompetencyLevel::from_code(code).map(CompetencyLevel::score)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    #[serde(rename = "Logrado")]
    Achieved,
    #[serde(rename = "En proceso")]
    InProgress,
}

impl Outcome {
    pub fn label(self) -> &'static str {
        match self {
            Self::Achieved => "Logrado",
            Self::InProgress => "En proceso",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Scale score held in tenths (10..=50) so rounding stays exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScaleScore(u8);

impl ScaleScore {
    pub fn tenths(self) -> u8 {
        self.0
    }

    pub fn value(self) -> f64 {
        f64::from(self.0) / 10.0
    }
}

impl fmt::Display for ScaleScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 / 10, self.0 % 10)
    }
}

impl Serialize for ScaleScore {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.value())
    }
}

/// One student's competency inputs for a section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentGradeRecord {
    #[serde(default, deserialize_with = "lenient_levels")]
    pub competency_level: [Option<CompetencyLevel>; COMPETENCY_COUNT],
    #[serde(default, deserialize_with = "lenient_recommendations")]
    pub competency_recommendation: [String; COMPETENCY_COUNT],
    #[serde(default, deserialize_with = "lenient_scores")]
    pub competency_score: [Option<i64>; COMPETENCY_COUNT],
}

fn slot(competency: usize) -> Result<usize, GradeError> {
    if (1..=COMPETENCY_COUNT).contains(&competency) {
        Ok(competency - 1)
    } else {
        Err(GradeError::CompetencyOutOfRange(competency))
    }
}

impl StudentGradeRecord {
    /// Selecting a level overwrites the slot's score, dropping any manual value.
    pub fn set_level(&mut self, competency: usize, level: CompetencyLevel) -> Result<(), GradeError> {
        let idx = slot(competency)?;
        self.competency_level[idx] = Some(level);
        self.competency_score[idx] = Some(level.score());
        Ok(())
    }

    /// Applies a manually typed score. Returns `Ok(false)` when the input is
    /// rejected, in which case the record is untouched. Blank input clears the slot.
    pub fn apply_score_input(&mut self, competency: usize, raw: &str) -> Result<bool, GradeError> {
        let idx = slot(competency)?;
        let t = raw.trim();
        if t.is_empty() {
            self.competency_score[idx] = None;
            return Ok(true);
        }
        match parse_score(t) {
            Some(v) => {
                self.competency_score[idx] = Some(v);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn set_recommendation(&mut self, competency: usize, text: &str) -> Result<(), GradeError> {
        let idx = slot(competency)?;
        self.competency_recommendation[idx] = text.to_string();
        Ok(())
    }

    /// Submission requires every level and every score to be filled in.
    pub fn is_complete(&self) -> bool {
        self.competency_level.iter().all(Option::is_some)
            && self.competency_score.iter().all(Option::is_some)
    }

    pub fn derive(&self) -> DerivedGrade {
        let scale = derive_scale_score(self);
        let final_score = scale.map(final_from_scale);
        DerivedGrade {
            scale_score: scale,
            final_score,
            outcome: final_score.map(outcome_from_final),
        }
    }
}

fn parse_score(t: &str) -> Option<i64> {
    let v = match t.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            let f = t.parse::<f64>().ok()?;
            if !f.is_finite() || f.fract() != 0.0 {
                return None;
            }
            f as i64
        }
    };
    (MIN_COMPETENCY_SCORE..=MAX_COMPETENCY_SCORE)
        .contains(&v)
        .then_some(v)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedGrade {
    pub scale_score: Option<ScaleScore>,
    pub final_score: Option<u8>,
    pub outcome: Option<Outcome>,
}

impl DerivedGrade {
    pub fn scale_text(&self) -> String {
        self.scale_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| UNDEFINED_MARK.to_string())
    }

    pub fn final_text(&self) -> String {
        self.final_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| UNDEFINED_MARK.to_string())
    }

    pub fn outcome_text(&self) -> &'static str {
        self.outcome.map(Outcome::label).unwrap_or(UNDEFINED_MARK)
    }
}

/// Mean of the three scores rounded half-up to one decimal.
pub fn derive_scale_score(record: &StudentGradeRecord) -> Option<ScaleScore> {
    let mut sum: i64 = 0;
    for s in record.competency_score {
        let v = s?;
        if !(MIN_COMPETENCY_SCORE..=MAX_COMPETENCY_SCORE).contains(&v) {
            return None;
        }
        sum += v;
    }
    // floor(10 * sum / n + 1/2) computed in integers.
    let n = COMPETENCY_COUNT as i64;
    let tenths = (20 * sum + n) / (2 * n);
    Some(ScaleScore(tenths as u8))
}

pub fn derive_final_score(record: &StudentGradeRecord) -> Option<u8> {
    derive_scale_score(record).map(final_from_scale)
}

pub fn derive_outcome(record: &StudentGradeRecord) -> Option<Outcome> {
    derive_final_score(record).map(outcome_from_final)
}

/// round_half_up((s - 1) / 4 * 20). With s in tenths this is (t - 10) / 2.
pub fn final_from_scale(scale: ScaleScore) -> u8 {
    let t = i64::from(scale.tenths());
    ((t - 10 + 1) / 2).clamp(0, 20) as u8
}

pub fn outcome_from_final(final_score: u8) -> Outcome {
    if final_score >= PASSING_FINAL_SCORE {
        Outcome::Achieved
    } else {
        Outcome::InProgress
    }
}

pub type GradeMap = HashMap<String, StudentGradeRecord>;

/// In-memory grade sheet for one section.
#[derive(Debug, Clone, Default)]
pub struct GradeBook {
    records: GradeMap,
    locked: bool,
}

impl GradeBook {
    pub fn new(records: GradeMap, locked: bool) -> Self {
        Self { records, locked }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn set_locked(&mut self, locked: bool) {
        self.locked = locked;
    }

    /// Missing students read as empty records.
    pub fn record_or_default(&self, student_id: &str) -> StudentGradeRecord {
        self.records.get(student_id).cloned().unwrap_or_default()
    }

    pub fn record_mut(&mut self, student_id: &str) -> &mut StudentGradeRecord {
        self.records.entry(student_id.to_string()).or_default()
    }

    /// Full mapping for the given roster, empty records included.
    pub fn payload_for<'a, I>(&self, roster_ids: I) -> GradeMap
    where
        I: IntoIterator<Item = &'a str>,
    {
        roster_ids
            .into_iter()
            .map(|id| (id.to_string(), self.record_or_default(id)))
            .collect()
    }

    pub fn validate_submission<'a, I>(&self, roster_ids: I) -> Result<(), GradeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let missing: Vec<String> = roster_ids
            .into_iter()
            .filter(|id| !self.records.get(*id).map(|r| r.is_complete()).unwrap_or(false))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GradeError::Incomplete {
                student_ids: missing,
            })
        }
    }
}

/// Decodes a fetched grade map; a `null` entry reads as an empty record.
pub fn lenient_grade_map<'de, D>(d: D) -> Result<GradeMap, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, Option<StudentGradeRecord>>> = Option::deserialize(d)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(id, record)| (id, record.unwrap_or_default()))
        .collect())
}

fn lenient_levels<'de, D>(d: D) -> Result<[Option<CompetencyLevel>; COMPETENCY_COUNT], D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(d)?;
    let mut out = [None; COMPETENCY_COUNT];
    for (i, v) in raw.unwrap_or_default().iter().take(COMPETENCY_COUNT).enumerate() {
        out[i] = v.as_str().and_then(CompetencyLevel::from_code);
    }
    Ok(out)
}

fn lenient_scores<'de, D>(d: D) -> Result<[Option<i64>; COMPETENCY_COUNT], D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(d)?;
    let mut out = [None; COMPETENCY_COUNT];
    for (i, v) in raw.unwrap_or_default().iter().take(COMPETENCY_COUNT).enumerate() {
        out[i] = match v {
            serde_json::Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
    }
    Ok(out)
}

fn lenient_recommendations<'de, D>(d: D) -> Result<[String; COMPETENCY_COUNT], D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<serde_json::Value>> = Option::deserialize(d)?;
    let mut out: [String; COMPETENCY_COUNT] = Default::default();
    for (i, v) in raw.unwrap_or_default().iter().take(COMPETENCY_COUNT).enumerate() {
        out[i] = v.as_str().unwrap_or_default().to_string();
    }
    Ok(out)
}
