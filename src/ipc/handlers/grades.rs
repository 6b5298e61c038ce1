use crate::acta::{self, ActaSettings};
use crate::api::Student;
use crate::grading::{CompetencyLevel, StudentGradeRecord};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_bool, get_optional_usize, get_raw_input, get_required_str, get_required_usize,
    selected_section, selected_section_mut,
};
use crate::ipc::types::{AppState, Request};
use crate::section::SectionView;
use serde_json::json;
use tracing::{info, warn};

fn grade_row(student: &Student, record: &StudentGradeRecord) -> serde_json::Value {
    let derived = record.derive();
    json!({
        "studentId": student.id,
        "name": student.display_name(),
        "competencyLevel": record
            .competency_level
            .iter()
            .map(|l| l.map(CompetencyLevel::code))
            .collect::<Vec<_>>(),
        "competencyRecommendation": record.competency_recommendation,
        "competencyScore": record.competency_score,
        "scaleScore": derived.scale_score,
        "scaleScoreText": derived.scale_text(),
        "finalScore": derived.final_score,
        "finalScoreText": derived.final_text(),
        "outcome": derived.outcome_text(),
        "complete": record.is_complete(),
    })
}

fn row_for(view: &SectionView, student_id: &str) -> Result<serde_json::Value, HandlerErr> {
    let student = view
        .student(student_id)
        .ok_or_else(|| HandlerErr::new("not_found", format!("student not found: {}", student_id)))?;
    Ok(grade_row(student, &view.grades.record_or_default(student_id)))
}

fn grades_view(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let view = selected_section_mut(state)?;
    if let Some(size) = get_optional_usize(params, "pageSize")? {
        view.grades_pager.set_page_size(size);
    }
    if let Some(page) = get_optional_usize(params, "page")? {
        if !view.grades_pager.go_to(page) {
            return Err(HandlerErr::bad_params(format!("page out of range: {}", page)));
        }
    }
    let rows: Vec<serde_json::Value> = view
        .grades_pager
        .slice(view.roster())
        .iter()
        .map(|s| grade_row(s, &view.grades.record_or_default(&s.id)))
        .collect();
    Ok(json!({
        "sectionId": view.id(),
        "locked": view.grades.is_locked(),
        "rows": rows,
        "pagination": view.grades_pager.model(),
    }))
}

/// Resolves the editable record for a rostered student, refusing locked sheets.
fn editable<'a>(
    state: &'a mut AppState,
    params: &serde_json::Value,
) -> Result<(&'a mut SectionView, String, usize), HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let competency = get_required_usize(params, "competency")?;
    let view = selected_section_mut(state)?;
    if view.grades.is_locked() {
        return Err(HandlerErr::new(
            "grades_locked",
            "Las calificaciones ya fueron enviadas",
        ));
    }
    if view.student(&student_id).is_none() {
        return Err(HandlerErr::new(
            "not_found",
            format!("student not found: {}", student_id),
        ));
    }
    Ok((view, student_id, competency))
}

fn set_level(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let code = get_required_str(params, "level")?;
    let level = CompetencyLevel::from_code(&code)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown level: {}", code)))?;
    let (view, student_id, competency) = editable(state, params)?;
    view.grades
        .record_mut(&student_id)
        .set_level(competency, level)?;
    Ok(json!({ "row": row_for(view, &student_id)? }))
}

fn set_score(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = get_raw_input(params, "value")?;
    let (view, student_id, competency) = editable(state, params)?;
    let applied = view
        .grades
        .record_mut(&student_id)
        .apply_score_input(competency, &raw)?;
    Ok(json!({
        "applied": applied,
        "row": row_for(view, &student_id)?,
    }))
}

fn set_recommendation(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let text = get_raw_input(params, "text")?;
    let (view, student_id, competency) = editable(state, params)?;
    view.grades
        .record_mut(&student_id)
        .set_recommendation(competency, &text)?;
    Ok(json!({ "row": row_for(view, &student_id)? }))
}

fn grades_save(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let backend = state.backend.clone();
    let view = selected_section(state)?;
    if view.grades.is_locked() {
        return Err(HandlerErr::new(
            "grades_locked",
            "Las calificaciones ya fueron enviadas",
        ));
    }
    let payload = view.grade_payload();
    backend.save_grades(view.id(), &payload)?;
    info!(section_id = %view.id(), students = payload.len(), "grades draft saved");
    Ok(json!({ "saved": true, "students": payload.len() }))
}

fn grades_submit(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let with_acta = get_optional_bool(params, "generateActa", true);
    let backend = state.backend.clone();
    let settings = ActaSettings::from(&state.config);
    let view = selected_section_mut(state)?;
    if view.grades.is_locked() {
        return Err(HandlerErr::new(
            "grades_locked",
            "Las calificaciones ya fueron enviadas",
        ));
    }
    view.grades.validate_submission(view.roster_ids())?;

    let payload = view.grade_payload();
    let key = view.idempotency_key(&payload);
    backend.submit_grades(view.id(), &payload, &key)?;
    view.grades.set_locked(true);
    info!(section_id = %view.id(), students = payload.len(), "grades submitted");

    // The submission stands whatever happens to the acta.
    let acta = if with_acta {
        Some(acta::generate(backend.as_ref(), &view.section, &settings))
    } else {
        None
    };
    Ok(json!({
        "submitted": true,
        "locked": true,
        "idempotencyKey": key,
        "acta": acta,
    }))
}

fn grades_reopen(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    if !state.capabilities.can_reopen_grades() {
        return Err(HandlerErr::new(
            "forbidden",
            "No tiene permiso para reabrir calificaciones",
        ));
    }
    let backend = state.backend.clone();
    let view = selected_section_mut(state)?;
    backend.reopen_grades(view.id())?;
    view.grades.set_locked(false);
    info!(section_id = %view.id(), "grades reopened");

    // The reopen already happened on the server; a failed reload is reported
    // on its own and the local sheet stays editable.
    let refresh_error = match view.refresh_grades(backend.as_ref()) {
        Ok(()) => None,
        Err(e) => {
            warn!(section_id = %view.id(), error = %e, "grades reload after reopen failed");
            Some(e.to_string())
        }
    };
    Ok(json!({
        "reopened": true,
        "locked": view.grades.is_locked(),
        "refreshError": refresh_error,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.view" => grades_view(state, &req.params),
        "grades.setLevel" => set_level(state, &req.params),
        "grades.setScore" => set_score(state, &req.params),
        "grades.setRecommendation" => set_recommendation(state, &req.params),
        "grades.save" => grades_save(state),
        "grades.submit" => grades_submit(state, &req.params),
        "grades.reopen" => grades_reopen(state),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
