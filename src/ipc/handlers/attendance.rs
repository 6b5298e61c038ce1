use crate::api::{AttendanceStatus, Backend};
use crate::attendance::{AttendanceError, OpenSession};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    get_optional_str, get_optional_usize, get_required_str, selected_section_mut,
};
use crate::ipc::types::{AppState, Request};
use crate::pagination::Paginator;
use crate::section::SectionView;
use chrono::{Local, NaiveDate};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn apply_paging(pager: &mut Paginator, params: &serde_json::Value) -> Result<(), HandlerErr> {
    if let Some(size) = get_optional_usize(params, "pageSize")? {
        pager.set_page_size(size);
    }
    if let Some(page) = get_optional_usize(params, "page")? {
        if !pager.go_to(page) {
            return Err(HandlerErr::bad_params(format!("page out of range: {}", page)));
        }
    }
    Ok(())
}

fn open_session_json(open: &OpenSession) -> serde_json::Value {
    json!({
        "sessionId": open.session_id,
        "date": open.date,
        "dirty": open.is_dirty(),
    })
}

/// Keeps the list in step after a remote change. The change itself already
/// happened, so a failed reload is only logged.
fn refresh_sessions_quietly(view: &mut SectionView, backend: &dyn Backend) {
    if let Err(e) = view.refresh_sessions(backend) {
        warn!(section_id = %view.id(), error = %e, "attendance session list reload failed");
    }
}

fn parse_date(params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    match get_optional_str(params, "date") {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| HandlerErr::bad_params(format!("invalid date (YYYY-MM-DD): {}", raw))),
        None => Ok(Local::now().date_naive()),
    }
}

fn sessions(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let view = selected_section_mut(state)?;
    apply_paging(&mut view.sessions_pager, params)?;
    let open_id = view.attendance.current().map(|o| o.session_id.clone());
    let rows: Vec<serde_json::Value> = view
        .sessions_pager
        .slice(view.sessions())
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "date": s.date,
                "isClosed": s.is_closed,
                "canOpen": !s.is_closed,
                "isCurrent": open_id.as_deref() == Some(s.id.as_str()),
            })
        })
        .collect();
    Ok(json!({
        "sessions": rows,
        "open": view.attendance.current().map(open_session_json),
        "pagination": view.sessions_pager.model(),
    }))
}

fn create(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let date = parse_date(params)?;
    let backend = state.backend.clone();
    let view = selected_section_mut(state)?;
    let section_id = view.id().to_string();
    let roster = view.roster().to_vec();
    let open = view
        .attendance
        .create_session(backend.as_ref(), &section_id, date, &roster)?;
    let result = open_session_json(open);
    view.roster_pager.go_to(1);
    refresh_sessions_quietly(view, backend.as_ref());
    Ok(json!({ "open": result, "rowCount": roster.len() }))
}

fn select(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let session_id = get_required_str(params, "sessionId")?;
    let view = selected_section_mut(state)?;
    let summary = view
        .session(&session_id)
        .cloned()
        .ok_or_else(|| HandlerErr::new("not_found", format!("session not found: {}", session_id)))?;
    let roster = view.roster().to_vec();
    let open = view.attendance.open_existing(&summary, &roster)?;
    let result = open_session_json(open);
    view.roster_pager.go_to(1);
    Ok(json!({ "open": result }))
}

fn roster(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let view = selected_section_mut(state)?;
    if view.attendance.current().is_none() {
        return Err(AttendanceError::NoSession.into());
    }
    apply_paging(&mut view.roster_pager, params)?;
    let open = view
        .attendance
        .current()
        .ok_or_else(|| HandlerErr::from(AttendanceError::NoSession))?;
    let rows: Vec<serde_json::Value> = view
        .roster_pager
        .slice(view.roster())
        .iter()
        .map(|s| {
            let status = open.status_of(&s.id).unwrap_or(AttendanceStatus::Present);
            json!({
                "studentId": s.id,
                "name": s.display_name(),
                "status": status,
                "statusLabel": status.label(),
            })
        })
        .collect();
    Ok(json!({
        "open": open_session_json(open),
        "rows": rows,
        "pagination": view.roster_pager.model(),
    }))
}

fn set_row_status(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let code = get_required_str(params, "status")?;
    let status = AttendanceStatus::from_code(&code)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown status: {}", code)))?;
    let view = selected_section_mut(state)?;
    view.attendance.set_row_status(&student_id, status)?;
    Ok(json!({
        "studentId": student_id,
        "status": status,
        "statusLabel": status.label(),
    }))
}

fn save(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let backend = state.backend.clone();
    let view = selected_section_mut(state)?;
    let section_id = view.id().to_string();
    view.attendance.save(backend.as_ref(), &section_id)?;
    Ok(json!({ "saved": true, "open": view.attendance.current().map(open_session_json) }))
}

fn close(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let backend = state.backend.clone();
    let view = selected_section_mut(state)?;
    let section_id = view.id().to_string();
    let closed = view.attendance.close(backend.as_ref(), &section_id)?;
    refresh_sessions_quietly(view, backend.as_ref());
    Ok(json!({ "closed": closed, "sessionCount": view.sessions().len() }))
}

fn import_preview(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(params, "path")?);
    if !path.is_file() {
        return Err(HandlerErr::bad_params(format!(
            "file not found: {}",
            path.to_string_lossy()
        )));
    }
    let backend = state.backend.clone();
    let view = selected_section_mut(state)?;
    let preview = backend.preview_attendance_import(view.id(), &path)?;
    info!(
        section_id = %view.id(),
        rows = preview.preview.len(),
        errors = preview.errors.len(),
        "attendance import previewed"
    );
    let result = json!({
        "preview": preview.preview,
        "errors": preview.errors,
        "canSave": preview.errors.is_empty(),
    });
    view.import_preview = Some(preview);
    Ok(result)
}

fn import_save(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    let backend = state.backend.clone();
    let view = selected_section_mut(state)?;
    let preview = view.import_preview.as_ref().ok_or_else(|| {
        HandlerErr::new("no_preview", "Primero previsualice el archivo")
    })?;
    if !preview.errors.is_empty() {
        return Err(HandlerErr::new(
            "import_has_errors",
            "Corrija los errores antes de guardar",
        )
        .with_details(json!({ "errors": preview.errors })));
    }
    let rows = preview.preview.len();
    backend.save_attendance_import(view.id(), &preview.preview)?;
    view.import_preview = None;
    info!(section_id = %view.id(), rows, "attendance import saved");
    refresh_sessions_quietly(view, backend.as_ref());
    Ok(json!({ "saved": true, "rows": rows }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "attendance.sessions" => sessions(state, &req.params),
        "attendance.create" => create(state, &req.params),
        "attendance.select" => select(state, &req.params),
        "attendance.roster" => roster(state, &req.params),
        "attendance.setRowStatus" => set_row_status(state, &req.params),
        "attendance.save" => save(state),
        "attendance.close" => close(state),
        "attendance.importPreview" => import_preview(state, &req.params),
        "attendance.importSave" => import_save(state),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
