use crate::api::Section;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::get_required_str;
use crate::ipc::types::{AppState, Request};
use crate::section::SectionView;
use serde_json::json;
use tracing::info;

fn section_json(s: &Section) -> serde_json::Value {
    json!({
        "id": s.id,
        "courseCode": s.course_code,
        "courseName": s.course_name,
        "sectionCode": s.section_code,
        "displayName": s.display_name(),
    })
}

fn sections_list(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let teacher_id = get_required_str(params, "teacherId")?;
    let sections = state.backend.teacher_sections(&teacher_id)?;

    // Drop the selection if the section is no longer assigned.
    let still_assigned = state
        .section
        .as_ref()
        .map(|v| sections.iter().any(|s| s.id == v.id()))
        .unwrap_or(true);
    if !still_assigned {
        info!("selected section no longer assigned, clearing");
        state.section = None;
    }

    state.sections = sections;
    Ok(json!({
        "sections": state.sections.iter().map(section_json).collect::<Vec<_>>(),
        "selectedSectionId": state.section.as_ref().map(|v| v.id().to_string()),
    }))
}

fn section_select(state: &mut AppState, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let section_id = get_required_str(params, "sectionId")?;
    let section = state
        .sections
        .iter()
        .find(|s| s.id == section_id)
        .cloned()
        .unwrap_or_else(|| Section::bare(&section_id));

    let view = SectionView::load(state.backend.as_ref(), section, state.config.page_size)?;
    let result = json!({
        "section": section_json(&view.section),
        "studentCount": view.roster().len(),
        "sessionCount": view.sessions().len(),
        "locked": view.grades.is_locked(),
    });
    state.section = Some(view);
    Ok(result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "sections.list" => sections_list(state, &req.params),
        "section.select" => section_select(state, &req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
