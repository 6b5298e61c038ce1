use crate::grading::{CompetencyLevel, StudentGradeRecord, COMPETENCY_COUNT};
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{get_optional_usize, get_required_usize};
use crate::ipc::types::{AppState, Request};
use crate::pagination::{Paginator, DEFAULT_PAGE_SIZE};
use serde_json::{json, Value};

/// Stateless page model for an arbitrary list held by the shell.
fn pagination_model(params: &Value) -> Result<Value, HandlerErr> {
    let item_count = get_required_usize(params, "itemCount")?;
    let page_size = get_optional_usize(params, "pageSize")?.unwrap_or(DEFAULT_PAGE_SIZE);
    let page = get_optional_usize(params, "page")?.unwrap_or(1);
    let mut pager = Paginator::new(page_size);
    pager.set_item_count(item_count);
    // Out-of-range requests land on the nearest valid page.
    let clamped = page.clamp(1, pager.total_pages());
    pager.go_to(clamped);
    Ok(json!(pager.model()))
}

fn slot_values(params: &Value, key: &str) -> Result<Vec<Value>, HandlerErr> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(vec![Value::Null; COMPETENCY_COUNT]),
        Some(Value::Array(items)) if items.len() <= COMPETENCY_COUNT => {
            let mut out = items.clone();
            out.resize(COMPETENCY_COUNT, Value::Null);
            Ok(out)
        }
        Some(_) => Err(HandlerErr::bad_params(format!(
            "{} must be an array of at most {} items",
            key, COMPETENCY_COUNT
        ))),
    }
}

/// Derived grade for ad-hoc inputs; levels first, then any explicit scores.
fn grades_derive(params: &Value) -> Result<Value, HandlerErr> {
    let mut record = StudentGradeRecord::default();
    for (i, v) in slot_values(params, "levels")?.iter().enumerate() {
        if let Some(code) = v.as_str().filter(|c| !c.trim().is_empty()) {
            let level = CompetencyLevel::from_code(code)
                .ok_or_else(|| HandlerErr::bad_params(format!("unknown level: {}", code)))?;
            record.set_level(i + 1, level)?;
        }
    }
    for (i, v) in slot_values(params, "scores")?.iter().enumerate() {
        let raw = match v {
            Value::Null => continue,
            Value::Number(n) => n.to_string(),
            Value::String(s) => s.clone(),
            _ => return Err(HandlerErr::bad_params("scores must be numbers or strings")),
        };
        if !record.apply_score_input(i + 1, &raw)? {
            return Err(HandlerErr::bad_params(format!(
                "score {} must be an integer between 1 and 5",
                i + 1
            )));
        }
    }
    let derived = record.derive();
    Ok(json!({
        "competencyScore": record.competency_score,
        "scaleScore": derived.scale_score,
        "scaleScoreText": derived.scale_text(),
        "finalScore": derived.final_score,
        "finalScoreText": derived.final_text(),
        "outcome": derived.outcome_text(),
    }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<Value> {
    let result = match req.method.as_str() {
        "pagination.model" => pagination_model(&req.params),
        "grades.derive" => grades_derive(&req.params),
        _ => return None,
    };
    Some(match result {
        Ok(v) => ok(&req.id, v),
        Err(e) => e.response(&req.id),
    })
}
