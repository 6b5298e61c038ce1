mod test_support;

use academicd::api::{AttendanceRow, AttendanceSessionSummary, AttendanceStatus, ImportPreview, ImportRowError};
use serde_json::json;
use std::sync::Arc;
use test_support::{app, call, call_ok, error_code, student, temp_dir, FakeBackend};

fn roster_backend() -> Arc<FakeBackend> {
    Arc::new(FakeBackend::new().with_section(
        "s1",
        vec![
            student("10", "Ana", "Quispe"),
            student("11", "Luis", "Mamani"),
            student("12", "Rosa", "Huamán"),
        ],
    ))
}

#[test]
fn created_session_starts_with_everyone_present() {
    let fake = roster_backend();
    let out = temp_dir("academicd-att-create");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));

    let created = call_ok(&mut state, "attendance.create", json!({ "date": "2024-03-11" }));
    assert_eq!(created["open"]["date"], "2024-03-11");
    assert_eq!(created["rowCount"], 3);

    let roster = call_ok(&mut state, "attendance.roster", json!({}));
    let rows = roster["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|r| r["status"] == "PRESENT"));
    assert_eq!(roster["open"]["dirty"], true);

    let sessions = call_ok(&mut state, "attendance.sessions", json!({}));
    assert_eq!(sessions["sessions"][0]["isCurrent"], true);
    assert_eq!(sessions["sessions"][0]["canOpen"], true);
}

#[test]
fn invalid_date_is_rejected_before_any_call() {
    let fake = roster_backend();
    let out = temp_dir("academicd-att-date");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));

    let resp = call(&mut state, "attendance.create", json!({ "date": "11/03/2024" }));
    assert_eq!(error_code(&resp), Some("bad_params"));
    assert_eq!(fake.count("create_attendance_session"), 0);
}

#[test]
fn edits_are_local_until_saved() {
    let fake = roster_backend();
    let out = temp_dir("academicd-att-save");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));
    let created = call_ok(&mut state, "attendance.create", json!({ "date": "2024-03-11" }));
    let session_id = created["open"]["sessionId"].as_str().expect("id").to_string();

    fake.clear_calls();
    call_ok(
        &mut state,
        "attendance.setRowStatus",
        json!({ "studentId": "11", "status": "late" }),
    );
    assert!(fake.calls().is_empty());

    let bad = call(
        &mut state,
        "attendance.setRowStatus",
        json!({ "studentId": "11", "status": "SICK" }),
    );
    assert_eq!(error_code(&bad), Some("bad_params"));
    let unknown = call(
        &mut state,
        "attendance.setRowStatus",
        json!({ "studentId": "99", "status": "ABSENT" }),
    );
    assert_eq!(error_code(&unknown), Some("not_found"));

    let saved = call_ok(&mut state, "attendance.save", json!({}));
    assert_eq!(saved["open"]["dirty"], false);

    let d = fake.data();
    let session = d.sessions["s1"]
        .iter()
        .find(|s| s.id == session_id)
        .expect("session");
    let late = session
        .rows
        .iter()
        .find(|r| r.student_id == "11")
        .expect("row");
    assert_eq!(late.status, AttendanceStatus::Late);
}

#[test]
fn failed_save_leaves_the_draft_untouched() {
    let fake = roster_backend();
    let out = temp_dir("academicd-att-fail");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));
    call_ok(&mut state, "attendance.create", json!({ "date": "2024-03-11" }));
    call_ok(
        &mut state,
        "attendance.setRowStatus",
        json!({ "studentId": "10", "status": "ABSENT" }),
    );

    fake.fail("set_attendance_rows");
    let resp = call(&mut state, "attendance.save", json!({}));
    assert_eq!(error_code(&resp), Some("api_error"));

    let close = call(&mut state, "attendance.close", json!({}));
    assert_eq!(error_code(&close), Some("api_error"));
    assert_eq!(fake.count("close_attendance_session"), 0);

    let roster = call_ok(&mut state, "attendance.roster", json!({}));
    assert_eq!(roster["open"]["dirty"], true);
    assert_eq!(roster["rows"][0]["status"], "ABSENT");
}

#[test]
fn failed_create_leaves_no_session_open() {
    let fake = roster_backend();
    let out = temp_dir("academicd-att-create-fail");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));

    fake.fail("create_attendance_session");
    let resp = call(&mut state, "attendance.create", json!({ "date": "2024-03-11" }));
    assert_eq!(error_code(&resp), Some("api_error"));

    let roster = call(&mut state, "attendance.roster", json!({}));
    assert_eq!(error_code(&roster), Some("no_session"));
    let sessions = call_ok(&mut state, "attendance.sessions", json!({}));
    assert!(sessions["open"].is_null());
    assert!(sessions["sessions"].as_array().expect("sessions").is_empty());

    fake.heal("create_attendance_session");
    let created = call_ok(&mut state, "attendance.create", json!({ "date": "2024-03-11" }));
    assert_eq!(created["rowCount"], 3);
}

#[test]
fn failed_close_keeps_the_session_open_until_retried() {
    let fake = roster_backend();
    let out = temp_dir("academicd-att-close-fail");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));
    let created = call_ok(&mut state, "attendance.create", json!({ "date": "2024-03-11" }));
    let session_id = created["open"]["sessionId"].as_str().expect("id").to_string();
    call_ok(
        &mut state,
        "attendance.setRowStatus",
        json!({ "studentId": "12", "status": "EXCUSED" }),
    );

    fake.fail("close_attendance_session");
    let resp = call(&mut state, "attendance.close", json!({}));
    assert_eq!(error_code(&resp), Some("api_error"));

    let roster = call_ok(&mut state, "attendance.roster", json!({}));
    assert_eq!(roster["open"]["sessionId"], session_id.as_str());
    assert_eq!(roster["rows"][2]["status"], "EXCUSED");
    let sessions = call_ok(&mut state, "attendance.sessions", json!({}));
    assert_eq!(sessions["sessions"][0]["isClosed"], false);
    assert_eq!(sessions["sessions"][0]["isCurrent"], true);

    fake.heal("close_attendance_session");
    let closed = call_ok(&mut state, "attendance.close", json!({}));
    assert_eq!(closed["closed"], session_id.as_str());
    assert_eq!(fake.count("close_attendance_session"), 2);
    let after = call(&mut state, "attendance.roster", json!({}));
    assert_eq!(error_code(&after), Some("no_session"));
}

#[test]
fn closed_session_cannot_be_reopened() {
    let fake = roster_backend();
    let out = temp_dir("academicd-att-close");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));
    let created = call_ok(&mut state, "attendance.create", json!({ "date": "2024-03-11" }));
    let session_id = created["open"]["sessionId"].as_str().expect("id").to_string();

    let closed = call_ok(&mut state, "attendance.close", json!({}));
    assert_eq!(closed["closed"], session_id.as_str());

    let no_session = call(&mut state, "attendance.roster", json!({}));
    assert_eq!(error_code(&no_session), Some("no_session"));
    let no_edit = call(
        &mut state,
        "attendance.setRowStatus",
        json!({ "studentId": "10", "status": "ABSENT" }),
    );
    assert_eq!(error_code(&no_edit), Some("no_session"));

    let sessions = call_ok(&mut state, "attendance.sessions", json!({}));
    assert_eq!(sessions["sessions"][0]["isClosed"], true);
    assert_eq!(sessions["sessions"][0]["canOpen"], false);

    let reopen = call(&mut state, "attendance.select", json!({ "sessionId": session_id }));
    assert_eq!(error_code(&reopen), Some("session_closed"));
}

#[test]
fn reopening_a_session_merges_late_enrolments_as_present() {
    let fake = roster_backend();
    fake.data().sessions.insert(
        "s1".to_string(),
        vec![AttendanceSessionSummary {
            id: "as-old".to_string(),
            date: "2024-03-04".to_string(),
            is_closed: false,
            rows: vec![
                AttendanceRow {
                    student_id: "10".to_string(),
                    status: AttendanceStatus::Excused,
                },
                AttendanceRow {
                    student_id: "11".to_string(),
                    status: AttendanceStatus::Absent,
                },
            ],
        }],
    );
    let out = temp_dir("academicd-att-merge");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));

    let opened = call_ok(&mut state, "attendance.select", json!({ "sessionId": "as-old" }));
    assert_eq!(opened["open"]["dirty"], true);

    let roster = call_ok(&mut state, "attendance.roster", json!({}));
    let statuses: Vec<&str> = roster["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .map(|r| r["status"].as_str().expect("status"))
        .collect();
    assert_eq!(statuses, vec!["EXCUSED", "ABSENT", "PRESENT"]);

    let missing = call(&mut state, "attendance.select", json!({ "sessionId": "nope" }));
    assert_eq!(error_code(&missing), Some("not_found"));
}

#[test]
fn roster_pages_independently_of_the_grades_table() {
    let students = (1..=45)
        .map(|i| student(&i.to_string(), "N", &format!("S{:02}", i)))
        .collect();
    let fake = Arc::new(FakeBackend::new().with_section("s1", students));
    let out = temp_dir("academicd-att-pages");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));
    call_ok(&mut state, "attendance.create", json!({ "date": "2024-03-11" }));

    let last = call_ok(&mut state, "attendance.roster", json!({ "page": 5 }));
    assert_eq!(last["rows"].as_array().expect("rows").len(), 5);
    assert_eq!(last["pagination"]["buttons"], json!([1, "…", 4, 5]));
    assert_eq!(last["pagination"]["hasNext"], false);

    let grades = call_ok(&mut state, "grades.view", json!({}));
    assert_eq!(grades["pagination"]["page"], 1);
    assert_eq!(grades["rows"].as_array().expect("rows").len(), 10);

    let beyond = call(&mut state, "attendance.roster", json!({ "page": 6 }));
    assert_eq!(error_code(&beyond), Some("bad_params"));
    let still = call_ok(&mut state, "attendance.roster", json!({}));
    assert_eq!(still["pagination"]["page"], 5);
}

#[test]
fn roster_paging_is_untouched_without_an_open_session() {
    let students = (1..=25)
        .map(|i| student(&i.to_string(), "N", &format!("S{:02}", i)))
        .collect();
    let fake = Arc::new(FakeBackend::new().with_section("s1", students));
    let out = temp_dir("academicd-att-pages-none");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));

    let refused = call(&mut state, "attendance.roster", json!({ "pageSize": 50 }));
    assert_eq!(error_code(&refused), Some("no_session"));

    call_ok(&mut state, "attendance.create", json!({ "date": "2024-03-11" }));
    let roster = call_ok(&mut state, "attendance.roster", json!({}));
    assert_eq!(roster["pagination"]["pageSize"], 10);
    assert_eq!(roster["rows"].as_array().expect("rows").len(), 10);
}

#[test]
fn import_save_is_refused_while_the_preview_has_errors() {
    let fake = roster_backend();
    let out = temp_dir("academicd-att-import");
    let file = out.join("asistencia.csv");
    std::fs::write(&file, "student_id,date,status\n10,2024-03-11,PRESENT\n").expect("csv");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));

    let early = call(&mut state, "attendance.importSave", json!({}));
    assert_eq!(error_code(&early), Some("no_preview"));

    fake.data().import_preview = ImportPreview {
        preview: vec![json!({ "student_id": "10", "status": "PRESENT" })],
        errors: vec![ImportRowError {
            row: 3,
            message: "estudiante desconocido".to_string(),
        }],
    };
    let preview = call_ok(
        &mut state,
        "attendance.importPreview",
        json!({ "path": file.to_string_lossy() }),
    );
    assert_eq!(preview["canSave"], false);
    assert_eq!(preview["errors"][0]["row"], 3);

    let refused = call(&mut state, "attendance.importSave", json!({}));
    assert_eq!(error_code(&refused), Some("import_has_errors"));
    assert_eq!(fake.count("save_attendance_import"), 0);

    fake.data().import_preview.errors.clear();
    let clean = call_ok(
        &mut state,
        "attendance.importPreview",
        json!({ "path": file.to_string_lossy() }),
    );
    assert_eq!(clean["canSave"], true);
    let saved = call_ok(&mut state, "attendance.importSave", json!({}));
    assert_eq!(saved["rows"], 1);
    assert_eq!(fake.data().imported.len(), 1);

    let twice = call(&mut state, "attendance.importSave", json!({}));
    assert_eq!(error_code(&twice), Some("no_preview"));
}

#[test]
fn import_preview_needs_an_existing_file() {
    let fake = roster_backend();
    let out = temp_dir("academicd-att-import-missing");
    let (mut state, _rx) = app(&fake, &out);
    call_ok(&mut state, "section.select", json!({ "sectionId": "s1" }));

    let resp = call(
        &mut state,
        "attendance.importPreview",
        json!({ "path": out.join("missing.csv").to_string_lossy() }),
    );
    assert_eq!(error_code(&resp), Some("bad_params"));
    assert_eq!(fake.count("preview_attendance_import"), 0);
}
