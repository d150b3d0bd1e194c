use crate::grading::GradeDefinition;
use crate::ipc::helpers::{get_required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::settings::SettingsService;
use chrono::Duration;
use rusqlite::Connection;
use serde_json::json;

fn settings_get(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let config = SettingsService::new(conn)
        .load()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;
    serde_json::to_value(config).map_err(HandlerErr::query)
}

fn settings_set_academic_year(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let year = get_required_str(params, "year")?;
    let saved = SettingsService::new(conn)
        .set_academic_year(&year)
        .map_err(|e| HandlerErr::settings(e, "db_update_failed"))?;
    Ok(json!({ "academicYear": saved }))
}

fn settings_set_grades(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let raw = params
        .get("grades")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing grades"))?;
    let grades: Vec<GradeDefinition> = serde_json::from_value(raw)
        .map_err(|e| HandlerErr::bad_params(format!("invalid grades: {}", e)))?;
    let table = SettingsService::new(conn)
        .set_grades(grades)
        .map_err(|e| HandlerErr::settings(e, "db_update_failed"))?;
    Ok(json!({
        "gradeCount": table.grades().len(),
        "terminalLevel": table.terminal_level()
    }))
}

fn handle_settings_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let resp = with_db(state, req, |conn, params| {
        let patch = params
            .get("patch")
            .and_then(|v| v.as_object())
            .ok_or_else(|| HandlerErr::bad_params("patch must be an object"))?;
        let svc = SettingsService::new(conn);
        svc.update(patch)
            .map_err(|e| HandlerErr::settings(e, "db_update_failed"))?;
        let notifications = svc
            .notifications()
            .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;
        Ok(json!({ "ok": true, "notifications": notifications }))
    });
    if let Some(seconds) = resp
        .pointer("/result/notifications/toastTimeoutSeconds")
        .and_then(|v| v.as_i64())
    {
        state.board.set_timeout(Duration::seconds(seconds));
    }
    resp
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.get" => Some(with_db(state, req, settings_get)),
        "settings.setAcademicYear" => Some(with_db(state, req, settings_set_academic_year)),
        "settings.setGrades" => Some(with_db(state, req, settings_set_grades)),
        "settings.update" => Some(handle_settings_update(state, req)),
        _ => None,
    }
}
