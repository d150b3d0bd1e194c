use crate::ipc::handlers::hostel::vacate;
use crate::ipc::handlers::students::load_student;
use crate::ipc::helpers::{get_optional_str, get_required_str, parse_date, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;

const DEFAULT_CONDUCT: &str = "Good";

fn certificate_row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let last: String = r.get(5)?;
    let first: String = r.get(6)?;
    Ok(json!({
        "serial": r.get::<_, i64>(0)?,
        "studentId": r.get::<_, String>(1)?,
        "issuedOn": r.get::<_, String>(2)?,
        "reason": r.get::<_, String>(3)?,
        "conduct": r.get::<_, String>(4)?,
        "displayName": format!("{}, {}", last, first),
        "gradeLevel": r.get::<_, i64>(7)?,
    }))
}

const CERTIFICATE_SELECT: &str = "SELECT c.serial, c.student_id, c.issued_on, c.reason, c.conduct,
        s.last_name, s.first_name, s.grade_level
     FROM transfer_certificates c
     JOIN students s ON s.id = c.student_id";

fn certificates_issue(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let reason = get_required_str(params, "reason")?;
    let conduct = get_optional_str(params, "conduct")?.unwrap_or_else(|| DEFAULT_CONDUCT.to_string());
    let issued_on = match get_optional_str(params, "issuedOn")? {
        Some(raw) => parse_date(&raw, "issuedOn")?,
        None => Local::now().date_naive(),
    };
    let issued_on = issued_on.format("%Y-%m-%d").to_string();

    let status: String = conn
        .query_row("SELECT status FROM students WHERE id = ?", [&student_id], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    if status != "active" {
        return Err(HandlerErr::bad_params("student has already left the school"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    tx.execute(
        "INSERT INTO transfer_certificates(student_id, issued_on, reason, conduct)
         VALUES(?, ?, ?, ?)",
        (&student_id, &issued_on, &reason, &conduct),
    )
    .map_err(|e| HandlerErr::update(e, "transfer_certificates"))?;
    let serial = tx.last_insert_rowid();
    tx.execute(
        "UPDATE students SET status = 'transferred', exit_date = ?, updated_at = datetime('now')
         WHERE id = ?",
        (&issued_on, &student_id),
    )
    .map_err(|e| HandlerErr::update(e, "students"))?;
    vacate(&tx, &student_id)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    tracing::info!(student_id = %student_id, serial, "transfer certificate issued");
    let student = load_student(conn, &student_id)?;
    Ok(json!({ "serial": serial, "issuedOn": issued_on, "student": student }))
}

fn certificates_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_optional_str(params, "studentId")?;
    let (sql, binds) = match student_id {
        Some(id) => (
            format!("{} WHERE c.student_id = ? ORDER BY c.serial", CERTIFICATE_SELECT),
            vec![id],
        ),
        None => (format!("{} ORDER BY c.serial", CERTIFICATE_SELECT), Vec::new()),
    };
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let certificates = stmt
        .query_map(params_from_iter(binds), certificate_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "certificates": certificates }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "certificates.issue" => Some(with_db(state, req, certificates_issue)),
        "certificates.list" => Some(with_db(state, req, certificates_list)),
        _ => None,
    }
}
