use crate::ipc::helpers::{
    get_optional_str, get_required_i64, get_required_str, parse_date, student_exists, with_db,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::promotion::StudentStatus;
use crate::settings::SettingsService;
use chrono::Local;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const STUDENT_COLUMNS: &str = "id, first_name, last_name, grade_level, roll_no, status,
     admission_date, exit_date, guardian_name, contact";

pub(crate) fn student_row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let first_name: String = r.get(1)?;
    let last_name: String = r.get(2)?;
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "firstName": first_name,
        "lastName": last_name,
        "displayName": format!("{}, {}", last_name, first_name),
        "gradeLevel": r.get::<_, i64>(3)?,
        "rollNo": r.get::<_, i64>(4)?,
        "status": r.get::<_, String>(5)?,
        "admissionDate": r.get::<_, Option<String>>(6)?,
        "exitDate": r.get::<_, Option<String>>(7)?,
        "guardianName": r.get::<_, Option<String>>(8)?,
        "contact": r.get::<_, Option<String>>(9)?,
    }))
}

pub(crate) fn load_student(conn: &Connection, student_id: &str) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!("SELECT {} FROM students WHERE id = ?", STUDENT_COLUMNS);
    conn.query_row(&sql, [student_id], student_row_json)
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("student"))
}

fn ensure_grade_configured(conn: &Connection, level: i64) -> Result<(), HandlerErr> {
    let grades = SettingsService::new(conn)
        .grades()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;
    if grades.get(level).is_none() {
        return Err(HandlerErr::bad_params(format!(
            "grade level {} is not configured",
            level
        )));
    }
    Ok(())
}

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut where_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    if let Some(level) = params.get("gradeLevel").and_then(|v| v.as_i64()) {
        where_parts.push("grade_level = ?");
        bind_values.push(Value::Integer(level));
    }
    if let Some(status) = get_optional_str(params, "status")? {
        let Some(status) = StudentStatus::parse(&status) else {
            return Err(HandlerErr::bad_params("status must be active or transferred"));
        };
        where_parts.push("status = ?");
        bind_values.push(Value::Text(status.as_str().to_string()));
    }
    let where_sql = if where_parts.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_parts.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM students {} ORDER BY grade_level, roll_no, last_name, first_name",
        STUDENT_COLUMNS, where_sql
    );
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let students = stmt
        .query_map(params_from_iter(bind_values), student_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "students": students }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let first_name = get_required_str(params, "firstName")?;
    let last_name = get_required_str(params, "lastName")?;
    let grade_level = get_required_i64(params, "gradeLevel")?;
    ensure_grade_configured(conn, grade_level)?;

    let roll_no = match params.get("rollNo").and_then(|v| v.as_i64()) {
        Some(n) if n < 0 => return Err(HandlerErr::bad_params("rollNo must not be negative")),
        Some(n) => n,
        None => conn
            .query_row(
                "SELECT COALESCE(MAX(roll_no), 0) + 1 FROM students WHERE grade_level = ? AND status = 'active'",
                [grade_level],
                |r| r.get::<_, i64>(0),
            )
            .map_err(HandlerErr::query)?,
    };
    let admission_date = match get_optional_str(params, "admissionDate")? {
        Some(raw) => parse_date(&raw, "admissionDate")?,
        None => Local::now().date_naive(),
    };
    let guardian_name = get_optional_str(params, "guardianName")?;
    let contact = get_optional_str(params, "contact")?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, first_name, last_name, grade_level, roll_no, status,
           admission_date, guardian_name, contact, updated_at)
         VALUES(?, ?, ?, ?, ?, 'active', ?, ?, ?, datetime('now'))",
        (
            &id,
            &first_name,
            &last_name,
            grade_level,
            roll_no,
            admission_date.format("%Y-%m-%d").to_string(),
            &guardian_name,
            &contact,
        ),
    )
    .map_err(|e| HandlerErr::update(e, "students"))?;
    tracing::debug!(student_id = %id, grade_level, "student created");
    load_student(conn, &id).map(|s| json!({ "student": s }))
}

fn push_optional_text(
    patch: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    column: &str,
    set_parts: &mut Vec<String>,
    bind_values: &mut Vec<Value>,
) -> Result<(), HandlerErr> {
    let Some(v) = patch.get(key) else {
        return Ok(());
    };
    if v.is_null() {
        set_parts.push(format!("{} = ?", column));
        bind_values.push(Value::Null);
        return Ok(());
    }
    let Some(s) = v.as_str() else {
        return Err(HandlerErr::bad_params(format!(
            "patch.{} must be a string or null",
            key
        )));
    };
    let t = s.trim().to_string();
    set_parts.push(format!("{} = ?", column));
    bind_values.push(if t.is_empty() { Value::Null } else { Value::Text(t) });
    Ok(())
}

fn students_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing/invalid patch"));
    };
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student"));
    }

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    for (key, column) in [("firstName", "first_name"), ("lastName", "last_name")] {
        if let Some(v) = patch.get(key) {
            let s = v
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| HandlerErr::bad_params(format!("{} must be a non-empty string", key)))?;
            set_parts.push(format!("{} = ?", column));
            bind_values.push(Value::Text(s.to_string()));
        }
    }
    if let Some(v) = patch.get("gradeLevel") {
        let level = v
            .as_i64()
            .ok_or_else(|| HandlerErr::bad_params("patch.gradeLevel must be an integer"))?;
        ensure_grade_configured(conn, level)?;
        set_parts.push("grade_level = ?".into());
        bind_values.push(Value::Integer(level));
    }
    if let Some(v) = patch.get("rollNo") {
        let n = v
            .as_i64()
            .filter(|n| *n >= 0)
            .ok_or_else(|| HandlerErr::bad_params("patch.rollNo must be a non-negative integer"))?;
        set_parts.push("roll_no = ?".into());
        bind_values.push(Value::Integer(n));
    }
    push_optional_text(patch, "guardianName", "guardian_name", &mut set_parts, &mut bind_values)?;
    push_optional_text(patch, "contact", "contact", &mut set_parts, &mut bind_values)?;
    if let Some(v) = patch.get("admissionDate") {
        let raw = v
            .as_str()
            .ok_or_else(|| HandlerErr::bad_params("patch.admissionDate must be a string"))?;
        let d = parse_date(raw, "admissionDate")?;
        set_parts.push("admission_date = ?".into());
        bind_values.push(Value::Text(d.format("%Y-%m-%d").to_string()));
    }

    if set_parts.is_empty() {
        return Err(HandlerErr::bad_params("patch must include at least one field"));
    }
    set_parts.push("updated_at = datetime('now')".into());
    bind_values.push(Value::Text(student_id.clone()));
    let sql = format!("UPDATE students SET {} WHERE id = ?", set_parts.join(", "));
    conn.execute(&sql, params_from_iter(bind_values))
        .map_err(|e| HandlerErr::update(e, "students"))?;
    load_student(conn, &student_id).map(|s| json!({ "student": s }))
}

fn students_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student"));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for table in [
        "exam_results",
        "fee_payments",
        "attendance_student_months",
        "transfer_certificates",
        "hostel_allocations",
    ] {
        tx.execute(
            &format!("DELETE FROM {} WHERE student_id = ?", table),
            [&student_id],
        )
        .map_err(|e| HandlerErr::update(e, table))?;
    }
    tx.execute("DELETE FROM students WHERE id = ?", [&student_id])
        .map_err(|e| HandlerErr::update(e, "students"))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

fn students_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    load_student(conn, &student_id).map(|s| json!({ "student": s }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(with_db(state, req, students_list)),
        "students.get" => Some(with_db(state, req, students_get)),
        "students.create" => Some(with_db(state, req, students_create)),
        "students.update" => Some(with_db(state, req, students_update)),
        "students.delete" => Some(with_db(state, req, students_delete)),
        _ => None,
    }
}
