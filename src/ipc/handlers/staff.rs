use crate::ipc::helpers::{get_optional_str, get_required_str, parse_date, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

const STAFF_COLUMNS: &str = "id, first_name, last_name, role, email, phone, joined_on, status";
const STAFF_STATUSES: &[&str] = &["active", "left"];

fn staff_row_json(r: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let first_name: String = r.get(1)?;
    let last_name: String = r.get(2)?;
    Ok(json!({
        "id": r.get::<_, String>(0)?,
        "firstName": first_name,
        "lastName": last_name,
        "displayName": format!("{}, {}", last_name, first_name),
        "role": r.get::<_, String>(3)?,
        "email": r.get::<_, Option<String>>(4)?,
        "phone": r.get::<_, Option<String>>(5)?,
        "joinedOn": r.get::<_, Option<String>>(6)?,
        "status": r.get::<_, String>(7)?,
    }))
}

fn load_staff(conn: &Connection, staff_id: &str) -> Result<serde_json::Value, HandlerErr> {
    let sql = format!("SELECT {} FROM staff WHERE id = ?", STAFF_COLUMNS);
    conn.query_row(&sql, [staff_id], staff_row_json)
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("staff member"))
}

fn staff_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut where_parts: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    if let Some(role) = get_optional_str(params, "role")? {
        where_parts.push("role = ?");
        bind_values.push(Value::Text(role));
    }
    if let Some(status) = get_optional_str(params, "status")? {
        if !STAFF_STATUSES.contains(&status.as_str()) {
            return Err(HandlerErr::bad_params("status must be active or left"));
        }
        where_parts.push("status = ?");
        bind_values.push(Value::Text(status));
    }
    let where_sql = if where_parts.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", where_parts.join(" AND "))
    };
    let sql = format!(
        "SELECT {} FROM staff {} ORDER BY last_name, first_name",
        STAFF_COLUMNS, where_sql
    );
    let mut stmt = conn.prepare(&sql).map_err(HandlerErr::query)?;
    let staff = stmt
        .query_map(params_from_iter(bind_values), staff_row_json)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "staff": staff }))
}

fn staff_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let staff_id = get_required_str(params, "staffId")?;
    load_staff(conn, &staff_id).map(|s| json!({ "staff": s }))
}

fn staff_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let first_name = get_required_str(params, "firstName")?;
    let last_name = get_required_str(params, "lastName")?;
    let role = get_required_str(params, "role")?;
    let email = get_optional_str(params, "email")?;
    let phone = get_optional_str(params, "phone")?;
    let joined_on = match get_optional_str(params, "joinedOn")? {
        Some(raw) => parse_date(&raw, "joinedOn")?,
        None => Local::now().date_naive(),
    };

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO staff(id, first_name, last_name, role, email, phone, joined_on, status, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, 'active', datetime('now'))",
        (
            &id,
            &first_name,
            &last_name,
            &role,
            &email,
            &phone,
            joined_on.format("%Y-%m-%d").to_string(),
        ),
    )
    .map_err(|e| HandlerErr::update(e, "staff"))?;
    tracing::debug!(staff_id = %id, role = %role, "staff member created");
    load_staff(conn, &id).map(|s| json!({ "staff": s }))
}

fn staff_update(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let staff_id = get_required_str(params, "staffId")?;
    let Some(patch) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err(HandlerErr::bad_params("missing/invalid patch"));
    };
    load_staff(conn, &staff_id)?;

    let mut set_parts: Vec<String> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();
    for (key, column) in [
        ("firstName", "first_name"),
        ("lastName", "last_name"),
        ("role", "role"),
    ] {
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
    for (key, column) in [("email", "email"), ("phone", "phone")] {
        if let Some(v) = patch.get(key) {
            let text = match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) if s.trim().is_empty() => None,
                serde_json::Value::String(s) => Some(s.trim().to_string()),
                _ => {
                    return Err(HandlerErr::bad_params(format!(
                        "patch.{} must be a string or null",
                        key
                    )))
                }
            };
            set_parts.push(format!("{} = ?", column));
            bind_values.push(text.map(Value::Text).unwrap_or(Value::Null));
        }
    }
    if let Some(v) = patch.get("status") {
        let status = v
            .as_str()
            .filter(|s| STAFF_STATUSES.contains(s))
            .ok_or_else(|| HandlerErr::bad_params("patch.status must be active or left"))?;
        set_parts.push("status = ?".into());
        bind_values.push(Value::Text(status.to_string()));
    }
    if let Some(v) = patch.get("joinedOn") {
        let raw = v
            .as_str()
            .ok_or_else(|| HandlerErr::bad_params("patch.joinedOn must be a string"))?;
        let d = parse_date(raw, "joinedOn")?;
        set_parts.push("joined_on = ?".into());
        bind_values.push(Value::Text(d.format("%Y-%m-%d").to_string()));
    }

    if set_parts.is_empty() {
        return Err(HandlerErr::bad_params("patch must include at least one field"));
    }
    set_parts.push("updated_at = datetime('now')".into());
    bind_values.push(Value::Text(staff_id.clone()));
    let sql = format!("UPDATE staff SET {} WHERE id = ?", set_parts.join(", "));
    conn.execute(&sql, params_from_iter(bind_values))
        .map_err(|e| HandlerErr::update(e, "staff"))?;
    load_staff(conn, &staff_id).map(|s| json!({ "staff": s }))
}

fn staff_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let staff_id = get_required_str(params, "staffId")?;
    let changed = conn
        .execute("DELETE FROM staff WHERE id = ?", [&staff_id])
        .map_err(|e| HandlerErr::update(e, "staff"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("staff member"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.list" => Some(with_db(state, req, staff_list)),
        "staff.get" => Some(with_db(state, req, staff_get)),
        "staff.create" => Some(with_db(state, req, staff_create)),
        "staff.update" => Some(with_db(state, req, staff_update)),
        "staff.delete" => Some(with_db(state, req, staff_delete)),
        _ => None,
    }
}
