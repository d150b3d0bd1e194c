use crate::ipc::helpers::{get_required_i64, get_required_str, student_exists, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

const DAY_CODES: &[char] = &['P', 'A', 'L', 'E'];

fn parse_month_key(month: &str) -> Result<(i32, u32), HandlerErr> {
    let bad = || HandlerErr::bad_params("month must be YYYY-MM");
    let (y, m) = month.trim().split_once('-').ok_or_else(bad)?;
    let year = y.parse::<i32>().map_err(|_| bad())?;
    let month_num = m.parse::<u32>().map_err(|_| bad())?;
    if !(1..=12).contains(&month_num) {
        return Err(HandlerErr::bad_params("month must be between 01 and 12"));
    }
    Ok((year, month_num))
}

fn days_in_month(year: i32, month: u32) -> usize {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    match (
        NaiveDate::from_ymd_opt(year, month, 1),
        NaiveDate::from_ymd_opt(ny, nm, 1),
    ) {
        (Some(first), Some(next)) => (next - first).num_days() as usize,
        _ => 30,
    }
}

fn normalize_day_codes(raw: &str, days: usize) -> String {
    let mut chars: Vec<char> = raw.chars().take(days).collect();
    chars.resize(days, ' ');
    chars.into_iter().collect()
}

fn patch_day_code(existing: &str, days: usize, day: usize, code: Option<char>) -> String {
    let mut chars: Vec<char> = normalize_day_codes(existing, days).chars().collect();
    if let Some(slot) = chars.get_mut(day.saturating_sub(1)) {
        *slot = code.unwrap_or(' ');
    }
    chars.into_iter().collect()
}

fn parse_optional_code(v: Option<&serde_json::Value>) -> Result<Option<char>, HandlerErr> {
    match v {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => {
            let s = v
                .as_str()
                .ok_or_else(|| HandlerErr::bad_params("code must be a string or null"))?
                .trim()
                .to_ascii_uppercase();
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (None, _) => Ok(None),
                (Some(c), None) if DAY_CODES.contains(&c) => Ok(Some(c)),
                _ => Err(HandlerErr::bad_params("code must be one of P, A, L, E")),
            }
        }
    }
}

fn parse_day(params: &serde_json::Value, days: usize) -> Result<usize, HandlerErr> {
    let day = get_required_i64(params, "day")?;
    if day < 1 || day as usize > days {
        return Err(HandlerErr::bad_params("day out of range for month"));
    }
    Ok(day as usize)
}

fn count_codes(codes: &str) -> serde_json::Value {
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in codes.chars().filter(|c| DAY_CODES.contains(c)) {
        *counts.entry(c).or_insert(0) += 1;
    }
    json!({
        "present": counts.get(&'P').copied().unwrap_or(0),
        "absent": counts.get(&'A').copied().unwrap_or(0),
        "late": counts.get(&'L').copied().unwrap_or(0),
        "excused": counts.get(&'E').copied().unwrap_or(0),
    })
}

fn attendance_month_open(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let grade_level = get_required_i64(params, "gradeLevel")?;
    let month_key = get_required_str(params, "month")?;
    let (year, month_num) = parse_month_key(&month_key)?;
    let days = days_in_month(year, month_num);

    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.last_name, s.first_name, s.roll_no, a.day_codes
             FROM students s
             LEFT JOIN attendance_student_months a ON a.student_id = s.id AND a.month = ?
             WHERE s.grade_level = ? AND s.status = 'active'
             ORDER BY s.roll_no, s.last_name, s.first_name",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map((&month_key, grade_level), |r| {
            let last: String = r.get(1)?;
            let first: String = r.get(2)?;
            let codes: Option<String> = r.get(4)?;
            let codes = normalize_day_codes(codes.as_deref().unwrap_or(""), days);
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "displayName": format!("{}, {}", last, first),
                "rollNo": r.get::<_, i64>(3)?,
                "totals": count_codes(&codes),
                "dayCodes": codes,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    Ok(json!({
        "gradeLevel": grade_level,
        "month": month_key,
        "daysInMonth": days,
        "rows": rows,
    }))
}

fn upsert_student_day(
    conn: &Connection,
    student_id: &str,
    month_key: &str,
    days: usize,
    day: usize,
    code: Option<char>,
) -> Result<(), HandlerErr> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT day_codes FROM attendance_student_months WHERE student_id = ? AND month = ?",
            (student_id, month_key),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    let patched = patch_day_code(existing.as_deref().unwrap_or(""), days, day, code);
    conn.execute(
        "INSERT INTO attendance_student_months(student_id, month, day_codes)
         VALUES(?, ?, ?)
         ON CONFLICT(student_id, month) DO UPDATE SET
           day_codes = excluded.day_codes",
        (student_id, month_key, &patched),
    )
    .map_err(|e| HandlerErr::update(e, "attendance_student_months"))?;
    Ok(())
}

fn attendance_set_student_day(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let month_key = get_required_str(params, "month")?;
    let (year, month_num) = parse_month_key(&month_key)?;
    let days = days_in_month(year, month_num);
    let day = parse_day(params, days)?;
    let code = parse_optional_code(params.get("code"))?;
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student"));
    }
    upsert_student_day(conn, &student_id, &month_key, days, day, code)?;
    Ok(json!({ "ok": true }))
}

fn attendance_bulk_stamp_day(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let month_key = get_required_str(params, "month")?;
    let (year, month_num) = parse_month_key(&month_key)?;
    let days = days_in_month(year, month_num);
    let day = parse_day(params, days)?;
    let code = parse_optional_code(params.get("code"))?;
    let Some(student_ids_json) = params.get("studentIds").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing studentIds"));
    };
    let student_ids: Vec<String> = student_ids_json
        .iter()
        .filter_map(|v| v.as_str().map(|s| s.to_string()))
        .collect();

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut stamped = 0usize;
    for student_id in student_ids {
        if !student_exists(&tx, &student_id)? {
            continue;
        }
        upsert_student_day(&tx, &student_id, &month_key, days, day, code)?;
        stamped += 1;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "ok": true, "stamped": stamped }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.monthOpen" => Some(with_db(state, req, attendance_month_open)),
        "attendance.setStudentDay" => Some(with_db(state, req, attendance_set_student_day)),
        "attendance.bulkStampDay" => Some(with_db(state, req, attendance_bulk_stamp_day)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_lengths_follow_the_calendar() {
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2025, 12), 31);
        assert_eq!(days_in_month(2025, 4), 30);
    }

    #[test]
    fn patching_pads_and_replaces_one_day() {
        let patched = patch_day_code("PP", 5, 4, Some('A'));
        assert_eq!(patched, "PP A ");
        assert_eq!(patch_day_code(&patched, 5, 1, None), " P A ");
    }

    #[test]
    fn codes_are_validated() {
        assert_eq!(parse_optional_code(Some(&json!("l"))).ok(), Some(Some('L')));
        assert!(parse_optional_code(Some(&json!("X"))).is_err());
        assert!(parse_optional_code(Some(&json!("PA"))).is_err());
        assert_eq!(parse_optional_code(None).ok(), Some(None));
    }
}
