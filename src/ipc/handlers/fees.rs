use crate::ipc::helpers::{
    get_optional_str, get_required_i64, get_required_str, parse_date, student_exists, with_db,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::settings::SettingsService;
use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::HashMap;

fn fees_record(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let month = get_required_i64(params, "month")?;
    if !(1..=12).contains(&month) {
        return Err(HandlerErr::bad_params("month must be between 1 and 12"));
    }
    let amount = params
        .get("amount")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params("missing amount"))?;
    if !amount.is_finite() || amount <= 0.0 {
        return Err(HandlerErr::bad_params("amount must be positive"));
    }
    let paid_on = match get_optional_str(params, "paidOn")? {
        Some(raw) => parse_date(&raw, "paidOn")?,
        None => Local::now().date_naive(),
    };
    if !student_exists(conn, &student_id)? {
        return Err(HandlerErr::not_found("student"));
    }

    conn.execute(
        "INSERT INTO fee_payments(student_id, month, amount, paid_on)
         VALUES(?, ?, ?, ?)
         ON CONFLICT(student_id, month) DO UPDATE SET
           amount = excluded.amount,
           paid_on = excluded.paid_on",
        (&student_id, month, amount, paid_on.format("%Y-%m-%d").to_string()),
    )
    .map_err(|e| HandlerErr::update(e, "fee_payments"))?;
    Ok(json!({ "ok": true }))
}

fn fees_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let grade_level: i64 = conn
        .query_row(
            "SELECT grade_level FROM students WHERE id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    let monthly_fee = SettingsService::new(conn)
        .grades()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?
        .get(grade_level)
        .map(|g| g.monthly_fee)
        .unwrap_or(0.0);

    let mut stmt = conn
        .prepare("SELECT month, amount, paid_on FROM fee_payments WHERE student_id = ?")
        .map_err(HandlerErr::query)?;
    let paid: HashMap<i64, (f64, String)> = stmt
        .query_map([&student_id], |r| Ok((r.get(0)?, (r.get(1)?, r.get(2)?))))
        .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())
        .map_err(HandlerErr::query)?;

    let mut total_paid = 0.0;
    let months: Vec<serde_json::Value> = (1..=12)
        .map(|m| match paid.get(&m) {
            Some((amount, paid_on)) => {
                total_paid += amount;
                json!({ "month": m, "paid": true, "amount": amount, "paidOn": paid_on })
            }
            None => json!({ "month": m, "paid": false, "amount": 0.0, "paidOn": null }),
        })
        .collect();
    let total_due = monthly_fee * 12.0;
    Ok(json!({
        "studentId": student_id,
        "monthlyFee": monthly_fee,
        "months": months,
        "totalDue": total_due,
        "totalPaid": total_paid,
        "balance": total_due - total_paid,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "fees.record" => Some(with_db(state, req, fees_record)),
        "fees.get" => Some(with_db(state, req, fees_get)),
        _ => None,
    }
}
