use crate::ipc::error::{err, ok};
use crate::ipc::handlers::calendar::load_school_events;
use crate::ipc::helpers::{get_required_str, now_param, today_param, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::notify::{due_events, merged_calendar, DedupLedger, Notification, NotificationBoard};
use crate::settings::SettingsService;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde_json::json;

/// Rebuilds the ledger from `notification_log`, rolls it to `today` and drops
/// rows left over from earlier days.
fn load_ledger(conn: &Connection, today: NaiveDate) -> Result<DedupLedger, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT day, event_id FROM notification_log ORDER BY day DESC")
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let stored_day = rows
        .first()
        .and_then(|(day, _)| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok());
    let mut ledger = match stored_day {
        Some(day) => {
            let key = day.format("%Y-%m-%d").to_string();
            DedupLedger::restore(
                day,
                rows.into_iter()
                    .filter(|(d, _)| *d == key)
                    .map(|(_, id)| id),
            )
        }
        None => DedupLedger::new(today),
    };

    if ledger.roll_to(today) {
        tracing::debug!(day = %ledger.day(), "notification ledger rolled to a new day");
    } else if !ledger.is_empty() {
        tracing::debug!(day = %ledger.day(), announced = ledger.len(), "notification ledger restored");
    }
    conn.execute(
        "DELETE FROM notification_log WHERE day <> ?",
        [today.format("%Y-%m-%d").to_string()],
    )
    .map_err(|e| HandlerErr::update(e, "notification_log"))?;
    Ok(ledger)
}

fn run_check(
    conn: &Connection,
    board: &mut NotificationBoard,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let now = now_param(params)?;
    let today = today_param(params, now)?;
    let settings = SettingsService::new(conn)
        .notifications()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;
    board.set_timeout(Duration::seconds(settings.toast_timeout_seconds));

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut ledger = load_ledger(&tx, today)?;
    let events = merged_calendar(load_school_events(&tx)?, today);
    let due = due_events(today, &events, settings.lead_days);
    let repeats = due.iter().filter(|e| ledger.contains(&e.id)).count();
    if repeats > 0 {
        tracing::debug!(repeats, "due events already announced today");
    }
    let fresh: Vec<Notification> = ledger
        .admit(due)
        .into_iter()
        .map(|e| Notification::announce(e, today, now))
        .collect();

    let day_key = today.format("%Y-%m-%d").to_string();
    for n in &fresh {
        tx.execute(
            "INSERT OR IGNORE INTO notification_log(day, event_id) VALUES(?, ?)",
            (&day_key, &n.event_id),
        )
        .map_err(|e| HandlerErr::update(e, "notification_log"))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    if !fresh.is_empty() {
        tracing::info!(
            day = %today,
            count = fresh.len(),
            lead_days = settings.lead_days,
            "notifications emitted"
        );
    }
    for n in &fresh {
        board.post(n.clone());
    }
    board.expire(now);

    Ok(json!({
        "today": today,
        "leadDays": settings.lead_days,
        "emitted": fresh,
        "active": board.active(),
    }))
}

fn active_at(board: &mut NotificationBoard, now: NaiveDateTime) -> serde_json::Value {
    board.expire(now);
    json!({ "active": board.active() })
}

fn handle_check(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match run_check(conn, &mut state.board, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(e) => e.response(&req.id),
    }
}

fn handle_active(state: &mut AppState, req: &Request) -> serde_json::Value {
    match now_param(&req.params) {
        Ok(now) => ok(&req.id, active_at(&mut state.board, now)),
        Err(e) => e.response(&req.id),
    }
}

fn handle_dismiss(state: &mut AppState, req: &Request) -> serde_json::Value {
    let event_id = match get_required_str(&req.params, "eventId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let dismissed = state.board.dismiss(&event_id);
    ok(&req.id, json!({ "dismissed": dismissed }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notifications.check" => Some(handle_check(state, req)),
        "notifications.active" => Some(handle_active(state, req)),
        "notifications.dismiss" => Some(handle_dismiss(state, req)),
        _ => None,
    }
}
