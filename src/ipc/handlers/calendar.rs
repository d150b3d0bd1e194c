use crate::ipc::helpers::{
    get_optional_str, get_required_date, get_required_str, now_param, parse_date, today_param,
    with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::notify::{merged_calendar, CalendarEvent, EventKind};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

/// School-defined events, oldest first. Rows with an unreadable date are skipped.
pub(crate) fn load_school_events(conn: &Connection) -> Result<Vec<CalendarEvent>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, title, date FROM calendar_events ORDER BY date, id")
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let mut events = Vec::with_capacity(rows.len());
    for (id, title, raw_date) in rows {
        match NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d") {
            Ok(date) => events.push(CalendarEvent {
                id,
                title,
                date,
                kind: EventKind::School,
            }),
            Err(_) => tracing::warn!(event_id = %id, date = %raw_date, "skipping event with bad date"),
        }
    }
    Ok(events)
}

fn calendar_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let now = now_param(params)?;
    let today = today_param(params, now)?;
    let from = get_optional_str(params, "from")?
        .map(|raw| parse_date(&raw, "from"))
        .transpose()?;
    let to = get_optional_str(params, "to")?
        .map(|raw| parse_date(&raw, "to"))
        .transpose()?;

    let events: Vec<CalendarEvent> = merged_calendar(load_school_events(conn)?, today)
        .into_iter()
        .filter(|e| from.map_or(true, |f| e.date >= f))
        .filter(|e| to.map_or(true, |t| e.date <= t))
        .collect();
    Ok(json!({ "events": events }))
}

fn calendar_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let title = get_required_str(params, "title")?;
    let date = get_required_date(params, "date")?;
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO calendar_events(id, title, date) VALUES(?, ?, ?)",
        (&id, &title, date.format("%Y-%m-%d").to_string()),
    )
    .map_err(|e| HandlerErr::update(e, "calendar_events"))?;
    let event = CalendarEvent {
        id,
        title,
        date,
        kind: EventKind::School,
    };
    Ok(json!({ "event": event }))
}

fn calendar_delete(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let event_id = get_required_str(params, "eventId")?;
    if event_id.starts_with("holiday-") {
        return Err(HandlerErr::bad_params("public holidays cannot be deleted"));
    }
    let changed = conn
        .execute("DELETE FROM calendar_events WHERE id = ?", [&event_id])
        .map_err(|e| HandlerErr::update(e, "calendar_events"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("event"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "calendar.list" => Some(with_db(state, req, calendar_list)),
        "calendar.create" => Some(with_db(state, req, calendar_create)),
        "calendar.delete" => Some(with_db(state, req, calendar_delete)),
        _ => None,
    }
}
