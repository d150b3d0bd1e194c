use crate::ipc::helpers::{
    get_optional_str, get_required_i64, get_required_str, parse_date, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct Room {
    name: String,
    capacity: i64,
}

fn load_room(conn: &Connection, room_id: &str) -> Result<Room, HandlerErr> {
    conn.query_row(
        "SELECT name, capacity FROM hostel_rooms WHERE id = ?",
        [room_id],
        |r| {
            Ok(Room {
                name: r.get(0)?,
                capacity: r.get(1)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::query)?
    .ok_or_else(|| HandlerErr::not_found("room"))
}

fn occupancy(conn: &Connection, room_id: &str) -> Result<i64, HandlerErr> {
    conn.query_row(
        "SELECT COUNT(*) FROM hostel_allocations WHERE room_id = ?",
        [room_id],
        |r| r.get(0),
    )
    .map_err(HandlerErr::query)
}

/// Drops a student's bed, if any. Used when the student leaves the school.
pub(crate) fn vacate(conn: &Connection, student_id: &str) -> Result<bool, HandlerErr> {
    conn.execute(
        "DELETE FROM hostel_allocations WHERE student_id = ?",
        [student_id],
    )
    .map(|n| n > 0)
    .map_err(|e| HandlerErr::update(e, "hostel_allocations"))
}

fn hostel_list_rooms(conn: &Connection, _params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT r.id, r.name, r.capacity, r.monthly_fee, COUNT(a.student_id)
             FROM hostel_rooms r
             LEFT JOIN hostel_allocations a ON a.room_id = r.id
             GROUP BY r.id
             ORDER BY r.name",
        )
        .map_err(HandlerErr::query)?;
    let rooms = stmt
        .query_map([], |r| {
            let capacity: i64 = r.get(2)?;
            let occupied: i64 = r.get(4)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "name": r.get::<_, String>(1)?,
                "capacity": capacity,
                "monthlyFee": r.get::<_, f64>(3)?,
                "occupied": occupied,
                "free": (capacity - occupied).max(0),
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({ "rooms": rooms }))
}

fn hostel_create_room(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let capacity = get_required_i64(params, "capacity")?;
    if capacity < 1 {
        return Err(HandlerErr::bad_params("capacity must be at least 1"));
    }
    let monthly_fee = match params.get("monthlyFee") {
        None | Some(serde_json::Value::Null) => 0.0,
        Some(v) => v
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .ok_or_else(|| HandlerErr::bad_params("monthlyFee must be a non-negative number"))?,
    };
    let taken: Option<String> = conn
        .query_row("SELECT id FROM hostel_rooms WHERE name = ?", [&name], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::query)?;
    if taken.is_some() {
        return Err(HandlerErr::bad_params(format!("room {} already exists", name)));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO hostel_rooms(id, name, capacity, monthly_fee) VALUES(?, ?, ?, ?)",
        (&id, &name, capacity, monthly_fee),
    )
    .map_err(|e| HandlerErr::update(e, "hostel_rooms"))?;
    Ok(json!({
        "room": { "id": id, "name": name, "capacity": capacity, "monthlyFee": monthly_fee }
    }))
}

fn hostel_delete_room(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let room_id = get_required_str(params, "roomId")?;
    load_room(conn, &room_id)?;
    if occupancy(conn, &room_id)? > 0 {
        return Err(HandlerErr::bad_params("room still has occupants"));
    }
    conn.execute("DELETE FROM hostel_rooms WHERE id = ?", [&room_id])
        .map_err(|e| HandlerErr::update(e, "hostel_rooms"))?;
    Ok(json!({ "ok": true }))
}

fn hostel_allocate(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let room_id = get_required_str(params, "roomId")?;
    let allocated_on = match get_optional_str(params, "allocatedOn")? {
        Some(raw) => parse_date(&raw, "allocatedOn")?,
        None => Local::now().date_naive(),
    };

    let status: String = conn
        .query_row("SELECT status FROM students WHERE id = ?", [&student_id], |r| r.get(0))
        .optional()
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::not_found("student"))?;
    if status != "active" {
        return Err(HandlerErr::bad_params("only active students can be given a room"));
    }
    let room = load_room(conn, &room_id)?;
    let current: Option<String> = conn
        .query_row(
            "SELECT room_id FROM hostel_allocations WHERE student_id = ?",
            [&student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    if current.as_deref() != Some(room_id.as_str()) && occupancy(conn, &room_id)? >= room.capacity {
        return Err(HandlerErr {
            code: "bad_params",
            message: format!("room {} is full", room.name),
            details: Some(json!({ "roomId": room_id, "capacity": room.capacity })),
        });
    }

    conn.execute(
        "INSERT INTO hostel_allocations(student_id, room_id, allocated_on)
         VALUES(?, ?, ?)
         ON CONFLICT(student_id) DO UPDATE SET
           room_id = excluded.room_id,
           allocated_on = excluded.allocated_on",
        (&student_id, &room_id, allocated_on.format("%Y-%m-%d").to_string()),
    )
    .map_err(|e| HandlerErr::update(e, "hostel_allocations"))?;
    Ok(json!({ "ok": true, "movedFrom": current.filter(|c| *c != room_id) }))
}

fn hostel_vacate(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    if !vacate(conn, &student_id)? {
        return Err(HandlerErr::not_found("allocation"));
    }
    Ok(json!({ "ok": true }))
}

fn hostel_occupants(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let room_id = get_required_str(params, "roomId")?;
    let room = load_room(conn, &room_id)?;
    let mut stmt = conn
        .prepare(
            "SELECT s.id, s.last_name, s.first_name, s.grade_level, a.allocated_on
             FROM hostel_allocations a
             JOIN students s ON s.id = a.student_id
             WHERE a.room_id = ?
             ORDER BY s.last_name, s.first_name",
        )
        .map_err(HandlerErr::query)?;
    let occupants = stmt
        .query_map([&room_id], |r| {
            Ok(json!({
                "studentId": r.get::<_, String>(0)?,
                "displayName": format!("{}, {}", r.get::<_, String>(1)?, r.get::<_, String>(2)?),
                "gradeLevel": r.get::<_, i64>(3)?,
                "allocatedOn": r.get::<_, String>(4)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(json!({
        "roomId": room_id,
        "name": room.name,
        "capacity": room.capacity,
        "occupants": occupants,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "hostel.listRooms" => Some(with_db(state, req, hostel_list_rooms)),
        "hostel.createRoom" => Some(with_db(state, req, hostel_create_room)),
        "hostel.deleteRoom" => Some(with_db(state, req, hostel_delete_room)),
        "hostel.allocate" => Some(with_db(state, req, hostel_allocate)),
        "hostel.vacate" => Some(with_db(state, req, hostel_vacate)),
        "hostel.occupants" => Some(with_db(state, req, hostel_occupants)),
        _ => None,
    }
}
