mod common;

use common::{configure_school, create_student, Sidecar};
use serde_json::json;

fn staff_id(result: &serde_json::Value) -> String {
    result
        .pointer("/staff/id")
        .and_then(|v| v.as_str())
        .expect("staff id")
        .to_string()
}

#[test]
fn staff_records_round_trip() {
    let (mut sc, workspace) = Sidecar::with_workspace("schoold-staff");
    let sita = sc.ok(
        "staff.create",
        json!({ "firstName": "Sita", "lastName": "Karki", "role": "teacher", "joinedOn": "2019-04-14" }),
    );
    assert_eq!(
        sita.pointer("/staff/displayName").and_then(|v| v.as_str()),
        Some("Karki, Sita")
    );
    assert_eq!(sita.pointer("/staff/status").and_then(|v| v.as_str()), Some("active"));
    let sita = staff_id(&sita);
    let hari = staff_id(&sc.ok(
        "staff.create",
        json!({ "firstName": "Hari", "lastName": "Basnet", "role": "accountant" }),
    ));
    assert_eq!(
        sc.err_code("staff.create", json!({ "firstName": "No", "lastName": "Role" })),
        "bad_params"
    );

    let by_role = sc.ok("staff.list", json!({ "role": "teacher" }));
    let by_role = by_role.get("staff").and_then(|v| v.as_array()).expect("staff");
    assert_eq!(by_role.len(), 1);
    assert_eq!(by_role[0].get("id").and_then(|v| v.as_str()), Some(sita.as_str()));

    let updated = sc.ok(
        "staff.update",
        json!({ "staffId": sita, "patch": { "status": "left", "phone": "9800000000" } }),
    );
    assert_eq!(updated.pointer("/staff/status").and_then(|v| v.as_str()), Some("left"));
    assert_eq!(
        updated.pointer("/staff/phone").and_then(|v| v.as_str()),
        Some("9800000000")
    );
    assert_eq!(
        sc.err_code("staff.update", json!({ "staffId": sita, "patch": { "status": "retired" } })),
        "bad_params"
    );
    let active = sc.ok("staff.list", json!({ "status": "active" }));
    assert_eq!(active.get("staff").and_then(|v| v.as_array()).map(|a| a.len()), Some(1));

    sc.ok("staff.delete", json!({ "staffId": hari }));
    assert_eq!(sc.err_code("staff.get", json!({ "staffId": hari })), "not_found");
    assert_eq!(sc.err_code("staff.delete", json!({ "staffId": hari })), "not_found");

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn hostel_rooms_respect_capacity_and_departures() {
    let (mut sc, workspace) = Sidecar::with_workspace("schoold-hostel");
    configure_school(&mut sc);
    let asha = create_student(&mut sc, "Asha", "Thapa", 2);
    let bikash = create_student(&mut sc, "Bikash", "Shrestha", 2);

    let room = sc.ok(
        "hostel.createRoom",
        json!({ "name": "East 1", "capacity": 1, "monthlyFee": 800 }),
    );
    let room_id = room
        .pointer("/room/id")
        .and_then(|v| v.as_str())
        .expect("room id")
        .to_string();
    assert_eq!(
        sc.err_code("hostel.createRoom", json!({ "name": "East 1", "capacity": 2 })),
        "bad_params"
    );
    assert_eq!(
        sc.err_code("hostel.createRoom", json!({ "name": "West 1", "capacity": 0 })),
        "bad_params"
    );

    let first = sc.ok(
        "hostel.allocate",
        json!({ "studentId": asha, "roomId": room_id, "allocatedOn": "2024-04-20" }),
    );
    assert!(first.get("movedFrom").map(|v| v.is_null()).unwrap_or(false));
    assert_eq!(
        sc.err_code("hostel.allocate", json!({ "studentId": bikash, "roomId": room_id })),
        "bad_params"
    );
    // Re-allocating the same student to the same full room is allowed.
    sc.ok("hostel.allocate", json!({ "studentId": asha, "roomId": room_id }));

    let rooms = sc.ok("hostel.listRooms", json!({}));
    assert_eq!(rooms.pointer("/rooms/0/occupied").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(rooms.pointer("/rooms/0/free").and_then(|v| v.as_i64()), Some(0));
    assert_eq!(
        sc.err_code("hostel.deleteRoom", json!({ "roomId": room_id })),
        "bad_params"
    );

    sc.ok(
        "certificates.issue",
        json!({ "studentId": asha, "reason": "Family moved", "issuedOn": "2024-08-01" }),
    );
    let occupants = sc.ok("hostel.occupants", json!({ "roomId": room_id }));
    assert_eq!(
        occupants.get("occupants").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
    assert_eq!(
        sc.err_code("hostel.allocate", json!({ "studentId": asha, "roomId": room_id })),
        "bad_params"
    );

    sc.ok("hostel.allocate", json!({ "studentId": bikash, "roomId": room_id }));
    let occupants = sc.ok("hostel.occupants", json!({ "roomId": room_id }));
    assert_eq!(
        occupants.pointer("/occupants/0/displayName").and_then(|v| v.as_str()),
        Some("Shrestha, Bikash")
    );
    sc.ok("hostel.vacate", json!({ "studentId": bikash }));
    assert_eq!(sc.err_code("hostel.vacate", json!({ "studentId": bikash })), "not_found");
    sc.ok("hostel.deleteRoom", json!({ "roomId": room_id }));
    assert_eq!(
        sc.err_code("hostel.occupants", json!({ "roomId": room_id })),
        "not_found"
    );

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}
