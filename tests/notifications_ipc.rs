mod common;

use common::{temp_dir, Sidecar};
use serde_json::json;

fn emitted(result: &serde_json::Value) -> Vec<serde_json::Value> {
    result
        .get("emitted")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("emitted array")
}

fn active_count(result: &serde_json::Value) -> usize {
    result
        .get("active")
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .expect("active array")
}

#[test]
fn event_is_announced_once_per_day_at_the_lead_time() {
    let (mut sc, workspace) = Sidecar::with_workspace("schoold-notify");
    sc.ok("settings.update", json!({ "patch": { "notificationLeadDays": 3 } }));
    sc.ok("calendar.create", json!({ "title": "Sports Day", "date": "2024-06-04" }));
    sc.ok("calendar.create", json!({ "title": "Science Fair", "date": "2024-05-29" }));

    let first = sc.ok(
        "notifications.check",
        json!({ "today": "2024-06-01", "now": "2024-06-01T09:00:00" }),
    );
    let first = emitted(&first);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].get("title").and_then(|v| v.as_str()), Some("Sports Day"));
    assert_eq!(
        first[0].get("message").and_then(|v| v.as_str()),
        Some("Sports Day in 3 days")
    );
    assert_eq!(first[0].get("daysUntil").and_then(|v| v.as_i64()), Some(3));

    let again = sc.ok(
        "notifications.check",
        json!({ "today": "2024-06-01", "now": "2024-06-01T15:30:00" }),
    );
    assert!(emitted(&again).is_empty());

    // A new day starts a fresh ledger; Sports Day is now 2 days out.
    sc.ok("calendar.create", json!({ "title": "Parents Meeting", "date": "2024-06-05" }));
    let next_day = sc.ok(
        "notifications.check",
        json!({ "today": "2024-06-02", "now": "2024-06-02T08:00:00" }),
    );
    let next_day = emitted(&next_day);
    assert_eq!(next_day.len(), 1);
    assert_eq!(
        next_day[0].get("message").and_then(|v| v.as_str()),
        Some("Parents Meeting in 3 days")
    );

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn ledger_survives_a_restart() {
    let (mut sc, workspace) = Sidecar::with_workspace("schoold-notify-restart");
    sc.ok("calendar.create", json!({ "title": "Exam Week", "date": "2024-09-11" }));
    let first = sc.ok(
        "notifications.check",
        json!({ "today": "2024-09-10", "now": "2024-09-10T07:00:00" }),
    );
    let first = emitted(&first);
    assert_eq!(first.len(), 1);
    assert_eq!(
        first[0].get("message").and_then(|v| v.as_str()),
        Some("Exam Week tomorrow")
    );
    drop(sc);

    let mut sc = Sidecar::spawn();
    sc.ok("workspace.select", json!({ "path": workspace.to_string_lossy() }));
    let again = sc.ok(
        "notifications.check",
        json!({ "today": "2024-09-10", "now": "2024-09-10T12:00:00" }),
    );
    assert!(emitted(&again).is_empty());

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn toasts_expire_after_the_display_timeout() {
    let (mut sc, workspace) = Sidecar::with_workspace("schoold-notify-toast");
    sc.ok(
        "settings.update",
        json!({ "patch": { "notificationLeadDays": 0, "toastTimeoutSeconds": 5 } }),
    );
    sc.ok("calendar.create", json!({ "title": "Annual Day", "date": "2024-11-20" }));
    sc.ok("calendar.create", json!({ "title": "Book Fair", "date": "2024-11-20" }));

    let check = sc.ok(
        "notifications.check",
        json!({ "today": "2024-11-20", "now": "2024-11-20T10:00:00" }),
    );
    assert_eq!(emitted(&check).len(), 2);
    assert_eq!(active_count(&check), 2);

    let id = emitted(&check)[0]
        .get("eventId")
        .and_then(|v| v.as_str())
        .expect("event id")
        .to_string();
    let dismissed = sc.ok("notifications.dismiss", json!({ "eventId": id }));
    assert_eq!(dismissed.get("dismissed").and_then(|v| v.as_bool()), Some(true));

    let still = sc.ok("notifications.active", json!({ "now": "2024-11-20T10:00:04" }));
    assert_eq!(active_count(&still), 1);
    let gone = sc.ok("notifications.active", json!({ "now": "2024-11-20T10:00:05" }));
    assert_eq!(active_count(&gone), 0);

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn negative_lead_disables_the_scheduler_and_holidays_are_included() {
    let (mut sc, workspace) = Sidecar::with_workspace("schoold-notify-holiday");
    let holiday = sc.ok(
        "notifications.check",
        json!({ "today": "2024-12-24", "now": "2024-12-24T09:00:00" }),
    );
    let holiday = emitted(&holiday);
    assert_eq!(holiday.len(), 1);
    assert_eq!(
        holiday[0].get("eventId").and_then(|v| v.as_str()),
        Some("holiday-2024-12-25")
    );
    assert_eq!(holiday[0].get("kind").and_then(|v| v.as_str()), Some("holiday"));

    sc.ok("settings.update", json!({ "patch": { "notificationLeadDays": -1 } }));
    let disabled = sc.ok(
        "notifications.check",
        json!({ "today": "2025-12-24", "now": "2025-12-24T09:00:00" }),
    );
    assert!(emitted(&disabled).is_empty());

    assert_eq!(
        sc.err_code("settings.update", json!({ "patch": { "notificationLeadDays": -2 } })),
        "bad_params"
    );

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn switching_workspace_clears_the_board() {
    let (mut sc, first) = Sidecar::with_workspace("schoold-notify-first");
    sc.ok("calendar.create", json!({ "title": "Annual Day", "date": "2024-11-02" }));
    let check = sc.ok(
        "notifications.check",
        json!({ "today": "2024-11-01", "now": "2024-11-01T09:00:00" }),
    );
    assert_eq!(active_count(&check), 1);
    let bundle = temp_dir("schoold-notify-bundle").join("school.zip");
    sc.ok(
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );

    let second = temp_dir("schoold-notify-second");
    sc.ok("workspace.select", json!({ "path": second.to_string_lossy() }));
    let active = sc.ok("notifications.active", json!({ "now": "2024-11-01T09:00:01" }));
    assert_eq!(active_count(&active), 0);

    // Importing a bundle also replaces the open workspace.
    sc.ok("workspace.select", json!({ "path": first.to_string_lossy() }));
    sc.ok("settings.update", json!({ "patch": { "toastTimeoutSeconds": 60 } }));
    sc.ok("calendar.create", json!({ "title": "Book Fair", "date": "2024-11-02" }));
    let posted = sc.ok(
        "notifications.check",
        json!({ "today": "2024-11-01", "now": "2024-11-01T10:00:00" }),
    );
    assert_eq!(active_count(&posted), 1);
    let target = temp_dir("schoold-notify-target");
    sc.ok(
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy(), "workspacePath": target.to_string_lossy() }),
    );
    let active = sc.ok("notifications.active", json!({ "now": "2024-11-01T10:00:01" }));
    assert_eq!(active_count(&active), 0);

    drop(sc);
    for dir in [first, second, target] {
        let _ = std::fs::remove_dir_all(dir);
    }
    if let Some(parent) = bundle.parent() {
        let _ = std::fs::remove_dir_all(parent);
    }
}
