#[path = "../src/backup.rs"]
mod backup;
mod common;

use common::{configure_school, create_student, temp_dir, Sidecar};
use serde_json::json;
use std::fs::File;
use std::io::{Read, Write};

fn sqlite_like_payload() -> Vec<u8> {
    let mut bytes = b"SQLite format 3\0".to_vec();
    bytes.extend_from_slice(b"school-test-payload");
    bytes
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("schoold-backup-src");
    let workspace2 = temp_dir("schoold-backup-dst");
    let out_dir = temp_dir("schoold-backup-out");

    let bytes = sqlite_like_payload();
    std::fs::write(workspace.join("school.sqlite3"), &bytes).expect("write source db");

    let bundle_path = out_dir.join("workspace.schoolbackup.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT);
    assert_eq!(export.db_bytes, bytes.len() as u64);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT));
    assert!(manifest.contains(&export.db_sha256));

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT);
    assert_eq!(import.db_sha256, export.db_sha256);
    let restored = std::fs::read(workspace2.join("school.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundle_is_rejected_and_workspace_kept() {
    let out_dir = temp_dir("schoold-backup-tampered");
    let workspace = temp_dir("schoold-backup-tampered-dst");
    let original = b"SQLite format 3\0original".to_vec();
    std::fs::write(workspace.join("school.sqlite3"), &original).expect("write existing db");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        let manifest = json!({
            "format": backup::BUNDLE_FORMAT,
            "appVersion": "0.0.0",
            "exportedAt": "2024-01-01T00:00:00+00:00",
            "dbSha256": "0".repeat(64),
            "dbBytes": 3,
        });
        zip.start_file("manifest.json", opts).expect("start manifest");
        zip.write_all(manifest.to_string().as_bytes()).expect("write manifest");
        zip.start_file("db/school.sqlite3", opts).expect("start db");
        zip.write_all(b"bad").expect("write db");
        zip.finish().expect("finish zip");
    }

    let e = backup::import_workspace_bundle(&bundle_path, &workspace).expect_err("checksum mismatch");
    assert!(format!("{e:#}").contains("checksum mismatch"));
    let kept = std::fs::read(workspace.join("school.sqlite3")).expect("read kept db");
    assert_eq!(kept, original);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn raw_sqlite_import_is_supported() {
    let out_dir = temp_dir("schoold-backup-raw");
    let workspace = temp_dir("schoold-backup-raw-dst");

    let raw_file = out_dir.join("copy.sqlite3");
    let bytes = sqlite_like_payload();
    std::fs::write(&raw_file, &bytes).expect("write raw sqlite file");
    let import = backup::import_workspace_bundle(&raw_file, &workspace).expect("import raw sqlite");
    assert_eq!(import.bundle_format_detected, backup::LEGACY_FORMAT);
    let restored = std::fs::read(workspace.join("school.sqlite3")).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let junk = out_dir.join("notes.txt");
    std::fs::write(&junk, b"not a database").expect("write junk");
    assert!(backup::import_workspace_bundle(&junk, &workspace).is_err());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn sidecar_bundle_moves_a_workspace() {
    let (mut sc, workspace) = Sidecar::with_workspace("schoold-backup-ipc-src");
    configure_school(&mut sc);
    let id = create_student(&mut sc, "Nabin", "Rana", 1);
    let bundle = temp_dir("schoold-backup-ipc-out").join("school.zip");

    let export = sc.ok(
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    assert_eq!(
        export.get("bundleFormat").and_then(|v| v.as_str()),
        Some(backup::BUNDLE_FORMAT)
    );

    let target = temp_dir("schoold-backup-ipc-dst");
    let import = sc.ok(
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy(), "workspacePath": target.to_string_lossy() }),
    );
    assert_eq!(
        import.get("dbSha256").and_then(|v| v.as_str()),
        export.get("dbSha256").and_then(|v| v.as_str())
    );

    let student = sc.ok("students.get", json!({ "studentId": id }));
    assert_eq!(
        student.pointer("/student/displayName").and_then(|v| v.as_str()),
        Some("Rana, Nabin")
    );
    let health = sc.ok("health", json!({}));
    let target_path = target.to_string_lossy().to_string();
    assert_eq!(
        health.get("workspacePath").and_then(|v| v.as_str()),
        Some(target_path.as_str())
    );

    drop(sc);
    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(target);
    if let Some(parent) = bundle.parent() {
        let _ = std::fs::remove_dir_all(parent);
    }
}
