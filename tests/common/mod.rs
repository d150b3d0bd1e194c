#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn() -> Self {
        let exe = env!("CARGO_BIN_EXE_schoold");
        let mut child = Command::new(exe)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn schoold");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 0,
        }
    }

    /// Spawns a sidecar with a fresh workspace already selected.
    pub fn with_workspace(prefix: &str) -> (Self, PathBuf) {
        let workspace = temp_dir(prefix);
        let mut sidecar = Self::spawn();
        sidecar.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        (sidecar, workspace)
    }

    pub fn request(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({
            "id": id,
            "method": method,
            "params": params,
        });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");

        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        assert!(!line.trim().is_empty(), "empty response for {}", method);
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.request(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    /// Sends a request expected to fail and returns the error code.
    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .pointer("/error/code")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    }
}

impl Drop for Sidecar {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn grade_json(level: i64, name: &str, fee: f64) -> serde_json::Value {
    json!({
        "level": level,
        "name": name,
        "monthlyFee": fee,
        "subjects": [
            { "code": "ENG", "name": "English",
              "grading": { "mode": "numeric", "examFull": 75, "activityFull": 25, "passMarks": 40 } },
            { "code": "MATH", "name": "Mathematics",
              "grading": { "mode": "numeric", "examFull": 75, "activityFull": 25, "passMarks": 40 } },
            { "code": "ART", "name": "Art", "grading": { "mode": "qualitative" } }
        ]
    })
}

/// Three grades (1..=3), grade 3 terminal, academic year 2024.
pub fn configure_school(sidecar: &mut Sidecar) {
    sidecar.ok(
        "settings.setGrades",
        json!({
            "grades": [
                grade_json(1, "Grade One", 1000.0),
                grade_json(2, "Grade Two", 1200.0),
                grade_json(3, "Grade Three", 1500.0),
            ]
        }),
    );
    sidecar.ok("settings.setAcademicYear", json!({ "year": "2024" }));
}

pub fn create_student(sidecar: &mut Sidecar, first: &str, last: &str, level: i64) -> String {
    let result = sidecar.ok(
        "students.create",
        json!({ "firstName": first, "lastName": last, "gradeLevel": level }),
    );
    result
        .pointer("/student/id")
        .and_then(|v| v.as_str())
        .expect("student id")
        .to_string()
}

/// Records a final-exam result with the same marks in ENG and MATH.
pub fn record_final(sidecar: &mut Sidecar, student_id: &str, exam: f64, activity: f64) -> serde_json::Value {
    sidecar.ok(
        "results.record",
        json!({
            "studentId": student_id,
            "examId": "final",
            "marks": {
                "ENG": { "kind": "numeric", "exam": exam, "activity": activity },
                "MATH": { "kind": "numeric", "exam": exam, "activity": activity },
                "ART": { "kind": "qualitative", "tier": "B" }
            }
        }),
    )
}
