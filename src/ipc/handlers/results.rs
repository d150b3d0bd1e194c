use crate::grading::{evaluate, final_outcome, validate_result, ExamResult, SubjectMark};
use crate::ipc::helpers::{get_optional_str, get_required_str, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::settings::SettingsService;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};

fn decode_result(exam_id: String, grade_level: i64, marks_json: &str) -> rusqlite::Result<ExamResult> {
    let marks: BTreeMap<String, SubjectMark> = serde_json::from_str(marks_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))?;
    Ok(ExamResult {
        exam_id,
        grade_level,
        marks,
    })
}

/// Final-exam results keyed by student id.
pub(crate) fn load_results_for_exam(
    conn: &Connection,
    exam_id: &str,
) -> Result<HashMap<String, ExamResult>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT student_id, grade_level, marks_json FROM exam_results WHERE exam_id = ?")
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([exam_id], |r| {
            let student_id: String = r.get(0)?;
            let marks_json: String = r.get(2)?;
            Ok((student_id, decode_result(exam_id.to_string(), r.get(1)?, &marks_json)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;
    Ok(rows.into_iter().collect())
}

fn load_result(conn: &Connection, student_id: &str, exam_id: &str) -> Result<Option<ExamResult>, HandlerErr> {
    conn.query_row(
        "SELECT grade_level, marks_json FROM exam_results WHERE student_id = ? AND exam_id = ?",
        (student_id, exam_id),
        |r| {
            let marks_json: String = r.get(1)?;
            decode_result(exam_id.to_string(), r.get(0)?, &marks_json)
        },
    )
    .optional()
    .map_err(HandlerErr::query)
}

struct StudentGrade {
    grade_level: i64,
    status: String,
}

fn student_grade(conn: &Connection, student_id: &str) -> Result<StudentGrade, HandlerErr> {
    conn.query_row(
        "SELECT grade_level, status FROM students WHERE id = ?",
        [student_id],
        |r| {
            Ok(StudentGrade {
                grade_level: r.get(0)?,
                status: r.get(1)?,
            })
        },
    )
    .optional()
    .map_err(HandlerErr::query)?
    .ok_or_else(|| HandlerErr::not_found("student"))
}

fn results_record(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let exam_id = get_required_str(params, "examId")?;
    let raw_marks = params
        .get("marks")
        .cloned()
        .ok_or_else(|| HandlerErr::bad_params("missing marks"))?;
    let marks: BTreeMap<String, SubjectMark> = serde_json::from_value(raw_marks)
        .map_err(|e| HandlerErr::bad_params(format!("invalid marks: {}", e)))?;

    let settings = SettingsService::new(conn);
    let academic_year = settings
        .require_academic_year()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;
    let grades = settings
        .grades()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;

    let student = student_grade(conn, &student_id)?;
    if student.status != "active" {
        return Err(HandlerErr::bad_params("marks can only be recorded for active students"));
    }
    let Some(grade) = grades.get(student.grade_level) else {
        return Err(HandlerErr::bad_params(format!(
            "grade level {} is not configured",
            student.grade_level
        )));
    };

    let result = ExamResult {
        exam_id: exam_id.clone(),
        grade_level: student.grade_level,
        marks,
    };
    validate_result(grade, &result).map_err(|e| HandlerErr::new("invalid_marks", e.to_string()))?;

    let marks_json = serde_json::to_string(&result.marks).map_err(HandlerErr::query)?;
    conn.execute(
        "INSERT INTO exam_results(student_id, exam_id, grade_level, academic_year, marks_json, updated_at)
         VALUES(?, ?, ?, ?, ?, datetime('now'))
         ON CONFLICT(student_id, exam_id) DO UPDATE SET
           grade_level = excluded.grade_level,
           academic_year = excluded.academic_year,
           marks_json = excluded.marks_json,
           updated_at = excluded.updated_at",
        (&student_id, &exam_id, student.grade_level, &academic_year, &marks_json),
    )
    .map_err(|e| HandlerErr::update(e, "exam_results"))?;

    Ok(json!({ "summary": evaluate(grade, &result) }))
}

fn results_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let student = student_grade(conn, &student_id)?;
    let grades = SettingsService::new(conn)
        .grades()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;

    let mut stmt = conn
        .prepare(
            "SELECT exam_id, grade_level, academic_year, marks_json
             FROM exam_results WHERE student_id = ? ORDER BY updated_at, exam_id",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([&student_id], |r| {
            let marks_json: String = r.get(3)?;
            let academic_year: String = r.get(2)?;
            Ok((decode_result(r.get(0)?, r.get(1)?, &marks_json)?, academic_year))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let results: Vec<serde_json::Value> = rows
        .into_iter()
        .map(|(result, academic_year)| {
            let summary = grades.get(result.grade_level).map(|g| evaluate(g, &result));
            json!({
                "examId": result.exam_id,
                "gradeLevel": result.grade_level,
                "academicYear": academic_year,
                "marks": result.marks,
                "summary": summary,
            })
        })
        .collect();
    Ok(json!({ "gradeLevel": student.grade_level, "results": results }))
}

fn results_evaluate(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let settings = SettingsService::new(conn);
    let exam_id = match get_optional_str(params, "examId")? {
        Some(id) => id,
        None => settings
            .final_exam_id()
            .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?,
    };
    let grades = settings
        .grades()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;
    let student = student_grade(conn, &student_id)?;
    let grade = grades.get(student.grade_level);
    let result = load_result(conn, &student_id, &exam_id)?;

    let summary = match (grade, result.as_ref()) {
        (Some(g), Some(r)) => Some(evaluate(g, r)),
        _ => None,
    };
    Ok(json!({
        "examId": exam_id,
        "outcome": final_outcome(grade, result.as_ref()),
        "recorded": result.is_some(),
        "summary": summary,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.record" => Some(with_db(state, req, results_record)),
        "results.list" => Some(with_db(state, req, results_list)),
        "results.evaluate" => Some(with_db(state, req, results_evaluate)),
        _ => None,
    }
}
