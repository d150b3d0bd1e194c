use crate::grading::GradeTable;
use crate::ipc::handlers::hostel::vacate;
use crate::ipc::handlers::results::load_results_for_exam;
use crate::ipc::helpers::{now_param, today_param, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::promotion::{plan_promotion, PromotionAction, PromotionPlan, StudentRecord, StudentStatus};
use crate::settings::SettingsService;
use rusqlite::Connection;
use serde_json::json;

fn load_student_records(conn: &Connection, final_exam_id: &str) -> Result<Vec<StudentRecord>, HandlerErr> {
    let mut finals = load_results_for_exam(conn, final_exam_id)?;
    let mut stmt = conn
        .prepare(
            "SELECT id, first_name, last_name, grade_level, roll_no, status
             FROM students ORDER BY grade_level, roll_no, last_name, first_name",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                format!("{}, {}", r.get::<_, String>(2)?, r.get::<_, String>(1)?),
                r.get::<_, i64>(3)?,
                r.get::<_, i64>(4)?,
                r.get::<_, String>(5)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    rows.into_iter()
        .map(|(id, name, grade_level, roll_no, status)| {
            let status = StudentStatus::parse(&status).ok_or_else(|| {
                HandlerErr::new("db_query_failed", format!("unknown student status: {}", status))
            })?;
            let final_result = finals.remove(&id);
            Ok(StudentRecord {
                id,
                name,
                grade_level,
                roll_no,
                status,
                final_result,
            })
        })
        .collect()
}

struct PreparedPlan {
    academic_year: String,
    grades: GradeTable,
    plan: PromotionPlan,
}

fn prepare_plan(conn: &Connection, params: &serde_json::Value) -> Result<PreparedPlan, HandlerErr> {
    let now = now_param(params)?;
    let today = today_param(params, now)?;
    let settings = SettingsService::new(conn);
    let academic_year = settings
        .require_academic_year()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;
    let grades = settings
        .grades()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;
    let final_exam_id = settings
        .final_exam_id()
        .map_err(|e| HandlerErr::settings(e, "db_query_failed"))?;
    let students = load_student_records(conn, &final_exam_id)?;
    let plan = plan_promotion(&students, &grades, today);
    Ok(PreparedPlan {
        academic_year,
        grades,
        plan,
    })
}

fn promotion_preview(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let prepared = prepare_plan(conn, params)?;
    Ok(json!({
        "academicYear": prepared.academic_year,
        "terminalLevel": prepared.grades.terminal_level(),
        "counts": prepared.plan.counts(),
        "plan": prepared.plan,
    }))
}

fn apply_plan(conn: &Connection, plan: &PromotionPlan) -> Result<(), HandlerErr> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    for decision in &plan.decisions {
        let student_id = decision.student_id.as_str();
        if decision.action.clears_history() {
            tx.execute("DELETE FROM exam_results WHERE student_id = ?", [student_id])
                .map_err(|e| HandlerErr::update(e, "exam_results"))?;
            tx.execute("DELETE FROM fee_payments WHERE student_id = ?", [student_id])
                .map_err(|e| HandlerErr::update(e, "fee_payments"))?;
        }
        match &decision.action {
            PromotionAction::Skipped | PromotionAction::HeldBack { .. } => {}
            PromotionAction::Promoted { to_level, .. } => {
                tx.execute(
                    "UPDATE students SET grade_level = ?, roll_no = 0, updated_at = datetime('now')
                     WHERE id = ?",
                    (to_level, student_id),
                )
                .map_err(|e| HandlerErr::update(e, "students"))?;
            }
            PromotionAction::Graduated { exit_date } => {
                tx.execute(
                    "UPDATE students SET status = 'transferred', exit_date = ?, updated_at = datetime('now')
                     WHERE id = ?",
                    (exit_date.format("%Y-%m-%d").to_string(), student_id),
                )
                .map_err(|e| HandlerErr::update(e, "students"))?;
                vacate(&tx, student_id)?;
            }
        }
    }
    SettingsService::new(&tx)
        .clear_academic_year()
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))
}

fn promotion_run(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let prepared = prepare_plan(conn, params)?;
    apply_plan(conn, &prepared.plan)?;
    let counts = prepared.plan.counts();
    tracing::info!(
        academic_year = %prepared.academic_year,
        date = %prepared.plan.date,
        promoted = counts.promoted,
        held_back = counts.held_back,
        graduated = counts.graduated,
        skipped = counts.skipped,
        "promotion applied"
    );
    Ok(json!({
        "closedAcademicYear": prepared.academic_year,
        "counts": counts,
        "plan": prepared.plan,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "promotion.preview" => Some(with_db(state, req, promotion_preview)),
        "promotion.run" => Some(with_db(state, req, promotion_run)),
        _ => None,
    }
}
