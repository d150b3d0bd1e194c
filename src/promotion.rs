use crate::grading::{final_outcome, ExamResult, GradeTable, Outcome};
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentStatus {
    Active,
    Transferred,
}

impl StudentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Transferred => "transferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "transferred" => Some(Self::Transferred),
            _ => None,
        }
    }
}

/// The slice of a student record promotion needs. `final_result` is the
/// recorded result for the configured final exam, if any.
#[derive(Debug, Clone)]
pub struct StudentRecord {
    pub id: String,
    pub name: String,
    pub grade_level: i64,
    pub roll_no: i64,
    pub status: StudentStatus,
    pub final_result: Option<ExamResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PromotionAction {
    Skipped,
    #[serde(rename_all = "camelCase")]
    HeldBack { grade_level: i64 },
    #[serde(rename_all = "camelCase")]
    Promoted { from_level: i64, to_level: i64 },
    #[serde(rename_all = "camelCase")]
    Graduated { exit_date: NaiveDate },
}

impl PromotionAction {
    /// Held-back and promoted students start the year with no exam history
    /// and no fee payments.
    pub fn clears_history(&self) -> bool {
        matches!(self, Self::HeldBack { .. } | Self::Promoted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionDecision {
    pub student_id: String,
    pub name: String,
    pub roll_no: i64,
    pub outcome: Option<Outcome>,
    #[serde(flatten)]
    pub action: PromotionAction,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionCounts {
    pub skipped: usize,
    pub held_back: usize,
    pub promoted: usize,
    pub graduated: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionPlan {
    pub date: NaiveDate,
    pub decisions: Vec<PromotionDecision>,
}

impl PromotionPlan {
    pub fn counts(&self) -> PromotionCounts {
        let mut counts = PromotionCounts::default();
        for d in &self.decisions {
            match d.action {
                PromotionAction::Skipped => counts.skipped += 1,
                PromotionAction::HeldBack { .. } => counts.held_back += 1,
                PromotionAction::Promoted { .. } => counts.promoted += 1,
                PromotionAction::Graduated { .. } => counts.graduated += 1,
            }
        }
        counts
    }
}

pub fn decide(student: &StudentRecord, grades: &GradeTable, today: NaiveDate) -> PromotionDecision {
    if student.status != StudentStatus::Active {
        return PromotionDecision {
            student_id: student.id.clone(),
            name: student.name.clone(),
            roll_no: student.roll_no,
            outcome: None,
            action: PromotionAction::Skipped,
        };
    }

    // A final recorded at another level does not count for the current one.
    let final_result = student
        .final_result
        .as_ref()
        .filter(|r| r.grade_level == student.grade_level);
    let outcome = final_outcome(grades.get(student.grade_level), final_result);
    let action = match outcome {
        Outcome::Fail => PromotionAction::HeldBack {
            grade_level: student.grade_level,
        },
        Outcome::Pass if grades.terminal_level() == Some(student.grade_level) => {
            PromotionAction::Graduated { exit_date: today }
        }
        Outcome::Pass => match grades.next_level(student.grade_level) {
            Some(to_level) => PromotionAction::Promoted {
                from_level: student.grade_level,
                to_level,
            },
            // A passing grade is always configured, so it is terminal or has a successor.
            None => PromotionAction::Graduated { exit_date: today },
        },
    };

    PromotionDecision {
        student_id: student.id.clone(),
        name: student.name.clone(),
        roll_no: student.roll_no,
        outcome: Some(outcome),
        action,
    }
}

pub fn plan_promotion(
    students: &[StudentRecord],
    grades: &GradeTable,
    today: NaiveDate,
) -> PromotionPlan {
    PromotionPlan {
        date: today,
        decisions: students.iter().map(|s| decide(s, grades, today)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grading::tests::{grade, result};

    fn table() -> GradeTable {
        GradeTable::new(vec![grade(1), grade(2), grade(3)]).expect("valid table")
    }

    fn student(id: &str, level: i64, status: StudentStatus, res: Option<ExamResult>) -> StudentRecord {
        StudentRecord {
            id: id.to_string(),
            name: format!("Student {}", id),
            grade_level: level,
            roll_no: 7,
            status,
            final_result: res,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 30).expect("date")
    }

    #[test]
    fn inactive_students_are_skipped() {
        let s = student("t", 2, StudentStatus::Transferred, None);
        let d = decide(&s, &table(), day());
        assert_eq!(d.action, PromotionAction::Skipped);
        assert_eq!(d.outcome, None);
        assert!(!d.action.clears_history());
    }

    #[test]
    fn missing_or_failing_result_is_held_back() {
        let missing = student("m", 2, StudentStatus::Active, None);
        let failing = student(
            "f",
            2,
            StudentStatus::Active,
            Some(result(2, (10.0, 5.0), (60.0, 20.0))),
        );
        for s in [missing, failing] {
            let d = decide(&s, &table(), day());
            assert_eq!(d.outcome, Some(Outcome::Fail));
            assert_eq!(d.action, PromotionAction::HeldBack { grade_level: 2 });
            assert!(d.action.clears_history());
        }
    }

    #[test]
    fn passing_student_advances_one_level() {
        let s = student(
            "p",
            1,
            StudentStatus::Active,
            Some(result(1, (60.0, 20.0), (60.0, 20.0))),
        );
        let d = decide(&s, &table(), day());
        assert_eq!(
            d.action,
            PromotionAction::Promoted {
                from_level: 1,
                to_level: 2
            }
        );
    }

    #[test]
    fn passing_terminal_student_graduates_on_promotion_date() {
        let s = student(
            "g",
            3,
            StudentStatus::Active,
            Some(result(3, (60.0, 20.0), (60.0, 20.0))),
        );
        let d = decide(&s, &table(), day());
        assert_eq!(d.action, PromotionAction::Graduated { exit_date: day() });
        assert!(!d.action.clears_history());
    }

    #[test]
    fn unconfigured_grade_holds_student_back() {
        let s = student(
            "u",
            9,
            StudentStatus::Active,
            Some(result(9, (60.0, 20.0), (60.0, 20.0))),
        );
        let d = decide(&s, &table(), day());
        assert_eq!(d.action, PromotionAction::HeldBack { grade_level: 9 });
    }

    #[test]
    fn final_from_an_earlier_level_counts_as_missing() {
        let s = student(
            "r",
            2,
            StudentStatus::Active,
            Some(result(1, (60.0, 20.0), (60.0, 20.0))),
        );
        let d = decide(&s, &table(), day());
        assert_eq!(d.outcome, Some(Outcome::Fail));
        assert_eq!(d.action, PromotionAction::HeldBack { grade_level: 2 });
    }

    #[test]
    fn gaps_in_configured_levels_are_skipped_over() {
        let gapped = GradeTable::new(vec![grade(1), grade(3)]).expect("valid table");
        let first = student(
            "a",
            1,
            StudentStatus::Active,
            Some(result(1, (60.0, 20.0), (60.0, 20.0))),
        );
        assert_eq!(
            decide(&first, &gapped, day()).action,
            PromotionAction::Promoted {
                from_level: 1,
                to_level: 3
            }
        );
        let last = student(
            "b",
            3,
            StudentStatus::Active,
            Some(result(3, (60.0, 20.0), (60.0, 20.0))),
        );
        assert_eq!(
            decide(&last, &gapped, day()).action,
            PromotionAction::Graduated { exit_date: day() }
        );
    }

    #[test]
    fn plan_counts_every_student_once() {
        let students = vec![
            student("a", 1, StudentStatus::Active, Some(result(1, (60.0, 20.0), (60.0, 20.0)))),
            student("b", 3, StudentStatus::Active, Some(result(3, (60.0, 20.0), (60.0, 20.0)))),
            student("c", 2, StudentStatus::Active, None),
            student("d", 2, StudentStatus::Transferred, None),
        ];
        let plan = plan_promotion(&students, &table(), day());
        assert_eq!(plan.decisions.len(), 4);
        assert_eq!(
            plan.counts(),
            PromotionCounts {
                skipped: 1,
                held_back: 1,
                promoted: 1,
                graduated: 1
            }
        );
    }

    #[test]
    fn decision_serializes_action_inline() {
        let s = student("p", 1, StudentStatus::Active, Some(result(1, (60.0, 20.0), (60.0, 20.0))));
        let v = serde_json::to_value(decide(&s, &table(), day())).expect("serialize");
        assert_eq!(v["action"], "promoted");
        assert_eq!(v["toLevel"], 2);
        assert_eq!(v["outcome"], "PASS");
        assert_eq!(v["rollNo"], 7);
    }
}
