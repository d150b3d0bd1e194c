use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Four-tier qualitative scale used for non-numeric subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "A")]
    Outstanding,
    #[serde(rename = "B")]
    Good,
    #[serde(rename = "C")]
    Satisfactory,
    #[serde(rename = "D")]
    NeedsImprovement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum GradingMode {
    #[serde(rename_all = "camelCase")]
    Numeric {
        exam_full: f64,
        activity_full: f64,
        pass_marks: f64,
    },
    Qualitative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectDef {
    pub code: String,
    pub name: String,
    pub grading: GradingMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeDefinition {
    pub level: i64,
    pub name: String,
    #[serde(default)]
    pub monthly_fee: f64,
    pub subjects: Vec<SubjectDef>,
}

impl GradeDefinition {
    pub fn subject(&self, code: &str) -> Option<&SubjectDef> {
        self.subjects.iter().find(|s| s.code == code)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("grade level {0} is defined more than once")]
    DuplicateLevel(i64),
    #[error("grade {level} lists subject {code} more than once")]
    DuplicateSubject { level: i64, code: String },
    #[error("grade {level} subject {code}: {reason}")]
    BadSubject {
        level: i64,
        code: String,
        reason: String,
    },
    #[error("grade {0} has a negative monthly fee")]
    NegativeFee(i64),
}

/// Level-ordered grade definitions; the evaluator's view of the school setup.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct GradeTable {
    grades: Vec<GradeDefinition>,
}

impl GradeTable {
    pub fn new(mut grades: Vec<GradeDefinition>) -> Result<Self, ConfigError> {
        grades.sort_by_key(|g| g.level);
        let mut seen_levels = HashSet::new();
        for g in &grades {
            if !seen_levels.insert(g.level) {
                return Err(ConfigError::DuplicateLevel(g.level));
            }
            if g.monthly_fee < 0.0 {
                return Err(ConfigError::NegativeFee(g.level));
            }
            let mut seen_codes = HashSet::new();
            for s in &g.subjects {
                if !seen_codes.insert(s.code.as_str()) {
                    return Err(ConfigError::DuplicateSubject {
                        level: g.level,
                        code: s.code.clone(),
                    });
                }
                if let GradingMode::Numeric {
                    exam_full,
                    activity_full,
                    pass_marks,
                } = s.grading
                {
                    let bad = |reason: &str| ConfigError::BadSubject {
                        level: g.level,
                        code: s.code.clone(),
                        reason: reason.to_string(),
                    };
                    if exam_full < 0.0 || activity_full < 0.0 {
                        return Err(bad("full marks must not be negative"));
                    }
                    if exam_full + activity_full <= 0.0 {
                        return Err(bad("full marks must be positive"));
                    }
                    if pass_marks < 0.0 || pass_marks > exam_full + activity_full {
                        return Err(bad("pass marks must be within full marks"));
                    }
                }
            }
        }
        Ok(Self { grades })
    }

    pub fn grades(&self) -> &[GradeDefinition] {
        &self.grades
    }

    pub fn get(&self, level: i64) -> Option<&GradeDefinition> {
        self.grades.iter().find(|g| g.level == level)
    }

    pub fn terminal_level(&self) -> Option<i64> {
        self.grades.last().map(|g| g.level)
    }

    pub fn next_level(&self, level: i64) -> Option<i64> {
        self.grades.iter().map(|g| g.level).find(|l| *l > level)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SubjectMark {
    Numeric { exam: f64, activity: f64 },
    Qualitative { tier: Tier },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamResult {
    pub exam_id: String,
    pub grade_level: i64,
    pub marks: BTreeMap<String, SubjectMark>,
}

#[derive(Debug, Error, PartialEq)]
pub enum MarksError {
    #[error("subject {0} is not configured for this grade")]
    UnknownSubject(String),
    #[error("{subject}: {component} marks must not be negative")]
    Negative {
        subject: String,
        component: &'static str,
    },
    #[error("{subject}: {component} marks {value} exceed full marks {ceiling}")]
    ExceedsCeiling {
        subject: String,
        component: &'static str,
        value: f64,
        ceiling: f64,
    },
    #[error("{0}: mark kind does not match the subject's grading mode")]
    ModeMismatch(String),
}

pub fn validate_result(grade: &GradeDefinition, result: &ExamResult) -> Result<(), MarksError> {
    for (code, mark) in &result.marks {
        let subject = grade
            .subject(code)
            .ok_or_else(|| MarksError::UnknownSubject(code.clone()))?;
        match (&subject.grading, mark) {
            (
                GradingMode::Numeric {
                    exam_full,
                    activity_full,
                    ..
                },
                SubjectMark::Numeric { exam, activity },
            ) => {
                for (component, value, ceiling) in [
                    ("exam", *exam, *exam_full),
                    ("activity", *activity, *activity_full),
                ] {
                    if value < 0.0 {
                        return Err(MarksError::Negative {
                            subject: code.clone(),
                            component,
                        });
                    }
                    if value > ceiling {
                        return Err(MarksError::ExceedsCeiling {
                            subject: code.clone(),
                            component,
                            value,
                            ceiling,
                        });
                    }
                }
            }
            (GradingMode::Qualitative, SubjectMark::Qualitative { .. }) => {}
            _ => return Err(MarksError::ModeMismatch(code.clone())),
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectVerdict {
    pub code: String,
    pub name: String,
    pub obtained: Option<f64>,
    pub full: Option<f64>,
    pub tier: Option<Tier>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub outcome: Outcome,
    pub obtained: f64,
    pub full: f64,
    pub percentage: f64,
    pub failed_subjects: Vec<String>,
    pub subjects: Vec<SubjectVerdict>,
}

/// Scores `result` against the subjects configured for `grade`, in the
/// grade's subject order. Marks for subjects the grade does not list are
/// ignored.
pub fn evaluate(grade: &GradeDefinition, result: &ExamResult) -> ResultSummary {
    let mut obtained_total = 0.0;
    let mut full_total = 0.0;
    let mut failed_subjects = Vec::new();
    let mut subjects = Vec::with_capacity(grade.subjects.len());

    for subject in &grade.subjects {
        let mark = result.marks.get(&subject.code);
        let verdict = match &subject.grading {
            GradingMode::Numeric {
                exam_full,
                activity_full,
                pass_marks,
            } => {
                let full = exam_full + activity_full;
                full_total += full;
                let obtained = match mark {
                    Some(SubjectMark::Numeric { exam, activity }) => Some(exam + activity),
                    _ => None,
                };
                if let Some(v) = obtained {
                    obtained_total += v;
                }
                SubjectVerdict {
                    code: subject.code.clone(),
                    name: subject.name.clone(),
                    obtained,
                    full: Some(full),
                    tier: None,
                    passed: obtained.map(|v| v >= *pass_marks).unwrap_or(false),
                }
            }
            GradingMode::Qualitative => SubjectVerdict {
                code: subject.code.clone(),
                name: subject.name.clone(),
                obtained: None,
                full: None,
                tier: match mark {
                    Some(SubjectMark::Qualitative { tier }) => Some(*tier),
                    _ => None,
                },
                passed: true,
            },
        };
        if !verdict.passed {
            failed_subjects.push(subject.code.clone());
        }
        subjects.push(verdict);
    }

    let percentage = if full_total > 0.0 {
        100.0 * obtained_total / full_total
    } else {
        0.0
    };
    ResultSummary {
        outcome: if failed_subjects.is_empty() {
            Outcome::Pass
        } else {
            Outcome::Fail
        },
        obtained: obtained_total,
        full: full_total,
        percentage,
        failed_subjects,
        subjects,
    }
}

/// Pass/fail for promotion. An absent result or an unconfigured grade is a
/// FAIL, not an error.
pub fn final_outcome(grade: Option<&GradeDefinition>, result: Option<&ExamResult>) -> Outcome {
    match (grade, result) {
        (Some(g), Some(r)) => evaluate(g, r).outcome,
        _ => Outcome::Fail,
    }
}
