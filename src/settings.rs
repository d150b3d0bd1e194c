use crate::db;
use crate::grading::{GradeDefinition, GradeTable};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

const KEY_ACADEMIC_YEAR: &str = "school.academicYear";
const KEY_GRADES: &str = "school.grades";
const KEY_EXAMS: &str = "school.exams";
const KEY_NOTIFICATIONS: &str = "school.notifications";

pub const DEFAULT_FINAL_EXAM_ID: &str = "final";
pub const DEFAULT_LEAD_DAYS: i64 = 1;
pub const DEFAULT_TOAST_TIMEOUT_SECONDS: i64 = 8;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("{0}")]
    Invalid(String),
    #[error("set an academic year first")]
    AcademicYearRequired,
    #[error("invalid grade configuration: {0}")]
    Grades(#[from] crate::grading::ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    pub lead_days: i64,
    pub toast_timeout_seconds: i64,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            lead_days: DEFAULT_LEAD_DAYS,
            toast_timeout_seconds: DEFAULT_TOAST_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolConfig {
    pub academic_year: Option<String>,
    pub grades: GradeTable,
    pub final_exam_id: String,
    pub notifications: NotificationSettings,
}

/// Sole owner of the school configuration stored in the workspace.
pub struct SettingsService<'a> {
    conn: &'a Connection,
}

impl<'a> SettingsService<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn load(&self) -> anyhow::Result<SchoolConfig> {
        Ok(SchoolConfig {
            academic_year: self.academic_year()?,
            grades: self.grades()?,
            final_exam_id: self.final_exam_id()?,
            notifications: self.notifications()?,
        })
    }

    pub fn academic_year(&self) -> anyhow::Result<Option<String>> {
        Ok(db::settings_get_json(self.conn, KEY_ACADEMIC_YEAR)?
            .and_then(|v| v.as_str().map(|s| s.to_string()))
            .filter(|s| !s.is_empty()))
    }

    pub fn set_academic_year(&self, year: &str) -> anyhow::Result<String> {
        let year = year.trim();
        if year.is_empty() || year.len() > 16 {
            return Err(SettingsError::Invalid(
                "academic year must be 1..=16 characters".to_string(),
            )
            .into());
        }
        db::settings_set_json(self.conn, KEY_ACADEMIC_YEAR, &json!(year))?;
        Ok(year.to_string())
    }

    pub fn clear_academic_year(&self) -> anyhow::Result<()> {
        db::settings_delete(self.conn, KEY_ACADEMIC_YEAR)
    }

    pub fn require_academic_year(&self) -> anyhow::Result<String> {
        self.academic_year()?
            .ok_or_else(|| SettingsError::AcademicYearRequired.into())
    }

    pub fn grades(&self) -> anyhow::Result<GradeTable> {
        let Some(raw) = db::settings_get_json(self.conn, KEY_GRADES)? else {
            return Ok(GradeTable::default());
        };
        let defs: Vec<GradeDefinition> = serde_json::from_value(raw)?;
        Ok(GradeTable::new(defs).map_err(SettingsError::from)?)
    }

    pub fn set_grades(&self, grades: Vec<GradeDefinition>) -> anyhow::Result<GradeTable> {
        let table = GradeTable::new(grades).map_err(SettingsError::from)?;
        db::settings_set_json(self.conn, KEY_GRADES, &serde_json::to_value(table.grades())?)?;
        Ok(table)
    }

    pub fn final_exam_id(&self) -> anyhow::Result<String> {
        Ok(db::settings_get_json(self.conn, KEY_EXAMS)?
            .and_then(|v| {
                v.get("finalExamId")
                    .and_then(|id| id.as_str())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| DEFAULT_FINAL_EXAM_ID.to_string()))
    }

    pub fn notifications(&self) -> anyhow::Result<NotificationSettings> {
        let mut current = NotificationSettings::default();
        if let Some(saved) = db::settings_get_json(self.conn, KEY_NOTIFICATIONS)? {
            if let Some(obj) = saved.as_object() {
                // Malformed historical values fall back to defaults.
                let _ = merge_notifications(&mut current, obj);
            }
        }
        Ok(current)
    }

    /// Applies a partial update. Recognised keys: `finalExamId`,
    /// `notificationLeadDays`, `toastTimeoutSeconds`.
    pub fn update(&self, patch: &Map<String, Value>) -> anyhow::Result<()> {
        let mut notifications = self.notifications()?;
        let mut final_exam_id = None;
        let mut notify_patch = Map::new();
        for (k, v) in patch {
            match k.as_str() {
                "finalExamId" => {
                    let id = v
                        .as_str()
                        .map(str::trim)
                        .filter(|s| !s.is_empty() && s.len() <= 32)
                        .ok_or_else(|| {
                            SettingsError::Invalid("finalExamId must be 1..=32 characters".into())
                        })?;
                    final_exam_id = Some(id.to_string());
                }
                "notificationLeadDays" => {
                    notify_patch.insert("leadDays".to_string(), v.clone());
                }
                "toastTimeoutSeconds" => {
                    notify_patch.insert("toastTimeoutSeconds".to_string(), v.clone());
                }
                _ => return Err(SettingsError::Invalid(format!("unknown setting: {}", k)).into()),
            }
        }
        merge_notifications(&mut notifications, &notify_patch).map_err(SettingsError::Invalid)?;

        let tx = self.conn.unchecked_transaction()?;
        if let Some(id) = final_exam_id {
            db::settings_set_json(&tx, KEY_EXAMS, &json!({ "finalExamId": id }))?;
        }
        db::settings_set_json(&tx, KEY_NOTIFICATIONS, &serde_json::to_value(notifications)?)?;
        tx.commit()?;
        Ok(())
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn merge_notifications(
    current: &mut NotificationSettings,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    for (k, v) in patch {
        match k.as_str() {
            "leadDays" => current.lead_days = parse_i64_range(v, "notificationLeadDays", -1, 365)?,
            "toastTimeoutSeconds" => {
                current.toast_timeout_seconds = parse_i64_range(v, k, 1, 600)?
            }
            _ => return Err(format!("unknown notification field: {}", k)),
        }
    }
    Ok(())
}
