use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    School,
    Holiday,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    pub kind: EventKind,
}

/// Fixed-date public holidays, expanded per year. Never persisted.
const FIXED_HOLIDAYS: &[(u32, u32, &str)] = &[
    (1, 1, "New Year's Day"),
    (3, 8, "International Women's Day"),
    (5, 1, "Labour Day"),
    (6, 1, "Children's Day"),
    (10, 5, "World Teachers' Day"),
    (12, 25, "Christmas Day"),
];

pub fn holiday_id(date: NaiveDate) -> String {
    format!("holiday-{}", date.format("%Y-%m-%d"))
}

pub fn public_holidays(year: i32) -> Vec<CalendarEvent> {
    FIXED_HOLIDAYS
        .iter()
        .filter_map(|&(month, day, title)| {
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            Some(CalendarEvent {
                id: holiday_id(date),
                title: title.to_string(),
                date,
                kind: EventKind::Holiday,
            })
        })
        .collect()
}

/// School events plus the holidays of `today`'s year and the following one,
/// ordered by date. Any lead time up to a year lands inside that window.
pub fn merged_calendar(school: Vec<CalendarEvent>, today: NaiveDate) -> Vec<CalendarEvent> {
    let mut events = school;
    events.extend(public_holidays(today.year()));
    events.extend(public_holidays(today.year() + 1));
    events.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.id.cmp(&b.id)));
    events
}

pub fn days_until(today: NaiveDate, date: NaiveDate) -> i64 {
    (date - today).num_days()
}

/// Events dated exactly `lead_days` after `today`. A negative lead time
/// disables the scheduler.
pub fn due_events(today: NaiveDate, events: &[CalendarEvent], lead_days: i64) -> Vec<&CalendarEvent> {
    if lead_days < 0 || events.is_empty() {
        return Vec::new();
    }
    events
        .iter()
        .filter(|e| {
            let diff = days_until(today, e.date);
            diff >= 0 && diff == lead_days
        })
        .collect()
}

pub fn describe_lead(days: i64) -> String {
    match days {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {} days", n),
    }
}

/// Event ids already announced on one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupLedger {
    day: NaiveDate,
    announced: HashSet<String>,
}

impl DedupLedger {
    pub fn new(day: NaiveDate) -> Self {
        Self {
            day,
            announced: HashSet::new(),
        }
    }

    pub fn restore<I>(day: NaiveDate, ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            day,
            announced: ids.into_iter().collect(),
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn len(&self) -> usize {
        self.announced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.announced.is_empty()
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.announced.contains(event_id)
    }

    /// Moves the ledger to `today`. Returns true when the previous day's set
    /// was discarded.
    pub fn roll_to(&mut self, today: NaiveDate) -> bool {
        if self.day == today {
            return false;
        }
        self.day = today;
        self.announced.clear();
        true
    }

    /// Returns the events not yet announced on the ledger's day and records
    /// them as announced.
    pub fn admit<'a>(&mut self, events: Vec<&'a CalendarEvent>) -> Vec<&'a CalendarEvent> {
        events
            .into_iter()
            .filter(|e| self.announced.insert(e.id.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub event_id: String,
    pub title: String,
    pub event_date: NaiveDate,
    pub kind: EventKind,
    pub days_until: i64,
    pub message: String,
    pub shown_at: NaiveDateTime,
}

impl Notification {
    pub fn announce(event: &CalendarEvent, today: NaiveDate, now: NaiveDateTime) -> Self {
        let days = days_until(today, event.date);
        Self {
            event_id: event.id.clone(),
            title: event.title.clone(),
            event_date: event.date,
            kind: event.kind,
            days_until: days,
            message: format!("{} {}", event.title, describe_lead(days)),
            shown_at: now,
        }
    }
}

/// On-screen notifications. Each one expires `timeout` after it was shown,
/// regardless of the dedup ledger.
#[derive(Debug, Clone)]
pub struct NotificationBoard {
    timeout: Duration,
    active: Vec<Notification>,
}

impl NotificationBoard {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            active: Vec::new(),
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn post(&mut self, notification: Notification) {
        match self
            .active
            .iter_mut()
            .find(|n| n.event_id == notification.event_id)
        {
            Some(existing) => *existing = notification,
            None => self.active.push(notification),
        }
    }

    pub fn expire(&mut self, now: NaiveDateTime) {
        let timeout = self.timeout;
        self.active.retain(|n| now - n.shown_at < timeout);
    }

    pub fn dismiss(&mut self, event_id: &str) -> bool {
        let before = self.active.len();
        self.active.retain(|n| n.event_id != event_id);
        self.active.len() != before
    }

    pub fn active(&self) -> &[Notification] {
        &self.active
    }
}
