use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::dates::{date_range_days, parse_date, DateParseError};

/// One normalized timeline entry. `end >= start` always holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub category: Option<String>,
    pub group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// String-level row as read from a list or a fixture file, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTaskRow {
    pub id: String,
    pub name: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub category: Option<String>,
    pub group: Option<String>,
    pub notes: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TaskRowError {
    #[error("row has no task name")]
    MissingName,
    #[error("row has no start date")]
    MissingStart,
    #[error("row start date is invalid: {0}")]
    InvalidStart(#[from] DateParseError),
}

impl Task {
    pub fn new(name: impl Into<String>, start: NaiveDate, end: Option<NaiveDate>) -> Self {
        let end = end.unwrap_or(start).max(start);
        Self {
            id: String::new(),
            name: name.into(),
            start,
            end,
            category: None,
            group: None,
            notes: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = non_blank(Some(category.into()));
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = non_blank(Some(group.into()));
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = non_blank(Some(notes.into()));
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(normalize_field_key(key), value.into());
        self
    }

    pub fn from_raw(row: RawTaskRow) -> Result<Self, TaskRowError> {
        let name = non_blank(row.name).ok_or(TaskRowError::MissingName)?;
        let start_raw = non_blank(row.start).ok_or(TaskRowError::MissingStart)?;
        let start = parse_date(&start_raw)?;

        let end = match non_blank(row.end) {
            Some(raw) => match parse_date(&raw) {
                Ok(end) => Some(end),
                Err(error) => {
                    debug!(task = %name, error = %error, "ignoring unparsable end date");
                    None
                }
            },
            None => None,
        };

        let mut task = Task::new(name, start, end).with_id(row.id);
        task.category = non_blank(row.category);
        task.group = non_blank(row.group);
        task.notes = non_blank(row.notes);
        task.metadata = row
            .metadata
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .map(|(key, value)| (normalize_field_key(&key), value))
            .collect();
        Ok(task)
    }

    pub fn duration_days(&self) -> i64 {
        date_range_days(self.start, self.end)
    }

    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.end < today
    }

    /// Looks up a field by name for grouping. Built-in fields win over metadata.
    pub fn field_value(&self, field: &str) -> Option<&str> {
        let key = normalize_field_key(field);
        match key.as_str() {
            "category" => self.category.as_deref(),
            "group" => self.group.as_deref(),
            "name" => Some(self.name.as_str()),
            _ => self.metadata.get(&key).map(String::as_str),
        }
    }
}

/// Lower-cases and snake-cases a column label: `"Start Date"` becomes `start_date`.
pub fn normalize_field_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{normalize_field_key, RawTaskRow, Task, TaskRowError};
    use crate::dates::DateParseError;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    fn row(name: Option<&str>, start: Option<&str>, end: Option<&str>) -> RawTaskRow {
        RawTaskRow {
            name: name.map(str::to_owned),
            start: start.map(str::to_owned),
            end: end.map(str::to_owned),
            ..RawTaskRow::default()
        }
    }

    #[test]
    fn end_defaults_to_start() {
        let task = Task::from_raw(row(Some("Kickoff"), Some("2024-01-03"), None)).expect("task");
        assert_eq!(task.start, ymd(2024, 1, 3));
        assert_eq!(task.end, ymd(2024, 1, 3));
        assert_eq!(task.duration_days(), 1);
    }

    #[test]
    fn end_before_start_is_clamped() {
        let task =
            Task::from_raw(row(Some("Backwards"), Some("2024-01-10"), Some("2024-01-02")))
                .expect("task");
        assert_eq!(task.end, task.start);
    }

    #[test]
    fn unparsable_end_is_treated_as_absent() {
        let task = Task::from_raw(row(Some("Fuzzy"), Some("2024-01-10"), Some("soon"))).expect("task");
        assert_eq!(task.end, ymd(2024, 1, 10));
    }

    #[test]
    fn rows_without_name_or_start_are_rejected() {
        assert_eq!(
            Task::from_raw(row(Some("   "), Some("2024-01-01"), None)),
            Err(TaskRowError::MissingName)
        );
        assert_eq!(Task::from_raw(row(Some("No date"), None, None)), Err(TaskRowError::MissingStart));
        assert_eq!(
            Task::from_raw(row(Some("Bad date"), Some("tomorrow"), None)),
            Err(TaskRowError::InvalidStart(DateParseError::Unrecognized("tomorrow".into())))
        );
        assert_eq!(
            Task::from_raw(row(Some("Far"), Some("+262142-12-31"), None)),
            Err(TaskRowError::InvalidStart(DateParseError::OutOfRange("+262142-12-31".into())))
        );
    }

    #[test]
    fn blank_category_and_group_become_none() {
        let mut raw = row(Some("Design"), Some("2024-02-01"), Some("2024-02-09"));
        raw.category = Some(" ".into());
        raw.group = Some("Phase 1".into());
        let task = Task::from_raw(raw).expect("task");
        assert_eq!(task.category, None);
        assert_eq!(task.group.as_deref(), Some("Phase 1"));
        assert_eq!(task.duration_days(), 9);
    }

    #[test]
    fn notes_are_trimmed_and_blank_notes_dropped() {
        let mut raw = row(Some("Design"), Some("2024-02-01"), None);
        raw.notes = Some("  waiting on vendor ".into());
        assert_eq!(Task::from_raw(raw.clone()).expect("task").notes.as_deref(), Some("waiting on vendor"));

        raw.notes = Some("\n ".into());
        assert_eq!(Task::from_raw(raw).expect("task").notes, None);
    }

    #[test]
    fn field_value_resolves_builtins_and_metadata() {
        let task = Task::new("Ship", ymd(2024, 3, 1), None)
            .with_category("release")
            .with_group("Backend")
            .with_metadata("Owner Team", "platform");

        assert_eq!(task.field_value("Category"), Some("release"));
        assert_eq!(task.field_value("group"), Some("Backend"));
        assert_eq!(task.field_value("owner team"), Some("platform"));
        assert_eq!(task.field_value("assignee"), None);
    }

    #[test]
    fn past_tasks_end_before_today() {
        let task = Task::new("Old", ymd(2024, 1, 1), Some(ymd(2024, 1, 4)));
        assert!(task.is_past(ymd(2024, 1, 5)));
        assert!(!task.is_past(ymd(2024, 1, 4)));
    }

    #[test]
    fn field_keys_are_snake_cased() {
        assert_eq!(normalize_field_key("  Start   Date "), "start_date");
    }

    #[test]
    fn raw_rows_deserialize_with_missing_fields() {
        let parsed: RawTaskRow =
            serde_json::from_str(r#"{"name":"A","start":"2024-01-01"}"#).expect("json row");
        assert_eq!(parsed.name.as_deref(), Some("A"));
        assert!(parsed.metadata.is_empty());
    }
}
