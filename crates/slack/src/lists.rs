//! Slack List reading: raw list items to validated [`Task`]s.

use std::collections::BTreeMap;
use std::sync::Arc;

use ganttbot_core::config::ColumnConfig;
use ganttbot_core::domain::task::{normalize_field_key, RawTaskRow, Task};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ListField, ListItem, ListSchema, SlackApi, SlackApiError};

const NAME_FALLBACKS: &[&str] = &["name", "title"];
const START_FALLBACKS: &[&str] = &["start_date", "start", "date"];
const END_FALLBACKS: &[&str] = &["end_date", "end", "due_date"];
const NOTES_FALLBACKS: &[&str] = &["description"];

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("reading list `{list_id}` failed: {source}")]
    Api {
        list_id: String,
        #[source]
        source: SlackApiError,
    },
}

pub struct ListService {
    api: Arc<dyn SlackApi>,
    columns: ColumnConfig,
}

impl ListService {
    pub fn new(api: Arc<dyn SlackApi>, columns: ColumnConfig) -> Self {
        Self { api, columns }
    }

    /// Reads the list once and returns its valid rows as tasks, in list order.
    /// Malformed rows are logged and skipped.
    pub async fn fetch_tasks(&self, list_id: &str) -> Result<Vec<Task>, FetchError> {
        let schema = self.fetch_schema(list_id).await;
        let items = self
            .api
            .list_items(list_id)
            .await
            .map_err(|source| FetchError::Api { list_id: list_id.to_owned(), source })?;

        let total = items.len();
        let mut tasks = Vec::with_capacity(total);
        for item in &items {
            match Task::from_raw(self.row_from_item(item, &schema)) {
                Ok(task) => tasks.push(task),
                Err(error) => warn!(
                    event_name = "lists.row.skipped",
                    list_id,
                    item_id = %item.id,
                    reason = %error,
                    "skipping list row"
                ),
            }
        }

        info!(
            event_name = "lists.fetch.completed",
            list_id,
            rows = total,
            tasks = tasks.len(),
            skipped = total - tasks.len(),
            "read list rows"
        );
        Ok(tasks)
    }

    /// A missing schema is not fatal: rows whose fields are keyed by name still map.
    async fn fetch_schema(&self, list_id: &str) -> ListSchema {
        match self.api.list_schema(list_id).await {
            Ok(schema) => {
                debug!(
                    event_name = "lists.schema.resolved",
                    list_id,
                    columns = schema.columns.len(),
                    "resolved list columns"
                );
                schema
            }
            Err(error) => {
                warn!(
                    event_name = "lists.schema.unavailable",
                    list_id,
                    error = %error,
                    "list schema unavailable; matching fields by key only"
                );
                ListSchema::default()
            }
        }
    }

    /// Maps one list item onto the string-level row shape. Configured column
    /// names match field keys directly or, through the schema, column ids.
    pub fn row_from_item(&self, item: &ListItem, schema: &ListSchema) -> RawTaskRow {
        let columns = &self.columns;
        let find = |configured: &str, fallbacks: &[&str]| {
            find_field(&item.fields, schema, configured, fallbacks)
        };
        let name = find(&columns.name, NAME_FALLBACKS);
        let start = find(&columns.start, START_FALLBACKS);
        let end = find(&columns.end, END_FALLBACKS);
        let category = find(&columns.category, &[]);
        let group = find(&columns.group, &[]);
        let notes = find(&columns.notes, NOTES_FALLBACKS);

        let used: Vec<usize> = [name, start, end, category, group, notes]
            .iter()
            .flatten()
            .map(|(index, _)| *index)
            .collect();

        let metadata: BTreeMap<String, String> = item
            .fields
            .iter()
            .enumerate()
            .filter(|(index, _)| !used.contains(index))
            .filter_map(|(_, field)| {
                let label = match schema.column_of(field) {
                    Some(column) if !column.name.trim().is_empty() => column.name.as_str(),
                    _ => field.id()?,
                };
                Some((label.to_owned(), cell_text(field)?))
            })
            .collect();

        let label = |found: Option<(usize, &ListField)>| {
            found.and_then(|(_, field)| select_label(field, schema, &columns.category_options))
        };

        RawTaskRow {
            id: item.id.clone(),
            name: name.and_then(|(_, field)| cell_text(field)),
            start: start.and_then(|(_, field)| date_text(field)),
            end: end.and_then(|(_, field)| date_text(field)),
            category: label(category),
            group: label(group),
            notes: notes.and_then(|(_, field)| cell_text(field)),
            metadata,
        }
    }
}

/// Finds the configured column, by key, id, or schema name, falling back to
/// common names.
fn find_field<'a>(
    fields: &'a [ListField],
    schema: &ListSchema,
    configured: &str,
    fallbacks: &[&str],
) -> Option<(usize, &'a ListField)> {
    let lookup = |wanted: &str| {
        let normalized = normalize_field_key(wanted);
        let matches = |label: &str| {
            label.eq_ignore_ascii_case(wanted) || normalize_field_key(label) == normalized
        };
        fields.iter().enumerate().find(|(_, field)| {
            field.id().is_some_and(matches)
                || schema.column_of(field).is_some_and(|column| matches(&column.name))
        })
    };

    std::iter::once(configured)
        .chain(fallbacks.iter().copied())
        .filter(|wanted| !wanted.trim().is_empty())
        .find_map(lookup)
}

fn cell_text(field: &ListField) -> Option<String> {
    field
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
        .or_else(|| flatten_value(&field.value))
}

fn date_text(field: &ListField) -> Option<String> {
    first_scalar(&field.value).or_else(|| cell_text(field))
}

/// Configured option labels win over the schema's choice labels.
fn select_label(
    field: &ListField,
    schema: &ListSchema,
    options: &BTreeMap<String, String>,
) -> Option<String> {
    let Some(raw) = first_scalar(&field.value) else {
        return cell_text(field);
    };
    let from_schema = || schema.column_of(field)?.choice_label(&raw).map(str::to_owned);
    options
        .get(&raw)
        .cloned()
        .or_else(from_schema)
        .or_else(|| cell_text(field))
        .or(Some(raw))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_owned()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn first_scalar(value: &Value) -> Option<String> {
    match value {
        Value::Array(values) => values.iter().find_map(scalar_text),
        other => scalar_text(other),
    }
}

/// Plain text for any cell value. Scalar arrays are joined; rich text blocks
/// are flattened to their text runs.
fn flatten_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Array(values) if values.iter().all(|value| scalar_text(value).is_some()) => {
            let parts: Vec<String> = values.iter().filter_map(scalar_text).collect();
            Some(parts.join(", ")).filter(|joined| !joined.is_empty())
        }
        Value::Array(_) | Value::Object(_) => {
            let mut text = String::new();
            collect_rich_text(value, &mut text);
            Some(text.trim().to_owned()).filter(|text| !text.is_empty())
        }
        scalar => scalar_text(scalar),
    }
}

fn collect_rich_text(value: &Value, out: &mut String) {
    match value {
        Value::Array(values) => values.iter().for_each(|value| collect_rich_text(value, out)),
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                out.push_str(text);
            }
            if let Some(elements) = map.get("elements") {
                collect_rich_text(elements, out);
            }
        }
        _ => {}
    }
}
