//! Row payload encoding
//!
//! Items travel in the row's `items` column as JSON. Writers store the item
//! array as a string-encoded JSON document; readers accept that, a
//! structured array, or garbage. Decoding favors availability: anything
//! that is not an item array becomes an empty list rather than an error.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

use super::ListRow;
use crate::models::{new_id, parse_date, parse_time, TodoItem, TodoList};

/// Decode a row's items payload
pub fn decode_items(payload: &Value) -> Vec<TodoItem> {
    match payload {
        Value::Null => Vec::new(),
        Value::Array(entries) => decode_entries(entries),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(entries)) => decode_entries(&entries),
            Ok(_) => {
                debug!("String-encoded items payload is not an array");
                Vec::new()
            }
            Err(e) => {
                debug!("Unparseable items payload: {}", e);
                Vec::new()
            }
        },
        _ => Vec::new(),
    }
}

/// Encode items for upload (string-encoded JSON array)
pub fn encode_items(items: &[TodoItem]) -> serde_json::Result<Value> {
    serde_json::to_string(items).map(Value::String)
}

/// Build the remote row for a list
pub fn list_to_row(
    list: &TodoList,
    owner_id: &str,
    updated_at: DateTime<Utc>,
) -> serde_json::Result<ListRow> {
    Ok(ListRow {
        id: list.id.clone(),
        name: list.name.clone(),
        items: encode_items(&list.items)?,
        owner_id: owner_id.to_string(),
        updated_at,
    })
}

/// Rebuild a list from a remote row
pub fn row_to_list(row: &ListRow) -> TodoList {
    TodoList {
        id: row.id.clone(),
        name: row.name.clone(),
        items: decode_items(&row.items),
    }
}

fn decode_entries(entries: &[Value]) -> Vec<TodoItem> {
    entries
        .iter()
        .filter_map(Value::as_object)
        .map(decode_item)
        .collect()
}

/// Field-by-field decode; bad fields fall back to their defaults
fn decode_item(obj: &Map<String, Value>) -> TodoItem {
    let str_field = |name: &str| obj.get(name).and_then(Value::as_str);

    let id = str_field("id")
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_id);

    TodoItem {
        id,
        title: str_field("title").unwrap_or_default().to_string(),
        completed: obj
            .get("completed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        level: obj
            .get("level")
            .and_then(Value::as_u64)
            .map(|l| l.min(u32::MAX as u64) as u32)
            .unwrap_or(0),
        is_empty: obj
            .get("isEmpty")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        due_date: str_field("dueDate").and_then(parse_date),
        due_time: str_field("dueTime").and_then(parse_time),
        priority: str_field("priority").and_then(|p| p.parse().ok()),
    }
}
