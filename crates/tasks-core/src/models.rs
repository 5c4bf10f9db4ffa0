//! Data models for Tasks
//!
//! Defines the core data structures: TodoItem, TodoList, and Priority.
//! Field names serialize in camelCase so the local cache and the remote
//! row payload share one shape.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name given to lists created from the sidebar
pub const UNTITLED_LIST_NAME: &str = "Untitled List";

/// Name of the list seeded into an empty installation
pub const DEFAULT_LIST_NAME: &str = "My Tasks";

/// Generate a fresh opaque identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Item priority
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority '{}'", other)),
        }
    }
}

/// A single to-do entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    /// Unique identifier, never changes after creation
    pub id: String,
    /// Item text (empty while a fresh row is being typed)
    #[serde(default)]
    pub title: String,
    /// Whether the item is checked off
    #[serde(default)]
    pub completed: bool,
    /// Outline indentation level (rendering only)
    #[serde(default)]
    pub level: u32,
    /// Set on freshly created blank rows, cleared on first edit
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_empty: bool,
    /// Due date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    /// Due time of day, only meaningful together with `due_date`
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time_format"
    )]
    pub due_time: Option<NaiveTime>,
    /// Priority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl TodoItem {
    /// Create a new item with the given title
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            completed: false,
            level: 0,
            is_empty: false,
            due_date: None,
            due_time: None,
            priority: None,
        }
    }

    /// Create a blank item, as inserted when the user presses enter
    pub fn blank() -> Self {
        Self {
            is_empty: true,
            ..Self::new("")
        }
    }

    /// Update the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.is_empty = false;
    }

    /// Flip the completed flag
    pub fn toggle_completed(&mut self) {
        self.completed = !self.completed;
    }

    /// Indent one level
    pub fn indent(&mut self) {
        self.level += 1;
    }

    /// Outdent one level, never below zero
    pub fn outdent(&mut self) {
        self.level = self.level.saturating_sub(1);
    }

    /// Set or clear the due date
    ///
    /// Clearing the date also clears the due time.
    pub fn set_due_date(&mut self, date: Option<NaiveDate>) {
        self.due_date = date;
        if date.is_none() {
            self.due_time = None;
        }
    }

    /// Set or clear the due time
    ///
    /// Returns false (and leaves the item untouched) when setting a time on
    /// an item without a due date.
    pub fn set_due_time(&mut self, time: Option<NaiveTime>) -> bool {
        if time.is_some() && self.due_date.is_none() {
            return false;
        }
        self.due_time = time;
        true
    }

    /// Set or clear the priority
    pub fn set_priority(&mut self, priority: Option<Priority>) {
        self.priority = priority;
    }

    /// Copy of this item with a fresh id, as produced by "duplicate"
    pub fn duplicate(&self) -> Self {
        Self {
            id: new_id(),
            title: format!("{} (copy)", self.title),
            is_empty: false,
            ..self.clone()
        }
    }
}

/// A named, ordered list of items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TodoList {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Items in display order
    #[serde(default, rename = "todos")]
    pub items: Vec<TodoItem>,
}

impl TodoList {
    /// Create an empty list with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            items: Vec::new(),
        }
    }

    /// Create an empty list named "Untitled List"
    pub fn untitled() -> Self {
        Self::new(UNTITLED_LIST_NAME)
    }

    /// The list seeded into a fresh installation
    pub fn default_list() -> Self {
        Self::new(DEFAULT_LIST_NAME)
    }

    pub fn item(&self, id: &str) -> Option<&TodoItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// Parse a due date in `YYYY-MM-DD` form
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

/// Parse a due time in `HH:MM` form (seconds are tolerated)
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// `HH:MM` serde representation for optional times
mod time_format {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match time {
            Some(t) => serializer.serialize_str(&t.format("%H:%M").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => super::parse_time(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid time '{}'", s))),
        }
    }
}
