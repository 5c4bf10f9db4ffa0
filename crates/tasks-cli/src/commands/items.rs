//! Item command handlers

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::Args;

use tasks_core::collection::{self, CollectionError, CollectionResult};
use tasks_core::models::{parse_date, parse_time};
use tasks_core::{Priority, SyncOrchestrator, TodoItem};

use super::{resolve_item, resolve_list};
use crate::output::Output;

/// Priority argument: a level, or "none" to clear it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityArg {
    Set(Priority),
    Clear,
}

/// Optional item fields shared by `add` and `edit`
#[derive(Args, Debug, Clone, Default)]
pub struct ItemFields {
    /// Due date (YYYY-MM-DD)
    #[arg(short, long, value_parser = parse_due_date)]
    pub due: Option<NaiveDate>,

    /// Due time (HH:MM); needs a due date
    #[arg(short, long, value_parser = parse_due_time)]
    pub time: Option<NaiveTime>,

    /// Priority (high, medium, low, none)
    #[arg(short, long, value_parser = parse_priority)]
    pub priority: Option<PriorityArg>,
}

impl ItemFields {
    fn is_empty(&self) -> bool {
        self.due.is_none() && self.time.is_none() && self.priority.is_none()
    }

    fn apply(&self, item: &mut TodoItem) -> CollectionResult<()> {
        if let Some(date) = self.due {
            item.set_due_date(Some(date));
        }
        if let Some(time) = self.time {
            if !item.set_due_time(Some(time)) {
                return Err(CollectionError::InvalidEdit(
                    "a due time needs a due date".to_string(),
                ));
            }
        }
        match self.priority {
            Some(PriorityArg::Set(priority)) => item.set_priority(Some(priority)),
            Some(PriorityArg::Clear) => item.set_priority(None),
            None => {}
        }
        Ok(())
    }
}

/// Everything `edit` can change on an item
#[derive(Debug, Clone, Default)]
pub struct ItemEdit {
    pub title: Option<String>,
    pub fields: ItemFields,
    pub indent: bool,
    pub outdent: bool,
    pub clear_due: bool,
}

impl ItemEdit {
    fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.fields.is_empty()
            && !self.indent
            && !self.outdent
            && !self.clear_due
    }

    fn apply(&self, item: &mut TodoItem) -> CollectionResult<()> {
        if let Some(ref title) = self.title {
            item.set_title(title.clone());
        }
        if self.clear_due {
            item.set_due_date(None);
        }
        self.fields.apply(item)?;
        if self.indent {
            item.indent();
        }
        if self.outdent {
            item.outdent();
        }
        Ok(())
    }
}

/// Add an item with a title to a list
pub fn add(
    sync: &SyncOrchestrator,
    list_query: &str,
    title: String,
    fields: &ItemFields,
    output: &Output,
) -> Result<()> {
    let lists = sync.lists();
    let list_id = resolve_list(&lists, list_query)?.id.clone();

    let item_id = sync.apply(|lists| {
        let (next, item_id) = collection::add_item(lists, &list_id)?;
        let next = collection::update_item(&next, &list_id, &item_id, |item| {
            item.set_title(title);
            fields.apply(item)
        })?;
        Ok((next, item_id))
    })?;

    output.created(&item_id, "Added item");
    print_current(sync, &list_id, &item_id, output)
}

/// Toggle the completed flag
pub fn toggle_done(
    sync: &SyncOrchestrator,
    list_query: &str,
    item_query: &str,
    output: &Output,
) -> Result<()> {
    let (list_id, item_id) = locate(sync, list_query, item_query)?;

    sync.apply(|lists| {
        collection::update_item(lists, &list_id, &item_id, |item| {
            item.toggle_completed();
            Ok(())
        })
        .map(|next| (next, ()))
    })?;

    print_current(sync, &list_id, &item_id, output)
}

/// Edit an item's fields
pub fn edit(
    sync: &SyncOrchestrator,
    list_query: &str,
    item_query: &str,
    edit: &ItemEdit,
    output: &Output,
) -> Result<()> {
    if edit.is_empty() {
        bail!("Nothing to change. See `tasks edit --help` for the available options.");
    }
    let (list_id, item_id) = locate(sync, list_query, item_query)?;

    sync.apply(|lists| {
        collection::update_item(lists, &list_id, &item_id, |item| edit.apply(item))
            .map(|next| (next, ()))
    })?;

    output.success("Item updated");
    print_current(sync, &list_id, &item_id, output)
}

/// Delete an item
pub fn remove(
    sync: &SyncOrchestrator,
    list_query: &str,
    item_query: &str,
    output: &Output,
) -> Result<()> {
    let (list_id, item_id) = locate(sync, list_query, item_query)?;

    sync.apply(|lists| {
        collection::delete_item(lists, &list_id, &item_id).map(|next| (next, ()))
    })?;

    output.success(&format!("Deleted item: {}", item_id));
    Ok(())
}

/// Append a copy of an item
pub fn duplicate(
    sync: &SyncOrchestrator,
    list_query: &str,
    item_query: &str,
    output: &Output,
) -> Result<()> {
    let (list_id, item_id) = locate(sync, list_query, item_query)?;

    let copy_id = sync.apply(|lists| collection::duplicate_item(lists, &list_id, &item_id))?;

    output.created(&copy_id, "Duplicated item");
    print_current(sync, &list_id, &copy_id, output)
}

/// Resolve list and item queries to full ids
fn locate(sync: &SyncOrchestrator, list_query: &str, item_query: &str) -> Result<(String, String)> {
    let lists = sync.lists();
    let list = resolve_list(&lists, list_query)?;
    let item = resolve_item(list, item_query)?;
    Ok((list.id.clone(), item.id.clone()))
}

/// Print an item as it is now (human mode only; other modes already reported)
fn print_current(
    sync: &SyncOrchestrator,
    list_id: &str,
    item_id: &str,
    output: &Output,
) -> Result<()> {
    if !output.should_prompt() {
        return Ok(());
    }
    let lists = sync.lists();
    let list = resolve_list(&lists, list_id)?;
    output.print_item(resolve_item(list, item_id)?);
    Ok(())
}

fn parse_due_date(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).ok_or_else(|| format!("invalid date '{}', expected YYYY-MM-DD", s))
}

fn parse_due_time(s: &str) -> Result<NaiveTime, String> {
    parse_time(s).ok_or_else(|| format!("invalid time '{}', expected HH:MM", s))
}

fn parse_priority(s: &str) -> Result<PriorityArg, String> {
    if s.eq_ignore_ascii_case("none") {
        return Ok(PriorityArg::Clear);
    }
    s.parse().map(PriorityArg::Set)
}
