//! CLI command handlers

pub mod config;
pub mod items;
pub mod lists;
pub mod status;
pub mod sync;

use anyhow::{bail, Result};

use tasks_core::{TodoItem, TodoList};

use crate::output::short_id;

/// Find a list by full id, exact name (case-insensitive) or id prefix
pub fn resolve_list<'a>(lists: &'a [TodoList], query: &str) -> Result<&'a TodoList> {
    if let Some(list) = lists.iter().find(|l| l.id == query) {
        return Ok(list);
    }

    let by_name: Vec<_> = lists
        .iter()
        .filter(|l| l.name.eq_ignore_ascii_case(query))
        .collect();
    if by_name.len() == 1 {
        return Ok(by_name[0]);
    }

    let matches: Vec<_> = if by_name.is_empty() {
        lists.iter().filter(|l| l.id.starts_with(query)).collect()
    } else {
        by_name
    };

    match matches.len() {
        0 => bail!("No list found matching: {}", query),
        1 => Ok(matches[0]),
        _ => {
            eprintln!("Multiple lists match '{}':", query);
            for list in &matches {
                eprintln!("  {} - {}", list.id, list.name);
            }
            bail!("Ambiguous list. Use the list ID instead.");
        }
    }
}

/// Find an item in a list by full id or id prefix
pub fn resolve_item<'a>(list: &'a TodoList, query: &str) -> Result<&'a TodoItem> {
    if let Some(item) = list.item(query) {
        return Ok(item);
    }

    let matches: Vec<_> = list
        .items
        .iter()
        .filter(|i| i.id.starts_with(query))
        .collect();

    match matches.len() {
        0 => bail!("No item in '{}' matching: {}", list.name, query),
        1 => Ok(matches[0]),
        _ => {
            eprintln!("Multiple items match '{}':", query);
            for item in &matches {
                eprintln!("  {} - {}", short_id(&item.id), item.title);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}
