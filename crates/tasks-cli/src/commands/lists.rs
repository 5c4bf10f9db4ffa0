//! List command handlers

use anyhow::Result;

use tasks_core::collection;
use tasks_core::SyncOrchestrator;

use super::resolve_list;
use crate::output::Output;
use crate::prompt::confirm;

/// Show all lists
pub fn list_all(sync: &SyncOrchestrator, output: &Output) -> Result<()> {
    output.print_lists(&sync.lists());
    Ok(())
}

/// Show one list with its items
pub fn show(sync: &SyncOrchestrator, query: &str, output: &Output) -> Result<()> {
    let lists = sync.lists();
    let list = resolve_list(&lists, query)?;
    output.print_list(list);
    Ok(())
}

/// Create a new list, optionally named
pub fn create(sync: &SyncOrchestrator, name: Option<String>, output: &Output) -> Result<()> {
    let list_id = sync.apply(|lists| {
        let (next, id) = collection::create_list(lists);
        match name {
            Some(name) => Ok((collection::rename_list(&next, &id, name)?, id)),
            None => Ok((next, id)),
        }
    })?;

    let lists = sync.lists();
    let name = resolve_list(&lists, &list_id)?.name.clone();
    output.created(&list_id, &format!("Created list: {}", name));
    Ok(())
}

/// Rename a list
pub fn rename(sync: &SyncOrchestrator, query: &str, name: String, output: &Output) -> Result<()> {
    let lists = sync.lists();
    let list_id = resolve_list(&lists, query)?.id.clone();

    let message = format!("Renamed list to: {}", name);
    sync.apply(|lists| collection::rename_list(lists, &list_id, name).map(|next| (next, ())))?;

    output.success(&message);
    Ok(())
}

/// Delete a list and its items
pub fn delete(sync: &SyncOrchestrator, query: &str, yes: bool, output: &Output) -> Result<()> {
    let lists = sync.lists();
    let list = resolve_list(&lists, query)?;

    if !yes && output.should_prompt() {
        println!(
            "Delete list: {} - {} ({} item(s))",
            list.id,
            list.name,
            list.items.len()
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let list_id = list.id.clone();
    sync.apply(|lists| collection::delete_list(lists, &list_id).map(|next| (next, ())))?;

    output.success(&format!("Deleted list: {}", list.name));
    Ok(())
}
