//! Collection editing
//!
//! Pure operations over an ordered collection of lists. Each returns a new
//! collection which front-ends hand to the orchestrator as a whole-collection
//! replace. Nothing here touches storage.

use thiserror::Error;

use crate::models::{TodoItem, TodoList};

/// Rejections for collection edits
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    /// Every installation keeps at least one list
    #[error("You must have at least one list.")]
    LastList,

    #[error("List not found: '{0}'")]
    ListNotFound(String),

    #[error("Item not found: '{0}'")]
    ItemNotFound(String),

    /// An item edit was refused (e.g. a due time without a due date)
    #[error("Invalid edit: {0}")]
    InvalidEdit(String),
}

pub type CollectionResult<T> = Result<T, CollectionError>;

/// Append a new "Untitled List", returning the new collection and its id
pub fn create_list(lists: &[TodoList]) -> (Vec<TodoList>, String) {
    let list = TodoList::untitled();
    let id = list.id.clone();
    let mut next = lists.to_vec();
    next.push(list);
    (next, id)
}

/// Remove a list
///
/// Removing the only remaining list is rejected and the collection is left
/// as it was.
pub fn delete_list(lists: &[TodoList], list_id: &str) -> CollectionResult<Vec<TodoList>> {
    find_list(lists, list_id)?;
    if lists.len() <= 1 {
        return Err(CollectionError::LastList);
    }
    Ok(lists.iter().filter(|l| l.id != list_id).cloned().collect())
}

/// Rename a list
pub fn rename_list(
    lists: &[TodoList],
    list_id: &str,
    name: impl Into<String>,
) -> CollectionResult<Vec<TodoList>> {
    let name = name.into();
    with_list(lists, list_id, |list| {
        list.name = name;
        Ok(())
    })
}

/// Append a blank item to a list, returning the new collection and the item id
pub fn add_item(lists: &[TodoList], list_id: &str) -> CollectionResult<(Vec<TodoList>, String)> {
    let item = TodoItem::blank();
    let id = item.id.clone();
    let next = with_list(lists, list_id, |list| {
        list.items.push(item);
        Ok(())
    })?;
    Ok((next, id))
}

/// Apply an edit to one item
pub fn update_item<F>(
    lists: &[TodoList],
    list_id: &str,
    item_id: &str,
    edit: F,
) -> CollectionResult<Vec<TodoList>>
where
    F: FnOnce(&mut TodoItem) -> CollectionResult<()>,
{
    with_list(lists, list_id, |list| {
        let item = list
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| CollectionError::ItemNotFound(item_id.to_string()))?;
        edit(item)
    })
}

/// Remove an item from a list
pub fn delete_item(
    lists: &[TodoList],
    list_id: &str,
    item_id: &str,
) -> CollectionResult<Vec<TodoList>> {
    with_list(lists, list_id, |list| {
        let pos = list
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| CollectionError::ItemNotFound(item_id.to_string()))?;
        list.items.remove(pos);
        Ok(())
    })
}

/// Append a copy of an item to the end of its list
pub fn duplicate_item(
    lists: &[TodoList],
    list_id: &str,
    item_id: &str,
) -> CollectionResult<(Vec<TodoList>, String)> {
    let mut new_id = String::new();
    let next = with_list(lists, list_id, |list| {
        let copy = list
            .item(item_id)
            .map(TodoItem::duplicate)
            .ok_or_else(|| CollectionError::ItemNotFound(item_id.to_string()))?;
        new_id = copy.id.clone();
        list.items.push(copy);
        Ok(())
    })?;
    Ok((next, new_id))
}

fn find_list<'a>(lists: &'a [TodoList], list_id: &str) -> CollectionResult<&'a TodoList> {
    lists
        .iter()
        .find(|l| l.id == list_id)
        .ok_or_else(|| CollectionError::ListNotFound(list_id.to_string()))
}

/// Clone the collection and run `f` on the matching list
fn with_list<F>(lists: &[TodoList], list_id: &str, f: F) -> CollectionResult<Vec<TodoList>>
where
    F: FnOnce(&mut TodoList) -> CollectionResult<()>,
{
    let mut next = lists.to_vec();
    let list = next
        .iter_mut()
        .find(|l| l.id == list_id)
        .ok_or_else(|| CollectionError::ListNotFound(list_id.to_string()))?;
    f(list)?;
    Ok(next)
}
