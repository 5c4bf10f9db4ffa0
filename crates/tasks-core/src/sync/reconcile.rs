//! Reconciliation strategies
//!
//! Decides what the collection becomes when a remote load returns data.

use crate::models::TodoList;

/// Combines the local collection with what the remote store returned
pub trait Reconciler: Send + Sync + 'static {
    fn reconcile(&self, local: &[TodoList], remote: Vec<TodoList>) -> Vec<TodoList>;
}

/// Remote replaces local wholesale
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl Reconciler for LastWriterWins {
    fn reconcile(&self, _local: &[TodoList], remote: Vec<TodoList>) -> Vec<TodoList> {
        remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TodoItem;

    #[test]
    fn test_last_writer_wins_ignores_local() {
        let mut local = TodoList::new("Local");
        local.items.push(TodoItem::new("only here"));
        let remote = vec![TodoList::new("Remote")];

        let result = LastWriterWins.reconcile(&[local], remote.clone());
        assert_eq!(result, remote);
    }
}
