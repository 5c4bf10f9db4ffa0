//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use tasks_core::{LoadOutcome, SyncStatus, TodoItem, TodoList, UploadOutcome};

/// Characters of an id shown in human output
const SHORT_ID_LEN: usize = 8;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    /// Print all lists with item counts
    pub fn print_lists(&self, lists: &[TodoList]) {
        match self.format {
            OutputFormat::Human => {
                for list in lists {
                    let done = list.items.iter().filter(|i| i.completed).count();
                    println!(
                        "{} | {} | {} item(s), {} done",
                        short_id(&list.id),
                        truncate(&list.name, 40),
                        list.items.len(),
                        done
                    );
                }
                println!("\n{} list(s)", lists.len());
            }
            OutputFormat::Json => print_json(&lists),
            OutputFormat::Quiet => {
                for list in lists {
                    println!("{}", list.id);
                }
            }
        }
    }

    /// Print one list with its items
    pub fn print_list(&self, list: &TodoList) {
        match self.format {
            OutputFormat::Human => {
                println!("{} ({})", list.name, short_id(&list.id));
                println!();
                if list.items.is_empty() {
                    println!("No items.");
                    return;
                }
                for item in &list.items {
                    println!("{}", item_line(item));
                }
                println!("\n{} item(s)", list.items.len());
            }
            OutputFormat::Json => print_json(list),
            OutputFormat::Quiet => {
                for item in &list.items {
                    println!("{}", item.id);
                }
            }
        }
    }

    /// Print a single item
    pub fn print_item(&self, item: &TodoItem) {
        match self.format {
            OutputFormat::Human => println!("{}", item_line(item)),
            OutputFormat::Json => print_json(item),
            OutputFormat::Quiet => println!("{}", item.id),
        }
    }

    /// Print sync status
    pub fn print_status(&self, status: &SyncStatus, list_count: usize, item_count: usize) {
        match self.format {
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "sync": status,
                        "counts": {
                            "lists": list_count,
                            "items": item_count
                        }
                    })
                );
            }
            OutputFormat::Quiet => {
                println!("{}", if status.signed_in { "signed-in" } else { "signed-out" });
            }
            OutputFormat::Human => {
                println!("Tasks Status");
                println!("============");
                println!();
                println!("Sync:");
                match &status.user_id {
                    Some(user_id) => println!("  Signed in as: {}", user_id),
                    None => println!("  Signed out (local only)"),
                }
                println!(
                    "  Remote:       {}",
                    if status.remote_configured {
                        "configured"
                    } else {
                        "not configured"
                    }
                );
                if let Some(ref error) = status.last_error {
                    println!("  Last error:   {}", error);
                }
                println!();
                println!("Contents:");
                println!("  Lists: {}", list_count);
                println!("  Items: {}", item_count);
            }
        }
    }

    /// Report the result of an upload
    pub fn print_upload(&self, outcome: &UploadOutcome) {
        let message = match outcome {
            UploadOutcome::Uploaded { lists } => format!("Uploaded {} list(s)", lists),
            UploadOutcome::Unchanged => "Already up to date".to_string(),
            UploadOutcome::NotSignedIn => "Not signed in, nothing uploaded".to_string(),
            UploadOutcome::InFlight => "Another upload is running".to_string(),
            UploadOutcome::Failed => "Upload failed".to_string(),
        };
        self.report(outcome, &message);
    }

    /// Report the result of a load
    pub fn print_load(&self, outcome: &LoadOutcome) {
        let message = match outcome {
            LoadOutcome::Loaded { lists } => format!("Loaded {} list(s) from remote", lists),
            LoadOutcome::Seeded { lists, .. } => {
                format!("Remote was empty, uploaded {} local list(s)", lists)
            }
            LoadOutcome::Empty => "Remote has no lists".to_string(),
            LoadOutcome::Unchanged => "Already up to date".to_string(),
            LoadOutcome::NotSignedIn => "Not signed in, nothing loaded".to_string(),
            LoadOutcome::Failed => "Load failed, using local lists".to_string(),
        };
        self.report(outcome, &message);
    }

    fn report<T: Serialize>(&self, outcome: &T, message: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", message),
            OutputFormat::Json => print_json(outcome),
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a created/affected id: the id alone in quiet mode
    pub fn created(&self, id: &str, message: &str) {
        match self.format {
            OutputFormat::Quiet => println!("{}", id),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "id": id, "message": message})
                );
            }
            OutputFormat::Human => println!("✓ {}", message),
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr (suppressed in quiet mode)
    pub fn warn(&self, msg: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", msg);
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

/// First characters of an id
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// One line per item: checkbox, id, title, due, priority, indented by level
fn item_line(item: &TodoItem) -> String {
    let indent = "  ".repeat(item.level as usize);
    let check = if item.completed { "[x]" } else { "[ ]" };
    let title = if item.is_empty && item.title.is_empty() {
        "(empty)".to_string()
    } else {
        truncate(&item.title, 50)
    };

    let mut line = format!("{}{} {}  {}", indent, check, short_id(&item.id), title);
    if let Some(date) = item.due_date {
        line.push_str(&format!("  due {}", date.format("%Y-%m-%d")));
        if let Some(time) = item.due_time {
            line.push_str(&format!(" {}", time.format("%H:%M")));
        }
    }
    if let Some(priority) = item.priority {
        line.push_str(&format!("  !{}", priority));
    }
    line
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
