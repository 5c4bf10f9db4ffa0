//! Status command handler

use anyhow::Result;

use tasks_core::{Config, SyncOrchestrator};

use crate::output::{Output, OutputFormat};

/// Show status information
pub fn show(sync: &SyncOrchestrator, config: &Config, output: &Output) -> Result<()> {
    let lists = sync.lists();
    let item_count = lists.iter().map(|l| l.items.len()).sum();

    output.print_status(&sync.status(), lists.len(), item_count);

    if output.format == OutputFormat::Human {
        println!();
        println!("Storage:");
        println!("  Local:  {}", config.local_store_dir().display());
        if let Some(ref remote) = config.remote_db {
            println!("  Remote: {}", remote.display());
        }
    }

    Ok(())
}
