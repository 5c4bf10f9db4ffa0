//! Sync command handlers

use anyhow::{bail, Result};

use tasks_core::{LoadOutcome, SyncOrchestrator, UploadOutcome};

use crate::output::Output;

/// Pull remote lists, then push the result
pub async fn sync(sync: &SyncOrchestrator, output: &Output) -> Result<()> {
    require_remote(sync)?;

    output.message("Loading from remote...");
    let loaded = sync.load_from_remote().await;
    output.print_load(&loaded);
    fail_with_last_error(sync, matches!(loaded, LoadOutcome::Failed))?;

    let uploaded = sync.sync_now().await;
    output.print_upload(&uploaded);
    fail_with_last_error(sync, matches!(uploaded, UploadOutcome::Failed))
}

/// Pull remote lists; remote replaces local
pub async fn load(sync: &SyncOrchestrator, output: &Output) -> Result<()> {
    require_remote(sync)?;

    let loaded = sync.load_from_remote().await;
    output.print_load(&loaded);
    fail_with_last_error(sync, matches!(loaded, LoadOutcome::Failed))
}

/// Push local lists now
pub async fn upload(sync: &SyncOrchestrator, output: &Output) -> Result<()> {
    require_remote(sync)?;

    let uploaded = sync.sync_now().await;
    output.print_upload(&uploaded);
    fail_with_last_error(sync, matches!(uploaded, UploadOutcome::Failed))
}

/// First load of the session when signed in; failures only warn
pub async fn auto_load(sync: &SyncOrchestrator, output: &Output) {
    let status = sync.status();
    if !status.signed_in || !status.remote_configured {
        return;
    }

    if sync.load_from_remote().await == LoadOutcome::Failed {
        warn_last_error(sync, "Auto-load failed, using local lists", output);
    }
}

/// Push after a local change when signed in; failures only warn
pub async fn flush(sync: &SyncOrchestrator, output: &Output) {
    let status = sync.status();
    if !status.signed_in || !status.remote_configured {
        return;
    }

    if sync.sync_now().await == UploadOutcome::Failed {
        warn_last_error(sync, "Auto-sync failed, changes kept locally", output);
    }
}

fn require_remote(sync: &SyncOrchestrator) -> Result<()> {
    let status = sync.status();
    if !status.remote_configured {
        bail!(
            "Remote sync is not configured. Set it with:\n  \
             tasks config set remote_db /path/to/shared/tasks.db"
        );
    }
    if !status.signed_in {
        bail!(
            "Not signed in. Sign in with:\n  \
             tasks config set user_id <your-id>"
        );
    }
    Ok(())
}

fn fail_with_last_error(sync: &SyncOrchestrator, failed: bool) -> Result<()> {
    if failed {
        let reason = sync
            .last_error()
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("Sync failed: {}", reason);
    }
    Ok(())
}

fn warn_last_error(sync: &SyncOrchestrator, context: &str, output: &Output) {
    match sync.last_error() {
        Some(e) => output.warn(&format!("{}: {}", context, e)),
        None => output.warn(context),
    }
}
