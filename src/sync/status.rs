//! Sync status display.

use colored::Colorize;

use crate::sync::types::{SyncState, SyncStatusView};

/// Print one line per item: id, state, remote id and last sync time.
pub fn print_status(views: &[SyncStatusView]) {
    if views.is_empty() {
        println!("No items.");
        return;
    }

    for view in views {
        let state = match view.record.as_ref().map(|r| r.state) {
            None => "unsynced".dimmed(),
            Some(SyncState::Synced) if view.fresh => "synced".green(),
            Some(SyncState::Synced) => "stale".yellow(),
            Some(SyncState::Conflicted) => "conflicted".red().bold(),
            Some(SyncState::Archived) => "archived".dimmed(),
        };
        match &view.record {
            Some(record) => println!(
                "  {}  {:<12} {} #{}  last sync {} ({})",
                view.local_id.cyan(),
                state,
                view.remote_kind,
                record.remote_id,
                record.last_sync.format("%Y-%m-%d %H:%M:%S"),
                record.last_action.as_str()
            ),
            None => println!("  {}  {}", view.local_id.cyan(), state),
        }
    }

    let count = |s: &str| views.iter().filter(|v| v.state == s).count();
    let stale = views
        .iter()
        .filter(|v| v.state == "synced" && !v.fresh)
        .count();
    println!();
    println!(
        "{} synced, {} stale, {} conflicted, {} archived, {} unsynced",
        count("synced") - stale,
        stale,
        count("conflicted"),
        count("archived"),
        count("unsynced")
    );
}
