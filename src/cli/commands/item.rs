//! Item command implementations (local store only).

use std::path::{Path, PathBuf};

use chrono::Utc;
use colored::Colorize;
use serde::Serialize;

use crate::cli::commands::{home_dir, load_config, open_local};
use crate::cli::{ItemAddArgs, ItemCommands, ItemListArgs, ItemUpdateArgs};
use crate::error::{Error, Result};
use crate::model::{ItemFields, WorkItem};
use crate::storage::{ListFilter, LocalStore};
use crate::sync::{MappingStore, SyncRecord};
use crate::validate::{find_similar_ids, normalize_kind, normalize_status};

/// Output for item list.
#[derive(Serialize)]
struct ItemListOutput {
    items: Vec<WorkItem>,
    count: usize,
}

/// Output for item show.
#[derive(Serialize)]
struct ItemShowOutput {
    item: WorkItem,
    sync: Option<SyncRecord>,
}

/// Execute item commands.
pub fn execute(
    command: &ItemCommands,
    home: Option<&PathBuf>,
    provider: Option<&str>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let home = home_dir(home)?;
    match command {
        ItemCommands::Add(args) => add(args, &home, dry_run, json),
        ItemCommands::List(args) => list(args, &home, json),
        ItemCommands::Show { id } => show(id, &home, provider, json),
        ItemCommands::Update(args) => update(args, &home, dry_run, json),
    }
}

fn add(args: &ItemAddArgs, home: &Path, dry_run: bool, json: bool) -> Result<()> {
    if args.title.trim().is_empty() {
        return Err(Error::Validation("title must not be empty".to_string()));
    }
    let kind = normalize_kind(&args.kind)?;
    let status = normalize_status(&args.status)?;

    let mut item = WorkItem::new(args.title.trim(), kind);
    item.fields.status = status;
    item.fields.description.clone_from(&args.description);
    item.fields.assignee.clone_from(&args.assignee);
    item.fields.labels = clean_labels(&args.labels);

    if dry_run {
        if json {
            let output = serde_json::json!({
                "dry_run": true,
                "action": "add_item",
                "item": item,
            });
            println!("{output}");
        } else {
            println!("Would add {}: {} [{}]", item.fields.kind, item.fields.title, item.fields.status);
        }
        return Ok(());
    }

    let store = open_local(home)?;
    store.write_entity(&item)?;

    if json {
        println!("{}", serde_json::to_string(&item)?);
    } else {
        println!("Added {}: {}", item.local_id.cyan(), item.fields.title);
        println!("  Kind: {}", item.fields.kind);
        println!("  Status: {}", item.fields.status);
    }
    Ok(())
}

fn list(args: &ItemListArgs, home: &Path, json: bool) -> Result<()> {
    let filter = ListFilter {
        status: args.status.as_deref().map(normalize_status).transpose()?,
        kind: args.kind.as_deref().map(normalize_kind).transpose()?,
        limit: args.limit,
    };
    let items = open_local(home)?.list(&filter)?;

    if json {
        let output = ItemListOutput {
            count: items.len(),
            items,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }
    for item in &items {
        println!(
            "  {}  {:<12} {:<8} {}",
            item.local_id.cyan(),
            item.fields.status.as_str(),
            item.fields.kind.as_str(),
            item.fields.title
        );
    }
    println!();
    println!("{} item(s)", items.len());
    Ok(())
}

fn show(id: &str, home: &Path, provider: Option<&str>, json: bool) -> Result<()> {
    let store = open_local(home)?;
    let item = find(&store, id)?;

    // The sync record is shown only when a provider is configured.
    let config = load_config(home, provider)?;
    let sync = match config.provider_kind() {
        Ok(kind) => MappingStore::open_in_home(home, kind)?.lookup_by_local(id),
        Err(_) => None,
    };

    if json {
        let output = ItemShowOutput { item, sync };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    print_item(&item);
    match sync {
        Some(record) => {
            println!();
            println!("  Remote:    {} #{}", record.remote_kind, record.remote_id);
            println!("  State:     {}", record.state.as_str());
            println!(
                "  Last sync: {} ({})",
                record.last_sync.format("%Y-%m-%d %H:%M:%S"),
                record.last_action.as_str()
            );
        }
        None => println!("  {}", "not synced".dimmed()),
    }
    Ok(())
}

fn update(args: &ItemUpdateArgs, home: &Path, dry_run: bool, json: bool) -> Result<()> {
    let store = open_local(home)?;
    let mut item = find(&store, &args.id)?;
    let before = item.fields.clone();

    apply_update(&mut item.fields, args)?;
    let changed = before.diff(&item.fields);

    if changed.is_empty() {
        if json {
            println!("{}", serde_json::json!({ "id": item.local_id, "changed": changed }));
        } else {
            println!("No changes to {}", item.local_id);
        }
        return Ok(());
    }

    if dry_run {
        if json {
            let output = serde_json::json!({
                "dry_run": true,
                "action": "update_item",
                "id": item.local_id,
                "changed": changed,
            });
            println!("{output}");
        } else {
            println!("Would update {}: {}", item.local_id, changed.join(", "));
        }
        return Ok(());
    }

    item.updated_at = Some(Utc::now());
    store.write_entity(&item)?;

    if json {
        println!("{}", serde_json::json!({ "id": item.local_id, "changed": changed }));
    } else {
        println!("Updated {}: {}", item.local_id.cyan(), changed.join(", "));
    }
    Ok(())
}

fn apply_update(fields: &mut ItemFields, args: &ItemUpdateArgs) -> Result<()> {
    if let Some(title) = &args.title {
        if title.trim().is_empty() {
            return Err(Error::Validation("title must not be empty".to_string()));
        }
        fields.title = title.trim().to_string();
    }
    if let Some(status) = &args.status {
        fields.status = normalize_status(status)?;
    }
    if let Some(kind) = &args.kind {
        fields.kind = normalize_kind(kind)?;
    }
    if let Some(description) = &args.description {
        fields.description = Some(description.clone()).filter(|d| !d.is_empty());
    }
    if let Some(assignee) = &args.assignee {
        fields.assignee = Some(assignee.clone()).filter(|a| !a.is_empty());
    }
    if let Some(labels) = &args.labels {
        fields.labels = clean_labels(labels);
    }
    Ok(())
}

/// Look up an item, suggesting close ids when it is missing.
fn find(store: &impl LocalStore, id: &str) -> Result<WorkItem> {
    match store.read_entity(id) {
        Err(Error::ItemNotFound { .. }) => {
            let similar = find_similar_ids(id, &store.list_ids()?, 3);
            if similar.is_empty() {
                Err(Error::ItemNotFound { id: id.to_string() })
            } else {
                Err(Error::InvalidArgument(format!(
                    "no item '{id}' (did you mean {}?)",
                    similar.join(", ")
                )))
            }
        }
        other => other,
    }
}

fn clean_labels(labels: &[String]) -> Vec<String> {
    let mut out: Vec<String> = labels
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

fn print_item(item: &WorkItem) {
    println!("{}  {}", item.local_id.cyan().bold(), item.fields.title.bold());
    println!("  Kind:      {}", item.fields.kind);
    println!("  Status:    {}", item.fields.status);
    if let Some(assignee) = &item.fields.assignee {
        println!("  Assignee:  {assignee}");
    }
    if !item.fields.labels.is_empty() {
        println!("  Labels:    {}", item.fields.labels.join(", "));
    }
    if let Some(updated) = item.effective_timestamp() {
        println!("  Updated:   {}", updated.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(description) = &item.fields.description {
        println!();
        println!("{description}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemKind, ItemStatus};
    use crate::storage::MemoryLocalStore;

    fn update_args(id: &str) -> ItemUpdateArgs {
        ItemUpdateArgs {
            id: id.to_string(),
            title: None,
            status: None,
            kind: None,
            description: None,
            assignee: None,
            labels: None,
        }
    }

    #[test]
    fn test_apply_update_normalizes_synonyms() {
        let mut fields = ItemFields {
            title: "Ship".into(),
            ..ItemFields::default()
        };
        let args = ItemUpdateArgs {
            status: Some("wip".into()),
            kind: Some("story".into()),
            labels: Some(vec![" b".into(), "a".into(), "b".into(), String::new()]),
            ..update_args("wi_1")
        };
        apply_update(&mut fields, &args).unwrap();
        assert_eq!(fields.status, ItemStatus::InProgress);
        assert_eq!(fields.kind, ItemKind::Feature);
        assert_eq!(fields.labels, vec!["a", "b"]);
    }

    #[test]
    fn test_apply_update_rejects_blank_title() {
        let mut fields = ItemFields::default();
        let args = ItemUpdateArgs {
            title: Some("  ".into()),
            ..update_args("wi_1")
        };
        assert!(matches!(
            apply_update(&mut fields, &args),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_find_suggests_similar_ids() {
        let mut item = WorkItem::new("One", ItemKind::Task);
        item.local_id = "wi_abcdef123456".into();
        let store = MemoryLocalStore::with_items([item]);

        assert!(find(&store, "wi_abcdef123456").is_ok());
        let err = find(&store, "wi_abcdef123457").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(ref m) if m.contains("wi_abcdef123456")));
        assert!(matches!(
            find(&store, "zzz").unwrap_err(),
            Error::ItemNotFound { .. }
        ));
    }
}
