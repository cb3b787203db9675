//! Command handlers.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use traytrack_core::utils::{format_age, format_timestamp, truncate_string};
use traytrack_core::{
    normalize, validate_case_type_requirement, validate_physician_preference, Collection,
    RecordState, RecordStore, RequirementDraft, Resolution, Stored,
};

/// Column width for tray names in tables
const TRAY_NAME_WIDTH: usize = 32;

/// Column width for notes in tables
const NOTES_WIDTH: usize = 40;

// ============================================================================
// Resolution
// ============================================================================

pub fn resolve(data_dir: &Path, case_type: &str, physician: Option<&str>, json: bool) -> Result<()> {
    let store = RecordStore::open(data_dir.to_path_buf())?;
    let resolution = store.resolve_case(case_type, physician)?;
    print_resolution(&resolution, json)
}

/// Poll the store and re-resolve whenever a collection file changes.
pub async fn watch(
    data_dir: &Path,
    case_type: &str,
    physician: Option<&str>,
    json: bool,
    interval: Duration,
) -> Result<()> {
    let store = RecordStore::open(data_dir.to_path_buf())?;
    let mut ticker = tokio::time::interval(interval);
    let mut last_seen = None;
    let mut first = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(case_type, interval_secs = interval.as_secs(), "Watching for record changes");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let modified = store.last_modified();
                if !first && modified == last_seen {
                    continue;
                }
                first = false;
                last_seen = modified;

                match store.resolve_case(case_type, physician) {
                    Ok(resolution) => {
                        if !json {
                            println!("--- {} ---", Utc::now().format("%H:%M:%S"));
                        }
                        print_resolution(&resolution, json)?;
                    }
                    // Storage errors are transient here; keep watching
                    Err(e) => warn!(error = %e, "Failed to resolve after change"),
                }
            }
            _ = &mut ctrl_c => {
                debug!("Interrupted, stopping watch");
                return Ok(());
            }
        }
    }
}

fn print_resolution(resolution: &Resolution, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(resolution)?);
        return Ok(());
    }

    let who = resolution
        .physician_id
        .as_deref()
        .map(|p| format!(" for {}", p))
        .unwrap_or_default();
    println!("{}{}: {}", resolution.case_type, who, resolution.summary());

    if resolution.is_unconfigured() {
        return Ok(());
    }

    println!(
        "{:<4} {:<10} {:<width$} {:>3}  {:<19} {}",
        "PRI",
        "TYPE",
        "TRAY",
        "QTY",
        "SOURCE",
        "NOTES",
        width = TRAY_NAME_WIDTH
    );
    for req in &resolution.requirements {
        println!(
            "{:<4} {:<10} {:<width$} {:>3}  {:<19} {}",
            req.priority,
            req.requirement_type,
            truncate_string(req.display_name(), TRAY_NAME_WIDTH),
            req.quantity,
            req.source.to_string(),
            truncate_string(&req.notes, NOTES_WIDTH),
            width = TRAY_NAME_WIDTH
        );
    }
    Ok(())
}

// ============================================================================
// Documents
// ============================================================================

/// Read a JSON file holding one document or an array of documents.
fn read_documents(file: &Path) -> Result<Vec<Value>> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", file.display()))?;
    Ok(match value {
        Value::Array(docs) => docs,
        doc => vec![doc],
    })
}

pub fn validate_file(file: &Path, collection: Collection) -> Result<()> {
    let docs = read_documents(file)?;
    let total = docs.len();
    let mut invalid = 0usize;

    for (position, doc) in docs.into_iter().enumerate() {
        let draft: RequirementDraft = match serde_json::from_value(normalize(doc)) {
            Ok(draft) => draft,
            Err(e) => {
                invalid += 1;
                println!("#{}: unreadable document: {}", position, e);
                continue;
            }
        };
        let label = draft
            .id
            .clone()
            .unwrap_or_else(|| format!("#{}", position));

        let violations = match collection {
            Collection::CaseTypeRequirements => validate_case_type_requirement(&draft).err(),
            Collection::PhysicianPreferences => validate_physician_preference(&draft).err(),
        };
        match violations {
            None => println!("{}: ok", label),
            Some(err) => {
                invalid += 1;
                println!("{}: invalid", label);
                for violation in &err.violations {
                    println!("  - {}", violation);
                }
            }
        }
    }

    if invalid > 0 {
        bail!("{} of {} records invalid", invalid, total);
    }
    println!("All {} records valid", total);
    Ok(())
}

pub fn normalize_file(file: &Path) -> Result<()> {
    let normalized: Vec<Value> = read_documents(file)?.into_iter().map(normalize).collect();
    println!("{}", serde_json::to_string_pretty(&normalized)?);
    Ok(())
}

// ============================================================================
// Writes
// ============================================================================

pub fn add_default(data_dir: &Path, draft: RequirementDraft) -> Result<()> {
    let store = RecordStore::open(data_dir.to_path_buf())?;
    let stored = store.add_case_type_requirement(&draft)?;
    println!(
        "Added {} tray {} to {} ({})",
        stored.record.requirement_type, stored.record.tray_id, stored.record.case_type, stored.id
    );
    Ok(())
}

pub fn add_preference(data_dir: &Path, draft: RequirementDraft) -> Result<()> {
    let store = RecordStore::open(data_dir.to_path_buf())?;
    let stored = store.add_physician_preference(&draft)?;
    println!(
        "Added {} preference for tray {} ({} / {}) ({})",
        stored.record.requirement_type,
        stored.record.tray_id,
        stored.record.physician_id,
        stored.record.case_type,
        stored.id
    );
    Ok(())
}

pub fn remove(data_dir: &Path, collection: Collection, id: &str) -> Result<()> {
    let store = RecordStore::open(data_dir.to_path_buf())?;
    store.soft_delete(collection, id)?;
    println!("Removed {} from {}", id, collection);
    Ok(())
}

// ============================================================================
// Listing
// ============================================================================

pub fn list(
    data_dir: &Path,
    collection: Collection,
    case_type: Option<&str>,
    include_deleted: bool,
) -> Result<()> {
    let store = RecordStore::open(data_dir.to_path_buf())?;

    let rows: Vec<String> = match collection {
        Collection::CaseTypeRequirements => store
            .load_case_type_requirements()?
            .iter()
            .filter(|s| include_deleted || s.is_active())
            .filter(|s| case_type.map_or(true, |c| s.record.case_type == c))
            .map(|s| {
                list_row(
                    s,
                    &format!(
                        "{:<24} {:<10} {:<10} pri {:<2} qty {}",
                        truncate_string(&s.record.case_type, 24),
                        s.record.tray_id,
                        s.record.requirement_type,
                        s.record.priority,
                        s.record.quantity
                    ),
                )
            })
            .collect(),
        Collection::PhysicianPreferences => store
            .load_physician_preferences()?
            .iter()
            .filter(|s| include_deleted || s.is_active())
            .filter(|s| case_type.map_or(true, |c| s.record.case_type == c))
            .map(|s| {
                let priority = s
                    .record
                    .priority
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_string());
                list_row(
                    s,
                    &format!(
                        "{:<12} {:<24} {:<10} {:<10} pri {:<2} qty {}",
                        s.record.physician_id,
                        truncate_string(&s.record.case_type, 24),
                        s.record.tray_id,
                        s.record.requirement_type,
                        priority,
                        s.record.quantity
                    ),
                )
            })
            .collect(),
    };

    if rows.is_empty() {
        println!("No records in {}", collection);
    }
    for row in rows {
        println!("{}", row);
    }
    Ok(())
}

fn list_row<T>(stored: &Stored<T>, body: &str) -> String {
    let now = Utc::now();
    let status = match stored.state {
        RecordState::Deleted { at: Some(at) } => format!("deleted {}", format_age(at, now)),
        RecordState::Deleted { at: None } => "deleted".to_string(),
        RecordState::Active => match stored.updated_at {
            Some(at) => format!("updated {}", format_age(at, now)),
            None => format!("created {}", format_timestamp(stored.created_at)),
        },
    };
    format!("{:<38} {}  [{}]", stored.id, body, status)
}
