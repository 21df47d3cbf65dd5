//! Inspect command implementation.

use lobdb_core::{Layout, LobContext};
use serde::Serialize;
use std::path::Path;

/// LOB area inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Naming scheme of new files.
    pub layout: String,
    /// Number of LOB files.
    pub total_files: u64,
    /// Total size in bytes.
    pub total_bytes: u64,
    /// Number of temp files.
    pub temp_files: u64,
    /// Size of temp files in bytes.
    pub temp_bytes: u64,
    /// Number of files with legacy flat names.
    pub flat_files: u64,
    /// Deepest shard level holding a file.
    pub max_depth: u32,
    /// Largest number of files in one shard directory.
    pub max_files_per_directory: u64,
    /// Shard directories that could not be listed.
    pub unreadable_directories: u64,
    /// Per-table statistics.
    pub tables: Vec<TableStats>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table ID.
    pub id: u32,
    /// Number of LOB files.
    pub files: u64,
    /// Total size in bytes.
    pub bytes: u64,
}

/// Runs the inspect command.
pub fn run(path: &Path, flat: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = super::open_context(path, flat)?;
    let result = inspect(&ctx)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn inspect(ctx: &LobContext) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let inventory = ctx.inventory()?;
    let layout = match ctx.layout() {
        Layout::Sharded => "sharded",
        Layout::Flat => "flat",
    };

    Ok(InspectResult {
        path: ctx.base_path().display().to_string(),
        layout: layout.to_string(),
        total_files: inventory.total_files(),
        total_bytes: inventory.total_bytes(),
        temp_files: inventory.temp_files,
        temp_bytes: inventory.temp_bytes,
        flat_files: inventory.flat_files,
        max_depth: inventory.max_depth,
        max_files_per_directory: inventory.max_files_per_directory,
        unreadable_directories: inventory.unreadable_directories,
        tables: inventory
            .tables
            .iter()
            .map(|(table, usage)| TableStats {
                id: table.as_u32(),
                files: usage.files,
                bytes: usage.bytes,
            })
            .collect(),
    })
}

fn print_text_output(result: &InspectResult) {
    println!("LobDB LOB Area Inspection");
    println!("=========================");
    println!();
    println!("Path:   {}", result.path);
    println!("Layout: {}", result.layout);
    println!();
    println!("Files:");
    println!("  Total:      {} ({})", result.total_files, format_size(result.total_bytes));
    println!("  Temp:       {} ({})", result.temp_files, format_size(result.temp_bytes));
    println!("  Flat names: {}", result.flat_files);
    println!();
    println!("Shards:");
    println!("  Deepest level:       {}", result.max_depth);
    println!("  Most files in a dir: {}", result.max_files_per_directory);
    if result.unreadable_directories > 0 {
        println!("  Unreadable dirs:     {}", result.unreadable_directories);
    }

    if !result.tables.is_empty() {
        println!();
        println!("Tables:");
        for table in &result.tables {
            println!(
                "  [{}] {} files, {}",
                table.id,
                table.files,
                format_size(table.bytes)
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
