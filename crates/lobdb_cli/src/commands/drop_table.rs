//! Drop-table command implementation.

use lobdb_core::TableId;
use std::path::Path;

/// Runs the drop-table command.
pub fn run(path: &Path, flat: bool, table: u32) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = super::open_context(path, flat)?;
    let table = TableId::new(table);

    println!("Removing LOB files of {table} at {}", path.display());
    let report = ctx.remove_all_for_table(table)?;

    println!("  Removed: {}", report.removed);
    if report.failed > 0 {
        println!("  Failed:  {} (see log)", report.failed);
        return Err(format!("{} LOB files could not be removed", report.failed).into());
    }
    println!("✓ Done");

    Ok(())
}
