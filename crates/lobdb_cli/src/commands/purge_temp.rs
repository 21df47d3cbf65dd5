//! Purge-temp command implementation.

use std::path::Path;

/// Runs the purge-temp command.
///
/// The database must not be open: temp files of live values would be
/// removed as well.
pub fn run(path: &Path, flat: bool) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = super::open_context(path, flat)?;

    println!("Purging LOB temp files at {}", path.display());
    let report = ctx.purge_temp_files()?;

    println!("  Removed: {}", report.removed);
    if report.failed > 0 {
        println!("  Failed:  {} (see log)", report.failed);
        return Err(format!("{} temp files could not be removed", report.failed).into());
    }
    println!("✓ Done");

    Ok(())
}
