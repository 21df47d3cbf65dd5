//! CLI command implementations.

pub mod drop_table;
pub mod inspect;
pub mod purge_temp;

use lobdb_core::{LobConfig, LobContext};
use std::path::Path;

/// Opens the LOB area of the database at `path`.
///
/// Fails if the directory holding the database does not exist.
fn open_context(path: &Path, flat: bool) -> Result<LobContext, Box<dyn std::error::Error>> {
    let ctx = LobContext::open_on_disk(path, LobConfig::default().legacy_flat_naming(flat))?;
    let dir = ctx.locator().flat_dir();
    if !dir.is_dir() {
        return Err(format!("No database directory at {}", dir.display()).into());
    }
    Ok(ctx)
}
