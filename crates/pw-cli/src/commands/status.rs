//! Status command for showing the stored volumes and allow-list size.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use pw_core::{VOLUME_KEY, parse_volume};
use pw_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let patterns = db.url_patterns()?;
    let volumes = db.local_entries(VOLUME_KEY)?;

    writeln!(writer, "pagewarden status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    let noun = if patterns.len() == 1 {
        "entry"
    } else {
        "entries"
    };
    writeln!(writer, "Allow-list: {} {noun}", patterns.len())?;

    if volumes.is_empty() {
        writeln!(writer, "No volumes stored.")?;
        return Ok(());
    }

    writeln!(writer, "Volumes:")?;
    for entry in volumes {
        writeln!(
            writer,
            "- {}: {} (updated {})",
            entry.origin,
            parse_volume(Some(&entry.value)),
            entry.updated_at
        )?;
    }
    Ok(())
}
