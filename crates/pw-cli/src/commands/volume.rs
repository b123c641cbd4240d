//! Volume command for reading and writing the persisted volume of an origin.

use std::io::Write;

use anyhow::{Context, Result, bail};
use pw_core::{VOLUME_KEY, origin_of, parse_volume};
use pw_db::Database;

fn resolve_origin(url: &str) -> Result<String> {
    origin_of(url).with_context(|| format!("not a valid origin: {url}"))
}

/// Prints the volume a page on `origin` would start with.
pub fn get<W: Write>(writer: &mut W, db: &Database, origin: &str) -> Result<()> {
    let origin = resolve_origin(origin)?;
    let raw = db.local_get(&origin, VOLUME_KEY)?;
    writeln!(writer, "{}", parse_volume(raw.as_deref()))?;
    Ok(())
}

/// Persists `value` as the volume of `origin`.
pub fn set<W: Write>(writer: &mut W, db: &Database, origin: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("volume must be between 0.0 and 1.0, got {value}");
    }
    let origin = resolve_origin(origin)?;
    db.local_set(&origin, VOLUME_KEY, &value.to_string())?;
    writeln!(writer, "{origin}: {value}")?;
    Ok(())
}
