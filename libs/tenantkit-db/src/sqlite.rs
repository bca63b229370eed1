//! `SQLite` DSN helpers.

use std::path::Path;

use crate::{DbError, Result};

/// True for `sqlite::memory:` and `mode=memory` URIs.
pub fn is_memory_dsn(dsn: &str) -> bool {
    let tail = strip_scheme(dsn);
    tail == ":memory:" || tail.starts_with(":memory:?") || dsn.contains("mode=memory")
}

/// Ensure the parent directory of a file database exists.
///
/// Returns the DSN unchanged; memory DSNs are never touched.
pub fn prepare_sqlite_path(dsn: &str, create_dirs: bool) -> Result<String> {
    if is_memory_dsn(dsn) || !create_dirs {
        return Ok(dsn.to_owned());
    }

    let path_part = strip_scheme(dsn)
        .split('?')
        .next()
        .unwrap_or_default()
        .trim_start_matches("file:");
    if path_part.is_empty() {
        return Err(DbError::InvalidConfig(format!(
            "SQLite DSN has no database path: {dsn}"
        )));
    }

    if let Some(parent) = Path::new(path_part).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = dsn.to_owned();
    if !out.contains("mode=") {
        out.push_str(if out.contains('?') { "&mode=rwc" } else { "?mode=rwc" });
    }
    Ok(out)
}

fn strip_scheme(dsn: &str) -> &str {
    dsn.strip_prefix("sqlite://")
        .or_else(|| dsn.strip_prefix("sqlite:"))
        .unwrap_or(dsn)
}
