//! Project `.env` support: KEY=VALUE pairs read for [`crate::load_env`].
//!
//! The format accepted here is the small common denominator of `.env`
//! dialects: one assignment per line, `#` comments, an optional `export`
//! prefix, single or double quotes around the value. No multiline values and
//! no interpolation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::LoadError;

/// Strips one layer of matching quotes. Double quotes honor the `\"` escape;
/// single-quoted values are taken literally.
fn unquote(raw: &str) -> String {
    if raw.len() >= 2 {
        if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
            return inner.replace("\\\"", "\"");
        }
        if let Some(inner) = raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\'')) {
            return inner.to_string();
        }
    }
    raw.to_string()
}

/// One assignment, or `None` for blanks, comments, and lines without `=`.
/// `KEY=` is a valid assignment of the empty string.
fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line
        .strip_prefix("export ")
        .map(str::trim_start)
        .unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), unquote(value.trim())))
}

fn env_file_path(override_dir: Option<&Path>) -> Option<PathBuf> {
    let dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().ok()?,
    };
    Some(dir.join(".env")).filter(|p| p.is_file())
}

/// Reads `.env` from `override_dir` (or the current directory) into a map.
/// A missing file is not an error; on duplicate keys the last line wins.
pub fn read_env_file(override_dir: Option<&Path>) -> Result<HashMap<String, String>, LoadError> {
    let Some(path) = env_file_path(override_dir) else {
        return Ok(HashMap::new());
    };
    let content = std::fs::read_to_string(&path).map_err(|source| LoadError::Read {
        path: path.clone(),
        source,
    })?;
    Ok(content.lines().filter_map(parse_line).collect())
}
