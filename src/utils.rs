//! Formatting helpers for log lines and the atomic file write shared by the
//! state file and the rejected-ruleset dump.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Compact count for log lines: `950`, `1.5K`, `2.3M`.
///
/// ```
/// use blocksmith::utils::format_count;
/// assert_eq!(format_count(950), "950");
/// assert_eq!(format_count(1500), "1.5K");
/// assert_eq!(format_count(2_300_000), "2.3M");
/// ```
pub fn format_count(count: usize) -> String {
    const UNITS: [(usize, &str); 2] = [(1_000_000, "M"), (1_000, "K")];
    UNITS
        .iter()
        .find(|(scale, _)| count >= *scale)
        .map(|(scale, suffix)| format!("{:.1}{}", count as f64 / *scale as f64, suffix))
        .unwrap_or_else(|| count.to_string())
}

/// Exact count grouped by thousands, for address totals that reach 2^128.
///
/// ```
/// use blocksmith::utils::format_count_with_separator;
/// assert_eq!(format_count_with_separator(70_000), "70,000");
/// ```
pub fn format_count_with_separator(n: u128) -> String {
    let digits = n.to_string();
    let lead = digits.len() % 3;
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.char_indices() {
        if i != 0 && (i + 3 - lead) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Download size for log lines, in binary units.
pub fn format_bytes(bytes: u64) -> String {
    let mut value = bytes as f64;
    for unit in ["B", "KB", "MB"] {
        if value < 1024.0 {
            return if unit == "B" {
                format!("{} B", bytes)
            } else {
                format!("{:.1} {}", value, unit)
            };
        }
        value /= 1024.0;
    }
    format!("{:.1} GB", value)
}

/// Write `contents` to `path` so readers see either the old or the new file.
///
/// The data goes to a temporary file in the same directory, is synced, then
/// renamed over the target. Missing parent directories are created.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create directory {:?}", parent))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in {:?}", parent))?;
    temp_file.write_all(contents)?;
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to persist {:?}", path))?;

    Ok(())
}
