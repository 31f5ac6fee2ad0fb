use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

/// Parse a tracked-id list: one id per line, optionally written as
/// `label: id`. Only the text after the last colon is the id. Blank lines
/// are skipped and duplicates collapse to their first occurrence.
pub fn parse_tracked_ids(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line.rsplit_once(':') {
            Some((_, id)) => id.trim(),
            None => line,
        })
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

pub fn read_tracked_ids(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "tracked id list not found at {} (one file id per line, optionally `name: id`)",
            path.display()
        )
    })?;
    Ok(parse_tracked_ids(&content))
}
