//! Filename sanitization for page titles.

use std::collections::HashSet;

use anyhow::Result;
use unicode_normalization::UnicodeNormalization;

use crate::models::UrlKind;

/// Characters that are invalid in filenames somewhere we care about.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Stems that are reserved device names on Windows.
const RESERVED_STEMS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const MAX_UNIQUE_ATTEMPTS: u32 = 10_000;

/// Sanitize an arbitrary name into something safe for every major
/// filesystem. Fails only when nothing survives sanitization.
pub fn sanitize_filename(name: &str, max_length: usize) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        anyhow::bail!("Filename cannot be empty");
    }

    let normalized: String = trimmed.nfkc().collect();
    let mut sanitized: String = normalized
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || (c as u32) < 32 {
                '_'
            } else {
                c
            }
        })
        .collect();

    while sanitized.contains("__") {
        sanitized = sanitized.replace("__", "_");
    }

    let sanitized = sanitized.trim_matches(|c| c == '.' || c == ' ').to_string();
    if sanitized.is_empty() {
        anyhow::bail!("Filename becomes empty after sanitization: {name:?}");
    }

    let sanitized = guard_reserved_stem(&sanitized);
    Ok(truncate_preserving_extension(&sanitized, max_length))
}

/// Sanitize a wiki page title into its on-disk JSON filename. Category
/// titles get a `category_` prefix; everything ends in `.json`.
pub fn sanitize_title(title: &str, kind: UrlKind, max_length: usize) -> Result<String> {
    if title.trim().is_empty() {
        anyhow::bail!("Title cannot be empty");
    }
    let clean = title.trim().strip_prefix("Category:").unwrap_or(title.trim());
    let clean = clean.trim().replace('_', " ");
    let stem = sanitize_filename(&clean, max_length)?;
    let named = match kind {
        UrlKind::Category => format!("category_{stem}.json"),
        UrlKind::Article => format!("{stem}.json"),
    };
    Ok(truncate_preserving_extension(&named, max_length))
}

/// Make a name unique against the already-used set by inserting a counter
/// before the extension (`foo.json` -> `foo_1.json`).
pub fn unique_name(name: &str, existing: &HashSet<String>) -> Result<String> {
    if !existing.contains(name) {
        return Ok(name.to_string());
    }
    let (stem, extension) = split_extension(name);
    for counter in 1..=MAX_UNIQUE_ATTEMPTS {
        let candidate = match extension {
            Some(ext) => format!("{stem}_{counter}.{ext}"),
            None => format!("{stem}_{counter}"),
        };
        if !existing.contains(&candidate) {
            return Ok(candidate);
        }
    }
    anyhow::bail!("Unable to create unique filename for {name:?} after {MAX_UNIQUE_ATTEMPTS} attempts")
}

fn guard_reserved_stem(name: &str) -> String {
    let (stem, extension) = split_extension(name);
    if RESERVED_STEMS.contains(&stem.to_uppercase().as_str()) {
        match extension {
            Some(ext) => format!("{stem}_file.{ext}"),
            None => format!("{stem}_file"),
        }
    } else {
        name.to_string()
    }
}

/// Cap at `max_length` code points, keeping a trailing `.json` (or other
/// short extension) intact when one is present.
fn truncate_preserving_extension(name: &str, max_length: usize) -> String {
    if name.chars().count() <= max_length {
        return name.to_string();
    }
    let (stem, extension) = split_extension(name);
    if let Some(ext) = extension {
        let reserve = ext.chars().count() + 1;
        if max_length > reserve {
            let cut: String = stem.chars().take(max_length - reserve).collect();
            let cut = cut.trim_end_matches(|c| c == '.' || c == ' ' || c == '_');
            if !cut.is_empty() {
                return format!("{cut}.{ext}");
            }
        }
    }
    name.chars().take(max_length).collect()
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}
