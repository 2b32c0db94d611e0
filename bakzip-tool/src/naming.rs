use chrono::{DateTime, Utc};
use rand::Rng;
use std::path::{Path, PathBuf};

use crate::error::BackupError;

/// Strips everything from the first dot of a source folder name:
/// `my.backup.dir` becomes `my`. A leading dot is part of the name, so
/// `.config` stays whole and `.cache.d` becomes `.cache`.
pub fn strip_extension(folder: &str) -> &str {
    match folder.char_indices().skip(1).find(|&(_, c)| c == '.') {
        Some((pos, _)) => &folder[..pos],
        None => folder,
    }
}

/// Builds the archive path inside `dir` from a name template.
///
/// Supported placeholders (case-insensitive): `%src%`, `%date%`, `%time%`,
/// `%datetime%`, `%unix%` and `%rand%`. A `.zip` extension is appended when
/// the expanded name lacks one.
pub fn create_archive_path(
    dir: &Path,
    template: &str,
    source_name: &str,
) -> Result<PathBuf, BackupError> {
    let name = expand_template(template, source_name, Utc::now());

    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(BackupError::InvalidName(template.to_string()));
    }

    let name = if name.to_ascii_lowercase().ends_with(".zip") {
        name
    } else {
        format!("{name}.zip")
    };
    Ok(dir.join(name))
}

fn expand_template(template: &str, source_name: &str, now: DateTime<Utc>) -> String {
    // Longer placeholders first so %datetime% is not eaten by %date%.
    let replacements = [
        ("%datetime%", now.format("%Y-%m-%d_%H-%M-%S").to_string()),
        ("%date%", now.format("%Y-%m-%d").to_string()),
        ("%time%", now.format("%H-%M-%S").to_string()),
        ("%unix%", now.timestamp().to_string()),
        ("%rand%", random_string(5)),
        ("%src%", strip_extension(source_name).to_string()),
    ];

    let mut name = template.to_string();
    for (pattern, value) in replacements {
        name = replace_case_insensitive(&name, pattern, &value);
    }
    name
}

/// Generates a random lowercase alphanumeric string.
fn random_string(len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CHARS.len());
            CHARS[idx] as char
        })
        .collect()
}

/// Helper for case-insensitive substring replacement. Patterns are ASCII, so
/// byte offsets in the lowercased copy line up with the original.
fn replace_case_insensitive(s: &str, pattern: &str, replacement: &str) -> String {
    let mut result = String::new();
    let lower_s = s.to_ascii_lowercase();
    let lower_pattern = pattern.to_ascii_lowercase();

    let mut last_end = 0;

    while let Some(pos) = lower_s[last_end..].find(&lower_pattern) {
        let abs_pos = last_end + pos;
        result.push_str(&s[last_end..abs_pos]);
        result.push_str(replacement);
        last_end = abs_pos + pattern.len();
    }

    result.push_str(&s[last_end..]);
    result
}
