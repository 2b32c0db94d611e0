use anyhow::{Context, Result};
use std::{
    ffi::OsStr,
    fs,
    path::{Path, PathBuf},
};

use glob::Pattern;

use crate::error::BackupError;
use crate::packaging::BackupEntry;

/// Compiles `skip` patterns, naming the offending pattern on failure.
pub fn compile_skip_patterns(skip: Option<&[String]>) -> Result<Vec<Pattern>, BackupError> {
    skip.unwrap_or_default()
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|source| BackupError::InvalidSkipPattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// Base name of a folder as given on the command line, resolving `.` and `..`.
pub fn folder_name(path: &Path) -> Result<String> {
    if let Some(name) = path.file_name() {
        return Ok(name.to_string_lossy().to_string());
    }
    let canonical =
        fs::canonicalize(path).with_context(|| format!("resolving folder {path:?}"))?;
    canonical
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("folder {path:?} has no name"))
}

/// Walks `source` top-down and lists everything to put in the archive.
///
/// Entry names are relative to the source's parent, so they start with the
/// source folder's own name. A directory without any files contributes one
/// placeholder entry instead. `exclude` keeps the archive being written out
/// of its own contents when it lives inside the source.
pub fn list_entries(
    source: &Path,
    skip: &[Pattern],
    exclude: Option<&Path>,
) -> Result<Vec<BackupEntry>> {
    let mut result = Vec::new();
    let root_name = folder_name(source)?;
    let walker = Walker { skip, exclude };
    walker.walk_dir(source, &root_name, &mut result)?;
    Ok(result)
}

struct Walker<'a> {
    skip: &'a [Pattern],
    exclude: Option<&'a Path>,
}

impl Walker<'_> {
    fn is_skipped(&self, path: &Path, name_in_archive: &str) -> bool {
        let path_str = path.to_string_lossy();
        self.skip
            .iter()
            .any(|p| p.matches(&path_str) || p.matches(name_in_archive))
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let Some(exclude) = self.exclude else {
            return false;
        };
        if path.file_name() != exclude.file_name() {
            return false;
        }
        fs::canonicalize(path)
            .map(|p| p == exclude)
            .unwrap_or(false)
    }

    fn walk_dir(&self, dir: &Path, prefix: &str, result: &mut Vec<BackupEntry>) -> Result<()> {
        let mut children = fs::read_dir(dir)
            .with_context(|| format!("reading directory {dir:?}"))?
            .collect::<std::io::Result<Vec<_>>>()
            .with_context(|| format!("reading directory {dir:?}"))?;
        children.sort_by_key(|e| e.file_name());

        let mut files = Vec::new();
        let mut subdirs = Vec::new();

        for entry in children {
            let path = entry.path();
            let name = archive_name(prefix, &entry.file_name(), &path);

            if self.is_skipped(&path, &name) {
                tracing::debug!("skipping {}", path.display());
                continue;
            }

            let file_type = entry
                .file_type()
                .with_context(|| format!("inspecting {path:?}"))?;

            if file_type.is_dir() {
                subdirs.push((path, name));
            } else if file_type.is_symlink() && path.is_dir() {
                // Directory links are not followed.
                tracing::debug!("not following directory link {}", path.display());
            } else if self.is_excluded(&path) {
                tracing::debug!("leaving out the archive itself: {}", path.display());
            } else {
                files.push(BackupEntry::file(path, name));
            }
        }

        if files.is_empty() {
            result.push(BackupEntry::placeholder(dir.to_path_buf(), prefix));
        } else {
            result.extend(files);
        }

        for (path, name) in subdirs {
            self.walk_dir(&path, &name, result)?;
        }
        Ok(())
    }
}

/// Joins a walked file name onto its parent's archive name. Names that are
/// not valid UTF-8 are stored with replacement characters, and said so.
fn archive_name(prefix: &str, file_name: &OsStr, path: &Path) -> String {
    if file_name.to_str().is_none() {
        tracing::warn!(
            "{} is not valid UTF-8, storing it as {:?}",
            path.display(),
            file_name.to_string_lossy()
        );
    }
    format!("{prefix}/{}", file_name.to_string_lossy())
}

/// Total size in bytes of the regular files among `entries`.
pub fn total_size(entries: &[BackupEntry]) -> Result<u64> {
    let mut total: u64 = 0;
    for entry in entries {
        if entry.path.is_file() {
            let meta = fs::metadata(&entry.path)?;
            total += meta.len();
        }
    }
    Ok(total)
}

/// Convert bytes into a human-friendly string using binary (KiB, MiB, GiB...) units.
pub fn encode_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    // 1.0 MiB prints as 1 MiB
    if (size * 10.0) % 10.0 == 0.0 {
        format!("{:.0} {}", size, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Absolute form of a path that may not exist yet, for comparisons against
/// walked paths. An empty path means the current directory.
pub fn absolute(path: &Path) -> PathBuf {
    let path = if path.as_os_str().is_empty() {
        Path::new(".")
    } else {
        path
    };
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packaging::EntryKind;

    fn names(entries: &[BackupEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name_in_archive.as_str()).collect()
    }

    fn sample_tree() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        let proj = tmp.path().join("proj");
        fs::create_dir_all(proj.join("empty")).unwrap();
        fs::create_dir_all(proj.join("deep/er/est")).unwrap();
        fs::create_dir_all(proj.join("src")).unwrap();
        fs::write(proj.join("a.txt"), "hi").unwrap();
        fs::write(proj.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(proj.join("src/notes.tmp"), "scratch").unwrap();
        tmp
    }

    #[test]
    fn walk_is_top_down_with_placeholders() {
        let tmp = sample_tree();
        let entries = list_entries(&tmp.path().join("proj"), &[], None).unwrap();

        assert_eq!(
            names(&entries),
            vec![
                "proj/a.txt",
                "proj/deep/",
                "proj/deep/er/",
                "proj/deep/er/est/",
                "proj/empty/",
                "proj/src/main.rs",
                "proj/src/notes.tmp",
            ]
        );
        let placeholders = entries
            .iter()
            .filter(|e| e.kind == EntryKind::Placeholder)
            .count();
        assert_eq!(placeholders, 4);
    }

    #[test]
    fn empty_source_becomes_single_placeholder() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("bare");
        fs::create_dir(&src).unwrap();

        let entries = list_entries(&src, &[], None).unwrap();
        assert_eq!(names(&entries), vec!["bare/"]);
        assert_eq!(entries[0].path, src);
    }

    #[test]
    fn skip_patterns_match_path_or_archive_name() {
        let tmp = sample_tree();
        let skip = compile_skip_patterns(Some(&["*.tmp".to_string(), "proj/deep".to_string()]))
            .unwrap();
        let entries = list_entries(&tmp.path().join("proj"), &skip, None).unwrap();

        assert_eq!(
            names(&entries),
            vec!["proj/a.txt", "proj/empty/", "proj/src/main.rs"]
        );
    }

    #[test]
    fn archive_inside_source_is_left_out() {
        let tmp = sample_tree();
        let proj = tmp.path().join("proj");
        let archive = proj.join("proj.zip");
        fs::write(&archive, "partial").unwrap();

        let exclude = absolute(&archive);
        let entries = list_entries(&proj, &[], Some(&exclude)).unwrap();
        assert!(!names(&entries).contains(&"proj/proj.zip"));
        assert!(names(&entries).contains(&"proj/a.txt"));
    }

    #[test]
    fn invalid_skip_pattern_is_reported() {
        let err = compile_skip_patterns(Some(&["[".to_string()])).unwrap_err();
        assert!(matches!(err, BackupError::InvalidSkipPattern { ref pattern, .. } if pattern == "["));
    }

    #[test]
    fn folder_name_resolves_dot() {
        let tmp = tempfile::tempdir().unwrap();
        let inner = tmp.path().join("inner");
        fs::create_dir(&inner).unwrap();
        assert_eq!(folder_name(&inner.join(".")).unwrap(), "inner");
        assert_eq!(folder_name(&inner.join("..")).unwrap(), folder_name(tmp.path()).unwrap());
        assert_eq!(folder_name(Path::new("proj/")).unwrap(), "proj");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_utf8_names_are_kept_lossily() {
        use std::os::unix::ffi::OsStrExt;

        let tmp = tempfile::tempdir().unwrap();
        let proj = tmp.path().join("proj");
        fs::create_dir(&proj).unwrap();
        let raw = proj.join(OsStr::from_bytes(b"bad\xff.txt"));
        fs::write(&raw, "x").unwrap();

        let entries = list_entries(&proj, &[], None).unwrap();
        assert_eq!(names(&entries), vec!["proj/bad\u{FFFD}.txt"]);
        assert_eq!(entries[0].path, raw);
    }

    #[test]
    fn archive_name_joins_prefix() {
        let name = archive_name("proj/src", OsStr::new("main.rs"), Path::new("proj/src/main.rs"));
        assert_eq!(name, "proj/src/main.rs");
    }

    #[test]
    fn totals_and_sizes() {
        let tmp = sample_tree();
        let entries = list_entries(&tmp.path().join("proj"), &[], None).unwrap();
        assert_eq!(total_size(&entries).unwrap(), 2 + 12 + 7);

        assert_eq!(encode_size(0), "0 B");
        assert_eq!(encode_size(512), "512 B");
        assert_eq!(encode_size(1024), "1 KiB");
        assert_eq!(encode_size(1536), "1.5 KiB");
        assert_eq!(encode_size(5 * 1024 * 1024), "5 MiB");
    }
}
