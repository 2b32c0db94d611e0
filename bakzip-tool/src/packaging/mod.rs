use std::path::PathBuf;

pub mod zip;

/// What a walked entry stands for inside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file whose contents are compressed into the archive.
    File,
    /// A directory that yielded no files; stored as an empty directory entry
    /// so the folder is not lost.
    Placeholder,
}

/// Represents one entry to include in the ZIP archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub name_in_archive: String,
    pub kind: EntryKind,
}

impl BackupEntry {
    pub fn file(path: PathBuf, name_in_archive: String) -> Self {
        Self {
            path,
            name_in_archive,
            kind: EntryKind::File,
        }
    }

    /// Placeholder for a file-less directory. The stored name carries the
    /// trailing slash zip readers use to recognise directories.
    pub fn placeholder(path: PathBuf, dir_name_in_archive: &str) -> Self {
        Self {
            path,
            name_in_archive: format!("{}/", dir_name_in_archive.trim_end_matches('/')),
            kind: EntryKind::Placeholder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_gets_exactly_one_trailing_slash() {
        let a = BackupEntry::placeholder(PathBuf::from("proj/empty"), "proj/empty");
        let b = BackupEntry::placeholder(PathBuf::from("proj/empty"), "proj/empty/");
        assert_eq!(a.name_in_archive, "proj/empty/");
        assert_eq!(a, b);
        assert_eq!(a.kind, EntryKind::Placeholder);
    }
}
