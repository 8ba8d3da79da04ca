//! In-place edits of package manifest files.

use std::path::Path;

use cfgsync_content::merge_list_entries;
use cfgsync_fs::io::{read_text, write_atomic};

use crate::error::{Error, Result};

/// Edits list keys of manifest files without disturbing the rest of the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestWriter;

impl ManifestWriter {
    pub fn new() -> Self {
        Self
    }

    /// Ensure `entries` are present in the top-level list `key` of the file
    /// at `path`.
    ///
    /// Returns the entries that were added, sorted. The file is only
    /// rewritten when something was added.
    pub fn add_to_list<S: AsRef<str>>(
        &self,
        path: &Path,
        key: &str,
        entries: &[S],
    ) -> Result<Vec<String>> {
        if !path.is_file() {
            return Err(Error::ManifestNotFound(path.to_path_buf()));
        }

        let content = read_text(path)?;
        let merge = merge_list_entries(&content, key, entries)?;
        if !merge.changed() {
            return Ok(Vec::new());
        }

        write_atomic(path, merge.content.as_bytes())?;
        tracing::info!(
            path = %path.display(),
            key,
            added = ?merge.added,
            "Updated manifest list"
        );
        Ok(merge.added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_add_to_list_rewrites_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blog.info.yml");
        std::fs::write(&path, "name: Blog\n# deps\ndependencies:\n  - node\ntype: module\n").unwrap();

        let added = ManifestWriter::new()
            .add_to_list(&path, "dependencies", &["block", "node"])
            .unwrap();

        assert_eq!(added, vec!["block"]);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "name: Blog\n# deps\ndependencies:\n  - block\n  - node\ntype: module\n"
        );
    }

    #[test]
    fn test_nothing_new_leaves_file_alone() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("blog.info.yml");
        std::fs::write(&path, "dependencies:\r\n  - node\r\n").unwrap();

        let added = ManifestWriter::new()
            .add_to_list(&path, "dependencies", &["node"])
            .unwrap();

        assert!(added.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "dependencies:\r\n  - node\r\n");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = ManifestWriter::new()
            .add_to_list(&temp.path().join("none.info.yml"), "dependencies", &["node"])
            .unwrap_err();
        assert!(matches!(err, Error::ManifestNotFound(_)));
    }
}
