//! On-disk layout of one case.
//!
//! ```text
//! {root}/{case}/
//!     {case}_case_details.csv
//!     run_report.json
//!     documents/
//!     history/
//! ```

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Directory name used when a record carries no identifier.
pub const UNKNOWN_CASE: &str = "unknown_cnr";

/// Directory-safe form of a case identifier.
///
/// Characters other than ASCII letters, digits, `-` and `_` become `_`.
pub fn case_dir_name(identifier: &str) -> String {
    let name: String = identifier
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.trim_matches('_').is_empty() {
        UNKNOWN_CASE.to_string()
    } else {
        name
    }
}

/// Paths for one case under an output root.
#[derive(Debug, Clone)]
pub struct CaseStorage {
    name: String,
    dir: PathBuf,
}

impl CaseStorage {
    pub fn new(root: &Path, identifier: &str) -> Self {
        let name = case_dir_name(identifier);
        Self {
            dir: root.join(&name),
            name,
        }
    }

    /// Create the case, documents and history directories.
    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(self.documents_dir())?;
        std::fs::create_dir_all(self.history_dir())?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.dir.join("documents")
    }

    pub fn history_dir(&self) -> PathBuf {
        self.dir.join("history")
    }

    pub fn csv_path(&self) -> PathBuf {
        self.dir.join(format!("{}_case_details.csv", self.name))
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join("run_report.json")
    }

    /// Path of a business-history note for `date`.
    pub fn history_path(&self, date: &str) -> PathBuf {
        let date = date.trim().replace(['/', '\\', ' '], "-");
        self.history_dir().join(format!("business_details_{date}.txt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_dir_name() {
        assert_eq!(case_dir_name("MHAU010012342023"), "MHAU010012342023");
        assert_eq!(case_dir_name("Diary No. 1234/2024"), "Diary_No__1234_2024");
        assert_eq!(case_dir_name(""), UNKNOWN_CASE);
        assert_eq!(case_dir_name(" /.. "), UNKNOWN_CASE);
    }

    #[test]
    fn test_layout() {
        let root = tempfile::tempdir().unwrap();
        let storage = CaseStorage::new(root.path(), "DLHC01-000123-2022");
        storage.create().unwrap();
        assert!(storage.documents_dir().is_dir());
        assert!(storage.history_dir().is_dir());
        assert_eq!(
            storage.csv_path(),
            root.path()
                .join("DLHC01-000123-2022")
                .join("DLHC01-000123-2022_case_details.csv")
        );
        assert_eq!(
            storage.history_path("12/01/2024"),
            storage.history_dir().join("business_details_12-01-2024.txt")
        );
    }
}
