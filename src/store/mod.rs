//! Test case storage
//!
//! Test cases live as `<name>.json` files in a single directory.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::models::TestCase;

/// A requested test case that could not be loaded
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedCase {
    pub name: String,
    pub reason: String,
}

/// Directory backed test case store
#[derive(Clone, Debug)]
pub struct TestCaseStore {
    base_dir: PathBuf,
}

impl TestCaseStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Ensure storage directory exists
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).context("Failed to create tests directory")?;
        Ok(())
    }

    fn case_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(format!("{name}.json"))
    }

    /// Names of all stored test cases, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }

    /// Load a single test case by name
    pub fn load(&self, name: &str) -> Result<TestCase> {
        let path = self.case_path(name);
        if !path.exists() {
            bail!("Test case not found: {name}");
        }

        let file = File::open(&path).context("Failed to open test case file")?;
        let mut test_case: TestCase = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if test_case.name.is_empty() {
            test_case.name = name.to_string();
        }

        debug!("Loaded test case {} from {}", name, path.display());
        Ok(test_case)
    }

    /// Load several test cases, skipping the ones that cannot be read
    ///
    /// Found cases keep the requested order.
    pub fn load_many<S: AsRef<str>>(&self, names: &[S]) -> (Vec<TestCase>, Vec<SkippedCase>) {
        let mut found = Vec::new();
        let mut skipped = Vec::new();

        for name in names {
            let name = name.as_ref();
            match self.load(name) {
                Ok(test_case) => found.push(test_case),
                Err(e) => {
                    warn!("Skipping test case {}: {:#}", name, e);
                    skipped.push(SkippedCase {
                        name: name.to_string(),
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        (found, skipped)
    }

    /// Load every stored test case
    pub fn load_all(&self) -> Result<(Vec<TestCase>, Vec<SkippedCase>)> {
        let names = self.list()?;
        Ok(self.load_many(&names))
    }

    /// Save a test case, replacing any existing file of the same name
    pub fn save(&self, test_case: &TestCase) -> Result<PathBuf> {
        if test_case.name.is_empty() || test_case.name.contains(['/', '\\']) {
            bail!("Invalid test case name: {:?}", test_case.name);
        }

        self.ensure_dir()?;
        let path = self.case_path(&test_case.name);
        let file = File::create(&path).context("Failed to create test case file")?;
        serde_json::to_writer_pretty(BufWriter::new(file), test_case)
            .context("Failed to write test case")?;

        info!("Saved test case to {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn store() -> (TempDir, TestCaseStore) {
        let dir = TempDir::new().unwrap();
        let store = TestCaseStore::new(dir.path().join("tests"));
        (dir, store)
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let (_dir, store) = store();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_save_list_load() {
        let (_dir, store) = store();
        let mut order = TestCase::new("order", "q.orders").with_header("x-zone", "eu");
        order.json_pool.insert("id".into(), json!(7));

        store.save(&order).unwrap();
        store.save(&TestCase::new("audit", "q.audit")).unwrap();
        fs::write(store.base_dir().join("notes.txt"), "ignored").unwrap();

        assert_eq!(store.list().unwrap(), vec!["audit", "order"]);
        assert_eq!(store.load("order").unwrap(), order);
    }

    #[test]
    fn test_load_many_skips_missing_and_invalid() {
        let (_dir, store) = store();
        store.save(&TestCase::new("a", "q.a")).unwrap();
        store.save(&TestCase::new("c", "q.c")).unwrap();
        fs::write(store.base_dir().join("broken.json"), "{not json").unwrap();

        let (found, skipped) = store.load_many(&["c", "missing", "a", "broken"]);
        let names: Vec<_> = found.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a"]);
        assert_eq!(skipped.len(), 2);
        assert_eq!(skipped[0].name, "missing");
        assert!(skipped[0].reason.contains("not found"));
        assert_eq!(skipped[1].name, "broken");
    }

    #[test]
    fn test_load_all() {
        let (_dir, store) = store();
        store.save(&TestCase::new("one", "q.1")).unwrap();
        store.save(&TestCase::new("two", "q.2")).unwrap();

        let (found, skipped) = store.load_all().unwrap();
        assert_eq!(found.len(), 2);
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_save_rejects_path_names() {
        let (_dir, store) = store();
        assert_err!(store.save(&TestCase::new("../escape", "q")));
        assert_err!(store.save(&TestCase::new("", "q")));
        assert_ok!(store.save(&TestCase::new("fine", "q")));
    }
}
