//! Core DocStore implementation

use eyre::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// A shared document with a stable storage key.
///
/// One concern, one document, one file. The default value is the empty
/// document that a missing or malformed file degrades to.
pub trait Document: Default + Serialize + DeserializeOwned {
    /// Stable storage key; the document lives at `<root>/<KEY>.json`.
    const KEY: &'static str;
}

/// Why a raw load failed, before collapsing to the default document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Whole-document JSON storage with read/replace semantics.
///
/// Every operation is a full load-mutate-save cycle performed by the caller.
/// There is no lock shared between processes; two concurrent writers race
/// and the last save wins at whole-document granularity.
#[derive(Debug, Clone)]
pub struct DocStore {
    root: PathBuf,
}

impl DocStore {
    /// Open or create a document store rooted at the given directory
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).context("Failed to create store directory")?;
        debug!(?root, "Opened document store");
        Ok(Self { root })
    }

    /// Root directory holding the documents
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing the given key
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key))
    }

    /// Whether the document has ever been written
    pub fn exists<D: Document>(&self) -> bool {
        self.path_for(D::KEY).exists()
    }

    /// Load a document, failing open.
    ///
    /// A missing file yields the default document; a malformed file is
    /// logged and also yields the default. Only genuine I/O failures
    /// (permissions, disk) surface as errors.
    pub fn load<D: Document>(&self) -> Result<D> {
        match self.try_load::<D>() {
            Ok(doc) => Ok(doc),
            Err(LoadError::Io(e)) if e.kind() == ErrorKind::NotFound => {
                debug!(key = D::KEY, "Document absent, using default");
                Ok(D::default())
            }
            Err(LoadError::Parse(e)) => {
                warn!(key = D::KEY, error = %e, "Malformed document, collapsing to default");
                Ok(D::default())
            }
            Err(LoadError::Io(e)) => Err(e).context(format!("Failed to read document '{}'", D::KEY)),
        }
    }

    /// Load without the fail-open collapse (callers that need to distinguish)
    pub fn try_load<D: Document>(&self) -> Result<D, LoadError> {
        let content = fs::read_to_string(self.path_for(D::KEY))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Replace the entire document.
    ///
    /// Serialized as pretty JSON (outside consumers read these files
    /// directly) and written via a temp file + rename so a concurrent
    /// reader never observes a torn document.
    pub fn save<D: Document>(&self, doc: &D) -> Result<()> {
        let path = self.path_for(D::KEY);
        let tmp = self.root.join(format!(".{}.{}.tmp", D::KEY, std::process::id()));

        let content = serde_json::to_string_pretty(doc).context("Failed to serialize document")?;
        fs::write(&tmp, content).context(format!("Failed to write document '{}'", D::KEY))?;
        fs::rename(&tmp, &path).context(format!("Failed to replace document '{}'", D::KEY))?;

        debug!(key = D::KEY, "Saved document");
        Ok(())
    }

    /// Write the default document if the file is absent.
    ///
    /// Returns whether a new file was created.
    pub fn init<D: Document>(&self) -> Result<bool> {
        if self.exists::<D>() {
            return Ok(false);
        }
        self.save(&D::default())?;
        debug!(key = D::KEY, "Initialized document");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Ledger {
        entries: Vec<String>,
    }

    impl Document for Ledger {
        const KEY: &'static str = "ledger";
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp = tempdir().unwrap();
        let store = DocStore::open(temp.path()).unwrap();

        let doc = Ledger {
            entries: vec!["one".into(), "two".into()],
        };
        store.save(&doc).unwrap();

        let loaded: Ledger = store.load().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_load_missing_yields_default() {
        let temp = tempdir().unwrap();
        let store = DocStore::open(temp.path()).unwrap();

        let loaded: Ledger = store.load().unwrap();
        assert_eq!(loaded, Ledger::default());
    }

    #[test]
    fn test_load_malformed_yields_default() {
        let temp = tempdir().unwrap();
        let store = DocStore::open(temp.path()).unwrap();

        fs::write(store.path_for(Ledger::KEY), "{not json at all").unwrap();

        let loaded: Ledger = store.load().unwrap();
        assert_eq!(loaded, Ledger::default());
    }

    #[test]
    fn test_try_load_surfaces_parse_error() {
        let temp = tempdir().unwrap();
        let store = DocStore::open(temp.path()).unwrap();

        fs::write(store.path_for(Ledger::KEY), "[1, 2").unwrap();

        let result = store.try_load::<Ledger>();
        assert!(matches!(result, Err(LoadError::Parse(_))));
    }

    #[test]
    fn test_init_only_when_absent() {
        let temp = tempdir().unwrap();
        let store = DocStore::open(temp.path()).unwrap();

        assert!(store.init::<Ledger>().unwrap());
        assert!(store.exists::<Ledger>());

        // Second init must not clobber existing content
        let doc = Ledger {
            entries: vec!["kept".into()],
        };
        store.save(&doc).unwrap();
        assert!(!store.init::<Ledger>().unwrap());

        let loaded: Ledger = store.load().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_save_replaces_whole_document() {
        let temp = tempdir().unwrap();
        let store = DocStore::open(temp.path()).unwrap();

        store
            .save(&Ledger {
                entries: vec!["a".into(), "b".into()],
            })
            .unwrap();
        store
            .save(&Ledger {
                entries: vec!["c".into()],
            })
            .unwrap();

        let loaded: Ledger = store.load().unwrap();
        assert_eq!(loaded.entries, vec!["c".to_string()]);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp = tempdir().unwrap();
        let store = DocStore::open(temp.path()).unwrap();

        store.save(&Ledger::default()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "tmp").unwrap_or(false))
            .collect();
        assert!(leftovers.is_empty());
    }
}
