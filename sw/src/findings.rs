//! Shared findings log - append-only discovery feed
//!
//! Structurally a second message bus with a different record shape: entries
//! are appended with a timestamp and the oldest are evicted past the
//! retention cap. The document keeps separate sections for findings,
//! decisions, and learnings; outside consumers read the file directly.

use chrono::{DateTime, Utc};
use docstore::{DocStore, Document};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One shared-memory entry: who recorded what, when
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub instance: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

/// The shared memory document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SharedMemory {
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub decisions: Vec<Finding>,
    #[serde(default)]
    pub learnings: Vec<Finding>,
}

impl Document for SharedMemory {
    const KEY: &'static str = "shared_memory";
}

/// Shared findings log
#[derive(Debug, Clone)]
pub struct FindingsLog {
    store: DocStore,
    retention: usize,
}

impl FindingsLog {
    pub fn new(store: DocStore, retention: usize) -> Self {
        Self { store, retention }
    }

    /// Record a finding, evicting the oldest past the retention cap
    pub fn add(&self, instance: impl Into<String>, content: impl Into<String>) -> Result<()> {
        self.append(instance, content, |doc| &mut doc.findings)
    }

    /// Record a decision (same mechanics, separate section)
    pub fn add_decision(&self, instance: impl Into<String>, content: impl Into<String>) -> Result<()> {
        self.append(instance, content, |doc| &mut doc.decisions)
    }

    /// Record a learning (same mechanics, separate section)
    pub fn add_learning(&self, instance: impl Into<String>, content: impl Into<String>) -> Result<()> {
        self.append(instance, content, |doc| &mut doc.learnings)
    }

    fn append(
        &self,
        instance: impl Into<String>,
        content: impl Into<String>,
        section: impl Fn(&mut SharedMemory) -> &mut Vec<Finding>,
    ) -> Result<()> {
        let mut doc: SharedMemory = self.store.load()?;

        let entries = section(&mut doc);
        entries.push(Finding {
            instance: instance.into(),
            timestamp: Utc::now(),
            content: content.into(),
        });

        if entries.len() > self.retention {
            let excess = entries.len() - self.retention;
            entries.drain(..excess);
            debug!(evicted = excess, "Evicted oldest entries past retention cap");
        }

        self.store.save(&doc)
    }

    /// The most recent `count` findings, oldest first
    pub fn list(&self, count: usize) -> Result<Vec<Finding>> {
        let doc: SharedMemory = self.store.load()?;

        let mut findings = doc.findings;
        let start = findings.len().saturating_sub(count);
        Ok(findings.split_off(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn log(dir: &std::path::Path, retention: usize) -> FindingsLog {
        FindingsLog::new(DocStore::open(dir).unwrap(), retention)
    }

    #[test]
    fn test_add_and_list() {
        let temp = tempdir().unwrap();
        let log = log(temp.path(), 500);

        log.add("i1", "caching pays off").unwrap();
        log.add("i2", "tests are flaky on CI").unwrap();

        let recent = log.list(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].instance, "i1");
        assert_eq!(recent[1].content, "tests are flaky on CI");
    }

    #[test]
    fn test_retention_evicts_oldest() {
        let temp = tempdir().unwrap();
        let log = log(temp.path(), 3);

        for i in 0..5 {
            log.add("i1", format!("finding-{}", i)).unwrap();
        }

        let all = log.list(100).unwrap();
        let contents: Vec<_> = all.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["finding-2", "finding-3", "finding-4"]);
    }

    #[test]
    fn test_list_returns_most_recent() {
        let temp = tempdir().unwrap();
        let log = log(temp.path(), 500);

        for i in 0..4 {
            log.add("i1", format!("f{}", i)).unwrap();
        }

        let recent = log.list(2).unwrap();
        let contents: Vec<_> = recent.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(contents, vec!["f2", "f3"]);
    }

    #[test]
    fn test_sections_are_independent() {
        let temp = tempdir().unwrap();
        let log = log(temp.path(), 500);

        log.add("i1", "a finding").unwrap();
        log.add_decision("i1", "a decision").unwrap();
        log.add_learning("i2", "a learning").unwrap();

        let store = DocStore::open(temp.path()).unwrap();
        let doc: SharedMemory = store.load().unwrap();
        assert_eq!(doc.findings.len(), 1);
        assert_eq!(doc.decisions.len(), 1);
        assert_eq!(doc.learnings.len(), 1);
        assert_eq!(doc.decisions[0].content, "a decision");
    }

    #[test]
    fn test_malformed_memory_reads_as_empty() {
        let temp = tempdir().unwrap();
        let store = DocStore::open(temp.path()).unwrap();
        std::fs::write(store.path_for(SharedMemory::KEY), "not json").unwrap();

        let log = FindingsLog::new(store, 500);
        assert!(log.list(10).unwrap().is_empty());

        // And the next write recovers the document
        log.add("i1", "fresh start").unwrap();
        assert_eq!(log.list(10).unwrap().len(), 1);
    }
}
