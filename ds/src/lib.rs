//! DocStore - shared JSON document storage
//!
//! A small set of whole-document JSON files is the only communication medium
//! between independently-running worker processes. This crate provides the
//! storage substrate: each concern (registry, message log, task log, ...)
//! lives in exactly one document, read and replaced as a unit.
//!
//! # Contract
//!
//! - `load` returns the default (empty) document when the file is missing or
//!   malformed; corruption is logged, never surfaced to callers.
//! - `save` replaces the entire document. No partial updates, no locking,
//!   no transactions. Concurrent writers race and the last save wins.
//!
//! Protocols built on top must tolerate losing a race: a lost write degrades
//! to "try again", never to corruption, because readers always see either
//! the old or the new document in full.
//!
//! # Example
//!
//! ```ignore
//! use docstore::{DocStore, Document};
//!
//! #[derive(Default, serde::Serialize, serde::Deserialize)]
//! struct Ledger { entries: Vec<String> }
//!
//! impl Document for Ledger {
//!     const KEY: &'static str = "ledger";
//! }
//!
//! let store = DocStore::open(".swarmd")?;
//! let mut ledger: Ledger = store.load()?;
//! ledger.entries.push("hello".into());
//! store.save(&ledger)?;
//! ```

mod store;

pub use store::{DocStore, Document, LoadError};
