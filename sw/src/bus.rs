//! Message bus - append-only, retention-bounded shared message log
//!
//! Delivery is pull-based: every instance polls with its own "last seen"
//! watermark. There is no subscription concept and no push path; the bus is
//! just one shared document with a bounded tail of messages.

use chrono::{DateTime, Utc};
use docstore::{DocStore, Document};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Address that delivers to every instance
pub const BROADCAST: &str = "broadcast";

/// Known metadata keys plus an open extension map.
///
/// The well-known keys are the ones coordination itself writes
/// (`task_id`, `result` on task lifecycle messages); anything else callers
/// attach rides along in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MessageMetadata {
    /// Metadata carrying just a task id
    pub fn for_task(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Default::default()
        }
    }
}

/// A message between instances. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    /// `"broadcast"` or a specific instance id
    pub to: String,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    /// Whether this message is deliverable to the given instance
    pub fn addressed_to(&self, instance_id: &str) -> bool {
        self.to == BROADCAST || self.to == instance_id
    }
}

/// The shared message log document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageLog {
    pub messages: Vec<Message>,
}

impl Document for MessageLog {
    const KEY: &'static str = "shared_messages";
}

/// Shared message bus
#[derive(Debug, Clone)]
pub struct MessageBus {
    store: DocStore,
    retention: usize,
}

impl MessageBus {
    pub fn new(store: DocStore, retention: usize) -> Self {
        Self { store, retention }
    }

    /// Append a message, evicting the oldest entries beyond the retention cap
    pub fn post(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        msg_type: impl Into<String>,
        content: impl Into<String>,
        metadata: MessageMetadata,
    ) -> Result<Message> {
        let message = Message {
            from: from.into(),
            to: to.into(),
            msg_type: msg_type.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        };

        let mut doc: MessageLog = self.store.load()?;
        doc.messages.push(message.clone());

        if doc.messages.len() > self.retention {
            let excess = doc.messages.len() - self.retention;
            doc.messages.drain(..excess);
            debug!(evicted = excess, "Evicted oldest messages past retention cap");
        }

        self.store.save(&doc)?;
        debug!(from = %message.from, to = %message.to, msg_type = %message.msg_type, "Posted message");
        Ok(message)
    }

    /// Messages deliverable to an instance, in append order.
    ///
    /// The `since` cursor is exclusive: a message whose timestamp equals the
    /// cursor is not re-delivered.
    pub fn query(&self, for_instance: &str, since: Option<DateTime<Utc>>) -> Result<Vec<Message>> {
        let doc: MessageLog = self.store.load()?;

        Ok(doc
            .messages
            .into_iter()
            .filter(|m| m.addressed_to(for_instance))
            .filter(|m| since.is_none_or(|cursor| m.timestamp > cursor))
            .collect())
    }

    /// The last `count` messages, optionally filtered by sender
    pub fn recent(&self, count: usize, from_filter: Option<&str>) -> Result<Vec<Message>> {
        let doc: MessageLog = self.store.load()?;

        let mut messages = doc.messages;
        if let Some(sender) = from_filter {
            messages.retain(|m| m.from == sender);
        }

        let start = messages.len().saturating_sub(count);
        Ok(messages.split_off(start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn bus(dir: &std::path::Path, retention: usize) -> MessageBus {
        MessageBus::new(DocStore::open(dir).unwrap(), retention)
    }

    #[test]
    fn test_post_and_query_broadcast() {
        let temp = tempdir().unwrap();
        let bus = bus(temp.path(), 1000);

        bus.post("i1", BROADCAST, "info", "hello", MessageMetadata::default())
            .unwrap();

        let got = bus.query("i2", None).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].content, "hello");
        assert_eq!(got[0].from, "i1");
    }

    #[test]
    fn test_query_filters_targeted_messages() {
        let temp = tempdir().unwrap();
        let bus = bus(temp.path(), 1000);

        bus.post("i1", "i2", "info", "for i2", MessageMetadata::default()).unwrap();
        bus.post("i1", "i3", "info", "for i3", MessageMetadata::default()).unwrap();
        bus.post("i1", BROADCAST, "info", "for all", MessageMetadata::default())
            .unwrap();

        let got = bus.query("i2", None).unwrap();
        let contents: Vec<_> = got.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["for i2", "for all"]);
    }

    #[test]
    fn test_since_cursor_is_exclusive() {
        let temp = tempdir().unwrap();
        let bus = bus(temp.path(), 1000);

        let first = bus
            .post("i1", BROADCAST, "info", "first", MessageMetadata::default())
            .unwrap();
        let second = bus
            .post("i1", BROADCAST, "info", "second", MessageMetadata::default())
            .unwrap();

        // Cursor at the first message's timestamp must not re-deliver it
        let got = bus.query("i2", Some(first.timestamp)).unwrap();
        let contents: Vec<_> = got.iter().map(|m| m.content.as_str()).collect();
        assert!(!contents.contains(&"first"));
        assert!(contents.contains(&"second"));

        // Cursor at the newest timestamp yields nothing
        let got = bus.query("i2", Some(second.timestamp)).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn test_retention_evicts_oldest_first() {
        let temp = tempdir().unwrap();
        let bus = bus(temp.path(), 3);

        for i in 0..5 {
            bus.post("i1", BROADCAST, "info", format!("msg-{}", i), MessageMetadata::default())
                .unwrap();
        }

        let got = bus.query("i2", None).unwrap();
        let contents: Vec<_> = got.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg-2", "msg-3", "msg-4"]);
    }

    #[test]
    fn test_recent_with_sender_filter() {
        let temp = tempdir().unwrap();
        let bus = bus(temp.path(), 1000);

        bus.post("i1", BROADCAST, "info", "a", MessageMetadata::default()).unwrap();
        bus.post("i2", BROADCAST, "info", "b", MessageMetadata::default()).unwrap();
        bus.post("i1", BROADCAST, "info", "c", MessageMetadata::default()).unwrap();

        let got = bus.recent(10, Some("i1")).unwrap();
        let contents: Vec<_> = got.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "c"]);

        let got = bus.recent(2, None).unwrap();
        let contents: Vec<_> = got.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["b", "c"]);
    }

    #[test]
    fn test_metadata_roundtrips_known_and_extra_keys() {
        let temp = tempdir().unwrap();
        let bus = bus(temp.path(), 1000);

        let mut metadata = MessageMetadata::for_task("T1");
        metadata
            .extra
            .insert("severity".to_string(), serde_json::json!("high"));

        bus.post("i1", BROADCAST, "task_claim", "claimed", metadata).unwrap();

        let got = bus.query("i2", None).unwrap();
        assert_eq!(got[0].metadata.task_id.as_deref(), Some("T1"));
        assert_eq!(got[0].metadata.extra["severity"], "high");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        // However many messages arrive, the log never exceeds the cap and
        // retains exactly the most recent ones in append order.
        #[test]
        fn prop_retention_cap_holds(total in 0usize..40, cap in 1usize..10) {
            let temp = tempdir().unwrap();
            let bus = bus(temp.path(), cap);

            for i in 0..total {
                bus.post("i1", BROADCAST, "info", format!("m{}", i), MessageMetadata::default())
                    .unwrap();
            }

            let got = bus.query("anyone", None).unwrap();
            prop_assert!(got.len() <= cap);
            prop_assert_eq!(got.len(), total.min(cap));

            let expected: Vec<String> = (total.saturating_sub(cap)..total).map(|i| format!("m{}", i)).collect();
            let contents: Vec<String> = got.iter().map(|m| m.content.clone()).collect();
            prop_assert_eq!(contents, expected);
        }
    }
}
