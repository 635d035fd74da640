//! Ask/respond - optional synchronous rendezvous between instances
//!
//! An instance may post a question and block waiting for a response, or post
//! and move on. There is no push path: the asker polls the shared question
//! document once per second until a response appears or the caller's timeout
//! elapses. Coordination stays opt-in; nothing forces an instance to answer.
//!
//! Status moves `open -> answered` only when a blocking asker observes a
//! response. A question answered while nobody is waiting stays open forever;
//! a timed-out wait likewise leaves the question open. There is no expired
//! state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use docstore::{DocStore, Document};
use eyre::Result;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::bus::BROADCAST;

/// Question lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Open,
    Answered,
}

impl std::fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Answered => write!(f, "answered"),
        }
    }
}

/// One response to a question. Responses are only ever appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub from: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// A question posted by one instance to another (or to everyone)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub from: String,
    /// `"broadcast"` or a specific instance id
    pub to: String,
    pub question: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub responses: Vec<QuestionResponse>,
    pub status: QuestionStatus,
}

/// The shared question document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionLog {
    pub questions: Vec<Question>,
}

impl Document for QuestionLog {
    const KEY: &'static str = "instance_questions";
}

/// Outcome of an `ask` call
#[derive(Debug, Clone, PartialEq)]
pub enum AskOutcome {
    /// Posted without waiting (timeout of zero)
    Posted,
    /// At least one response arrived within the window
    Answered(Vec<QuestionResponse>),
    /// The window elapsed with no response; the question stays open
    TimedOut,
}

/// Shared question board
#[derive(Debug, Clone)]
pub struct QuestionBoard {
    store: DocStore,
    poll_interval: Duration,
}

impl QuestionBoard {
    pub fn new(store: DocStore, poll_interval: Duration) -> Self {
        Self { store, poll_interval }
    }

    /// Post a question and optionally wait for a response.
    ///
    /// With `timeout_secs == 0` the question is posted fire-and-forget and
    /// the call returns immediately without inspecting responses. Otherwise
    /// the board re-reads the full document on every poll tick until a
    /// response appears (the question is then marked answered and the
    /// responses returned) or the timeout elapses. Timeout resolution is one
    /// poll tick.
    pub async fn ask(
        &self,
        question_id: impl Into<String>,
        question: impl Into<String>,
        to: impl Into<String>,
        from: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<AskOutcome> {
        let question_id = question_id.into();
        let to = to.into();

        let mut doc: QuestionLog = self.store.load()?;
        doc.questions.push(Question {
            question_id: question_id.clone(),
            from: from.into(),
            to: to.clone(),
            question: question.into(),
            timestamp: Utc::now(),
            responses: Vec::new(),
            status: QuestionStatus::Open,
        });
        self.store.save(&doc)?;
        info!(%question_id, %to, "Posted question");

        if timeout_secs == 0 {
            debug!(%question_id, "Not waiting for response");
            return Ok(AskOutcome::Posted);
        }

        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // First tick completes immediately, so a response that was appended
        // between post and wait is picked up without a full tick of latency.
        loop {
            ticker.tick().await;

            let mut doc: QuestionLog = self.store.load()?;
            if let Some(q) = doc.questions.iter_mut().find(|q| q.question_id == question_id)
                && !q.responses.is_empty()
            {
                q.status = QuestionStatus::Answered;
                let responses = q.responses.clone();
                self.store.save(&doc)?;
                info!(%question_id, count = responses.len(), "Question answered");
                return Ok(AskOutcome::Answered(responses));
            }

            if Instant::now() >= deadline {
                info!(%question_id, timeout_secs, "Question timed out, leaving it open");
                return Ok(AskOutcome::TimedOut);
            }
        }
    }

    /// Append a response to an existing question.
    ///
    /// Returns false when no question with the id exists; nothing is
    /// created in that case. Responding to an already-answered question is
    /// allowed (late answers still land).
    pub fn respond(
        &self,
        question_id: &str,
        responder: impl Into<String>,
        response: impl Into<String>,
    ) -> Result<bool> {
        let mut doc: QuestionLog = self.store.load()?;

        match doc.questions.iter_mut().find(|q| q.question_id == question_id) {
            Some(q) => {
                q.responses.push(QuestionResponse {
                    from: responder.into(),
                    response: response.into(),
                    timestamp: Utc::now(),
                });
                self.store.save(&doc)?;
                debug!(%question_id, "Response appended");
                Ok(true)
            }
            None => {
                debug!(%question_id, "Response rejected, question not found");
                Ok(false)
            }
        }
    }

    /// Open questions directed at this instance (broadcast or targeted),
    /// excluding the instance's own pending questions.
    pub fn check_open(&self, instance_id: &str) -> Result<Vec<Question>> {
        let doc: QuestionLog = self.store.load()?;

        Ok(doc
            .questions
            .into_iter()
            .filter(|q| {
                q.status == QuestionStatus::Open
                    && (q.to == BROADCAST || q.to == instance_id)
                    && q.from != instance_id
            })
            .collect())
    }

    /// Every question ever posted, regardless of status or addressing
    pub fn list_all(&self) -> Result<Vec<Question>> {
        let doc: QuestionLog = self.store.load()?;
        Ok(doc.questions)
    }
}
