//! swarmd - coordination layer for swarms of autonomous worker instances
//!
//! Several independently-running worker processes ("instances") share
//! information, avoid duplicate work, and exchange question/answer rounds
//! using nothing but a handful of shared JSON documents. No network service,
//! no database, no cross-process locks: every shared structure is one
//! whole-document file, read and replaced as a unit, and every protocol is
//! written so that losing a write race degrades to "try again" rather than
//! corrupting state.
//!
//! # Core Concepts
//!
//! - **Pull, never push**: instances poll the shared documents with their
//!   own watermarks; there is no subscription machinery.
//! - **First claim wins**: a task id has exactly one active owner, and only
//!   the owner can update or complete it.
//! - **Opt-in rendezvous**: ask/respond lets an instance block for an answer
//!   with a bounded timeout, without forcing anyone to participate.
//! - **Fail-open storage**: a missing or corrupted shared document reads as
//!   empty, so no instance is ever wedged by a bad file.
//!
//! # Modules
//!
//! - [`registry`] - identity, role, and liveness of running instances
//! - [`bus`] - retention-bounded broadcast/targeted message log
//! - [`tasks`] - single-owner task claiming with progress updates
//! - [`questions`] - ask/respond with optional blocking wait
//! - [`findings`] - append-only shared discovery feed
//! - [`stop`] - global stop marker
//! - [`orchestrator`] - instance process spawning and supervision
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod bus;
pub mod cli;
pub mod config;
pub mod findings;
pub mod orchestrator;
pub mod questions;
pub mod registry;
pub mod stop;
pub mod tasks;

// Re-export commonly used types
pub use bus::{BROADCAST, Message, MessageBus, MessageLog, MessageMetadata};
pub use config::{Config, CoordinationConfig, OrchestratorConfig, StorageConfig};
pub use findings::{Finding, FindingsLog, SharedMemory};
pub use orchestrator::{ENV_INSTANCE_COUNT, ENV_INSTANCE_ID, ENV_INSTANCE_ROLE, Orchestrator};
pub use questions::{AskOutcome, Question, QuestionBoard, QuestionLog, QuestionResponse, QuestionStatus};
pub use registry::{InstanceInfo, InstanceRegistry, InstanceStatus, RegistryDoc};
pub use stop::{STOP_MARKER, StopSignal};
pub use tasks::{Task, TaskBoard, TaskLog, TaskStatus, TaskUpdate};
