//! CLI command definitions and subcommands
//!
//! Every subcommand is a thin shim over one coordination operation; the
//! heavy lifting lives in the component modules.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::orchestrator::ENV_INSTANCE_ID;
use crate::tasks::TaskStatus;

/// swarmd - multi-instance swarm coordination
#[derive(Parser)]
#[command(
    name = "sw",
    about = "Coordination layer for swarms of autonomous worker instances",
    version = env!("GIT_DESCRIBE")
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Identity used for coordination calls
    #[arg(
        short,
        long,
        global = true,
        help = "Instance id (defaults to $SWARMD_INSTANCE_ID)"
    )]
    pub instance: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Instance identity: flag, then environment, then `"unknown"`
    pub fn instance_id(&self) -> String {
        self.instance
            .clone()
            .or_else(|| std::env::var(ENV_INSTANCE_ID).ok())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Spawn and supervise a swarm of instance processes
    Run {
        /// Number of instances to spawn
        instances: usize,
    },

    /// Send a message to other instances
    Message {
        /// Message content
        content: String,

        /// Message type tag
        #[arg(long = "type", default_value = "info")]
        msg_type: String,

        /// Recipient instance id, or "broadcast"
        #[arg(long, default_value = "broadcast")]
        to: String,
    },

    /// List recent messages
    Messages {
        /// Number of messages to show
        #[arg(long, default_value = "10")]
        count: usize,

        /// Only messages from this sender
        #[arg(long)]
        from: Option<String>,

        /// Poll with an exclusive watermark instead: everything addressed to
        /// this instance newer than the given RFC 3339 timestamp
        #[arg(long)]
        since: Option<chrono::DateTime<chrono::Utc>>,
    },

    /// Claim a task to work on
    Claim {
        /// Task ID
        task_id: String,

        /// Task description
        description: String,
    },

    /// Add a progress update to a claimed task
    Update {
        /// Task ID
        task_id: String,

        /// Update content
        content: String,
    },

    /// Mark a claimed task as completed
    Complete {
        /// Task ID
        task_id: String,

        /// Result description
        #[arg(long)]
        result: Option<String>,
    },

    /// List tasks
    Tasks {
        /// Filter by status (in_progress, completed)
        #[arg(long)]
        status: Option<TaskStatus>,
    },

    /// Ask a question, optionally waiting for a response
    Ask {
        /// Question text
        question: String,

        /// Question id (generated when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Target instance id, or "broadcast"
        #[arg(long, default_value = "broadcast")]
        to: String,

        /// Seconds to wait for a response (0 = post and continue)
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Respond to a question
    Respond {
        /// Question ID
        question_id: String,

        /// Response text
        response: String,
    },

    /// List open questions directed at this instance
    Questions {
        /// Show every question regardless of status or addressing
        #[arg(long)]
        all: bool,
    },

    /// Record a finding in shared memory
    Finding {
        /// Finding content
        content: String,
    },

    /// List recent findings
    Findings {
        /// Number of findings to show
        #[arg(long, default_value = "10")]
        count: usize,
    },

    /// List registered instances
    Instances,

    /// Request the global stop marker (or clear it)
    Stop {
        /// Clear the marker instead of setting it
        #[arg(long)]
        clear: bool,
    },
}
