//! swarmd - swarm coordination CLI
//!
//! Entry point for the `sw` binary. Every subcommand is a thin shim over one
//! coordination operation: it parses arguments, calls the operation, and
//! prints a human-readable confirmation or failure. Not-found and ownership
//! failures are ordinary output, never fatal errors; the only hard failure
//! is an out-of-range instance count handed to `run`.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use docstore::DocStore;
use swarmd::bus::{MessageBus, MessageMetadata};
use swarmd::cli::{Cli, Command};
use swarmd::config::Config;
use swarmd::findings::FindingsLog;
use swarmd::orchestrator::Orchestrator;
use swarmd::questions::{AskOutcome, QuestionBoard};
use swarmd::registry::InstanceRegistry;
use swarmd::stop::StopSignal;
use swarmd::tasks::{TaskBoard, TaskStatus};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("swarmd")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let log_file = fs::File::options()
        .create(true)
        .append(true)
        .open(log_dir.join("swarmd.log"))
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    Ok(())
}

fn open_store(config: &Config) -> Result<DocStore> {
    DocStore::open(&config.storage.data_dir)
}

fn message_bus(config: &Config) -> Result<MessageBus> {
    Ok(MessageBus::new(
        open_store(config)?,
        config.coordination.message_retention,
    ))
}

fn task_board(config: &Config) -> Result<TaskBoard> {
    Ok(TaskBoard::new(open_store(config)?, message_bus(config)?))
}

fn question_board(config: &Config) -> Result<QuestionBoard> {
    Ok(QuestionBoard::new(
        open_store(config)?,
        Duration::from_millis(config.coordination.poll_interval_ms),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let instance_id = cli.instance_id();
    debug!(%instance_id, "main: dispatching command");

    match cli.command {
        Command::Run { instances } => cmd_run(&config, instances).await,
        Command::Message { content, msg_type, to } => cmd_message(&config, &instance_id, &content, &msg_type, &to),
        Command::Messages { count, from, since } => cmd_messages(&config, &instance_id, count, from.as_deref(), since),
        Command::Claim { task_id, description } => cmd_claim(&config, &instance_id, &task_id, &description),
        Command::Update { task_id, content } => cmd_update(&config, &instance_id, &task_id, &content),
        Command::Complete { task_id, result } => cmd_complete(&config, &instance_id, &task_id, result),
        Command::Tasks { status } => cmd_tasks(&config, status),
        Command::Ask {
            question,
            id,
            to,
            timeout,
        } => cmd_ask(&config, &instance_id, &question, id, &to, timeout).await,
        Command::Respond { question_id, response } => cmd_respond(&config, &instance_id, &question_id, &response),
        Command::Questions { all } => cmd_questions(&config, &instance_id, all),
        Command::Finding { content } => cmd_finding(&config, &instance_id, &content),
        Command::Findings { count } => cmd_findings(&config, count),
        Command::Instances => cmd_instances(&config),
        Command::Stop { clear } => cmd_stop(&config, clear),
    }
}

/// Spawn and supervise a swarm
async fn cmd_run(config: &Config, instances: usize) -> Result<()> {
    let orchestrator = Orchestrator::new(config)?;

    // Bounds are checked before any shared state is touched
    orchestrator.validate_count(instances)?;

    println!("{}", "=".repeat(70));
    println!("swarmd orchestrator");
    println!("{}", "=".repeat(70));
    println!("Spawning {} instances...", instances);
    println!();

    orchestrator.run(instances).await?;

    println!("Swarm finished.");
    Ok(())
}

/// Send a message to other instances
fn cmd_message(config: &Config, instance_id: &str, content: &str, msg_type: &str, to: &str) -> Result<()> {
    let bus = message_bus(config)?;
    bus.post(instance_id, to, msg_type, content, MessageMetadata::default())?;

    println!("{} {}", "Message sent:".green(), content);
    Ok(())
}

/// List recent messages
fn cmd_messages(
    config: &Config,
    instance_id: &str,
    count: usize,
    from: Option<&str>,
    since: Option<chrono::DateTime<chrono::Utc>>,
) -> Result<()> {
    let bus = message_bus(config)?;

    let messages = if since.is_some() {
        bus.query(instance_id, since)?
    } else {
        bus.recent(count, from)?
    };

    if messages.is_empty() {
        println!("No messages found");
        return Ok(());
    }

    for msg in messages {
        println!();
        println!(
            "[{}] {}",
            msg.from.cyan(),
            msg.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("  Type: {}", msg.msg_type);
        println!("  {}", msg.content);
    }
    Ok(())
}

/// Claim a task
fn cmd_claim(config: &Config, instance_id: &str, task_id: &str, description: &str) -> Result<()> {
    let board = task_board(config)?;

    if board.claim(task_id, description, instance_id)? {
        println!("{} {}", "Task claimed:".green(), task_id);
    } else {
        println!("{} {}", "Task already claimed:".yellow(), task_id);
    }
    Ok(())
}

/// Add a progress update to a task
fn cmd_update(config: &Config, instance_id: &str, task_id: &str, content: &str) -> Result<()> {
    let board = task_board(config)?;

    if board.update(task_id, instance_id, content)? {
        println!("{} {}", "Task updated:".green(), task_id);
    } else {
        println!(
            "{} {}",
            "Task not found or not owned by this instance:".yellow(),
            task_id
        );
    }
    Ok(())
}

/// Complete a task
fn cmd_complete(config: &Config, instance_id: &str, task_id: &str, result: Option<String>) -> Result<()> {
    let board = task_board(config)?;

    if board.complete(task_id, instance_id, result)? {
        println!("{} {}", "Task completed:".green(), task_id);
    } else {
        println!(
            "{} {}",
            "Task not found or not owned by this instance:".yellow(),
            task_id
        );
    }
    Ok(())
}

/// List tasks
fn cmd_tasks(config: &Config, status: Option<TaskStatus>) -> Result<()> {
    let board = task_board(config)?;
    let tasks = board.list(status)?;

    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(());
    }

    println!();
    println!("Tasks:");
    println!("{}", "-".repeat(70));
    for task in tasks {
        println!();
        println!("[{}] {}", task.task_id.cyan(), task.description);
        println!("  Status: {}", task.status);
        println!("  Claimed by: {}", task.claimed_by);
        if !task.updates.is_empty() {
            println!("  Updates: {}", task.updates.len());
        }
        if let Some(result) = &task.result {
            println!("  Result: {}", result);
        }
    }
    Ok(())
}

/// Ask a question, optionally waiting for a response
async fn cmd_ask(
    config: &Config,
    instance_id: &str,
    question: &str,
    id: Option<String>,
    to: &str,
    timeout: u64,
) -> Result<()> {
    let board = question_board(config)?;
    let question_id = id.unwrap_or_else(|| format!("q-{}", uuid::Uuid::now_v7()));

    println!("Posting question '{}' to {}", question_id, to);
    if timeout > 0 {
        println!("Waiting up to {}s for response...", timeout);
    }

    match board.ask(question_id, question, to, instance_id, timeout).await? {
        AskOutcome::Posted => {
            println!("Not waiting for response (timeout 0)");
        }
        AskOutcome::Answered(responses) => {
            println!();
            println!("{} {} response(s):", "Received".green(), responses.len());
            for resp in responses {
                println!("  [{}]: {}", resp.from.cyan(), resp.response);
            }
        }
        AskOutcome::TimedOut => {
            println!();
            println!("{} no responses within {}s", "Timeout:".yellow(), timeout);
        }
    }
    Ok(())
}

/// Respond to a question
fn cmd_respond(config: &Config, instance_id: &str, question_id: &str, response: &str) -> Result<()> {
    let board = question_board(config)?;

    if board.respond(question_id, instance_id, response)? {
        println!("{} {}", "Response added to question:".green(), question_id);
    } else {
        println!("{} {}", "Question not found:".yellow(), question_id);
    }
    Ok(())
}

/// List questions
fn cmd_questions(config: &Config, instance_id: &str, all: bool) -> Result<()> {
    let board = question_board(config)?;

    if all {
        let questions = board.list_all()?;
        if questions.is_empty() {
            println!("No questions in system");
            return Ok(());
        }

        println!("Total questions: {}", questions.len());
        for q in questions {
            println!();
            println!("ID: {} | Status: {}", q.question_id.cyan(), q.status);
            println!("  {} -> {}: {}", q.from, q.to, q.question);
            if !q.responses.is_empty() {
                println!("  Responses: {}", q.responses.len());
            }
        }
        return Ok(());
    }

    let open = board.check_open(instance_id)?;
    if open.is_empty() {
        println!("No open questions for you");
        return Ok(());
    }

    println!("Found {} open question(s):", open.len());
    for q in open {
        println!();
        println!("ID: {}", q.question_id.cyan());
        println!("From: {}", q.from);
        println!("To: {}", q.to);
        println!("Question: {}", q.question);
        println!("Time: {}", q.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

/// Record a finding
fn cmd_finding(config: &Config, instance_id: &str, content: &str) -> Result<()> {
    let log = FindingsLog::new(open_store(config)?, config.coordination.finding_retention);
    log.add(instance_id, content)?;

    println!("{} {}", "Finding recorded:".green(), content);
    Ok(())
}

/// List recent findings
fn cmd_findings(config: &Config, count: usize) -> Result<()> {
    let log = FindingsLog::new(open_store(config)?, config.coordination.finding_retention);
    let findings = log.list(count)?;

    if findings.is_empty() {
        println!("No findings recorded");
        return Ok(());
    }

    for finding in findings {
        println!();
        println!(
            "[{}] {}",
            finding.instance.cyan(),
            finding.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("  {}", finding.content);
    }
    Ok(())
}

/// List registered instances
fn cmd_instances(config: &Config) -> Result<()> {
    let registry = InstanceRegistry::new(open_store(config)?);
    let instances = registry.list()?;

    if instances.is_empty() {
        println!("No instances registered");
        return Ok(());
    }

    println!("{:<16} {:<12} {:<8} {:<10} HEARTBEAT", "ID", "ROLE", "PID", "STATUS");
    println!("{}", "-".repeat(70));
    for inst in instances {
        let heartbeat = inst
            .last_heartbeat
            .map(|t| t.format("%H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<16} {:<12} {:<8} {:<10} {}",
            inst.instance_id, inst.role, inst.pid, inst.status, heartbeat
        );
    }
    Ok(())
}

/// Set or clear the global stop marker
fn cmd_stop(config: &Config, clear: bool) -> Result<()> {
    let stop = StopSignal::new(&config.storage.data_dir);

    if clear {
        if stop.clear()? {
            println!("{}", "Stop marker cleared".green());
        } else {
            println!("No stop marker set");
        }
        return Ok(());
    }

    stop.request()?;
    info!("Stop marker written");
    println!(
        "{} instances will stop before their next iteration",
        "Stop requested:".green()
    );
    Ok(())
}
