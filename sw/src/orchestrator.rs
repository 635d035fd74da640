//! Orchestrator - spawns and supervises a swarm of instance processes
//!
//! Each instance runs as an independent OS process launched from the
//! configured instance command, with its identity, role, and the swarm size
//! passed through the environment. The orchestrator initializes the shared
//! documents, registers each instance after spawn, and supervises the
//! processes until they exit or the operator interrupts. Supervision tasks
//! only relay output and exit codes; they never mutate shared coordination
//! state beyond the initial registration.

use std::process::Stdio;
use std::time::Duration;

use eyre::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use docstore::DocStore;

use crate::bus::MessageLog;
use crate::config::Config;
use crate::findings::SharedMemory;
use crate::questions::QuestionLog;
use crate::registry::{InstanceInfo, InstanceRegistry, InstanceStatus, RegistryDoc};
use crate::stop::StopSignal;
use crate::tasks::TaskLog;

/// Environment variable carrying the instance id into a spawned process
pub const ENV_INSTANCE_ID: &str = "SWARMD_INSTANCE_ID";
/// Environment variable carrying the instance role
pub const ENV_INSTANCE_ROLE: &str = "SWARMD_INSTANCE_ROLE";
/// Environment variable carrying the total swarm size
pub const ENV_INSTANCE_COUNT: &str = "SWARMD_INSTANCE_COUNT";

/// Process supervisor for a swarm of instances
pub struct Orchestrator {
    config: Config,
    store: DocStore,
    registry: InstanceRegistry,
    stop: StopSignal,
}

impl Orchestrator {
    pub fn new(config: &Config) -> Result<Self> {
        let store = DocStore::open(&config.storage.data_dir)?;
        let registry = InstanceRegistry::new(store.clone());
        let stop = StopSignal::new(&config.storage.data_dir);

        Ok(Self {
            config: config.clone(),
            store,
            registry,
            stop,
        })
    }

    /// Check the requested swarm size against the configured bounds.
    ///
    /// Called before any shared state is touched; an out-of-range count is
    /// the one hard failure in this layer.
    pub fn validate_count(&self, instances: usize) -> Result<()> {
        let bounds = &self.config.orchestrator;
        if instances < bounds.min_instances || instances > bounds.max_instances {
            return Err(eyre::eyre!(
                "Instance count must be between {} and {} (got {})",
                bounds.min_instances,
                bounds.max_instances,
                instances
            ));
        }
        Ok(())
    }

    /// Initialize every shared document to its empty default if absent, and
    /// clear a stop marker left over from a previous run.
    pub fn init_stores(&self) -> Result<()> {
        debug!(root = %self.store.root().display(), "Initializing shared documents");
        self.store.init::<RegistryDoc>()?;
        self.store.init::<MessageLog>()?;
        self.store.init::<TaskLog>()?;
        self.store.init::<QuestionLog>()?;
        self.store.init::<SharedMemory>()?;

        if self.stop.clear()? {
            info!("Cleared stale stop marker from a previous run");
        }
        Ok(())
    }

    /// Role for the instance at the given index, cycling the configured list
    fn role_for(&self, index: usize) -> &str {
        let roles = &self.config.orchestrator.roles;
        &roles[index % roles.len()]
    }

    /// Spawn one instance process with its identity in the environment
    fn spawn_instance(&self, instance_id: &str, role: &str, total: usize) -> Result<Child> {
        let command = &self.config.orchestrator.instance_command;
        let (program, args) = command
            .split_first()
            .ok_or_else(|| eyre::eyre!("instance-command is empty"))?;

        debug!(%instance_id, %role, %program, "Spawning instance process");
        Command::new(program)
            .args(args)
            .env(ENV_INSTANCE_ID, instance_id)
            .env(ENV_INSTANCE_ROLE, role)
            .env(ENV_INSTANCE_COUNT, total.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context(format!("Failed to spawn instance {}", instance_id))
    }

    /// Spawn and supervise `instances` processes until they all exit or the
    /// operator interrupts.
    pub async fn run(&self, instances: usize) -> Result<()> {
        self.validate_count(instances)?;
        self.init_stores()?;

        info!(instances, "Starting swarm");

        let mut supervisors = JoinSet::new();
        let stagger = Duration::from_millis(self.config.orchestrator.spawn_stagger_ms);

        for index in 0..instances {
            let instance_id = format!("instance_{}", index + 1);
            let role = self.role_for(index).to_string();

            let child = self.spawn_instance(&instance_id, &role, instances)?;
            let pid = child.id().unwrap_or(0);

            let mut entry = InstanceInfo::new(&instance_id, &role, pid);
            entry.status = InstanceStatus::Running;
            self.registry.register(entry)?;

            info!(%instance_id, %role, pid, "Instance started");
            supervisors.spawn(supervise(instance_id, child));

            // Stagger startups so fresh instances don't stampede the store
            if index + 1 < instances {
                tokio::time::sleep(stagger).await;
            }
        }

        info!("All instances started. Press Ctrl+C to stop.");

        let interrupted = tokio::select! {
            _ = drain(&mut supervisors) => false,
            _ = tokio::signal::ctrl_c() => true,
        };

        if interrupted {
            info!("Interrupt received, shutting down swarm");
            supervisors.abort_all();

            // The marker's existence is the signal; instances observe it
            // between iterations and wind down on their own.
            self.stop.request()?;

            let grace = Duration::from_millis(self.config.orchestrator.grace_period_ms);
            tokio::time::sleep(grace).await;
        } else {
            info!("All instances exited");
        }

        Ok(())
    }
}

/// Await every supervisor in the set
async fn drain(supervisors: &mut JoinSet<()>) {
    while supervisors.join_next().await.is_some() {}
}

/// Relay one instance's output and log its exit code
async fn supervise(instance_id: String, mut child: Child) {
    if let Some(stdout) = child.stdout.take() {
        let id = instance_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(instance = %id, "{}", line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        let id = instance_id.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(instance = %id, "{}", line);
            }
        });
    }

    match child.wait().await {
        Ok(status) => {
            info!(instance = %instance_id, code = ?status.code(), "Instance exited");
        }
        Err(e) => {
            warn!(instance = %instance_id, error = %e, "Failed to wait on instance");
        }
    }
}
