//! Runs the time triggered server tasks configured in the panel.

mod queue;

pub use queue::ScheduleQueue;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use gameap_core::{ERROR_RESULT, RepositoryError, ServerTask, ServerTaskRepository};
use gameap_server_manager::{CommandKind, ServerCommandFactory};

use crate::cli::shutdown::ShutdownController;

pub const DEFAULT_TICK: Duration = Duration::from_secs(5);
const UPDATE_INTERVAL: Duration = Duration::from_secs(5);

pub struct Scheduler {
    repository: Arc<dyn ServerTaskRepository>,
    factory: Arc<ServerCommandFactory>,
    queue: ScheduleQueue,
    last_updated: Mutex<Option<Instant>>,
    tick: Duration,
}

impl Scheduler {
    pub fn new(
        repository: Arc<dyn ServerTaskRepository>,
        factory: Arc<ServerCommandFactory>,
    ) -> Self {
        Self {
            repository,
            factory,
            queue: ScheduleQueue::new(),
            last_updated: Mutex::new(None),
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub async fn run(self: Arc<Self>, shutdown: Arc<ShutdownController>) -> anyhow::Result<()> {
        let mut shutdown_rx = shutdown.subscribe().await;

        self.update_tasks().await;

        loop {
            self.run_next().await;
            self.update_tasks().await;

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(log_type = "scheduler", "Scheduler stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.tick) => {}
            }
        }
    }

    async fn update_tasks(&self) {
        {
            let last_updated = self.last_updated.lock();
            if last_updated.is_some_and(|at| at.elapsed() <= UPDATE_INTERVAL) {
                return;
            }
        }

        if let Err(e) = self.refresh().await {
            warn!(
                log_type = "scheduler",
                "Failed to update server tasks: {}", e
            );
        }
    }

    async fn refresh(&self) -> Result<(), RepositoryError> {
        let tasks = self.repository.find().await?;

        for task in tasks.into_iter().filter(ServerTask::can_execute) {
            self.queue.replace(task);
        }

        *self.last_updated.lock() = Some(Instant::now());
        Ok(())
    }

    async fn run_next(&self) {
        let Some(mut task) = self.queue.pop() else {
            return;
        };

        if task.execute_date > Utc::now() {
            return;
        }

        self.queue.remove(&task);

        if task.can_execute() {
            self.execute(&task).await;
            self.prolong(&mut task).await;
        }
    }

    async fn execute(&self, task: &ServerTask) {
        info!(
            log_type = "scheduler",
            "Running server task {} ({}) on server {}",
            task.id,
            task.command,
            task.server.id()
        );

        let command = self
            .factory
            .load_server_command(CommandKind::from(task.command));

        let failure = match command.execute(&task.server).await {
            Err(e) => {
                warn!(
                    log_type = "scheduler",
                    "Failed to execute server task {}: {}", task.id, e
                );
                Some(e.to_string().into_bytes())
            }
            Ok(()) if command.result() == ERROR_RESULT => Some(command.read_output()),
            Ok(()) => None,
        };

        if let Some(output) = failure
            && let Err(e) = self.repository.fail(task, &output).await
        {
            warn!(
                log_type = "scheduler",
                "Failed to report server task {} failure: {}", task.id, e
            );
        }
    }

    async fn prolong(&self, task: &mut ServerTask) {
        task.prolong();

        if let Err(e) = self.repository.save(task).await {
            warn!(
                log_type = "scheduler",
                "Failed to prolong server task {}: {}", task.id, e
            );
        }

        self.queue.put(task.clone());
    }
}
