//! Drains the panel's task queue: starts each waiting task in a worker, then follows
//! it until completion while streaming its output back to the panel.

mod exec;
mod queue;

pub use exec::ExecCommand;
pub use queue::TaskQueue;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, ERROR_RESULT, Executor, GDTask, GDTaskRepository, GDTaskStats, GDTaskStatus,
    RepositoryError, SUCCESS_RESULT, StatsReader,
};
use gameap_server_manager::{CommandKind, ServerCommand, ServerCommandFactory};

use crate::cli::shutdown::ShutdownController;

pub const DEFAULT_TICK: Duration = Duration::from_secs(5);
const UPDATE_INTERVAL: Duration = Duration::from_secs(5);
const RESTART_MESSAGE: &str = "Working task failed. Daemon was restarted.";

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task {0} has no server")]
    MissingServer(u64),

    #[error("task {0} is not running")]
    NotInFlight(u64),
}

/// Handle on a running task.
#[derive(Clone)]
enum InFlight {
    Server(Arc<dyn ServerCommand>),
    Exec(Arc<ExecCommand>),
}

impl InFlight {
    fn is_complete(&self) -> bool {
        match self {
            InFlight::Server(command) => command.is_complete(),
            InFlight::Exec(command) => command.is_complete(),
        }
    }

    fn result(&self) -> CommandResult {
        match self {
            InFlight::Server(command) => command.result(),
            InFlight::Exec(command) => command.result(),
        }
    }

    fn read_output(&self) -> Vec<u8> {
        match self {
            InFlight::Server(command) => command.read_output(),
            InFlight::Exec(command) => command.read_output(),
        }
    }
}

pub struct TaskManager {
    cfg: Arc<DaemonConfig>,
    repository: Arc<dyn GDTaskRepository>,
    factory: Arc<ServerCommandFactory>,
    executor: Arc<dyn Executor>,
    queue: TaskQueue,
    in_flight: DashMap<u64, InFlight>,
    last_updated: Mutex<Option<Instant>>,
    recovered: AtomicBool,
    tick: Duration,
}

impl TaskManager {
    pub fn new(
        cfg: Arc<DaemonConfig>,
        repository: Arc<dyn GDTaskRepository>,
        factory: Arc<ServerCommandFactory>,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            cfg,
            repository,
            factory,
            executor,
            queue: TaskQueue::new(),
            in_flight: DashMap::new(),
            last_updated: Mutex::new(None),
            recovered: AtomicBool::new(false),
            tick: DEFAULT_TICK,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Runs until shutdown. Tasks left `working` by a previous run are failed first.
    pub async fn run(
        self: Arc<Self>,
        shutdown: Arc<ShutdownController>,
    ) -> Result<(), RepositoryError> {
        let mut shutdown_rx = shutdown.subscribe().await;

        if !self.recovered.load(Ordering::Acquire) {
            self.fail_working_tasks().await?;
            self.recovered.store(true, Ordering::Release);
        }

        loop {
            self.run_next().await;
            self.update_tasks().await;

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(log_type = "task_manager", "Task manager stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.tick) => {}
            }
        }
    }

    async fn fail_working_tasks(&self) -> Result<(), RepositoryError> {
        let tasks = self.repository.find_by_status(GDTaskStatus::Working).await?;

        for task in tasks {
            warn!(
                log_type = "task_manager",
                "Task {} was working when the daemon stopped, marking it failed",
                task.id()
            );
            self.append_output(&task, RESTART_MESSAGE.as_bytes()).await;
            task.set_status(GDTaskStatus::Error);
            self.save(&task).await;
        }

        Ok(())
    }

    async fn update_tasks(&self) {
        {
            let last_updated = self.last_updated.lock();
            if last_updated.is_some_and(|at| at.elapsed() < UPDATE_INTERVAL) {
                return;
            }
        }

        match self.repository.find_by_status(GDTaskStatus::Waiting).await {
            Ok(tasks) => {
                if !tasks.is_empty() {
                    debug!(
                        log_type = "task_manager",
                        "Fetched {} waiting tasks",
                        tasks.len()
                    );
                }
                self.queue.insert(tasks);
                *self.last_updated.lock() = Some(Instant::now());
            }
            Err(e) => {
                error!(log_type = "task_manager", "Failed to fetch tasks: {}", e);
            }
        }
    }

    async fn run_next(&self) {
        let Some(task) = self.queue.next() else {
            return;
        };

        if task.run_after_id() > 0
            && let Some(previous) = self.queue.find_by_id(task.run_after_id())
            && !previous.is_complete()
        {
            debug!(
                log_type = "task_manager",
                "Task {} waits for task {}",
                task.id(),
                previous.id()
            );
            return;
        }

        let outcome = if task.is_waiting() {
            self.execute_task(&task).await
        } else if task.is_working() {
            self.proceed_task(&task).await
        } else {
            Ok(())
        };

        if let Err(e) = outcome {
            warn!(log_type = "task_manager", "Task {} failed: {}", task.id(), e);
            self.append_output(&task, format!("{}\n", e).as_bytes()).await;
            task.set_status(GDTaskStatus::Error);
        }

        if task.is_complete() {
            self.queue.remove(&task);
            self.in_flight.remove(&task.id());
            self.save(&task).await;
        }
    }

    async fn execute_task(&self, task: &Arc<GDTask>) -> Result<(), TaskError> {
        info!(
            log_type = "task_manager",
            "Starting task {} ({})",
            task.id(),
            task.kind()
        );

        task.set_status(GDTaskStatus::Working);
        self.save(task).await;

        let handle = match CommandKind::from_task_kind(task.kind()) {
            Some(kind) => {
                let server = task
                    .server()
                    .cloned()
                    .ok_or(TaskError::MissingServer(task.id()))?;
                let command = self.factory.load_server_command(kind);
                self.spawn_server_command(task.clone(), command.clone(), server);
                InFlight::Server(command)
            }
            None => {
                let command = Arc::new(ExecCommand::new(
                    self.cfg.clone(),
                    self.executor.clone(),
                    task.command(),
                ));
                self.spawn_exec_command(task.clone(), command.clone());
                InFlight::Exec(command)
            }
        };

        self.in_flight.insert(task.id(), handle);
        Ok(())
    }

    fn spawn_server_command(
        &self,
        task: Arc<GDTask>,
        command: Arc<dyn ServerCommand>,
        server: Arc<gameap_core::Server>,
    ) {
        let repository = self.repository.clone();
        tokio::spawn(async move {
            if let Err(e) = command.execute(&server).await {
                report_worker_failure(repository.as_ref(), &task, &command.read_output(), &e)
                    .await;
            }
        });
    }

    fn spawn_exec_command(&self, task: Arc<GDTask>, command: Arc<ExecCommand>) {
        let repository = self.repository.clone();
        tokio::spawn(async move {
            if let Err(e) = command.execute(task.server().map(|s| s.as_ref())).await {
                report_worker_failure(repository.as_ref(), &task, &command.read_output(), &e)
                    .await;
            }
        });
    }

    async fn proceed_task(&self, task: &GDTask) -> Result<(), TaskError> {
        let handle = self
            .in_flight
            .get(&task.id())
            .map(|entry| entry.value().clone())
            .ok_or(TaskError::NotInFlight(task.id()))?;

        if handle.is_complete() {
            let status = if handle.result() == SUCCESS_RESULT {
                GDTaskStatus::Success
            } else {
                GDTaskStatus::Error
            };
            info!(
                log_type = "task_manager",
                "Task {} finished with result {}",
                task.id(),
                handle.result()
            );
            task.set_status(status);
            self.in_flight.remove(&task.id());
        }

        self.append_output(task, &handle.read_output()).await;
        Ok(())
    }

    async fn append_output(&self, task: &GDTask, output: &[u8]) {
        if output.is_empty() {
            return;
        }
        if let Err(e) = self.repository.append_output(task, output).await {
            error!(
                log_type = "task_manager",
                "Failed to append output of task {}: {}",
                task.id(),
                e
            );
        }
    }

    async fn save(&self, task: &GDTask) {
        if let Err(e) = self.repository.save(task).await {
            error!(
                log_type = "task_manager",
                "Failed to save task {}: {}",
                task.id(),
                e
            );
        }
    }
}

/// The command already wrote the error to its output and completed with [`ERROR_RESULT`];
/// whatever is left of the output goes to the panel before the task is failed.
async fn report_worker_failure(
    repository: &dyn GDTaskRepository,
    task: &GDTask,
    output: &[u8],
    err: &(dyn std::fmt::Display + Sync),
) {
    warn!(
        log_type = "task_manager",
        "Task {} failed with result {}: {}",
        task.id(),
        ERROR_RESULT,
        err
    );

    if !output.is_empty()
        && let Err(e) = repository.append_output(task, output).await
    {
        error!(
            log_type = "task_manager",
            "Failed to append output of task {}: {}",
            task.id(),
            e
        );
    }
    task.set_status(GDTaskStatus::Error);
}

impl StatsReader for TaskManager {
    fn stats(&self) -> GDTaskStats {
        GDTaskStats {
            working_count: self.in_flight.len(),
            waiting_count: self.queue.len(),
        }
    }
}
