//! Startup and supervision of the long running services.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{Instrument, error, info, info_span};

use gameap_config::FileProvider;
use gameap_core::{Executor, GDTaskRepository, ServerRepository, ServerTaskRepository};
use gameap_server_manager::handlers::{
    GET_TOOL, GetTool, SERVER_COMMAND, SERVER_CONSOLE_OUTPUT, SendServerCommand,
    ServerConsoleOutput,
};
use gameap_server_manager::{
    DefaultExecutor, DetailedExecutor, Downloader, ExtendableExecutor, ServerCommandFactory,
    process,
};

use crate::api::ApiClient;
use crate::cli::{Args, ShutdownController};
use crate::node;
use crate::repositories::{ApiGDTaskRepository, ApiServerRepository, ApiServerTaskRepository};
use crate::scheduler::Scheduler;
use crate::server::WireServer;
use crate::servers_loop::ServersLoop;
use crate::task_manager::TaskManager;
use crate::telemetry;

/// Wait before a failed service is started again.
pub const RESTART_DELAY: Duration = Duration::from_secs(5);

/// Loads the configuration, wires the services and runs them until a shutdown signal.
pub async fn run(args: Args) -> anyhow::Result<()> {
    let mut cfg = FileProvider::try_load_config(args.config.as_deref())
        .context("failed to load configuration")?;

    telemetry::init_subscriber(&cfg)?;

    info!(
        log_type = "supervisor",
        version = env!("CARGO_PKG_VERSION"),
        "Starting GameAP daemon for node {}",
        cfg.node_id
    );

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;

    let api = ApiClient::connect(http.clone(), &cfg)
        .await
        .context("failed to connect to the panel API")?;

    node::init_node_config(&api, &mut cfg)
        .await
        .context("failed to initialize node configuration")?;

    let cfg = Arc::new(cfg);
    let api = Arc::new(api);
    let downloader = Downloader::new(http);

    let executor: Arc<dyn Executor> = Arc::new(DefaultExecutor::new());
    let detailed: Arc<dyn Executor> = Arc::new(DetailedExecutor::new(executor.clone()));
    let process_manager = process::load(cfg.clone(), executor.clone(), detailed.clone())
        .context("failed to load process manager")?;

    let servers: Arc<dyn ServerRepository> = Arc::new(ApiServerRepository::new(api.clone()));
    let gdtasks: Arc<dyn GDTaskRepository> =
        Arc::new(ApiGDTaskRepository::new(api.clone(), servers.clone()));
    let server_tasks: Arc<dyn ServerTaskRepository> =
        Arc::new(ApiServerTaskRepository::new(api.clone(), servers.clone()));

    let extendable = ExtendableExecutor::new(executor.clone());
    extendable.register_handler(GET_TOOL, Arc::new(GetTool::new(cfg.clone(), downloader.clone())));
    extendable.register_handler(
        SERVER_CONSOLE_OUTPUT,
        Arc::new(ServerConsoleOutput::new(servers.clone(), process_manager.clone())),
    );
    extendable.register_handler(
        SERVER_COMMAND,
        Arc::new(SendServerCommand::new(servers.clone(), process_manager.clone())),
    );
    let extendable: Arc<dyn Executor> = Arc::new(extendable);

    let factory = Arc::new(ServerCommandFactory::new(
        cfg.clone(),
        extendable.clone(),
        process_manager,
        servers.clone(),
        downloader,
    ));

    let task_manager = Arc::new(TaskManager::new(
        cfg.clone(),
        gdtasks,
        factory.clone(),
        extendable,
    ));
    let servers_loop = Arc::new(ServersLoop::new(servers, factory.clone()));
    let scheduler = Arc::new(Scheduler::new(server_tasks, factory));
    let wire_server = Arc::new(WireServer::new(
        cfg,
        executor,
        task_manager.clone(),
        Instant::now(),
    ));

    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown.clone().listen_for_signals());

    let services = [
        spawn_service("wire_server", shutdown.clone(), move |shutdown| {
            wire_server.clone().run(shutdown)
        }),
        spawn_service("task_manager", shutdown.clone(), move |shutdown| {
            task_manager.clone().run(shutdown)
        }),
        spawn_service("server_loop", shutdown.clone(), move |shutdown| {
            servers_loop.clone().run(shutdown)
        }),
        spawn_service("scheduler", shutdown.clone(), move |shutdown| {
            scheduler.clone().run(shutdown)
        }),
    ];

    shutdown.wait().await;

    for service in services {
        if let Err(e) = service.await {
            error!(log_type = "supervisor", "Service task panicked: {}", e);
        }
    }

    info!(log_type = "supervisor", "GameAP daemon stopped");
    Ok(())
}

/// Runs `start` until it returns cleanly or shutdown is triggered. Errors are
/// logged and the service is started again after [`RESTART_DELAY`].
pub fn spawn_service<F, Fut, E>(
    name: &'static str,
    shutdown: Arc<ShutdownController>,
    start: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(Arc<ShutdownController>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    supervise(name, shutdown, start, RESTART_DELAY)
}

fn supervise<F, Fut, E>(
    name: &'static str,
    shutdown: Arc<ShutdownController>,
    start: F,
    restart_delay: Duration,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(Arc<ShutdownController>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let span = info_span!("service", name, log_type = "supervisor");

    tokio::spawn(
        async move {
            let mut shutdown_rx = shutdown.subscribe().await;

            loop {
                if shutdown.is_shutdown_triggered().await {
                    break;
                }

                info!(log_type = "supervisor", "Starting {}", name);
                match start(shutdown.clone()).await {
                    Ok(()) => {
                        info!(log_type = "supervisor", "{} stopped", name);
                        break;
                    }
                    Err(e) => {
                        error!(log_type = "supervisor", "{} failed: {}", name, e);
                    }
                }

                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(restart_delay) => {}
                }
            }
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn failed_service_is_restarted_until_it_succeeds() {
        let shutdown = ShutdownController::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let handle = supervise(
            "flaky",
            shutdown,
            move |_| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("not yet")
                    } else {
                        Ok(())
                    }
                }
            },
            Duration::from_millis(5),
        );

        handle.await.unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn shutdown_stops_restarts() {
        let shutdown = ShutdownController::new();
        let attempts = Arc::new(AtomicUsize::new(0));

        let counter = attempts.clone();
        let handle = supervise(
            "failing",
            shutdown.clone(),
            move |_| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>("always")
                }
            },
            Duration::from_secs(60),
        );

        assert!(crate::testing::wait_until(|| attempts.load(Ordering::SeqCst) == 1).await);
        shutdown.trigger_shutdown("test").await;

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
