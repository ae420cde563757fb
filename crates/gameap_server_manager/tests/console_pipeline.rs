#![cfg(unix)]

use std::sync::Arc;

use gameap_config::DaemonConfig;
use gameap_core::memory::InMemoryServerRepository;
use gameap_core::{
    Executor, ExecutorOptions, SUCCESS_RESULT, SafeBuffer, Server, ServerInfo, ServerState,
};
use gameap_server_manager::handlers::{self, SendServerCommand, ServerConsoleOutput};
use gameap_server_manager::process::Simple;
use gameap_server_manager::{
    CommandKind, DefaultExecutor, DetailedExecutor, Downloader, ExtendableExecutor,
    ServerCommandFactory,
};

fn server() -> Arc<Server> {
    Arc::new(Server::new(
        ServerInfo {
            id: 7,
            uuid: "0d4f9e2a-6c1b-4e8a-9f3d-2b7c5a1e8d90".to_string(),
            uuid_short: "0d4f9e2a".to_string(),
            dir: "servers/7".to_string(),
            start_command: "./run.sh".to_string(),
            ..Default::default()
        },
        ServerState::default(),
    ))
}

fn config(work_path: &std::path::Path) -> DaemonConfig {
    let mut cfg = DaemonConfig {
        node_id: 1,
        work_path: work_path.to_string_lossy().into_owned(),
        ..Default::default()
    };
    cfg.scripts.get_console = "echo console of {id}".to_string();
    cfg.scripts.status = "true".to_string();
    cfg
}

#[tokio::test]
async fn console_handlers_reach_the_process_manager() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Arc::new(config(dir.path()));

    let plain: Arc<dyn Executor> = Arc::new(DefaultExecutor::new());
    let detailed: Arc<dyn Executor> = Arc::new(DetailedExecutor::new(plain.clone()));
    let pm = Arc::new(Simple::new(cfg.clone(), plain.clone(), detailed));
    let servers = Arc::new(InMemoryServerRepository::with_servers([server()]));

    let executor = ExtendableExecutor::new(plain);
    executor.register_handler(
        handlers::SERVER_CONSOLE_OUTPUT,
        Arc::new(ServerConsoleOutput::new(servers.clone(), pm.clone())),
    );
    executor.register_handler(
        handlers::SERVER_COMMAND,
        Arc::new(SendServerCommand::new(servers, pm)),
    );

    let out = SafeBuffer::new();
    let result = executor
        .exec_with_writer(
            "server-console-output 7",
            &out,
            &ExecutorOptions::in_dir(dir.path()),
        )
        .await
        .unwrap();

    assert_eq!(result, SUCCESS_RESULT);
    assert_eq!(out.to_string_lossy(), "console of 7\n");

    let out = SafeBuffer::new();
    let passthrough = executor
        .exec_with_writer("echo plain", &out, &ExecutorOptions::in_dir(dir.path()))
        .await
        .unwrap();

    assert_eq!(passthrough, SUCCESS_RESULT);
    assert_eq!(out.to_string_lossy(), "plain\n");
}

#[tokio::test]
async fn factory_status_uses_the_configured_script() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = Arc::new(config(dir.path()));

    let plain: Arc<dyn Executor> = Arc::new(DefaultExecutor::new());
    let detailed: Arc<dyn Executor> = Arc::new(DetailedExecutor::new(plain.clone()));
    let pm = Arc::new(Simple::new(cfg.clone(), plain.clone(), detailed));

    let factory = ServerCommandFactory::new(
        cfg,
        plain,
        pm,
        Arc::new(InMemoryServerRepository::new()),
        Downloader::default(),
    );

    let status = factory.load_server_command(CommandKind::Status);
    status.execute(&server()).await.unwrap();

    assert!(status.is_complete());
    assert_eq!(status.result(), SUCCESS_RESULT);
}
