use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, ERROR_RESULT, Executor, ExecutorOptions, NullOutput, OutputWriter,
    SUCCESS_RESULT, SafeBuffer, Server,
};

use super::service::{
    OUTPUT_SIZE_LIMIT, full_start_command, service_executable, service_password, tail_file,
    windows_arg,
};
use super::{ProcessManager, ProcessManagerError};
use crate::executor::look_path;
use crate::users::lookup_user;

const SERVICES_DIR: &str = "C:\\gameap\\services";
const SERVICE_PREFIX: &str = "gameapServer";
const NETWORK_SERVICE_ACCOUNT: &str = "NT AUTHORITY\\NETWORK SERVICE";

const SHAWL_STOP_TIMEOUT: &str = "10000";
const SHAWL_LOG_ROTATE: &str = "daily";
const SHAWL_LOG_RETAIN: &str = "7";

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Registers each server as a Windows service wrapped by shawl and managed with `sc`.
pub struct Shawl {
    cfg: Arc<DaemonConfig>,
    executor: Arc<dyn Executor>,
    services_dir: PathBuf,
    shawl_path: Option<PathBuf>,
    stop_timeout: Duration,
}

impl Shawl {
    pub fn new(
        cfg: Arc<DaemonConfig>,
        _executor: Arc<dyn Executor>,
        detailed_executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            cfg,
            executor: detailed_executor,
            services_dir: PathBuf::from(SERVICES_DIR),
            shawl_path: None,
            stop_timeout: STOP_TIMEOUT,
        }
    }

    pub fn with_services_dir(mut self, services_dir: impl Into<PathBuf>) -> Self {
        self.services_dir = services_dir.into();
        self
    }

    /// Uses the given shawl binary instead of searching `PATH`.
    pub fn with_shawl_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.shawl_path = Some(path.into());
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    fn service_name(&self, server: &Server) -> String {
        format!("{}{}", SERVICE_PREFIX, server.id())
    }

    fn config_file(&self, server: &Server) -> PathBuf {
        self.services_dir
            .join(format!("{}.yaml", self.service_name(server)))
    }

    fn logs_dir(&self) -> PathBuf {
        self.services_dir.join("logs")
    }

    fn log_file(&self, server: &Server) -> PathBuf {
        self.logs_dir()
            .join(format!("{}.log_rCURRENT.log", self.service_name(server)))
    }

    async fn sc(&self, args: &str, out: &dyn OutputWriter) -> Result<CommandResult, ProcessManagerError> {
        Ok(self
            .executor
            .exec_with_writer(
                &format!("sc {}", args),
                out,
                &ExecutorOptions::in_dir(self.cfg.work_path()),
            )
            .await?)
    }

    fn check_user(&self, server: &Server) -> Result<(), ProcessManagerError> {
        if self.cfg.use_network_service_user {
            return Ok(());
        }
        if server.user().is_empty() {
            return Err(ProcessManagerError::EmptyUser);
        }
        if lookup_user(server.user())?.is_none() {
            return Err(ProcessManagerError::UserNotFound(server.user().to_string()));
        }
        Ok(())
    }

    /// Content stored next to the service to detect configuration changes.
    pub(crate) fn build_service_config(&self, server: &Server) -> Result<String, ProcessManagerError> {
        let command = full_start_command(&self.cfg, server)?;

        Ok(format!(
            "command={}\nworkdir={}\nuser={}\n",
            command,
            server.work_dir(&self.cfg).display(),
            server.user()
        ))
    }

    pub(crate) fn build_shawl_args(&self, server: &Server) -> Result<Vec<String>, ProcessManagerError> {
        let command = full_start_command(&self.cfg, server)?;
        let (executable, command_args) = service_executable(&command)?;
        let name = self.service_name(server);

        let mut args: Vec<String> = vec![
            "run".into(),
            "--name".into(),
            name.clone(),
            "--restart".into(),
            "--stop-timeout".into(),
            SHAWL_STOP_TIMEOUT.into(),
            "--cwd".into(),
            server.work_dir(&self.cfg).to_string_lossy().into_owned(),
            "--log-dir".into(),
            self.logs_dir().to_string_lossy().into_owned(),
            "--log-as".into(),
            format!("{}.log", name),
            "--log-rotate".into(),
            SHAWL_LOG_ROTATE.into(),
            "--log-retain".into(),
            SHAWL_LOG_RETAIN.into(),
            "--".into(),
            executable,
        ];
        args.extend(command_args);

        Ok(args)
    }

    fn shawl_path(&self) -> Result<PathBuf, ProcessManagerError> {
        self.shawl_path
            .clone()
            .or_else(|| look_path("shawl"))
            .ok_or_else(|| {
                ProcessManagerError::ServiceConfig("shawl executable not found in PATH".to_string())
            })
    }

    /// Creates the service or recreates it when its configuration changed.
    /// Returns `true` when no configuration existed before.
    async fn make_service(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<bool, ProcessManagerError> {
        let name = self.service_name(server);
        let config_file = self.config_file(server);

        if !tokio::fs::try_exists(&self.services_dir).await? {
            out.write_line(&format!("Creating directory {}", self.services_dir.display()));
            tokio::fs::create_dir_all(&self.services_dir).await?;
        }

        let config = self.build_service_config(server)?;

        let existing = match tokio::fs::read_to_string(&config_file).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        if let Some(existing) = &existing {
            if *existing == config {
                out.write_line("Service configuration unchanged");
                return Ok(false);
            }

            out.write_line("Service configuration changed, recreating service");
            self.sc(&format!("stop {}", name), out).await?;
            self.sc(&format!("delete {}", name), out).await?;
        }

        let shawl = self.shawl_path()?;
        let args = self.build_shawl_args(server)?;
        let bin_path = format!(
            "{} {}",
            windows_arg(&shawl.to_string_lossy()),
            args.iter()
                .map(|arg| windows_arg(arg))
                .collect::<Vec<_>>()
                .join(" ")
        );

        let create = if self.cfg.use_network_service_user {
            let work_dir = server.work_dir(&self.cfg);
            out.write_line(&format!(
                "Granting permissions to NETWORK SERVICE for {}",
                work_dir.display()
            ));
            self.grant_network_service(&work_dir.to_string_lossy(), out)
                .await?;

            format!(
                "create {} start=auto obj={} binPath={}",
                name,
                windows_arg(NETWORK_SERVICE_ACCOUNT),
                windows_arg(&bin_path)
            )
        } else {
            let password = service_password(&self.cfg, server.user())?;
            format!(
                "create {} start=auto obj={} password={} binPath={}",
                name,
                server.user(),
                windows_arg(&password),
                windows_arg(&bin_path)
            )
        };

        out.write_line(&format!("Creating service {}", name));
        out.write_line("Service configuration:");
        out.write_str(&config);
        out.write_line(&format!("binPath: {}", bin_path));

        if self.sc(&create, out).await? != SUCCESS_RESULT {
            return Err(ProcessManagerError::failed("create service"));
        }

        tokio::fs::write(&config_file, config).await?;

        Ok(existing.is_none())
    }

    async fn grant_network_service(
        &self,
        path: &str,
        out: &dyn OutputWriter,
    ) -> Result<(), ProcessManagerError> {
        let command = format!(
            "icacls {} /grant {} /T",
            windows_arg(path),
            windows_arg(&format!("{}:(OI)(CI)M", NETWORK_SERVICE_ACCOUNT))
        );

        let result = self
            .executor
            .exec_with_writer(&command, out, &ExecutorOptions::in_dir(self.cfg.work_path()))
            .await?;
        if result != SUCCESS_RESULT {
            return Err(ProcessManagerError::failed("grant permissions to NETWORK SERVICE"));
        }

        Ok(())
    }

    async fn wait_stopped(&self, server: &Server) -> Result<(), ProcessManagerError> {
        let wait = async {
            let mut ticker = tokio::time::interval(STOP_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if self.status(server, &NullOutput).await? == ERROR_RESULT {
                    return Ok::<(), ProcessManagerError>(());
                }
            }
        };

        tokio::time::timeout(self.stop_timeout, wait)
            .await
            .map_err(|_| ProcessManagerError::StopTimeout)?
    }
}

#[async_trait]
impl ProcessManager for Shawl {
    async fn install(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        if self.make_service(server, out).await? {
            out.write_line("Service created successfully");
        } else {
            out.write_line("Service configuration updated");
        }

        Ok(SUCCESS_RESULT)
    }

    async fn uninstall(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let name = self.service_name(server);

        if let Err(e) = self.stop(server, out).await {
            warn!(
                log_type = "process_manager",
                "Failed to stop service {} before deleting: {}", name, e
            );
        }

        out.write_line(&format!("Deleting service {}", name));
        let result = self.sc(&format!("delete {}", name), out).await?;
        if result != SUCCESS_RESULT {
            warn!(
                log_type = "process_manager",
                "sc delete {} returned exit code {}", name, result
            );
        }

        match tokio::fs::remove_file(self.config_file(server)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                warn!(
                    log_type = "process_manager",
                    "Failed to remove service config of {}: {}", name, e
                );
            }
            _ => {}
        }

        Ok(SUCCESS_RESULT)
    }

    async fn start(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.check_user(server)?;
        self.make_service(server, out).await?;

        let name = self.service_name(server);
        out.write_line(&format!("Starting service {}", name));

        if self.sc(&format!("start {}", name), out).await? != SUCCESS_RESULT {
            return Err(ProcessManagerError::failed("start service"));
        }

        Ok(SUCCESS_RESULT)
    }

    async fn stop(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let name = self.service_name(server);
        out.write_line(&format!("Stopping service {}", name));

        if self.sc(&format!("stop {}", name), out).await? != SUCCESS_RESULT {
            if self.status(server, &NullOutput).await? == ERROR_RESULT {
                return Ok(SUCCESS_RESULT);
            }
            return Err(ProcessManagerError::failed("stop service"));
        }

        out.write_line("Waiting for service to stop...");
        self.wait_stopped(server).await?;
        out.write_line("Service stopped");

        Ok(SUCCESS_RESULT)
    }

    async fn restart(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        if let Err(e) = self.stop(server, out).await {
            warn!(
                log_type = "process_manager",
                "Failed to stop service of server {} during restart: {}",
                server.id(),
                e
            );
        }

        self.start(server, out).await
    }

    async fn status(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        if !tokio::fs::try_exists(self.config_file(server)).await? {
            debug!(
                log_type = "process_manager",
                "Service config of server {} not found",
                server.id()
            );
            return Ok(ERROR_RESULT);
        }

        let output = SafeBuffer::new();
        let result = self
            .sc(&format!("query {}", self.service_name(server)), &output)
            .await?;
        let output = output.read_output();
        out.write(&output);

        if result != SUCCESS_RESULT {
            return Ok(ERROR_RESULT);
        }

        if String::from_utf8_lossy(&output).contains("RUNNING") {
            Ok(SUCCESS_RESULT)
        } else {
            Ok(ERROR_RESULT)
        }
    }

    async fn get_output(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let log_file = self.log_file(server);

        if !tokio::fs::try_exists(&log_file).await? {
            out.write_line(&format!("Log file {} does not exist", log_file.display()));
            return Ok(SUCCESS_RESULT);
        }

        let tail = SafeBuffer::new();
        tail_file(&log_file, OUTPUT_SIZE_LIMIT, &tail).await?;

        for line in tail.to_string_lossy().lines() {
            let message = parse_log_line(line);
            if !message.is_empty() {
                out.write_line(message);
            }
        }

        Ok(SUCCESS_RESULT)
    }

    async fn send_input(
        &self,
        _input: &str,
        _server: &Server,
        _out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        Err(ProcessManagerError::InputNotSupported)
    }
}

/// Extracts the message from a shawl log line such as
/// `2025-11-29 00:07:35 [DEBUG] stdout: "message"`.
fn parse_log_line(line: &str) -> &str {
    let Some((_, rest)) = line.split_once("] ") else {
        return line;
    };

    let Some((_, message)) = rest.split_once(": ") else {
        return rest;
    };

    message
        .strip_prefix('"')
        .and_then(|m| m.strip_suffix('"'))
        .unwrap_or(message)
}
