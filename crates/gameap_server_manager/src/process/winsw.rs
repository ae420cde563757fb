use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, ERROR_RESULT, Executor, ExecutorOptions, OutputWriter, SUCCESS_RESULT, Server,
};

use super::service::{
    OUTPUT_SIZE_LIMIT, full_start_command, service_executable, service_password, tail_file,
    windows_arg,
};
use super::{ProcessManager, ProcessManagerError};
use crate::users::lookup_user;

const SERVICES_DIR: &str = "C:\\gameap\\services";
const SERVICE_PREFIX: &str = "gameapServer";

const ERROR_CODE_CANNOT_START: CommandResult = 1053;
const ERROR_CODE_SERVICE_NOT_EXIST: CommandResult = 1060;

const STATUS_ACTIVE: CommandResult = 1;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename = "service")]
struct ServiceConfig {
    #[serde(rename = "$unflatten=id")]
    id: String,
    #[serde(rename = "$unflatten=name")]
    name: String,
    #[serde(rename = "$unflatten=executable")]
    executable: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    #[serde(rename = "$unflatten=arguments")]
    arguments: String,
    #[serde(rename = "$unflatten=workingdirectory")]
    working_directory: String,
    #[serde(rename = "onfailure")]
    on_failure: Vec<OnFailure>,
    #[serde(rename = "$unflatten=resetfailure")]
    reset_failure: String,
    #[serde(rename = "$unflatten=autoRefresh")]
    auto_refresh: String,
    log: Log,
    #[serde(rename = "serviceaccount")]
    service_account: ServiceAccount,
}

#[derive(Debug, Serialize, PartialEq)]
struct OnFailure {
    action: String,
    delay: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct Log {
    mode: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct ServiceAccount {
    #[serde(rename = "$unflatten=username")]
    username: String,
    #[serde(rename = "$unflatten=password")]
    password: String,
}

/// Registers each server as a Windows service through WinSW XML definitions.
pub struct WinSw {
    cfg: Arc<DaemonConfig>,
    executor: Arc<dyn Executor>,
    services_dir: PathBuf,
}

impl WinSw {
    pub fn new(
        cfg: Arc<DaemonConfig>,
        _executor: Arc<dyn Executor>,
        detailed_executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            cfg,
            executor: detailed_executor,
            services_dir: PathBuf::from(SERVICES_DIR),
        }
    }

    pub fn with_services_dir(mut self, services_dir: impl Into<PathBuf>) -> Self {
        self.services_dir = services_dir.into();
        self
    }

    fn service_name(&self, server: &Server) -> String {
        format!("{}{}", SERVICE_PREFIX, server.id())
    }

    fn service_file(&self, server: &Server) -> PathBuf {
        self.services_dir
            .join(format!("{}.xml", self.service_name(server)))
    }

    fn log_file(&self, server: &Server) -> PathBuf {
        self.services_dir
            .join(format!("{}.out.log", self.service_name(server)))
    }

    async fn winsw(
        &self,
        command: &str,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let command = format!(
            "winsw {} {}",
            command,
            windows_arg(&self.service_file(server).to_string_lossy())
        );

        Ok(self
            .executor
            .exec_with_writer(&command, out, &ExecutorOptions::in_dir(self.cfg.work_path()))
            .await?)
    }

    pub(crate) fn build_service_config(&self, server: &Server) -> Result<String, ProcessManagerError> {
        let command = full_start_command(&self.cfg, server)?;
        let (executable, args) = service_executable(&command)?;

        let password = service_password(&self.cfg, server.user())?;
        let name = self.service_name(server);

        let config = ServiceConfig {
            id: name.clone(),
            name,
            executable,
            arguments: args
                .iter()
                .map(|arg| windows_arg(arg))
                .collect::<Vec<_>>()
                .join(" "),
            working_directory: server.work_dir(&self.cfg).to_string_lossy().into_owned(),
            on_failure: ["1 sec", "2 sec", "5 sec", "5 sec"]
                .into_iter()
                .map(|delay| OnFailure {
                    action: "restart".to_string(),
                    delay: delay.to_string(),
                })
                .collect(),
            reset_failure: "1 hour".to_string(),
            auto_refresh: "false".to_string(),
            log: Log {
                mode: "reset".to_string(),
            },
            service_account: ServiceAccount {
                username: server.user().to_string(),
                password,
            },
        };

        quick_xml::se::to_string(&config)
            .map_err(|e| ProcessManagerError::ServiceConfig(e.to_string()))
    }

    /// Writes the service definition. Returns `true` when the file did not exist before.
    async fn make_service(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<bool, ProcessManagerError> {
        if !tokio::fs::try_exists(&self.services_dir).await? {
            out.write_line(&format!("Creating directory {}", self.services_dir.display()));
            tokio::fs::create_dir_all(&self.services_dir).await?;
        }

        let service_file = self.service_file(server);
        let existing = match tokio::fs::read_to_string(&service_file).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                out.write_line("Service file not found");
                None
            }
            Err(e) => return Err(e.into()),
        };

        let config = self.build_service_config(server)?;

        if let Some(existing) = &existing {
            out.write_line("Service file exists");
            out.write_line("Checking if service configuration wasn't changed");

            if *existing == config {
                out.write_line("Service configuration wasn't changed");
                return Ok(false);
            }

            out.write_line("Service configuration was changed");
        }

        tokio::fs::write(&service_file, config).await?;

        Ok(existing.is_none())
    }

    /// Installs a new service or refreshes the definition of an existing one.
    async fn register(
        &self,
        created: bool,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<(), ProcessManagerError> {
        if created {
            if self.winsw("install", server, out).await? != SUCCESS_RESULT {
                return Err(ProcessManagerError::failed("install service"));
            }
            return Ok(());
        }

        match self.winsw("refresh", server, out).await? {
            SUCCESS_RESULT => Ok(()),
            ERROR_CODE_SERVICE_NOT_EXIST => {
                warn!(
                    log_type = "process_manager",
                    "Failed to refresh service config of server {}, trying to install service",
                    server.id()
                );
                if self.winsw("install", server, out).await? != SUCCESS_RESULT {
                    return Err(ProcessManagerError::failed("refresh and install service"));
                }
                Ok(())
            }
            _ => Err(ProcessManagerError::failed("refresh service")),
        }
    }

    async fn command(
        &self,
        command: &str,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        if server.user().is_empty() {
            return Err(ProcessManagerError::EmptyUser);
        }
        if lookup_user(server.user())?.is_none() {
            return Err(ProcessManagerError::UserNotFound(server.user().to_string()));
        }

        let created = self.make_service(server, out).await?;
        self.register(created, server, out).await?;

        let result = self.winsw(command, server, out).await?;
        if result != ERROR_CODE_CANNOT_START || command != "start" {
            return Ok(result);
        }

        if let Err(e) = self.winsw("uninstall", server, out).await {
            warn!(
                log_type = "process_manager",
                "Failed to uninstall service of server {}: {}",
                server.id(),
                e
            );
        }
        if self.winsw("install", server, out).await? != SUCCESS_RESULT {
            return Err(ProcessManagerError::failed("install service"));
        }

        self.winsw(command, server, out).await
    }
}

#[async_trait]
impl ProcessManager for WinSw {
    async fn install(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let created = self.make_service(server, out).await?;
        self.register(created, server, out).await?;

        Ok(SUCCESS_RESULT)
    }

    async fn uninstall(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.winsw("uninstall", server, out).await?;

        if let Err(e) = tokio::fs::remove_file(self.service_file(server)).await {
            warn!(
                log_type = "process_manager",
                "Failed to remove service file of server {}: {}",
                server.id(),
                e
            );
        }

        Ok(SUCCESS_RESULT)
    }

    async fn start(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.command("start", server, out).await
    }

    async fn stop(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.winsw("stop", server, out).await?;
        Ok(SUCCESS_RESULT)
    }

    async fn restart(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.command("restart", server, out).await
    }

    async fn status(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        if !tokio::fs::try_exists(self.service_file(server)).await? {
            return Ok(ERROR_RESULT);
        }

        match self.winsw("status", server, out).await? {
            STATUS_ACTIVE => Ok(SUCCESS_RESULT),
            _ => Ok(ERROR_RESULT),
        }
    }

    async fn get_output(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        tail_file(&self.log_file(server), OUTPUT_SIZE_LIMIT, out).await?;
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
