use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use gameap_config::DaemonConfig;
use gameap_core::{
    CommandResult, ERROR_RESULT, Executor, ExecutorOptions, NullOutput, OutputWriter,
    SUCCESS_RESULT, Server, make_full_command, replace_short_codes,
};

use super::service::{OUTPUT_SIZE_LIMIT, tail_file};
use super::{ProcessManager, ProcessManagerError, template_or_command};
use crate::executor::{join_command, resolve_executable, split_command};
use crate::users::lookup_user;

const UNITS_DIR: &str = "/etc/systemd/system";
const SERVICE_PREFIX: &str = "gameap-server-";
const SERVICES_DIR: &str = ".systemd-services";

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(500);
const STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Runs each server as a systemd service with a FIFO socket unit for stdin.
pub struct Systemd {
    cfg: Arc<DaemonConfig>,
    executor: Arc<dyn Executor>,
    detailed_executor: Arc<dyn Executor>,
    units_dir: PathBuf,
    stop_timeout: Duration,
}

impl Systemd {
    pub fn new(
        cfg: Arc<DaemonConfig>,
        executor: Arc<dyn Executor>,
        detailed_executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            cfg,
            executor,
            detailed_executor,
            units_dir: PathBuf::from(UNITS_DIR),
            stop_timeout: STOP_TIMEOUT,
        }
    }

    pub fn with_units_dir(mut self, units_dir: impl Into<PathBuf>) -> Self {
        self.units_dir = units_dir.into();
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    fn service_name(&self, server: &Server) -> String {
        format!("{}{}.service", SERVICE_PREFIX, server.uuid())
    }

    fn socket_name(&self, server: &Server) -> String {
        format!("{}{}.socket", SERVICE_PREFIX, server.uuid())
    }

    fn service_file(&self, server: &Server) -> PathBuf {
        self.units_dir.join(self.service_name(server))
    }

    fn socket_file(&self, server: &Server) -> PathBuf {
        self.units_dir.join(self.socket_name(server))
    }

    fn services_dir(&self) -> PathBuf {
        self.cfg.work_path().join(SERVICES_DIR)
    }

    fn log_file(&self, server: &Server) -> PathBuf {
        self.services_dir().join(format!("{}.log", server.uuid()))
    }

    fn stdin_file(&self, server: &Server) -> PathBuf {
        self.services_dir().join(format!("{}.stdin", server.uuid()))
    }

    fn options(&self) -> ExecutorOptions {
        ExecutorOptions::in_dir(self.cfg.work_path())
    }

    async fn systemctl(
        &self,
        args: &str,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        Ok(self
            .detailed_executor
            .exec_with_writer(&format!("systemctl {}", args), out, &self.options())
            .await?)
    }

    /// Maps `systemctl status` exit codes: 0 is active, 1 to 4 is not active.
    async fn unit_status(
        &self,
        name: &str,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let code = self
            .executor
            .exec_with_writer(&format!("systemctl status {}", name), out, &self.options())
            .await?;

        match code {
            0 => Ok(SUCCESS_RESULT),
            1..=4 => Ok(ERROR_RESULT),
            other => Err(ProcessManagerError::UnknownExitCode(other)),
        }
    }

    /// ExecStart line: the start command with its program resolved to an absolute path.
    fn exec_start(&self, server: &Server) -> Result<String, ProcessManagerError> {
        let command = replace_short_codes(server.start_command(), &self.cfg, server);
        if command.trim().is_empty() {
            return Err(ProcessManagerError::EmptyCommand);
        }

        let mut args = split_command(&command)?;
        let Some(program) = args.first_mut() else {
            return Err(ProcessManagerError::EmptyCommand);
        };

        let executable = resolve_executable(program, &server.work_dir(&self.cfg))?;
        *program = executable.to_string_lossy().into_owned();

        Ok(make_full_command(
            &self.cfg,
            server,
            template_or_command(&self.cfg.scripts.start),
            &join_command(&args),
        ))
    }

    pub(crate) fn build_service_config(&self, server: &Server) -> Result<String, ProcessManagerError> {
        if server.user().is_empty() {
            return Err(ProcessManagerError::EmptyUser);
        }

        let user = lookup_user(server.user())?
            .ok_or_else(|| ProcessManagerError::UserNotFound(server.user().to_string()))?;
        let group = user.gid.map(|gid| gid.to_string()).unwrap_or_default();

        let exec_start = self.exec_start(server)?;
        let log_file = self.log_file(server);

        let mut unit = String::new();
        let _ = writeln!(unit, "[Unit]");
        let _ = writeln!(unit, "Description=GameAP Server service (UUID {})", server.uuid());
        let _ = writeln!(unit, "After=network.target");
        let _ = writeln!(
            unit,
            "Wants=network-online.target systemd-networkd-wait-online.service\n"
        );

        let _ = writeln!(unit, "[Service]");
        let _ = writeln!(unit, "Type=simple");
        let _ = writeln!(unit, "ExecStart={}", exec_start);
        let _ = writeln!(unit, "Sockets={}", self.socket_name(server));
        let _ = writeln!(unit, "StandardInput=socket");
        let _ = writeln!(unit, "StandardOutput=append:{}", log_file.display());
        let _ = writeln!(unit, "StandardError=append:{}", log_file.display());
        let _ = writeln!(
            unit,
            "WorkingDirectory={}",
            server.work_dir(&self.cfg).display()
        );
        let _ = writeln!(unit, "Restart=always");
        let _ = writeln!(unit, "User={}", user.name);
        let _ = writeln!(unit, "Group={}\n", group);

        let _ = writeln!(unit, "[Install]");
        let _ = writeln!(unit, "WantedBy=multi-user.target");

        Ok(unit)
    }

    pub(crate) fn build_socket_config(&self, server: &Server) -> String {
        format!(
            "[Unit]\nDescription=GameAP Server socket (UUID {})\n\n[Socket]\nListenFIFO={}\nService={}\n",
            server.uuid(),
            self.stdin_file(server).display(),
            self.service_name(server),
        )
    }

    /// Writes both unit files when missing or outdated.
    async fn make_units(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<(), ProcessManagerError> {
        let service = self.build_service_config(server)?;
        let service_file = self.service_file(server);

        if read_if_exists(&service_file).await?.as_deref() != Some(service.as_str()) {
            out.write_line(&format!(
                "Creating service file at {}",
                service_file.display()
            ));
            out.write_line("----- BEGIN SERVICE FILE -----");
            out.write_str(&service);
            out.write_str("----- END SERVICE FILE -----\n\n\n");

            tokio::fs::write(&service_file, &service).await?;
        }

        let socket_file = self.socket_file(server);
        if read_if_exists(&socket_file).await?.is_none() {
            out.write_line(&format!("Creating socket file at {}", socket_file.display()));
            tokio::fs::write(&socket_file, self.build_socket_config(server)).await?;
        }

        Ok(())
    }

    async fn command(
        &self,
        command: &str,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.make_units(server, out).await?;
        self.systemctl("daemon-reload", out).await?;

        let socket = self.socket_name(server);
        if self.unit_status(&socket, &NullOutput).await? != SUCCESS_RESULT {
            self.systemctl(&format!("start {}", socket), out).await?;
        }

        self.systemctl(&format!("{} {}", command, self.service_name(server)), out)
            .await
    }

    async fn wait_stopped(&self, server: &Server) -> Result<(), ProcessManagerError> {
        let service = self.service_name(server);

        let wait = async {
            let mut ticker = tokio::time::interval(STOP_POLL_INTERVAL);
            loop {
                ticker.tick().await;
                if self.unit_status(&service, &NullOutput).await? == ERROR_RESULT {
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
impl ProcessManager for Systemd {
    async fn install(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.make_units(server, out).await?;
        self.systemctl("daemon-reload", out).await
    }

    async fn uninstall(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let service = self.service_name(server);

        if self.unit_status(&service, &NullOutput).await? == SUCCESS_RESULT {
            out.write_line(&format!("Service {} is running, stopping it first", service));
            self.stop(server, out).await?;
        }

        for (kind, file) in [
            ("socket", self.socket_file(server)),
            ("service", self.service_file(server)),
        ] {
            out.write_line(&format!("Removing {} file at {}", kind, file.display()));
            remove_if_exists(&file).await?;
        }

        self.systemctl("daemon-reload", out).await?;

        Ok(SUCCESS_RESULT)
    }

    async fn start(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let log_file = self.log_file(server);
        if let Some(parent) = log_file.parent() {
            create_dir_all(parent).await?;
        }
        tokio::fs::File::create(&log_file).await?;

        remove_if_exists(&self.stdin_file(server)).await?;

        self.command("start", server, out).await
    }

    async fn stop(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.systemctl(&format!("stop {}", self.socket_name(server)), out)
            .await?;

        let result = self
            .systemctl(&format!("stop {}", self.service_name(server)), out)
            .await?;
        if result != SUCCESS_RESULT {
            return Ok(result);
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
        self.command("restart", server, out).await
    }

    async fn status(
        &self,
        server: &Server,
        out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        self.unit_status(&self.service_name(server), out).await
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
        input: &str,
        server: &Server,
        _out: &dyn OutputWriter,
    ) -> Result<CommandResult, ProcessManagerError> {
        let stdin = self.stdin_file(server);
        debug!(
            log_type = "process_manager",
            "Sending input to {}",
            stdin.display()
        );

        let mut fifo = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&stdin)
            .await?;
        fifo.write_all(format!("{}\n", input).as_bytes()).await?;
        fifo.flush().await?;

        Ok(SUCCESS_RESULT)
    }
}

async fn read_if_exists(path: &Path) -> Result<Option<String>, ProcessManagerError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), ProcessManagerError> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(unix)]
async fn create_dir_all(path: &Path) -> Result<(), ProcessManagerError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true).mode(0o755);
    Ok(builder.create(path).await?)
}

#[cfg(not(unix))]
async fn create_dir_all(path: &Path) -> Result<(), ProcessManagerError> {
    Ok(tokio::fs::create_dir_all(path).await?)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::testing::{ScriptedExecutor, config, server};
    use gameap_core::SafeBuffer;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        units: PathBuf,
        work: PathBuf,
        executor: Arc<ScriptedExecutor>,
        pm: Systemd,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let units = temp.path().join("units");
        let work = temp.path().join("work");
        std::fs::create_dir_all(&units).unwrap();

        let server_dir = work.join("servers/1337");
        std::fs::create_dir_all(&server_dir).unwrap();
        let run = server_dir.join("hlds_run");
        std::fs::write(&run, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&run, std::fs::Permissions::from_mode(0o755)).unwrap();

        let executor = ScriptedExecutor::new();
        let pm = Systemd::new(
            Arc::new(config(&work)),
            executor.clone(),
            executor.clone(),
        )
        .with_units_dir(&units)
        .with_stop_timeout(Duration::from_secs(2));

        Fixture {
            _temp: temp,
            units,
            work,
            executor,
            pm,
        }
    }

    #[test]
    fn service_unit_content() {
        let f = fixture();
        let unit = f.pm.build_service_config(&server("root")).unwrap();
        let log = f
            .work
            .join(".systemd-services/759b875e-d910-11eb-aff7-d796d7fcf7ef.log");
        let exec = f.work.join("servers/1337/hlds_run");

        let expected = format!(
            "[Unit]\n\
             Description=GameAP Server service (UUID 759b875e-d910-11eb-aff7-d796d7fcf7ef)\n\
             After=network.target\n\
             Wants=network-online.target systemd-networkd-wait-online.service\n\
             \n\
             [Service]\n\
             Type=simple\n\
             ExecStart={exec} -game cstrike +map de_dust2\n\
             Sockets=gameap-server-759b875e-d910-11eb-aff7-d796d7fcf7ef.socket\n\
             StandardInput=socket\n\
             StandardOutput=append:{log}\n\
             StandardError=append:{log}\n\
             WorkingDirectory={dir}\n\
             Restart=always\n\
             User=root\n\
             Group=0\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n",
            exec = exec.display(),
            log = log.display(),
            dir = f.work.join("servers/1337").display(),
        );

        assert_eq!(unit, expected);
    }

    #[test]
    fn socket_unit_content() {
        let f = fixture();
        let socket = f.pm.build_socket_config(&server("root"));

        assert_eq!(
            socket,
            format!(
                "[Unit]\nDescription=GameAP Server socket (UUID 759b875e-d910-11eb-aff7-d796d7fcf7ef)\n\n\
                 [Socket]\nListenFIFO={}\nService=gameap-server-759b875e-d910-11eb-aff7-d796d7fcf7ef.service\n",
                f.work
                    .join(".systemd-services/759b875e-d910-11eb-aff7-d796d7fcf7ef.stdin")
                    .display()
            )
        );
    }

    #[tokio::test]
    async fn start_writes_units_and_starts_socket_then_service() {
        let f = fixture();
        f.executor.on("systemctl status gameap-server-", 3, "inactive");

        let out = SafeBuffer::new();
        let result = f.pm.start(&server("root"), &out).await.unwrap();

        assert_eq!(result, SUCCESS_RESULT);
        assert!(
            f.units
                .join("gameap-server-759b875e-d910-11eb-aff7-d796d7fcf7ef.service")
                .is_file()
        );
        assert!(
            f.units
                .join("gameap-server-759b875e-d910-11eb-aff7-d796d7fcf7ef.socket")
                .is_file()
        );
        assert!(
            f.work
                .join(".systemd-services/759b875e-d910-11eb-aff7-d796d7fcf7ef.log")
                .is_file()
        );
        assert_eq!(
            f.executor.commands(),
            vec![
                "systemctl daemon-reload",
                "systemctl status gameap-server-759b875e-d910-11eb-aff7-d796d7fcf7ef.socket",
                "systemctl start gameap-server-759b875e-d910-11eb-aff7-d796d7fcf7ef.socket",
                "systemctl start gameap-server-759b875e-d910-11eb-aff7-d796d7fcf7ef.service",
            ]
        );
        assert!(out.to_string_lossy().contains("----- BEGIN SERVICE FILE -----"));
    }

    #[tokio::test]
    async fn unchanged_units_are_not_rewritten() {
        let f = fixture();
        f.pm.install(&server("root"), &NullOutput).await.unwrap();

        let out = SafeBuffer::new();
        f.pm.install(&server("root"), &out).await.unwrap();

        assert!(!out.to_string_lossy().contains("Creating service file"));
    }

    #[tokio::test]
    async fn status_maps_exit_codes() {
        let f = fixture();
        assert_eq!(
            f.pm.status(&server("root"), &NullOutput).await.unwrap(),
            SUCCESS_RESULT
        );

        let f = fixture();
        f.executor.on("systemctl status", 3, "");
        assert_eq!(
            f.pm.status(&server("root"), &NullOutput).await.unwrap(),
            ERROR_RESULT
        );

        let f = fixture();
        f.executor.on("systemctl status", 5, "");
        assert!(matches!(
            f.pm.status(&server("root"), &NullOutput).await,
            Err(ProcessManagerError::UnknownExitCode(5))
        ));
    }

    #[tokio::test]
    async fn stop_waits_until_inactive() {
        let f = fixture();
        f.executor.on("systemctl status", 3, "");

        let out = SafeBuffer::new();
        let result = f.pm.stop(&server("root"), &out).await.unwrap();

        assert_eq!(result, SUCCESS_RESULT);
        let output = out.to_string_lossy();
        assert!(output.contains("Waiting for service to stop...\n"));
        assert!(output.ends_with("Service stopped\n"));
    }

    #[tokio::test]
    async fn stop_times_out_when_service_stays_active() {
        let f = fixture();

        let result = f.pm.stop(&server("root"), &NullOutput).await;

        assert!(matches!(result, Err(ProcessManagerError::StopTimeout)));
    }

    #[tokio::test]
    async fn uninstall_removes_units() {
        let f = fixture();
        f.pm.install(&server("root"), &NullOutput).await.unwrap();
        f.executor.on("systemctl status", 3, "");

        let out = SafeBuffer::new();
        let result = f.pm.uninstall(&server("root"), &out).await.unwrap();

        assert_eq!(result, SUCCESS_RESULT);
        assert_eq!(std::fs::read_dir(&f.units).unwrap().count(), 0);
        assert!(out.to_string_lossy().contains("Removing service file at"));
    }

    #[tokio::test]
    async fn output_and_input_use_service_files() {
        let f = fixture();
        let dir = f.work.join(".systemd-services");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("759b875e-d910-11eb-aff7-d796d7fcf7ef.log"),
            "server started\n",
        )
        .unwrap();
        std::fs::write(dir.join("759b875e-d910-11eb-aff7-d796d7fcf7ef.stdin"), "").unwrap();

        let out = SafeBuffer::new();
        f.pm.get_output(&server("root"), &out).await.unwrap();
        assert_eq!(out.to_string_lossy(), "server started\n");

        f.pm.send_input("status", &server("root"), &NullOutput)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.join("759b875e-d910-11eb-aff7-d796d7fcf7ef.stdin")).unwrap(),
            "status\n"
        );
    }
}
