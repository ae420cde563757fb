use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use gameap_core::{
    CommandResult, InstallationStatus, OutputWriter, SUCCESS_RESULT, Server,
};

use super::{CommandContext, CommandError, CommandState, ServerCommand};
use crate::installer::{InstallMode, Installer, game_rules, mod_rules};

/// Installs or updates the server files and keeps the panel informed of the progress.
pub struct InstallServer {
    context: Arc<CommandContext>,
    mode: InstallMode,
    state: CommandState,
}

impl InstallServer {
    pub(crate) fn new(context: Arc<CommandContext>, mode: InstallMode) -> Self {
        Self {
            context,
            mode,
            state: CommandState::default(),
        }
    }

    async fn save(&self, server: &Server) {
        if let Err(e) = self.context.servers.save(server).await {
            warn!(
                log_type = "server_command",
                "Failed to save server {}: {}",
                server.id(),
                e
            );
        }
    }

    async fn run(&self, server: &Server) -> Result<CommandResult, CommandError> {
        let out = self.state.output();
        let scripts = &self.context.cfg.scripts;

        let script = match self.mode {
            InstallMode::Install => &scripts.install,
            InstallMode::Update => &scripts.update,
        };
        if !script.is_empty() {
            out.write_line("Executing install script ...");
            return self.context.run_script(server, script, "", out).await;
        }

        let installer = Installer::new(
            self.context.cfg.clone(),
            self.context.executor.clone(),
            self.context.downloader.clone(),
            self.mode,
        );

        out.write_line("Installing game files ...");
        installer
            .install(server, &game_rules(server.game()), out)
            .await?;

        if self.mode == InstallMode::Install {
            let rules = mod_rules(server.game_mod());
            if !rules.is_empty() {
                out.write_line("Installing game mod files ...");
                installer.install(server, &rules, out).await?;
            }
        }

        Ok(SUCCESS_RESULT)
    }
}

#[async_trait]
impl ServerCommand for InstallServer {
    async fn execute(&self, server: &Server) -> Result<(), CommandError> {
        server.set_install_status(InstallationStatus::InstallInProgress);
        self.save(server).await;

        let outcome = self.run(server).await;

        let installed = matches!(outcome, Ok(SUCCESS_RESULT));
        server.set_install_status(if installed {
            InstallationStatus::Installed
        } else {
            InstallationStatus::NotInstalled
        });
        self.save(server).await;

        info!(
            log_type = "server_command",
            "Server {} {} finished, installed: {}",
            server.id(),
            match self.mode {
                InstallMode::Install => "installation",
                InstallMode::Update => "update",
            },
            installed
        );

        self.state.settle(outcome)
    }

    fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    fn result(&self) -> CommandResult {
        self.state.result()
    }

    fn read_output(&self) -> Vec<u8> {
        self.state.read_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::context;
    use crate::testing::{FakeProcessManager, ScriptedExecutor, config, server};
    use gameap_core::{ERROR_RESULT, ServerInfo};
    use gameap_core::memory::InMemoryServerRepository;

    #[tokio::test]
    async fn install_script_marks_server_installed() {
        let executor = ScriptedExecutor::new();
        executor.on("./install.sh", SUCCESS_RESULT, "done\n");
        let servers = Arc::new(InMemoryServerRepository::new());
        let mut cfg = config(&std::env::temp_dir());
        cfg.scripts.install = "./install.sh {id}".to_string();

        let command = InstallServer::new(
            context(cfg, executor.clone(), FakeProcessManager::new(), servers.clone()),
            InstallMode::Install,
        );
        let srv = server("");
        command.execute(&srv).await.unwrap();

        assert_eq!(command.result(), SUCCESS_RESULT);
        assert_eq!(srv.install_status(), InstallationStatus::Installed);
        assert_eq!(executor.commands(), vec!["./install.sh 1337"]);
        assert_eq!(
            command.read_output(),
            b"Executing install script ...\ndone\n"
        );

        let saved: Vec<InstallationStatus> =
            servers.saved().into_iter().map(|(_, s)| s.install_status).collect();
        assert_eq!(
            saved,
            vec![
                InstallationStatus::InstallInProgress,
                InstallationStatus::Installed
            ]
        );
    }

    #[tokio::test]
    async fn failed_update_script_leaves_server_not_installed() {
        let executor = ScriptedExecutor::new();
        executor.on("./update.sh", 2, "");
        let mut cfg = config(&std::env::temp_dir());
        cfg.scripts.update = "./update.sh".to_string();

        let command = InstallServer::new(
            context(
                cfg,
                executor,
                FakeProcessManager::new(),
                Arc::new(InMemoryServerRepository::new()),
            ),
            InstallMode::Update,
        );
        let srv = server("");
        command.execute(&srv).await.unwrap();

        assert_eq!(command.result(), 2);
        assert_eq!(srv.install_status(), InstallationStatus::NotInstalled);
    }

    #[tokio::test]
    async fn missing_rules_fail_the_installation() {
        let command = InstallServer::new(
            context(
                config(&std::env::temp_dir()),
                ScriptedExecutor::new(),
                FakeProcessManager::new(),
                Arc::new(InMemoryServerRepository::new()),
            ),
            InstallMode::Install,
        );
        let srv = server("");

        assert!(command.execute(&srv).await.is_err());
        assert!(command.is_complete());
        assert_eq!(command.result(), ERROR_RESULT);
        assert_eq!(srv.install_status(), InstallationStatus::NotInstalled);
    }

    #[tokio::test]
    async fn game_and_mod_files_are_copied_from_local_repositories() {
        let dir = tempfile::tempdir().unwrap();
        let game_repo = dir.path().join("repo/game");
        let mod_repo = dir.path().join("repo/mod");
        std::fs::create_dir_all(&game_repo).unwrap();
        std::fs::create_dir_all(&mod_repo).unwrap();
        std::fs::write(game_repo.join("hlds_run"), b"game").unwrap();
        std::fs::write(mod_repo.join("server.cfg"), b"mod").unwrap();

        let mut info: ServerInfo = server("").info().clone();
        info.game.local_repository = game_repo.to_string_lossy().into_owned();
        info.game_mod.local_repository = mod_repo.to_string_lossy().into_owned();
        let srv = Server::new(info, Default::default());

        let cfg = config(dir.path());
        let work_dir = srv.work_dir(&cfg);
        let command = InstallServer::new(
            context(
                cfg,
                ScriptedExecutor::new(),
                FakeProcessManager::new(),
                Arc::new(InMemoryServerRepository::new()),
            ),
            InstallMode::Install,
        );
        command.execute(&srv).await.unwrap();

        assert_eq!(command.result(), SUCCESS_RESULT);
        assert_eq!(std::fs::read(work_dir.join("hlds_run")).unwrap(), b"game");
        assert_eq!(std::fs::read(work_dir.join("server.cfg")).unwrap(), b"mod");

        let output = String::from_utf8(command.read_output()).unwrap();
        assert!(output.starts_with("Installing game files ...\n"));
        assert!(output.contains("Installing game mod files ...\n"));
    }
}
