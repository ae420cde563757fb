//! Puts game and mod files on disk by trying installation rules in order.

mod archive;
mod rules;
mod steam;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use gameap_config::DaemonConfig;
use gameap_core::{
    Executor, ExecutorError, ExecutorOptions, OutputWriter, SUCCESS_RESULT, Server,
};

pub use archive::ArchiveKind;
pub use rules::{InstallAction, InstallationRule, game_rules, mod_rules};

use crate::download::{DownloadError, Downloader};
use crate::users::lookup_user;

const AFTER_INSTALL_SCRIPT: &str = ".after_install.sh";

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("no installation rules")]
    NoInstallationRules,

    #[error("all installation methods failed: {last}")]
    AllMethodsFailed {
        #[source]
        last: Box<InstallError>,
    },

    #[error("failed to install via steamcmd, exit code {0}")]
    InstallViaPlatformPackageFailed(i32),

    #[error("failed to execute after install script: {0}")]
    FailedToExecuteAfterScript(String),

    #[error("user {0} not found")]
    UserNotFound(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("blocking task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    Install,
    /// Skips steamcmd validation and the after install script.
    Update,
}

pub struct Installer {
    cfg: Arc<DaemonConfig>,
    executor: Arc<dyn Executor>,
    downloader: Downloader,
    mode: InstallMode,
}

impl Installer {
    pub fn new(
        cfg: Arc<DaemonConfig>,
        executor: Arc<dyn Executor>,
        downloader: Downloader,
        mode: InstallMode,
    ) -> Self {
        Self {
            cfg,
            executor,
            downloader,
            mode,
        }
    }

    pub fn mode(&self) -> InstallMode {
        self.mode
    }

    /// Tries `rules` in order until one succeeds.
    pub async fn install(
        &self,
        server: &Server,
        rules: &[InstallationRule],
        out: &dyn OutputWriter,
    ) -> Result<(), InstallError> {
        if rules.is_empty() {
            return Err(InstallError::NoInstallationRules);
        }

        let mut last = InstallError::NoInstallationRules;

        for rule in rules {
            match self.attempt(server, rule, out).await {
                Ok(()) => {
                    info!(
                        log_type = "installer",
                        "Server {} installed from {}",
                        server.id(),
                        rule.source
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        log_type = "installer",
                        "Failed to install server {} from {}: {}",
                        server.id(),
                        rule.source,
                        e
                    );
                    out.write_line(&format!("Failed to install from {}: {}", rule.source, e));
                    last = e;
                }
            }
        }

        Err(InstallError::AllMethodsFailed {
            last: Box::new(last),
        })
    }

    async fn attempt(
        &self,
        server: &Server,
        rule: &InstallationRule,
        out: &dyn OutputWriter,
    ) -> Result<(), InstallError> {
        let work_dir = server.work_dir(&self.cfg);
        tokio::fs::create_dir_all(&work_dir).await?;

        match rule.action {
            InstallAction::CopyDirectory => self.copy_directory(&rule.source, &work_dir, out).await?,
            InstallAction::UnpackLocalArchive => {
                self.unpack_local(Path::new(&rule.source), &work_dir, out)
                    .await?
            }
            InstallAction::DownloadAndUnpack => {
                self.download_and_unpack(server, &rule.source, &work_dir, out)
                    .await?
            }
            InstallAction::Steam => self.install_from_steam(&rule.source, &work_dir, out).await?,
        }

        self.change_owner(server, &work_dir).await?;
        self.after_install(server, &work_dir, out).await
    }

    async fn copy_directory(
        &self,
        source: &str,
        work_dir: &Path,
        out: &dyn OutputWriter,
    ) -> Result<(), InstallError> {
        let message = format!("Copying files from {} to {}", source, work_dir.display());
        out.write_line(&format!("{} ...", message));

        let (src, dst) = (PathBuf::from(source), work_dir.to_path_buf());
        tokio::task::spawn_blocking(move || gameap_core::fs::copy_dir(&src, &dst)).await??;

        out.write_line(&format!("{} successfully completed", message));
        Ok(())
    }

    async fn unpack_local(
        &self,
        file: &Path,
        work_dir: &Path,
        out: &dyn OutputWriter,
    ) -> Result<(), InstallError> {
        let message = format!("Unpacking from {} to {}", file.display(), work_dir.display());
        out.write_line(&format!("{} ...", message));

        place_file(file, work_dir).await?;

        out.write_line(&format!("{} successfully completed", message));
        Ok(())
    }

    async fn download_and_unpack(
        &self,
        server: &Server,
        url: &str,
        work_dir: &Path,
        out: &dyn OutputWriter,
    ) -> Result<(), InstallError> {
        let message = format!(
            "Downloading and unpacking from {} to {}",
            url,
            work_dir.display()
        );
        out.write_line(&format!("{} ...", message));

        let temp = std::env::temp_dir().join(format!("gameap-download-{}", server.uuid()));
        tokio::fs::create_dir_all(&temp).await?;

        let result = self
            .fetch(url, &temp.join(download_file_name(url)), work_dir, out)
            .await;

        if let Err(e) = tokio::fs::remove_dir_all(&temp).await
            && e.kind() != io::ErrorKind::NotFound
        {
            debug!(
                log_type = "installer",
                "Failed to remove {}: {}",
                temp.display(),
                e
            );
        }

        result?;
        out.write_line(&format!("{} successfully completed", message));
        Ok(())
    }

    async fn fetch(
        &self,
        url: &str,
        file: &Path,
        work_dir: &Path,
        out: &dyn OutputWriter,
    ) -> Result<(), InstallError> {
        self.downloader.download(url, file, out).await?;
        place_file(file, work_dir).await
    }

    async fn install_from_steam(
        &self,
        source: &str,
        work_dir: &Path,
        out: &dyn OutputWriter,
    ) -> Result<(), InstallError> {
        out.write_line("Installing from steam ...");

        let command = steam::steamcmd_command(
            Path::new(&self.cfg.steamcmd_path),
            &self.cfg.steam_config,
            work_dir,
            source,
            self.mode == InstallMode::Install,
        );
        let options = ExecutorOptions::in_dir(&self.cfg.steamcmd_path);

        let mut result = SUCCESS_RESULT;
        for attempt in 1..=steam::MAX_ATTEMPTS {
            result = self.executor.exec_with_writer(&command, out, &options).await?;

            if !steam::REPEATABLE_RESULTS.contains(&result) {
                break;
            }
            debug!(
                log_type = "installer",
                "steamcmd exited with {} on attempt {}",
                result,
                attempt
            );
        }

        if result != SUCCESS_RESULT {
            return Err(InstallError::InstallViaPlatformPackageFailed(result));
        }

        out.write_line("Installing from steam successfully completed");
        Ok(())
    }

    async fn change_owner(&self, server: &Server, work_dir: &Path) -> Result<(), InstallError> {
        if !cfg!(unix) || server.user().is_empty() || !gameap_core::fs::is_root() {
            return Ok(());
        }

        let user = lookup_user(server.user())?
            .ok_or_else(|| InstallError::UserNotFound(server.user().to_string()))?;
        let (Some(uid), Some(gid)) = (user.uid, user.gid) else {
            return Ok(());
        };

        let path = work_dir.to_path_buf();
        tokio::task::spawn_blocking(move || gameap_core::fs::chown_recursive(&path, uid, gid))
            .await??;

        Ok(())
    }

    /// Runs `.after_install.sh` when installing. The script is removed in either mode.
    async fn after_install(
        &self,
        server: &Server,
        work_dir: &Path,
        out: &dyn OutputWriter,
    ) -> Result<(), InstallError> {
        let script = work_dir.join(AFTER_INSTALL_SCRIPT);
        if !tokio::fs::try_exists(&script).await? {
            return Ok(());
        }

        let result = match self.mode {
            InstallMode::Install => self.run_after_install(server, &script, work_dir, out).await,
            InstallMode::Update => Ok(()),
        };

        if let Err(e) = tokio::fs::remove_file(&script).await {
            warn!(
                log_type = "installer",
                "Failed to remove {}: {}",
                script.display(),
                e
            );
        }

        result
    }

    async fn run_after_install(
        &self,
        server: &Server,
        script: &Path,
        work_dir: &Path,
        out: &dyn OutputWriter,
    ) -> Result<(), InstallError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(script, std::fs::Permissions::from_mode(0o755)).await?;
        }

        let user = match server.user() {
            "" => None,
            name => lookup_user(name)?,
        };
        let options = match user {
            Some(user) => user.executor_options(work_dir.to_path_buf()),
            None => ExecutorOptions::in_dir(work_dir),
        };

        let command = crate::executor::join_command(&[script.to_string_lossy()]);
        let result = self
            .executor
            .exec_with_writer(&command, out, &options)
            .await
            .map_err(|e| InstallError::FailedToExecuteAfterScript(e.to_string()))?;

        if result != SUCCESS_RESULT {
            return Err(InstallError::FailedToExecuteAfterScript(format!(
                "exit code {}",
                result
            )));
        }

        Ok(())
    }
}

/// Unpacks an archive into `work_dir`, or copies any other file there as is.
async fn place_file(file: &Path, work_dir: &Path) -> Result<(), InstallError> {
    let (file, work_dir) = (file.to_path_buf(), work_dir.to_path_buf());

    tokio::task::spawn_blocking(move || match ArchiveKind::detect(&file) {
        Some(kind) => archive::unpack(kind, &file, &work_dir),
        None => {
            let name = file
                .file_name()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "file has no name"))?;
            std::fs::copy(&file, work_dir.join(name)).map(|_| ())
        }
    })
    .await??;

    Ok(())
}

fn download_file_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedExecutor, config, server};
    use gameap_core::SafeBuffer;
    use tempfile::TempDir;

    fn installer(work: &Path, executor: Arc<dyn Executor>, mode: InstallMode) -> Installer {
        let mut cfg = config(work);
        cfg.steamcmd_path = "/opt/steamcmd".to_string();
        Installer::new(Arc::new(cfg), executor, Downloader::default(), mode)
    }

    fn local_repository(temp: &TempDir) -> PathBuf {
        let repo = temp.path().join("repo");
        std::fs::create_dir_all(repo.join("cstrike")).unwrap();
        std::fs::write(repo.join("hlds_run"), "#!/bin/sh\n").unwrap();
        std::fs::write(repo.join("cstrike/server.cfg"), "hostname test\n").unwrap();
        repo
    }

    #[tokio::test]
    async fn empty_rules_fail() {
        let temp = TempDir::new().unwrap();
        let installer = installer(temp.path(), ScriptedExecutor::new(), InstallMode::Install);

        let result = installer.install(&server(""), &[], &SafeBuffer::new()).await;

        assert!(matches!(result, Err(InstallError::NoInstallationRules)));
    }

    #[tokio::test]
    async fn copies_local_directory() {
        let temp = TempDir::new().unwrap();
        let repo = local_repository(&temp);
        let work = temp.path().join("work");
        let installer = installer(&work, ScriptedExecutor::new(), InstallMode::Install);
        let out = SafeBuffer::new();

        installer
            .install(
                &server(""),
                &[InstallationRule {
                    source: repo.to_string_lossy().into_owned(),
                    action: InstallAction::CopyDirectory,
                }],
                &out,
            )
            .await
            .unwrap();

        assert!(work.join("servers/1337/cstrike/server.cfg").is_file());
        assert!(out.to_string_lossy().contains("successfully completed"));
    }

    #[tokio::test]
    async fn later_rules_are_skipped_after_success() {
        let temp = TempDir::new().unwrap();
        let repo = local_repository(&temp);
        let work = temp.path().join("work");
        let executor = ScriptedExecutor::new();
        let installer = installer(&work, executor.clone(), InstallMode::Install);

        let rules = [
            InstallationRule {
                source: temp.path().join("missing").to_string_lossy().into_owned(),
                action: InstallAction::CopyDirectory,
            },
            InstallationRule {
                source: repo.to_string_lossy().into_owned(),
                action: InstallAction::CopyDirectory,
            },
            InstallationRule {
                source: "90".to_string(),
                action: InstallAction::Steam,
            },
        ];

        installer
            .install(&server(""), &rules, &SafeBuffer::new())
            .await
            .unwrap();

        assert!(executor.commands().is_empty());
        assert!(work.join("servers/1337/hlds_run").is_file());
    }

    #[tokio::test]
    async fn steam_retries_repeatable_results() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor::new();
        executor.on("/opt/steamcmd", 8, "");
        let installer = installer(temp.path(), executor.clone(), InstallMode::Install);

        let result = installer
            .install(
                &server(""),
                &[InstallationRule {
                    source: "90".to_string(),
                    action: InstallAction::Steam,
                }],
                &SafeBuffer::new(),
            )
            .await;

        assert_eq!(executor.commands().len(), 3);
        match result {
            Err(InstallError::AllMethodsFailed { last }) => {
                assert!(matches!(*last, InstallError::InstallViaPlatformPackageFailed(8)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn update_skips_validation() {
        let temp = TempDir::new().unwrap();
        let executor = ScriptedExecutor::new();
        let installer = installer(temp.path(), executor.clone(), InstallMode::Update);

        installer
            .install(
                &server(""),
                &[InstallationRule {
                    source: "90".to_string(),
                    action: InstallAction::Steam,
                }],
                &SafeBuffer::new(),
            )
            .await
            .unwrap();

        let commands = executor.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].ends_with("+app_update 90 +quit"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn after_install_script_runs_on_install_and_is_removed() {
        use crate::executor::DefaultExecutor;

        let temp = TempDir::new().unwrap();
        let repo = local_repository(&temp);
        std::fs::write(
            repo.join(AFTER_INSTALL_SCRIPT),
            "#!/bin/sh\ntouch after_install_done\n",
        )
        .unwrap();
        let rules = [InstallationRule {
            source: repo.to_string_lossy().into_owned(),
            action: InstallAction::CopyDirectory,
        }];

        let work = temp.path().join("install");
        installer(&work, Arc::new(DefaultExecutor::new()), InstallMode::Install)
            .install(&server(""), &rules, &SafeBuffer::new())
            .await
            .unwrap();
        let dir = work.join("servers/1337");
        assert!(dir.join("after_install_done").is_file());
        assert!(!dir.join(AFTER_INSTALL_SCRIPT).exists());

        let work = temp.path().join("update");
        installer(&work, Arc::new(DefaultExecutor::new()), InstallMode::Update)
            .install(&server(""), &rules, &SafeBuffer::new())
            .await
            .unwrap();
        let dir = work.join("servers/1337");
        assert!(!dir.join("after_install_done").exists());
        assert!(!dir.join(AFTER_INSTALL_SCRIPT).exists());
    }

    #[test]
    fn download_names_come_from_the_url_path() {
        assert_eq!(
            download_file_name("https://example.com/files/hlds.tar.gz?x=1"),
            "hlds.tar.gz"
        );
        assert_eq!(download_file_name("https://example.com/"), "download");
    }
}
