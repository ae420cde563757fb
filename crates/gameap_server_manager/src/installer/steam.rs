use std::path::Path;

use gameap_config::SteamConfig;

#[cfg(windows)]
const STEAMCMD_FILE: &str = "steamcmd.exe";
#[cfg(not(windows))]
const STEAMCMD_FILE: &str = "steamcmd.sh";

/// Exit codes after which steamcmd is worth running again.
pub(crate) const REPEATABLE_RESULTS: [i32; 2] = [7, 8];
pub(crate) const MAX_ATTEMPTS: usize = 3;

/// Builds the steamcmd invocation for an `"<appid>[ <set config>]"` source.
pub(crate) fn steamcmd_command(
    steamcmd_path: &Path,
    steam: &SteamConfig,
    work_dir: &Path,
    source: &str,
    validate: bool,
) -> String {
    let (app_id, set_config) = match source.split_once(' ') {
        Some((app_id, set_config)) => (app_id, set_config.trim()),
        None => (source, ""),
    };

    let mut command = format!(
        "{} +force_install_dir \"{}\"",
        steamcmd_path.join(STEAMCMD_FILE).display(),
        work_dir.display()
    );

    if steam.login.is_empty() {
        command.push_str(" +login anonymous");
    } else {
        command.push_str(&format!(" +login {} {}", steam.login, steam.password));
    }

    command.push_str(" +app_update ");
    command.push_str(app_id);
    if !set_config.is_empty() {
        command.push(' ');
        command.push_str(set_config);
    }
    command.push(' ');
    if validate {
        command.push_str("validate ");
    }
    command.push_str("+quit");

    command
}
