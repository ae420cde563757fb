use std::path::Path;

use url::Url;

use gameap_core::{Game, GameMod};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallAction {
    CopyDirectory,
    UnpackLocalArchive,
    DownloadAndUnpack,
    Steam,
}

/// One way of getting files on disk: the source and what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRule {
    pub source: String,
    pub action: InstallAction,
}

impl InstallationRule {
    fn new(source: impl Into<String>, action: InstallAction) -> Self {
        Self {
            source: source.into(),
            action,
        }
    }
}

/// Rules for a game, in the order they should be attempted.
pub fn game_rules(game: &Game) -> Vec<InstallationRule> {
    let mut rules = repository_rules(&game.local_repository, &game.remote_repository);

    if game.steam_app_id > 0 {
        let source = if game.steam_app_set_config.is_empty() {
            game.steam_app_id.to_string()
        } else {
            format!("{} {}", game.steam_app_id, game.steam_app_set_config)
        };
        rules.push(InstallationRule::new(source, InstallAction::Steam));
    }

    rules
}

/// Rules for a game mod. Mods are never installed from Steam.
pub fn mod_rules(game_mod: &GameMod) -> Vec<InstallationRule> {
    repository_rules(&game_mod.local_repository, &game_mod.remote_repository)
}

fn repository_rules(local: &str, remote: &str) -> Vec<InstallationRule> {
    let mut rules = Vec::with_capacity(3);

    if !local.is_empty() {
        let path = Path::new(local);
        if path.is_dir() {
            rules.push(InstallationRule::new(local, InstallAction::CopyDirectory));
        } else if path.is_file() {
            rules.push(InstallationRule::new(local, InstallAction::UnpackLocalArchive));
        }
    }

    if is_remote_url(remote) {
        rules.push(InstallationRule::new(remote, InstallAction::DownloadAndUnpack));
    }

    rules
}

fn is_remote_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| url.host_str().is_some_and(|host| !host.is_empty()))
}
