use serde::{Deserialize, Serialize};

/// Node level command templates. An empty template means "not configured".
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scripts {
    pub install: String,
    pub reinstall: String,
    pub update: String,
    pub start: String,
    pub pause: String,
    pub unpause: String,
    pub stop: String,
    pub kill: String,
    pub restart: String,
    pub status: String,
    pub get_console: String,
    pub send_command: String,
    pub delete: String,
}

impl Scripts {
    /// Fills every empty template from `other`. Templates already set win.
    pub fn merge_missing(&mut self, other: &Scripts) {
        fill(&mut self.install, &other.install);
        fill(&mut self.reinstall, &other.reinstall);
        fill(&mut self.update, &other.update);
        fill(&mut self.start, &other.start);
        fill(&mut self.pause, &other.pause);
        fill(&mut self.unpause, &other.unpause);
        fill(&mut self.stop, &other.stop);
        fill(&mut self.kill, &other.kill);
        fill(&mut self.restart, &other.restart);
        fill(&mut self.status, &other.status);
        fill(&mut self.get_console, &other.get_console);
        fill(&mut self.send_command, &other.send_command);
        fill(&mut self.delete, &other.delete);
    }

    pub(crate) fn set_by_key(&mut self, key: &str, value: &str) -> bool {
        let slot = match key {
            "install" => &mut self.install,
            "reinstall" => &mut self.reinstall,
            "update" => &mut self.update,
            "start" => &mut self.start,
            "pause" => &mut self.pause,
            "unpause" => &mut self.unpause,
            "stop" => &mut self.stop,
            "kill" => &mut self.kill,
            "restart" => &mut self.restart,
            "status" => &mut self.status,
            "get_console" => &mut self.get_console,
            "send_command" => &mut self.send_command,
            "delete" => &mut self.delete,
            _ => return false,
        };

        *slot = value.to_string();
        true
    }
}

fn fill(target: &mut String, source: &str) {
    if target.is_empty() && !source.is_empty() {
        *target = source.to_string();
    }
}
