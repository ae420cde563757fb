use gameap_config::DaemonConfig;

use super::server::Server;

/// Substitutes `{command}` once with the server's own command, then expands short codes.
pub fn make_full_command(
    cfg: &DaemonConfig,
    server: &Server,
    template: &str,
    server_command: &str,
) -> String {
    let command = template.replacen("{command}", server_command, 1);
    replace_short_codes(&command, cfg, server)
}

/// Unknown placeholders are left as they are.
pub fn replace_short_codes(template: &str, cfg: &DaemonConfig, server: &Server) -> String {
    let info = server.info();
    let work_dir = server.work_dir(cfg);

    let replacements: [(&str, String); 14] = [
        ("{dir}", work_dir.to_string_lossy().into_owned()),
        ("{uuid}", info.uuid.clone()),
        ("{uuid_short}", info.uuid_short.clone()),
        ("{id}", info.id.to_string()),
        ("{host}", info.ip.clone()),
        ("{ip}", info.ip.clone()),
        ("{port}", info.connect_port.to_string()),
        ("{query_port}", info.query_port.to_string()),
        ("{rcon_port}", info.rcon_port.to_string()),
        ("{rcon_password}", info.rcon_password.clone()),
        ("{game}", info.game.start_code.clone()),
        ("{user}", info.user.clone()),
        ("{node_work_path}", cfg.work_path.clone()),
        ("{node_tools_path}", cfg.tools_path().to_string_lossy().into_owned()),
    ];

    let mut command = template.to_string();
    for (placeholder, value) in &replacements {
        command = command.replace(placeholder, value);
    }

    for (key, value) in server.vars() {
        command = command.replace(&format!("{{{}}}", key), value);
    }

    command
}
