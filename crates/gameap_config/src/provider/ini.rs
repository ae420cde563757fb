//! Flat `key = value` configuration, the legacy daemon format.

use tracing::debug;

use crate::error::ConfigError;
use crate::models::daemon::DaemonConfig;

pub(crate) fn parse(content: &str) -> Result<DaemonConfig, ConfigError> {
    let mut config = DaemonConfig::default();

    for (number, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') || line.starts_with('[')
        {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::invalid_file(
                "failed to parse ini config",
                format!("line {}: missing '='", number + 1),
            ));
        };

        let key = key.trim();
        let value = unquote(value.trim());

        apply(&mut config, key, value).map_err(|e| {
            ConfigError::invalid_file(format!("invalid value for \"{}\"", key), e)
        })?;
    }

    Ok(config)
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("\"{}\" is not a boolean", other)),
    }
}

fn apply(config: &mut DaemonConfig, key: &str, value: &str) -> Result<(), String> {
    match key {
        "ds_id" => config.node_id = value.parse().map_err(|e| format!("{}", e))?,
        "listen_ip" => config.listen_ip = value.to_string(),
        "listen_port" => config.listen_port = value.parse().map_err(|e| format!("{}", e))?,
        "api_host" => config.api_host = value.to_string(),
        "api_key" => config.api_key = value.to_string(),
        "daemon_login" => config.daemon_login = value.to_string(),
        "daemon_password" => config.daemon_password = value.to_string(),
        "password_authentication" => config.password_authentication = parse_bool(value)?,
        "ca_certificate_file" => config.ca_certificate_file = value.to_string(),
        "certificate_chain_file" => config.certificate_chain_file = value.to_string(),
        "private_key_file" => config.private_key_file = value.to_string(),
        "private_key_password" => config.private_key_password = value.to_string(),
        "dh_file" => config.dh_file = value.to_string(),
        "log_level" => config.log_level = value.to_string(),
        "output_log" => config.output_log = value.to_string(),
        "work_path" => config.work_path = value.to_string(),
        "tools_path" => config.tools_path = value.to_string(),
        "steamcmd_path" => config.steamcmd_path = value.to_string(),
        "process_manager" => config.process_manager.name = value.to_string(),
        "connection_timeout" => {
            config.connection_timeout = value.parse().map_err(|e| format!("{}", e))?
        }
        _ => {
            let handled = key
                .strip_prefix("script_")
                .is_some_and(|name| config.scripts.set_by_key(name, value));

            if !handled {
                debug!(log_type = "config", "Ignoring unknown config key \"{}\"", key);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_keys() {
        let content = r#"
; legacy config
ds_id=7
listen_port = 31718
api_host = "panel.local"
api_key=secret
password_authentication = true
script_start = ./start.sh {dir}
unknown_key = whatever
"#;

        let config = parse(content).unwrap();

        assert_eq!(config.node_id, 7);
        assert_eq!(config.listen_port, 31718);
        assert_eq!(config.api_host, "panel.local");
        assert_eq!(config.api_key, "secret");
        assert!(config.password_authentication);
        assert_eq!(config.scripts.start, "./start.sh {dir}");
    }

    #[test]
    fn rejects_invalid_numbers() {
        let err = parse("ds_id = abc\n").unwrap_err();
        assert!(err.to_string().contains("ds_id"));
    }
}
