use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Game {
    pub code: String,
    pub start_code: String,
    pub name: String,
    pub engine: String,
    pub engine_version: String,
    #[serde(deserialize_with = "string_or_null")]
    pub steam_app_set_config: String,
    #[serde(deserialize_with = "string_or_null")]
    pub remote_repository: String,
    #[serde(deserialize_with = "string_or_null")]
    pub local_repository: String,
    #[serde(deserialize_with = "steam_app_id")]
    pub steam_app_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GameMod {
    pub id: u64,
    pub name: String,
    #[serde(deserialize_with = "string_or_null")]
    pub remote_repository: String,
    #[serde(deserialize_with = "string_or_null")]
    pub local_repository: String,
    #[serde(deserialize_with = "string_or_null")]
    pub default_start_cmd_linux: String,
    #[serde(deserialize_with = "string_or_null")]
    pub default_start_cmd_windows: String,
    #[serde(deserialize_with = "game_mod_vars")]
    pub vars: Vec<GameModVar>,
}

/// Variable declared by a game mod, with the value used when the server does not set one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameModVar {
    pub key: String,
    pub default_value: String,
}

/// The panel sends the app id either as a number or as a numeric string.
fn steam_app_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match JsonValue::deserialize(deserializer)? {
        JsonValue::Number(n) => Ok(n.as_u64().unwrap_or(0)),
        JsonValue::String(s) if s.trim().is_empty() => Ok(0),
        JsonValue::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
        _ => Ok(0),
    }
}

pub(crate) fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn game_mod_vars<'de, D>(deserializer: D) -> Result<Vec<GameModVar>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct RawVar {
        #[serde(rename = "var", default)]
        key: String,
        #[serde(default)]
        default: JsonValue,
    }

    let raw = Option::<Vec<RawVar>>::deserialize(deserializer)?.unwrap_or_default();

    Ok(raw
        .into_iter()
        .map(|v| GameModVar {
            key: v.key,
            default_value: default_to_string(&v.default),
        })
        .collect())
}

fn default_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => i.to_string(),
            None => n.as_f64().map(|f| (f as i64).to_string()).unwrap_or_default(),
        },
        JsonValue::Bool(true) => "1".to_string(),
        JsonValue::Bool(false) => "0".to_string(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steam_app_id_from_string_or_number() {
        let game: Game = serde_json::from_str(r#"{"code":"cstrike","steam_app_id":"90"}"#).unwrap();
        assert_eq!(game.steam_app_id, 90);

        let game: Game = serde_json::from_str(r#"{"steam_app_id":740,"remote_repository":null}"#).unwrap();
        assert_eq!(game.steam_app_id, 740);
        assert!(game.remote_repository.is_empty());
    }

    #[test]
    fn mod_var_defaults_become_strings() {
        let game_mod: GameMod = serde_json::from_str(
            r#"{"id":2,"vars":[
                {"var":"default_map","default":"de_dust2"},
                {"var":"maxplayers","default":32},
                {"var":"fps","default":1000.0},
                {"var":"sv_lan","default":false},
                {"var":"empty","default":null}
            ]}"#,
        )
        .unwrap();

        let values: Vec<_> = game_mod
            .vars
            .iter()
            .map(|v| (v.key.as_str(), v.default_value.as_str()))
            .collect();

        assert_eq!(
            values,
            vec![
                ("default_map", "de_dust2"),
                ("maxplayers", "32"),
                ("fps", "1000"),
                ("sv_lan", "0"),
                ("empty", ""),
            ]
        );
    }
}
