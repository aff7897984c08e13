use std::{collections::BTreeMap, fs, path::PathBuf};

use directories::BaseDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub rossum_authorization_token: Option<String>,
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
    #[serde(default = "default_commit")]
    pub commit: bool,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub http_timeout_seconds: Option<u64>,
    #[serde(default = "default_master_data_url")]
    pub master_data_url: String,
    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,
    #[serde(default = "default_weather_url")]
    pub weather_url: String,
    #[serde(default = "default_kitten_url")]
    pub kitten_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            rossum_authorization_token: None,
            secrets: BTreeMap::new(),
            commit: default_commit(),
            listen_addr: default_listen_addr(),
            http_timeout_seconds: None,
            master_data_url: default_master_data_url(),
            geocoding_url: default_geocoding_url(),
            weather_url: default_weather_url(),
            kitten_url: default_kitten_url(),
        }
    }
}

impl Config {
    pub fn has_credentials(&self) -> bool {
        self.rossum_authorization_token
            .as_deref()
            .map(str::trim)
            .is_some_and(|token| !token.is_empty())
            && self.base_url.is_some()
    }
}

/// Layers defaults, the TOML file, the two raw variables a local `.env`
/// usually carries, and finally `HOOKKIT_*` overrides.
pub fn load() -> Result<Config> {
    let _ = dotenvy::dotenv();

    let path = config_path()?;
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    if path.exists() {
        figment = figment.merge(Toml::file(&path));
    }

    figment
        .merge(Env::raw().only(&["BASE_URL", "ROSSUM_AUTHORIZATION_TOKEN"]))
        .merge(Env::prefixed("HOOKKIT_").split("__"))
        .extract()
        .map_err(|err| AppError::ConfigLoad(err.to_string()))
}

pub fn save(config: &Config) -> Result<PathBuf> {
    let path = config_path()?;
    let Some(parent) = path.parent() else {
        return Err(AppError::HomeDirUnavailable);
    };

    fs::create_dir_all(parent)
        .map_err(|_| AppError::CreateConfigDir(parent.display().to_string()))?;

    let toml_text = toml::to_string_pretty(config).map_err(|_| AppError::ConfigSerialize)?;
    fs::write(&path, toml_text).map_err(|_| AppError::WriteConfig(path.display().to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(path)
}

pub fn config_path() -> Result<PathBuf> {
    let Some(base_dirs) = BaseDirs::new() else {
        return Err(AppError::HomeDirUnavailable);
    };
    Ok(base_dirs.config_dir().join("hookkit").join("config.toml"))
}

fn default_commit() -> bool {
    true
}

fn default_listen_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_master_data_url() -> String {
    "https://elis.master.r8.lol/svc/master-data-hub/api".to_string()
}

fn default_geocoding_url() -> String {
    "https://nominatim.openstreetmap.org/search.php".to_string()
}

fn default_weather_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_kitten_url() -> String {
    "https://cataas.com/cat".to_string()
}

#[cfg(test)]
mod tests {
    use figment::{
        Figment,
        providers::{Env, Serialized},
    };

    use super::Config;

    #[test]
    fn defaults_commit_and_have_no_credentials() {
        let config = Config::default();
        assert!(config.commit);
        assert!(!config.has_credentials());
        assert!(config.secrets.is_empty());
        assert_eq!(config.http_timeout_seconds, None);
    }

    #[test]
    fn env_overrides_are_layered_over_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("BASE_URL", "https://example.test");
            jail.set_env("ROSSUM_AUTHORIZATION_TOKEN", "abc");
            jail.set_env("HOOKKIT_COMMIT", "false");
            jail.set_env("HOOKKIT_SECRETS__TOKEN", "mdh");

            let config: Config = Figment::from(Serialized::defaults(Config::default()))
                .merge(Env::raw().only(&["BASE_URL", "ROSSUM_AUTHORIZATION_TOKEN"]))
                .merge(Env::prefixed("HOOKKIT_").split("__"))
                .extract()?;

            assert_eq!(config.base_url.as_deref(), Some("https://example.test"));
            assert!(config.has_credentials());
            assert!(!config.commit);
            assert_eq!(config.secrets.get("token").map(String::as_str), Some("mdh"));
            Ok(())
        });
    }
}
