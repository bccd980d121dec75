use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use camino::Utf8PathBuf;
use config::Config;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

#[derive(Clone, Deserialize, Debug)]
pub struct Settings {
    pub environment: String,
    pub application: ServerSettings,
    pub remote: RemoteSettings,
}

#[derive(Clone, Deserialize, Debug)]
pub struct ServerSettings {
    pub host: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub port: u16,
    pub logs_directory: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub session_idle_timeout_secs: u64,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub reaper_interval_secs: u64,
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", &self.host, &self.port)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_timeout_secs)
    }

    /// At least one second; a zero period would stall the reaper's timer.
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }
}

/// Where the cart, coupon and order collaborators live.
#[derive(Clone, Deserialize, Debug)]
pub struct RemoteSettings {
    pub base_url: String,
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_ms: u64,
    /// Retries for idempotent reads. Mutations and order submissions are sent once.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_read_retries: usize,
}

impl RemoteSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn find_config_dir() -> anyhow::Result<PathBuf> {
    let current_dir =
        std::env::current_dir().context("Failed to determine the current directory.")?;
    let current_dir =
        Utf8PathBuf::try_from(current_dir).context("Could not convert PathBuf to Utf8PathBuf")?;

    let config_dir = current_dir
        .ancestors()
        .map(|p| p.join("config"))
        .find(|p| {
            let base_path = p.join("base.yaml");
            p.is_dir() && base_path.is_file()
        })
        .ok_or_else(|| anyhow::anyhow!("Cannot find config directory!"))?;

    config_dir
        .canonicalize()
        .with_context(|| format!("Could not canonicalize config directory {config_dir}."))
}

pub fn get_config_settings() -> anyhow::Result<Settings> {
    let config_directory = find_config_dir()?;

    // Detect the running environment - default to `development` if unspecified.
    let environment: String =
        std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".to_owned());

    let base_source = config::File::from(config_directory.join("base")).required(true);
    let env_source = config::File::from(config_directory.join(environment.as_str())).required(true);

    // e.g. `APP_REMOTE__BASE_URL=http://localhost:9000` sets `Settings.remote.base_url`.
    let overrides_source = config::Environment::with_prefix("app").separator("__");

    let config = Config::builder()
        .add_source(base_source)
        .add_source(env_source)
        .add_source(overrides_source)
        .set_override("environment", environment)?
        .build()?;

    config
        .try_deserialize()
        .context("Could not deserialise config settings.")
}
