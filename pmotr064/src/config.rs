//! # Configuration du client TR-064
//!
//! La configuration est chargée ainsi :
//! - configuration par défaut intégrée (`tr064.yaml`)
//! - fusion avec `config.yaml` du répertoire de configuration s'il existe
//! - clés passées en minuscules
//! - surcharges par variables d'environnement `PMOTR064_CONFIG__SECTION__KEY`
//!
//! ## Usage
//!
//! ```no_run
//! use pmotr064::Tr064Config;
//!
//! let config = Tr064Config::load("")?;
//! println!("Router: {}:{}", config.router.host, config.router.port);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{info, warn};

use crate::client::ClientOptions;
use crate::encryption::{encrypt_password, get_password, is_encrypted};
use crate::invoker::NonceProbe;
use crate::model::Parameter;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("tr064.yaml");

const ENV_CONFIG_DIR: &str = "PMOTR064_CONFIG";
const ENV_PREFIX: &str = "PMOTR064_CONFIG__";
const CONFIG_DIR_NAME: &str = ".pmotr064";
const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouterSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Plain text or `encrypted:...`; use [`Tr064Config::password`] to read it.
    pub password: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamSetting {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeSettings {
    pub service: String,
    pub action: String,
    #[serde(default)]
    pub params: Vec<ParamSetting>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolSettings {
    pub discovery_path: String,
    pub reacquire_nonce: bool,
    #[serde(default)]
    pub nonce_probe: Option<ProbeSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggerSettings {
    pub min_level: String,
}

/// Typed configuration of the TR-064 client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tr064Config {
    pub router: RouterSettings,
    pub tr064: ProtocolSettings,
    pub logger: LoggerSettings,
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Tr064Config {
    /// Finds a config directory by trying different locations in order
    ///
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `PMOTR064_CONFIG` environment variable
    /// 3. `.pmotr064` in the current directory
    /// 4. `.pmotr064` in the user's home directory
    pub fn find_config_dir(directory: &str) -> PathBuf {
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }

        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %env_path, "Trying to load config from env");
            return PathBuf::from(env_path);
        }

        if Path::new(CONFIG_DIR_NAME).exists() {
            return PathBuf::from(CONFIG_DIR_NAME);
        }

        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config;
            }
        }

        PathBuf::from(CONFIG_DIR_NAME)
    }

    /// Loads the configuration from `directory` (or the default locations
    /// when empty), applying environment overrides.
    pub fn load(directory: &str) -> Result<Self> {
        let config_dir = Self::find_config_dir(directory);
        let path = config_dir.join(CONFIG_FILE_NAME);
        info!(config_dir = %config_dir.display(), "Using config directory");

        let external = match fs::read_to_string(&path) {
            Ok(data) => {
                info!(config_file = %path.display(), "Loaded config file");
                Some(data)
            }
            Err(_) => {
                info!(config_file = %path.display(), "Config file not found, using default embedded config");
                None
            }
        };

        let mut value = Self::merged_value(external.as_deref())?;
        apply_env_overrides(&mut value, env::vars());

        let mut config = Self::from_value(value)?;
        config.path = Some(path);
        Ok(config)
    }

    /// Parses a YAML document merged over the embedded defaults, without
    /// environment overrides.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Self::from_value(Self::merged_value(Some(yaml))?)
    }

    fn merged_value(external: Option<&str>) -> Result<Value> {
        let mut value = lower_keys_value(serde_yaml::from_str(DEFAULT_CONFIG)?);
        if let Some(yaml) = external {
            // Keys are lowered before merging so `Router:` overrides `router:`
            let external = lower_keys_value(serde_yaml::from_str(yaml)?);
            merge_yaml(&mut value, &external);
        }
        Ok(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        serde_yaml::from_value(value).map_err(|e| anyhow!("Invalid TR-064 configuration: {}", e))
    }

    /// File this configuration was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the configuration back, with the password encrypted.
    pub fn save(&self) -> Result<()> {
        let path = self
            .path
            .as_ref()
            .ok_or_else(|| anyhow!("Configuration was not loaded from a directory"))?;
        self.save_to(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut stored = self.clone();
        if !stored.router.password.is_empty() && !is_encrypted(&stored.router.password) {
            stored.router.password = encrypt_password(&stored.router.password)?;
        }

        fs::write(path, serde_yaml::to_string(&stored)?)?;
        info!(config_file = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Router password in clear text.
    pub fn password(&self) -> Result<String> {
        get_password(&self.router.password)
    }

    pub fn set_password(&mut self, password: &str) -> Result<()> {
        self.router.password = encrypt_password(password)?;
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        let nonce_probe = match (&self.tr064.nonce_probe, self.tr064.reacquire_nonce) {
            (Some(probe), true) => Some(NonceProbe {
                service: probe.service.clone(),
                action: probe.action.clone(),
                params: probe
                    .params
                    .iter()
                    .map(|p| Parameter::new(p.name.as_str(), p.value.as_str()))
                    .collect(),
            }),
            _ => None,
        };

        ClientOptions {
            discovery_path: self.tr064.discovery_path.clone(),
            nonce_probe,
        }
    }
}

/// Applies `PMOTR064_CONFIG__SECTION__KEY=value` overrides.
///
/// Values are parsed as YAML scalars, except where the current value is a
/// string: `PMOTR064_CONFIG__ROUTER__PASSWORD=1234` stays a string.
fn apply_env_overrides(config: &mut Value, vars: impl IntoIterator<Item = (String, String)>) {
    for (key, raw) in vars {
        let Some(path) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<String> = path.split("__").map(str::to_lowercase).collect();

        let value = match get_value(config, &path) {
            Some(Value::String(_)) => Value::String(raw),
            _ => serde_yaml::from_str::<Value>(&raw).unwrap_or(Value::String(raw)),
        };
        if let Err(e) = set_value(config, &path, value) {
            warn!(key = %key, "Ignoring env override: {}", e);
        }
    }
}

fn get_value<'a>(data: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(data, |current, key| match current {
        Value::Mapping(map) => map.get(Value::String(key.clone())),
        _ => None,
    })
}

fn set_value(data: &mut Value, path: &[String], value: Value) -> Result<()> {
    let Some((key, rest)) = path.split_first() else {
        *data = value;
        return Ok(());
    };

    if let Value::Mapping(map) = data {
        let key = Value::String(key.clone());
        if rest.is_empty() {
            map.insert(key, value);
        } else {
            let entry = map.entry(key).or_insert(Value::Mapping(Mapping::new()));
            set_value(entry, rest, value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lower_keys_value(v))
                })
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

/// Merges `external` into `default`: mappings are merged key by key,
/// scalars and sequences are replaced.
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(),
    }
}
