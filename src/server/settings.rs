use config::{Config, ConfigError};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::server::tags::TagBridgeOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub cluster: ClusterSettings,
    #[serde(default)]
    pub pending_errors: PendingErrorSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RegistrySettings {
    /// Host (and port) under which this registry is reachable, e.g. "registry.local:5000".
    /// History entries on this host are never treated as upstream candidates.
    #[serde(default)]
    pub local_hostname: String,

    /// When enabled, every tagged image is visible regardless of whether the
    /// registry manages it
    #[serde(default = "default_pullthrough")]
    pub pullthrough: bool,

    /// How often a tag or untag is retried after the cluster reports a write conflict
    #[serde(default = "default_conflict_retries")]
    pub conflict_retries: u32,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            local_hostname: String::new(),
            pullthrough: default_pullthrough(),
            conflict_retries: default_conflict_retries(),
        }
    }
}

impl RegistrySettings {
    pub fn tag_bridge_options(&self) -> TagBridgeOptions {
        TagBridgeOptions {
            pullthrough: self.pullthrough,
            conflict_retries: self.conflict_retries,
        }
    }
}

fn default_pullthrough() -> bool {
    true
}

fn default_conflict_retries() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClusterSettings {
    /// Path to a kubeconfig file; in-cluster or default configuration is inferred when unset
    #[serde(default)]
    pub kubeconfig: Option<String>,

    #[serde(default = "default_api_group")]
    pub api_group: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            api_group: default_api_group(),
            api_version: default_api_version(),
        }
    }
}

fn default_api_group() -> String {
    "image.openshift.io".to_string()
}

fn default_api_version() -> String {
    "v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PendingErrorSettings {
    #[serde(default = "default_pending_ttl_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_pending_max_capacity")]
    pub max_capacity: u64,
}

impl Default for PendingErrorSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_pending_ttl_secs(),
            max_capacity: default_pending_max_capacity(),
        }
    }
}

impl PendingErrorSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_pending_ttl_secs() -> u64 {
    300
}

fn default_pending_max_capacity() -> u64 {
    10_000
}

impl Settings {
    /// Replace ${VAR_NAME} or ${VAR_NAME:-default} with environment variable values
    fn substitute_env_vars_in_string(s: &str) -> String {
        lazy_static::lazy_static! {
            static ref ENV_VAR: regex::Regex =
                regex::Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").unwrap();
        }

        ENV_VAR
            .replace_all(s, |caps: &regex::Captures| {
                let var_name = &caps[1];
                let default_value = caps.get(2).map(|m| m.as_str());

                match env::var(var_name) {
                    Ok(val) => val,
                    Err(_) => default_value.unwrap_or("").to_string(),
                }
            })
            .to_string()
    }

    /// Convert a config::Value to a serde_json::Value, substituting environment
    /// variables in strings
    fn config_value_to_json(value: &config::Value) -> serde_json::Value {
        use config::ValueKind;

        match &value.kind {
            ValueKind::Nil => serde_json::Value::Null,
            ValueKind::Boolean(b) => serde_json::Value::Bool(*b),
            ValueKind::I64(i) => serde_json::Value::Number((*i).into()),
            ValueKind::I128(i) => serde_json::Value::Number((*i as i64).into()),
            ValueKind::U64(u) => serde_json::Value::Number((*u).into()),
            ValueKind::U128(u) => serde_json::Value::Number((*u as u64).into()),
            ValueKind::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ValueKind::String(s) => {
                serde_json::Value::String(Self::substitute_env_vars_in_string(s))
            }
            ValueKind::Table(table) => {
                let mut map = serde_json::Map::new();
                for (k, v) in table.iter() {
                    map.insert(k.clone(), Self::config_value_to_json(v));
                }
                serde_json::Value::Object(map)
            }
            ValueKind::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(Self::config_value_to_json).collect())
            }
        }
    }

    /// Add `<config_dir>/<name>.{toml,yaml,yml}` to the builder if present.
    /// Returns Ok(false) if no file was found and it is not required.
    fn try_add_config_file(
        builder: &mut config::ConfigBuilder<config::builder::DefaultState>,
        config_dir: &str,
        name: &str,
        required: bool,
    ) -> Result<bool, ConfigError> {
        for ext in ["toml", "yaml", "yml"] {
            let path = format!("{}/{}.{}", config_dir, name, ext);
            if std::path::Path::new(&path).exists() {
                tracing::info!("Loading config file: {}", path);
                *builder = builder
                    .clone()
                    .add_source(config::File::with_name(&format!("{}/{}", config_dir, name)));
                return Ok(true);
            }
        }

        if required {
            Err(ConfigError::Message(format!(
                "Required config file not found: {}/{}.{{toml,yaml,yml}}",
                config_dir, name
            )))
        } else {
            tracing::debug!(
                "Optional config file not found: {}/{}.{{toml,yaml,yml}}",
                config_dir,
                name
            );
            Ok(false)
        }
    }

    pub fn new() -> Result<Self, ConfigError> {
        let run_mode =
            env::var("TAG_BRIDGE_CONFIG_RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("TAG_BRIDGE_CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let mut builder = Config::builder();
        Self::try_add_config_file(&mut builder, &config_dir, "default", true)?;
        Self::try_add_config_file(&mut builder, &config_dir, &run_mode, false)?;
        Self::try_add_config_file(&mut builder, &config_dir, "local", false)?;

        let config = builder.build()?;
        let root_value = config
            .cache
            .into_table()
            .map_err(|e| ConfigError::Message(format!("Failed to get config table: {}", e)))?;

        let mut json_map = serde_json::Map::new();
        for (k, v) in root_value.iter() {
            json_map.insert(k.clone(), Self::config_value_to_json(v));
        }

        let mut unused_fields = Vec::new();
        let mut settings: Settings =
            serde_ignored::deserialize(serde_json::Value::Object(json_map), |path| {
                unused_fields.push(path.to_string());
            })
            .map_err(|e| ConfigError::Message(format!("Failed to deserialize settings: {}", e)))?;

        for field in &unused_fields {
            tracing::warn!("Unknown configuration field in config: {}", field);
        }

        // KUBECONFIG follows the usual kubectl convention and wins over the config files
        if let Ok(kubeconfig) = env::var("KUBECONFIG") {
            if !kubeconfig.is_empty() {
                settings.cluster.kubeconfig = Some(kubeconfig);
            }
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.api_group.is_empty() || self.cluster.api_version.is_empty() {
            return Err(ConfigError::Message(
                "cluster.api_group and cluster.api_version must not be empty".to_string(),
            ));
        }
        if self.registry.local_hostname.contains('/') {
            return Err(ConfigError::Message(format!(
                "registry.local_hostname must be a host name with optional port, got '{}'",
                self.registry.local_hostname
            )));
        }
        if self.pending_errors.ttl_secs == 0 {
            return Err(ConfigError::Message(
                "pending_errors.ttl_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
