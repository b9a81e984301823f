//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{collections::BTreeMap, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::DEFAULT_LANGUAGE;
use crate::domain::entity::builtin_entity_types;

mod cli;

pub use cli::{
    CliArgs, Command, DeleteArgs, GetArgs, GlobalOverrides, IndexArgs, InvalidateArgs, SaveArgs,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "entity-relay";
const ENV_PREFIX: &str = "ENTITY_RELAY";
const DEFAULT_CACHE_DIRECTORY: &str = ".entity-relay/cache";
const DEFAULT_REMOTE_ENDPOINT: &str = "api";
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub remote: RemoteSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub backend: CacheBackend,
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    File,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "file" => Ok(Self::File),
            other => Err(format!("unknown backend `{other}` (expected memory|file)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub base_url: Option<Url>,
    pub endpoint: String,
    pub timeout: Duration,
    pub default_language: String,
    /// Entity types served by the remote, with an explicit primary key for
    /// types outside the built-in table.
    pub entity_types: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    remote: RawRemoteSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(directory) = overrides.cache_directory.as_ref() {
            self.cache.directory = Some(directory.clone());
        }
        if let Some(url) = overrides.remote_base_url.as_ref() {
            self.remote.base_url = Some(url.clone());
        }
        if let Some(endpoint) = overrides.remote_endpoint.as_ref() {
            self.remote.endpoint = Some(endpoint.clone());
        }
        if let Some(timeout) = overrides.remote_timeout_seconds {
            self.remote.timeout_seconds = Some(timeout);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            remote,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let remote = build_remote_settings(remote)?;

        Ok(Self {
            logging,
            cache,
            remote,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend {
        Some(value) => CacheBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("cache.backend", reason))?,
        None => CacheBackend::File,
    };

    let directory = cache
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIRECTORY));
    if backend == CacheBackend::File && directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.directory",
            "must not be empty when the file backend is selected",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        ttl_seconds: cache.ttl_seconds.unwrap_or(0),
        backend,
        directory,
    })
}

fn build_remote_settings(remote: RawRemoteSettings) -> Result<RemoteSettings, LoadError> {
    let base_url = remote
        .base_url
        .and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .map(|value| {
            Url::parse(&value)
                .map_err(|err| LoadError::invalid("remote.base_url", format!("invalid URL: {err}")))
        })
        .transpose()?;
    if let Some(url) = base_url.as_ref()
        && !matches!(url.scheme(), "http" | "https")
    {
        return Err(LoadError::invalid(
            "remote.base_url",
            format!("unsupported scheme `{}`", url.scheme()),
        ));
    }

    let endpoint = remote
        .endpoint
        .unwrap_or_else(|| DEFAULT_REMOTE_ENDPOINT.to_string())
        .trim()
        .trim_matches('/')
        .to_string();

    let timeout_secs = non_zero_u32(
        remote.timeout_seconds.unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS),
        "remote.timeout_seconds",
    )?;
    let timeout = Duration::from_secs(u64::from(timeout_secs.get()));

    let default_language = remote
        .default_language
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());
    if default_language.is_empty() {
        return Err(LoadError::invalid(
            "remote.default_language",
            "must not be empty",
        ));
    }

    let mut entity_types: BTreeMap<String, Option<String>> = match remote.entity_types {
        Some(types) => types.into_iter().map(|name| (name, None)).collect(),
        None => builtin_entity_types()
            .map(|name| (name.to_string(), None))
            .collect(),
    };
    for (name, key) in remote.primary_keys {
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(LoadError::invalid(
                "remote.primary_keys",
                format!("primary key for `{name}` must not be empty"),
            ));
        }
        entity_types.insert(name, Some(key));
    }
    if entity_types.keys().any(|name| name.trim().is_empty()) {
        return Err(LoadError::invalid(
            "remote.entity_types",
            "entity type names must not be empty",
        ));
    }

    Ok(RemoteSettings {
        base_url,
        endpoint,
        timeout,
        default_language,
        entity_types,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    ttl_seconds: Option<u64>,
    backend: Option<String>,
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRemoteSettings {
    base_url: Option<String>,
    endpoint: Option<String>,
    timeout_seconds: Option<u64>,
    default_language: Option<String>,
    entity_types: Option<Vec<String>>,
    primary_keys: BTreeMap<String, String>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value = u32::try_from(value)
        .map_err(|_| LoadError::invalid(key, "must fit within a 32-bit unsigned integer"))?;
    NonZeroU32::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
