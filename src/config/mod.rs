//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, GlobalOverrides, ResolveArgs};

use std::{collections::HashSet, num::NonZeroU32, str::FromStr, sync::Arc};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::registry::{SettingRegistry, SettingType};
use crate::domain::entities::SiteRecord;
use crate::domain::types::ScopeKind;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scoped-settings";
const ENV_PREFIX: &str = "SCOPED_SETTINGS";
const DEFAULT_SITE_PORT: u16 = 80;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub sites: Vec<SiteRecord>,
    pub registry: Arc<SettingRegistry>,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

impl LoadError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
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

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    sites: Vec<RawSiteSettings>,
    settings: Vec<RawSettingDefinition>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            sites,
            settings,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let sites = build_sites(sites)?;
        let registry = build_registry(settings)?;

        Ok(Self {
            logging,
            database,
            sites,
            registry: Arc::new(registry),
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_connections)
        .ok_or_else(|| LoadError::invalid("database.max_connections", "must be greater than zero"))?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_sites(sites: Vec<RawSiteSettings>) -> Result<Vec<SiteRecord>, LoadError> {
    let mut seen = HashSet::new();
    let mut default_count = 0;
    let mut records = Vec::with_capacity(sites.len());

    for (index, raw) in sites.into_iter().enumerate() {
        let hostname = required(raw.hostname, || format!("sites[{index}].hostname"))?;
        let port = raw.port.unwrap_or(DEFAULT_SITE_PORT);
        if port == 0 {
            return Err(LoadError::invalid(
                format!("sites[{index}].port"),
                "must be greater than zero",
            ));
        }

        let mut site = SiteRecord::new(hostname, port);
        if !seen.insert((site.hostname.clone(), site.port)) {
            return Err(LoadError::invalid(
                format!("sites[{index}]"),
                format!("duplicate site {}:{}", site.hostname, site.port),
            ));
        }
        if let Some(name) = raw.site_name {
            site = site.with_name(name);
        }
        if raw.is_default_site.unwrap_or(false) {
            default_count += 1;
            site = site.as_default();
        }
        records.push(site);
    }

    if default_count > 1 {
        return Err(LoadError::invalid(
            "sites",
            "at most one site may set `is_default_site`",
        ));
    }

    Ok(records)
}

fn build_registry(definitions: Vec<RawSettingDefinition>) -> Result<SettingRegistry, LoadError> {
    let mut registry = SettingRegistry::new();

    for (index, raw) in definitions.into_iter().enumerate() {
        let namespace = required(raw.namespace, || format!("settings[{index}].namespace"))?;
        if namespace.contains('.') {
            return Err(LoadError::invalid(
                format!("settings[{index}].namespace"),
                "must not contain `.`",
            ));
        }
        let type_name = required(raw.type_name, || format!("settings[{index}].type_name"))?;
        let scope = required(raw.scope, || format!("settings[{index}].scope"))?;
        let scope = ScopeKind::from_str(&scope).map_err(|err| {
            LoadError::invalid(format!("settings[{index}].scope"), err.to_string())
        })?;

        let mut setting = SettingType::new(namespace, type_name, scope)
            .with_defaults(raw.defaults.unwrap_or_default());
        if let Some(verbose_name) = raw.verbose_name {
            setting = setting.with_verbose_name(verbose_name);
        }

        registry
            .register(setting)
            .map_err(|err| LoadError::invalid(format!("settings[{index}]"), err.to_string()))?;
    }

    Ok(registry)
}

fn required(value: Option<String>, key: impl FnOnce() -> String) -> Result<String, LoadError> {
    match value.map(|value| value.trim().to_string()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(LoadError::invalid(key(), "must be set")),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    hostname: Option<String>,
    port: Option<u16>,
    site_name: Option<String>,
    is_default_site: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettingDefinition {
    namespace: Option<String>,
    type_name: Option<String>,
    scope: Option<String>,
    verbose_name: Option<String>,
    defaults: Option<Map<String, Value>>,
}
