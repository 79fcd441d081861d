//! Configuration loading and resolution
//!
//! Every setting is resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Blank values are treated as absent at every tier.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default HTTP listen port
pub const DEFAULT_PORT: u16 = 3001;
/// Default frontend origin (CORS + checkout redirects)
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";
/// Default chat model for suggestion generation
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
/// Default Replicate model version (LLaVA 13B vision model)
pub const DEFAULT_REPLICATE_MODEL_VERSION: &str =
    "80537f9eead1a5bfa72d5ac6ea6414379be41d4d4f6679fd776e9535d1eb58bb";
/// Default Supabase Storage bucket for uploaded scan images
pub const DEFAULT_STORAGE_BUCKET: &str = "face-scans";
/// Default log level directive
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// File name under the platform config directory
const CONFIG_FILE_NAME: &str = "faceup-api.toml";
/// Environment variable naming an explicit TOML config path
pub const CONFIG_PATH_ENV: &str = "FACEUP_CONFIG";

/// Optional settings read from the TOML config file
///
/// Field names mirror the environment variable names in lower case.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub port: Option<u16>,
    pub frontend_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub replicate_api_key: Option<String>,
    pub replicate_model_version: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_monthly_price_id: Option<String>,
    pub stripe_yearly_price_id: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_service_role_key: Option<String>,
    pub supabase_storage_bucket: Option<String>,
    pub database_path: Option<PathBuf>,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub database_path: Option<PathBuf>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub frontend_url: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub replicate_api_key: Option<String>,
    pub replicate_model_version: String,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_monthly_price_id: Option<String>,
    pub stripe_yearly_price_id: Option<String>,
    pub supabase_url: String,
    pub supabase_service_role_key: String,
    pub supabase_storage_bucket: String,
    pub database_path: PathBuf,
}

impl ServiceConfig {
    /// Resolve configuration from the process environment
    pub fn resolve(cli: &CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        Self::resolve_with(|key| std::env::var(key).ok(), cli, toml_config)
    }

    /// Resolve configuration using `lookup` as the environment source
    ///
    /// Fails with [`Error::Config`] when the Supabase credentials are absent.
    pub fn resolve_with<F>(lookup: F, cli: &CliOverrides, toml_config: &TomlConfig) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).and_then(non_blank);

        let port = match cli.port {
            Some(port) => port,
            None => match env("PORT") {
                Some(raw) => raw
                    .trim()
                    .parse::<u16>()
                    .map_err(|e| Error::Config(format!("Invalid PORT '{}': {}", raw, e)))?,
                None => toml_config.port.unwrap_or(DEFAULT_PORT),
            },
        };

        let pick = |key: &str, from_toml: &Option<String>| -> Option<String> {
            env(key).or_else(|| from_toml.clone().and_then(non_blank))
        };

        let supabase_url = pick("SUPABASE_URL", &toml_config.supabase_url);
        let supabase_service_role_key =
            pick("SUPABASE_SERVICE_ROLE_KEY", &toml_config.supabase_service_role_key);

        let (supabase_url, supabase_service_role_key) =
            match (supabase_url, supabase_service_role_key) {
                (Some(url), Some(key)) => (url.trim_end_matches('/').to_string(), key),
                _ => {
                    return Err(Error::Config(
                        "Supabase credentials not configured. Set both SUPABASE_URL and \
                         SUPABASE_SERVICE_ROLE_KEY (environment, .env, or TOML config)"
                            .to_string(),
                    ))
                }
            };

        let database_path = cli
            .database_path
            .clone()
            .or_else(|| env("FACEUP_DATABASE").map(PathBuf::from))
            .or_else(|| toml_config.database_path.clone())
            .unwrap_or_else(default_database_path);

        let config = Self {
            port,
            frontend_url: pick("FRONTEND_URL", &toml_config.frontend_url)
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            openai_api_key: pick("OPENAI_API_KEY", &toml_config.openai_api_key),
            openai_model: pick("OPENAI_MODEL", &toml_config.openai_model)
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            replicate_api_key: pick("REPLICATE_API_KEY", &toml_config.replicate_api_key),
            replicate_model_version: pick(
                "REPLICATE_MODEL_VERSION",
                &toml_config.replicate_model_version,
            )
            .unwrap_or_else(|| DEFAULT_REPLICATE_MODEL_VERSION.to_string()),
            stripe_secret_key: pick("STRIPE_SECRET_KEY", &toml_config.stripe_secret_key),
            stripe_webhook_secret: pick("STRIPE_WEBHOOK_SECRET", &toml_config.stripe_webhook_secret),
            stripe_monthly_price_id: pick(
                "STRIPE_MONTHLY_PRICE_ID",
                &toml_config.stripe_monthly_price_id,
            ),
            stripe_yearly_price_id: pick("STRIPE_YEARLY_PRICE_ID", &toml_config.stripe_yearly_price_id),
            supabase_url,
            supabase_service_role_key,
            supabase_storage_bucket: pick(
                "SUPABASE_STORAGE_BUCKET",
                &toml_config.supabase_storage_bucket,
            )
            .unwrap_or_else(|| DEFAULT_STORAGE_BUCKET.to_string()),
            database_path,
        };

        config.warn_missing_providers();
        Ok(config)
    }

    /// Provider keys are optional at startup; calls fail at request time instead
    fn warn_missing_providers(&self) {
        if self.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not configured - every scan will fail at suggestion generation");
        }
        if self.replicate_api_key.is_none() {
            warn!("REPLICATE_API_KEY not configured - face analysis will use fallback defaults");
        }
        if self.stripe_secret_key.is_none() {
            warn!("STRIPE_SECRET_KEY not configured - billing endpoints will return errors");
        }
        if self.stripe_webhook_secret.is_none() {
            warn!("STRIPE_WEBHOOK_SECRET not configured - all webhook deliveries will be rejected");
        }
    }
}

/// Default tracing directive: `LOG_LEVEL` from the environment, else `info`
///
/// Read before any other configuration so that config loading itself is logged.
pub fn log_directive() -> String {
    std::env::var("LOG_LEVEL")
        .ok()
        .and_then(non_blank)
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

/// Load the TOML config file
///
/// A missing file is not an error: defaults are used and a warning is logged.
/// A file that exists but does not parse is a configuration error.
pub fn load_toml_config(explicit_path: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit_path {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::var(CONFIG_PATH_ENV)
            .ok()
            .and_then(non_blank)
            .map(PathBuf::from)
            .or_else(default_config_path),
    };

    let Some(path) = path else {
        warn!("Could not determine config directory, using defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!("Config file not found at {}, using environment and defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!("Loaded config file: {}", path.display());
    Ok(config)
}

/// `<config_dir>/faceup/faceup-api.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("faceup").join(CONFIG_FILE_NAME))
}

/// `<data_local_dir>/faceup/faceup.db`, or `./faceup_data/faceup.db`
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("faceup"))
        .unwrap_or_else(|| PathBuf::from("./faceup_data"))
        .join("faceup.db")
}

fn non_blank(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
