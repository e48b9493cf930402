use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Upload ceiling: 50 MiB.
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

pub const DEFAULT_RATE_LIMIT: &str = "60/minute";

pub const DEFAULT_SERVICE_NAME: &str = "MarkItDown Server";

/// Office documents, images and audio the converter understands.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    // documents
    "doc", "docx", "ppt", "pptx", "pdf", "xls", "xlsx", "odt", "ods", "odp", "txt",
    // images
    "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp",
    // audio
    "mp3", "wav", "m4a", "ogg", "flac",
];

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub otlp_endpoint: Option<String>,
    pub upload: UploadConfig,
    pub converter: ConverterConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_file_size: usize,
    pub allowed_extensions: BTreeSet<String>,
    /// Where scoped temp files are created; the OS temp dir when unset.
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub program: String,
    pub args: Vec<String>,
    /// `None` lets a conversion run for as long as the converter needs.
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Raw `<count>/<unit>` string; parsed when the limiter is built.
    pub limit: String,
    /// Key clients by `x-forwarded-for` instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: MAX_FILE_SIZE,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            temp_dir: None,
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "markitdown".to_string(),
            args: Vec::new(),
            timeout: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: DEFAULT_RATE_LIMIT.to_string(),
            trust_forwarded_for: false,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: None,
            upload: UploadConfig::default(),
            converter: ConverterConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env, PORT, WORKERS, LOG_LEVEL)
        let common = core_config::Config::load()?;

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let defaults = UploadConfig::default();
        let upload = UploadConfig {
            max_file_size: match env::var("MAX_FILE_SIZE") {
                Ok(raw) => parse_number("MAX_FILE_SIZE", &raw)?,
                Err(_) => defaults.max_file_size,
            },
            allowed_extensions: match env::var("ALLOWED_EXTENSIONS") {
                Ok(raw) => parse_extensions(&raw),
                Err(_) => defaults.allowed_extensions,
            },
            temp_dir: env::var("TEMP_DIR").ok().map(PathBuf::from),
        };
        if upload.allowed_extensions.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "ALLOWED_EXTENSIONS must name at least one extension"
            )));
        }

        let converter = ConverterConfig {
            program: get_env("CONVERTER_PROGRAM", Some("markitdown"), is_prod)?,
            args: env::var("CONVERTER_ARGS")
                .map(|raw| raw.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            timeout: match env::var("CONVERTER_TIMEOUT_SECS") {
                Ok(raw) => Some(Duration::from_secs(parse_number(
                    "CONVERTER_TIMEOUT_SECS",
                    &raw,
                )?)),
                Err(_) => None,
            },
        };

        let rate_limit = RateLimitConfig {
            enabled: parse_flag(&env::var("ENABLE_RATE_LIMIT").unwrap_or_default()),
            limit: get_env("RATE_LIMIT", Some(DEFAULT_RATE_LIMIT), false)?,
            trust_forwarded_for: parse_flag(&env::var("TRUST_FORWARDED_FOR").unwrap_or_default()),
        };

        Ok(ServiceConfig {
            common,
            environment,
            service_name: get_env("SERVICE_NAME", Some(DEFAULT_SERVICE_NAME), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            upload,
            converter,
            rate_limit,
        })
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// Comma separated list, tolerant of whitespace, leading dots and case.
pub fn parse_extensions(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

pub fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn parse_number<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("Invalid {} '{}': {}", key, raw, e))
    })
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}
