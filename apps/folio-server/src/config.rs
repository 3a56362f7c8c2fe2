//! Configuration management for Folio Server

use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default upload ceiling: 10MB
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed to make cross-origin calls (the web UI)
    pub allowed_origin: String,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub max_upload_bytes: u64,
    pub scratch_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Executable for the external engine
    pub program: Option<String>,
    /// Extra arguments placed before `<input> <output>`
    pub args: Vec<String>,
    pub timeout: Duration,
    pub stderr_policy: StderrPolicy,
    /// Upper bound on conversions running at the same time
    pub max_concurrent: usize,
}

/// Which conversion strategy backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process PDF parse + DOCX assembly
    Library,
    /// External converter program
    External,
}

/// How the external engine treats output on its error channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrPolicy {
    /// Any stderr output fails the conversion, even after a clean exit
    Fatal,
    /// Stderr output is logged and otherwise ignored
    Tolerate,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("CONVERTER_PATH is required when CONVERSION_ENGINE=external")]
    MissingProgram,

    #[error("MAX_CONCURRENT_CONVERSIONS must be at least 1")]
    NoConcurrency,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                allowed_origin: "http://localhost:5173".to_string(),
            },
            upload: UploadConfig {
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
                scratch_dir: PathBuf::from("uploads"),
            },
            engine: EngineConfig {
                kind: EngineKind::Library,
                program: None,
                args: Vec::new(),
                timeout: Duration::from_secs(120),
                stderr_policy: StderrPolicy::Fatal,
                max_concurrent: 4,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let port_source = lookup("SERVER_PORT")
            .map(|value| ("SERVER_PORT", value))
            .or_else(|| lookup("PORT").map(|value| ("PORT", value)));
        let port = match port_source {
            Some((key, value)) => parse_value(key, value)?,
            None => defaults.server.port,
        };

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(value) => parse_value("MAX_UPLOAD_BYTES", value)?,
            None => defaults.upload.max_upload_bytes,
        };

        let kind = match lookup("CONVERSION_ENGINE").as_deref().map(str::trim) {
            None | Some("") => defaults.engine.kind,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "library" => EngineKind::Library,
                "external" => EngineKind::External,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "CONVERSION_ENGINE",
                        value: value.to_string(),
                    })
                }
            },
        };

        let program = lookup("CONVERTER_PATH").filter(|p| !p.trim().is_empty());
        if kind == EngineKind::External && program.is_none() {
            return Err(ConfigError::MissingProgram);
        }

        let args = lookup("CONVERTER_ARGS")
            .map(|raw| raw.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let timeout = match lookup("CONVERTER_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse_value("CONVERTER_TIMEOUT_SECS", value)?),
            None => defaults.engine.timeout,
        };

        let stderr_policy = match lookup("ENGINE_STDERR_POLICY").as_deref().map(str::trim) {
            None | Some("") => defaults.engine.stderr_policy,
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "fatal" => StderrPolicy::Fatal,
                "tolerate" => StderrPolicy::Tolerate,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "ENGINE_STDERR_POLICY",
                        value: value.to_string(),
                    })
                }
            },
        };

        let max_concurrent: usize = match lookup("MAX_CONCURRENT_CONVERSIONS") {
            Some(value) => parse_value("MAX_CONCURRENT_CONVERSIONS", value)?,
            None => defaults.engine.max_concurrent,
        };
        if max_concurrent == 0 {
            return Err(ConfigError::NoConcurrency);
        }

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port,
                allowed_origin: lookup("FRONTEND_URL").unwrap_or(defaults.server.allowed_origin),
            },
            upload: UploadConfig {
                max_upload_bytes,
                scratch_dir: lookup("SCRATCH_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.upload.scratch_dir),
            },
            engine: EngineConfig {
                kind,
                program,
                args,
                timeout,
                stderr_policy,
                max_concurrent,
            },
        })
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}
