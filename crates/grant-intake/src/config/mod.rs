use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::workflows::checklist::{LibraryError, RequirementsLibrary};
use crate::workflows::intake::{IntakePolicy, RecencyPolicy};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub intake: IntakeConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            intake: IntakeConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Intake dials: where the requirements library lives, when a classification is trusted, and how
/// old proof-of-address evidence may be.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeConfig {
    pub requirements_path: Option<PathBuf>,
    pub trust_threshold: f32,
    pub recency: RecencyPolicy,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            requirements_path: None,
            trust_threshold: IntakePolicy::DEFAULT_TRUST_THRESHOLD,
            recency: RecencyPolicy::default(),
        }
    }
}

impl IntakeConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let requirements_path = env::var("APP_REQUIREMENTS_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        let trust_threshold = match env::var("APP_TRUST_THRESHOLD") {
            Ok(raw) => {
                let parsed = raw
                    .trim()
                    .parse::<f32>()
                    .map_err(|_| ConfigError::InvalidTrustThreshold)?;
                if !(parsed > 0.0 && parsed <= 1.0) {
                    return Err(ConfigError::InvalidTrustThreshold);
                }
                parsed
            }
            Err(_) => defaults.trust_threshold,
        };

        let recency = RecencyPolicy {
            utility_bill_days: days_var("APP_RECENCY_UTILITY_DAYS", defaults.recency.utility_bill_days)?,
            insurance_days: days_var("APP_RECENCY_INSURANCE_DAYS", defaults.recency.insurance_days)?,
            lease_days: days_var("APP_RECENCY_LEASE_DAYS", defaults.recency.lease_days)?,
            license_days: days_var("APP_RECENCY_LICENSE_DAYS", defaults.recency.license_days)?,
        };

        Ok(Self {
            requirements_path,
            trust_threshold,
            recency,
        })
    }

    pub fn policy(&self) -> IntakePolicy {
        IntakePolicy::new(self.trust_threshold, self.recency.clone())
    }

    /// The configured requirements library, or the built-in catalog. A `.csv` path is read as a
    /// program matrix, anything else as the JSON library shape.
    pub fn library(&self) -> Result<RequirementsLibrary, LibraryError> {
        let Some(path) = &self.requirements_path else {
            return Ok(RequirementsLibrary::standard());
        };
        let is_matrix = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_matrix {
            let file = std::fs::File::open(path)?;
            RequirementsLibrary::from_csv_reader(std::io::BufReader::new(file))
        } else {
            RequirementsLibrary::from_path(path)
        }
    }
}

fn days_var(name: &'static str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|days| *days > 0)
            .ok_or(ConfigError::InvalidRecencyWindow { variable: name }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTrustThreshold,
    InvalidRecencyWindow { variable: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTrustThreshold => {
                write!(f, "APP_TRUST_THRESHOLD must be a number in (0, 1]")
            }
            ConfigError::InvalidRecencyWindow { variable } => {
                write!(f, "{variable} must be a positive number of days")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTrustThreshold
            | ConfigError::InvalidRecencyWindow { .. } => None,
        }
    }
}
