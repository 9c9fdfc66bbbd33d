use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the platform.
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

/// Top-level configuration for the platform and its scheduled commands.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub workflow: WorkflowConfig,
    pub asp: AspConfig,
    pub metabase: MetabaseConfig,
    pub data_path: PathBuf,
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

        let workflow = WorkflowConfig {
            contact_email: env::var("ITOU_EMAIL_CONTACT")
                .unwrap_or_else(|_| WorkflowConfig::DEFAULT_CONTACT_EMAIL.to_string()),
            cancellation_days: parse_number("ITOU_CANCELLATION_DAYS", 4)?,
        };

        let asp_itou_prefix =
            env::var("ASP_ITOU_PREFIX").unwrap_or_else(|_| AspConfig::DEFAULT_PREFIX.to_string());
        if asp_itou_prefix.chars().count() != 5
            || !asp_itou_prefix.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::InvalidAspPrefix(asp_itou_prefix));
        }

        let asp = AspConfig {
            itou_prefix: asp_itou_prefix,
            upload_dir: env::var("ASP_FS_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/asp/upload")),
            download_dir: env::var("ASP_FS_DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/asp/download")),
            max_records_per_batch: parse_number("ASP_FS_MAX_RECORDS_PER_BATCH", 700)?,
            id_salt: env::var("ASP_ID_SALT").unwrap_or_else(|_| "itou-asp".to_string()),
        };

        let metabase = MetabaseConfig {
            insert_batch_size: parse_number("METABASE_INSERT_BATCH_SIZE", 100)?,
            dry_run_rows_per_table: parse_number("METABASE_DRY_RUN_ROWS_PER_TABLE", 1000)?,
            anonymization_salt: env::var("METABASE_HASH_SALT")
                .unwrap_or_else(|_| "itou-metabase".to_string()),
        };

        let data_path = env::var("ITOU_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/itou.json"));

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            workflow,
            asp,
            metabase,
            data_path,
        })
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        Err(_) => Ok(default),
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

/// Job application workflow tunables.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Recipient of manual PASS IAE delivery requests.
    pub contact_email: String,
    /// Number of days after the hiring start during which a hiring can be cancelled.
    pub cancellation_days: i64,
}

impl WorkflowConfig {
    pub const DEFAULT_CONTACT_EMAIL: &'static str = "contact@inclusion.beta.gouv.fr";
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            contact_email: Self::DEFAULT_CONTACT_EMAIL.to_string(),
            cancellation_days: 4,
        }
    }
}

/// ASP numbering and file exchange settings.
#[derive(Debug, Clone)]
pub struct AspConfig {
    pub itou_prefix: String,
    pub upload_dir: PathBuf,
    pub download_dir: PathBuf,
    pub max_records_per_batch: usize,
    /// Salt of the pseudonymous `idItou` sent in employee records.
    pub id_salt: String,
}

impl AspConfig {
    pub const DEFAULT_PREFIX: &'static str = "99999";
}

/// Reporting database build settings.
#[derive(Debug, Clone)]
pub struct MetabaseConfig {
    pub insert_batch_size: usize,
    pub dry_run_rows_per_table: usize,
    pub anonymization_salt: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { name: &'static str, value: String },
    InvalidAspPrefix(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { name, value } => {
                write!(f, "{name} must be a positive number (found '{value}')")
            }
            ConfigError::InvalidAspPrefix(value) => write!(
                f,
                "ASP_ITOU_PREFIX must be 5 alphanumeric characters (found '{value}')"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidAspPrefix(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for name in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "ITOU_EMAIL_CONTACT",
            "ITOU_CANCELLATION_DAYS",
            "ITOU_DATA_PATH",
            "ASP_ITOU_PREFIX",
            "ASP_FS_UPLOAD_DIR",
            "ASP_FS_DOWNLOAD_DIR",
            "ASP_FS_MAX_RECORDS_PER_BATCH",
            "ASP_ID_SALT",
            "METABASE_INSERT_BATCH_SIZE",
            "METABASE_DRY_RUN_ROWS_PER_TABLE",
            "METABASE_HASH_SALT",
        ] {
            env::remove_var(name);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.workflow.cancellation_days, 4);
        assert_eq!(config.asp.itou_prefix, "99999");
        assert_eq!(config.asp.max_records_per_batch, 700);
        assert_eq!(config.metabase.insert_batch_size, 100);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn rejects_malformed_asp_prefix() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ASP_ITOU_PREFIX", "9999");
        match AppConfig::load() {
            Err(ConfigError::InvalidAspPrefix(value)) => assert_eq!(value, "9999"),
            other => panic!("expected prefix error, got {other:?}"),
        }
        reset_env();
    }

    #[test]
    fn rejects_non_numeric_cancellation_window() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("ITOU_CANCELLATION_DAYS", "soon");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidNumber {
                name: "ITOU_CANCELLATION_DAYS",
                ..
            })
        ));
        reset_env();
    }
}
