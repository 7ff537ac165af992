use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

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
    pub engine: EngineConfig,
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
            engine: EngineConfig::from_env()?,
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

/// Where user badge records are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    LocalFile(PathBuf),
}

const DEFAULT_STORE_PATH: &str = "badge-store.json";
const DEFAULT_SESSION_IDLE_SECS: u64 = 900;

/// Catalog source, persistence backend, and resolver bound for the progression engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub catalog_path: Option<PathBuf>,
    pub store: StoreBackend,
    pub max_ghost_passes: Option<usize>,
    /// Sessions unused for this long are closed by the server's sweep.
    pub session_idle: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog_path: None,
            store: StoreBackend::Memory,
            max_ghost_passes: None,
            session_idle: Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        }
    }
}

impl EngineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let catalog_path = env::var("BADGE_CATALOG_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let backend = env::var("BADGE_STORE").unwrap_or_else(|_| "memory".to_string());
        let store = match backend.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => StoreBackend::Memory,
            "file" | "local" => {
                let path = env::var("BADGE_STORE_PATH")
                    .unwrap_or_else(|_| DEFAULT_STORE_PATH.to_string());
                StoreBackend::LocalFile(PathBuf::from(path))
            }
            _ => return Err(ConfigError::InvalidStoreBackend(backend)),
        };

        let max_ghost_passes = match env::var("GHOST_MAX_PASSES") {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => Some(value),
                _ => return Err(ConfigError::InvalidPassBound(raw)),
            },
            Err(_) => None,
        };

        let session_idle = match env::var("SESSION_IDLE_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidSessionIdle(raw)),
            },
            Err(_) => Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        };

        Ok(Self {
            catalog_path,
            store,
            max_ghost_passes,
            session_idle,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidStoreBackend(String),
    InvalidPassBound(String),
    InvalidSessionIdle(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidStoreBackend(value) => {
                write!(f, "BADGE_STORE must be 'memory' or 'file' (found '{value}')")
            }
            ConfigError::InvalidPassBound(value) => {
                write!(f, "GHOST_MAX_PASSES must be a positive integer (found '{value}')")
            }
            ConfigError::InvalidSessionIdle(value) => {
                write!(f, "SESSION_IDLE_SECS must be a positive integer (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidStoreBackend(_)
            | ConfigError::InvalidPassBound(_)
            | ConfigError::InvalidSessionIdle(_) => None,
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
        for key in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "BADGE_CATALOG_PATH",
            "BADGE_STORE",
            "BADGE_STORE_PATH",
            "GHOST_MAX_PASSES",
            "SESSION_IDLE_SECS",
        ] {
            env::remove_var(key);
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
        assert_eq!(config.engine, EngineConfig::default());
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
    fn file_backend_uses_default_path() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("BADGE_STORE", "file");
        env::set_var("BADGE_CATALOG_PATH", "catalog.csv");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.engine.store,
            StoreBackend::LocalFile(PathBuf::from(DEFAULT_STORE_PATH))
        );
        assert_eq!(
            config.engine.catalog_path,
            Some(PathBuf::from("catalog.csv"))
        );
        reset_env();
    }

    #[test]
    fn rejects_unknown_backend_and_zero_pass_bound() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("BADGE_STORE", "postgres");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidStoreBackend(value)) if value == "postgres"
        ));

        reset_env();
        env::set_var("GHOST_MAX_PASSES", "0");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidPassBound(_))
        ));
        reset_env();
    }

    #[test]
    fn session_idle_window_is_configurable() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("SESSION_IDLE_SECS", "60");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(config.engine.session_idle, Duration::from_secs(60));

        env::set_var("SESSION_IDLE_SECS", "soon");
        assert!(matches!(
            AppConfig::load(),
            Err(ConfigError::InvalidSessionIdle(value)) if value == "soon"
        ));
        reset_env();
    }
}
