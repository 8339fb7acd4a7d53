//! Configuration management
//!
//! YAML configuration with:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Fail-fast validation of the keys the certificate workflow cannot run without

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::error::{AppError, AppResult};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "OPENVOX_CERTCTL_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Client identity used to talk to the CA
    pub ssl: SslConfig,
    /// Puppet CA endpoint
    #[serde(alias = "puppetserver")]
    pub ca_server: CaServerConfig,
    /// PuppetDB endpoint (optional, only needed for node commands)
    #[serde(default)]
    pub puppetdb: Option<PuppetDbConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Client SSL configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SslConfig {
    /// Certname of the operator/client identity
    pub client_name: String,
    /// Path to the client certificate (PEM)
    pub client_cert: PathBuf,
    /// Path to the client private key (PEM)
    pub client_key: PathBuf,
    /// Extra trust root for the CA's TLS certificate
    #[serde(default, alias = "ca_cert_path")]
    pub ca_cert: Option<PathBuf>,
    /// Verify server certificates (off by default: Puppet CAs are self-issued)
    #[serde(default)]
    pub verify: bool,
    /// SSL directory override; defaults to the parent of the key's directory
    #[serde(default)]
    pub ssl_dir: Option<PathBuf>,
}

impl SslConfig {
    /// SSL directory holding `private_keys/`, `certificate_request/` and `certs/`
    pub fn effective_ssl_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.ssl_dir {
            return dir.clone();
        }
        self.client_key
            .parent()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// TLS settings for the CA transport
    pub fn tls_settings(&self, timeout_secs: u64) -> TlsSettings {
        TlsSettings {
            client_cert: Some(self.client_cert.clone()),
            client_key: Some(self.client_key.clone()),
            ca_cert: self.ca_cert.clone(),
            verify: self.verify,
            timeout_secs,
        }
    }
}

/// Puppet CA connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaServerConfig {
    #[serde(alias = "server")]
    pub host: String,
    pub port: u16,
    #[serde(default = "default_ca_scheme")]
    pub scheme: String,
    /// Timeout in seconds (supports both timeout_secs and timeout field names)
    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_secs: u64,
}

impl CaServerConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// PuppetDB connection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PuppetDbConfig {
    #[serde(alias = "server")]
    pub host: String,
    #[serde(default = "default_puppetdb_port")]
    pub port: u16,
    #[serde(default = "default_puppetdb_scheme")]
    pub scheme: String,
    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_secs: u64,
    /// Present the client identity to PuppetDB as well
    #[serde(default = "default_use_client_cert")]
    pub use_client_cert: bool,
}

impl PuppetDbConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

/// Everything an HTTP transport needs to build its client
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TlsSettings {
    /// Client certificate, used only together with `client_key` and when both exist
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    /// Additional trusted root
    pub ca_cert: Option<PathBuf>,
    pub verify: bool,
    pub timeout_secs: u64,
}

fn default_ca_scheme() -> String {
    "https".to_string()
}

fn default_puppetdb_scheme() -> String {
    "http".to_string()
}

fn default_puppetdb_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_use_client_cert() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log output target (console or file)
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Enable daily log rotation
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Log to stderr
    #[default]
    Console,
    /// Log to file only
    File,
    /// Log to both stderr and file
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

impl LogFormat {
    fn parse_lenient(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/openvox/certctl")
}

fn default_log_prefix() -> String {
    "openvox-certctl".to_string()
}

fn default_log_rotation() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Order (later overrides earlier):
    /// 1. Configuration file (explicit path, `OPENVOX_CERTCTL_CONFIG`, standard locations)
    /// 2. Environment variables
    ///
    /// There are no built-in defaults for the CA endpoint or the client
    /// identity, so a missing file is a configuration error.
    pub fn load(explicit: Option<&Path>) -> AppResult<Self> {
        // Try to load .env file if it exists
        let _ = dotenvy::dotenv();

        let config_path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(Self::find_config_file)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "no configuration file found (use --config or {})",
                    CONFIG_ENV_VAR
                ))
            })?;

        let mut config = Self::from_file(&config_path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file without environment overrides
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("failed to read config file {:?}: {}", path, e))
        })?;
        Self::from_yaml(&contents)
            .map_err(|e| AppError::Config(format!("{:?}: {}", path, e)))
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(contents: &str) -> AppResult<Self> {
        serde_norway::from_str(contents)
            .map_err(|e| AppError::Config(format!("failed to parse configuration: {}", e)))
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            // Current directory
            PathBuf::from("certctl.yaml"),
            PathBuf::from("config/certctl.yaml"),
            // System config directory
            PathBuf::from("/etc/openvox-certctl/certctl.yaml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("openvox-certctl/certctl.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.is_file())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup` (the process environment in production)
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("PUPPET_CA_HOST") {
            self.ca_server.host = host;
        }
        if let Some(port) = lookup("PUPPET_CA_PORT") {
            if let Ok(p) = port.parse() {
                self.ca_server.port = p;
            }
        }

        if let Some(host) = lookup("PUPPETDB_HOST") {
            let puppetdb = self.puppetdb.get_or_insert_with(|| PuppetDbConfig {
                host: host.clone(),
                port: default_puppetdb_port(),
                scheme: default_puppetdb_scheme(),
                timeout_secs: default_timeout(),
                use_client_cert: default_use_client_cert(),
            });
            puppetdb.host = host;
        }
        if let Some(port) = lookup("PUPPETDB_PORT") {
            if let (Some(puppetdb), Ok(p)) = (self.puppetdb.as_mut(), port.parse::<u16>()) {
                puppetdb.port = p;
            }
        }

        // Logging overrides
        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("OPENVOX_CERTCTL_LOG_FORMAT") {
            self.logging.format = LogFormat::parse_lenient(&format);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.ssl.client_name.trim().is_empty() {
            return Err(AppError::Config("ssl.client_name cannot be empty".to_string()));
        }
        if self.ssl.client_cert.as_os_str().is_empty() {
            return Err(AppError::Config("ssl.client_cert cannot be empty".to_string()));
        }
        if self.ssl.client_key.as_os_str().is_empty() {
            return Err(AppError::Config("ssl.client_key cannot be empty".to_string()));
        }
        if self.ca_server.host.trim().is_empty() {
            return Err(AppError::Config("ca_server.host cannot be empty".to_string()));
        }
        if self.ca_server.port == 0 {
            return Err(AppError::Config("ca_server.port cannot be 0".to_string()));
        }
        if !matches!(self.ca_server.scheme.as_str(), "http" | "https") {
            return Err(AppError::Config(format!(
                "ca_server.scheme must be http or https, got {}",
                self.ca_server.scheme
            )));
        }

        if let Some(ref puppetdb) = self.puppetdb {
            if puppetdb.host.trim().is_empty() {
                return Err(AppError::Config("puppetdb.host cannot be empty".to_string()));
            }
            if puppetdb.port == 0 {
                return Err(AppError::Config("puppetdb.port cannot be 0".to_string()));
            }
        }

        if let Some(ref ca_cert) = self.ssl.ca_cert {
            if !ca_cert.exists() {
                return Err(AppError::Config(format!(
                    "ssl.ca_cert file not found: {:?}",
                    ca_cert
                )));
            }
        }

        Ok(())
    }

    /// TLS settings for the PuppetDB transport
    pub fn puppetdb_tls_settings(&self) -> Option<TlsSettings> {
        self.puppetdb.as_ref().map(|db| {
            let mut settings = self.ssl.tls_settings(db.timeout_secs);
            if !db.use_client_cert {
                settings.client_cert = None;
                settings.client_key = None;
            }
            settings
        })
    }
}
