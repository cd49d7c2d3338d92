use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    #[serde(default)]
    pub delivery: DeliverySettings,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub templates: TemplateSettings,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_body_limit")]
    pub body_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// Queue, retry and worker tuning
#[derive(Debug, Clone, Deserialize)]
pub struct DeliverySettings {
    /// Failed attempts before a job is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Fraction of each delay removed at random (0.0 - 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
    /// Visibility timeout of a lease
    #[serde(default = "default_lease_timeout")]
    pub lease_timeout_seconds: u64,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Idle sleep between empty lease attempts
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout_seconds: u64,
    /// How long terminal results stay queryable
    #[serde(default = "default_result_retention")]
    pub result_retention_seconds: u64,
    /// How long ledger entries are kept after their last attempt
    #[serde(default = "default_ledger_retention")]
    pub ledger_retention_seconds: u64,
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_seconds: u64,
}

/// TLS mode for the SMTP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SmtpTls {
    /// Plain connection (local relays, test servers)
    None,
    /// Upgrade with STARTTLS
    #[default]
    StartTls,
    /// Implicit TLS (SMTPS)
    Tls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// When disabled, mail is logged instead of sent
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sender mailbox, e.g. `Ara <no-reply@example.com>`
    #[serde(default = "default_smtp_from")]
    pub from: String,
    #[serde(default)]
    pub tls: SmtpTls,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSettings {
    /// Directory of `*.json` template definitions
    pub dir: Option<String>,
    #[serde(default = "default_true")]
    pub include_builtin: bool,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    /// Upper bound on waiting for in-flight jobs
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_body_limit() -> usize {
    256 * 1024
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_backoff_ms() -> u64 {
    1000
}

fn default_max_backoff_ms() -> u64 {
    300_000 // 5 minutes
}

fn default_jitter_factor() -> f64 {
    0.2
}

fn default_lease_timeout() -> u64 {
    60
}

fn default_worker_count() -> usize {
    4
}

fn default_batch_size() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_send_timeout() -> u64 {
    30
}

fn default_result_retention() -> u64 {
    86_400 // 1 day
}

fn default_ledger_retention() -> u64 {
    7 * 86_400 // 1 week
}

fn default_maintenance_interval() -> u64 {
    30
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_from() -> String {
    "Ara <no-reply@localhost>".to_string()
}

fn default_smtp_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "ara-delivery-engine".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_drain_timeout() -> u64 {
    30
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?
            .set_default("delivery.max_attempts", default_max_attempts() as i64)?
            .set_default("delivery.worker_count", default_worker_count() as i64)?
            .set_default("templates.include_builtin", true)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // ARA_SERVER__PORT, ARA_JWT__SECRET, ARA_DELIVERY__MAX_ATTEMPTS, ...
            .add_source(
                Environment::with_prefix("ARA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.delivery;
        if d.max_attempts == 0 {
            return Err(ConfigError::Message(
                "delivery.max_attempts must be at least 1".to_string(),
            ));
        }
        if d.worker_count == 0 || d.batch_size == 0 {
            return Err(ConfigError::Message(
                "delivery.worker_count and delivery.batch_size must be at least 1".to_string(),
            ));
        }
        if d.base_backoff_ms == 0 || d.base_backoff_ms > d.max_backoff_ms {
            return Err(ConfigError::Message(
                "delivery.base_backoff_ms must be between 1 and delivery.max_backoff_ms"
                    .to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&d.jitter_factor) {
            return Err(ConfigError::Message(
                "delivery.jitter_factor must be within 0.0 and 1.0".to_string(),
            ));
        }
        if d.lease_timeout_seconds == 0 {
            return Err(ConfigError::Message(
                "delivery.lease_timeout_seconds must be at least 1".to_string(),
            ));
        }
        // a send must finish while its lease and ledger reservation are held
        if d.send_timeout_seconds == 0 || d.send_timeout_seconds >= d.lease_timeout_seconds {
            return Err(ConfigError::Message(
                "delivery.send_timeout_seconds must be at least 1 and below delivery.lease_timeout_seconds"
                    .to_string(),
            ));
        }
        if self.jwt.secret.is_empty() {
            return Err(ConfigError::Message("jwt.secret must be set".to_string()));
        }
        Ok(())
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
            body_limit: default_body_limit(),
        }
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter_factor: default_jitter_factor(),
            lease_timeout_seconds: default_lease_timeout(),
            worker_count: default_worker_count(),
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            send_timeout_seconds: default_send_timeout(),
            result_retention_seconds: default_result_retention(),
            ledger_retention_seconds: default_ledger_retention(),
            maintenance_interval_seconds: default_maintenance_interval(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            from: default_smtp_from(),
            tls: SmtpTls::default(),
            timeout_seconds: default_smtp_timeout(),
        }
    }
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            dir: None,
            include_builtin: true,
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
            log_format: LogFormat::default(),
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout_seconds: default_drain_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            server: ServerConfig::default(),
            jwt: JwtConfig {
                secret: "secret".to_string(),
                issuer: None,
                audience: None,
            },
            delivery: DeliverySettings::default(),
            smtp: SmtpConfig::default(),
            templates: TemplateSettings::default(),
            otel: OtelConfig::default(),
            shutdown: ShutdownSettings::default(),
        }
    }

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8081);

        let delivery = DeliverySettings::default();
        assert_eq!(delivery.max_attempts, 5);
        assert_eq!(delivery.batch_size, 10);
        assert_eq!(delivery.lease_timeout_seconds, 60);

        let smtp = SmtpConfig::default();
        assert!(!smtp.enabled);
        assert_eq!(smtp.tls, SmtpTls::StartTls);
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(test_settings().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_delivery_values() {
        let mut settings = test_settings();
        settings.delivery.max_attempts = 0;
        assert!(settings.validate().is_err());

        let mut settings = test_settings();
        settings.delivery.jitter_factor = 1.5;
        assert!(settings.validate().is_err());

        let mut settings = test_settings();
        settings.delivery.base_backoff_ms = settings.delivery.max_backoff_ms + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_send_timeout_within_lease() {
        let mut settings = test_settings();
        settings.delivery.lease_timeout_seconds = 5;
        settings.delivery.send_timeout_seconds = 120;
        assert!(settings.validate().is_err());

        settings.delivery.send_timeout_seconds = 5;
        assert!(settings.validate().is_err());

        settings.delivery.send_timeout_seconds = 0;
        assert!(settings.validate().is_err());

        settings.delivery.send_timeout_seconds = 4;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_deserialize_sections() {
        let settings: Settings = Config::builder()
            .add_source(config::File::from_str(
                r#"{
                    "jwt": {"secret": "s"},
                    "delivery": {"max_attempts": 3, "worker_count": 2},
                    "smtp": {"enabled": true, "tls": "tls", "port": 465},
                    "otel": {"log_format": "json"}
                }"#,
                config::FileFormat::Json,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.delivery.max_attempts, 3);
        assert_eq!(settings.delivery.worker_count, 2);
        assert_eq!(settings.delivery.batch_size, 10);
        assert_eq!(settings.smtp.tls, SmtpTls::Tls);
        assert_eq!(settings.smtp.port, 465);
        assert_eq!(settings.otel.log_format, LogFormat::Json);
        assert!(settings.templates.include_builtin);
    }
}
