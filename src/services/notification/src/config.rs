//! Configuration module for the notification service
//!
//! Every section has a `Default` so the service boots with no configuration
//! at all; `from_env` layers an optional file and `NOTIFICATION__*`
//! environment variables on top.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use expo_shared::Channel;

/// Main configuration structure for the notification service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Fan-out limits
    pub dispatch: DispatchConfig,

    /// Email configuration
    pub email: EmailConfig,

    /// SMS configuration
    pub sms: SmsConfig,

    /// In-app dashboard configuration
    pub dashboard: DashboardConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,

    pub audit: AuditConfig,

    /// Scheduling configuration
    pub scheduler: SchedulerConfig,

    /// Builder and lead lookup
    pub directory: DirectoryConfig,

    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Upper bound on in-flight channel attempts across one dispatch
    pub max_concurrent_attempts: usize,
    /// Per-attempt bound; a slower provider call becomes a `Timeout` failure
    pub channel_timeout_ms: u64,
    /// How many finished intents keep a queryable state; oldest drop first
    pub state_retention: usize,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub from_email: String,
    pub from_name: String,
    /// Only used with the `smtp` feature
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_use_starttls: bool,
}

/// SMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub enabled: bool,
    pub sender_id: String,
    /// Latency of the simulated gateway
    pub simulated_latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    /// Messages kept per builder inbox; older ones are dropped first
    pub inbox_capacity: usize,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub email_per_minute: u32,
    pub sms_per_minute: u32,
    pub dashboard_per_minute: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub capacity: usize,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub check_interval_seconds: u64,
    /// Due dispatches fired per tick
    pub batch_size: usize,
    /// How many fired schedule ids are remembered for `AlreadyExecuted`
    pub executed_retention: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    /// JSON file with `{"builders": [...], "leads": [...]}`
    pub seed_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub json_logs: bool,
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8086,
            timeout_seconds: 30,
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_attempts: 32,
            channel_timeout_ms: 10_000,
            state_retention: 10_000,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            from_email: std::env::var("FROM_EMAIL")
                .unwrap_or_else(|_| "notifications@expobuild.local".to_string()),
            from_name: std::env::var("FROM_NAME")
                .unwrap_or_else(|_| "ExpoBuild Marketplace".to_string()),
            smtp_host: std::env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|port| port.parse().ok())
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            smtp_use_starttls: true,
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sender_id: "EXPOBUILD".to_string(),
            simulated_latency_ms: 50,
        }
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            inbox_capacity: 200,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            email_per_minute: 600,
            sms_per_minute: 120,
            dashboard_per_minute: 6000,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_seconds: 30,
            batch_size: 100,
            executed_retention: 10_000,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: true,
        }
    }
}

impl NotificationConfig {
    /// Load configuration from environment variables and config file
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(std::env::var("NOTIFICATION_CONFIG_FILE").ok().as_deref())
    }

    /// Defaults, then `file` if given, then `NOTIFICATION__SECTION__KEY` variables
    pub fn load(file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut cfg = config::Config::builder();

        // Start with default configuration
        cfg = cfg.add_source(config::Config::try_from(&NotificationConfig::default())?);

        if let Some(config_file) = file {
            cfg = cfg.add_source(config::File::with_name(config_file).required(false));
        }

        cfg = cfg.add_source(
            config::Environment::with_prefix("NOTIFICATION")
                .separator("__")
                .try_parsing(true),
        );

        cfg.build()?.try_deserialize()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.dispatch.max_concurrent_attempts == 0 {
            return Err("dispatch.max_concurrent_attempts must be greater than 0".to_string());
        }

        if self.dispatch.channel_timeout_ms == 0 {
            return Err("dispatch.channel_timeout_ms must be greater than 0".to_string());
        }

        if self.audit.capacity == 0 {
            return Err("audit.capacity must be greater than 0".to_string());
        }

        if self.email.enabled && self.email.from_email.trim().is_empty() {
            return Err("From email is required when email is enabled".to_string());
        }

        if self.dashboard.enabled && self.dashboard.inbox_capacity == 0 {
            return Err("dashboard.inbox_capacity must be greater than 0".to_string());
        }

        if self.scheduler.enabled && self.scheduler.check_interval_seconds == 0 {
            return Err("scheduler.check_interval_seconds must be greater than 0".to_string());
        }

        if self.rate_limit.enabled {
            for channel in Channel::ALL {
                if self.rate_limit.per_minute(channel) == 0 {
                    return Err(format!("rate_limit.{}_per_minute must be greater than 0", channel));
                }
            }
        }

        Ok(())
    }

    /// Get timeout duration for the specified operation
    pub fn get_timeout(&self, operation: &str) -> Duration {
        match operation {
            "channel" => Duration::from_millis(self.dispatch.channel_timeout_ms),
            "server" => Duration::from_secs(self.server.timeout_seconds),
            "scheduler" => Duration::from_secs(self.scheduler.check_interval_seconds),
            _ => Duration::from_secs(30),
        }
    }

    /// Check if a channel is enabled
    pub fn is_channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email.enabled,
            Channel::Sms => self.sms.enabled,
            Channel::Dashboard => self.dashboard.enabled,
        }
    }
}

impl RateLimitConfig {
    pub fn per_minute(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Email => self.email_per_minute,
            Channel::Sms => self.sms_per_minute,
            Channel::Dashboard => self.dashboard_per_minute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = NotificationConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8086);
        assert_eq!(config.audit.capacity, 1000);
        assert!(config.is_channel_enabled(Channel::Email));
        assert!(config.is_channel_enabled(Channel::Dashboard));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = NotificationConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = NotificationConfig::default();
        config.audit.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = NotificationConfig::default();
        config.email.from_email = "  ".to_string();
        assert!(config.validate().is_err());
        config.email.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_getter() {
        let config = NotificationConfig::default();
        assert_eq!(config.get_timeout("channel"), Duration::from_secs(10));
        assert_eq!(config.get_timeout("unknown"), Duration::from_secs(30));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"audit": {{"capacity": 25}}, "dispatch": {{"channel_timeout_ms": 500}}}}"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = NotificationConfig::load(Some(&path)).unwrap();
        assert_eq!(config.audit.capacity, 25);
        assert_eq!(config.dispatch.channel_timeout_ms, 500);
        assert_eq!(config.server.port, 8086);
    }
}
