//! Configuration for the email service.

use acton_dispatch::DispatcherConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Deserialize)]
pub struct EmailServiceConfig {
    /// SMTP configuration.
    pub smtp: SmtpConfig,
    /// Mail dispatcher configuration.
    #[serde(default = "default_dispatch")]
    pub dispatch: DispatcherConfig,
    /// Service configuration.
    #[serde(default)]
    pub service: ServiceConfig,
}

/// SMTP configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// SMTP username (optional).
    pub username: Option<String>,
    /// SMTP password (optional).
    pub password: Option<String>,
    /// Use STARTTLS.
    #[serde(default = "default_tls")]
    pub tls: bool,
    /// Default from address.
    pub from_address: Option<String>,
    /// Default from name.
    pub from_name: Option<String>,
}

/// Service network configuration.
#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// How long shutdown waits for in-flight mail before giving up.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl ServiceConfig {
    /// Shutdown deadline as a [`Duration`].
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    50055
}

const fn default_smtp_port() -> u16 {
    587
}

const fn default_tls() -> bool {
    true
}

const fn default_shutdown_timeout_secs() -> u64 {
    30
}

/// Mail is attempted once by default; retries are opt-in.
fn default_dispatch() -> DispatcherConfig {
    DispatcherConfig::default().with_retry_count(1)
}

impl EmailServiceConfig {
    /// Configuration sources in precedence order.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Toml::file("config/local.toml"))
            .merge(Env::prefixed("EMAIL_SERVICE_").split("__"))
    }

    /// Load configuration from files and environment.
    ///
    /// # Errors
    ///
    /// Returns error if configuration cannot be loaded or parsed.
    pub fn load() -> anyhow::Result<Self> {
        let config: Self = Self::figment().extract()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acton_dispatch::RetryOn;

    #[test]
    fn test_default_service_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 50055);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_mail_attempts_once_by_default() {
        assert_eq!(default_dispatch().retry_count, 1);
    }

    #[test]
    fn test_load_layers_env_over_files() {
        figment::Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/default.toml",
                r#"
                [smtp]
                host = "smtp.example.com"

                [dispatch]
                worker_count = 2
                retry_count = 3
                retry_on = "rate_limited"
                "#,
            )?;
            jail.set_env("EMAIL_SERVICE_SMTP__PORT", "2525");
            jail.set_env("EMAIL_SERVICE_DISPATCH__QUEUE_CAPACITY", "7");

            let config = EmailServiceConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.smtp.host, "smtp.example.com");
            assert_eq!(config.smtp.port, 2525);
            assert!(config.smtp.tls);
            assert_eq!(config.dispatch.worker_count, 2);
            assert_eq!(config.dispatch.retry_count, 3);
            assert_eq!(config.dispatch.queue_capacity, 7);
            assert_eq!(config.dispatch.retry_on, RetryOn::RateLimited);
            assert_eq!(config.service.port, 50055);
            Ok(())
        });
    }

    #[test]
    fn test_missing_smtp_section_fails() {
        figment::Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file("config/default.toml", "[service]\nport = 1\n")?;
            assert!(EmailServiceConfig::load().is_err());
            Ok(())
        });
    }
}
