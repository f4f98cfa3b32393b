//! Configuration for the render service.

use acton_dispatch::DispatcherConfig;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Service configuration.
#[derive(Debug, Deserialize)]
pub struct RenderServiceConfig {
    /// Remote renderer configuration.
    pub renderer: RendererConfig,
    /// Render dispatcher configuration.
    #[serde(default = "default_dispatch")]
    pub dispatch: DispatcherConfig,
    /// Service configuration.
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Remote renderer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
    /// URL the render requests are posted to.
    pub endpoint: String,
    /// Directory rendered documents are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Bearer token sent to the renderer (optional).
    pub api_key: Option<String>,
}

impl RendererConfig {
    /// Request timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
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
    /// How long shutdown waits for in-flight renders before giving up.
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
    50056
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./renders")
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_shutdown_timeout_secs() -> u64 {
    30
}

fn default_dispatch() -> DispatcherConfig {
    DispatcherConfig::default().with_retry_count(3)
}

impl RenderServiceConfig {
    /// Configuration sources in precedence order.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file("config/default.toml"))
            .merge(Toml::file("config/local.toml"))
            .merge(Env::prefixed("RENDER_SERVICE_").split("__"))
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
    fn test_renders_attempt_three_times_by_default() {
        let dispatch = default_dispatch();
        assert_eq!(dispatch.retry_count, 3);
        assert_eq!(dispatch.retry_on, RetryOn::Any);
    }

    #[test]
    fn test_load_with_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("RENDER_SERVICE_RENDERER__ENDPOINT", "http://renderer:8080/pdf");

            let config = RenderServiceConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.renderer.endpoint, "http://renderer:8080/pdf");
            assert_eq!(config.renderer.output_dir, PathBuf::from("./renders"));
            assert_eq!(config.renderer.timeout(), Duration::from_secs(30));
            assert!(config.renderer.api_key.is_none());
            assert_eq!(config.dispatch.retry_count, 3);
            assert_eq!(config.service.port, 50056);
            Ok(())
        });
    }

    #[test]
    fn test_local_file_overrides_default() {
        figment::Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/default.toml",
                r#"
                [renderer]
                endpoint = "http://localhost:3000/render"

                [dispatch]
                retry_delay_ms = 250
                "#,
            )?;
            jail.create_file(
                "config/local.toml",
                r#"
                [renderer]
                output_dir = "/var/lib/renders"
                api_key = "secret"
                "#,
            )?;

            let config = RenderServiceConfig::load().map_err(|e| e.to_string())?;
            assert_eq!(config.renderer.output_dir, PathBuf::from("/var/lib/renders"));
            assert_eq!(config.renderer.api_key.as_deref(), Some("secret"));
            assert_eq!(config.dispatch.retry_delay, Duration::from_millis(250));
            Ok(())
        });
    }
}
