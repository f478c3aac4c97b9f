use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::client::ClientOptions;
use crate::connection::{BackoffConfig, Endpoint};

/// Deployment configuration, layered from defaults, `config/` files and
/// `APNS_`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub tls: TlsConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// `production` or `sandbox`; selects the Apple endpoint pair.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Explicit `host:port` override, mainly for gateway simulators.
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// PEM client certificate chain.
    pub cert_path: String,
    /// PEM private key.
    pub key_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_sent_window_size")]
    pub sent_window_size: usize,
    #[serde(default = "default_failed_channel_capacity")]
    pub failed_channel_capacity: usize,
    #[serde(default)]
    pub backoff: BackoffSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackoffSettings {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_backoff_jitter")]
    pub jitter_factor: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackConfig {
    /// Explicit `host:port` override for the feedback service.
    #[serde(default)]
    pub address: Option<String>,
}

fn default_environment() -> String {
    "sandbox".to_string()
}

fn default_sent_window_size() -> usize {
    1000
}

fn default_failed_channel_capacity() -> usize {
    32
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_backoff_jitter() -> f64 {
    0.1
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("gateway.environment", "sandbox")?
            .set_default("client.sent_window_size", 1000i64)?
            .set_default("client.failed_channel_capacity", 32i64)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // APNS_GATEWAY__ENVIRONMENT, APNS_TLS__CERT_PATH, etc.
            .add_source(
                Environment::with_prefix("APNS")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// The endpoint pair selected by `gateway.environment`.
    pub fn endpoint(&self) -> Endpoint {
        if self.gateway.environment.eq_ignore_ascii_case("production") {
            Endpoint::Production
        } else {
            Endpoint::Sandbox
        }
    }

    /// Gateway `host:port`, honoring the explicit override.
    pub fn gateway_address(&self) -> String {
        self.gateway
            .address
            .clone()
            .unwrap_or_else(|| self.endpoint().gateway().to_string())
    }

    /// Feedback `host:port`, honoring the explicit override.
    pub fn feedback_address(&self) -> String {
        self.feedback
            .address
            .clone()
            .unwrap_or_else(|| self.endpoint().feedback().to_string())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            sent_window_size: self.client.sent_window_size,
            failed_channel_capacity: self.client.failed_channel_capacity,
            backoff: BackoffConfig {
                initial_delay_ms: self.client.backoff.initial_delay_ms,
                max_delay_ms: self.client.backoff.max_delay_ms,
                multiplier: self.client.backoff.multiplier,
                jitter_factor: self.client.backoff.jitter_factor,
            },
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            address: None,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            sent_window_size: default_sent_window_size(),
            failed_channel_capacity: default_failed_channel_capacity(),
            backoff: BackoffSettings::default(),
        }
    }
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_backoff_initial_ms(),
            max_delay_ms: default_backoff_max_ms(),
            multiplier: default_backoff_multiplier(),
            jitter_factor: default_backoff_jitter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            gateway: GatewayConfig::default(),
            tls: TlsConfig {
                cert_path: "certs/push.pem".to_string(),
                key_path: "certs/push.key".to_string(),
            },
            client: ClientConfig::default(),
            feedback: FeedbackConfig::default(),
        }
    }

    #[test]
    fn test_default_values() {
        let s = settings();
        assert_eq!(s.client.sent_window_size, 1000);
        assert_eq!(s.client.failed_channel_capacity, 32);
        assert_eq!(s.client.backoff.initial_delay_ms, 1_000);
        assert_eq!(s.gateway.environment, "sandbox");
    }

    #[test]
    fn test_environment_selects_endpoint() {
        let mut s = settings();
        assert_eq!(s.gateway_address(), "gateway.sandbox.push.apple.com:2195");
        assert_eq!(s.feedback_address(), "feedback.sandbox.push.apple.com:2196");

        s.gateway.environment = "Production".to_string();
        assert_eq!(s.gateway_address(), "gateway.push.apple.com:2195");
        assert_eq!(s.feedback_address(), "feedback.push.apple.com:2196");
    }

    #[test]
    fn test_address_override_wins() {
        let mut s = settings();
        s.gateway.address = Some("localhost:12195".to_string());
        s.feedback.address = Some("localhost:12196".to_string());
        assert_eq!(s.gateway_address(), "localhost:12195");
        assert_eq!(s.feedback_address(), "localhost:12196");
    }

    #[test]
    fn test_client_options_mapping() {
        let mut s = settings();
        s.client.sent_window_size = 50;
        s.client.backoff.max_delay_ms = 5_000;

        let options = s.client_options();
        assert_eq!(options.sent_window_size, 50);
        assert_eq!(options.backoff.max_delay_ms, 5_000);
        assert_eq!(options.backoff.initial_delay_ms, 1_000);
    }
}
