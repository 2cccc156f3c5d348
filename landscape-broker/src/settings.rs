//! `BrokerSettings`: the recognized configuration surface from spec
//! §6.4, loaded the way `ConfigSettings::build` loads settings in
//! `blockscout-service-launcher` -- a config file named by a
//! `LANDSCAPE__CONFIG` environment variable, layered under environment
//! variables prefixed `LANDSCAPE__`, deserialized into `deny_unknown_fields`
//! structs with `serde(default)` per section.

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::de::IgnoredAny;
use serde::Deserialize;
use url::Url;

const ENV_PREFIX: &str = "LANDSCAPE";

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerSettings {
    pub transport: TransportSettings,
    pub pinger: PingerSettings,
    pub identity: IdentitySettings,
    pub rpc: RpcSettings,
    pub tracing: TracingSettings,
    pub data_path: PathBuf,
    pub log_dir: PathBuf,

    // Allows `LANDSCAPE__CONFIG` to name a config file without tripping
    // `deny_unknown_fields` on the `config` key itself.
    #[serde(rename = "config")]
    config_path: IgnoredAny,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        BrokerSettings {
            transport: TransportSettings::default(),
            pinger: PingerSettings::default(),
            identity: IdentitySettings::default(),
            rpc: RpcSettings::default(),
            tracing: TracingSettings::default(),
            data_path: PathBuf::from("/var/lib/landscape"),
            log_dir: PathBuf::from("/var/log/landscape"),
            config_path: IgnoredAny,
        }
    }
}

impl BrokerSettings {
    /// Load settings the way `ConfigSettings::build` does: an optional
    /// `LANDSCAPE__CONFIG`-named file, then environment variables
    /// prefixed `LANDSCAPE__` (double underscore so nested keys like
    /// `transport__url` address `transport.url`), then validate.
    pub fn build() -> anyhow::Result<Self> {
        let config_path = std::env::var(format!("{ENV_PREFIX}__CONFIG"));

        let mut builder = Config::builder();
        if let Ok(config_path) = config_path {
            builder = builder.add_source(File::with_name(&config_path));
        }
        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings: BrokerSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.identity.should_register() && self.identity.registration_password.is_none() {
            tracing::warn!("registering without a registration_password; the server may reject it");
        }
        Ok(())
    }

    /// Export `http_proxy`/`https_proxy` to the process environment,
    /// config values taking precedence over whatever is already set
    /// (spec §9: "config > environment > unset ... do not mutate
    /// environment after that point"). Called once, at startup, before
    /// any HTTP client is built.
    pub fn apply_proxy_env(&self) {
        if let Some(proxy) = &self.transport.http_proxy {
            // SAFETY: called once during single-threaded startup, before
            // any other thread or async task could be reading these vars.
            unsafe { std::env::set_var("HTTP_PROXY", proxy) };
        }
        if let Some(proxy) = &self.transport.https_proxy {
            unsafe { std::env::set_var("HTTPS_PROXY", proxy) };
        }
    }

    pub fn messages_path(&self) -> PathBuf {
        self.data_path.join("messages")
    }

    pub fn persist_path(&self) -> PathBuf {
        self.data_path.join("broker.json")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransportSettings {
    pub url: Url,
    pub ssl_public_key: Option<PathBuf>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    #[serde(with = "humantime_seconds")]
    pub http_timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "humantime_seconds")]
    pub exchange_interval: Duration,
    #[serde(with = "humantime_seconds")]
    pub urgent_exchange_interval: Duration,
    pub max_messages: usize,
    pub client_api: String,
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            url: Url::parse("https://landscape.canonical.com/message-system").unwrap(),
            ssl_public_key: None,
            http_proxy: None,
            https_proxy: None,
            http_timeout: Duration::from_secs(60),
            max_retries: 0,
            exchange_interval: Duration::from_secs(900),
            urgent_exchange_interval: Duration::from_secs(60),
            max_messages: 100,
            client_api: "3.3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PingerSettings {
    pub enabled: bool,
    pub ping_url: Url,
    #[serde(with = "humantime_seconds")]
    pub ping_interval: Duration,
}

impl Default for PingerSettings {
    fn default() -> Self {
        PingerSettings {
            enabled: true,
            ping_url: Url::parse("https://landscape.canonical.com/ping").unwrap(),
            ping_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentitySettings {
    pub account_name: Option<String>,
    pub computer_title: Option<String>,
    pub registration_password: Option<String>,
    pub tags: Option<Vec<String>>,
    pub access_group: Option<String>,
}

impl IdentitySettings {
    fn should_register(&self) -> bool {
        self.account_name.is_some() && self.computer_title.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RpcSettings {
    pub socket_path: PathBuf,
}

impl Default for RpcSettings {
    fn default() -> Self {
        RpcSettings {
            socket_path: PathBuf::from("/run/landscape/broker.sock"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingFormat {
    Default,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TracingSettings {
    pub enabled: bool,
    pub format: TracingFormat,
}

impl Default for TracingSettings {
    fn default() -> Self {
        TracingSettings {
            enabled: true,
            format: TracingFormat::Default,
        }
    }
}

mod humantime_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_spec_intervals() {
        let settings = BrokerSettings::default();
        assert_eq!(settings.transport.exchange_interval, Duration::from_secs(900));
        assert_eq!(settings.transport.urgent_exchange_interval, Duration::from_secs(60));
        assert_eq!(settings.pinger.ping_interval, Duration::from_secs(30));
    }

    #[test]
    fn environment_overrides_defaults() {
        // SAFETY: single-threaded test, no other code reads this var.
        unsafe { std::env::set_var("LANDSCAPE_TEST__TRANSPORT__CLIENT_API", "9.9") };
        let settings: BrokerSettings = Config::builder()
            .add_source(Environment::with_prefix("LANDSCAPE_TEST").separator("__"))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        // SAFETY: see above.
        unsafe { std::env::remove_var("LANDSCAPE_TEST__TRANSPORT__CLIENT_API") };

        assert_eq!(settings.transport.client_api, "9.9");
    }
}
