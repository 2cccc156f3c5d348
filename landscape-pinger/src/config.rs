use std::time::Duration;

use url::Url;

/// Tuning knobs for a [`crate::Pinger`], matching spec §6.4's
/// `ping_url`/`ping_interval` options.
#[derive(Debug, Clone)]
pub struct PingerConfig {
    /// The server's ping endpoint, a cheap sibling of the exchange URL.
    pub ping_url: Url,
    /// How often to probe (spec default 30s).
    pub ping_interval: Duration,
}

impl PingerConfig {
    pub fn new(ping_url: Url) -> Self {
        PingerConfig {
            ping_url,
            ping_interval: Duration::from_secs(30),
        }
    }
}
