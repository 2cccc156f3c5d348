use std::time::Duration;

/// Tuning knobs for a [`crate::MessageExchange`], matching spec §6.4's
/// `exchange_interval`/`urgent_exchange_interval` options plus the
/// constants §4.4/§4.5 otherwise hard-code.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// The schema-version this build speaks, sent as `client-api` on
    /// every payload and used as `server-api` when there are no pending
    /// messages to derive it from.
    pub client_api: String,
    /// Cap on how many messages one payload carries (before the
    /// api-split tie-break in §4.4 trims further).
    pub max_messages: usize,
    /// Normal exchange cadence (spec default 900s).
    pub exchange_interval: Duration,
    /// Urgent exchange cadence (spec default 60s).
    pub urgent_exchange_interval: Duration,
    /// How long before the main timer fires that `impending-exchange`
    /// is raised (spec: "approximately 10 seconds").
    pub impending_exchange_lead: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            client_api: "3.3".to_string(),
            max_messages: 100,
            exchange_interval: Duration::from_secs(900),
            urgent_exchange_interval: Duration::from_secs(60),
            impending_exchange_lead: Duration::from_secs(10),
        }
    }
}
