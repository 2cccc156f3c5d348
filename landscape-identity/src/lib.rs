//! The client's identity: two opaque strings issued by the server
//! (`secure_id`, `insecure_id`) plus three configured strings the operator
//! supplies (`computer_title`, `account_name`, `registration_password`).
//!
//! Modeled on `landscape.broker.registration.Identity`: the server-issued
//! half lives in `Persist` (so it survives a restart), the configured half
//! is read-only and supplied at construction from the broker's settings.

use landscape_persist::{Persist, PersistView};

/// The configured inputs that drive registration. These come from the
/// broker's settings, not from `Persist` -- changing them takes effect on
/// the next exchange.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub computer_title: Option<String>,
    pub account_name: Option<String>,
    pub registration_password: Option<String>,
}

/// Server-issued identity, namespaced under `registration.*` in the
/// shared `Persist` tree, plus the configured registration inputs.
#[derive(Clone)]
pub struct Identity {
    persist: PersistView,
    config: IdentityConfig,
}

impl Identity {
    pub fn new(persist: &Persist, config: IdentityConfig) -> Self {
        Identity {
            persist: persist.root_at("registration"),
            config,
        }
    }

    pub fn secure_id(&self) -> Option<String> {
        self.persist.get("secure-id").and_then(|v| v.as_text().map(str::to_string))
    }

    pub fn insecure_id(&self) -> Option<String> {
        self.persist.get("insecure-id").and_then(|v| v.as_text().map(str::to_string))
    }

    pub fn computer_title(&self) -> Option<&str> {
        self.config.computer_title.as_deref()
    }

    pub fn account_name(&self) -> Option<&str> {
        self.config.account_name.as_deref()
    }

    pub fn registration_password(&self) -> Option<&str> {
        self.config.registration_password.as_deref()
    }

    /// True once the server has assigned a `secure_id`: the authoritative
    /// proof of registration.
    pub fn is_registered(&self) -> bool {
        self.secure_id().is_some()
    }

    /// Record a `set-id` message's assigned identity.
    pub fn set_ids(&self, secure_id: impl Into<String>, insecure_id: impl Into<String>) {
        self.persist.set("secure-id", secure_id.into());
        self.persist.set("insecure-id", insecure_id.into());
    }

    /// Clear both ids, forcing re-registration on the next `pre-exchange`.
    /// Used when the server sends `unknown-id`.
    pub fn clear(&self) {
        self.persist.remove("secure-id");
        self.persist.remove("insecure-id");
    }
}
