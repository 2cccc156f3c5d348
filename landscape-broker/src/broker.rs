//! Wires every `landscape-*` component onto one reactor, the way
//! `da-indexer-server`'s `run()` constructs its database pool, indexer,
//! and HTTP server from one `Settings` and then runs them together.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use landscape_exchange::{resynchronize_message_schema, ExchangeConfig, MessageExchange};
use landscape_identity::{Identity, IdentityConfig};
use landscape_persist::Persist;
use landscape_pinger::{Pinger, PingerConfig};
use landscape_reactor::{Event, Reactor};
use landscape_registration::{register_message_schema, RegistrationHandler};
use landscape_schema::{SchemaRegistry, Value};
use landscape_store::{MessageStore, MessageStoreConfig};
use landscape_transport::{Transport, TransportConfig};

use crate::rpc::BrokerRpc;
use crate::settings::BrokerSettings;

/// The assembled broker: every component plus the bookkeeping the RPC
/// surface needs (spec §6.2) but that has no other natural home, since
/// there is no live plugin process to own it.
pub struct Broker {
    reactor: Reactor,
    persist: Persist,
    store: MessageStore,
    exchange: Rc<MessageExchange>,
    registration: Rc<RegistrationHandler>,
    pinger: Option<Rc<Pinger>>,
    registered_clients: RefCell<HashMap<String, String>>,
    accepted_client_types: RefCell<HashSet<String>>,
    event_subscriptions: RefCell<HashMap<String, String>>,
}

impl Broker {
    pub fn build(settings: &BrokerSettings) -> anyhow::Result<Rc<Self>> {
        std::fs::create_dir_all(&settings.data_path)?;
        std::fs::create_dir_all(&settings.log_dir)?;

        let persist = Persist::load(settings.persist_path()).with_path(settings.persist_path());

        let mut registry = SchemaRegistry::new();
        registry.add_schema("register", register_message_schema());
        registry.add_schema("resynchronize", resynchronize_message_schema());

        let store = MessageStore::new(&persist, registry, MessageStoreConfig::new(settings.messages_path()))?;

        let identity = Identity::new(
            &persist,
            IdentityConfig {
                computer_title: settings.identity.computer_title.clone(),
                account_name: settings.identity.account_name.clone(),
                registration_password: settings.identity.registration_password.clone(),
            },
        );

        let mut transport_config = TransportConfig::new(settings.transport.url.clone());
        transport_config.http_timeout = settings.transport.http_timeout;
        transport_config.max_retries = settings.transport.max_retries;
        if let Some(path) = &settings.transport.ssl_public_key {
            let pem = std::fs::read(path)?;
            transport_config.extra_root_certificates_pem.push(pem);
        }
        let transport = Transport::new(transport_config)?;

        let reactor = Reactor::new();

        let exchange_config = ExchangeConfig {
            client_api: settings.transport.client_api.clone(),
            max_messages: settings.transport.max_messages,
            exchange_interval: settings.transport.exchange_interval,
            urgent_exchange_interval: settings.transport.urgent_exchange_interval,
            ..ExchangeConfig::default()
        };
        let exchange = MessageExchange::new(reactor.clone(), store.clone(), transport, identity.clone(), exchange_config);
        exchange.install(&reactor);

        let registration = RegistrationHandler::new(
            identity.clone(),
            store.clone(),
            settings.identity.tags.clone(),
            settings.identity.access_group.clone(),
        );
        registration.install(&reactor);

        let pinger = if settings.pinger.enabled {
            let pinger = Pinger::new(
                reactor.clone(),
                identity.clone(),
                PingerConfig {
                    ping_url: settings.pinger.ping_url.clone(),
                    ping_interval: settings.pinger.ping_interval,
                },
            );
            pinger.install(&reactor);
            Some(pinger)
        } else {
            None
        };

        let persist_on_stop = persist.clone();
        reactor.call_on("stop", 100, move |_| {
            if let Err(error) = persist_on_stop.save() {
                tracing::warn!(%error, "failed to flush persisted state on shutdown");
            }
        });

        Ok(Rc::new(Broker {
            reactor,
            persist,
            store,
            exchange,
            registration,
            pinger,
            registered_clients: RefCell::new(HashMap::new()),
            accepted_client_types: RefCell::new(HashSet::new()),
            event_subscriptions: RefCell::new(HashMap::new()),
        }))
    }

    pub fn reactor(&self) -> &Reactor {
        &self.reactor
    }

    /// Start the exchange cadence and the pinger, if configured.
    /// `RegistrationHandler` needs no explicit start: it only reacts to
    /// `pre-exchange`/`exchange-done`/`message`.
    pub fn start(self: &Rc<Self>) {
        self.exchange.start();
        if let Some(pinger) = &self.pinger {
            pinger.start();
        }
    }
}

impl BrokerRpc for Broker {
    fn send_message(&self, message: Value, urgent: bool) -> Result<u64, String> {
        self.exchange.send(message, urgent).map_err(|error| error.to_string())
    }

    fn register_client_accepted_message_type(&self, message_type: &str) {
        self.accepted_client_types.borrow_mut().insert(message_type.to_string());
    }

    fn register_client(&self, name: &str) -> String {
        let handle = uuid::Uuid::new_v4().to_string();
        self.registered_clients.borrow_mut().insert(handle.clone(), name.to_string());
        handle
    }

    fn ping(&self) -> bool {
        true
    }

    fn stop_exchanger(&self) {
        self.exchange.stop();
    }

    fn fire_event(&self, name: &str, _args: &[Value]) -> Result<Vec<Value>, String> {
        match name {
            "resynchronize-clients" => {
                self.reactor.fire(&Event::ResynchronizeClients);
                Ok(Vec::new())
            }
            "request-urgent-exchange" => {
                self.reactor.fire(&Event::RequestUrgentExchange);
                Ok(Vec::new())
            }
            other => Err(format!("event '{other}' cannot be raised externally")),
        }
    }

    fn call_on_event(&self, handlers: HashMap<String, String>) {
        self.event_subscriptions.borrow_mut().extend(handlers);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn settings(dir: &std::path::Path) -> BrokerSettings {
        let mut settings = BrokerSettings::default();
        settings.data_path = dir.to_path_buf();
        settings.log_dir = dir.join("log");
        settings.pinger.enabled = false;
        settings
    }

    #[test]
    fn build_wires_every_component_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::build(&settings(dir.path())).unwrap();
        assert!(!broker.store.accepts("register"));
    }

    #[test]
    fn ping_is_always_true() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::build(&settings(dir.path())).unwrap();
        assert!(broker.ping());
    }

    #[test]
    fn send_message_of_an_unregistered_type_is_a_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::build(&settings(dir.path())).unwrap();
        let message = Value::map([("type".to_string(), Value::Text("unregistered".to_string()))]);
        assert!(broker.send_message(message, false).is_err());
    }

    #[test]
    fn fire_event_rejects_unknown_names() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::build(&settings(dir.path())).unwrap();
        assert!(broker.fire_event("made-up-event", &[]).is_err());
    }

    #[test]
    fn fire_event_accepts_resynchronize_clients() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::build(&settings(dir.path())).unwrap();
        assert_eq!(broker.fire_event("resynchronize-clients", &[]), Ok(Vec::new()));
    }

    #[test]
    fn register_client_returns_a_stable_unique_handle() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::build(&settings(dir.path())).unwrap();
        let a = broker.register_client("plugin-a");
        let b = broker.register_client("plugin-b");
        assert_ne!(a, b);
    }
}
