use std::cell::Cell;
use std::rc::Rc;

use landscape_identity::Identity;
use landscape_reactor::{Event, Reactor};
use landscape_schema::Value;
use landscape_store::MessageStore;

fn is_valid_tag(tag: &str) -> bool {
    !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Queues the `register` message, and processes `set-id` / `unknown-id` /
/// `registration` replies. Grounded on
/// `landscape.broker.registration.RegistrationHandler`; `tags` and
/// `access_group` are additional registration inputs not present in that
/// source and are implemented from spec text alone.
pub struct RegistrationHandler {
    identity: Identity,
    store: MessageStore,
    tags: Option<Vec<String>>,
    access_group: Option<String>,
    /// Whether `should_register()` held true on the *last* `pre-exchange`,
    /// so `exchange-done` can detect a false-to-true transition and ask
    /// for an urgent retry instead of waiting for the next normal cycle.
    should_register: Cell<Option<bool>>,
}

impl RegistrationHandler {
    pub fn new(
        identity: Identity,
        store: MessageStore,
        tags: Option<Vec<String>>,
        access_group: Option<String>,
    ) -> Rc<Self> {
        Rc::new(RegistrationHandler {
            identity,
            store,
            tags,
            access_group,
            should_register: Cell::new(None),
        })
    }

    pub fn should_register(&self) -> bool {
        !self.identity.is_registered()
            && self.identity.computer_title().is_some()
            && self.identity.account_name().is_some()
            && self.store.accepts("register")
    }

    /// Register this handler's callbacks on `reactor`.
    pub fn install(self: &Rc<Self>, reactor: &Reactor) {
        let handler = self.clone();
        reactor.call_on("pre-exchange", 0, move |_| handler.handle_pre_exchange());

        let handler = self.clone();
        let reactor_clone = reactor.clone();
        reactor.call_on("exchange-done", 0, move |_| {
            handler.handle_exchange_done(&reactor_clone)
        });

        let handler = self.clone();
        let reactor_clone = reactor.clone();
        reactor.call_on("message", 0, move |event| handler.handle_message(event, &reactor_clone));
    }

    fn handle_pre_exchange(&self) {
        let should = self.should_register();
        self.should_register.set(Some(should));
        if !should {
            return;
        }

        tracing::info!(
            account = ?self.identity.account_name(),
            with_password = self.identity.registration_password().is_some(),
            "queueing registration message"
        );

        self.store.delete_all_messages();

        let tags = match &self.tags {
            Some(tags) if tags.iter().all(|t| is_valid_tag(t)) => {
                Value::List(tags.iter().map(|t| Value::Text(t.clone())).collect())
            }
            Some(invalid) => {
                tracing::error!(?invalid, "invalid registration tags, dropping");
                Value::Null
            }
            None => Value::Null,
        };

        let mut fields = vec![
            ("type".to_string(), Value::Text("register".to_string())),
            (
                "computer_title".to_string(),
                Value::Text(self.identity.computer_title().unwrap_or_default().to_string()),
            ),
            (
                "account_name".to_string(),
                Value::Text(self.identity.account_name().unwrap_or_default().to_string()),
            ),
            ("hostname".to_string(), Value::Text(gethostname::gethostname().to_string_lossy().into_owned())),
            ("tags".to_string(), tags),
        ];
        if let Some(password) = self.identity.registration_password() {
            fields.push(("registration_password".to_string(), Value::Text(password.to_string())));
        }
        if let Some(group) = &self.access_group {
            fields.push(("access_group".to_string(), Value::Text(group.clone())));
        }

        if let Err(error) = self.store.add(Value::Map(fields.into_iter().collect())) {
            tracing::warn!(%error, "failed to queue registration message");
        }
    }

    fn handle_exchange_done(&self, reactor: &Reactor) {
        let was_registering = self.should_register.get().unwrap_or(false);
        if !was_registering && self.should_register() {
            reactor.fire(&Event::RequestUrgentExchange);
        }
    }

    fn handle_message(&self, event: &Event, reactor: &Reactor) {
        let Event::Message(value) = event else { return };
        let Some(map) = value.as_map() else { return };
        let Some(message_type) = map.get("type").and_then(Value::as_text) else {
            return;
        };

        match message_type {
            "set-id" => self.handle_set_id(value, reactor),
            "unknown-id" => self.handle_unknown_id(),
            "registration" => self.handle_registration(value, reactor),
            _ => {}
        }
    }

    fn handle_set_id(&self, message: &Value, reactor: &Reactor) {
        let map = message.as_map().expect("checked by caller");
        let secure_id = map.get("id").and_then(Value::as_text).unwrap_or_default().to_string();
        let insecure_id = map
            .get("insecure-id")
            .and_then(Value::as_text)
            .unwrap_or_default()
            .to_string();

        tracing::info!(account = ?self.identity.account_name(), "using new secure-id");
        self.identity.set_ids(secure_id, insecure_id);
        reactor.fire(&Event::RegistrationDone);
        reactor.fire(&Event::ResynchronizeClients);
    }

    fn handle_unknown_id(&self) {
        tracing::info!(account = ?self.identity.account_name(), "server reports unknown secure-id");
        self.identity.clear();
    }

    fn handle_registration(&self, message: &Value, reactor: &Reactor) {
        let map = message.as_map().expect("checked by caller");
        if map.get("info").and_then(Value::as_text) == Some("unknown-account") {
            reactor.fire(&Event::RegistrationFailed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landscape_identity::IdentityConfig;
    use landscape_persist::Persist;
    use landscape_schema::SchemaRegistry;
    use landscape_store::MessageStoreConfig;
    use pretty_assertions::assert_eq;

    fn fixture(
        dir: &std::path::Path,
        computer_title: Option<&str>,
        account_name: Option<&str>,
    ) -> (Rc<RegistrationHandler>, Identity, Reactor) {
        let mut registry = SchemaRegistry::new();
        registry.add_schema("register", crate::schema::register_message_schema());

        let persist = Persist::new();
        let store = MessageStore::new(&persist, registry, MessageStoreConfig::new(dir)).unwrap();
        store.set_accepted_types(["register"]);

        let identity = Identity::new(
            &persist,
            IdentityConfig {
                computer_title: computer_title.map(str::to_string),
                account_name: account_name.map(str::to_string),
                registration_password: None,
            },
        );

        let handler = RegistrationHandler::new(identity.clone(), store, None, None);
        let reactor = Reactor::new();
        handler.install(&reactor);
        (handler, identity, reactor)
    }

    #[test]
    fn should_register_requires_title_account_and_accepted_type() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _identity, _reactor) = fixture(dir.path(), Some("rex"), Some("acct"));
        assert!(handler.should_register());
    }

    #[test]
    fn should_register_false_without_configured_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _identity, _reactor) = fixture(dir.path(), None, Some("acct"));
        assert!(!handler.should_register());
    }

    #[test]
    fn pre_exchange_queues_register_message_with_hostname_and_null_tags() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, _identity, reactor) = fixture(dir.path(), Some("rex"), Some("acct"));

        reactor.fire(&Event::PreExchange);

        let pending = handler.store.get_pending_messages(None);
        assert_eq!(pending.len(), 1);
        let map = pending[0].value.as_map().unwrap();
        assert_eq!(map.get("computer_title").unwrap().as_text(), Some("rex"));
        assert_eq!(map.get("account_name").unwrap().as_text(), Some("acct"));
        assert_eq!(map.get("tags").unwrap(), &Value::Null);
        assert!(!map.get("hostname").unwrap().as_text().unwrap().is_empty());
    }

    #[test]
    fn set_id_message_sets_identity_and_fires_events() {
        let dir = tempfile::tempdir().unwrap();
        let (handler, identity, reactor) = fixture(dir.path(), Some("rex"), Some("acct"));

        let done = Rc::new(Cell::new(0));
        let d = done.clone();
        reactor.call_on("registration-done", 0, move |_| d.set(d.get() + 1));
        let resync = Rc::new(Cell::new(0));
        let r = resync.clone();
        reactor.call_on("resynchronize-clients", 0, move |_| r.set(r.get() + 1));

        let message = Value::map([
            ("type".to_string(), Value::Text("set-id".to_string())),
            ("id".to_string(), Value::Text("abc".to_string())),
            ("insecure-id".to_string(), Value::Text("def".to_string())),
        ]);
        reactor.fire(&Event::Message(message));

        assert_eq!(identity.secure_id().as_deref(), Some("abc"));
        assert_eq!(identity.insecure_id().as_deref(), Some("def"));
        assert_eq!(done.get(), 1);
        assert_eq!(resync.get(), 1);
    }

    #[test]
    fn unknown_id_clears_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (_handler, identity, reactor) = fixture(dir.path(), Some("rex"), Some("acct"));
        identity.set_ids("old-secure", "old-insecure");

        let message = Value::map([("type".to_string(), Value::Text("unknown-id".to_string()))]);
        reactor.fire(&Event::Message(message));

        assert!(identity.secure_id().is_none());
    }

    #[test]
    fn unknown_account_fires_registration_failed() {
        let dir = tempfile::tempdir().unwrap();
        let (_handler, _identity, reactor) = fixture(dir.path(), Some("rex"), Some("acct"));

        let failed = Rc::new(Cell::new(0));
        let f = failed.clone();
        reactor.call_on("registration-failed", 0, move |_| f.set(f.get() + 1));

        let message = Value::map([
            ("type".to_string(), Value::Text("registration".to_string())),
            ("info".to_string(), Value::Text("unknown-account".to_string())),
        ]);
        reactor.fire(&Event::Message(message));

        assert_eq!(failed.get(), 1);
    }

    #[test]
    fn invalid_tags_are_dropped_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = SchemaRegistry::new();
        registry.add_schema("register", crate::schema::register_message_schema());
        let persist = Persist::new();
        let store = MessageStore::new(&persist, registry, MessageStoreConfig::new(dir.path())).unwrap();
        store.set_accepted_types(["register"]);
        let identity = Identity::new(
            &persist,
            IdentityConfig {
                computer_title: Some("rex".to_string()),
                account_name: Some("acct".to_string()),
                registration_password: None,
            },
        );
        let handler = RegistrationHandler::new(
            identity,
            store,
            Some(vec!["ok-tag".to_string(), "bad tag!".to_string()]),
            None,
        );
        let reactor = Reactor::new();
        handler.install(&reactor);

        reactor.fire(&Event::PreExchange);

        let pending = handler.store.get_pending_messages(None);
        assert_eq!(pending[0].value.as_map().unwrap().get("tags").unwrap(), &Value::Null);
    }
}
