use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::rc::Rc;

use landscape_identity::Identity;
use landscape_reactor::{CallId, Event, Reactor};
use landscape_schema::Value;
use landscape_store::MessageStore;
use landscape_transport::{Transport, TransportError};

use crate::config::ExchangeConfig;
use crate::error::Result;

/// Schedules exchanges, builds payloads, interprets responses, and
/// drives the built-in server message types (`accepted-types`,
/// `resynchronize`, `set-intervals`). Grounded on
/// `landscape.broker.exchange.MessageExchange`.
///
/// Lives behind an `Rc` because every reactor callback it installs needs
/// a cloned handle to `self`; this mirrors `RegistrationHandler`'s shape
/// in `landscape-registration`.
pub struct MessageExchange {
    reactor: Reactor,
    store: MessageStore,
    transport: Transport,
    identity: Identity,
    config: RefCell<ExchangeConfig>,
    exchanging: Cell<bool>,
    urgent: Cell<bool>,
    exchange_timer: Cell<Option<CallId>>,
    impending_timer: Cell<Option<CallId>>,
    exchange_token: RefCell<Option<String>>,
}

impl MessageExchange {
    pub fn new(
        reactor: Reactor,
        store: MessageStore,
        transport: Transport,
        identity: Identity,
        config: ExchangeConfig,
    ) -> Rc<Self> {
        Rc::new(MessageExchange {
            reactor,
            store,
            transport,
            identity,
            config: RefCell::new(config),
            exchanging: Cell::new(false),
            urgent: Cell::new(false),
            exchange_timer: Cell::new(None),
            impending_timer: Cell::new(None),
            exchange_token: RefCell::new(None),
        })
    }

    /// Register this exchange's callbacks on `reactor`. Exposed
    /// separately from `new` so tests can build an exchange, install
    /// only the handlers they want to exercise, then drive events by
    /// hand (see `RegistrationHandler::install` for the same pattern).
    pub fn install(self: &Rc<Self>, reactor: &Reactor) {
        let this = self.clone();
        reactor.call_on("message", 0, move |event| this.handle_message(event));

        let this = self.clone();
        reactor.call_on("resynchronize-clients", 10, move |_| {
            this.schedule_exchange(true, false)
        });

        let this = self.clone();
        reactor.call_on("request-urgent-exchange", 0, move |_| {
            this.schedule_exchange(true, false)
        });
    }

    pub fn is_urgent(&self) -> bool {
        self.urgent.get()
    }

    pub fn is_exchanging(&self) -> bool {
        self.exchanging.get()
    }

    /// Start scheduling exchanges. The first one is urgent, matching
    /// `MessageExchange.start()`.
    pub fn start(self: &Rc<Self>) {
        self.schedule_exchange(true, false);
    }

    /// Cancel any scheduled timers. An in-flight request, if any, is
    /// allowed to finish; its result is simply discarded once the timers
    /// it would have rearmed are gone (§5: "its result is dropped once
    /// Stopped").
    pub fn stop(&self) {
        if let Some(id) = self.exchange_timer.take() {
            self.reactor.cancel_call(id);
        }
        if let Some(id) = self.impending_timer.take() {
            self.reactor.cancel_call(id);
        }
    }

    /// Queue `message` for the next exchange. If `urgent`, also request
    /// an urgent exchange.
    pub fn send(self: &Rc<Self>, message: Value, urgent: bool) -> Result<u64> {
        let id = self.store.add(message)?;
        if urgent {
            self.schedule_exchange(true, false);
        }
        Ok(id)
    }

    /// `schedule_exchange`, spec §4.5. No-op while an exchange is in
    /// flight unless `force`; otherwise arms (or re-arms) the main timer
    /// plus the `impending-exchange` notification timer when `force`,
    /// when nothing is currently scheduled, or when upgrading to the
    /// urgent cadence. Repeated `urgent` calls while already urgent
    /// collapse to a single scheduled exchange (§8, "urgency collapse").
    pub fn schedule_exchange(self: &Rc<Self>, urgent: bool, force: bool) {
        if self.exchanging.get() && !force {
            return;
        }

        let upgrading_to_urgent = urgent && !self.urgent.get();
        let should_schedule = force || self.exchange_timer.get().is_none() || upgrading_to_urgent;
        if !should_schedule {
            return;
        }

        if urgent {
            self.urgent.set(true);
        }

        if let Some(id) = self.exchange_timer.take() {
            self.reactor.cancel_call(id);
        }
        if let Some(id) = self.impending_timer.take() {
            self.reactor.cancel_call(id);
        }

        let (interval, lead) = {
            let config = self.config.borrow();
            let interval = if self.urgent.get() {
                config.urgent_exchange_interval
            } else {
                config.exchange_interval
            };
            (interval, config.impending_exchange_lead)
        };

        let notification_interval = interval.saturating_sub(lead);
        let reactor = self.reactor.clone();
        self.impending_timer.set(Some(self.reactor.call_later(notification_interval, move || {
            reactor.fire(&Event::ImpendingExchange);
        })));

        let this = self.clone();
        self.exchange_timer.set(Some(self.reactor.call_later(interval, move || {
            this.exchange();
        })));
    }

    /// Entered by the timer, or called directly by a test. A no-op if an
    /// exchange is already in flight (the sole mutual-exclusion
    /// invariant of §5).
    pub fn exchange(self: &Rc<Self>) {
        if self.exchanging.get() {
            return;
        }
        self.exchanging.set(true);
        self.reactor.fire(&Event::PreExchange);

        let (payload, sent_ids) = self.build_payload();
        let server_api = payload_field_text(&payload, "server-api").unwrap_or_default();
        let secure_id = self.identity.secure_id();
        let exchange_token = self.exchange_token.borrow().clone();
        let transport = self.transport.clone();

        if self.urgent.get() {
            tracing::info!("starting urgent message exchange");
        } else {
            tracing::info!("starting message exchange");
        }

        let fut = async move {
            transport
                .exchange(&payload, secure_id.as_deref(), &server_api, exchange_token.as_deref())
                .await
        };

        let on_ok = {
            let this = self.clone();
            move |response| this.handle_exchange_success(sent_ids, response)
        };
        let on_err = {
            let this = self.clone();
            move |error| this.handle_exchange_failure(error)
        };
        self.reactor.call_in_thread_future(fut, on_ok, on_err);
    }

    fn handle_exchange_success(self: Rc<Self>, sent_ids: Vec<u64>, response: Value) {
        self.exchanging.set(false);
        if self.urgent.get() {
            tracing::info!("switching to normal exchange mode");
            self.urgent.set(false);
        }

        if let Some(token) = response.as_map().and_then(|m| m.get("next-exchange-token")).and_then(Value::as_text) {
            *self.exchange_token.borrow_mut() = Some(token.to_string());
        }

        self.process_response(&sent_ids, &response);

        self.reactor.fire(&Event::ExchangeDone);
        self.schedule_exchange(false, true);
    }

    fn handle_exchange_failure(self: Rc<Self>, error: TransportError) {
        self.exchanging.set(false);
        tracing::warn!(%error, "message exchange failed");
        self.reactor.fire(&Event::ExchangeFailed);
        self.reactor.fire(&Event::ExchangeDone);
        self.schedule_exchange(false, true);
    }

    /// §4.4: build the complete payload from the store's current pending
    /// messages, plus the exact ids included, in the order sent --
    /// `process_response` needs those ids, not just a count, since a
    /// response only ever confirms a prefix of them and held messages can
    /// leave this batch's ids with gaps relative to raw `sequence`
    /// arithmetic (see DESIGN.md).
    fn build_payload(&self) -> (Value, Vec<u64>) {
        let (max_messages, client_api) = {
            let config = self.config.borrow();
            (config.max_messages, config.client_api.clone())
        };

        let messages = self.store.get_pending_messages(Some(max_messages));
        let total_messages = self.store.count_pending_messages();
        let server_api = match messages.first() {
            // A missing per-message `api` means "the earliest schema
            // version" -- the legacy default, not this build's default.
            Some(first) => first.api().unwrap_or("2.0").to_string(),
            None => client_api.clone(),
        };
        let digest = self.store.get_accepted_types_digest();
        let sent_ids: Vec<u64> = messages.iter().map(|m| m.id).collect();

        let payload = Value::map([
            ("server-api".to_string(), Value::Text(server_api)),
            ("client-api".to_string(), Value::Text(client_api)),
            ("sequence".to_string(), Value::Int(self.store.get_sequence() as i64)),
            (
                "messages".to_string(),
                Value::List(messages.iter().map(|m| m.value.clone()).collect()),
            ),
            ("total-messages".to_string(), Value::Int(total_messages as i64)),
            (
                "next-expected-sequence".to_string(),
                Value::Int(self.store.get_server_sequence() as i64),
            ),
            ("accepted-types".to_string(), Value::Bytes(digest.to_vec())),
        ]);

        (payload, sent_ids)
    }

    /// §4.6: interpret the server's response against the ids we sent.
    fn process_response(self: &Rc<Self>, sent_ids: &[u64], response: &Value) {
        let sent_count = sent_ids.len() as u64;
        let old_sequence = self.store.get_sequence();
        let next_expected = response
            .as_map()
            .and_then(|m| m.get("next-expected-sequence"))
            .and_then(Value::as_int)
            .map(|n| n.max(0) as u64)
            .unwrap_or(old_sequence + sent_count);

        if next_expected > old_sequence + sent_count {
            tracing::info!(
                next_expected,
                old_sequence,
                sent_count,
                "server asked for ancient data: resynchronizing all state with the server"
            );
            self.store.set_sequence(next_expected);
            self.store.set_pending_offset(0);
            self.store.delete_all_messages();
            self.enqueue_resynchronize(None);
            self.reactor.fire(&Event::ResynchronizeClients);
        } else if next_expected < old_sequence {
            // Server-directed rewind. Whatever it confirmed in earlier
            // exchanges is already gone -- `confirm_delivered` retires a
            // message the moment it's acknowledged, so there's nothing on
            // disk to resurrect past `old_sequence`. All we can honestly
            // do is stop claiming more than the server now admits to and
            // let the next exchange re-offer whatever this batch still
            // has pending; nothing to delete here.
            tracing::info!(next_expected, old_sequence, "server requested a rewind");
            self.store.set_sequence(next_expected);
            self.store.set_pending_offset(0);
        } else {
            // Full accept (`next_expected == old + sent_count`), partial
            // accept, and no-progress (`next_expected == old_sequence`)
            // all reduce to: the server confirmed the first
            // `next_expected - old_sequence` of the messages we just
            // sent, in that order. Retire exactly those ids rather than
            // an id cutoff, since held messages can leave this batch's
            // ids non-contiguous relative to `sequence` (see DESIGN.md).
            let confirmed = (next_expected - old_sequence) as usize;
            self.store.set_sequence(next_expected);
            self.store.set_pending_offset(0);
            self.store.confirm_delivered(&sent_ids[..confirmed.min(sent_ids.len())]);
        }
        let _ = self.store.commit();

        if let Some(types) = response.as_map().and_then(|m| m.get("client-accepted-types")) {
            if let Some(list) = types.as_list() {
                let new_types: BTreeSet<String> =
                    list.iter().filter_map(Value::as_text).map(str::to_string).collect();
                self.apply_accepted_types(new_types);
            }
        }

        let mut server_sequence = self.store.get_server_sequence();
        for message in response.as_map().and_then(|m| m.get("messages")).and_then(Value::as_list).into_iter().flatten()
        {
            self.reactor.fire(&Event::Message(message.clone()));
            server_sequence += 1;
            self.store.set_server_sequence(server_sequence);
            let _ = self.store.commit();
        }

        if self.store.count_pending_messages() > 0 && next_expected != old_sequence {
            tracing::info!("pending messages remain after the last exchange");
            self.schedule_exchange(true, false);
        }
    }

    fn handle_message(self: &Rc<Self>, event: &Event) {
        let Event::Message(value) = event else { return };
        let Some(map) = value.as_map() else { return };
        let Some(message_type) = map.get("type").and_then(Value::as_text) else {
            return;
        };

        match message_type {
            "accepted-types" => {
                let types: BTreeSet<String> = map
                    .get("types")
                    .and_then(Value::as_list)
                    .map(|items| items.iter().filter_map(Value::as_text).map(str::to_string).collect())
                    .unwrap_or_default();
                self.apply_accepted_types(types);
            }
            "resynchronize" => {
                let operation_id = map.get("operation-id").cloned();
                self.enqueue_resynchronize(operation_id);
                self.reactor.fire(&Event::ResynchronizeClients);
            }
            "set-intervals" => {
                let mut config = self.config.borrow_mut();
                if let Some(seconds) = map.get("exchange").and_then(Value::as_int) {
                    tracing::info!(seconds, "exchange interval set");
                    config.exchange_interval = std::time::Duration::from_secs(seconds.max(0) as u64);
                }
                if let Some(seconds) = map.get("urgent-exchange").and_then(Value::as_int) {
                    tracing::info!(seconds, "urgent exchange interval set");
                    config.urgent_exchange_interval = std::time::Duration::from_secs(seconds.max(0) as u64);
                }
            }
            _ => {}
        }
    }

    /// §4.5's `_handle_accepted_types`: replace the accepted set, wake a
    /// blocked urgent exchange if this unblocks held messages, and fire
    /// `message-type-acceptance-changed` once per type whose acceptance
    /// actually flipped.
    fn apply_accepted_types(self: &Rc<Self>, new_types: BTreeSet<String>) {
        let old_types = self.store.get_accepted_types();
        if old_types == new_types {
            return;
        }
        self.store.set_accepted_types(new_types.clone());

        if self.store.count_pending_messages() > 0 {
            self.schedule_exchange(true, false);
        }

        for removed in old_types.difference(&new_types) {
            self.reactor.fire(&Event::MessageTypeAcceptanceChanged(removed.clone(), false));
        }
        for added in new_types.difference(&old_types) {
            self.reactor.fire(&Event::MessageTypeAcceptanceChanged(added.clone(), true));
        }
    }

    fn enqueue_resynchronize(&self, operation_id: Option<Value>) {
        let mut fields = vec![("type".to_string(), Value::Text("resynchronize".to_string()))];
        if let Some(operation_id) = operation_id {
            fields.push(("operation-id".to_string(), operation_id));
        }
        if let Err(error) = self.store.add(Value::Map(fields.into_iter().collect())) {
            tracing::warn!(%error, "failed to enqueue resynchronize message");
        }
    }
}

fn payload_field_text(payload: &Value, key: &str) -> Option<String> {
    payload.as_map()?.get(key)?.as_text().map(str::to_string)
}
