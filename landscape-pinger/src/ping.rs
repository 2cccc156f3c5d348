use std::cell::{Cell, RefCell};
use std::rc::Rc;

use landscape_identity::Identity;
use landscape_reactor::{CallId, Event, Reactor};

use crate::config::PingerConfig;
use crate::error::PingerError;

/// Probes the server's cheap ping endpoint on a fixed interval and
/// requests an urgent exchange when it reports pending data, so the
/// client doesn't have to wait for `urgent_exchange_interval` to notice
/// inbound work. A sketch-level component (spec §2 row I): no retry
/// budget, no backoff, a failed probe is simply logged and tried again
/// next interval.
///
/// Shares `MessageExchange`'s `Rc`-wrapped, reactor-driven shape.
pub struct Pinger {
    reactor: Reactor,
    identity: Identity,
    http_client: reqwest::Client,
    config: RefCell<PingerConfig>,
    timer: Cell<Option<CallId>>,
}

impl Pinger {
    pub fn new(reactor: Reactor, identity: Identity, config: PingerConfig) -> Rc<Self> {
        Rc::new(Pinger {
            reactor,
            identity,
            http_client: reqwest::Client::new(),
            config: RefCell::new(config),
            timer: Cell::new(None),
        })
    }

    /// Register this pinger's callbacks on `reactor`: probing starts when
    /// the reactor starts and stops when it stops.
    pub fn install(self: &Rc<Self>, reactor: &Reactor) {
        let this = self.clone();
        reactor.call_on("run", 0, move |_| this.start());

        let this = self.clone();
        reactor.call_on("stop", 0, move |_| this.stop());
    }

    pub fn start(self: &Rc<Self>) {
        if self.timer.get().is_some() {
            return;
        }
        let interval = self.config.borrow().ping_interval;
        let this = self.clone();
        self.timer.set(Some(self.reactor.call_every(interval, move || this.ping())));
    }

    pub fn stop(&self) {
        if let Some(id) = self.timer.take() {
            self.reactor.cancel_call(id);
        }
    }

    /// Fire a single probe. Exposed for callers that want to check
    /// immediately rather than wait for the next tick (e.g. right after
    /// registration completes).
    pub fn ping(self: &Rc<Self>) {
        let Some(insecure_id) = self.identity.insecure_id() else {
            return;
        };
        let url = self.config.borrow().ping_url.clone();
        let client = self.http_client.clone();

        let fut = async move {
            let response = client.get(url).query(&[("insecure_id", insecure_id)]).send().await?;
            let body = response.text().await?;
            Ok::<bool, PingerError>(body.trim() == "True")
        };

        let this = self.clone();
        self.reactor.call_in_thread_future(
            fut,
            move |has_messages| {
                if has_messages {
                    tracing::info!("ping endpoint reports pending messages");
                    this.reactor.fire(&Event::RequestUrgentExchange);
                }
            },
            |error: PingerError| tracing::warn!(%error, "ping request failed"),
        );
    }
}
