use std::cell::RefCell;
use std::rc::Rc;

use landscape_identity::Identity;
use landscape_reactor::{CallId, Event, Reactor};
use tokio::sync::oneshot;

use crate::error::RegistrationError;

/// A one-shot result for a single interactive registration attempt:
/// success on `registration-done`, a typed failure on
/// `registration-failed`. De-registers both handlers the moment either
/// fires. Mirrors `landscape.broker.registration.RegistrationResponse`.
pub fn watch_registration(reactor: &Reactor) -> oneshot::Receiver<Result<(), RegistrationError>> {
    let (tx, rx) = oneshot::channel();
    let tx = Rc::new(RefCell::new(Some(tx)));
    let ids: Rc<RefCell<(Option<CallId>, Option<CallId>)>> = Rc::new(RefCell::new((None, None)));

    let cancel_both = {
        let reactor = reactor.clone();
        let ids = ids.clone();
        move || {
            let (done, failed) = *ids.borrow();
            if let Some(id) = done {
                reactor.cancel_call(id);
            }
            if let Some(id) = failed {
                reactor.cancel_call(id);
            }
        }
    };

    let tx_done = tx.clone();
    let cancel = cancel_both.clone();
    let done_id = reactor.call_on("registration-done", 0, move |_| {
        if let Some(tx) = tx_done.borrow_mut().take() {
            let _ = tx.send(Ok(()));
        }
        cancel();
    });

    let tx_failed = tx;
    let cancel = cancel_both;
    let failed_id = reactor.call_on("registration-failed", 0, move |_| {
        if let Some(tx) = tx_failed.borrow_mut().take() {
            let _ = tx.send(Err(RegistrationError::InvalidCredentials));
        }
        cancel();
    });

    *ids.borrow_mut() = (Some(done_id), Some(failed_id));
    rx
}

/// Clear the current identity and ask for an urgent exchange, returning
/// a one-shot receiver for the outcome. This is the entry point an
/// interactive `register` command (out of this crate's scope, per
/// spec.md §1) would drive.
pub fn request_registration(
    identity: &Identity,
    reactor: &Reactor,
) -> oneshot::Receiver<Result<(), RegistrationError>> {
    identity.clear();
    let rx = watch_registration(reactor);
    reactor.fire(&Event::RequestUrgentExchange);
    rx
}
