use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use landscape_identity::{Identity, IdentityConfig};
use landscape_persist::Persist;
use landscape_pinger::{Pinger, PingerConfig};
use landscape_reactor::Reactor;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// `Pinger::ping` delivers its result via `call_in_main`, which is only
/// drained inside `Reactor::run`'s own loop -- so these tests drive it
/// as a background task, mirroring `landscape-exchange`'s integration
/// tests.
async fn with_running_reactor<F, Fut>(reactor: &Reactor, body: F)
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let r = reactor.clone();
    let task = tokio::task::spawn_local(async move { r.run().await });
    body().await;
    reactor.stop();
    let _ = task.await;
}

#[tokio::test]
async fn a_true_response_requests_an_urgent_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("True"))
        .mount(&server)
        .await;

    let persist = Persist::new();
    let identity = Identity::new(&persist, IdentityConfig::default());
    identity.set_ids("secure", "insecure");
    let reactor = Reactor::new();
    let url = format!("{}/ping", server.uri()).parse().unwrap();
    let pinger = Pinger::new(reactor.clone(), identity, PingerConfig::new(url));

    let requested = Rc::new(Cell::new(0));
    let r = requested.clone();
    reactor.call_on("request-urgent-exchange", 0, move |_| r.set(r.get() + 1));

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            with_running_reactor(&reactor, || async {
                pinger.ping();
                wait_for(|| requested.get() > 0).await;
            })
            .await;
        })
        .await;

    assert_eq!(requested.get(), 1);
}

#[tokio::test]
async fn a_false_response_does_not_request_an_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("False"))
        .mount(&server)
        .await;

    let persist = Persist::new();
    let identity = Identity::new(&persist, IdentityConfig::default());
    identity.set_ids("secure", "insecure");
    let reactor = Reactor::new();
    let url = format!("{}/ping", server.uri()).parse().unwrap();
    let pinger = Pinger::new(reactor.clone(), identity, PingerConfig::new(url));

    let requested = Rc::new(Cell::new(0));
    let r = requested.clone();
    reactor.call_on("request-urgent-exchange", 0, move |_| r.set(r.get() + 1));

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            with_running_reactor(&reactor, || async {
                pinger.ping();
                tokio::time::sleep(Duration::from_millis(100)).await;
            })
            .await;
        })
        .await;

    assert_eq!(requested.get(), 0);
}
