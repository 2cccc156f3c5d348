use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::event::Event;
use crate::id::{CallId, CallIdSource};

type EventCallback = Rc<RefCell<dyn FnMut(&Event)>>;
type TimerCallback = Rc<RefCell<dyn FnMut()>>;
type DeferredCallback = Box<dyn FnOnce()>;

struct Handler {
    id: CallId,
    priority: i32,
    callback: EventCallback,
}

struct Timer {
    id: CallId,
    deadline: Instant,
    interval: Option<Duration>,
    callback: TimerCallback,
}

#[derive(Default)]
struct Inner {
    handlers: HashMap<&'static str, Vec<Handler>>,
    timers: Vec<Timer>,
    deferred: VecDeque<DeferredCallback>,
    id_source: CallIdSource,
    running: bool,
}

/// A single-threaded, cooperative reactor: the only concurrency primitive
/// every other `landscape-*` component relies on instead of locks.
///
/// Modeled on `landscape.reactor.EventHandlingReactorMixin` and
/// `ThreadedCallsReactorMixin`: named event handlers fire in ascending
/// `(priority, registration order)`, timers fire by deadline, and
/// `call_in_thread` marshals blocking work onto a `spawn_blocking` pool
/// while delivering the result back on this reactor's own task so
/// callbacks never need to be `Send`.
///
/// `Reactor::run` must be driven inside a `tokio::task::LocalSet`, since
/// `call_in_thread` uses `tokio::task::spawn_local` to schedule the
/// continuation.
#[derive(Clone)]
pub struct Reactor {
    inner: Rc<RefCell<Inner>>,
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}

impl Reactor {
    pub fn new() -> Self {
        Reactor {
            inner: Rc::new(RefCell::new(Inner::default())),
        }
    }

    /// Register `callback` to run whenever `event_name` is fired. Lower
    /// `priority` values run first; among equal priorities, handlers run
    /// in the order they were registered.
    pub fn call_on<F>(&self, event_name: &'static str, priority: i32, callback: F) -> CallId
    where
        F: FnMut(&Event) + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.id_source.next();
        inner.handlers.entry(event_name).or_default().push(Handler {
            id,
            priority,
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    /// Fire `event` synchronously, invoking every handler registered for
    /// its name. A handler that panics is caught, logged, and does not
    /// prevent the remaining handlers from running. Returns the number of
    /// handlers that ran without panicking.
    pub fn fire(&self, event: &Event) -> usize {
        let name = event.name();
        let to_call: Vec<EventCallback> = {
            let mut inner = self.inner.borrow_mut();
            let handlers = inner.handlers.entry(name).or_default();
            handlers.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));
            handlers.iter().map(|h| h.callback.clone()).collect()
        };

        let mut ran = 0;
        for callback in to_call {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                callback.borrow_mut()(event);
            }));
            match outcome {
                Ok(()) => ran += 1,
                Err(payload) => {
                    tracing::error!(event = name, panic = %describe_panic(&payload), "event handler panicked");
                }
            }
        }
        ran
    }

    /// Schedule `callback` to run once, after `delay`.
    pub fn call_later<F>(&self, delay: Duration, callback: F) -> CallId
    where
        F: FnMut() + 'static,
    {
        self.schedule_timer(delay, None, callback)
    }

    /// Schedule `callback` to run every `interval`, starting after one
    /// `interval` has elapsed.
    pub fn call_every<F>(&self, interval: Duration, callback: F) -> CallId
    where
        F: FnMut() + 'static,
    {
        self.schedule_timer(interval, Some(interval), callback)
    }

    fn schedule_timer<F>(&self, delay: Duration, interval: Option<Duration>, callback: F) -> CallId
    where
        F: FnMut() + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        let id = inner.id_source.next();
        inner.timers.push(Timer {
            id,
            deadline: Instant::now() + delay,
            interval,
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    /// Cancel a previously scheduled event handler or timer. No-op if
    /// `id` is unknown or already fired (for one-shot timers).
    pub fn cancel_call(&self, id: CallId) {
        let mut inner = self.inner.borrow_mut();
        for handlers in inner.handlers.values_mut() {
            handlers.retain(|h| h.id != id);
        }
        inner.timers.retain(|t| t.id != id);
    }

    /// Defer `callback` to run on the reactor's own task at the next
    /// opportunity, ahead of any timers due later than now.
    pub fn call_in_main<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        self.inner.borrow_mut().deferred.push_back(Box::new(callback));
    }

    /// Run `f` on the blocking thread pool and deliver its result back to
    /// `on_ok`/`on_err` on the reactor's own task, so those callbacks can
    /// freely touch `Rc`-based reactor state without `Send`.
    ///
    /// Must be called while a `tokio::task::LocalSet` is active (i.e.
    /// from within `Reactor::run`, or from a handler it invoked).
    pub fn call_in_thread<T, E, F, Ok_, Err_>(&self, f: F, on_ok: Ok_, on_err: Err_)
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
        Ok_: FnOnce(T) + 'static,
        Err_: FnOnce(E) + 'static,
    {
        tokio::task::spawn_local(async move {
            match tokio::task::spawn_blocking(f).await {
                Ok(Ok(value)) => on_ok(value),
                Ok(Err(err)) => on_err(err),
                Err(join_err) => {
                    tracing::error!(error = %join_err, "call_in_thread task panicked");
                }
            }
        });
    }

    /// Run the async future `fut` concurrently with the reactor's own
    /// loop and deliver its result back to `on_ok`/`on_err` on the
    /// reactor's task via `call_in_main`, the same marshaling
    /// `call_in_thread` gives blocking work.
    ///
    /// This is the non-blocking counterpart to `call_in_thread`: the
    /// historical reactor offloaded blocking network I/O to a worker
    /// thread via `deferToThread`, but an async HTTP client (see
    /// `landscape-transport::Transport::exchange`) is already
    /// non-blocking, so there is nothing to hand to a thread pool --
    /// `spawn_local` schedules it as a sibling task on the same
    /// `LocalSet` instead. Must be called while a `LocalSet` is active.
    pub fn call_in_thread_future<Fut, T, E, Ok_, Err_>(&self, fut: Fut, on_ok: Ok_, on_err: Err_)
    where
        Fut: std::future::Future<Output = std::result::Result<T, E>> + 'static,
        T: 'static,
        E: 'static,
        Ok_: FnOnce(T) + 'static,
        Err_: FnOnce(E) + 'static,
    {
        let reactor = self.clone();
        tokio::task::spawn_local(async move {
            match fut.await {
                Ok(value) => reactor.call_in_main(move || on_ok(value)),
                Err(error) => reactor.call_in_main(move || on_err(error)),
            }
        });
    }

    /// Request the reactor stop after the current turn. Safe to call
    /// from within a handler or timer callback.
    pub fn stop(&self) {
        self.inner.borrow_mut().running = false;
    }

    /// Drive the reactor: fires `Event::Run`, then loops processing
    /// deferred `call_in_main` work and due timers until `stop()` is
    /// called, finally firing `Event::Stop`.
    ///
    /// Must run inside `tokio::task::LocalSet::run_until` for
    /// `call_in_thread` to function.
    pub async fn run(&self) {
        self.inner.borrow_mut().running = true;
        self.fire(&Event::Run);

        while self.inner.borrow().running {
            self.drain_deferred();

            let next_deadline = self.inner.borrow().timers.iter().map(|t| t.deadline).min();
            match next_deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if deadline > now {
                        tokio::time::sleep(deadline - now).await;
                    } else {
                        tokio::task::yield_now().await;
                    }
                }
                None => tokio::time::sleep(Duration::from_millis(50)).await,
            }

            self.fire_due_timers();
        }

        self.fire(&Event::Stop);
    }

    fn drain_deferred(&self) {
        loop {
            let next = self.inner.borrow_mut().deferred.pop_front();
            match next {
                Some(callback) => callback(),
                None => break,
            }
        }
    }

    fn fire_due_timers(&self) {
        let now = Instant::now();
        let due: Vec<TimerCallback> = {
            let mut inner = self.inner.borrow_mut();
            let due_ids: Vec<CallId> = inner
                .timers
                .iter()
                .filter(|t| t.deadline <= now)
                .map(|t| t.id)
                .collect();

            let mut due = Vec::with_capacity(due_ids.len());
            for timer in inner.timers.iter_mut() {
                if due_ids.contains(&timer.id) {
                    due.push(timer.callback.clone());
                }
            }

            for timer in inner.timers.iter_mut() {
                if due_ids.contains(&timer.id) {
                    if let Some(interval) = timer.interval {
                        timer.deadline = now + interval;
                    }
                }
            }
            inner.timers.retain(|t| t.interval.is_some() || !due_ids.contains(&t.id));
            due
        };

        for callback in due {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                callback.borrow_mut()();
            }));
            if let Err(payload) = outcome {
                tracing::error!(panic = %describe_panic(&payload), "timer callback panicked");
            }
        }
    }
}

fn describe_panic(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
