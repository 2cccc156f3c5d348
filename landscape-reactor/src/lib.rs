//! A single-threaded, cooperative event reactor: the concurrency spine the
//! other `landscape-*` crates are built around instead of locks, modeled
//! on `landscape.reactor`'s `EventHandlingReactorMixin` and
//! `ThreadedCallsReactorMixin`.

mod event;
mod id;
mod reactor;

pub use event::Event;
pub use id::CallId;
pub use reactor::Reactor;
