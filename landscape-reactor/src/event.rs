use landscape_schema::Value;

/// The fixed set of named events the broker's components fire and
/// subscribe to (spec §3's Event, specialized to this exchange core rather
/// than left as an untyped `(name, *args)` pair -- see the REDESIGN note on
/// "Event handler registry with untyped callables").
#[derive(Debug, Clone)]
pub enum Event {
    /// Fired once when the reactor's `run()` loop starts.
    Run,
    /// Fired once when the reactor is asked to stop.
    Stop,
    /// An exchange is about to happen; plugins/registration may enqueue
    /// last-minute messages.
    PreExchange,
    /// Fires ~10s before the main exchange timer, per `schedule_exchange`.
    ImpendingExchange,
    /// A message arrived from the server.
    Message(Value),
    /// The in-flight exchange completed (successfully or not).
    ExchangeDone,
    /// The in-flight exchange failed at the transport layer.
    ExchangeFailed,
    /// Plugins should discard derived state and re-emit a full snapshot.
    ResynchronizeClients,
    /// Registration completed successfully.
    RegistrationDone,
    /// Registration failed (invalid credentials).
    RegistrationFailed,
    /// A message type's acceptance by the server changed.
    MessageTypeAcceptanceChanged(String, bool),
    /// A collaborator (e.g. the registration handler, noticing it can
    /// now register) wants the next exchange to happen on the urgent
    /// cadence rather than waiting for the normal one.
    RequestUrgentExchange,
}

impl Event {
    /// The string key handlers register against with `call_on`.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Run => "run",
            Event::Stop => "stop",
            Event::PreExchange => "pre-exchange",
            Event::ImpendingExchange => "impending-exchange",
            Event::Message(_) => "message",
            Event::ExchangeDone => "exchange-done",
            Event::ExchangeFailed => "exchange-failed",
            Event::ResynchronizeClients => "resynchronize-clients",
            Event::RegistrationDone => "registration-done",
            Event::RegistrationFailed => "registration-failed",
            Event::MessageTypeAcceptanceChanged(..) => "message-type-acceptance-changed",
            Event::RequestUrgentExchange => "request-urgent-exchange",
        }
    }
}
