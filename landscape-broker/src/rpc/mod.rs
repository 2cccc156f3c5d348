//! The broker↔plugin socket, spec §6.2. This is the RPC *surface*, not a
//! plugin runtime: no process supervision, no plugin SDK, just a
//! Unix-domain-socket server speaking one JSON object per line, wired to
//! whatever implements [`BrokerRpc`] (see `crate::broker::Broker`).

mod protocol;

pub use protocol::{json_to_value, value_to_json, Request, Response};

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use futures::{SinkExt, StreamExt};
use landscape_schema::Value;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LinesCodec};

/// The method surface a plugin connection can call into. Implemented by
/// `crate::broker::Broker`, which forwards each call to the wired
/// `MessageExchange`/`MessageStore`/`Reactor`.
pub trait BrokerRpc {
    fn send_message(&self, message: Value, urgent: bool) -> Result<u64, String>;
    fn register_client_accepted_message_type(&self, message_type: &str);
    /// Returns an opaque handle string a plugin can quote back in later
    /// calls to identify itself.
    fn register_client(&self, name: &str) -> String;
    fn ping(&self) -> bool;
    fn stop_exchanger(&self);
    /// Only the fixed set of events plugins are allowed to raise
    /// externally (currently `resynchronize-clients` and
    /// `request-urgent-exchange`) are accepted; anything else is an
    /// error, since the reactor's `Event` is a closed enum rather than
    /// an open `(name, *args)` pair (see the REDESIGN note on event
    /// handler registries).
    fn fire_event(&self, name: &str, args: &[Value]) -> Result<Vec<Value>, String>;
    /// Record that a connection wants to be notified of the named
    /// events under the given handler ids. There is no live plugin
    /// process to deliver the notification to, so this only updates
    /// bookkeeping a future transport could read; see DESIGN.md.
    fn call_on_event(&self, handlers: HashMap<String, String>);
}

/// Accept connections on `socket_path` until the reactor stops. Must run
/// inside the same `LocalSet` as the reactor, since `handler` is `Rc`-based.
pub async fn serve(socket_path: &Path, handler: Rc<dyn BrokerRpc>) -> std::io::Result<()> {
    if socket_path.exists() {
        std::fs::remove_file(socket_path)?;
    }
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let listener = UnixListener::bind(socket_path)?;
    tracing::info!(path = %socket_path.display(), "rpc socket listening");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let handler = handler.clone();
        tokio::task::spawn_local(async move {
            if let Err(error) = handle_connection(stream, handler).await {
                tracing::warn!(%error, "rpc connection ended with an error");
            }
        });
    }
}

async fn handle_connection(stream: UnixStream, handler: Rc<dyn BrokerRpc>) -> std::io::Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new());

    while let Some(line) = framed.next().await {
        let line = line.map_err(|error| std::io::Error::other(error.to_string()))?;
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => dispatch(&*handler, request),
            Err(error) => Response::error(format!("malformed request: {error}")),
        };
        let encoded = serde_json::to_string(&response).unwrap_or_else(|_| {
            r#"{"status":"error","message":"failed to encode response"}"#.to_string()
        });
        framed
            .send(encoded)
            .await
            .map_err(|error| std::io::Error::other(error.to_string()))?;
    }
    Ok(())
}

fn dispatch(handler: &dyn BrokerRpc, request: Request) -> Response {
    match request {
        Request::SendMessage { message, urgent, .. } => {
            match handler.send_message(json_to_value(message), urgent) {
                Ok(id) => Response::ok(id as i64),
                Err(error) => Response::error(error),
            }
        }
        Request::RegisterClientAcceptedMessageType { message_type } => {
            handler.register_client_accepted_message_type(&message_type);
            Response::ok(true)
        }
        Request::RegisterClient { name } => Response::ok(handler.register_client(&name)),
        Request::Ping => Response::ok(handler.ping()),
        Request::StopExchanger => {
            handler.stop_exchanger();
            Response::ok(true)
        }
        Request::FireEvent { name, args } => {
            let args: Vec<Value> = args.into_iter().map(json_to_value).collect();
            match handler.fire_event(&name, &args) {
                Ok(results) => {
                    Response::ok(serde_json::Value::Array(results.iter().map(value_to_json).collect()))
                }
                Err(error) => Response::error(error),
            }
        }
        Request::CallOnEvent { handlers } => {
            handler.call_on_event(handlers);
            Response::ok(true)
        }
    }
}
