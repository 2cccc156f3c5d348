//! Ties the message-exchange core together into one running broker:
//! loads configuration, wires every `landscape-*` component onto a
//! single reactor, and serves the plugin RPC surface alongside it.
//! Grounded on `da-indexer-server`'s `run()`/`Settings` split.

mod broker;
mod cli;
mod logging;
pub mod rpc;
mod settings;

pub use broker::Broker;
pub use cli::Args;
pub use settings::BrokerSettings;

use std::rc::Rc;

pub fn init_logging(settings: &BrokerSettings) {
    logging::init(&settings.tracing);
}

/// Run the broker to completion: start the exchange/pinger cadence,
/// serve the RPC socket, and drive the reactor until something calls
/// `Event::Stop`'s handler path (currently: nothing does, in this
/// binary -- the process runs until killed, matching the historical
/// `landscape-client` daemon).
pub async fn run(settings: BrokerSettings) -> anyhow::Result<()> {
    settings.apply_proxy_env();
    let broker = Broker::build(&settings)?;

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            broker.start();

            let rpc_handler: Rc<dyn rpc::BrokerRpc> = broker.clone();
            let socket_path = settings.rpc.socket_path.clone();
            tokio::task::spawn_local(async move {
                if let Err(error) = rpc::serve(&socket_path, rpc_handler).await {
                    tracing::error!(%error, "rpc server exited");
                }
            });

            broker.reactor().run().await;
        })
        .await;

    Ok(())
}
