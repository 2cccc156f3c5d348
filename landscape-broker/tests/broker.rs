use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream as StdUnixStream;
use std::rc::Rc;
use std::time::Duration;

use landscape_broker::rpc::BrokerRpc;
use landscape_broker::{Broker, BrokerSettings};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn settings(dir: &std::path::Path, url: url::Url) -> BrokerSettings {
    let mut settings = BrokerSettings::default();
    settings.data_path = dir.to_path_buf();
    settings.log_dir = dir.join("log");
    settings.pinger.enabled = false;
    settings.transport.url = url;
    settings.rpc.socket_path = dir.join("broker.sock");
    settings
}

/// `Broker::build` wires a `MessageStore`/`Identity`/`Transport` that
/// actually talk to a mock server: queueing a registration message and
/// letting one exchange run end to end proves the wiring, not just that
/// each crate compiles in isolation.
#[tokio::test]
async fn a_built_broker_registers_against_a_mock_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/message-system"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            landscape_transport::wire::encode(&landscape_schema::Value::map([(
                "next-expected-sequence".to_string(),
                landscape_schema::Value::Int(1),
            )])),
            "application/octet-stream",
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut settings = settings(dir.path(), format!("{}/message-system", server.uri()).parse().unwrap());
    settings.identity.computer_title = Some("test-host".to_string());
    settings.identity.account_name = Some("test-account".to_string());

    let broker = Broker::build(&settings).unwrap();

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            broker.start();
            let reactor = broker.reactor().clone();
            let task = tokio::task::spawn_local(async move { reactor.run().await });

            tokio::time::sleep(Duration::from_millis(200)).await;
            broker.reactor().stop();
            let _ = task.await;
        })
        .await;
}

#[tokio::test]
async fn the_rpc_socket_answers_a_ping_request() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path(), format!("{}/message-system", server.uri()).parse().unwrap());
    let socket_path = settings.rpc.socket_path.clone();

    let broker = Broker::build(&settings).unwrap();

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            broker.start();
            let reactor = broker.reactor().clone();
            let reactor_task = tokio::task::spawn_local(async move { reactor.run().await });

            let rpc_handler: Rc<dyn BrokerRpc> = broker.clone();
            let socket_path_clone = socket_path.clone();
            tokio::task::spawn_local(async move {
                landscape_broker::rpc::serve(&socket_path_clone, rpc_handler).await.ok();
            });

            for _ in 0..50 {
                if socket_path.exists() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let response = tokio::task::spawn_blocking({
                let socket_path = socket_path.clone();
                move || -> std::io::Result<String> {
                    let mut stream = StdUnixStream::connect(&socket_path)?;
                    stream.write_all(b"{\"method\":\"ping\"}\n")?;
                    let mut reader = BufReader::new(stream);
                    let mut line = String::new();
                    reader.read_line(&mut line)?;
                    Ok(line)
                }
            })
            .await
            .unwrap()
            .unwrap();

            assert!(response.contains("\"result\":true"));

            broker.reactor().stop();
            let _ = reactor_task.await;
        })
        .await;
}
