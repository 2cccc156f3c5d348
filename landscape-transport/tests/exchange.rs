use landscape_schema::Value;
use landscape_transport::{Transport, TransportConfig};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn posts_wire_encoded_payload_and_decodes_response() {
    let server = MockServer::start().await;

    let response_body = landscape_transport::wire::encode(&Value::map([(
        "next-expected-sequence".to_string(),
        Value::Int(3),
    )]));

    Mock::given(method("POST"))
        .and(path("/message-system"))
        .and(header("X-Computer-ID", "secure-123"))
        .and(header("X-Message-API", "3.3"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(response_body))
        .mount(&server)
        .await;

    let url = format!("{}/message-system", server.uri()).parse().unwrap();
    let transport = Transport::new(TransportConfig::new(url)).unwrap();

    let payload = Value::map([("sequence".to_string(), Value::Int(0))]);
    let response = transport
        .exchange(&payload, Some("secure-123"), "3.3", None)
        .await
        .unwrap();

    assert_eq!(
        response
            .as_map()
            .unwrap()
            .get("next-expected-sequence")
            .unwrap()
            .as_int(),
        Some(3)
    );
}

#[tokio::test]
async fn non_success_status_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = server.uri().parse().unwrap();
    let transport = Transport::new(TransportConfig::new(url)).unwrap();
    let payload = Value::Map(Default::default());

    let result = transport.exchange(&payload, None, "3.3", None).await;
    assert!(result.is_err());
}
