use std::time::Duration;

use landscape_schema::Value;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest_middleware::ClientBuilder;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use url::Url;

use crate::error::{Result, TransportError};
use crate::wire;

const HEADER_COMPUTER_ID: &str = "X-Computer-ID";
const HEADER_MESSAGE_API: &str = "X-Message-API";
const HEADER_EXCHANGE_TOKEN: &str = "X-Exchange-Token";

/// Configuration for a single [`Transport`].
///
/// Mirrors `api-client-framework`'s `HttpApiClientConfig`: a timeout, a
/// retry budget, and a set of headers sent on every request.
pub struct TransportConfig {
    pub url: Url,
    pub http_timeout: Duration,
    pub max_retries: u32,
    pub user_agent: String,
    /// PEM-encoded certificates to trust in addition to the platform's
    /// default roots, e.g. the contents of `ssl_public_key`. Loading the
    /// file from disk is the caller's responsibility (see
    /// `landscape-broker::settings`); this type only needs the bytes.
    pub extra_root_certificates_pem: Vec<Vec<u8>>,
}

impl TransportConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            http_timeout: Duration::from_secs(60),
            max_retries: 0,
            user_agent: format!("landscape-client/{}", env!("CARGO_PKG_VERSION")),
            extra_root_certificates_pem: Vec::new(),
        }
    }
}

/// The HTTPS transport: POSTs a wire-encoded payload and returns the
/// wire-decoded response, or a structured error.
#[derive(Clone)]
pub struct Transport {
    url: Url,
    http_client: reqwest_middleware::ClientWithMiddleware,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_str(&config.user_agent).unwrap_or(HeaderValue::from_static(
                "landscape-client",
            )),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(config.http_timeout);

        for pem in &config.extra_root_certificates_pem {
            if let Ok(cert) = reqwest::Certificate::from_pem(pem) {
                builder = builder.add_root_certificate(cert);
            }
        }

        let reqwest_client = builder
            .build()
            .map_err(|source| TransportError::Network(reqwest_middleware::Error::Reqwest(source)))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let http_client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Transport {
            url: config.url,
            http_client,
        })
    }

    /// POST `payload` to the configured URL and decode the response.
    ///
    /// `secure_id` is omitted from `X-Computer-ID` until registration
    /// completes (see spec §6.1); `exchange_token`, when present, is
    /// forwarded but never required.
    #[tracing::instrument(skip(self, payload), fields(server_api))]
    pub async fn exchange(
        &self,
        payload: &Value,
        secure_id: Option<&str>,
        server_api: &str,
        exchange_token: Option<&str>,
    ) -> Result<Value> {
        let body = wire::encode(payload);

        let mut request = self
            .http_client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(HEADER_MESSAGE_API, server_api)
            .body(body);

        if let Some(secure_id) = secure_id {
            request = request.header(HEADER_COMPUTER_ID, secure_id);
        }
        if let Some(token) = exchange_token {
            request = request.header(HEADER_EXCHANGE_TOKEN, token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "exchange request failed");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let bytes = response.bytes().await.map_err(TransportError::Body)?;
        let value = wire::decode(&bytes)?;
        Ok(value)
    }
}
