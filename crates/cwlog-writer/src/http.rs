// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! [`DeliveryClient`] speaking the CloudWatch Logs JSON protocol over HTTP.
//!
//! Requests are `POST`s to the configured endpoint with
//! `X-Amz-Target: Logs_20140328.PutLogEvents` and an
//! `application/x-amz-json-1.1` body. Failures are mapped to
//! [`DeliveryError`] from the `__type` of the error body, so the writer can
//! tell a stale sequence token from a missing stream or a throttled request.
//!
//! Requests are not signed. Point the client at an endpoint that does not
//! require SigV4 (a local emulator or a signing proxy), or pass whatever
//! authentication headers it needs through [`HttpClientConfig::headers`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use crate::client::{DeliveryClient, Destination};
use crate::errors::{DeliveryError, WriterError};
use crate::event::LogEvent;

const AMZ_JSON: &str = "application/x-amz-json-1.1";
const PUT_LOG_EVENTS_TARGET: &str = "Logs_20140328.PutLogEvents";

/// Error codes that no retry can fix.
const PERMANENT_ERROR_CODES: [&str; 4] = [
    "InvalidParameterException",
    "AccessDeniedException",
    "UnrecognizedClientException",
    "MissingAuthenticationTokenException",
];

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the logs API, e.g. `https://logs.us-east-1.amazonaws.com`
    pub endpoint: String,
    /// Per-request timeout
    pub timeout: Duration,
    pub https_proxy: Option<String>,
    /// Extra headers sent with every request
    pub headers: Vec<(String, String)>,
}

impl HttpClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(10),
            https_proxy: None,
            headers: Vec::new(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    log_events: &'a [LogEvent],
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsResponse {
    next_sequence_token: Option<String>,
}

#[derive(Deserialize, Default)]
struct ErrorResponse {
    #[serde(rename = "__type")]
    error_type: Option<String>,
    #[serde(alias = "Message")]
    message: Option<String>,
    #[serde(rename = "expectedSequenceToken")]
    expected_sequence_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LogsApiClient {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl LogsApiClient {
    /// Fails with [`WriterError::InvalidConfig`] when an extra header is not a
    /// valid HTTP header.
    pub fn new(config: HttpClientConfig) -> Result<Self, WriterError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(AMZ_JSON));
        headers.insert(
            HeaderName::from_static("x-amz-target"),
            HeaderValue::from_static(PUT_LOG_EVENTS_TARGET),
        );
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| WriterError::InvalidConfig(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| WriterError::InvalidConfig(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        Ok(Self {
            client: get_client(&config),
            endpoint: config.endpoint,
            headers,
        })
    }
}

/// Builds the HTTP client, falling back to a direct connection when the proxy
/// configuration is unusable.
fn get_client(config: &HttpClientConfig) -> reqwest::Client {
    let builder = || reqwest::Client::builder().timeout(config.timeout);

    let with_proxy = match &config.https_proxy {
        Some(proxy) => reqwest::Proxy::https(proxy).and_then(|p| builder().proxy(p).build()),
        None => builder().build(),
    };

    match with_proxy {
        Ok(client) => client,
        Err(e) => {
            error!("CWLOG | Unable to build HTTP client: {e}, falling back to direct connection");
            builder().build().unwrap_or_else(|inner| {
                error!("CWLOG | Failed to build HTTP client: {inner}, using reqwest defaults");
                reqwest::Client::new()
            })
        }
    }
}

#[async_trait]
impl DeliveryClient for LogsApiClient {
    async fn put_log_events(
        &self,
        destination: &Destination,
        events: &[LogEvent],
        sequence_token: Option<&str>,
    ) -> Result<Option<String>, DeliveryError> {
        let body = PutLogEventsRequest {
            log_group_name: &destination.log_group,
            log_stream_name: &destination.log_stream,
            log_events: events,
            sequence_token,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Other(format!("request failed: {e}")))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DeliveryError::Other(format!("failed to read response: {e}")))?;

        if status.is_success() {
            if bytes.is_empty() {
                return Ok(None);
            }
            let parsed: PutLogEventsResponse = serde_json::from_slice(&bytes)
                .map_err(|e| DeliveryError::Other(format!("invalid response body: {e}")))?;
            debug!("CWLOG | PutLogEvents accepted {} events", events.len());
            return Ok(parsed.next_sequence_token);
        }

        let parsed: ErrorResponse = serde_json::from_slice(&bytes).unwrap_or_default();
        Err(map_error(status.as_u16(), parsed))
    }
}

fn map_error(status: u16, resp: ErrorResponse) -> DeliveryError {
    let code = resp
        .error_type
        .as_deref()
        .and_then(|t| t.rsplit('#').next())
        .unwrap_or_default()
        .to_string();
    let message = resp.message.unwrap_or_default();

    match code.as_str() {
        "DataAlreadyAcceptedException" => DeliveryError::AlreadyAccepted {
            expected_sequence_token: resp.expected_sequence_token,
        },
        "InvalidSequenceTokenException" => DeliveryError::InvalidSequenceToken {
            expected_sequence_token: resp.expected_sequence_token,
        },
        "ResourceNotFoundException" => DeliveryError::ResourceNotFound(message),
        c if PERMANENT_ERROR_CODES.contains(&c) => DeliveryError::Rejected(format!("{c}: {message}")),
        "" => DeliveryError::Other(format!("{status}: {message}")),
        c => DeliveryError::Other(format!("{status} {c}: {message}")),
    }
}
