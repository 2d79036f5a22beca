// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use cwlog_writer::http::{HttpClientConfig, LogsApiClient};
use cwlog_writer::{DeliveryClient, DeliveryError, Destination, LogEvent, LogWriter, WriterConfig};
use mockito::{Matcher, Server};
use std::sync::Arc;
use std::time::Duration;

fn client_for(server: &Server) -> LogsApiClient {
    let mut config = HttpClientConfig::new(server.url());
    config.timeout = Duration::from_secs(5);
    config.headers.push(("x-test-auth".to_string(), "secret".to_string()));
    LogsApiClient::new(config).expect("failed to create client")
}

#[tokio::test]
async fn put_log_events_sends_protocol_headers_and_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_header("X-Amz-Target", "Logs_20140328.PutLogEvents")
        .match_header("Content-Type", "application/x-amz-json-1.1")
        .match_header("x-test-auth", "secret")
        .match_body(Matcher::PartialJsonString(
            r#"{"logGroupName":"group","logStreamName":"stream","sequenceToken":"41","logEvents":[{"message":"hello","timestamp":1000}]}"#
                .to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"42"}"#)
        .create_async()
        .await;

    let client = client_for(&server);
    let token = client
        .put_log_events(
            &Destination::new("group", "stream"),
            &[LogEvent::new("hello", 1000)],
            Some("41"),
        )
        .await
        .expect("delivery should succeed");

    mock.assert_async().await;
    assert_eq!(token, Some("42".to_string()));
}

#[tokio::test]
async fn put_log_events_maps_stale_token() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(400)
        .with_body(
            r#"{"__type":"InvalidSequenceTokenException","message":"The given sequenceToken is invalid.","expectedSequenceToken":"42"}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .put_log_events(&Destination::new("g", "s"), &[LogEvent::new("x", 1)], None)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        DeliveryError::InvalidSequenceToken {
            expected_sequence_token: Some("42".to_string())
        }
    );
}

#[tokio::test]
async fn put_log_events_server_error_is_transient() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/")
        .with_status(503)
        .with_body("unavailable")
        .create_async()
        .await;

    let client = client_for(&server);
    let err = client
        .put_log_events(&Destination::new("g", "s"), &[LogEvent::new("x", 1)], None)
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Other(_)));
}

#[tokio::test]
async fn writer_ships_through_http_client() {
    let mut server = Server::new_async().await;
    let first = server
        .mock("POST", "/")
        .match_body(Matcher::PartialJsonString(
            r#"{"logEvents":[{"message":"one"},{"message":"two"}]}"#.to_string(),
        ))
        .with_status(200)
        .with_body(r#"{"nextSequenceToken":"t1"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = Arc::new(client_for(&server));
    let writer = LogWriter::new(WriterConfig::new("group", "stream"), client)
        .expect("failed to start writer");

    writer.write(b"one\ntwo\n").expect("write failed");
    writer.close().await.expect("close failed");

    first.assert_async().await;
    assert_eq!(writer.sequence_token().await, Some("t1".to_string()));
}
