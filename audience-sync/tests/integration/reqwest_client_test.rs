use std::time::Duration;

use audience_sync::dispatch::ReqwestHttpClient;
use audience_sync::error::ErrorKind;
use audience_sync::test_utils::records::{device_record, email_record, idfa_record};
use audience_sync::upstream::{
    CustomerListIdentifierType, CustomerListUpstream, DeviceAudienceUpstream,
};
use audience_sync::AudienceSyncEngine;
use secrecy::Secret;
use serde_json::json;
use telemetry::init_test_tracing;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MEMBERSHIP_PATH: &str = "/advertiser_name/AudienceMembership";

fn device_engine(
    server: &MockServer,
    timeout: Duration,
) -> AudienceSyncEngine<DeviceAudienceUpstream, ReqwestHttpClient> {
    AudienceSyncEngine::new(
        DeviceAudienceUpstream::new(
            Secret::new("test-api-key-12345".to_owned()),
            "advertiser_name",
        )
        .with_base_url(server.uri()),
        ReqwestHttpClient::new(timeout).unwrap(),
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_reports_each_partition_from_real_responses_test() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MEMBERSHIP_PATH))
        .and(body_json(json!({
            "api_key": "test-api-key-12345",
            "device_identities": [
                {"type": "IDFA", "value": "D4567890-89AB-CDEF-0123-456789ABCDEF"},
                {"type": "GAID", "value": "44444444-4444-4444-4444-444444444444"},
                {"type": "IDFA", "value": "F6789012-89AB-CDEF-0123-456789ABCDEF"},
                {"type": "GAID", "value": "66666666-6666-6666-6666-666666666666"}
            ],
            "audiences": [
                {"audience_id": -514092063, "audience_name": "Active Users", "action": "add"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(MEMBERSHIP_PATH))
        .and(body_json(json!({
            "api_key": "test-api-key-12345",
            "device_identities": [
                {"type": "IDFA", "value": "E5678901-89AB-CDEF-0123-456789ABCDEF"},
                {"type": "GAID", "value": "55555555-5555-5555-5555-555555555555"}
            ],
            "audiences": [
                {"audience_id": -514092063, "audience_name": "Active Users", "action": "remove"}
            ]
        })))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(json!({"error": "Service Unavailable"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let records = vec![
        device_record(
            "aud_active_users_2024",
            "Active Users",
            "D4567890-89AB-CDEF-0123-456789ABCDEF",
            "44444444-4444-4444-4444-444444444444",
            true,
        ),
        device_record(
            "aud_active_users_2024",
            "Active Users",
            "E5678901-89AB-CDEF-0123-456789ABCDEF",
            "55555555-5555-5555-5555-555555555555",
            false,
        ),
        device_record(
            "aud_active_users_2024",
            "Active Users",
            "F6789012-89AB-CDEF-0123-456789ABCDEF",
            "66666666-6666-6666-6666-666666666666",
            true,
        ),
    ];

    let outcomes = device_engine(&server, Duration::from_secs(5))
        .run_batch(&records)
        .await
        .unwrap();

    assert!(outcomes[0].is_success());
    assert!(outcomes[2].is_success());
    assert_eq!(outcomes[1].http_status(), Some(503));
    assert_eq!(outcomes[1].error_code(), Some("SERVICE_UNAVAILABLE"));
    assert_eq!(outcomes[1].error_message(), Some("Service Unavailable"));
}

#[tokio::test(flavor = "multi_thread")]
async fn single_mode_raises_unauthorized_response_test() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MEMBERSHIP_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": "Unauthorized", "message": "Invalid API key"})),
        )
        .mount(&server)
        .await;

    let record = device_record(
        "aud_test_error",
        "Test Audience",
        "AAAA0000-89AB-CDEF-0123-456789ABCDEF",
        "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa",
        true,
    );
    let err = device_engine(&server, Duration::from_secs(5))
        .run_single(&record)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UpstreamAuthenticationFailed);
    assert_eq!(err.http_status(), Some(401));
    assert_eq!(err.message(), "Invalid API key");
}

#[tokio::test(flavor = "multi_thread")]
async fn plain_text_error_bodies_are_kept_test() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MEMBERSHIP_PATH))
        .respond_with(ResponseTemplate::new(502).set_body_string("upstream proxy failure"))
        .mount(&server)
        .await;

    let record = device_record("VIP", "VIP", "ios", "android", true);
    let outcomes = device_engine(&server, Duration::from_secs(5))
        .run_batch(&[record])
        .await
        .unwrap();

    assert_eq!(outcomes[0].http_status(), Some(502));
    assert_eq!(outcomes[0].error_code(), Some("BAD_GATEWAY"));
    assert_eq!(outcomes[0].error_message(), Some("upstream proxy failure"));
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_upstream_times_out_test() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(MEMBERSHIP_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let record = device_record("VIP", "VIP", "ios", "android", true);
    let outcomes = device_engine(&server, Duration::from_millis(100))
        .run_batch(&[record])
        .await
        .unwrap();

    assert!(outcomes[0].is_failure());
    assert_eq!(outcomes[0].error_code(), Some("ETIMEDOUT"));
    assert_eq!(outcomes[0].http_status(), None);
}

#[tokio::test(flavor = "multi_thread")]
async fn customer_list_partial_errors_over_http_test() {
    init_test_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/CustomerListUserData/Apply"))
        .and(header("Authorization", "Bearer access"))
        .and(header("DeveloperToken", "developer"))
        .and(header("CustomerId", "123"))
        .and(header("CustomerAccountId", "456"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "PartialErrors": [{
                "Index": 1,
                "Code": 4104,
                "ErrorCode": "CustomerListItemInvalid",
                "Message": "The customer list item is invalid."
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let engine = AudienceSyncEngine::new(
        CustomerListUpstream::new(
            Secret::new("access".to_owned()),
            Secret::new("developer".to_owned()),
            "123",
            "456",
            CustomerListIdentifierType::Email,
        )
        .with_base_url(server.uri()),
        ReqwestHttpClient::new(Duration::from_secs(5)).unwrap(),
    );

    let records = vec![
        email_record("789", "first@example.com", true),
        email_record("789", "second@example.com", true),
        email_record("789", "SECOND@example.com ", true),
    ];
    let outcomes = engine.run_batch(&records).await.unwrap();

    assert!(outcomes[0].is_success());
    for outcome in &outcomes[1..] {
        assert_eq!(outcome.http_status(), Some(4104));
        assert_eq!(outcome.error_code(), Some("CustomerListItemInvalid"));
        assert_eq!(
            outcome.error_message(),
            Some("CustomerListItemInvalid: The customer list item is invalid.")
        );
    }
}

const TRUNCATED_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
    Content-Type: application/json\r\n\
    Content-Length: 100\r\n\r\n\
    {\"success\"";

const COMPLETE_RESPONSE: &str = "HTTP/1.1 200 OK\r\n\
    Content-Type: application/json\r\n\
    Content-Length: 16\r\n\
    Connection: close\r\n\r\n\
    {\"success\":true}";

/// Reads one HTTP/1.1 request, headers and `Content-Length` body, and returns it as text.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut request = Vec::new();
    let mut chunk = [0u8; 1024];

    loop {
        let read = stream.read(&mut chunk).await.unwrap();
        if read == 0 {
            break;
        }
        request.extend_from_slice(&chunk[..read]);

        let text = String::from_utf8_lossy(&request);
        if let Some(headers_end) = text.find("\r\n\r\n") {
            let content_length = text[..headers_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if request.len() >= headers_end + 4 + content_length {
                break;
            }
        }
    }

    String::from_utf8_lossy(&request).into_owned()
}

/// Serves every connection with a 200. Requests mentioning `truncated_audience` get a body that
/// is shorter than its `Content-Length` before the connection closes.
async fn serve_truncating(listener: TcpListener, truncated_audience: &'static str) {
    loop {
        let Ok((mut stream, _)) = listener.accept().await else {
            return;
        };

        tokio::spawn(async move {
            let request = read_request(&mut stream).await;
            let response = if request.contains(truncated_audience) {
                TRUNCATED_RESPONSE
            } else {
                COMPLETE_RESPONSE
            };
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        });
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn truncated_body_fails_only_its_partition_test() {
    init_test_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(serve_truncating(listener, "Active"));

    let engine = AudienceSyncEngine::new(
        DeviceAudienceUpstream::new(Secret::new("test-api-key".to_owned()), "advertiser_name")
            .with_base_url(base_url),
        ReqwestHttpClient::new(Duration::from_secs(5)).unwrap(),
    );
    let records = vec![
        idfa_record("Active", "a1", true),
        idfa_record("Churned", "c1", true),
    ];

    let outcomes = engine.run_batch(&records).await.unwrap();

    assert!(outcomes[0].is_failure());
    assert_eq!(outcomes[0].http_status(), Some(200));
    assert_eq!(outcomes[0].error_code(), Some("UPSTREAM_REQUEST_FAILED"));
    assert!(outcomes[1].is_success());
    assert_eq!(outcomes[1].http_status(), Some(200));
}
