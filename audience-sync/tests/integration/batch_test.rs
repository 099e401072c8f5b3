use std::time::Duration;

use audience_sync::dispatch::HttpResponse;
use audience_sync::error::ErrorKind;
use audience_sync::sync_error;
use audience_sync::test_utils::http::{MockHttpClient, MockResponse};
use audience_sync::test_utils::records::{device_record, idfa_record, vip_records};
use audience_sync::types::{IdentifierKind, MembershipRecord, RecordOutcome};
use audience_sync::upstream::DeviceAudienceUpstream;
use audience_sync::{AudienceSyncEngine, RunMode, RunOutput};
use secrecy::Secret;
use serde_json::json;
use telemetry::init_test_tracing;

const AUDIENCE_ID: &str = "/audiences/0/audience_id";
const ACTION: &str = "/audiences/0/action";

fn device_upstream() -> DeviceAudienceUpstream {
    DeviceAudienceUpstream::new(Secret::new("test-api-key".to_owned()), "advertiser_name")
        .with_hashed_audience_id(false)
}

fn engine(client: MockHttpClient) -> AudienceSyncEngine<DeviceAudienceUpstream, MockHttpClient> {
    AudienceSyncEngine::new(device_upstream(), client)
}

fn device_values(request_body: &serde_json::Value) -> Vec<String> {
    request_body["device_identities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|identity| identity["value"].as_str().unwrap().to_owned())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn vip_scenario_splits_add_and_remove_test() {
    init_test_tracing();
    let engine = engine(MockHttpClient::new());
    let records = vip_records();

    let output = engine.run(&records, RunMode::Batch).await.unwrap();
    let RunOutput::Batch(outcomes) = output else {
        panic!("batch mode must return batch output");
    };

    assert_eq!(outcomes.len(), 3);
    for (index, outcome) in outcomes.iter().enumerate() {
        assert!(outcome.is_success(), "record {index} should succeed");
        assert_eq!(outcome.sent(), &records[index]);
        assert_eq!(outcome.http_status(), Some(200));
    }

    let requests = engine.client().requests().await;
    assert_eq!(requests.len(), 2);

    let adds = engine.client().requests_where(ACTION, "add").await;
    assert_eq!(adds.len(), 1);
    assert_eq!(device_values(&adds[0].body), vec!["U1", "U2"]);

    let removes = engine.client().requests_where(ACTION, "remove").await;
    assert_eq!(removes.len(), 1);
    assert_eq!(device_values(&removes[0].body), vec!["U3"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn every_input_gets_exactly_one_outcome_test() {
    init_test_tracing();

    for size in [0usize, 1, 5, 37] {
        let records = (0..size)
            .map(|i| match i % 5 {
                0 => MembershipRecord::new("Active", "Active", true),
                1 => idfa_record("", &format!("user-{i}"), true),
                _ => idfa_record(
                    if i % 2 == 0 { "Active" } else { "Churned" },
                    &format!("user-{}", i % 4),
                    i % 3 == 0,
                ),
            })
            .collect::<Vec<_>>();

        let client = MockHttpClient::new().fail_when(
            AUDIENCE_ID,
            "Churned",
            sync_error!(ErrorKind::UpstreamConnectionFailed, "Upstream connection failed"),
        );
        let outcomes = engine(client).run_batch(&records).await.unwrap();

        assert_eq!(outcomes.len(), size);
        for (index, outcome) in outcomes.iter().enumerate() {
            assert_eq!(outcome.sent(), &records[index]);
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn equivalent_identifiers_are_sent_once_test() {
    init_test_tracing();
    let records = vec![
        idfa_record("VIP", "abc", true),
        idfa_record("VIP", " ABC ", true),
        idfa_record("VIP", "def", true),
    ];

    let first = engine(MockHttpClient::new());
    let outcomes = first.run_batch(&records).await.unwrap();
    assert!(outcomes.iter().all(RecordOutcome::is_success));

    let requests = first.client().requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(device_values(&requests[0].body), vec!["ABC", "DEF"]);

    let body = json!({"partial_errors": [{"index": 0, "code": "X", "message": "rejected"}]});
    let client =
        MockHttpClient::new().respond_when(ACTION, "add", HttpResponse::new(200, Some(body)));
    let outcomes = engine(client).run_batch(&records).await.unwrap();

    assert!(outcomes[0].is_failure());
    assert!(outcomes[1].is_failure());
    assert_eq!(outcomes[0].error_code(), outcomes[1].error_code());
    assert_eq!(outcomes[0].error_message(), outcomes[1].error_message());
    assert!(outcomes[2].is_success());
}

#[tokio::test(flavor = "multi_thread")]
async fn partial_errors_map_to_original_records_test() {
    init_test_tracing();
    let records = vec![
        idfa_record("VIP", "A", true),
        idfa_record("VIP", "B", true),
        idfa_record("VIP", "C", true),
    ];
    let body = json!({
        "success": true,
        "partial_errors": [{"index": 1, "code": "X", "message": "unknown device"}]
    });
    let client =
        MockHttpClient::new().respond_when(ACTION, "add", HttpResponse::new(200, Some(body)));

    let outcomes = engine(client).run_batch(&records).await.unwrap();

    assert!(outcomes[0].is_success());
    assert!(outcomes[2].is_success());
    match &outcomes[1] {
        RecordOutcome::Failure {
            http_status,
            error_code,
            error_message,
            body,
            sent,
        } => {
            assert_eq!(*http_status, Some(400));
            assert_eq!(error_code, "X");
            assert_eq!(error_message, "unknown device");
            assert_eq!(
                body,
                &Some(json!({"index": 1, "code": "X", "message": "unknown device"}))
            );
            assert_eq!(sent, &records[1]);
        }
        other => panic!("expected a failure, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failure_of_any_identifier_fails_the_record_test() {
    init_test_tracing();
    let records = vec![
        device_record("VIP", "VIP", "ios-1", "android-1", true),
        device_record("VIP", "VIP", "ios-2", "android-2", true),
    ];
    // Entries on the wire: IOS-1, android-1, IOS-2, android-2.
    let body = json!({"partial_errors": [{"index": 1, "code": "BAD_GAID", "message": "bad"}]});
    let client =
        MockHttpClient::new().respond_when(ACTION, "add", HttpResponse::new(200, Some(body)));

    let outcomes = engine(client).run_batch(&records).await.unwrap();

    assert_eq!(outcomes[0].error_code(), Some("BAD_GAID"));
    assert!(outcomes[1].is_success());
}

#[tokio::test(flavor = "multi_thread")]
async fn transport_failure_is_isolated_to_its_partition_test() {
    init_test_tracing();
    let records = vec![
        idfa_record("Active", "a1", true),
        idfa_record("Churned", "c1", true),
        idfa_record("Active", "a2", true),
        idfa_record("Churned", "c2", true),
    ];
    let client = MockHttpClient::new().fail_when(
        AUDIENCE_ID,
        "Active",
        sync_error!(
            ErrorKind::UpstreamConnectionFailed,
            "Upstream connection failed",
            "connection refused"
        ),
    );

    let outcomes = engine(client).run_batch(&records).await.unwrap();

    for index in [0, 2] {
        assert!(outcomes[index].is_failure());
        assert_eq!(outcomes[index].error_code(), Some("ECONNREFUSED"));
        assert_eq!(outcomes[index].error_message(), Some("connection refused"));
        assert_eq!(outcomes[index].http_status(), None);
    }
    for index in [1, 3] {
        assert!(outcomes[index].is_success());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn error_status_is_isolated_to_its_partition_test() {
    init_test_tracing();
    let records = vec![
        idfa_record("Active", "a1", true),
        idfa_record("Churned", "c1", false),
    ];
    let client = MockHttpClient::new().respond_when(
        AUDIENCE_ID,
        "Churned",
        HttpResponse::new(503, Some(json!({"error": "Service Unavailable"}))),
    );

    let outcomes = engine(client).run_batch(&records).await.unwrap();

    assert!(outcomes[0].is_success());
    assert_eq!(outcomes[1].http_status(), Some(503));
    assert_eq!(outcomes[1].error_code(), Some("SERVICE_UNAVAILABLE"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unusable_records_are_not_attempted_test() {
    init_test_tracing();
    let records = vec![
        MembershipRecord::new("VIP", "VIP", true)
            .with_identifier(IdentifierKind::Email, "user@example.com"),
        idfa_record("VIP", "u1", true),
        idfa_record("   ", "u2", true),
    ];

    let engine = engine(MockHttpClient::new());
    let outcomes = engine.run_batch(&records).await.unwrap();

    assert!(outcomes[0].is_not_attempted());
    assert_eq!(outcomes[0].error_code(), Some("MISSING_IDENTIFIER"));
    assert!(outcomes[1].is_success());
    assert!(outcomes[2].is_not_attempted());
    assert_eq!(outcomes[2].error_code(), Some("MISSING_AUDIENCE"));

    let requests = engine.client().requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(device_values(&requests[0].body), vec!["U1"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn rerunning_failed_subset_succeeds_test() {
    init_test_tracing();
    let records = vec![
        idfa_record("Active", "a1", true),
        idfa_record("Churned", "c1", true),
        idfa_record("Active", "a2", false),
    ];
    let client = MockHttpClient::new().fail_when(
        AUDIENCE_ID,
        "Active",
        sync_error!(ErrorKind::UpstreamTimeout, "Upstream request timed out"),
    );

    let outcomes = engine(client).run_batch(&records).await.unwrap();
    let retry = outcomes
        .iter()
        .filter(|outcome| outcome.is_failure())
        .map(|outcome| outcome.sent().clone())
        .collect::<Vec<_>>();
    assert_eq!(retry, vec![records[0].clone(), records[2].clone()]);

    let outcomes = engine(MockHttpClient::new()).run_batch(&retry).await.unwrap();
    assert_eq!(outcomes.len(), retry.len());
    for (outcome, record) in outcomes.iter().zip(&retry) {
        assert!(outcome.is_success());
        assert_eq!(outcome.sent(), record);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn partitions_are_dispatched_concurrently_test() {
    init_test_tracing();
    let records = vec![
        idfa_record("Active", "a1", true),
        idfa_record("Active", "a2", false),
        idfa_record("Churned", "c1", true),
    ];
    let engine = engine(MockHttpClient::new().with_rendezvous(3));

    let outcomes = tokio::time::timeout(Duration::from_secs(5), engine.run_batch(&records))
        .await
        .expect("partitions were not in flight at the same time")
        .unwrap();

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(RecordOutcome::is_success));
}

#[tokio::test(flavor = "multi_thread")]
async fn non_upstream_errors_abort_the_batch_test() {
    init_test_tracing();
    let client = MockHttpClient::new().with_default(MockResponse::Fail(sync_error!(
        ErrorKind::InvariantViolation,
        "Client state is corrupted"
    )));

    let err = engine(client).run_batch(&vip_records()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvariantViolation);
}
