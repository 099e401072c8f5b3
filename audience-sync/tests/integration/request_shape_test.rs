use audience_sync::partition::partition;
use audience_sync::test_utils::records::{device_record, email_record};
use audience_sync::upstream::{
    AudienceUpstream, CustomerListIdentifierType, CustomerListUpstream, DeviceAudienceUpstream,
};
use insta::assert_json_snapshot;
use secrecy::Secret;

#[test]
fn device_audience_request_shape_test() {
    let upstream = DeviceAudienceUpstream::new(
        Secret::new("test-api-key-12345".to_owned()),
        "advertiser_name",
    );
    let records = vec![
        device_record(
            "aud_mobile_app_users",
            "Mobile App Users",
            "a1234567-89ab-cdef-0123-456789abcdef",
            "11111111-1111-1111-1111-111111111111",
            true,
        ),
        device_record(
            "aud_mobile_app_users",
            "Mobile App Users",
            "B2345678-89AB-CDEF-0123-456789ABCDEF",
            "22222222-2222-2222-2222-222222222222",
            true,
        ),
    ];

    let plan = partition(&records, |kind| upstream.accepts(kind));
    let request = upstream.build_request(&plan.partitions[0]).unwrap();

    insta::with_settings!({sort_maps => true}, {
        assert_json_snapshot!(request.body, @r#"
        {
          "api_key": "test-api-key-12345",
          "audiences": [
            {
              "action": "add",
              "audience_id": -646589252,
              "audience_name": "Mobile App Users"
            }
          ],
          "device_identities": [
            {
              "type": "IDFA",
              "value": "A1234567-89AB-CDEF-0123-456789ABCDEF"
            },
            {
              "type": "GAID",
              "value": "11111111-1111-1111-1111-111111111111"
            },
            {
              "type": "IDFA",
              "value": "B2345678-89AB-CDEF-0123-456789ABCDEF"
            },
            {
              "type": "GAID",
              "value": "22222222-2222-2222-2222-222222222222"
            }
          ]
        }
        "#);
    });
}

#[test]
fn customer_list_request_shape_test() {
    let upstream = CustomerListUpstream::new(
        Secret::new("access".to_owned()),
        Secret::new("developer".to_owned()),
        "123",
        "456",
        CustomerListIdentifierType::Email,
    );
    let records = vec![
        email_record("789", "test@example.com", false),
        email_record("789", " Test@Example.com", false),
    ];

    let plan = partition(&records, |kind| upstream.accepts(kind));
    let request = upstream.build_request(&plan.partitions[0]).unwrap();

    insta::with_settings!({sort_maps => true}, {
        assert_json_snapshot!(request.body, @r#"
        {
          "CustomerListUserData": {
            "ActionType": "Remove",
            "AudienceId": "789",
            "CustomerListItemSubType": "Email",
            "CustomerListItems": [
              "973dfe463ec85785f5f95af5ba3906eedb2d931c24e69824a89ea65dba4e813b"
            ]
          }
        }
        "#);
    });
}
