use atmeex_cloud::{AtmeexClient, Error};
use serde_json::json;
use wiremock::matchers::{
    body_string_contains, header, method, path, query_param, query_param_is_missing,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn signin_mock() -> Mock {
    Mock::given(method("POST"))
        .and(path("/auth/signin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "access_token": "tok123", "expires_in": 3600 }
        })))
}

fn client(server: &MockServer) -> AtmeexClient {
    AtmeexClient::builder("a@b.com", "x")
        .base_url(server.uri())
        .build()
}

#[tokio::test]
async fn signin_payload_and_bearer_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/signin"))
        .and(body_string_contains("\"grant_type\":\"password\""))
        .and(body_string_contains("\"email\":\"a@b.com\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "access_token": "tok123", "expires_in": 3600 }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(header("authorization", "Bearer tok123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(&server);
    client.list_devices().await.expect("first list should succeed");
    // Token is good for ~3540 s: the second call must not sign in again.
    client.list_devices().await.expect("second list should succeed");
}

#[tokio::test]
async fn auth_retry_is_bounded() {
    let server = MockServer::start().await;
    signin_mock().expect(2).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(2)
        .mount(&server)
        .await;

    let err = client(&server).list_devices().await.unwrap_err();
    assert!(
        matches!(err, Error::Api { status: 401, .. }),
        "expected terminal 401, got {err:?}"
    );
}

#[tokio::test]
async fn signin_rejection_carries_body_not_password() {
    let server = MockServer::start().await;
    let long_body = format!("{{\"error\":\"{}\"}}", "e".repeat(400));
    Mock::given(method("POST"))
        .and(path("/auth/signin"))
        .respond_with(ResponseTemplate::new(403).set_body_string(long_body))
        .mount(&server)
        .await;

    let err = AtmeexClient::builder("a@b.com", "hunter2-secret")
        .base_url(server.uri())
        .build()
        .list_devices()
        .await
        .unwrap_err();

    match &err {
        Error::Auth { body, .. } => {
            assert!(body.chars().count() <= 200, "body should be truncated");
        }
        other => panic!("expected Auth error, got {other:?}"),
    }
    assert!(!err.to_string().contains("hunter2-secret"));
}

#[tokio::test]
async fn signin_accepts_alternative_token_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/signin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "alt-tok" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(header("authorization", "Bearer alt-tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).list_devices().await.expect("list should succeed");
}

#[tokio::test]
async fn signin_malformed_body_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/signin"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = client(&server).list_devices().await.unwrap_err();
    assert!(matches!(err, Error::Auth { .. }), "got {err:?}");
}

#[tokio::test]
async fn signin_body_without_token_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/signin"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&server)
        .await;

    let err = client(&server).list_devices().await.unwrap_err();
    assert!(matches!(err, Error::Auth { .. }), "got {err:?}");
}

#[tokio::test]
async fn list_devices_requests_telemetry() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(query_param("with_condition", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Bedroom", "condition": { "pwr_on": true, "fan_speed": 3 } }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let devices = client(&server).list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].name.as_deref(), Some("Bedroom"));
    assert!(devices[0].condition.is_some());
}

#[tokio::test]
async fn list_devices_accepts_data_envelope() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": 4 }, { "id": 9 }]
        })))
        .mount(&server)
        .await;

    let devices = client(&server).list_devices().await.unwrap();
    assert_eq!(devices.len(), 2);
}

#[tokio::test]
async fn list_devices_tolerates_mislabeled_content_type() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("[{\"id\": 2}]", "text/plain"),
        )
        .mount(&server)
        .await;

    let devices = client(&server).list_devices().await.unwrap();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, 2);
}

#[tokio::test]
async fn fallback_keeps_devices_with_failed_enrichment() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;

    // Primary telemetry list shape rejected with a server error.
    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(query_param("with_condition", "1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    // Degraded path: plain list, then per-device detail.
    Mock::given(method("GET"))
        .and(path("/devices"))
        .and(query_param_is_missing("with_condition"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "name": "Hall" },
            { "id": 2, "name": "Bedroom" },
            { "id": 3, "name": "Office" }
        ])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1, "name": "Hall", "condition": { "pwr_on": 1, "fan_speed": 2 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 2, "name": "Bedroom", "condition": { "pwr_on": 0 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/devices/3"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let devices = client(&server).list_devices().await.unwrap();
    assert_eq!(devices.len(), 3, "failed enrichment must not drop a device");

    let hall = devices.iter().find(|d| d.id == 1).unwrap();
    assert!(hall.condition.is_some());
    let office = devices.iter().find(|d| d.id == 3).unwrap();
    assert!(office.condition.is_none(), "device 3 keeps its partial record");
}

#[tokio::test]
async fn client_error_does_not_trigger_fallback() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/devices"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
        .mount(&server)
        .await;

    let err = client(&server).list_devices().await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 404, .. }), "got {err:?}");
}

#[tokio::test]
async fn set_power_sends_vendor_field() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/devices/5/params"))
        .and(body_string_contains("\"u_pwr_on\":true"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).set_power(5, true).await.expect("set_power should succeed");
}

#[tokio::test]
async fn set_target_temperature_encodes_deci_degrees() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/devices/5/params"))
        .and(body_string_contains("\"u_temp_room\":215"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .set_target_temperature(5, 21.5)
        .await
        .expect("set_target_temperature should succeed");
}

#[tokio::test]
async fn set_target_temperature_clamps_to_device_range() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/devices/5/params"))
        .and(body_string_contains("\"u_temp_room\":300"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).set_target_temperature(5, 45.0).await.unwrap();
}

#[tokio::test]
async fn set_fan_speed_clamps_to_range() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/devices/5/params"))
        .and(body_string_contains("\"u_fan_speed\":7"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).set_fan_speed(5, 99).await.unwrap();
}

#[tokio::test]
async fn set_humidity_stage_clamps_to_range() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/devices/5/params"))
        .and(body_string_contains("\"u_hum_stg\":3"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).set_humidity_stage(5, 9).await.unwrap();
}

#[tokio::test]
async fn set_damper_mode_respects_configured_positions() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/devices/5/params"))
        .and(body_string_contains("\"u_damp_pos\":2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    // 3-way fleet variant: position 3 clamps down to 2.
    let client = AtmeexClient::builder("a@b.com", "x")
        .base_url(server.uri())
        .damper_positions(3)
        .build();
    client.set_damper_mode(5, 3).await.unwrap();
}

#[tokio::test]
async fn write_failure_propagates() {
    let server = MockServer::start().await;
    signin_mock().mount(&server).await;
    Mock::given(method("PUT"))
        .and(path("/devices/5/params"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad field"))
        .mount(&server)
        .await;

    let err = client(&server).set_power(5, true).await.unwrap_err();
    assert!(matches!(err, Error::Api { status: 422, .. }), "got {err:?}");
}

#[tokio::test]
async fn transport_failure_is_distinct_from_api_error() {
    // Nothing listening on this port.
    let client = AtmeexClient::builder("a@b.com", "x")
        .base_url("http://127.0.0.1:9")
        .build();
    let err = client.list_devices().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {err:?}");
}
