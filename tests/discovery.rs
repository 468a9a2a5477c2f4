use std::time::Duration;

use hue_timeline_rs::{DiscoveryOptions, discover_bridges, probe_bridge};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[tokio::test]
async fn test_probe_accepts_bridge_config() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Living room bridge",
            "bridgeid": "001788FFFE123456",
            "modelid": "BSB002",
            "swversion": "1948086000"
        })))
        .mount(&server)
        .await;

    let address = server.address().to_string();
    let candidate = probe_bridge(&reqwest::Client::new(), &address, PROBE_TIMEOUT)
        .await
        .expect("bridge is confirmed");
    assert_eq!(candidate.address, address);
    assert_eq!(candidate.id, "001788FFFE123456");
    assert_eq!(candidate.name, "Living room bridge");
}

#[tokio::test]
async fn test_probe_accepts_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let address = server.address().to_string();
    assert!(
        probe_bridge(&reqwest::Client::new(), &address, PROBE_TIMEOUT)
            .await
            .is_some()
    );
}

#[tokio::test]
async fn test_unnamed_bridge_is_named_after_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "modelid": "BSB001",
            "swversion": "01041302"
        })))
        .mount(&server)
        .await;

    let candidate = probe_bridge(&reqwest::Client::new(), &server.address().to_string(), PROBE_TIMEOUT)
        .await
        .expect("bridge is confirmed");
    assert_eq!(candidate.name, "Philips Hue BSB001");
}

#[tokio::test]
async fn test_unknown_model_keeps_default_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "modelid": "929000226503",
            "swversion": "1.0"
        })))
        .mount(&server)
        .await;

    let candidate = probe_bridge(&reqwest::Client::new(), &server.address().to_string(), PROBE_TIMEOUT)
        .await
        .expect("bridge is confirmed");
    assert_eq!(candidate.name, "Philips Hue");
}

#[tokio::test]
async fn test_probe_rejects_other_devices() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .mount(&server)
        .await;

    let address = server.address().to_string();
    assert!(
        probe_bridge(&reqwest::Client::new(), &address, PROBE_TIMEOUT)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_probe_rejects_malformed_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>router</html>"))
        .mount(&server)
        .await;

    let address = server.address().to_string();
    assert!(
        probe_bridge(&reqwest::Client::new(), &address, PROBE_TIMEOUT)
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_probe_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "slow"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let address = server.address().to_string();
    assert!(
        probe_bridge(&reqwest::Client::new(), &address, Duration::from_millis(100))
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_cloud_fallback_verifies_listed_bridges() {
    let bridge = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Cloud listed",
            "modelid": "BSB002"
        })))
        .expect(1)
        .mount(&bridge)
        .await;

    let cloud = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "ecb5fafffe000001", "internalipaddress": bridge.address().to_string()},
            {"id": "ecb5fafffe000002", "internalipaddress": "127.0.0.1:1"}
        ])))
        .mount(&cloud)
        .await;

    let options = DiscoveryOptions {
        multicast_window: Duration::ZERO,
        probe_timeout: PROBE_TIMEOUT,
        cloud_endpoint: Some(format!("{}/", cloud.uri())),
        ..DiscoveryOptions::default()
    };

    let found = discover_bridges(&options).await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].address, bridge.address().to_string());
    assert_eq!(found[0].id, "ecb5fafffe000001");
    assert_eq!(found[0].name, "Cloud listed");
}

#[tokio::test]
async fn test_nothing_found_is_empty() {
    let cloud = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&cloud)
        .await;

    let options = DiscoveryOptions {
        multicast_window: Duration::ZERO,
        cloud_endpoint: Some(cloud.uri()),
        ..DiscoveryOptions::default()
    };

    assert!(discover_bridges(&options).await.is_empty());
}
