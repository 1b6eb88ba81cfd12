use finfeed::config::{ApiCategory, AppConfig, ProviderConfig};
use finfeed::service::FeedService;
use finfeed::store::{KeyValue, MemoryStore};
use finfeed::transport::HttpTransport;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Mock upstream serving one endpoint, optionally asserting how many
    /// requests it may receive.
    pub async fn create_mock_server(
        url_path: &str,
        mock_response: serde_json::Value,
        expected_requests: Option<u64>,
    ) -> MockServer {
        let mock_server = MockServer::start().await;

        let mut mock = Mock::given(method("GET"))
            .and(path(url_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(mock_response));
        if let Some(expected) = expected_requests {
            mock = mock.expect(expected);
        }
        mock.mount(&mock_server).await;

        mock_server
    }
}

fn provider(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        base_url: base_url.to_string(),
        proxy_url: None,
        api_key: None,
        key_param: "apikey".to_string(),
        daily_limit: None,
        min_interval_ms: None,
        queue_capacity: 50,
    }
}

/// Config with a crypto category rotating over two mock upstreams, plus the
/// mandatory stock-market fallback list.
fn test_config(first: &str, second: &str) -> AppConfig {
    let mut categories = HashMap::new();
    categories.insert(
        ApiCategory::Crypto,
        vec!["first".to_string(), "second".to_string()],
    );
    categories.insert(ApiCategory::StockMarket, vec!["first".to_string()]);

    let mut providers = HashMap::new();
    providers.insert("first".to_string(), provider(first));
    providers.insert("second".to_string(), provider(second));

    AppConfig {
        namespace: "test".to_string(),
        rotation_enabled: true,
        cache_enabled: true,
        use_proxy: false,
        categories,
        providers,
    }
}

fn service_for(config: &AppConfig) -> FeedService {
    let store: Arc<dyn KeyValue> = Arc::new(MemoryStore::new());
    let transport = Arc::new(HttpTransport::new().unwrap());
    FeedService::new(config, store, transport).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_fetch_rotates_between_providers() {
    let first =
        test_utils::create_mock_server("/prices", json!({"source": "first"}), Some(1)).await;
    let second =
        test_utils::create_mock_server("/prices", json!({"source": "second"}), Some(1)).await;

    let config = test_config(&first.uri(), &second.uri());
    let service = service_for(&config);

    // Distinct params so the cache does not short-circuit the rotation.
    let a = service
        .fetch(
            ApiCategory::Crypto,
            "/prices",
            &[("ids".to_string(), Some("bitcoin".to_string()))],
            Duration::from_secs(60),
        )
        .await
        .unwrap();
    let b = service
        .fetch(
            ApiCategory::Crypto,
            "/prices",
            &[("ids".to_string(), Some("ethereum".to_string()))],
            Duration::from_secs(60),
        )
        .await
        .unwrap();

    assert_eq!(a, json!({"source": "first"}));
    assert_eq!(b, json!({"source": "second"}));

    let snapshot = service.usage_snapshot();
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.iter().all(|u| u.count == 1));
    info!(?snapshot, "Both providers used once");
}

#[test_log::test(tokio::test)]
async fn test_second_fetch_served_from_cache() {
    // expect(1): the second fetch must never reach the wire.
    let first =
        test_utils::create_mock_server("/prices", json!({"bitcoin": 64000}), Some(1)).await;
    let second = test_utils::create_mock_server("/prices", json!({"unused": true}), Some(0)).await;

    let config = test_config(&first.uri(), &second.uri());
    let service = service_for(&config);

    let params = vec![("ids".to_string(), Some("bitcoin".to_string()))];
    let fresh = service
        .fetch(ApiCategory::Crypto, "/prices", &params, Duration::from_secs(60))
        .await
        .unwrap();
    let cached = service
        .fetch(ApiCategory::Crypto, "/prices", &params, Duration::from_secs(60))
        .await
        .unwrap();

    assert_eq!(fresh, cached);
    // Only the first call was recorded against the quota.
    assert_eq!(service.usage_snapshot().len(), 1);
    assert_eq!(service.usage_snapshot()[0].count, 1);
}

#[test_log::test(tokio::test)]
async fn test_expired_entry_triggers_refetch() {
    let first =
        test_utils::create_mock_server("/prices", json!({"bitcoin": 64000}), Some(2)).await;
    let second = test_utils::create_mock_server("/prices", json!({"bitcoin": 64000}), None).await;

    let mut config = test_config(&first.uri(), &second.uri());
    config.rotation_enabled = false; // keep both calls on the first provider

    let service = service_for(&config);
    let params = vec![("ids".to_string(), Some("bitcoin".to_string()))];

    service
        .fetch(ApiCategory::Crypto, "/prices", &params, Duration::from_millis(20))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    service
        .fetch(ApiCategory::Crypto, "/prices", &params, Duration::from_millis(20))
        .await
        .unwrap();

    assert_eq!(service.usage_snapshot()[0].count, 2);
}

#[test_log::test(tokio::test)]
async fn test_exhausted_provider_is_skipped() {
    let first = test_utils::create_mock_server("/prices", json!({"source": "first"}), None).await;
    let second = test_utils::create_mock_server("/prices", json!({"source": "second"}), None).await;

    let mut config = test_config(&first.uri(), &second.uri());
    config.providers.get_mut("first").unwrap().daily_limit = Some(1);
    config.cache_enabled = false;

    let service = service_for(&config);
    let params = vec![("ids".to_string(), Some("bitcoin".to_string()))];

    let a = service
        .fetch(ApiCategory::Crypto, "/prices", &params, Duration::from_secs(60))
        .await
        .unwrap();
    assert_eq!(a, json!({"source": "first"}));

    // "first" is now at 1/1 and must be skipped on both following calls.
    for _ in 0..2 {
        let b = service
            .fetch(ApiCategory::Crypto, "/prices", &params, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(b, json!({"source": "second"}));
    }
}

#[test_log::test(tokio::test)]
async fn test_throttled_provider_spaces_calls() {
    let first = test_utils::create_mock_server("/prices", json!({"ok": true}), Some(2)).await;
    let second = test_utils::create_mock_server("/prices", json!({"ok": true}), None).await;

    let mut config = test_config(&first.uri(), &second.uri());
    config.rotation_enabled = false;
    config.cache_enabled = false;
    config.providers.get_mut("first").unwrap().min_interval_ms = Some(150);

    let service = service_for(&config);
    let params = vec![("ids".to_string(), Some("bitcoin".to_string()))];

    let started = Instant::now();
    service
        .fetch(ApiCategory::Crypto, "/prices", &params, Duration::from_secs(60))
        .await
        .unwrap();
    service
        .fetch(ApiCategory::Crypto, "/prices", &params, Duration::from_secs(60))
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(140),
        "calls completed {elapsed:?} apart, expected min interval spacing"
    );
}

#[test_log::test(tokio::test)]
async fn test_upstream_error_propagates_and_does_not_poison_cache() {
    let broken = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(500))
        .mount(&broken)
        .await;
    let second = test_utils::create_mock_server("/prices", json!({"ok": true}), None).await;

    let mut config = test_config(&broken.uri(), &second.uri());
    config.rotation_enabled = false;

    let service = service_for(&config);
    let params = vec![("ids".to_string(), Some("bitcoin".to_string()))];

    let result = service
        .fetch(ApiCategory::Crypto, "/prices", &params, Duration::from_secs(60))
        .await;
    assert!(result.is_err());

    // The failed response was not cached; the call was still recorded.
    assert_eq!(service.usage_snapshot()[0].count, 1);
}
