use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use fx_common::ingestors::fetch_error::{CONNECTION_FAILED_MESSAGE, QUOTA_EXCEEDED_MESSAGE, TIMEOUT_MESSAGE};
use fx_common::retrieve::{open_rate_stream, ApiClient, ProviderRateSource, ProxyRateSource};
use fx_common::{
    ConnectionState, FetchErrorKind, PollingDriver, PollingSettings, RateSource, SubscriptionManager, TokioScheduler,
};
use project_tests::{envelope_err, envelope_ok, pair, MockForexServer, MockReply};

const TIMEOUT: Duration = Duration::from_secs(2);

fn proxy(server: &MockForexServer, timeout: Duration) -> ProxyRateSource {
    ProxyRateSource::new(ApiClient::new(&server.url("/api/forex"), None, timeout).unwrap())
}

#[tokio::test]
async fn proxy_success_is_rounded_to_pair_precision() {
    let server = MockForexServer::start().await.unwrap();
    let eur_usd = pair("EUR/USD");
    server.reply(MockReply::Json(200, envelope_ok(&eur_usd, 1.071234, 1.071256, 1.0712449)));

    let snapshot = proxy(&server, TIMEOUT).fetch(&eur_usd).await.unwrap();
    assert_eq!(snapshot.pair, eur_usd);
    assert_eq!(snapshot.formatted_bid(), "1.07123");
    assert_eq!(snapshot.formatted_ask(), "1.07126");
    assert_eq!(snapshot.formatted_price(), "1.07124");

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/api/forex");
    assert_eq!(requests[0].query.as_deref(), Some("pair=EUR%2FUSD"));
    assert_eq!(requests[0].token, None);
}

#[tokio::test]
async fn proxy_failures_are_classified() {
    let server = MockForexServer::start().await.unwrap();
    let usd_jpy = pair("USD/JPY");
    let source = proxy(&server, TIMEOUT);

    server.reply(MockReply::Json(429, envelope_err("Too many requests")));
    let err = source.fetch(&usd_jpy).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::QuotaExceeded);
    assert_eq!(err.message, QUOTA_EXCEEDED_MESSAGE);
    assert_eq!(err.status, Some(429));

    server.reply(MockReply::Json(500, envelope_err("Quota reached for today")));
    assert_eq!(source.fetch(&usd_jpy).await.unwrap_err().kind, FetchErrorKind::QuotaExceeded);

    server.reply(MockReply::Json(503, envelope_err("maintenance")));
    let err = source.fetch(&usd_jpy).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::ServiceUnavailable);
    assert_eq!(err.status, Some(503));

    server.reply(MockReply::Json(404, envelope_err("Pair not found")));
    let err = source.fetch(&usd_jpy).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::Unknown);
    assert_eq!(err.message, "Forex service error: 404 - Pair not found");

    server.reply(MockReply::Json(200, "<html>oops</html>".to_string()));
    assert_eq!(source.fetch(&usd_jpy).await.unwrap_err().kind, FetchErrorKind::InvalidResponse);

    server.reply(MockReply::Json(200, envelope_ok(&pair("EUR/USD"), 1.07, 1.08, 1.075)));
    assert_eq!(source.fetch(&usd_jpy).await.unwrap_err().kind, FetchErrorKind::InvalidResponse);

    server.reply(MockReply::Json(200, envelope_err("QuotaReached")));
    assert_eq!(source.fetch(&usd_jpy).await.unwrap_err().kind, FetchErrorKind::QuotaExceeded);
}

#[tokio::test]
async fn refused_connection_is_a_connection_failure() {
    let client = ApiClient::new("http://127.0.0.1:1/api/forex", None, TIMEOUT).unwrap();
    let err = ProxyRateSource::new(client).fetch(&pair("USD/JPY")).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::ConnectionFailed);
    assert_eq!(err.message, CONNECTION_FAILED_MESSAGE);
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockForexServer::start().await.unwrap();
    server.reply(MockReply::Hang);

    let err = proxy(&server, Duration::from_millis(200)).fetch(&pair("USD/JPY")).await.unwrap_err();
    assert_eq!(err.kind, FetchErrorKind::ConnectionFailed);
    assert_eq!(err.message, TIMEOUT_MESSAGE);
}

#[tokio::test]
async fn provider_requests_carry_symbol_and_token() {
    let server = MockForexServer::start().await.unwrap();
    let client = ApiClient::new(&server.url("/v1"), Some("secret-token"), TIMEOUT).unwrap();
    let source = ProviderRateSource::new(client);
    let gbp_usd = pair("GBP/USD");

    let body = serde_json::json!([{
        "from": "GBP", "to": "USD", "bid": 1.25011, "ask": 1.25019, "price": 1.25015,
        "timestamp": "2024-05-01T12:00:00Z"
    }]);
    server.reply(MockReply::Json(200, body.to_string()));
    let snapshot = source.fetch(&gbp_usd).await.unwrap();
    assert_eq!(snapshot.formatted_price(), "1.25015");

    let request = &server.requests()[0];
    assert_eq!(request.path, "/v1/rates");
    assert_eq!(request.query.as_deref(), Some("pair=GBPUSD"));
    assert_eq!(request.token.as_deref(), Some("secret-token"));

    server.reply(MockReply::Json(200, r#"{"error":"Quota reached"}"#.to_string()));
    assert_eq!(source.fetch(&gbp_usd).await.unwrap_err().kind, FetchErrorKind::QuotaExceeded);

    server.reply(MockReply::Json(200, "[]".to_string()));
    assert_eq!(source.fetch(&gbp_usd).await.unwrap_err().kind, FetchErrorKind::InvalidResponse);
}

#[tokio::test]
async fn stream_yields_each_event_in_order() {
    let server = MockForexServer::start().await.unwrap();
    let eur_usd = pair("EUR/USD");
    server.reply(MockReply::Events(vec![
        envelope_ok(&eur_usd, 1.0701, 1.0703, 1.0702),
        envelope_err("Quota reached"),
        envelope_ok(&eur_usd, 1.0711, 1.0713, 1.0712),
    ]));

    let client = ApiClient::new(&server.url("/api/forex"), None, TIMEOUT).unwrap();
    let stream = open_rate_stream(&client, &eur_usd, Duration::from_secs(5)).await.unwrap();
    let items: Vec<_> = stream.collect().await;

    assert_eq!(items.len(), 3);
    assert_eq!(items[0].as_ref().unwrap().formatted_price(), "1.07020");
    assert_eq!(items[1].as_ref().unwrap_err().kind, FetchErrorKind::QuotaExceeded);
    assert_eq!(items[2].as_ref().unwrap().formatted_price(), "1.07120");

    let query = server.requests()[0].query.clone().unwrap_or_default();
    assert!(query.contains("stream=true"), "query was {query}");
}

#[tokio::test]
async fn stream_open_failure_is_classified() {
    let server = MockForexServer::start().await.unwrap();
    server.reply(MockReply::Json(503, envelope_err("down")));

    let client = ApiClient::new(&server.url("/api/forex"), None, TIMEOUT).unwrap();
    match open_rate_stream(&client, &pair("USD/JPY"), Duration::from_secs(5)).await {
        Err(e) => assert_eq!(e.kind, FetchErrorKind::ServiceUnavailable),
        Ok(_) => panic!("stream should not open on 503"),
    }
}

#[tokio::test]
async fn manager_polls_proxy_until_unsubscribed() {
    let server = MockForexServer::start().await.unwrap();
    let usd_chf = pair("USD/CHF");
    server.reply(MockReply::Json(503, envelope_err("warming up")));
    server.reply_always(MockReply::Json(200, envelope_ok(&usd_chf, 0.91234, 0.91244, 0.91239)));

    let settings = PollingSettings {
        interval: Duration::from_millis(50),
        fetch_timeout: TIMEOUT,
        ..PollingSettings::default()
    };
    let driver = PollingDriver::new(Arc::new(proxy(&server, TIMEOUT)), settings);
    let manager = SubscriptionManager::new(driver, Arc::new(TokioScheduler::new()));
    let mut events = manager.events();

    manager.subscribe(&usd_chf);
    let connected = tokio::time::timeout(Duration::from_secs(5), async {
        let mut saw_failure = false;
        loop {
            let event = events.recv().await.unwrap();
            if event.view.error_kind == Some(FetchErrorKind::ServiceUnavailable) {
                saw_failure = true;
            }
            if event.view.connection_state == ConnectionState::Connected {
                return (saw_failure, event.view);
            }
        }
    })
    .await
    .unwrap();

    let (saw_failure, view) = connected;
    assert!(saw_failure);
    assert!(view.error.is_none());
    assert_eq!(view.data.map(|s| s.formatted_price()), Some("0.91239".to_string()));

    manager.unsubscribe(&usd_chf);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = server.requests().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.requests().len(), seen);
}
