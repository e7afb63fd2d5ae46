//! Webhook provider integration tests
//!
//! Providers post to local wiremock servers standing in for Slack, Discord and Teams.

use std::sync::{Arc, Mutex};

use tracewire_alerts::{
    AlertDispatcher, AlertPayload, Delivery, DiscordProvider, DispatchFailure, DispatchReport,
    ErrorDetails, NotificationProvider, SlackProvider, TeamsProvider,
};
use tracewire_core::ProviderEndpoint;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn alert() -> AlertPayload {
    AlertPayload::new(
        ErrorDetails::new("Payment failed for order 42", "PaymentProcessingError"),
        "CheckoutService",
        "chargeCard",
    )
    .with_trace("4bf92f3577b34da6a3ce929d0e0e4736", "00f067aa0ba902b7")
}

#[tokio::test]
async fn test_slack_delivers_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .and(body_partial_json(serde_json::json!({ "channel": "#ops" })))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = SlackProvider::new(
        ProviderEndpoint {
            webhook_url: Some(format!("{}/slack", server.uri())),
            channel: Some("#ops".into()),
        },
        "test".into(),
        reqwest::Client::new(),
    );

    let delivery = provider.send_critical_error_alert(&alert()).await.unwrap();
    assert_eq!(delivery, Delivery::Delivered);
}

#[tokio::test]
async fn test_non_success_status_is_reported_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream broke"))
        .mount(&server)
        .await;

    let provider = DiscordProvider::new(
        ProviderEndpoint::new(format!("{}/discord", server.uri())),
        "test".into(),
        reqwest::Client::new(),
    );

    let delivery = provider.send_error_alert(&alert()).await.unwrap();
    assert_eq!(delivery, Delivery::Failed("HTTP 500: upstream broke".into()));
}

#[tokio::test]
async fn test_unreachable_webhook_is_rejected() {
    // Nothing listens on port 9 (discard) in the test environment.
    let provider = TeamsProvider::new(
        ProviderEndpoint::new("http://127.0.0.1:9/teams"),
        "test".into(),
        reqwest::Client::new(),
    );

    assert!(provider.send_error_alert(&alert()).await.is_err());
}

#[tokio::test]
async fn test_dispatcher_isolates_failing_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/discord"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/teams"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad card"))
        .expect(1)
        .mount(&server)
        .await;

    let client = reqwest::Client::new();
    let reports: Arc<Mutex<Vec<DispatchReport>>> = Arc::default();
    let sink = reports.clone();

    let dispatcher = AlertDispatcher::builder()
        .provider(Arc::new(SlackProvider::new(
            ProviderEndpoint::new(format!("{}/slack", server.uri())),
            "test".into(),
            client.clone(),
        )))
        .provider(Arc::new(DiscordProvider::new(
            ProviderEndpoint::new(format!("{}/discord", server.uri())),
            "test".into(),
            client.clone(),
        )))
        .provider(Arc::new(TeamsProvider::new(
            ProviderEndpoint::new(format!("{}/teams", server.uri())),
            "test".into(),
            client,
        )))
        .on_report(move |report| sink.lock().unwrap().push(report.clone()))
        .build();

    dispatcher.send_error_alert(&alert()).await;

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].succeeded, vec!["slack".to_string(), "discord".to_string()]);
    assert_eq!(
        reports[0].failed,
        vec![(
            "teams".to_string(),
            DispatchFailure::Reported("HTTP 400: bad card".into())
        )]
    );
}

#[tokio::test]
async fn test_batch_is_one_request_per_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/slack"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = AlertDispatcher::new(vec![Arc::new(SlackProvider::new(
        ProviderEndpoint::new(format!("{}/slack", server.uri())),
        "test".into(),
        reqwest::Client::new(),
    ))]);

    dispatcher
        .send_batch_error_alerts(&[alert(), alert(), alert()])
        .await;
}
