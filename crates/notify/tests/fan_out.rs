use std::sync::Arc;

use sentinel_core::{
    config::{EmailConfig, NotifierConfig, SmtpSecurity, WebhookConfig},
    error::DeliveryError,
};
use sentinel_notify::{FanOut, Notifier, Webhook, from_config};
use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

async fn endpoint(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status))
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn webhook_config(server: &MockServer) -> WebhookConfig {
    WebhookConfig { url: server.uri().parse().unwrap(), token: None }
}

#[tokio::test]
async fn failed_target_does_not_skip_the_rest() {
    let failing = endpoint(503).await;
    let healthy = endpoint(200).await;
    let fan_out = FanOut(vec![
        Arc::new(Webhook::new(&webhook_config(&failing)).unwrap()),
        Arc::new(Webhook::new(&webhook_config(&healthy)).unwrap()),
    ]);

    let err = fan_out.notify("octo/proj-a", "Summary").await.unwrap_err();
    assert!(matches!(err, DeliveryError::Rejected { status: 503, .. }), "{err:?}");
}

#[tokio::test]
async fn configured_email_is_built() {
    let server = endpoint(200).await;
    let email = EmailConfig {
        smtp_server: "smtp.example.com".to_string(),
        smtp_port: 587,
        security: SmtpSecurity::StartTls,
        username: Some("bot".to_string()),
        password: "app-password".to_string(),
        from: "sentinel@example.com".to_string(),
        to: vec!["reports@example.com".to_string()],
    };
    from_config(&NotifierConfig { webhook: None, email: Some(email.clone()) }).unwrap();

    let bad = EmailConfig { from: "nobody".to_string(), ..email.clone() };
    assert!(from_config(&NotifierConfig { webhook: None, email: Some(bad) }).is_err());

    // Both targets configured: the webhook is still called.
    let both = from_config(&NotifierConfig {
        webhook: Some(webhook_config(&server)),
        email: Some(EmailConfig {
            smtp_server: "127.0.0.1".to_string(),
            smtp_port: 9,
            security: SmtpSecurity::Plain,
            ..email
        }),
    })
    .unwrap();
    assert!(both.notify("Hacker News Report", "body").await.is_err());
}
