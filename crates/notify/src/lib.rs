mod email;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sentinel_core::{
    config::{NotifierConfig, WebhookConfig},
    error::DeliveryError,
};
use serde::Serialize;
use url::Url;

pub use crate::email::Email;

/// Delivers a finished report to a human.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Choose notifiers from configuration, falling back to logging.
pub fn from_config(config: &NotifierConfig) -> Result<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();
    if let Some(webhook) = &config.webhook {
        notifiers.push(Arc::new(Webhook::new(webhook)?));
    }
    if let Some(email) = &config.email {
        notifiers.push(Arc::new(Email::new(email)?));
    }
    Ok(match notifiers.len() {
        0 => {
            tracing::warn!("No notifier configured, reports will only be logged");
            Arc::new(LogNotifier)
        }
        1 => notifiers.remove(0),
        _ => Arc::new(FanOut(notifiers)),
    })
}

/// Delivers to every inner notifier, returning the first failure after all were tried.
pub struct FanOut(pub Vec<Arc<dyn Notifier>>);

#[async_trait]
impl Notifier for FanOut {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let mut first_err = None;
        for notifier in &self.0 {
            if let Err(e) = notifier.notify(subject, body).await {
                tracing::warn!("Delivery of '{}' failed: {}", subject, e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[derive(Serialize)]
struct Message<'a> {
    subject: &'a str,
    body: &'a str,
}

/// POSTs `{"subject": .., "body": ..}` as JSON to a configured endpoint.
pub struct Webhook {
    client: reqwest::Client,
    url: Url,
    token: Option<String>,
}

impl Webhook {
    pub fn new(config: &WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sentinel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, url: config.url.clone(), token: config.token.clone() })
    }
}

#[async_trait]
impl Notifier for Webhook {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let mut request = self.client.post(self.url.clone()).json(&Message { subject, body });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response =
            request.send().await.map_err(|e| DeliveryError::Unreachable(Box::new(e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }
        tracing::info!("Delivered '{}' to {}", subject, self.url);
        Ok(())
    }
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<(), DeliveryError> {
        tracing::info!(subject, "Report ready ({} bytes)", body.len());
        Ok(())
    }
}
