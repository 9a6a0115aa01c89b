use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::MailConfig;
use crate::error::{AppError, AppResult};

/// Outbound mail seam. The reminder worker only talks to this trait, so tests
/// can swap in a recording implementation instead of doing network calls.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()>;
}

/// Pick the mailer the configuration implies: an HTTP relay when one is set,
/// otherwise a logger so development setups still show outgoing traffic.
pub fn mailer_from_config(config: &MailConfig) -> AppResult<Arc<dyn Mailer>> {
    match &config.relay_url {
        Some(url) => Ok(Arc::new(HttpRelayMailer::new(
            url.clone(),
            config.from_address.clone(),
        )?)),
        None => Ok(Arc::new(LogMailer)),
    }
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Delivers mail by POSTing JSON to the configured relay endpoint.
pub struct HttpRelayMailer {
    client: reqwest::Client,
    relay_url: String,
    from_address: String,
}

impl HttpRelayMailer {
    pub fn new(relay_url: String, from_address: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            relay_url,
            from_address,
        })
    }
}

#[async_trait]
impl Mailer for HttpRelayMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(&RelayMessage {
                to,
                from: &self.from_address,
                subject,
                body,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(anyhow::anyhow!(
                "Mail relay error ({}): {}",
                status,
                error_text
            )));
        }

        tracing::debug!("Delivered mail to {} via relay", to);
        Ok(())
    }
}

/// Used when no relay is configured: logs what would have been sent.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        tracing::info!(
            "Mail relay not configured; would send to {}: {} / {}",
            to,
            subject,
            body
        );
        Ok(())
    }
}
