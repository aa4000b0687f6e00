use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use common::config::MailerConfig;

use crate::{model::Order, otp::OtpGrant};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Email transport error: {0}")]
    Transport(String),

    #[error("Failed to send OTP email after {attempts} attempts")]
    Exhausted { attempts: u32, last_error: String },
}

impl From<reqwest::Error> for MailError {
    fn from(err: reqwest::Error) -> Self {
        MailError::Transport(err.to_string())
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Posts messages to an HTTP email API as JSON.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(endpoint: Url, api_key: Option<String>, timeout: Duration) -> Result<Self, MailError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        let mut request = self.client.post(self.endpoint.clone()).json(message);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Transport(format!("{status}: {body}")));
        }
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "Email delivery disabled, message logged only"
        );
        tracing::debug!(text = %message.text, "Email body");
        Ok(())
    }
}

pub fn mailer_from_config(config: &MailerConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match &config.endpoint {
        Some(endpoint) => {
            info!(endpoint = %endpoint, "Using HTTP mailer");
            Ok(Arc::new(HttpMailer::new(
                endpoint.clone(),
                config.api_key.clone(),
                Duration::from_millis(config.timeout_ms),
            )?))
        }
        None => {
            warn!("No mailer endpoint configured, OTP emails will only be logged");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &MailerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

pub async fn send_with_retry(
    mailer: &dyn Mailer,
    message: &EmailMessage,
    policy: &RetryPolicy,
) -> Result<(), MailError> {
    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts {
        match mailer.send(message).await {
            Ok(()) => {
                counter!("campus_email_attempts_total", "outcome" => "sent").increment(1);
                info!(to = %message.to, attempt, "Email sent");
                return Ok(());
            }
            Err(e) => {
                counter!("campus_email_attempts_total", "outcome" => "failed").increment(1);
                warn!(to = %message.to, attempt, error = %e, "Email send failed");
                last_error = e.to_string();
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay_after(attempt)).await;
                }
            }
        }
    }
    Err(MailError::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}

pub fn otp_email(from: &str, to: &str, order: &Order, grant: &OtpGrant) -> EmailMessage {
    let valid_minutes = (grant.expires_at - grant.issued_at).num_minutes().max(1);
    EmailMessage {
        from: from.to_string(),
        to: to.to_string(),
        subject: format!("Your delivery OTP for order {}", order.id),
        text: format!(
            "Your order from {} is on its way to {}.\n\n\
             Share this code with your delivery buddy on arrival: {}\n\n\
             The code is valid for {} minutes (until {} UTC).\n",
            order.canteen_name,
            order.drop_location,
            grant.code,
            valid_minutes,
            grant.expires_at.format("%H:%M"),
        ),
    }
}

/// Student address for the handover email.
pub fn recipient_for(order: &Order, fallback_domain: &str) -> String {
    match &order.student_email {
        Some(email) => email.clone(),
        None => format!("{}@{}", order.placed_by, fallback_domain),
    }
}
