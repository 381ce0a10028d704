use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::time::Duration;

const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("transport is not configured")]
    NotConfigured,
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("could not build message: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

/// Sends a single message through an external transport.
///
/// Implementations perform no retry and no queuing. Callers are expected to
/// consult [`Notifier::is_configured`] first so a missing transport can be
/// reported as skipped rather than failed.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn is_configured(&self) -> bool;

    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl SmtpConfig {
    /// Returns `None` unless username, password and sender are all present.
    pub fn from_parts(
        host: String,
        port: u16,
        username: Option<String>,
        password: Option<String>,
        from: Option<String>,
    ) -> Option<Self> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Some(Self {
            host,
            port,
            username: non_empty(username)?,
            password: non_empty(password)?,
            from: non_empty(from)?,
        })
    }
}

pub struct SmtpNotifier {
    config: Option<SmtpConfig>,
}

impl SmtpNotifier {
    pub fn new(config: Option<SmtpConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    async fn notify(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let config = self.config.as_ref().ok_or(NotifyError::NotConfigured)?;

        let message = Message::builder()
            .from(config.from.parse::<Mailbox>()?)
            .to(recipient.parse::<Mailbox>()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())?;

        // One transport per message; the connection is closed when it drops
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        transport.send(message).await?;
        tracing::debug!(recipient, "smtp message accepted");

        Ok(())
    }
}
