use crate::config::MailConfig;
use crate::errors::Result;
use crate::metrics::{NOTIFICATIONS_FAILED_TOTAL, NOTIFICATIONS_SENT_TOTAL, NOTIFICATIONS_UNCONFIGURED_TOTAL};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{info, warn};

const SUBJECT: &str = "Wildfire Alert";
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);
/// SMTPS; every other port is expected to speak STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Result of one delivery attempt. None of these are retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Sent,
    /// Channel credentials are missing; alerts are evaluated but not delivered.
    NotConfigured,
    Failed(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> NotifyOutcome;
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    ImplicitTls,
    StartTls,
}

impl TransportMode {
    pub fn for_port(port: u16) -> Self {
        if port == IMPLICIT_TLS_PORT {
            TransportMode::ImplicitTls
        } else {
            TransportMode::StartTls
        }
    }
}

struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    mode: TransportMode,
    from: Mailbox,
    to: Mailbox,
}

/// Sends alerts through an authenticated SMTP relay.
pub struct SmtpNotifier {
    channel: Option<SmtpChannel>,
}

impl SmtpNotifier {
    /// Missing credentials yield a notifier that reports `NotConfigured`.
    /// Credentials that are present but malformed are a startup error.
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let (Some(user), Some(pass), Some(target)) =
            (&config.username, &config.password, &config.recipient)
        else {
            warn!("Alert email not configured (ALERT_EMAIL/ALERT_PASS/ALERT_TARGET), alerts will not be delivered");
            return Ok(Self::disabled());
        };

        let from: Mailbox = user.parse()?;
        let to: Mailbox = target.parse()?;
        let mode = TransportMode::for_port(config.smtp_port);
        let builder = match mode {
            TransportMode::ImplicitTls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            }
            TransportMode::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            }
        };
        let transport = builder
            .port(config.smtp_port)
            .credentials(Credentials::new(user.clone(), pass.clone()))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        info!(
            "Alert email enabled via {}:{} ({:?}) to {}",
            config.smtp_host, config.smtp_port, mode, to
        );
        Ok(Self {
            channel: Some(SmtpChannel {
                transport,
                mode,
                from,
                to,
            }),
        })
    }

    pub fn disabled() -> Self {
        Self { channel: None }
    }

    pub fn is_configured(&self) -> bool {
        self.channel.is_some()
    }

    pub fn transport_mode(&self) -> Option<TransportMode> {
        self.channel.as_ref().map(|c| c.mode)
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, message: &str) -> NotifyOutcome {
        let Some(channel) = &self.channel else {
            NOTIFICATIONS_UNCONFIGURED_TOTAL.inc();
            info!("Alert email not configured, skipping delivery");
            return NotifyOutcome::NotConfigured;
        };

        let email = match Message::builder()
            .from(channel.from.clone())
            .to(channel.to.clone())
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(message.to_string())
        {
            Ok(email) => email,
            Err(e) => {
                NOTIFICATIONS_FAILED_TOTAL.inc();
                warn!("Failed to build alert email: {}", e);
                return NotifyOutcome::Failed(e.to_string());
            }
        };

        match channel.transport.send(email).await {
            Ok(_) => {
                NOTIFICATIONS_SENT_TOTAL.inc();
                info!("Alert sent to {}", channel.to);
                NotifyOutcome::Sent
            }
            Err(e) => {
                NOTIFICATIONS_FAILED_TOTAL.inc();
                warn!("Alert delivery failed: {}", e);
                NotifyOutcome::Failed(e.to_string())
            }
        }
    }
}
