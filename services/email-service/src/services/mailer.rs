//! SMTP delivery for queued mail jobs.

use acton_dispatch::{async_trait, Deliver, Job};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MessageBuilder, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::SmtpConfig;

/// A message waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailJob {
    /// Recipients.
    pub to: Vec<String>,
    /// Carbon-copy recipients.
    #[serde(default)]
    pub cc: Vec<String>,
    /// Sender; falls back to the configured default.
    #[serde(default)]
    pub from: Option<String>,
    /// Reply-to address.
    #[serde(default)]
    pub reply_to: Option<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    #[serde(default)]
    pub text_body: Option<String>,
    /// HTML body.
    #[serde(default)]
    pub html_body: Option<String>,
    /// Generated files to attach, read at delivery time.
    #[serde(default)]
    pub attachments: Vec<MailAttachment>,
}

/// A file attached to a [`MailJob`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailAttachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Path of the file on local disk.
    pub path: PathBuf,
}

/// Failure of one delivery attempt.
#[derive(Debug, Error)]
pub enum MailError {
    /// An address could not be parsed.
    #[error("invalid email address {address}: {reason}")]
    Address {
        /// The offending address.
        address: String,
        /// Parser message.
        reason: String,
    },
    /// Neither the job nor the configuration supplied a sender.
    #[error("missing 'from' address")]
    MissingFrom,
    /// An attachment declared an unparseable MIME type.
    #[error("invalid content type {0}")]
    ContentType(String),
    /// An attachment could not be read.
    #[error("failed to read attachment {}: {source}", path.display())]
    Attachment {
        /// Attachment path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The message could not be assembled.
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    /// The relay connection or transaction failed.
    #[error("SMTP delivery failed: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
    /// The relay answered with a negative reply.
    #[error("SMTP server rejected message with code {0}")]
    Rejected(String),
}

/// Mail delivery over an SMTP relay.
pub struct SmtpMailer {
    /// SMTP transport.
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// Default from address.
    default_from: Option<Mailbox>,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("default_from", &self.default_from)
            .finish_non_exhaustive()
    }
}

impl SmtpMailer {
    /// Create a mailer from SMTP configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the host is empty, the default sender is not a valid
    /// address, or the transport cannot be created.
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        if config.host.trim().is_empty() {
            anyhow::bail!("smtp.host must be set");
        }

        let default_from = match &config.from_address {
            Some(address) => Some(Mailbox::new(config.from_name.clone(), address.parse()?)),
            None => None,
        };

        let mut transport_builder = if config.tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        transport_builder = transport_builder.port(config.port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            transport_builder =
                transport_builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        info!(host = %config.host, port = config.port, tls = config.tls, "Created SMTP transport");

        Ok(Self {
            transport: transport_builder.build(),
            default_from,
        })
    }

    /// Create a mailer for testing (no actual sending).
    #[must_use]
    pub fn mock(default_from: Option<Mailbox>) -> Self {
        // Use localhost as a placeholder - won't actually connect
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous("localhost")
            .port(25)
            .build();

        Self {
            transport,
            default_from,
        }
    }

    fn to_mailbox(address: &str) -> Result<Mailbox, MailError> {
        address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })
    }

    /// Build a lettre [`Message`] from a job, reading attachments from disk.
    async fn build_message(&self, mail: &MailJob) -> Result<Message, MailError> {
        let from = match (&mail.from, &self.default_from) {
            (Some(from), _) => Self::to_mailbox(from)?,
            (None, Some(default)) => default.clone(),
            (None, None) => return Err(MailError::MissingFrom),
        };

        let mut builder = Message::builder().from(from).subject(&mail.subject);
        for to in &mail.to {
            builder = builder.to(Self::to_mailbox(to)?);
        }
        for cc in &mail.cc {
            builder = builder.cc(Self::to_mailbox(cc)?);
        }
        if let Some(reply_to) = &mail.reply_to {
            builder = builder.reply_to(Self::to_mailbox(reply_to)?);
        }

        let mut attachments = Vec::with_capacity(mail.attachments.len());
        for attachment in &mail.attachments {
            attachments.push(Self::build_attachment(attachment).await?);
        }

        Ok(Self::with_body(builder, mail, attachments)?)
    }

    fn with_body(
        builder: MessageBuilder,
        mail: &MailJob,
        attachments: Vec<SinglePart>,
    ) -> Result<Message, lettre::error::Error> {
        let text = mail.text_body.clone();
        let html = mail.html_body.clone();

        if attachments.is_empty() {
            return match (text, html) {
                (Some(text), Some(html)) => {
                    builder.multipart(MultiPart::alternative_plain_html(text, html))
                }
                (Some(text), None) => builder.header(ContentType::TEXT_PLAIN).body(text),
                (None, Some(html)) => builder.header(ContentType::TEXT_HTML).body(html),
                (None, None) => builder.body(String::new()),
            };
        }

        let mut mixed = match (text, html) {
            (Some(text), Some(html)) => {
                MultiPart::mixed().multipart(MultiPart::alternative_plain_html(text, html))
            }
            (Some(text), None) => MultiPart::mixed().singlepart(SinglePart::plain(text)),
            (None, Some(html)) => MultiPart::mixed().singlepart(SinglePart::html(html)),
            (None, None) => MultiPart::mixed().singlepart(SinglePart::plain(String::new())),
        };
        for part in attachments {
            mixed = mixed.singlepart(part);
        }
        builder.multipart(mixed)
    }

    async fn build_attachment(attachment: &MailAttachment) -> Result<SinglePart, MailError> {
        let content_type: ContentType = attachment
            .content_type
            .parse()
            .map_err(|_| MailError::ContentType(attachment.content_type.clone()))?;

        let content = tokio::fs::read(&attachment.path)
            .await
            .map_err(|source| MailError::Attachment {
                path: attachment.path.clone(),
                source,
            })?;

        Ok(Attachment::new(attachment.filename.clone()).body(content, content_type))
    }
}

/// Check an address before a job is submitted.
///
/// # Errors
///
/// Returns the reason the address is unusable.
pub fn validate_address(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email address is empty".to_string());
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err("Email address must contain @".to_string());
    };

    if domain.contains('@') {
        return Err("Invalid email format".to_string());
    }
    if local.is_empty() {
        return Err("Local part is empty".to_string());
    }
    if domain.is_empty() {
        return Err("Domain is empty".to_string());
    }
    if !domain.contains('.') {
        return Err("Domain must contain a dot".to_string());
    }

    email
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[async_trait]
impl Deliver for SmtpMailer {
    type Payload = MailJob;
    type Error = MailError;

    async fn deliver(&self, job: &Job<MailJob>) -> Result<(), MailError> {
        let message = self.build_message(job.payload()).await?;
        let response = self.transport.send(message).await?;

        if !response.is_positive() {
            return Err(MailError::Rejected(response.code().to_string()));
        }

        debug!(job_id = %job.id(), recipients = job.payload().to.len(), "Email sent successfully");
        Ok(())
    }

    fn check(&self, mail: &MailJob) -> Result<(), String> {
        if mail.to.is_empty() {
            return Err("at least one recipient is required".to_string());
        }
        if mail.from.is_none() && self.default_from.is_none() {
            return Err("missing 'from' address and no default sender configured".to_string());
        }
        Ok(())
    }

    /// A transient (4xx) SMTP reply is the relay asking us to come back later.
    fn is_rate_limited(&self, error: &MailError) -> bool {
        matches!(error, MailError::Transport(e) if e.is_transient())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn job() -> MailJob {
        MailJob {
            to: vec!["user@example.com".to_string()],
            cc: Vec::new(),
            from: None,
            reply_to: None,
            subject: "Welcome!".to_string(),
            text_body: Some("Welcome to our app!".to_string()),
            html_body: None,
            attachments: Vec::new(),
        }
    }

    fn sender() -> Option<Mailbox> {
        Some("Acton <noreply@example.com>".parse().unwrap())
    }

    #[test]
    fn test_validate_address_valid() {
        assert!(validate_address("test@example.com").is_ok());
    }

    #[test]
    fn test_validate_address_no_at() {
        assert_eq!(
            validate_address("testexample.com"),
            Err("Email address must contain @".to_string())
        );
    }

    #[test]
    fn test_validate_address_empty() {
        assert_eq!(validate_address(""), Err("Email address is empty".to_string()));
    }

    #[test]
    fn test_validate_address_no_domain() {
        assert!(validate_address("test@").is_err());
        assert!(validate_address("a@b@example.com").is_err());
        assert!(validate_address("test@localhost").is_err());
    }

    #[tokio::test]
    async fn test_check_requires_recipient_and_sender() {
        let mailer = SmtpMailer::mock(None);
        let mut mail = job();
        assert!(mailer.check(&mail).is_err());

        mail.from = Some("me@example.com".to_string());
        assert!(mailer.check(&mail).is_ok());

        mail.to.clear();
        assert!(mailer.check(&mail).is_err());
    }

    #[tokio::test]
    async fn test_build_plain_message_uses_default_sender() {
        let mailer = SmtpMailer::mock(sender());
        let message = mailer.build_message(&job()).await.unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Welcome!"));
        assert!(raw.contains("noreply@example.com"));
        assert!(raw.contains("To: user@example.com"));
        assert!(raw.contains("Welcome to our app!"));
    }

    #[tokio::test]
    async fn test_build_message_with_attachment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.4 invoice").unwrap();

        let mut mail = job();
        mail.html_body = Some("<p>Welcome</p>".to_string());
        mail.attachments.push(MailAttachment {
            filename: "invoice.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            path: file.path().to_path_buf(),
        });

        let mailer = SmtpMailer::mock(sender());
        let message = mailer.build_message(&mail).await.unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("multipart/mixed"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("invoice.pdf"));
    }

    #[tokio::test]
    async fn test_missing_attachment_is_an_error() {
        let mut mail = job();
        mail.attachments.push(MailAttachment {
            filename: "gone.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            path: PathBuf::from("/nonexistent/gone.pdf"),
        });

        let mailer = SmtpMailer::mock(sender());
        let err = mailer.build_message(&mail).await.unwrap_err();
        assert!(matches!(err, MailError::Attachment { .. }));
        assert!(!mailer.is_rate_limited(&err));
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_an_error() {
        let mut mail = job();
        mail.to = vec!["not an address".to_string()];

        let mailer = SmtpMailer::mock(sender());
        let err = mailer.build_message(&mail).await.unwrap_err();
        assert!(matches!(err, MailError::Address { .. }));
    }

    fn smtp_config(host: &str, port: u16) -> SmtpConfig {
        SmtpConfig {
            host: host.to_string(),
            port,
            username: None,
            password: None,
            tls: false,
            from_address: Some("noreply@example.com".to_string()),
            from_name: Some("Acton".to_string()),
        }
    }

    /// An SMTP relay that answers every connection with one greeting line.
    async fn greeting_relay(greeting: &'static str) -> u16 {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(greeting.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_new_rejects_empty_host() {
        assert!(SmtpMailer::new(&smtp_config("", 587)).is_err());
        assert!(SmtpMailer::new(&smtp_config("   ", 587)).is_err());
    }

    #[tokio::test]
    async fn test_new_builds_from_config() {
        let mailer = SmtpMailer::new(&smtp_config("smtp.example.com", 2525)).unwrap();
        assert_eq!(
            mailer.default_from.map(|m| m.email.to_string()).as_deref(),
            Some("noreply@example.com")
        );

        let mut config = smtp_config("smtp.example.com", 587);
        config.from_address = Some("not an address".to_string());
        assert!(SmtpMailer::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_transient_reply_is_rate_limited() {
        let port = greeting_relay("421 4.3.2 Service busy, try again later\r\n").await;
        let mailer = SmtpMailer::new(&smtp_config("127.0.0.1", port)).unwrap();

        let err = mailer.deliver(&Job::new(job())).await.unwrap_err();
        assert!(matches!(err, MailError::Transport(_)), "{err}");
        assert!(mailer.is_rate_limited(&err));
    }

    #[tokio::test]
    async fn test_permanent_reply_is_not_rate_limited() {
        let port = greeting_relay("554 5.7.1 Access denied\r\n").await;
        let mailer = SmtpMailer::new(&smtp_config("127.0.0.1", port)).unwrap();

        let err = mailer.deliver(&Job::new(job())).await.unwrap_err();
        assert!(matches!(err, MailError::Transport(_)), "{err}");
        assert!(!mailer.is_rate_limited(&err));
    }
}
