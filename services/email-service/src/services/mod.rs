//! Delivery implementations.

mod mailer;

pub use mailer::{validate_address, MailAttachment, MailError, MailJob, SmtpMailer};
