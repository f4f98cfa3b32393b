//! Email service for Acton DX.
//!
//! Accepts mail over HTTP, queues it in a bounded dispatcher, and delivers
//! it through an SMTP relay in the background.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod routes;
pub mod services;

pub use config::EmailServiceConfig;
pub use routes::router;
pub use services::{MailJob, SmtpMailer};
