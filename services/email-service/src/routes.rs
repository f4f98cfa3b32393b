//! HTTP intake for mail jobs.

use acton_dispatch::http::{self, accepted, ErrorBody};
use acton_dispatch::{Dispatcher, Job};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::debug;

use crate::services::{validate_address, MailJob, SmtpMailer};

/// Request body for `POST /v1/mail`.
#[derive(Debug, Deserialize)]
pub struct SendMailRequest {
    /// Caller-supplied correlation ID; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// The message itself.
    #[serde(flatten)]
    pub mail: MailJob,
}

/// Build the service router.
pub fn router(dispatcher: Dispatcher<SmtpMailer>) -> Router {
    Router::new()
        .route("/v1/mail", post(send_mail))
        .merge(http::routes::<SmtpMailer>())
        .with_state(dispatcher)
}

async fn send_mail(
    State(dispatcher): State<Dispatcher<SmtpMailer>>,
    Json(request): Json<SendMailRequest>,
) -> Response {
    let mail = request.mail;

    let addresses = mail
        .to
        .iter()
        .chain(&mail.cc)
        .chain(mail.from.iter())
        .chain(mail.reply_to.iter());
    for address in addresses {
        if let Err(reason) = validate_address(address) {
            debug!(address = %address, reason = %reason, "Rejected mail with invalid address");
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorBody::new(
                    "invalid_address",
                    format!("Invalid email address {address}: {reason}"),
                )),
            )
                .into_response();
        }
    }

    let job = match request.id {
        Some(id) => Job::with_id(id, mail),
        None => Job::new(mail),
    };

    match dispatcher.submit(job) {
        Ok(job_id) => accepted(job_id),
        Err(err) => err.into_response(),
    }
}
