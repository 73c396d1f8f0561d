// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Request-level errors and the JSON response envelope.

use crate::forms::{FormKind, ValidationErrors};
use crate::mail::MailError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const MSG_METHOD_NOT_ALLOWED: &str = "Method not allowed.";
pub const MSG_ORIGIN_DENIED: &str = "Request origin not allowed.";
pub const MSG_RATE_LIMITED: &str = "Too many submissions. Please try again later.";
pub const MSG_BAD_REQUEST: &str = "Could not read the submitted form.";

/// Body of every submission response.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
}

/// Permissive CORS headers attached to every submission response.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// Build a JSON envelope response with CORS headers.
pub fn envelope(status: StatusCode, success: bool, message: impl Into<String>) -> Response {
    (
        status,
        CORS_HEADERS,
        Json(Envelope {
            success,
            message: message.into(),
        }),
    )
        .into_response()
}

/// Why a submission was not accepted.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("origin not allowed")]
    OriginDenied,

    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid submission: {0}")]
    Invalid(#[from] ValidationErrors),

    #[error("{} dispatch failed: {source}", .form.as_str())]
    Dispatch {
        form: FormKind,
        fallback: String,
        #[source]
        source: MailError,
    },
}

impl SubmissionError {
    /// Metrics label for this outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "method_not_allowed",
            Self::OriginDenied => "origin_denied",
            Self::RateLimited { .. } => "rate_limited",
            Self::BadRequest(_) => "bad_request",
            Self::Invalid(_) => "invalid",
            Self::Dispatch { .. } => "dispatch_failed",
        }
    }
}

impl IntoResponse for SubmissionError {
    fn into_response(self) -> Response {
        match self {
            SubmissionError::MethodNotAllowed => {
                let mut response = envelope(StatusCode::METHOD_NOT_ALLOWED, false, MSG_METHOD_NOT_ALLOWED);
                response
                    .headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static("POST, OPTIONS"));
                response
            }
            SubmissionError::OriginDenied => envelope(StatusCode::FORBIDDEN, false, MSG_ORIGIN_DENIED),
            SubmissionError::RateLimited { retry_after } => {
                let mut response = envelope(StatusCode::TOO_MANY_REQUESTS, false, MSG_RATE_LIMITED);
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
                response
            }
            SubmissionError::BadRequest(detail) => {
                tracing::debug!(detail = %detail, "Undecodable form body");
                envelope(StatusCode::BAD_REQUEST, false, MSG_BAD_REQUEST)
            }
            SubmissionError::Invalid(errors) => envelope(StatusCode::UNPROCESSABLE_ENTITY, false, errors.to_string()),
            SubmissionError::Dispatch { form, fallback, source } => {
                tracing::error!(form = form.as_str(), error = %source, "Mail dispatch failed");
                envelope(StatusCode::INTERNAL_SERVER_ERROR, false, form.failure_message(&fallback))
            }
        }
    }
}
