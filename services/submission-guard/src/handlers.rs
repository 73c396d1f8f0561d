// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the submission guard service.
//!
//! `/contact` and `/reseller` run the same pipeline: method, origin and
//! rate checks, body decoding, validation, then the business notification
//! and the submitter's auto-reply. The submission is recorded only after
//! both messages were accepted by the relay.

use crate::config::Config;
use crate::error::{envelope, SubmissionError, CORS_HEADERS};
use crate::forms::{ContactForm, FormLimits, FormPayload, ResellerForm, SubmissionForm, UploadedFile};
use crate::guard::{Guard, RateDecision};
use crate::mail::{Mailer, RenderContext, Renderable};
use crate::metrics::Metrics;
use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Multipart, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Form, Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use url::Url;

/// Shared application state.
pub struct AppState {
    pub guard: Guard,
    pub mailer: Arc<dyn Mailer>,
    pub metrics: Metrics,
    pub config: Config,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/contact", any(contact))
        .route("/reseller", any(reseller));

    if state.config.metrics.enabled {
        let path = state.config.metrics.path.clone();
        router = router.route(&path, get(metrics));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.limits.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "submission-guard",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Could not encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Contact form endpoint.
pub async fn contact(State(state): State<Arc<AppState>>, request: Request) -> Response {
    submit::<ContactForm>(&state, request).await
}

/// Reseller application endpoint.
pub async fn reseller(State(state): State<Arc<AppState>>, request: Request) -> Response {
    submit::<ResellerForm>(&state, request).await
}

async fn submit<F>(state: &AppState, request: Request) -> Response
where
    F: SubmissionForm + Renderable,
{
    if request.method() == Method::OPTIONS {
        return (StatusCode::NO_CONTENT, CORS_HEADERS).into_response();
    }

    match process::<F>(state, request).await {
        Ok(()) => {
            state.metrics.observe_request(F::KIND, "accepted");
            envelope(StatusCode::OK, true, F::KIND.success_message())
        }
        Err(e) => {
            state.metrics.observe_request(F::KIND, e.outcome());
            e.into_response()
        }
    }
}

async fn process<F>(state: &AppState, request: Request) -> Result<(), SubmissionError>
where
    F: SubmissionForm + Renderable,
{
    let kind = F::KIND.as_str();

    if request.method() != Method::POST {
        debug!(form = kind, method = %request.method(), "Rejecting non-POST submission");
        return Err(SubmissionError::MethodNotAllowed);
    }

    let headers = request.headers();
    let origin = request_origin(headers);
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| request.uri().authority().map(|a| a.as_str()));
    let scheme = request_scheme(headers, state.config.guard.trust_forwarded_headers);

    if !state.guard.is_origin_allowed(origin.as_deref(), host, scheme) {
        return Err(SubmissionError::OriginDenied);
    }

    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let identity = state.guard.resolve_client_identity(headers, remote);

    if let RateDecision::Limited { window, retry_after } = state.guard.check_rate(&identity).await {
        info!(form = kind, identity = %identity, %window, retry_after_secs = retry_after.as_secs(), "Submission rate limited");
        return Err(SubmissionError::RateLimited { retry_after });
    }

    let payload = read_payload(request).await?;
    let limits = FormLimits {
        max_attachment_bytes: state.config.limits.max_attachment_bytes,
    };
    let form = F::from_payload(&payload, limits)?;

    let ctx = RenderContext::new(&state.config.mail, Utc::now());
    for mail in [form.notification(&ctx), form.auto_reply(&ctx)] {
        let mail_kind = mail.kind;
        state
            .mailer
            .send(mail)
            .await
            .map_err(|source| SubmissionError::Dispatch {
                form: F::KIND,
                fallback: state.config.mail.to_email.clone(),
                source,
            })?;
        state.metrics.observe_mail(mail_kind);
    }

    // Both messages are out; a failed write only weakens future rate checks.
    if let Err(e) = state.guard.record_submission(&identity, form.email()).await {
        error!(form = kind, identity = %identity, error = %e, "Could not record submission");
    }

    info!(form = kind, identity = %identity, "Submission accepted");
    Ok(())
}

/// The Origin header, or the origin of the Referer when no Origin was sent.
fn request_origin(headers: &HeaderMap) -> Option<String> {
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        return Some(origin.to_string());
    }
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let origin = Url::parse(referer).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

fn request_scheme(headers: &HeaderMap, trust_forwarded: bool) -> &'static str {
    let forwarded = trust_forwarded
        .then(|| headers.get("x-forwarded-proto"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim);
    match forwarded {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "https",
        _ => "http",
    }
}

/// Decode a urlencoded or multipart body into a [`FormPayload`].
async fn read_payload(request: Request) -> Result<FormPayload, SubmissionError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"));

    let mut payload = FormPayload::new();

    if is_multipart {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| SubmissionError::BadRequest(e.body_text()))?;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| SubmissionError::BadRequest(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if let Some(file_name) = field.file_name().map(str::to_string) {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| SubmissionError::BadRequest(e.body_text()))?;
                payload.push_file(UploadedFile {
                    field: name,
                    file_name: Some(file_name),
                    content_type,
                    bytes,
                });
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|e| SubmissionError::BadRequest(e.body_text()))?;
                payload.push_field(name, value);
            }
        }
    } else {
        let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &())
            .await
            .map_err(|e| SubmissionError::BadRequest(e.body_text()))?;
        for (name, value) in pairs {
            payload.push_field(name, value);
        }
    }

    Ok(payload)
}
