// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus counters for submissions and outbound mail.

use crate::forms::FormKind;
use crate::mail::MailKind;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

/// Service metrics, registered on a private registry.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    requests: IntCounterVec,
    mail_sent: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = IntCounterVec::new(
            Opts::new("submission_requests_total", "Form submissions by outcome"),
            &["form", "outcome"],
        )?;
        let mail_sent = IntCounterVec::new(
            Opts::new("submission_mail_sent_total", "Messages accepted by the mail relay"),
            &["kind"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(mail_sent.clone()))?;

        Ok(Self {
            registry,
            requests,
            mail_sent,
        })
    }

    pub fn observe_request(&self, form: FormKind, outcome: &str) {
        self.requests.with_label_values(&[form.as_str(), outcome]).inc();
    }

    pub fn observe_mail(&self, kind: MailKind) {
        self.mail_sent.with_label_values(&[kind.as_str()]).inc();
    }

    /// Current count for one form/outcome pair.
    pub fn request_count(&self, form: FormKind, outcome: &str) -> u64 {
        self.requests.with_label_values(&[form.as_str(), outcome]).get()
    }

    /// Text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render() {
        let metrics = Metrics::new().unwrap();
        metrics.observe_request(FormKind::Contact, "accepted");
        metrics.observe_request(FormKind::Contact, "accepted");
        metrics.observe_request(FormKind::Reseller, "rate_limited");
        metrics.observe_mail(MailKind::AutoReply);

        assert_eq!(metrics.request_count(FormKind::Contact, "accepted"), 2);

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"submission_requests_total{form="contact",outcome="accepted"} 2"#));
        assert!(text.contains(r#"submission_requests_total{form="reseller",outcome="rate_limited"} 1"#));
        assert!(text.contains(r#"submission_mail_sent_total{kind="auto_reply"} 1"#));
    }
}
