// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Submission Guard
//!
//! A rate-limited relay for the public contact and reseller forms:
//!
//! - Origin allow-list with Referer fallback and loopback bypass
//! - Per-client hourly and daily submission ceilings backed by an
//!   append-only submission log
//! - Field sanitization and validation with every error reported at once
//! - Business notification plus submitter auto-reply over SMTP

pub mod config;
pub mod error;
pub mod forms;
pub mod guard;
pub mod handlers;
pub mod mail;
pub mod metrics;
pub mod sanitize;
pub mod store;

pub use config::Config;
pub use error::SubmissionError;
pub use guard::{Guard, RateDecision};
pub use handlers::{router, AppState};
pub use store::{FileStore, MemoryStore, SubmissionStore};
