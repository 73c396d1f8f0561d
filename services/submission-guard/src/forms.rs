// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: Apache-2.0

//! Typed form payloads.
//!
//! Raw fields arrive as an ordered list of name/value pairs (plus any
//! uploaded files). Each form variant sanitizes and validates them once,
//! collecting every failure so the client can fix them in one round trip.

use crate::sanitize::{clean_text, is_valid_email, sanitize_email};
use axum::body::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

const MSG_EMAIL: &str = "A valid email address is required.";

/// Field-level validation failures, in form order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", .0.join(" "))]
pub struct ValidationErrors(pub Vec<&'static str>);

/// Which form was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormKind {
    Contact,
    Reseller,
}

impl FormKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contact => "contact",
            Self::Reseller => "reseller",
        }
    }

    /// Message returned with a 200.
    pub fn success_message(self) -> &'static str {
        match self {
            Self::Contact => {
                "Message sent! We will get back to you within one business day. \
                 A confirmation has been sent to your email."
            }
            Self::Reseller => {
                "Application submitted! Our team will review your details and contact you shortly. \
                 A confirmation has been sent to your email."
            }
        }
    }

    /// Message returned with a 500, pointing at a manual contact channel.
    pub fn failure_message(self, fallback_email: &str) -> String {
        match self {
            Self::Contact => format!("Could not send right now. Please email us directly at {fallback_email}"),
            Self::Reseller => format!("Could not submit right now. Please email us at {fallback_email}"),
        }
    }
}

/// A file part from a multipart body.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Raw decoded form body.
#[derive(Debug, Clone, Default)]
pub struct FormPayload {
    fields: Vec<(String, String)>,
    files: Vec<UploadedFile>,
}

impl FormPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text field. A trailing `[]` on the name is dropped.
    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let name = name.strip_suffix("[]").map(str::to_string).unwrap_or(name);
        self.fields.push((name, value.into()));
    }

    pub fn push_file(&mut self, mut file: UploadedFile) {
        if let Some(stripped) = file.field.strip_suffix("[]") {
            file.field = stripped.to_string();
        }
        self.files.push(file);
    }

    /// First value for `name`, or the empty string.
    pub fn get(&self, name: &str) -> &str {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or_default()
    }

    /// Every value for `name`, in order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// Build a payload from name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut payload = FormPayload::new();
        for (k, v) in pairs {
            payload.push_field(k, v);
        }
        payload
    }
}

/// Limits applied while parsing a payload.
#[derive(Debug, Clone, Copy)]
pub struct FormLimits {
    pub max_attachment_bytes: usize,
}

/// A form that can be built from a raw payload.
pub trait SubmissionForm: Sized + Send {
    const KIND: FormKind;

    /// Sanitize and validate.
    fn from_payload(payload: &FormPayload, limits: FormLimits) -> Result<Self, ValidationErrors>;

    /// Submitter address (already validated).
    fn email(&self) -> &str;
}

fn optional(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Contact form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub message: String,
}

impl ContactForm {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Human label for the subject code.
    pub fn subject_label(&self) -> String {
        match self.subject.as_str() {
            "general" => "General Enquiry".to_string(),
            "wholesale" => "Wholesale / Bulk Order".to_string(),
            "retail" => "Retail Partnership".to_string(),
            "products" => "Product Information".to_string(),
            "delivery" => "Delivery Query".to_string(),
            "other" => "Other".to_string(),
            other => capitalize(other),
        }
    }
}

impl SubmissionForm for ContactForm {
    const KIND: FormKind = FormKind::Contact;

    fn from_payload(payload: &FormPayload, _limits: FormLimits) -> Result<Self, ValidationErrors> {
        let form = ContactForm {
            first_name: clean_text(payload.get("firstName")),
            last_name: clean_text(payload.get("lastName")),
            email: sanitize_email(payload.get("email")),
            phone: optional(clean_text(payload.get("phone"))),
            subject: clean_text(payload.get("subject")),
            message: clean_text(payload.get("message")),
        };

        let mut errors = Vec::new();
        if form.first_name.is_empty() {
            errors.push("First name is required.");
        }
        if form.last_name.is_empty() {
            errors.push("Last name is required.");
        }
        if !is_valid_email(&form.email) {
            errors.push(MSG_EMAIL);
        }
        if form.subject.is_empty() {
            errors.push("Subject is required.");
        }
        if form.message.is_empty() {
            errors.push("Message is required.");
        }

        if errors.is_empty() {
            Ok(form)
        } else {
            debug!(errors = errors.len(), "Contact form invalid");
            Err(ValidationErrors(errors))
        }
    }

    fn email(&self) -> &str {
        &self.email
    }
}

/// Shop photo accepted for attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShopPhoto {
    /// Server-chosen name; the client's file name is never used
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Bytes,
}

impl ShopPhoto {
    /// Accept an upload when it is a complete, non-empty image within the size cap.
    pub fn from_upload(upload: &UploadedFile, max_bytes: usize) -> Option<Self> {
        if upload.bytes.is_empty() {
            return None;
        }
        let declared_name = upload.file_name.as_deref().map(str::trim).unwrap_or_default();
        if declared_name.is_empty() {
            debug!("Ignoring shop photo without a file name");
            return None;
        }

        let by_type = upload
            .content_type
            .as_deref()
            .and_then(image_type_from_mime);
        let by_ext = declared_name
            .rsplit_once('.')
            .and_then(|(_, ext)| image_type_from_extension(ext));
        let generic = upload
            .content_type
            .as_deref()
            .map_or(true, |ct| ct.eq_ignore_ascii_case("application/octet-stream"));

        let (content_type, ext) = match (by_type, by_ext) {
            (Some(t), _) => t,
            (None, Some(t)) if generic => t,
            _ => {
                debug!(content_type = ?upload.content_type, "Ignoring non-image shop photo");
                return None;
            }
        };

        if upload.bytes.len() > max_bytes {
            warn!(size = upload.bytes.len(), max_bytes, "Ignoring oversized shop photo");
            return None;
        }

        Some(ShopPhoto {
            file_name: format!("shop-photo.{ext}"),
            content_type,
            bytes: upload.bytes.clone(),
        })
    }
}

fn image_type_from_mime(mime: &str) -> Option<(&'static str, &'static str)> {
    let essence = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
    match essence.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(("image/jpeg", "jpg")),
        "image/png" => Some(("image/png", "png")),
        "image/gif" => Some(("image/gif", "gif")),
        "image/webp" => Some(("image/webp", "webp")),
        _ => None,
    }
}

fn image_type_from_extension(ext: &str) -> Option<(&'static str, &'static str)> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some(("image/jpeg", "jpg")),
        "png" => Some(("image/png", "png")),
        "gif" => Some(("image/gif", "gif")),
        "webp" => Some(("image/webp", "webp")),
        _ => None,
    }
}

/// Reseller application form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResellerForm {
    pub company_name: String,
    pub shop_name: String,
    pub region: String,
    pub address: String,
    pub email: String,
    pub telephone: String,
    pub whatsapp: Option<String>,
    pub brn: Option<String>,
    pub vat: Option<String>,
    pub reseller_type: String,
    pub service_types: Vec<String>,
    pub notes: Option<String>,
    pub agent_name: Option<String>,
    pub agent_tel: Option<String>,
    pub shop_photo: Option<ShopPhoto>,
}

impl ResellerForm {
    pub fn reseller_type_label(&self) -> &'static str {
        if self.reseller_type == "existing" {
            "Existing reseller"
        } else {
            "New reseller"
        }
    }

    /// Comma-joined service labels.
    pub fn service_list(&self) -> String {
        self.service_types
            .iter()
            .map(|code| match code.as_str() {
                "wholesale" => "Wholesale",
                "retail" => "Retail",
                "food-service" => "Food service",
                "events" => "Events",
                "other" => "Other",
                unknown => unknown,
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `name — tel`, whichever half is present, or `None`.
    pub fn agent_display(&self) -> Option<String> {
        match (&self.agent_name, &self.agent_tel) {
            (Some(name), Some(tel)) => Some(format!("{name} — {tel}")),
            (Some(name), None) => Some(name.clone()),
            (None, Some(tel)) => Some(tel.clone()),
            (None, None) => None,
        }
    }
}

impl SubmissionForm for ResellerForm {
    const KIND: FormKind = FormKind::Reseller;

    fn from_payload(payload: &FormPayload, limits: FormLimits) -> Result<Self, ValidationErrors> {
        let service_types: Vec<String> = payload
            .get_all("serviceTypes")
            .into_iter()
            .map(clean_text)
            .filter(|s| !s.is_empty())
            .collect();

        let form = ResellerForm {
            company_name: clean_text(payload.get("companyName")),
            shop_name: clean_text(payload.get("shopName")),
            region: clean_text(payload.get("region")),
            address: clean_text(payload.get("address")),
            email: sanitize_email(payload.get("email")),
            telephone: clean_text(payload.get("telephone")),
            whatsapp: optional(clean_text(payload.get("whatsapp"))),
            brn: optional(clean_text(payload.get("brn"))),
            vat: optional(clean_text(payload.get("vat"))),
            reseller_type: clean_text(payload.get("resellerType")),
            service_types,
            notes: optional(clean_text(payload.get("notes"))),
            agent_name: optional(clean_text(payload.get("agentName"))),
            agent_tel: optional(clean_text(payload.get("agentTel"))),
            shop_photo: payload
                .file("shopPhoto")
                .and_then(|f| ShopPhoto::from_upload(f, limits.max_attachment_bytes)),
        };

        let mut errors = Vec::new();
        if form.company_name.is_empty() {
            errors.push("Company / full name is required.");
        }
        if form.shop_name.is_empty() {
            errors.push("Shop name is required.");
        }
        if form.region.is_empty() {
            errors.push("Region is required.");
        }
        if form.address.is_empty() {
            errors.push("Address is required.");
        }
        if !is_valid_email(&form.email) {
            errors.push(MSG_EMAIL);
        }
        if form.telephone.is_empty() {
            errors.push("Telephone number is required.");
        }
        if form.reseller_type.is_empty() {
            errors.push("Please select reseller type (Existing or New).");
        }
        if form.service_types.is_empty() {
            errors.push("Please select at least one service type.");
        }

        if errors.is_empty() {
            Ok(form)
        } else {
            debug!(errors = errors.len(), "Reseller form invalid");
            Err(ValidationErrors(errors))
        }
    }

    fn email(&self) -> &str {
        &self.email
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
