// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Notification and auto-reply rendering.
//!
//! Form values are already HTML-escaped by the sanitizer and are inserted
//! into the HTML bodies as-is; the email address is escaped here because
//! the email sanitizer keeps characters such as `&` and `'`.

use super::{MailAttachment, MailKind, OutgoingMail, Recipient};
use crate::config::MailConfig;
use crate::forms::{ContactForm, ResellerForm};
use crate::sanitize::{escape_html, nl2br};
use chrono::{DateTime, Utc};

const ACCENT: &str = "#C8000A";

/// Values shared by every rendered message.
pub struct RenderContext<'a> {
    pub mail: &'a MailConfig,
    pub received_at: DateTime<Utc>,
}

impl<'a> RenderContext<'a> {
    pub fn new(mail: &'a MailConfig, received_at: DateTime<Utc>) -> Self {
        Self { mail, received_at }
    }

    fn business(&self) -> Recipient {
        Recipient::new(&self.mail.to_name, &self.mail.to_email)
    }

    fn timestamp(&self) -> String {
        format!("{} (UTC)", self.received_at.format("%d %b %Y, %H:%M"))
    }
}

/// A form that renders into a business notification and an auto-reply.
pub trait Renderable {
    fn notification(&self, ctx: &RenderContext<'_>) -> OutgoingMail;
    fn auto_reply(&self, ctx: &RenderContext<'_>) -> OutgoingMail;
}

fn row(label: &str, value: &str) -> String {
    format!(
        r#"<tr><td style="padding:10px 0;border-bottom:1px solid #f0f0f0;width:150px;color:#888;font-size:13px;font-weight:600;vertical-align:top;">{label}</td><td style="padding:10px 0;border-bottom:1px solid #f0f0f0;color:#1a1a1a;font-size:14px;vertical-align:top;">{value}</td></tr>"#
    )
}

fn mailto(email: &str) -> String {
    let email = escape_html(email);
    format!(r#"<a href="mailto:{email}" style="color:{ACCENT};text-decoration:none;">{email}</a>"#)
}

/// Percent-encode for a `mailto:` query value.
fn encode_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn shell(title: &str, subtitle: &str, body: &str, footer: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><meta name="viewport" content="width=device-width,initial-scale=1"></head>
<body style="margin:0;padding:0;background:#f0f2f5;font-family:'Helvetica Neue',Arial,sans-serif;">
<table width="100%" cellpadding="0" cellspacing="0" style="background:#f0f2f5;padding:40px 16px;">
<tr><td align="center">
<table width="600" cellpadding="0" cellspacing="0" style="max-width:600px;width:100%;background:#fff;border-radius:16px;overflow:hidden;">
  <tr>
    <td style="background:linear-gradient(135deg,#8B0000 0%,{ACCENT} 40%,#E8171B 100%);padding:32px 40px;">
      <h1 style="margin:0;color:#fff;font-size:24px;font-weight:700;line-height:1.2;">{title}</h1>
      <p style="margin:8px 0 0;color:rgba(255,255,255,0.8);font-size:13px;">{subtitle}</p>
    </td>
  </tr>
{body}
  <tr>
    <td style="background:#f8f8f8;padding:16px 40px;border-top:1px solid #eee;">
      <p style="margin:0;font-size:11px;color:#aaa;text-align:center;">{footer}</p>
    </td>
  </tr>
</table>
</td></tr>
</table>
</body></html>"#
    )
}

fn section(inner: &str) -> String {
    format!("  <tr>\n    <td style=\"padding:24px 40px;\">\n{inner}\n    </td>\n  </tr>")
}

fn quote_block(label: &str, text: &str) -> String {
    format!(
        r#"      <p style="margin:0 0 10px;font-size:12px;font-weight:700;color:#888;text-transform:uppercase;letter-spacing:0.1em;">{label}</p>
      <div style="background:#fafafa;border-left:4px solid #E8171B;border-radius:0 8px 8px 0;padding:16px 20px;font-size:14px;line-height:1.75;color:#333;">{text}</div>"#,
        text = nl2br(text)
    )
}

fn reply_button(email: &str, subject: &str, name: &str) -> String {
    format!(
        r#"      <a href="mailto:{email}?subject={subject}" style="display:inline-block;background:{ACCENT};color:#fff;font-size:14px;font-weight:700;text-decoration:none;padding:12px 28px;border-radius:8px;">&#8617; Reply to {name}</a>"#,
        email = escape_html(email),
        subject = encode_component(subject),
    )
}

fn contact_block(ctx: &RenderContext<'_>) -> String {
    let mail = ctx.mail;
    format!(
        r#"      <p style="margin:0 0 8px;font-size:14px;color:#555;">Need to reach us directly?</p>
      <p style="margin:0;font-size:13px;color:#555;line-height:1.8;">&#128222; {phone}<br />&#9993; {inbox}<br />&#128205; {address}</p>"#,
        phone = escape_html(&mail.business_phone),
        inbox = mailto(&mail.to_email),
        address = escape_html(&mail.business_address),
    )
}

fn rule(width: usize) -> String {
    "─".repeat(width)
}

impl Renderable for ContactForm {
    fn notification(&self, ctx: &RenderContext<'_>) -> OutgoingMail {
        let mail = ctx.mail;
        let label = self.subject_label();
        let full_name = self.full_name();
        let phone = self.phone.as_deref().unwrap_or("Not provided");
        let now = ctx.timestamp();

        let details = format!(
            "      <table width=\"100%\" cellpadding=\"0\" cellspacing=\"0\">{}{}{}{}</table>",
            row("Name", &full_name),
            row("Email", &mailto(&self.email)),
            row("Phone", phone),
            row("Subject", &label),
        );
        let body = [
            section(&details),
            section(&quote_block("Message", &self.message)),
            section(&reply_button(&self.email, &format!("Re: {label}"), &self.first_name)),
        ]
        .join("\n");

        let html = shell(
            "&#9993; New Contact Message",
            &format!("Received {now}"),
            &body,
            &format!("This message was submitted via the contact form at <strong>{}</strong>", mail.site_name),
        );

        let text = format!(
            "New Contact Message — {brand}\n{rule}\n\n\
             Name:    {full_name}\n\
             Email:   {email}\n\
             Phone:   {phone}\n\
             Subject: {label}\n\
             Date:    {now}\n\n\
             Message:\n{message}\n\n\
             {rule}\n\
             Submitted via {site}\n",
            brand = mail.brand_name,
            rule = rule(44),
            email = self.email,
            message = self.message,
            site = mail.site_name,
        );

        OutgoingMail {
            kind: MailKind::Notification,
            to: ctx.business(),
            reply_to: Recipient::new(&full_name, &self.email),
            subject: format!("[Contact] {label} — {full_name}"),
            text,
            html,
            attachment: None,
        }
    }

    fn auto_reply(&self, ctx: &RenderContext<'_>) -> OutgoingMail {
        let mail = ctx.mail;
        let label = self.subject_label();

        let greeting = format!(
            r#"      <p style="margin:0 0 20px;font-size:15px;color:#333;">Hi <strong>{first}</strong>,</p>
      <p style="margin:0 0 24px;font-size:14px;color:#555;line-height:1.7;">Thank you for contacting <strong>{brand}</strong>. Your message has been received and our team will get back to you as soon as possible.</p>
      <p style="margin:0;font-size:13px;color:#666;"><strong>Subject:</strong> {label}</p>"#,
            first = self.first_name,
            brand = escape_html(&mail.brand_name),
        );
        let body = [section(&greeting), section(&contact_block(ctx))].join("\n");

        let html = shell(
            "Thanks for reaching out!",
            "We've received your message and will respond within one business day.",
            &body,
            "Please do not reply to this auto-confirmation email.",
        );

        let text = format!(
            "Hi {first},\n\n\
             Thank you for contacting {brand}.\n\
             Your message has been received. We will respond within one business day.\n\n\
             Subject: {label}\n\n\
             Contact us directly:\n\
             Phone: {phone}\n\
             Email: {inbox}\n\n\
             {brand}\n\
             {address}\n",
            first = self.first_name,
            brand = mail.brand_name,
            phone = mail.business_phone,
            inbox = mail.to_email,
            address = mail.business_address,
        );

        OutgoingMail {
            kind: MailKind::AutoReply,
            to: Recipient::new(self.full_name(), &self.email),
            reply_to: ctx.business(),
            subject: format!("We received your message — {}", mail.brand_name),
            text,
            html,
            attachment: None,
        }
    }
}

impl Renderable for ResellerForm {
    fn notification(&self, ctx: &RenderContext<'_>) -> OutgoingMail {
        let mail = ctx.mail;
        let type_label = self.reseller_type_label();
        let services = self.service_list();
        let not_provided = |v: &Option<String>| v.clone().unwrap_or_else(|| "Not provided".to_string());
        let agent = self.agent_display().unwrap_or_else(|| "Not provided".to_string());
        let agent_text = format!(
            "{}{}",
            self.agent_name.as_deref().unwrap_or("Not provided"),
            self.agent_tel.as_deref().map(|tel| format!(" ({tel})")).unwrap_or_default()
        );
        let notes = self.notes.as_deref().unwrap_or("None");
        let now = ctx.timestamp();

        let rows = [
            row("Company / Name", &self.company_name),
            row("Shop Name", &self.shop_name),
            row("Region", &self.region),
            row("Address", &self.address),
            row("Email", &mailto(&self.email)),
            row("Telephone", &self.telephone),
            row("WhatsApp", &not_provided(&self.whatsapp)),
            row("BRN", &not_provided(&self.brn)),
            row("VAT Number", &not_provided(&self.vat)),
            row("Reseller Type", type_label),
            row("Service Types", &services),
            row("Sales Agent", &agent),
        ]
        .concat();

        let body = [
            section(&format!(
                "      <table width=\"100%\" cellpadding=\"0\" cellspacing=\"0\">{rows}</table>"
            )),
            section(&quote_block("Notes", notes)),
            section(&reply_button(
                &self.email,
                &format!("Re: Reseller Application — {}", self.shop_name),
                &self.company_name,
            )),
        ]
        .join("\n");

        let html = shell(
            "New Reseller Application",
            &format!("Received {now}"),
            &body,
            &format!("Reseller application submitted via <strong>{}</strong>", mail.site_name),
        );

        let text = format!(
            "New Reseller Application — {brand}\n{rule}\n\n\
             Company:      {company}\n\
             Shop:         {shop}\n\
             Region:       {region}\n\
             Address:      {address}\n\
             Email:        {email}\n\
             Telephone:    {telephone}\n\
             WhatsApp:     {whatsapp}\n\
             BRN:          {brn}\n\
             VAT:          {vat}\n\
             Type:         {type_label}\n\
             Services:     {services}\n\
             Agent:        {agent_text}\n\n\
             Notes:\n{notes}\n\n\
             {rule}\n\
             Submitted via {site}\n",
            brand = mail.brand_name,
            rule = rule(46),
            company = self.company_name,
            shop = self.shop_name,
            region = self.region,
            address = self.address,
            email = self.email,
            telephone = self.telephone,
            whatsapp = not_provided(&self.whatsapp),
            brn = not_provided(&self.brn),
            vat = not_provided(&self.vat),
            site = mail.site_name,
        );

        OutgoingMail {
            kind: MailKind::Notification,
            to: ctx.business(),
            reply_to: Recipient::new(&self.company_name, &self.email),
            subject: format!("[Reseller] {} — {} ({type_label})", self.shop_name, self.company_name),
            text,
            html,
            attachment: self.shop_photo.as_ref().map(|photo| MailAttachment {
                file_name: photo.file_name.clone(),
                content_type: photo.content_type.to_string(),
                bytes: photo.bytes.clone(),
            }),
        }
    }

    fn auto_reply(&self, ctx: &RenderContext<'_>) -> OutgoingMail {
        let mail = ctx.mail;
        let type_label = self.reseller_type_label();
        let services = self.service_list();

        let summary = format!(
            r#"      <p style="margin:0 0 20px;font-size:15px;color:#333;">Hi <strong>{company}</strong>,</p>
      <p style="margin:0 0 24px;font-size:14px;color:#555;line-height:1.7;">Thank you for applying to become an authorised reseller with <strong>{brand}</strong>. We have received your application and our partnerships team will be in touch.</p>
      <table cellpadding="0" cellspacing="0" width="100%">{rows}</table>"#,
            company = self.company_name,
            brand = escape_html(&mail.brand_name),
            rows = [
                row("Shop", &self.shop_name),
                row("Region", &self.region),
                row("Type", type_label),
                row("Services", &services),
            ]
            .concat(),
        );
        let body = [section(&summary), section(&contact_block(ctx))].join("\n");

        let html = shell(
            "Application Received",
            "Our team will review your details and contact you shortly.",
            &body,
            "Please do not reply to this auto-confirmation email.",
        );

        let text = format!(
            "Hi {company},\n\n\
             Thank you for applying to become a reseller with {brand}.\n\
             Your application has been received. Our team will review it and contact you shortly.\n\n\
             Application Summary:\n\
             \x20 Shop:     {shop}\n\
             \x20 Region:   {region}\n\
             \x20 Type:     {type_label}\n\
             \x20 Services: {services}\n\n\
             Contact us: {inbox} | {phone}\n\n\
             {brand} — {address}\n",
            company = self.company_name,
            brand = mail.brand_name,
            shop = self.shop_name,
            region = self.region,
            inbox = mail.to_email,
            phone = mail.business_phone,
            address = mail.business_address,
        );

        OutgoingMail {
            kind: MailKind::AutoReply,
            to: Recipient::new(&self.company_name, &self.email),
            reply_to: ctx.business(),
            subject: format!("Application Received — {}", mail.brand_name),
            text,
            html,
            attachment: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forms::{FormLimits, FormPayload, ShopPhoto, SubmissionForm};
    use axum::body::Bytes;
    use chrono::TimeZone;

    fn mail_config() -> MailConfig {
        MailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_user: "sender@example.com".to_string(),
            smtp_pass: "secret".to_string(),
            timeout_secs: 5,
            from_email: "sender@example.com".to_string(),
            from_name: "Example Website".to_string(),
            to_email: "orders@example.com".to_string(),
            to_name: "Example Distribution".to_string(),
            brand_name: "Example Distribution".to_string(),
            site_name: "example.com".to_string(),
            business_phone: "+1 555 0100".to_string(),
            business_address: "Port Louis, Mauritius".to_string(),
        }
    }

    const LIMITS: FormLimits = FormLimits {
        max_attachment_bytes: 1024,
    };

    fn contact() -> ContactForm {
        ContactForm::from_payload(
            &FormPayload::from_pairs([
                ("firstName", "Anu"),
                ("lastName", "K"),
                ("email", "a@b.com"),
                ("subject", "wholesale"),
                ("message", "Line one\nLine <two>"),
            ]),
            LIMITS,
        )
        .unwrap()
    }

    fn reseller() -> ResellerForm {
        ResellerForm::from_payload(
            &FormPayload::from_pairs([
                ("companyName", "Anu Traders"),
                ("shopName", "Corner Shop"),
                ("region", "North"),
                ("address", "1 Royal Road"),
                ("email", "shop@example.com"),
                ("telephone", "5000"),
                ("resellerType", "new"),
                ("serviceTypes", "wholesale"),
                ("serviceTypes", "events"),
                ("agentName", "Ravi"),
            ]),
            LIMITS,
        )
        .unwrap()
    }

    fn received_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 9, 5, 0).unwrap()
    }

    #[test]
    fn test_contact_notification() {
        let config = mail_config();
        let ctx = RenderContext::new(&config, received_at());
        let mail = contact().notification(&ctx);

        assert_eq!(mail.kind, MailKind::Notification);
        assert_eq!(mail.to, Recipient::new("Example Distribution", "orders@example.com"));
        assert_eq!(mail.reply_to, Recipient::new("Anu K", "a@b.com"));
        assert_eq!(mail.subject, "[Contact] Wholesale / Bulk Order — Anu K");
        assert!(mail.text.contains("Phone:   Not provided"));
        assert!(mail.text.contains("Date:    04 Mar 2026, 09:05 (UTC)"));
        assert!(mail.html.contains("Line one<br />\nLine"));
        assert!(mail.html.contains("subject=Re%3A%20Wholesale%20%2F%20Bulk%20Order"));
        assert!(mail.attachment.is_none());
    }

    #[test]
    fn test_contact_auto_reply() {
        let config = mail_config();
        let ctx = RenderContext::new(&config, received_at());
        let mail = contact().auto_reply(&ctx);

        assert_eq!(mail.kind, MailKind::AutoReply);
        assert_eq!(mail.to, Recipient::new("Anu K", "a@b.com"));
        assert_eq!(mail.reply_to.address, "orders@example.com");
        assert_eq!(mail.subject, "We received your message — Example Distribution");
        assert!(mail.text.starts_with("Hi Anu,"));
        assert!(mail.html.contains("+1 555 0100"));
    }

    #[test]
    fn test_reseller_notification() {
        let config = mail_config();
        let ctx = RenderContext::new(&config, received_at());
        let mut form = reseller();
        form.shop_photo = Some(ShopPhoto {
            file_name: "shop-photo.jpg".to_string(),
            content_type: "image/jpeg",
            bytes: Bytes::from_static(b"jpeg"),
        });

        let mail = form.notification(&ctx);

        assert_eq!(mail.subject, "[Reseller] Corner Shop — Anu Traders (New reseller)");
        assert_eq!(mail.reply_to, Recipient::new("Anu Traders", "shop@example.com"));
        assert!(mail.text.contains("Services:     Wholesale, Events"));
        assert!(mail.text.contains("Agent:        Ravi\n"));

        assert!(mail.text.contains("WhatsApp:     Not provided"));
        assert!(mail.html.contains("Ravi"));
        assert_eq!(mail.attachment.unwrap().file_name, "shop-photo.jpg");
    }

    #[test]
    fn test_reseller_agent_line_includes_phone() {
        let config = mail_config();
        let ctx = RenderContext::new(&config, received_at());
        let mut form = reseller();
        form.agent_tel = Some("5999".to_string());

        let mail = form.notification(&ctx);
        assert!(mail.text.contains("Agent:        Ravi (5999)\n"));
        assert!(mail.html.contains("Ravi — 5999"));

        form.agent_name = None;
        assert!(form.notification(&ctx).text.contains("Agent:        Not provided (5999)\n"));
    }

    #[test]
    fn test_reseller_auto_reply_has_no_attachment() {
        let config = mail_config();
        let ctx = RenderContext::new(&config, received_at());
        let mut form = reseller();
        form.shop_photo = Some(ShopPhoto {
            file_name: "shop-photo.jpg".to_string(),
            content_type: "image/jpeg",
            bytes: Bytes::from_static(b"jpeg"),
        });

        let mail = form.auto_reply(&ctx);

        assert_eq!(mail.subject, "Application Received — Example Distribution");
        assert_eq!(mail.to.address, "shop@example.com");
        assert!(mail.attachment.is_none());
        assert!(mail.text.contains("  Services: Wholesale, Events"));
    }

    #[test]
    fn test_email_escaped_in_html() {
        let config = mail_config();
        let ctx = RenderContext::new(&config, received_at());
        let mut form = contact();
        form.email = "o'neil&co@example.com".to_string();

        let mail = form.notification(&ctx);
        assert!(mail.html.contains("mailto:o&#039;neil&amp;co@example.com"));
    }
}
