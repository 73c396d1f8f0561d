// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Text and email sanitization for submitted form fields.

/// Characters allowed in an email address after sanitization.
const EMAIL_SPECIALS: &str = "!#$%&'*+-=?^_`{|}~@.[]";

/// Characters allowed in the local part of an address besides alphanumerics.
const LOCAL_ATOM_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

/// Trim, strip markup tags and HTML-escape a submitted value.
///
/// Escaping leaves existing character references alone, so applying this
/// to its own output is a no-op.
pub fn clean_text(input: &str) -> String {
    let stripped = strip_tags(input.trim());
    escape_html(stripped.trim())
}

/// Remove markup tags.
///
/// A `<` followed by a letter, `/`, `!` or `?` opens a tag that runs to the
/// next `>` (or to the end of input). Any other `<` is kept as text.
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '<' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?') {
                    for skipped in chars.by_ref() {
                        if skipped == '>' {
                            break;
                        }
                    }
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

/// HTML-escape `& < > " '` without double-escaping character references.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for (i, c) in input.char_indices() {
        match c {
            '&' if starts_with_reference(&input[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Whether `s` (starting at `&`) begins with `&name;`, `&#123;` or `&#x1f;`.
fn starts_with_reference(s: &str) -> bool {
    let body = &s[1..];
    let Some(end) = body.find(';') else {
        return false;
    };
    let entity = &body[..end];
    if let Some(num) = entity.strip_prefix('#') {
        if let Some(hex) = num.strip_prefix(['x', 'X']) {
            return !hex.is_empty() && hex.len() <= 6 && hex.chars().all(|c| c.is_ascii_hexdigit());
        }
        return !num.is_empty() && num.len() <= 7 && num.chars().all(|c| c.is_ascii_digit());
    }
    !entity.is_empty()
        && entity.len() <= 32
        && entity.starts_with(|c: char| c.is_ascii_alphabetic())
        && entity.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Drop every character that cannot appear in an email address.
pub fn sanitize_email(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || EMAIL_SPECIALS.contains(*c))
        .collect()
}

/// Syntactic email validation (dot-atom local part, hostname domain).
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > 254 {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if domain.contains('@') {
        return false;
    }
    is_valid_local_part(local) && is_valid_domain(domain)
}

fn is_valid_local_part(local: &str) -> bool {
    !local.is_empty()
        && local.len() <= 64
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || LOCAL_ATOM_SPECIALS.contains(c))
}

fn is_valid_domain(domain: &str) -> bool {
    if domain.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

/// Insert `<br />` before each line break of already-escaped text.
pub fn nl2br(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str("<br />\r\n");
            }
            '\r' | '\n' => {
                out.push_str("<br />");
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}
