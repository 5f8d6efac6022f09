// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription detection from email metadata.
//!
//! Pure functions over sender domain, subject and date: no I/O, no state.
//! A message counts as a subscription signal if its sender is a known vendor
//! or its subject carries a billing keyword.

use chrono::{DateTime, NaiveDate, Utc};

/// Well-known subscription vendors, keyed by registrable domain.
pub const KNOWN_VENDORS: &[(&str, &str)] = &[
    ("netflix.com", "Netflix"),
    ("spotify.com", "Spotify"),
    ("hulu.com", "Hulu"),
    ("disneyplus.com", "Disney+"),
    ("hbomax.com", "HBO Max"),
    ("youtube.com", "YouTube Premium"),
    ("apple.com", "Apple"),
    ("amazon.com", "Amazon Prime"),
    ("audible.com", "Audible"),
    ("adobe.com", "Adobe"),
    ("microsoft.com", "Microsoft 365"),
    ("dropbox.com", "Dropbox"),
    ("google.com", "Google One"),
    ("nytimes.com", "The New York Times"),
];

/// Lowercase subject fragments that mark a billing email.
pub const SUBJECT_KEYWORDS: &[&str] = &[
    "renewal",
    "trial",
    "invoice",
    "receipt",
    "payment",
    "your plan",
];

/// A message identified as a subscription signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Normalized sender domain (last two labels)
    pub domain: String,
    /// Vendor name, or a name derived from the domain
    pub name: String,
    /// Whether the domain is in the vendor table
    pub known_vendor: bool,
    /// First subject keyword found, if any
    pub keyword: Option<&'static str>,
    /// Parsed email date, `None` if unparseable
    pub email_date: Option<DateTime<Utc>>,
}

/// Lowercase, drop a leading "www." label, keep the last two DNS labels.
///
/// "www" is only dropped while more than two labels remain, so a result is
/// always its own normalization.
pub fn normalize_domain(domain: &str) -> String {
    let lowered = domain.trim().trim_end_matches('.').to_lowercase();

    let mut labels: Vec<&str> = lowered.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() > 2 && labels[0] == "www" {
        labels.remove(0);
    }
    if labels.len() > 2 {
        labels.drain(..labels.len() - 2);
    }
    labels.join(".")
}

/// Vendor name for a normalized domain.
pub fn vendor_name(normalized_domain: &str) -> Option<&'static str> {
    KNOWN_VENDORS
        .iter()
        .find(|(domain, _)| *domain == normalized_domain)
        .map(|(_, name)| *name)
}

/// Title-cased first label with hyphens as spaces ("my-gym.com" → "My Gym").
pub fn name_from_domain(normalized_domain: &str) -> String {
    let first = normalized_domain.split('.').next().unwrap_or_default();
    first
        .split('-')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify one message. Same inputs always give the same answer.
pub fn detect(from_domain: &str, subject: &str, email_date: &str) -> Option<Detection> {
    let domain = normalize_domain(from_domain);
    let vendor = vendor_name(&domain);

    let subject = subject.to_lowercase();
    let keyword = SUBJECT_KEYWORDS
        .iter()
        .copied()
        .find(|k| subject.contains(k));

    if vendor.is_none() && keyword.is_none() {
        return None;
    }

    // Keyword-only matches name the sender, which may be a payment processor
    // rather than the subscribed service.
    let name = match vendor {
        Some(name) => name.to_string(),
        None => name_from_domain(&domain),
    };

    Some(Detection {
        name,
        known_vendor: vendor.is_some(),
        keyword,
        email_date: parse_email_date(email_date),
        domain,
    })
}

/// Extract the domain from a `From:` header ("Name <user@host>" or "user@host").
pub fn sender_domain(from_header: &str) -> Option<String> {
    let address = match (from_header.rfind('<'), from_header.rfind('>')) {
        (Some(start), Some(end)) if start < end => &from_header[start + 1..end],
        _ => from_header,
    };

    let (_, host) = address.trim().rsplit_once('@')?;
    let host = host.trim().trim_matches(|c| c == '>' || c == '"');
    if host.is_empty() {
        return None;
    }
    Some(host.to_lowercase())
}

/// Parse an email `Date:` header; falls back to RFC 3339 and `YYYY-MM-DD`.
pub fn parse_email_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    // Drop a trailing comment such as "(UTC)" or "(PST)".
    let without_comment = match raw.rfind('(') {
        Some(idx) if raw.ends_with(')') => raw[..idx].trim_end(),
        _ => raw,
    };

    if let Ok(dt) = DateTime::parse_from_rfc2822(without_comment) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
