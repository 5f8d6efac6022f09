// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Subscription detector behavior over realistic sender/subject pairs.

use chrono::{Datelike, TimeZone, Utc};
use subtrack::services::detector::{
    detect, normalize_domain, parse_email_date, sender_domain, KNOWN_VENDORS,
};

#[test]
fn test_known_vendor_subdomain_with_invoice() {
    let detection = detect("billing.netflix.com", "Your invoice is ready", "2024-01-01")
        .expect("should detect Netflix");

    assert_eq!(detection.name, "Netflix");
    assert_eq!(detection.domain, "netflix.com");
    assert!(detection.known_vendor);
    assert_eq!(detection.keyword, Some("invoice"));
    assert_eq!(
        detection.email_date,
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    );
}

#[test]
fn test_unknown_sender_without_keyword() {
    assert!(detect("randomsender.example.com", "Hello there", "2024-01-01").is_none());
}

#[test]
fn test_known_vendor_without_keyword() {
    let detection = detect("spotify.com", "New music for you", "").unwrap();
    assert_eq!(detection.name, "Spotify");
    assert_eq!(detection.keyword, None);
    assert_eq!(detection.email_date, None);
}

#[test]
fn test_keyword_only_names_the_sender() {
    let detection = detect(
        "mail.my-gym.com",
        "Payment received - thank you",
        "Mon, 15 Jan 2024 08:30:00 -0500",
    )
    .unwrap();

    assert_eq!(detection.name, "My Gym");
    assert_eq!(detection.domain, "my-gym.com");
    assert!(!detection.known_vendor);
    assert_eq!(detection.keyword, Some("payment"));
    assert_eq!(
        detection.email_date,
        Some(Utc.with_ymd_and_hms(2024, 1, 15, 13, 30, 0).unwrap())
    );
}

#[test]
fn test_keyword_match_is_case_insensitive() {
    for subject in ["YOUR PLAN has changed", "Free Trial ending", "RECEIPT #1234"] {
        assert!(
            detect("example.org", subject, "").is_some(),
            "subject {:?} should match",
            subject
        );
    }
}

#[test]
fn test_detection_is_deterministic() {
    let first = detect("www.Adobe.com", "Renewal notice", "2024-06-30");
    for _ in 0..10 {
        assert_eq!(detect("www.Adobe.com", "Renewal notice", "2024-06-30"), first);
    }
    assert_eq!(first.unwrap().name, "Adobe");
}

#[test]
fn test_vendor_table() {
    assert_eq!(KNOWN_VENDORS.len(), 14);
    for (domain, name) in KNOWN_VENDORS {
        assert_eq!(normalize_domain(domain), *domain);
        let detection = detect(domain, "", "").unwrap();
        assert_eq!(detection.name, *name);
    }
}

#[test]
fn test_sender_domain_from_headers() {
    assert_eq!(
        sender_domain("Netflix <info@mailer.netflix.com>"),
        Some("mailer.netflix.com".to_string())
    );
    assert_eq!(
        sender_domain("billing@Spotify.com"),
        Some("spotify.com".to_string())
    );
    assert_eq!(sender_domain("Undisclosed recipients"), None);
}

#[test]
fn test_email_date_formats() {
    let with_comment = parse_email_date("Tue, 2 Jul 2024 10:00:00 +0000 (UTC)").unwrap();
    assert_eq!((with_comment.year(), with_comment.month(), with_comment.day()), (2024, 7, 2));

    assert!(parse_email_date("2024-07-02T10:00:00Z").is_some());
    assert!(parse_email_date("not a date").is_none());
    assert!(parse_email_date("").is_none());
}
