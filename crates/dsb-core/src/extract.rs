//! Domain-shaped token extraction.
//!
//! The pattern is a permissive hostname shape: dot-separated labels of ASCII
//! letters, digits and hyphens, ending in a label of at least two letters. It
//! is not validated against DNS or the public suffix list, so tokens such as
//! `v1.2.txt` match too and are kept.

use std::{collections::BTreeSet, sync::OnceLock};

use regex::Regex;

static DOMAIN_RE: OnceLock<Regex> = OnceLock::new();

fn domain_re() -> &'static Regex {
    DOMAIN_RE.get_or_init(|| {
        Regex::new(r"\b(?:[A-Za-z0-9-]+\.)+[A-Za-z]{2,}\b").expect("valid domain regex")
    })
}

/// Extract the distinct, lowercased domain-shaped tokens in `text`.
pub fn extract_domains(text: &str) -> BTreeSet<String> {
    domain_re()
        .find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect()
}

/// Same as [`extract_domains`], replacing invalid UTF-8 instead of failing.
pub fn extract_domains_lossy(bytes: &[u8]) -> BTreeSet<String> {
    extract_domains(&String::from_utf8_lossy(bytes))
}
