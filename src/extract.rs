//! Per-feed extraction rules.
//!
//! Feeds publish entries in a handful of text layouts. An extraction rule
//! turns a downloaded body into candidate entries; it does not validate
//! them, that is the job of [`crate::validation`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// How candidate entries are pulled out of a feed body.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractRule {
    /// Strip `#`/`;` comments and take the first whitespace-separated field
    #[default]
    Plain,
    /// DShield `block.txt`: start address, end address, prefix length, ...
    Dshield,
    /// Every IPv4-looking substring of each line (URL lists and similar)
    Ipv4Substrings,
}

impl ExtractRule {
    /// Extract candidate entries from a feed body.
    pub fn extract(&self, body: &str) -> Vec<String> {
        let lines = body.lines().map(strip_comment).filter(|l| !l.is_empty());

        match self {
            ExtractRule::Plain => lines.filter_map(first_field).map(str::to_string).collect(),
            ExtractRule::Dshield => lines.filter_map(dshield_entry).collect(),
            ExtractRule::Ipv4Substrings => lines
                .flat_map(|line| ipv4_pattern().find_iter(line).map(|m| m.as_str().to_string()))
                .collect(),
        }
    }
}

/// Cut a line at the first `#` or `;` and trim it.
fn strip_comment(line: &str) -> &str {
    let end = line.find(|c| c == '#' || c == ';').unwrap_or(line.len());
    line[..end].trim()
}

fn first_field(line: &str) -> Option<&str> {
    line.split_whitespace().next()
}

/// `start end prefix count ...` becomes `start/prefix`. Lines whose third
/// column is not a number (headers, plain addresses) fall back to the first
/// field.
fn dshield_entry(line: &str) -> Option<String> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [start, _end, prefix, ..] if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) => {
            Some(format!("{}/{}", start, prefix))
        }
        [first, ..] => Some(first.to_string()),
        [] => None,
    }
}

fn ipv4_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").expect("IPv4 pattern is a valid regex")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_strips_comments_and_blanks() {
        let body = "# header\n\n192.0.2.1\n198.51.100.0/24 ; SBL123\n  203.0.113.7  # note\n;only comment\n";
        let entries = ExtractRule::Plain.extract(body);
        assert_eq!(entries, vec!["192.0.2.1", "198.51.100.0/24", "203.0.113.7"]);
    }

    #[test]
    fn test_plain_takes_first_field() {
        let body = "192.0.2.1\t8\n192.0.2.2 3 extra";
        let entries = ExtractRule::Plain.extract(body);
        assert_eq!(entries, vec!["192.0.2.1", "192.0.2.2"]);
    }

    #[test]
    fn test_plain_keeps_invalid_tokens_for_validator() {
        let entries = ExtractRule::Plain.extract("not-an-ip\n");
        assert_eq!(entries, vec!["not-an-ip"]);
    }

    #[test]
    fn test_dshield_builds_cidr() {
        let body = "#\n# DShield.org Recommended Block List\n#\nStart\tEnd\tNetblock\tAttacks\n\
                    45.148.10.0\t45.148.10.255\t24\t5471\n\
                    193.163.125.0\t193.163.125.255\t24\t2034\n";
        let entries = ExtractRule::Dshield.extract(body);
        assert_eq!(entries, vec!["Start", "45.148.10.0/24", "193.163.125.0/24"]);
    }

    #[test]
    fn test_dshield_falls_back_to_first_field() {
        let entries = ExtractRule::Dshield.extract("192.0.2.9\n");
        assert_eq!(entries, vec!["192.0.2.9"]);
    }

    #[test]
    fn test_ipv4_substrings_from_urls() {
        let body = "# URLhaus\nhttp://192.0.2.10:8080/bins/mozi.m\nhttps://example.com/x\nhttp://198.51.100.3/a http://203.0.113.4/b\n";
        let entries = ExtractRule::Ipv4Substrings.extract(body);
        assert_eq!(entries, vec!["192.0.2.10", "198.51.100.3", "203.0.113.4"]);
    }

    #[test]
    fn test_ipv4_substrings_leaves_range_check_to_validator() {
        let entries = ExtractRule::Ipv4Substrings.extract("http://999.1.1.1/\n");
        assert_eq!(entries, vec!["999.1.1.1"]);
    }

    #[test]
    fn test_empty_body_yields_nothing() {
        for rule in [ExtractRule::Plain, ExtractRule::Dshield, ExtractRule::Ipv4Substrings] {
            assert!(rule.extract("").is_empty());
            assert!(rule.extract("# only\n# comments\n").is_empty());
        }
    }

    #[test]
    fn test_serde_names() {
        let rule: ExtractRule = serde_yaml::from_str("ipv4_substrings").unwrap();
        assert_eq!(rule, ExtractRule::Ipv4Substrings);
        assert_eq!(serde_yaml::to_string(&ExtractRule::Dshield).unwrap().trim(), "dshield");
    }
}
