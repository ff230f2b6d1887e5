//! Route tokens named in alert titles, rewritten to GTFS route ids.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeSet;

lazy_static! {
    static ref LINE_TOKEN: Regex = Regex::new(r"[0-9a-zA-Z-]{1,3}").unwrap();
}

/// Tokens that never name a route.
const IGNORED: [&str; 6] = ["", "Z", "WKD", "POP", "INFO", "WLT"];
const METRO_LINES: [&str; 2] = ["M1", "M2"];
const SKM_LINES: [&str; 4] = ["S1", "S2", "S3", "S9"];

/// Candidate route tokens from an alert title: the text between the first
/// and second `:`, split into runs of up to three word characters.
pub fn line_tokens(title: &str) -> Vec<String> {
    let Some(lines) = title.split(':').nth(1) else {
        return Vec::new();
    };
    LINE_TOKEN
        .find_iter(lines.trim())
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Rewrites raw tokens into the set of affected route ids.
///
/// A generic metro or SKM token (e.g. `M`, `SKM`) stands for every line of
/// that family. Regional rail (`R*`, `KM*`) and 9xx substitute services are
/// not in the schedule and are dropped.
pub fn normalize_lines<I, S>(tokens: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut lines = BTreeSet::new();

    for token in tokens {
        let token = token.as_ref().trim();

        if IGNORED.contains(&token) {
            continue;
        } else if token.starts_with('M') && !METRO_LINES.contains(&token) {
            lines.extend(METRO_LINES.iter().map(|l| l.to_string()));
        } else if token.starts_with('S') && !SKM_LINES.contains(&token) {
            lines.extend(SKM_LINES.iter().map(|l| l.to_string()));
        } else if token.starts_with("KM")
            || token.starts_with('R')
            || (token.starts_with('9') && token.chars().count() == 3)
        {
            continue;
        } else {
            lines.insert(token.to_string());
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_line_tokens_after_colon() {
        assert_eq!(
            line_tokens("Zmiany w kursowaniu linii: 105, 123, N21"),
            vec!["105", "123", "N21"]
        );
        assert_eq!(line_tokens("Utrudnienia: 4 i 17"), vec!["4", "i", "17"]);
        assert!(line_tokens("Brak informacji o liniach").is_empty());
    }

    #[test]
    fn test_line_tokens_stop_at_second_colon() {
        assert_eq!(
            line_tokens("Utrudnienia: 4, 17 od 10:30 do 12:00"),
            vec!["4", "17", "od", "10"]
        );
    }

    #[test]
    fn test_metro_family_collapses_without_duplicates() {
        assert_eq!(normalize_lines(["M", "M1", "M1"]), set(&["M1", "M2"]));
        assert_eq!(normalize_lines(["M2"]), set(&["M2"]));
    }

    #[test]
    fn test_skm_family_collapses() {
        assert_eq!(
            normalize_lines(["SKM", "S2"]),
            set(&["S1", "S2", "S3", "S9"])
        );
        assert_eq!(normalize_lines(["S3"]), set(&["S3"]));
    }

    #[test]
    fn test_non_route_tokens_dropped() {
        assert_eq!(
            normalize_lines(["", "Z", "WKD", "POP", "INFO", "WLT", "KM", "R1", "RL", "901", "9", "180"]),
            set(&["180", "9"])
        );
    }

    #[test]
    fn test_order_independent_and_idempotent() {
        let forward = normalize_lines(["17", "M", "SKM", "523"]);
        let backward = normalize_lines(["523", "SKM", "M", "17"]);
        assert_eq!(forward, backward);
        assert_eq!(normalize_lines(&forward), forward);
    }
}
