//! Service alerts from the ZTM RSS feeds.
//!
//! Two feeds are read: disruptions (effect `REDUCED_SERVICE`) and planned
//! changes (effect `MODIFIED_SERVICE`). Each RSS item names its routes in
//! the title; the long description lives on the linked web page.

pub mod lines;
pub mod page;
pub mod rss;

pub use lines::{line_tokens, normalize_lines};

use html_escape::decode_html_entities;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::gtfs_rt;

pub const DISRUPTIONS_FEED_URL: &str = "http://www.ztm.waw.pl/rss.php?l=1&IDRss=6";
pub const CHANGES_FEED_URL: &str = "http://www.ztm.waw.pl/rss.php?l=1&IDRss=3";

lazy_static! {
    static ref TAG: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertEffect {
    /// Disruptions feed.
    ReducedService,
    /// Planned changes feed.
    ModifiedService,
}

impl AlertEffect {
    pub fn label(self) -> &'static str {
        match self {
            AlertEffect::ReducedService => "REDUCED_SERVICE",
            AlertEffect::ModifiedService => "MODIFIED_SERVICE",
        }
    }

    pub fn to_proto(self) -> gtfs_rt::alert::Effect {
        match self {
            AlertEffect::ReducedService => gtfs_rt::alert::Effect::ReducedService,
            AlertEffect::ModifiedService => gtfs_rt::alert::Effect::ModifiedService,
        }
    }
}

impl Serialize for AlertEffect {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// One `<item>` of an alert feed, tags already cleaned.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEntry {
    pub title: String,
    pub link: String,
    pub description: String,
    pub effect: AlertEffect,
}

/// Long description taken from the alert's web page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertDescription {
    pub plain: String,
    pub html: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub id: String,
    pub routes: Vec<String>,
    pub effect: AlertEffect,
    pub link: String,
    pub title: String,
    pub body: String,
    #[serde(rename = "htmlbody")]
    pub html_body: String,
}

/// Turns feed entries into alerts, numbering them `a-1`, `a-2`, ... in input
/// order. An entry that names no known route is skipped, but its number is
/// still used up.
///
/// `describe` looks up the page description for an entry; `None` leaves the
/// body empty.
pub fn build_alerts<F>(entries: &[AlertEntry], mut describe: F) -> Vec<Alert>
where
    F: FnMut(&AlertEntry) -> Option<AlertDescription>,
{
    let mut alerts = Vec::new();

    for (n, entry) in entries.iter().enumerate() {
        let routes = normalize_lines(line_tokens(&entry.title));
        if routes.is_empty() {
            continue;
        }

        let description = describe(entry).unwrap_or_default();
        alerts.push(Alert {
            id: format!("a-{}", n + 1),
            routes: routes.into_iter().collect(),
            effect: entry.effect,
            link: entry.link.clone(),
            title: entry.description.clone(),
            body: description.plain,
            html_body: description.html,
        });
    }

    alerts
}

/// Strips markup and decodes HTML entities in the remaining text. A literal
/// `None` (left by the feed for empty fields) reads as empty.
pub fn clean_tags(html: &str) -> String {
    let text = TAG.replace_all(html, "");
    none_as_empty(decode_html_entities(text.trim()).trim())
}

/// Strips markup from text whose entities are already decoded.
pub(crate) fn strip_tags(markup: &str) -> String {
    none_as_empty(TAG.replace_all(markup, "").trim())
}

fn none_as_empty(text: &str) -> String {
    if text == "None" { String::new() } else { text.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(title: &str, effect: AlertEffect) -> AlertEntry {
        AlertEntry {
            title: title.to_string(),
            link: format!("https://www.ztm.waw.pl/news/{}", title.len()),
            description: format!("About {title}"),
            effect,
        }
    }

    #[test]
    fn test_build_alerts_numbering_skips_but_consumes_ids() {
        let entries = vec![
            entry("Utrudnienia: 4, 17", AlertEffect::ReducedService),
            entry("Utrudnienia: WKD", AlertEffect::ReducedService),
            entry("Zmiany: M", AlertEffect::ModifiedService),
        ];

        let alerts = build_alerts(&entries, |_| None);

        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].id, "a-1");
        assert_eq!(alerts[0].routes, vec!["17", "4"]);
        assert_eq!(alerts[1].id, "a-3");
        assert_eq!(alerts[1].routes, vec!["M1", "M2"]);
        assert_eq!(alerts[1].effect, AlertEffect::ModifiedService);
        assert_eq!(alerts[1].title, "About Zmiany: M");
        assert!(alerts[1].body.is_empty());
    }

    #[test]
    fn test_build_alerts_uses_description() {
        let entries = vec![entry("Utrudnienia: 523", AlertEffect::ReducedService)];
        let alerts = build_alerts(&entries, |e| {
            Some(AlertDescription {
                plain: format!("Body of {}", e.link),
                html: "<p>Body</p>".to_string(),
            })
        });

        assert_eq!(alerts[0].body, format!("Body of {}", entries[0].link));
        assert_eq!(alerts[0].html_body, "<p>Body</p>");
    }

    #[test]
    fn test_alert_json_shape() {
        let entries = vec![entry("Utrudnienia: 523", AlertEffect::ReducedService)];
        let alerts = build_alerts(&entries, |_| None);
        let json = serde_json::to_value(&alerts[0]).unwrap();

        assert_eq!(json["effect"], "REDUCED_SERVICE");
        assert_eq!(json["routes"], serde_json::json!(["523"]));
        assert!(json.get("htmlbody").is_some());
    }

    #[test]
    fn test_clean_tags() {
        assert_eq!(clean_tags("<b>Tram</b> &amp; bus "), "Tram & bus");
        assert_eq!(clean_tags("None"), "");
        assert_eq!(clean_tags("<p>None</p>"), "");
    }

    #[test]
    fn test_clean_tags_decodes_numeric_entities_once() {
        assert_eq!(clean_tags("<p>Wola &#8211; Ochota</p>"), "Wola \u{2013} Ochota");
        assert_eq!(clean_tags("Pl. Zbawiciela &oacute;"), "Pl. Zbawiciela \u{f3}");
        assert_eq!(clean_tags("1 &amp;lt; 2"), "1 &lt; 2");
    }
}
