use html_escape::decode_html_entities;
use lazy_static::lazy_static;
use regex::Regex;

use super::{AlertEffect, AlertEntry, clean_tags, strip_tags};

lazy_static! {
    static ref ITEM: Regex = Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>").unwrap();
    static ref TITLE: Regex = Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").unwrap();
    static ref LINK: Regex = Regex::new(r"(?s)<link\b[^>]*>(.*?)</link>").unwrap();
    static ref DESCRIPTION: Regex =
        Regex::new(r"(?s)<description\b[^>]*>(.*?)</description>").unwrap();
    static ref CDATA: Regex = Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap();
}

/// Reads the `<item>` elements of an RSS document, in document order.
pub fn parse_items(xml: &str, effect: AlertEffect) -> Vec<AlertEntry> {
    ITEM.captures_iter(xml)
        .map(|item| {
            let item = &item[1];
            AlertEntry {
                title: field(&TITLE, item),
                link: field(&LINK, item),
                description: field(&DESCRIPTION, item),
                effect,
            }
        })
        .collect()
}

fn field(pattern: &Regex, item: &str) -> String {
    let Some(raw) = pattern.captures(item).map(|c| c[1].to_string()) else {
        return String::new();
    };
    // CDATA content is literal HTML; everything else is entity-escaped once
    // by the XML layer on top of its HTML
    if raw.contains("<![CDATA[") {
        clean_tags(&CDATA.replace_all(&raw, "$1"))
    } else {
        strip_tags(&decode_html_entities(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::build_alerts;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
  <title>ZTM - Utrudnienia</title>
  <link>https://www.ztm.waw.pl</link>
  <item>
    <title>Utrudnienia w kursowaniu linii: 4, 17</title>
    <link>https://www.ztm.waw.pl/utrudnienia/1</link>
    <description><![CDATA[<p>Awaria sieci na ul. Marszałkowskiej</p>]]></description>
  </item>
  <item>
    <title>Zmiany: 523 &amp; N21</title>
    <link>https://www.ztm.waw.pl/utrudnienia/2</link>
    <description>&lt;b&gt;Objazd&lt;/b&gt; ulicą Prostą</description>
  </item>
  <item>
    <title>Bez opisu: 180</title>
    <description>None</description>
  </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_items() {
        let items = parse_items(FEED, AlertEffect::ReducedService);

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].title, "Utrudnienia w kursowaniu linii: 4, 17");
        assert_eq!(items[0].link, "https://www.ztm.waw.pl/utrudnienia/1");
        assert_eq!(items[0].description, "Awaria sieci na ul. Marszałkowskiej");
        assert_eq!(items[0].effect, AlertEffect::ReducedService);

        assert_eq!(items[1].title, "Zmiany: 523 & N21");
        assert_eq!(items[1].description, "Objazd ulicą Prostą");
    }

    #[test]
    fn test_missing_and_none_fields_are_empty() {
        let items = parse_items(FEED, AlertEffect::ModifiedService);
        assert_eq!(items[2].link, "");
        assert_eq!(items[2].description, "");
    }

    #[test]
    fn test_numeric_entities_do_not_become_route_tokens() {
        let feed = r#"<rss><channel>
          <item>
            <title>Utrudnienia: 17 &#8211; objazd</title>
            <link>https://www.ztm.waw.pl/utrudnienia/3</link>
            <description><![CDATA[<p>Objazd ul. G&oacute;rczewsk&#261;</p>]]></description>
          </item>
          <item>
            <title>Zmiany: 523 &amp;lt; 525</title>
            <description>Bez zmian</description>
          </item>
        </channel></rss>"#;

        let items = parse_items(feed, AlertEffect::ReducedService);

        assert_eq!(items[0].title, "Utrudnienia: 17 \u{2013} objazd");
        assert_eq!(items[0].description, "Objazd ul. G\u{f3}rczewsk\u{105}");
        // Escaped text stays escaped after a single decode
        assert_eq!(items[1].title, "Zmiany: 523 &lt; 525");

        let alerts = build_alerts(&items[..1], |_| None);
        assert!(alerts[0].routes.contains(&"17".to_string()));
        assert!(!alerts[0].routes.contains(&"821".to_string()));
        assert!(!alerts[0].routes.contains(&"1".to_string()));
    }

    #[test]
    fn test_no_items() {
        assert!(parse_items("<rss><channel></channel></rss>", AlertEffect::ReducedService).is_empty());
    }
}
