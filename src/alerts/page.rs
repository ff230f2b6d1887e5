use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use super::{AlertDescription, clean_tags};
use crate::fetch::{HttpClient, fetch_bytes};

lazy_static! {
    static ref PAGE_CONTENT: Selector = Selector::parse("div#PageContent").unwrap();
    static ref BOILERPLATE: Selector =
        Selector::parse("table, h4, #PageInfo, #InneKomunikaty, .InneKomunikatyLinia, .cb")
            .unwrap();
}

/// Pulls the alert text out of a ztm.waw.pl article page. Navigation,
/// timetables and links to other notices are dropped.
///
/// A page without `#PageContent` yields an empty description.
pub fn extract_description(page: &str) -> AlertDescription {
    let mut document = Html::parse_document(page);

    let Some(content_id) = document.select(&PAGE_CONTENT).next().map(|e| e.id()) else {
        return AlertDescription::default();
    };

    let boilerplate: Vec<_> = document
        .tree
        .get(content_id)
        .and_then(ElementRef::wrap)
        .map(|content| content.select(&BOILERPLATE).map(|e| e.id()).collect())
        .unwrap_or_default();
    for id in boilerplate {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let Some(content) = document.tree.get(content_id).and_then(ElementRef::wrap) else {
        return AlertDescription::default();
    };
    let html = content.inner_html().trim().to_string();

    let with_breaks = html
        .replace("</p>", "\n")
        .replace("<br/>", "\n")
        .replace("<br>", "\n")
        .replace('\u{a0}', " ")
        .replace("&nbsp;", " ");
    let plain = clean_tags(&with_breaks)
        .lines()
        .map(|line| line.split(' ').filter(|w| !w.is_empty()).collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();

    AlertDescription { plain, html }
}

/// Downloads and extracts an alert page. Failures are logged and give an
/// empty description.
pub async fn describe<C: HttpClient>(client: &C, link: &str) -> AlertDescription {
    if link.is_empty() {
        return AlertDescription::default();
    }
    match fetch_bytes(client, link).await {
        Ok(bytes) => extract_description(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            warn!(link, error = %e, "Failed to fetch alert page");
            AlertDescription::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
<div id="Menu">Menu</div>
<div id="PageContent">
  <h4>Utrudnienia</h4>
  <div id="PageInfo">Opublikowano 14.10.2026</div>
  <p>Tramwaje linii 4 i 17 kursują objazdem.</p>
  <p>Prosimy o&nbsp;korzystanie<br>z autobusów.</p>
  <table><tr><td>rozkład</td></tr></table>
  <div class="cb"></div>
  <div id="InneKomunikaty"><div class="InneKomunikatyLinia">Inne</div></div>
</div>
</body></html>"#;

    #[test]
    fn test_extract_description_drops_boilerplate() {
        let description = extract_description(PAGE);

        assert_eq!(
            description.plain,
            "Tramwaje linii 4 i 17 kursują objazdem.\nProsimy o korzystanie\nz autobusów."
        );
        assert!(description.html.starts_with("<p>Tramwaje"));
        assert!(!description.html.contains("rozkład"));
        assert!(!description.html.contains("PageInfo"));
        assert!(!description.html.contains("Inne"));
        assert!(!description.html.contains("Menu"));
    }

    #[test]
    fn test_page_without_content() {
        let description = extract_description("<html><body><p>404</p></body></html>");
        assert_eq!(description, AlertDescription::default());
    }
}
