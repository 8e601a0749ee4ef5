//! Bulk discovery of signals from the subscriptions page.

use anyhow::Result;
use common::db::AsyncDb;
use scraper::{Html, Selector};
use std::collections::HashSet;

use crate::store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredSignal {
    pub id: String,
    pub url: String,
    pub name: Option<String>,
}

/// Extracts the numeric signal id from a site-relative href such as
/// `/en/signals/123456?source=x`. Links into the subscription
/// management area are not signal pages and are skipped.
fn signal_id_from_href(href: &str) -> Option<&str> {
    let mut rest = href.strip_prefix('/')?;
    // Optional two-letter language segment, e.g. "en/". Hrefs are not
    // guaranteed ASCII, so check bytes before slicing.
    let bytes = rest.as_bytes();
    if bytes.len() > 3 && bytes[2] == b'/' && bytes[..2].iter().all(u8::is_ascii_lowercase) {
        rest = &rest[3..];
    }
    let rest = rest.strip_prefix("signals/")?;
    if rest.starts_with("subscription/") {
        return None;
    }
    let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    Some(&rest[..digits])
}

/// Walks the subscriptions table and returns each distinct signal
/// linked from it, in page order. An empty or unrecognized page yields
/// an empty list rather than an error.
pub fn parse_subscriptions(html: &str, base_url: &str) -> Vec<DiscoveredSignal> {
    let doc = Html::parse_document(html);
    let (Ok(table_sel), Ok(row_sel), Ok(link_sel)) = (
        Selector::parse("div.signals-table"),
        Selector::parse("div.row"),
        Selector::parse("a[href]"),
    ) else {
        return Vec::new();
    };

    let base = base_url.trim_end_matches('/');
    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for table in doc.select(&table_sel) {
        for row in table.select(&row_sel) {
            let Some((link, id)) = row
                .select(&link_sel)
                .filter_map(|a| {
                    let href = a.value().attr("href")?;
                    signal_id_from_href(href).map(|id| (a, id))
                })
                .next()
            else {
                continue;
            };
            if !seen.insert(id.to_string()) {
                continue;
            }
            let href = link.value().attr("href").unwrap_or_default();
            let name = link.text().collect::<String>().trim().to_string();
            results.push(DiscoveredSignal {
                id: id.to_string(),
                url: format!("{base}{href}"),
                name: (!name.is_empty()).then_some(name),
            });
        }
    }
    results
}

/// Adds every discovered signal to the roster as auto-tracked.
/// Returns how many were new.
pub async fn sync_discovered(db: &AsyncDb, discovered: &[DiscoveredSignal]) -> Result<usize> {
    let mut added = 0;
    for signal in discovered {
        if store::add_signal(db, &signal.id, &signal.url, signal.name.as_deref(), true).await? {
            tracing::info!(signal_id = %signal.id, name = ?signal.name, "discovered signal");
            added += 1;
        }
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="signals-table">
            <div class="row">
              <a href="/en/signals/subscription/55">Manage</a>
              <a href="/en/signals/123456?source=list"><span>Steady Pips</span></a>
            </div>
            <div class="row">
              <a href="/signals/789"> Aurum Fox </a>
            </div>
            <div class="row">
              <a href="/en/signals/123456">Steady Pips again</a>
            </div>
            <div class="row">
              <a href="/en/market/987">Not a signal</a>
            </div>
          </div>
        </body></html>"#;

    #[test]
    fn test_parses_rows_and_dedupes() {
        let found = parse_subscriptions(PAGE, "https://www.mql5.com/");
        assert_eq!(
            found,
            vec![
                DiscoveredSignal {
                    id: "123456".to_string(),
                    url: "https://www.mql5.com/en/signals/123456?source=list".to_string(),
                    name: Some("Steady Pips".to_string()),
                },
                DiscoveredSignal {
                    id: "789".to_string(),
                    url: "https://www.mql5.com/signals/789".to_string(),
                    name: Some("Aurum Fox".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_page_without_table_is_empty() {
        assert!(parse_subscriptions("<html><body><p>login</p></body></html>", "https://x.test")
            .is_empty());
    }

    #[test]
    fn test_href_id_extraction() {
        assert_eq!(signal_id_from_href("/en/signals/123456"), Some("123456"));
        assert_eq!(signal_id_from_href("/signals/42?x=1"), Some("42"));
        assert_eq!(signal_id_from_href("/en/signals/subscription/42"), None);
        assert_eq!(signal_id_from_href("/en/signals/"), None);
        assert_eq!(signal_id_from_href("/en/market/42"), None);
        assert_eq!(signal_id_from_href("signals/42"), None);
    }

    #[test]
    fn test_href_with_multibyte_prefix_is_skipped() {
        // First slice boundary lands inside a two-byte char.
        assert_eq!(signal_id_from_href("/ééx"), None);
        assert_eq!(signal_id_from_href("/日本/signals/42"), None);
        assert_eq!(signal_id_from_href("/é"), None);

        let page = r#"<div class="signals-table"><div class="row">
            <a href="/ééx">weird</a>
            <a href="/en/signals/42">ok</a>
        </div></div>"#;
        let found = parse_subscriptions(page, "https://x.test");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "42");
    }

    #[tokio::test]
    async fn test_sync_inserts_only_new_signals() {
        let db = AsyncDb::open(":memory:").await.unwrap();
        store::add_signal(&db, "789", "https://www.mql5.com/signals/789", None, false)
            .await
            .unwrap();

        let found = parse_subscriptions(PAGE, "https://www.mql5.com");
        assert_eq!(sync_discovered(&db, &found).await.unwrap(), 1);

        let roster = store::list_signals(&db).await.unwrap();
        assert_eq!(roster.len(), 2);
        // Discovered entries are flagged auto; the manual one keeps its flag.
        let auto: Vec<bool> = roster.iter().map(|s| s.auto).collect();
        assert_eq!(auto, vec![true, false]);
    }
}
