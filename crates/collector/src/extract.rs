//! Label-anchored field extraction from signal pages.
//!
//! Source pages carry values in two labeled-region conventions that have
//! both been observed across template revisions: a "list info" block
//! (`s-list-info__label` / `s-list-info__value`) and a "data columns"
//! block (`s-data-columns__label` / `s-data-columns__value`). The same
//! field name can appear in either region, so callers pick the region
//! per field. Lookups never fail: a missing label, a label without a
//! paired value container, or an empty value all come back as `None`.

use scraper::{ElementRef, Html, Selector};

pub struct SignalPage {
    doc: Html,
}

impl SignalPage {
    pub fn parse(html: &str) -> Self {
        Self {
            doc: Html::parse_document(html),
        }
    }

    /// Page title heading, used as the signal's display name.
    pub fn title(&self) -> Option<String> {
        let sel = Selector::parse("h1.title-min").ok()?;
        self.doc.select(&sel).next().map(|el| collect_text(&el))
    }

    /// Look up a label in the "list info" region.
    pub fn list_info(&self, label: &str) -> Option<String> {
        self.labeled_value("div.s-list-info__label", "div.s-list-info__value", label)
    }

    /// Look up a label in the "data columns" region.
    pub fn data_column(&self, label: &str) -> Option<String> {
        self.labeled_value(
            "div.s-data-columns__label",
            "div.s-data-columns__value",
            label,
        )
    }

    /// Find the first label element whose text contains `label`
    /// (case-insensitive, matched literally including punctuation), then
    /// return the text of the value container that shares its parent.
    fn labeled_value(&self, label_sel: &str, value_sel: &str, label: &str) -> Option<String> {
        let label_sel = Selector::parse(label_sel).ok()?;
        let value_sel = Selector::parse(value_sel).ok()?;
        let needle = label.trim().to_lowercase();

        let el = self
            .doc
            .select(&label_sel)
            .find(|el| collect_text(el).to_lowercase().contains(&needle))?;

        let parent = el.parent().and_then(ElementRef::wrap)?;
        let value = parent.select(&value_sel).next()?;
        text_or_none(collect_text(&value))
    }
}

fn collect_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn text_or_none(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <h1 class="title-min">Steady Pips</h1>
        <div class="s-list-info">
            <div class="s-list-info__item">
                <div class="s-list-info__label">Growth:</div>
                <div class="s-list-info__value">142.7%</div>
            </div>
            <div class="s-list-info__item">
                <div class="s-list-info__label">Weeks:</div>
                <div class="s-list-info__value">87</div>
            </div>
            <div class="s-list-info__item">
                <div class="s-list-info__label">Latest trade:</div>
                <div class="s-list-info__value">2 hours ago</div>
            </div>
            <div class="s-list-info__item">
                <div class="s-list-info__label">Started:</div>
            </div>
        </div>
        <div class="s-data-columns">
            <div class="s-data-columns__item">
                <div class="s-data-columns__label">By Balance:</div>
                <div class="s-data-columns__value">12.4%</div>
            </div>
            <div class="s-data-columns__item">
                <div class="s-data-columns__label">Monthly growth:</div>
                <div class="s-data-columns__value">(3.1%)</div>
            </div>
        </div>
        </body></html>
    "#;

    #[test]
    fn test_title() {
        let page = SignalPage::parse(PAGE);
        assert_eq!(page.title().as_deref(), Some("Steady Pips"));
    }

    #[test]
    fn test_list_info_lookup() {
        let page = SignalPage::parse(PAGE);
        assert_eq!(page.list_info("Growth:").as_deref(), Some("142.7%"));
        assert_eq!(page.list_info("Weeks:").as_deref(), Some("87"));
        assert_eq!(page.list_info("Latest trade:").as_deref(), Some("2 hours ago"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let page = SignalPage::parse(PAGE);
        assert_eq!(page.list_info("growth:").as_deref(), Some("142.7%"));
        assert_eq!(page.data_column("MONTHLY GROWTH:").as_deref(), Some("(3.1%)"));
    }

    #[test]
    fn test_regions_are_independent() {
        let page = SignalPage::parse(PAGE);
        // "Growth:" exists in list info but not in data columns.
        assert_eq!(page.data_column("Growth:"), None);
        assert_eq!(page.data_column("By Balance:").as_deref(), Some("12.4%"));
    }

    #[test]
    fn test_missing_label_and_missing_value_are_none() {
        let page = SignalPage::parse(PAGE);
        assert_eq!(page.list_info("Drawdown:"), None);
        // Label present, paired value container absent.
        assert_eq!(page.list_info("Started:"), None);
    }

    #[test]
    fn test_empty_document_degrades_to_none() {
        let page = SignalPage::parse("<html><body><p>maintenance</p></body></html>");
        assert_eq!(page.title(), None);
        assert_eq!(page.list_info("Growth:"), None);
        assert_eq!(page.data_column("Trades:"), None);
    }
}
