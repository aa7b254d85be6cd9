//! Tabbed HTML overview of the live feed, one tab per report category.

use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::{info, warn};

use crate::feed::{self, FeedClient, RowRecord};
use crate::html;
use crate::settings::Category;

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%a, %b %d, %Y",
    "%b %d, %Y",
    "%d %b %Y",
    "%d-%m-%Y",
];

const COLUMNS: &[&str] = &[
    feed::ISSUER_COMPANY,
    feed::OPEN_DATE,
    feed::CLOSE_DATE,
    feed::LISTING_DATE,
    feed::ISSUE_PRICE,
    feed::ISSUE_SIZE,
    feed::LOT_SIZE,
    feed::EXCHANGE,
];

/// Where an issue stands relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    Open,
    CloseDay,
    PendingListing,
    ListingDay,
}

impl RowState {
    pub fn color(self) -> &'static str {
        match self {
            RowState::Open => "#c5ecc8",
            RowState::CloseDay => "#E57373",
            RowState::PendingListing => "#ffffcc",
            RowState::ListingDay => "#c1f9ff",
        }
    }

    pub fn classify(
        today: NaiveDate,
        open: Option<NaiveDate>,
        close: Option<NaiveDate>,
        listing: Option<NaiveDate>,
    ) -> Option<RowState> {
        let after = |d: Option<NaiveDate>| d.is_some_and(|d| today > d);
        let before = |d: Option<NaiveDate>| d.is_some_and(|d| today < d);
        let on = |d: Option<NaiveDate>| d == Some(today);

        if (on(open) || after(open)) && before(close) {
            Some(RowState::Open)
        } else if on(close) {
            Some(RowState::CloseDay)
        } else if after(close) && before(listing) {
            Some(RowState::PendingListing)
        } else if on(listing) {
            Some(RowState::ListingDay)
        } else {
            None
        }
    }

    pub fn of_row(row: &RowRecord, today: NaiveDate) -> Option<RowState> {
        let date = |col| row.cell(col).as_deref().and_then(parse_date);
        RowState::classify(
            today,
            date(feed::OPEN_DATE),
            date(feed::CLOSE_DATE),
            date(feed::LISTING_DATE),
        )
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

/// Path segment for the public company page: anchors unwrapped, spaces as dashes.
pub fn company_slug(company: &str) -> String {
    WS_RE
        .replace_all(&html::unwrap_anchors(company), "-")
        .to_lowercase()
}

pub struct SummaryRenderer {
    link_base: String,
}

impl SummaryRenderer {
    pub fn new(link_base: &str) -> Self {
        SummaryRenderer {
            link_base: link_base.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch each category and render the page. A category whose fetch fails
    /// gets no tab; indices still advance so tab ids stay stable.
    pub async fn render(
        &self,
        feed: &FeedClient,
        categories: &[Category],
        today: NaiveDate,
    ) -> String {
        info!("Fetching data...");
        let mut tabs = Vec::new();
        for (index, category) in categories.iter().enumerate() {
            match feed.fetch_rows(category).await {
                Ok(rows) => tabs.push((index, category.name.clone(), rows)),
                Err(e) => warn!("Error fetching data from {}: {}", category.name, e),
            }
        }
        let page = self.page(&tabs, today);
        info!("Scraping and table generation successful!");
        page
    }

    pub fn page(&self, tabs: &[(usize, String, Vec<RowRecord>)], today: NaiveDate) -> String {
        let mut buttons = String::new();
        let mut tables = String::new();
        for (index, name, rows) in tabs {
            let first = *index == 0;
            let _ = write!(
                buttons,
                r##"
            <li class="tab" role="presentation">
                <a href="#tab{index}" role="tab" onclick="openTab(event, 'tab{index}')" class="tab-link {active}">
                    <span>{name}</span>
                </a>
            </li>"##,
                active = if first { "active" } else { "" },
                name = html::escape(name),
            );
            let _ = write!(
                tables,
                r#"
        <div id="tab{index}" class="tabcontent" style="display: {display};">
            <table>
                <thead>
                    <tr>{head}</tr>
                </thead>
                <tbody>{body}
                </tbody>
            </table>
        </div>"#,
                display = if first { "block" } else { "none" },
                head = COLUMNS
                    .iter()
                    .map(|c| format!("<th>{}</th>", html::escape(c)))
                    .collect::<String>(),
                body = rows.iter().map(|r| self.row(r, today)).collect::<String>(),
            );
        }

        format!(
            r#"<html>
<head>
    <title>IPO Data</title>
    <style>{STYLE}</style>
</head>
<body>
    <div class="tabbed-head">
        <ul class="nav nav-tabs af-tabs tab-warpper" role="tablist">{buttons}
        </ul>
    </div>{tables}
    <script>{SCRIPT}</script>
</body>
</html>"#
        )
    }

    fn row(&self, row: &RowRecord, today: NaiveDate) -> String {
        let color = RowState::of_row(row, today).map_or("", RowState::color);
        let company = row.cell(feed::ISSUER_COMPANY).unwrap_or_default();
        let cell = |col| html::escape(&row.cell(col).unwrap_or_default());
        let or_na = |col| {
            row.cell(col)
                .filter(|v| !v.is_empty())
                .map_or_else(|| "N/A".to_string(), |v| html::escape(&v))
        };
        format!(
            r#"
                    <tr style="background-color: {color}">
                        <td><a href="{base}/{slug}/" target="_blank" style="text-decoration: none; color: unset;">{name}</a></td>
                        <td>{open}</td>
                        <td>{close}</td>
                        <td>{listing}</td>
                        <td>{price}</td>
                        <td>{size}</td>
                        <td>{lot}</td>
                        <td>{exchange}</td>
                    </tr>"#,
            base = self.link_base,
            slug = html::escape(&company_slug(&company)),
            name = html::escape(&html::unwrap_anchors(&company)),
            open = cell(feed::OPEN_DATE),
            close = cell(feed::CLOSE_DATE),
            listing = cell(feed::LISTING_DATE),
            price = or_na(feed::ISSUE_PRICE),
            size = or_na(feed::ISSUE_SIZE),
            lot = or_na(feed::LOT_SIZE),
            exchange = cell(feed::EXCHANGE),
        )
    }
}

/// Body for errors escaping the summary path.
pub fn error_page(message: &str) -> String {
    format!("<h2>Error occurred:</h2><p>{}</p>", html::escape(message))
}

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; }
        .tabbed-head ul { list-style: none; padding: 0; display: flex; border-bottom: 2px solid #ddd; }
        .tabbed-head li { margin-right: 10px; }
        .tab-link { padding: 10px 15px; display: inline-block; text-decoration: none; color: black; font-weight: normal; position: relative; }
        .tab-link.active { font-weight: bold; }
        .tab-link.active::after { content: ""; display: block; width: 100%; height: 3px; background: #002868; position: absolute; bottom: -2px; left: 0; }
        .tabcontent { display: none; margin-top: 20px; }
        table { width: 100%; border-collapse: collapse; margin-top: 10px; }
        th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
        th { background-color: #002868; color: white; }
    "#;

const SCRIPT: &str = r#"
        function openTab(event, tabId) {
            event.preventDefault();
            document.querySelectorAll(".tabcontent").forEach(tab => tab.style.display = "none");
            document.getElementById(tabId).style.display = "block";
            document.querySelectorAll(".tab-link").forEach(tab => tab.classList.remove("active"));
            event.currentTarget.classList.add("active");
        }
    "#;

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::test_settings;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn day(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    fn state_on(today: &str) -> Option<RowState> {
        let row = RowRecord::from([
            (feed::OPEN_DATE, "2025-01-01"),
            (feed::CLOSE_DATE, "2025-01-10"),
            (feed::LISTING_DATE, "2025-01-20"),
        ]);
        RowState::of_row(&row, day(today))
    }

    #[test]
    fn coloring_follows_issue_timeline() {
        assert_eq!(state_on("2025-01-05"), Some(RowState::Open));
        assert_eq!(state_on("2025-01-01"), Some(RowState::Open));
        assert_eq!(state_on("2025-01-10"), Some(RowState::CloseDay));
        assert_eq!(state_on("2025-01-15"), Some(RowState::PendingListing));
        assert_eq!(state_on("2025-01-20"), Some(RowState::ListingDay));
        assert_eq!(state_on("2025-01-25"), None);
        assert_eq!(state_on("2024-12-31"), None);
        assert_eq!(RowState::Open.color(), "#c5ecc8");
        assert_eq!(RowState::CloseDay.color(), "#E57373");
        assert_eq!(RowState::PendingListing.color(), "#ffffcc");
        assert_eq!(RowState::ListingDay.color(), "#c1f9ff");
    }

    #[test]
    fn missing_dates_never_match() {
        let row = RowRecord::from([(feed::OPEN_DATE, "2025-01-01"), (feed::CLOSE_DATE, "TBA")]);
        assert_eq!(RowState::of_row(&row, day("2025-01-05")), None);
    }

    #[test]
    fn feed_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 22);
        assert_eq!(parse_date("Wed, Jan 22, 2025"), expected);
        assert_eq!(parse_date("Jan 22, 2025"), expected);
        assert_eq!(parse_date(" 2025-01-22 "), expected);
        assert_eq!(parse_date("22 Jan 2025"), expected);
        assert_eq!(parse_date("soon"), None);
    }

    #[test]
    fn slug_for_public_page() {
        assert_eq!(
            company_slug(r#"<a href="https://x/y">Acme Corp Ltd</a>"#),
            "acme-corp-ltd"
        );
    }

    #[test]
    fn row_markup() {
        let renderer = SummaryRenderer::new("https://ipo.example/");
        let row = RowRecord::from([
            (feed::ISSUER_COMPANY, r#"<a href="https://x/y">Acme Corp</a>"#),
            (feed::OPEN_DATE, "2025-01-01"),
            (feed::CLOSE_DATE, "2025-01-10"),
            (feed::LISTING_DATE, "2025-01-20"),
            (feed::LOT_SIZE, ""),
            (feed::EXCHANGE, "NSE SME"),
        ]);
        let html = renderer.row(&row, day("2025-01-05"));
        assert!(html.contains(r#"<tr style="background-color: #c5ecc8">"#));
        assert!(html.contains(r#"href="https://ipo.example/acme-corp/""#));
        assert!(html.contains(">Acme Corp</a>"));
        assert_eq!(html.matches("<td>N/A</td>").count(), 3);
        assert!(html.contains("<td>NSE SME</td>"));
    }

    #[tokio::test]
    async fn failed_category_has_no_tab() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/83/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "reportTableData": [{"Issuer Company": "Acme Corp", "Close Date": "2025-01-10"}]
            })))
            .mount(&server)
            .await;

        let feed = FeedClient::new(test_settings(&server.uri()));
        let categories = feed.settings().summary_set();
        let page = SummaryRenderer::new("https://ipo.example")
            .render(&feed, &categories, day("2025-01-10"))
            .await;

        assert!(page.contains(r#"id="tab0" class="tabcontent" style="display: block;""#));
        assert!(!page.contains("id=\"tab1\""));
        assert!(page.contains(r#"id="tab2" class="tabcontent" style="display: none;""#));
        assert!(page.contains("<span>All IPOs</span>"));
        assert!(!page.contains("Mainline IPOs"));
        assert!(page.contains("<span>SME IPOs</span>"));
        assert_eq!(page.matches("#E57373").count(), 2);
    }

    #[test]
    fn error_page_escapes_message() {
        assert_eq!(error_page("bad <json>"), "<h2>Error occurred:</h2><p>bad &lt;json&gt;</p>");
    }
}
