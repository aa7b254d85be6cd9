//! Detail page cleanup.
//!
//! Two independent passes run over the rendered page: the section pass walks
//! the content root in document order and stops at the sentinel heading, the
//! card pass filters every `.card` in the document regardless of where the
//! sentinel sits.

use dom_query::{Document, Selection};
use tracing::debug;
use url::Url;

use crate::html;
use crate::settings::ExtractionRules;

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4"];
const BODY_TAGS: &[&str] = &["p", "table", "ul", "ol"];
const NAV_DROPDOWN: &str = r#"ul.dropdown-menu[aria-labelledby="docsDropdown"]"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Heading tag the section started with, `h1`..`h4`.
    pub tag: String,
    pub title: String,
    pub content: Vec<String>,
}

impl Section {
    fn render(&self) -> String {
        let tag = if self.tag.is_empty() { "h2" } else { &self.tag };
        format!(
            "<{tag}>{}</{tag}>\n{}",
            html::escape(&self.title),
            self.content.join("\n")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPage {
    pub sections: Vec<Section>,
    pub cards: Vec<String>,
}

impl ExtractedPage {
    /// Serialized artifact, or `None` when the page yielded nothing.
    pub fn render(&self) -> Option<String> {
        let sections = self
            .sections
            .iter()
            .map(Section::render)
            .collect::<Vec<_>>()
            .join("\n\n");
        let cards = self.cards.join("\n\n");
        if sections.trim().is_empty() && cards.trim().is_empty() {
            return None;
        }
        Some(format!("{sections}\n\n{cards}"))
    }
}

pub fn extract_page(page_html: &str, page_url: &str, rules: &ExtractionRules) -> ExtractedPage {
    let doc = Document::from(page_html);
    let sections = extract_sections(&doc, rules);
    let cards = extract_cards(&doc, page_url, rules);
    debug!(
        sections = sections.len(),
        cards = cards.len(),
        "extracted {}",
        page_url
    );
    ExtractedPage { sections, cards }
}

pub fn extract_sections(doc: &Document, rules: &ExtractionRules) -> Vec<Section> {
    let selector = HEADINGS
        .iter()
        .chain(BODY_TAGS)
        .map(|tag| format!("{} {}", rules.root_selector, tag))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sections: Vec<Section> = Vec::new();
    for el in doc.select(&selector).iter() {
        let tag = tag_name(&el);

        if HEADINGS.contains(&tag.as_str()) {
            let title = html::normalize_ws(&el.text());
            if title.contains(rules.sentinel_heading.as_str()) {
                break;
            }
            sections.push(Section {
                tag,
                title,
                content: Vec::new(),
            });
            continue;
        }

        // content before the first heading has no section to land in
        let Some(current) = sections.last_mut() else {
            continue;
        };
        if el.is(NAV_DROPDOWN) {
            continue;
        }
        current.content.push(clean_fragment(&el, &tag));
    }
    sections
}

/// Copy `el` out of the page with its links flattened to text.
fn clean_fragment(el: &Selection, tag: &str) -> String {
    let copy = Document::from(el.html().to_string());
    let root = copy.select("body").children().first();
    replace_links_with_text(&root.select("a"));
    if tag == "p" {
        format!("<p>{}</p>", root.inner_html().trim())
    } else {
        root.html().to_string()
    }
}

pub fn extract_cards(doc: &Document, page_url: &str, rules: &ExtractionRules) -> Vec<String> {
    let base = Url::parse(page_url).ok();
    let mut cards = Vec::new();

    for card in doc.select(".card").iter() {
        let title = html::normalize_ws(&card.select(".card-header h2").first().text());

        if contains_any(&title, &rules.excluded_cards) {
            debug!("dropping card {:?}", title);
            continue;
        }
        if contains_any(&title, &rules.link_stripped_cards) {
            card.select("a").remove();
        }

        for link in card.select("a").iter() {
            let Some(href) = link.attr("href") else {
                continue;
            };
            if resolve_href(base.as_ref(), &href).contains(rules.own_domain.as_str()) {
                replace_links_with_text(&link);
            }
        }

        cards.push(card.html().to_string());
    }
    cards
}

fn replace_links_with_text(links: &Selection) {
    for link in links.iter() {
        let text = link.text();
        if text.is_empty() {
            link.remove();
        } else {
            link.replace_with_html(html::escape(&text));
        }
    }
}

fn resolve_href(base: Option<&Url>, href: &str) -> String {
    base.and_then(|b| b.join(href).ok())
        .map(|u| u.to_string())
        .unwrap_or_else(|| href.to_string())
}

fn contains_any(title: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| title.contains(p.as_str()))
}

fn tag_name(sel: &Selection) -> String {
    sel.nodes()
        .first()
        .and_then(|n| n.node_name())
        .map(|t| t.to_ascii_lowercase())
        .unwrap_or_default()
}

// ── Tests ──
