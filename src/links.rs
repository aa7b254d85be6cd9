use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::feed::{FeedClient, RowRecord, ISSUER_COMPANY};
use crate::html;
use crate::settings::Category;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"href="([^"]+)""#).unwrap());
static ILLEGAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[/:*?"<>|]"#).unwrap());
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const SEPARATOR: &str = "||";

/// A company detail page, keyed by its filesystem-safe name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub name: String,
    pub url: String,
}

/// Turn an "Issuer Company" cell into a file name: no tags, no characters
/// illegal in file names, no whitespace.
pub fn sanitize_name(raw: &str) -> String {
    let text = html::strip_tags(raw);
    let text = ILLEGAL_RE.replace_all(text.trim(), "");
    WS_RE.replace_all(&text, "").into_owned()
}

pub fn extract_link(row: &RowRecord) -> Option<LinkEntry> {
    let company = row.cell(ISSUER_COMPANY)?;
    if !company.contains("href=") {
        return None;
    }
    let url = HREF_RE.captures(&company)?.get(1)?.as_str().to_string();
    Some(LinkEntry {
        name: sanitize_name(&company),
        url,
    })
}

pub fn links_from_rows(rows: &[RowRecord]) -> Vec<LinkEntry> {
    rows.iter().filter_map(extract_link).collect()
}

/// Fetch each category and collect its links. Failed categories are skipped.
pub async fn collect_links(feed: &FeedClient, categories: &[Category]) -> Vec<LinkEntry> {
    let mut links = Vec::new();
    for (category, rows) in feed.fetch_all(categories).await {
        let found = links_from_rows(&rows);
        info!(
            "{}: {} rows, {} detail links",
            category.name,
            rows.len(),
            found.len()
        );
        links.extend(found);
    }
    links
}

pub fn format_manifest(entries: &[LinkEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}{}{}", e.name, SEPARATOR, e.url))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Overwrite the manifest with `entries`.
pub fn write_manifest(path: &Path, entries: &[LinkEntry]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    std::fs::write(path, format_manifest(entries)).map_err(|e| StoreError::io(path, e))
}

pub fn parse_manifest(text: &str) -> Vec<LinkEntry> {
    text.lines()
        .filter_map(|line| {
            let (name, url) = line.trim().split_once(SEPARATOR)?;
            if name.is_empty() || url.is_empty() {
                warn!("Skipping malformed manifest line: {}", line);
                return None;
            }
            Some(LinkEntry {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

pub fn read_manifest(path: &Path) -> Result<Vec<LinkEntry>, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    Ok(parse_manifest(&text))
}

// ── Tests ──
