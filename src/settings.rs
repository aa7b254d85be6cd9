use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Datelike;
use serde::Deserialize;

const CONFIG_FILE: &str = "ipo_scraper";
const ENV_PREFIX: &str = "IPO";

/// One report category of the feed, e.g. "All IPOs" = 82.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub name: String,
    pub id: u32,
}

impl Category {
    pub fn new(name: &str, id: u32) -> Self {
        Category {
            name: name.to_string(),
            id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub base_url: String,
    pub version: String,
    pub year: i32,
    pub financial_year: String,
    /// Pinned month; the current local month when unset.
    pub month: Option<u32>,
    pub categories: Vec<Category>,
    /// Category names the extraction run collects links from.
    pub extract_categories: Vec<String>,
    /// Category names rendered as tabs by `/scrape`.
    pub summary_categories: Vec<String>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        FeedSettings {
            base_url: "https://webnodejs.chittorgarh.com/cloud/report/data-read".into(),
            version: "21-28".into(),
            year: 2025,
            financial_year: "2024-25".into(),
            month: None,
            categories: vec![
                Category::new("All IPOs", 82),
                Category::new("Mainline IPOs", 83),
                Category::new("SME IPOs", 84),
            ],
            extract_categories: vec!["All IPOs".into()],
            summary_categories: vec![
                "All IPOs".into(),
                "Mainline IPOs".into(),
                "SME IPOs".into(),
            ],
        }
    }
}

impl FeedSettings {
    pub fn month(&self) -> u32 {
        self.month
            .unwrap_or_else(|| chrono::Local::now().date_naive().month())
    }

    /// Resolve category names against the known categories, keeping order.
    /// Unknown names are dropped.
    pub fn resolve(&self, names: &[String]) -> Vec<Category> {
        names
            .iter()
            .filter_map(|name| self.categories.iter().find(|c| &c.name == name).cloned())
            .collect()
    }

    pub fn extract_set(&self) -> Vec<Category> {
        self.resolve(&self.extract_categories)
    }

    pub fn summary_set(&self) -> Vec<Category> {
        self.resolve(&self.summary_categories)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub chrome_path: Option<PathBuf>,
    pub user_agent: String,
    pub referer: String,
    pub accept_language: String,
    pub navigation_timeout_secs: u64,
    pub selector_timeout_secs: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        BrowserSettings {
            chrome_path: None,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .into(),
            referer: "https://www.google.com/".into(),
            accept_language: "en-US,en;q=0.9".into(),
            navigation_timeout_secs: 60,
            selector_timeout_secs: 30,
        }
    }
}

/// Phrase lists and selectors driving the detail page cleanup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionRules {
    pub root_selector: String,
    pub sentinel_heading: String,
    pub excluded_cards: Vec<String>,
    pub link_stripped_cards: Vec<String>,
    pub own_domain: String,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        ExtractionRules {
            root_selector: "#main".into(),
            sentinel_heading: "IPO Prospectus".into(),
            excluded_cards: vec![
                "Lead Manager(s)".into(),
                "Buy or Not".into(),
                "SME IPO Enquiry".into(),
            ],
            link_stripped_cards: vec!["Listing Details".into()],
            own_domain: "www.chittorgarh.com".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
}

impl StorageSettings {
    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
            && self.access_key_id.is_some()
            && self.secret_access_key.is_some()
            && self.bucket.is_some()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    /// Run one extraction in the background when the server starts.
    pub extract_on_start: bool,
    pub summary_link_base: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            port: 3000,
            extract_on_start: true,
            summary_link_base: "https://ipoindiaa.com".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub feed: FeedSettings,
    pub browser: BrowserSettings,
    pub rules: ExtractionRules,
    pub storage: StorageSettings,
    pub server: ServerSettings,
    pub manifest_path: PathBuf,
    pub output_dir: PathBuf,
    pub limit: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            feed: FeedSettings::default(),
            browser: BrowserSettings::default(),
            rules: ExtractionRules::default(),
            storage: StorageSettings::default(),
            server: ServerSettings::default(),
            manifest_path: PathBuf::from("links.txt"),
            output_dir: PathBuf::from("public"),
            limit: 100,
        }
    }
}

impl Settings {
    /// Defaults, then `ipo_scraper.toml` (or `file`), then `IPO__*` env vars,
    /// then the conventional `PORT` / `CLOUDFLARE_*` variables.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let source = match file {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(CONFIG_FILE).required(false),
        };
        let mut settings: Settings = config::Config::builder()
            .add_source(source)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("failed to read configuration")?
            .try_deserialize()
            .context("invalid configuration")?;

        settings.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(port) = var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port: {port}"))?;
        }
        let storage = &mut self.storage;
        for (key, slot) in [
            ("CLOUDFLARE_R2_ENDPOINT", &mut storage.endpoint),
            ("CLOUDFLARE_ACCESS_KEY_ID", &mut storage.access_key_id),
            ("CLOUDFLARE_SECRET_ACCESS_KEY", &mut storage.secret_access_key),
            ("CLOUDFLARE_R2_BUCKET", &mut storage.bucket),
        ] {
            if let Some(value) = var(key).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }
        Ok(())
    }
}
