//! Headless Chromium page loading.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tracing::{debug, warn};

use crate::error::BrowserError;
use crate::settings::BrowserSettings;

const SELECTOR_POLL: Duration = Duration::from_millis(250);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that turns a detail page URL into rendered HTML.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Load `url` and return the document once `root_selector` is present.
    async fn load(&self, url: &str, root_selector: &str) -> Result<String, BrowserError>;
}

/// Launches a fresh headless browser per page and always closes it.
pub struct ChromiumSource {
    settings: BrowserSettings,
}

impl ChromiumSource {
    pub fn new(settings: BrowserSettings) -> Self {
        ChromiumSource { settings }
    }

    fn config(&self) -> Result<BrowserConfig, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--ignore-certificate-errors")
            .arg("--disable-web-security")
            .arg("--disable-dev-shm-usage");
        if let Some(path) = &self.settings.chrome_path {
            builder = builder.chrome_executable(path);
        }
        builder.build().map_err(BrowserError::Launch)
    }

    async fn render(
        &self,
        page: &Page,
        url: &str,
        root_selector: &str,
    ) -> Result<String, BrowserError> {
        let s = &self.settings;
        page.set_user_agent(SetUserAgentOverrideParams::new(s.user_agent.clone()))
            .await
            .map_err(|e| BrowserError::Setup(e.to_string()))?;
        let headers = Headers::new(serde_json::json!({
            "Referer": s.referer,
            "Accept-Language": s.accept_language,
        }));
        page.execute(SetExtraHttpHeadersParams::new(headers))
            .await
            .map_err(|e| BrowserError::Setup(e.to_string()))?;

        let nav_secs = s.navigation_timeout_secs;
        tokio::time::timeout(Duration::from_secs(nav_secs), async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await
        .map_err(|_| BrowserError::Timeout {
            step: "navigation",
            secs: nav_secs,
        })?
        .map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let limit = Duration::from_secs(s.selector_timeout_secs);
        poll_until(limit, "waiting for root element", move || async move {
            page.find_element(root_selector).await.is_ok()
        })
        .await?;

        page.content()
            .await
            .map_err(|e| BrowserError::Content(e.to_string()))
    }
}

/// Re-run `check` every poll interval until it returns true. The whole wait,
/// including a check that never resolves, is bounded by `limit`.
async fn poll_until<F, Fut>(
    limit: Duration,
    step: &'static str,
    mut check: F,
) -> Result<(), BrowserError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(limit, async {
        while !check().await {
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    })
    .await
    .map_err(|_| BrowserError::Timeout {
        step,
        secs: limit.as_secs(),
    })
}

#[async_trait]
impl PageSource for ChromiumSource {
    async fn load(&self, url: &str, root_selector: &str) -> Result<String, BrowserError> {
        let (mut browser, mut handler) = Browser::launch(self.config()?)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        let result = match browser.new_page("about:blank").await {
            Ok(page) => self.render(&page, url, root_selector).await,
            Err(e) => Err(BrowserError::Launch(e.to_string())),
        };

        // released on every path before the next page starts
        let closed = tokio::time::timeout(CLOSE_TIMEOUT, async {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }
            let _ = browser.wait().await;
        })
        .await;
        if closed.is_err() {
            warn!(
                "Browser did not exit within {}s; killing it",
                CLOSE_TIMEOUT.as_secs()
            );
            let _ = browser.kill().await;
        }
        events.abort();
        debug!("browser closed for {}", url);

        result
    }
}
