//! HTTP surface: health check, live summary, and the artifact folder.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::feed::FeedClient;
use crate::settings::Settings;
use crate::summary::{self, SummaryRenderer};

pub struct AppState {
    pub settings: Settings,
    pub feed: FeedClient,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let feed = FeedClient::new(settings.feed.clone());
        AppState { settings, feed }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let files = ServeDir::new(&state.settings.output_dir);
    Router::new()
        .route("/", get(health))
        .route("/scrape", get(scrape))
        .fallback_service(files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.settings.server.port));
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server running at http://localhost:{}", addr.port());
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "Server is running!"
}

async fn scrape(State(state): State<Arc<AppState>>) -> Html<String> {
    let renderer = SummaryRenderer::new(&state.settings.server.summary_link_base);
    let categories = state.feed.settings().summary_set();
    let today = chrono::Local::now().date_naive();

    render_guarded(async move { renderer.render(&state.feed, &categories, today).await }).await
}

/// Run a render on its own task. Feed failures are already folded into the
/// page, so a panic is the only error left; it becomes the error page.
async fn render_guarded<F>(render: F) -> Html<String>
where
    F: Future<Output = String> + Send + 'static,
{
    match tokio::spawn(render).await {
        Ok(page) => Html(page),
        Err(e) => {
            error!("Error scraping: {}", e);
            Html(summary::error_page(&e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::tests::test_settings;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn state(dir: &std::path::Path, feed_base: &str) -> Arc<AppState> {
        Arc::new(AppState::new(Settings {
            feed: test_settings(feed_base),
            output_dir: dir.to_path_buf(),
            ..Settings::default()
        }))
    }

    #[tokio::test]
    async fn health_check() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_body(router(state(dir.path(), "http://unused")), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Server is running!");
    }

    #[tokio::test]
    async fn serves_written_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AcmeCorp.html"), "<h2>Acme</h2>").unwrap();
        let app = router(state(dir.path(), "http://unused"));
        let (status, body) = get_body(app.clone(), "/AcmeCorp.html").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<h2>Acme</h2>");
        let (status, _) = get_body(app, "/Missing.html").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn exploding_render() -> String {
        panic!("feed exploded")
    }

    #[tokio::test]
    async fn render_panic_becomes_error_page() {
        let Html(body) = render_guarded(async { exploding_render() }).await;
        assert!(body.starts_with("<h2>Error occurred:</h2><p>"));
        assert!(body.contains("panicked"));
    }

    #[tokio::test]
    async fn scrape_renders_tabs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "reportTableData": [{"Issuer Company": "<a href=\"https://x/y\">Acme Corp</a>", "Exchange": "BSE"}]
            })))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = get_body(router(state(dir.path(), &server.uri())), "/scrape").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("<title>IPO Data</title>"));
        assert_eq!(body.matches("class=\"tabcontent\"").count(), 3);
        assert_eq!(body.matches(">Acme Corp</a>").count(), 3);
    }
}
