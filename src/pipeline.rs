use std::collections::HashSet;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::browser::PageSource;
use crate::extract;
use crate::feed::FeedClient;
use crate::links::{self, LinkEntry};
use crate::settings::Settings;
use crate::store::{self, ArtifactDir, ObjectStore};

/// Counts reported after an extraction run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub written: usize,
    pub empty: usize,
    pub failed: usize,
    pub uploaded: usize,
    pub upload_errors: usize,
}

enum PageOutcome {
    Written { uploaded: Option<bool> },
    Empty,
}

pub struct Pipeline<'a> {
    settings: &'a Settings,
    pages: &'a dyn PageSource,
    store: Option<&'a dyn ObjectStore>,
    artifacts: ArtifactDir,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        settings: &'a Settings,
        pages: &'a dyn PageSource,
        store: Option<&'a dyn ObjectStore>,
    ) -> Self {
        Pipeline {
            settings,
            pages,
            store,
            artifacts: ArtifactDir::new(&settings.output_dir),
        }
    }

    /// Collect links from the feed, write the manifest, then extract.
    pub async fn run(&self, feed: &FeedClient) -> Result<RunStats> {
        let entries = links::collect_links(feed, &self.settings.feed.extract_set()).await;
        if entries.is_empty() {
            info!("No links found. Exiting...");
            return Ok(RunStats::default());
        }
        links::write_manifest(&self.settings.manifest_path, &entries)?;
        info!(
            "Hyperlinks extracted and saved to {}",
            self.settings.manifest_path.display()
        );
        self.extract_all(&entries).await
    }

    /// Process the first `limit` entries one after another.
    pub async fn extract_all(&self, entries: &[LinkEntry]) -> Result<RunStats> {
        let batch = &entries[..entries.len().min(self.settings.limit)];
        if self.store.is_none() {
            warn!("Object storage is not configured; artifacts stay local only");
        }

        let pb = ProgressBar::new(batch.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                .progress_chars("=> "),
        );

        let mut stats = RunStats {
            total: batch.len(),
            ..RunStats::default()
        };
        let mut seen = HashSet::new();

        for entry in batch {
            if !seen.insert(entry.name.as_str()) {
                warn!(
                    "Duplicate company name {}; {} replaces the earlier artifact",
                    entry.name, entry.url
                );
            }
            pb.set_message(entry.name.clone());

            match self.process(entry).await {
                Ok(PageOutcome::Written { uploaded }) => {
                    stats.written += 1;
                    match uploaded {
                        Some(true) => stats.uploaded += 1,
                        Some(false) => stats.upload_errors += 1,
                        None => {}
                    }
                }
                Ok(PageOutcome::Empty) => stats.empty += 1,
                Err(e) => {
                    error!("Error processing {}: {:#}", entry.url, e);
                    stats.failed += 1;
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            "Extraction completed: {} pages ({} written, {} empty, {} failed, {} uploaded)",
            stats.total, stats.written, stats.empty, stats.failed, stats.uploaded
        );
        Ok(stats)
    }

    async fn process(&self, entry: &LinkEntry) -> Result<PageOutcome> {
        info!("Fetching: {}", entry.url);
        let rules = &self.settings.rules;
        let page_html = self.pages.load(&entry.url, &rules.root_selector).await?;

        let Some(contents) = extract::extract_page(&page_html, &entry.url, rules).render() else {
            info!("No relevant content found for {}", entry.name);
            return Ok(PageOutcome::Empty);
        };

        let path = self.artifacts.write(&entry.name, &contents).await?;
        info!("Extracted content saved to {}", path.display());

        let Some(store) = self.store else {
            return Ok(PageOutcome::Written { uploaded: None });
        };
        let key = ArtifactDir::key(&entry.name);
        let uploaded = match store::upload_file(store, &path, &key).await {
            Ok(()) => {
                info!("File uploaded: {}", key);
                true
            }
            Err(e) => {
                error!("Error uploading {}: {}", key, e);
                false
            }
        };
        Ok(PageOutcome::Written {
            uploaded: Some(uploaded),
        })
    }
}

// ── Tests ──
