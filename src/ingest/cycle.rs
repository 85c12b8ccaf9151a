use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use super::dedup::{candidate_links, select_new};
use super::normalize::{CandidateItem, EntryNormalizer};
use super::scheduler::SchedulerError;
use crate::feed::{FeedPoller, FetchError};
use crate::storage::{Database, DatabaseError, FeedSource};

/// Why one source's cycle ended without committing.
///
/// Either way nothing was written for the source; it is retried on the next
/// pass.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Persist failed: {0}")]
    Persist(#[from] DatabaseError),
}

/// Terminal state of a cycle that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every entry was already stored (or the feed was empty). No writes.
    NothingNew,
    /// New items and the moved checkpoint were committed together.
    Committed { inserted: usize },
}

/// How one source fared during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Committed { inserted: usize },
    NothingNew,
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source_id: i64,
    pub name: String,
    #[serde(flatten)]
    pub status: SourceStatus,
}

/// Aggregate result of one pass over every configured source.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: NaiveDateTime,
    pub sources: usize,
    pub committed: usize,
    pub nothing_new: usize,
    pub failed: usize,
    pub inserted: usize,
    pub outcomes: Vec<SourceReport>,
}

impl PassReport {
    fn new(started_at: NaiveDateTime) -> Self {
        Self {
            started_at,
            sources: 0,
            committed: 0,
            nothing_new: 0,
            failed: 0,
            inserted: 0,
            outcomes: Vec::new(),
        }
    }

    fn record(&mut self, source: &FeedSource, status: SourceStatus) {
        self.sources += 1;
        match &status {
            SourceStatus::Committed { inserted } => {
                self.committed += 1;
                self.inserted += inserted;
            }
            SourceStatus::NothingNew => self.nothing_new += 1,
            SourceStatus::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(SourceReport {
            source_id: source.id,
            name: source.name.clone(),
            status,
        });
    }
}

// ============================================================================
// Ingestor
// ============================================================================

/// Runs ingestion cycles and passes against one store.
///
/// Share it behind an `Arc`: the scheduler and the manual trigger both call
/// [`run_pass`](Self::run_pass), and at most one pass runs at a time.
pub struct Ingestor {
    db: Database,
    poller: FeedPoller,
    normalizer: EntryNormalizer,
    pass_lock: Mutex<()>,
}

impl Ingestor {
    pub fn new(db: Database, poller: FeedPoller, normalizer: EntryNormalizer) -> Self {
        Self {
            db,
            poller,
            normalizer,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Poll one source and persist whatever it has that the store lacks.
    ///
    /// The fetch happens before any transaction is opened. Normalized entries
    /// are checked against the store with one bulk lookup; if none are new the
    /// cycle ends without writing. Otherwise the new items and the source's
    /// checkpoint are committed in a single transaction.
    ///
    /// # Errors
    ///
    /// - [`CycleError::Fetch`] - the feed could not be retrieved or parsed
    /// - [`CycleError::Persist`] - the lookup or the commit failed; the commit
    ///   rolled back entirely
    pub async fn run_cycle(&self, source: &FeedSource) -> Result<CycleOutcome, CycleError> {
        let entries = self.poller.fetch(&source.url).await?;

        let candidates: Vec<CandidateItem> = entries
            .into_iter()
            .map(|entry| self.normalizer.normalize(entry, source))
            .collect();
        if candidates.is_empty() {
            tracing::debug!(source_id = source.id, "Feed has no entries");
            return Ok(CycleOutcome::NothingNew);
        }

        let existing = self.db.existing_links(&candidate_links(&candidates)).await?;
        let fresh = select_new(candidates, &existing);
        if fresh.is_empty() {
            tracing::debug!(source_id = source.id, "No new items");
            return Ok(CycleOutcome::NothingNew);
        }

        let inserted = self
            .db
            .commit_new_items(source.id, &fresh, Local::now().naive_local())
            .await?;

        tracing::info!(
            source_id = source.id,
            name = %source.name,
            inserted,
            "New items committed"
        );
        Ok(CycleOutcome::Committed { inserted })
    }

    /// Run one cycle for every configured source, one after another.
    ///
    /// A failing source is logged and reported; it never stops the sources
    /// after it.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::PassSkipped`] - another pass holds the guard; this
    ///   call did nothing
    /// - [`SchedulerError::Database`] - the source list could not be read
    pub async fn run_pass(&self) -> Result<PassReport, SchedulerError> {
        let _guard = self
            .pass_lock
            .try_lock()
            .map_err(|_| SchedulerError::PassSkipped)?;

        let mut report = PassReport::new(Local::now().naive_local());
        let sources = self.db.list_sources().await?;
        tracing::info!(sources = sources.len(), "Ingestion pass started");

        for source in &sources {
            let status = match self.run_cycle(source).await {
                Ok(CycleOutcome::Committed { inserted }) => SourceStatus::Committed { inserted },
                Ok(CycleOutcome::NothingNew) => SourceStatus::NothingNew,
                Err(e) => {
                    tracing::warn!(
                        source_id = source.id,
                        url = %source.url,
                        error = %e,
                        "Source cycle failed"
                    );
                    SourceStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            report.record(source, status);
        }

        tracing::info!(
            sources = report.sources,
            committed = report.committed,
            nothing_new = report.nothing_new,
            failed = report.failed,
            inserted = report.inserted,
            "Ingestion pass finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::FetchOptions;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TWO_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>One</title><link>https://news.example.com/1</link><description>First</description></item>
    <item><title>Two</title><link>https://news.example.com/2</link></item>
</channel></rss>"#;

    async fn test_ingestor() -> Ingestor {
        let db = Database::open(":memory:").await.unwrap();
        let poller = FeedPoller::new(&FetchOptions::default()).unwrap();
        Ingestor::new(db, poller, EntryNormalizer::default())
    }

    async fn serve(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_cycle_commits_then_finds_nothing_new() {
        let server = serve(TWO_ITEMS).await;
        let ingestor = test_ingestor().await;
        let source = ingestor
            .database()
            .add_source("News", &format!("{}/feed", server.uri()))
            .await
            .unwrap();

        let first = ingestor.run_cycle(&source).await.unwrap();
        assert_eq!(first, CycleOutcome::Committed { inserted: 2 });

        let second = ingestor.run_cycle(&source).await.unwrap();
        assert_eq!(second, CycleOutcome::NothingNew);

        let items = ingestor.database().items_for_source(source.id).await.unwrap();
        assert_eq!(items.len(), 2);
    }

    fn link_lookups(ingestor: &Ingestor) -> usize {
        ingestor
            .database()
            .link_lookups
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_cycle_makes_one_bulk_lookup() {
        let many: String = (1..=25)
            .map(|n| {
                format!("<item><title>{n}</title><link>https://bulk.example.com/{n}</link></item>")
            })
            .collect();
        let server = serve(&format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel>{many}</channel></rss>"#
        ))
        .await;
        let ingestor = test_ingestor().await;
        let source = ingestor
            .database()
            .add_source("Bulk", &format!("{}/feed", server.uri()))
            .await
            .unwrap();

        let first = ingestor.run_cycle(&source).await.unwrap();
        assert_eq!(first, CycleOutcome::Committed { inserted: 25 });
        assert_eq!(link_lookups(&ingestor), 1);

        let second = ingestor.run_cycle(&source).await.unwrap();
        assert_eq!(second, CycleOutcome::NothingNew);
        assert_eq!(link_lookups(&ingestor), 2);
    }

    #[tokio::test]
    async fn test_cycle_empty_feed_writes_nothing() {
        let server = serve(r#"<?xml version="1.0"?><rss version="2.0"><channel></channel></rss>"#).await;
        let ingestor = test_ingestor().await;
        let source = ingestor
            .database()
            .add_source("Empty", &format!("{}/feed", server.uri()))
            .await
            .unwrap();

        let outcome = ingestor.run_cycle(&source).await.unwrap();
        assert_eq!(outcome, CycleOutcome::NothingNew);
        assert_eq!(link_lookups(&ingestor), 0);

        let stored = ingestor.database().get_source(source.id).await.unwrap().unwrap();
        assert_eq!(stored.last_checked, source.last_checked);
    }

    #[tokio::test]
    async fn test_cycle_fetch_failure_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let ingestor = test_ingestor().await;
        let source = ingestor
            .database()
            .add_source("Broken", &format!("{}/feed", server.uri()))
            .await
            .unwrap();

        let result = ingestor.run_cycle(&source).await;
        assert!(matches!(
            result,
            Err(CycleError::Fetch(FetchError::HttpStatus(500)))
        ));
    }

    #[tokio::test]
    async fn test_pass_with_no_sources() {
        let ingestor = test_ingestor().await;
        let report = ingestor.run_pass().await.unwrap();
        assert_eq!(report.sources, 0);
        assert!(report.outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_pass_skipped_while_guard_held() {
        let ingestor = test_ingestor().await;
        let _held = ingestor.pass_lock.lock().await;

        let result = ingestor.run_pass().await;
        assert!(matches!(result, Err(SchedulerError::PassSkipped)));
    }

    #[test]
    fn test_source_report_serializes_flat() {
        let report = SourceReport {
            source_id: 3,
            name: "News".to_string(),
            status: SourceStatus::Committed { inserted: 4 },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "source_id": 3,
                "name": "News",
                "status": "committed",
                "inserted": 4
            })
        );
    }
}
