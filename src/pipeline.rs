// Scrape pipeline: fetch -> parse -> extract -> store, one detached insert per headline
use crate::fetcher::Fetcher;
use crate::model::{Article, ArticleCandidate, StorageError};
use crate::parser::{HeadlinePattern, ParsedTree};
use crate::storage::ArticleSink;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Fetching,
    Parsing,
    Extracting,
    Storing,
    Done,
    Aborted,
}

#[derive(Debug, Default)]
pub struct PipelineMetrics {
    runs_started: AtomicU64,
    runs_aborted: AtomicU64,
    records_extracted: AtomicU64,
    records_stored: AtomicU64,
    store_failures: AtomicU64,
    task_panics: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub runs_started: u64,
    pub runs_aborted: u64,
    pub records_extracted: u64,
    pub records_stored: u64,
    pub store_failures: u64,
    pub task_panics: u64,
}

impl PipelineMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_aborted: self.runs_aborted.load(Ordering::Relaxed),
            records_extracted: self.records_extracted.load(Ordering::Relaxed),
            records_stored: self.records_stored.load(Ordering::Relaxed),
            store_failures: self.store_failures.load(Ordering::Relaxed),
            task_panics: self.task_panics.load(Ordering::Relaxed),
        }
    }
}

/// Outcome of one run. `inserts` may still be in flight when this is returned.
pub struct ScrapeRun {
    pub stage: PipelineStage,
    pub extracted: usize,
    pub inserts: StoreTasks,
}

#[derive(Default)]
pub struct StoreTasks {
    handles: Vec<JoinHandle<Option<Result<Article, StorageError>>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSummary {
    pub stored: usize,
    pub failed: usize,
}

impl StoreTasks {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every insert. The request path never calls this.
    pub async fn join(self) -> StoreSummary {
        let mut summary = StoreSummary { stored: 0, failed: 0 };
        for result in join_all(self.handles).await {
            match result {
                Ok(Some(Ok(_))) => summary.stored += 1,
                _ => summary.failed += 1,
            }
        }
        summary
    }
}

pub struct ScrapePipeline {
    source_url: String,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn ArticleSink>,
    pattern: HeadlinePattern,
    metrics: Arc<PipelineMetrics>,
}

impl ScrapePipeline {
    pub fn new(
        source_url: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        sink: Arc<dyn ArticleSink>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            source_url: source_url.into(),
            fetcher,
            sink,
            pattern: HeadlinePattern::default(),
            metrics,
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Runs one scrape. Reaches `Done` as soon as every insert has been
    /// spawned, whatever their outcome; a failed fetch ends in `Aborted`.
    pub async fn run(&self) -> ScrapeRun {
        self.metrics.runs_started.fetch_add(1, Ordering::Relaxed);
        let mut stage = PipelineStage::Idle;

        stage = self.advance(stage, PipelineStage::Fetching);
        let doc = match self.fetcher.fetch(&self.source_url).await {
            Ok(doc) => doc,
            Err(e) => {
                self.metrics.runs_aborted.fetch_add(1, Ordering::Relaxed);
                warn!(url = %self.source_url, error = %e, "fetch failed, scrape aborted");
                return ScrapeRun {
                    stage: self.advance(stage, PipelineStage::Aborted),
                    extracted: 0,
                    inserts: StoreTasks::default(),
                };
            }
        };

        stage = self.advance(stage, PipelineStage::Parsing);
        let candidates = {
            let tree = ParsedTree::parse(&doc);
            stage = self.advance(stage, PipelineStage::Extracting);
            self.pattern.extract(&tree)
        };

        let extracted = candidates.len();
        self.metrics
            .records_extracted
            .fetch_add(extracted as u64, Ordering::Relaxed);
        if extracted == 0 {
            info!(url = %doc.url, "no headlines matched");
        } else {
            info!(url = %doc.url, count = extracted, "headlines extracted");
        }

        stage = self.advance(stage, PipelineStage::Storing);
        let handles = candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| self.spawn_insert(index, candidate))
            .collect();

        ScrapeRun {
            stage: self.advance(stage, PipelineStage::Done),
            extracted,
            inserts: StoreTasks { handles },
        }
    }

    /// Starts a run in the background and returns without waiting for it.
    pub fn trigger(self: &Arc<Self>) -> JoinHandle<Option<()>> {
        let pipeline = Arc::clone(self);
        spawn_watched("scrape", Arc::clone(&self.metrics), async move {
            let run = pipeline.run().await;
            info!(stage = ?run.stage, extracted = run.extracted, inserts = run.inserts.len(), "scrape run finished");
        })
    }

    fn spawn_insert(
        &self,
        index: usize,
        candidate: ArticleCandidate,
    ) -> JoinHandle<Option<Result<Article, StorageError>>> {
        let sink = Arc::clone(&self.sink);
        let metrics = Arc::clone(&self.metrics);
        spawn_watched("insert", Arc::clone(&self.metrics), async move {
            let title = candidate.title.clone();
            let result = sink.insert(candidate).await;
            match &result {
                Ok(article) => {
                    metrics.records_stored.fetch_add(1, Ordering::Relaxed);
                    debug!(id = article.id, title = %article.title, "article stored");
                }
                Err(e) => {
                    metrics.store_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(index, title = %title, error = %e, "article insert failed");
                }
            }
            result
        })
    }

    fn advance(&self, from: PipelineStage, to: PipelineStage) -> PipelineStage {
        debug!(url = %self.source_url, from = ?from, to = ?to, "pipeline stage");
        to
    }
}

/// Spawns `fut` behind a watcher task. A panic inside is logged and counted
/// in `task_panics`, and the watcher resolves to `None`.
pub fn spawn_watched<T, F>(name: &'static str, metrics: Arc<PipelineMetrics>, fut: F) -> JoinHandle<Option<T>>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let task = tokio::spawn(fut);
    tokio::spawn(async move {
        match task.await {
            Ok(value) => Some(value),
            Err(e) => {
                metrics.task_panics.fetch_add(1, Ordering::Relaxed);
                error!(task = name, error = %e, "detached task failed");
                None
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FetchError, RawDocument};
    use crate::storage::SqliteStorage;
    use std::sync::Mutex as StdMutex;

    const THREE: &str = r#"
        <article><h2><a href="/1">One</a></h2></article>
        <article><h2><a href="/2">Two</a></h2></article>
        <article><h2><a href="/3">Three</a></h2></article>"#;

    struct StaticFetcher(Option<&'static str>);

    #[async_trait::async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<RawDocument, FetchError> {
            match self.0 {
                Some(body) => Ok(RawDocument { url: url.to_string(), body: body.to_string() }),
                None => Err(FetchError::InvalidResponse { url: url.to_string(), status: 500 }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        attempts: StdMutex<Vec<String>>,
        fail_title: Option<&'static str>,
    }

    #[async_trait::async_trait]
    impl ArticleSink for RecordingSink {
        async fn insert(&self, candidate: ArticleCandidate) -> Result<Article, StorageError> {
            self.attempts.lock().unwrap().push(candidate.title.clone());
            if self.fail_title == Some(candidate.title.as_str()) {
                return Err(StorageError::DatabaseError(rusqlite::Error::InvalidQuery));
            }
            Ok(Article {
                id: 1,
                title: candidate.title,
                link: candidate.link.unwrap_or_default(),
                saved: false,
                notes: vec![],
                date_pulled: chrono::Utc::now(),
            })
        }
    }

    fn pipeline(body: Option<&'static str>, sink: Arc<dyn ArticleSink>) -> ScrapePipeline {
        ScrapePipeline::new(
            "https://news.test/",
            Arc::new(StaticFetcher(body)),
            sink,
            Arc::new(PipelineMetrics::default()),
        )
    }

    #[tokio::test]
    async fn failed_fetch_never_touches_the_store() {
        let sink = Arc::new(RecordingSink::default());
        let p = pipeline(None, sink.clone());

        let run = p.run().await;
        assert_eq!(run.stage, PipelineStage::Aborted);
        assert!(run.inserts.is_empty());
        assert!(sink.attempts.lock().unwrap().is_empty());

        let m = p.metrics().snapshot();
        assert_eq!(m.runs_started, 1);
        assert_eq!(m.runs_aborted, 1);
    }

    #[tokio::test]
    async fn no_matches_still_finishes() {
        let sink = Arc::new(RecordingSink::default());
        let p = pipeline(Some("<div><h2>nothing here</h2></div>"), sink.clone());

        let run = p.run().await;
        assert_eq!(run.stage, PipelineStage::Done);
        assert_eq!(run.extracted, 0);
        assert_eq!(run.inserts.join().await, StoreSummary { stored: 0, failed: 0 });
        assert!(sink.attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn one_failed_insert_does_not_stop_the_rest() {
        let sink = Arc::new(RecordingSink {
            fail_title: Some("Two"),
            ..Default::default()
        });
        let p = pipeline(Some(THREE), sink.clone());

        let run = p.run().await;
        assert_eq!(run.stage, PipelineStage::Done);
        assert_eq!(run.extracted, 3);
        assert_eq!(run.inserts.join().await, StoreSummary { stored: 2, failed: 1 });

        let mut attempts = sink.attempts.lock().unwrap().clone();
        attempts.sort();
        assert_eq!(attempts, vec!["One", "Three", "Two"]);

        let m = p.metrics().snapshot();
        assert_eq!(m.records_extracted, 3);
        assert_eq!(m.records_stored, 2);
        assert_eq!(m.store_failures, 1);
    }

    #[tokio::test]
    async fn stores_into_sqlite() {
        let storage = Arc::new(tokio::sync::Mutex::new(SqliteStorage::open_in_memory().unwrap()));
        let p = pipeline(Some(THREE), storage.clone());

        let run = p.run().await;
        assert_eq!(run.inserts.join().await.stored, 3);

        let mut titles: Vec<String> = storage
            .lock()
            .await
            .find_all(30)
            .unwrap()
            .into_iter()
            .map(|a| a.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["One", "Three", "Two"]);
    }

    #[tokio::test]
    async fn trigger_runs_in_the_background() {
        let sink = Arc::new(RecordingSink::default());
        let p = Arc::new(pipeline(Some(THREE), sink.clone()));

        assert_eq!(p.trigger().await.unwrap(), Some(()));
        assert_eq!(p.metrics().snapshot().runs_started, 1);
        assert_eq!(p.metrics().snapshot().records_extracted, 3);
    }

    struct PanickingSink;

    #[async_trait::async_trait]
    impl ArticleSink for PanickingSink {
        async fn insert(&self, _candidate: ArticleCandidate) -> Result<Article, StorageError> {
            panic!("sink exploded")
        }
    }

    struct PanickingFetcher;

    #[async_trait::async_trait]
    impl Fetcher for PanickingFetcher {
        async fn fetch(&self, _url: &str) -> Result<RawDocument, FetchError> {
            panic!("fetcher exploded")
        }
    }

    #[tokio::test]
    async fn panicking_insert_is_counted() {
        let p = pipeline(Some(THREE), Arc::new(PanickingSink));

        let run = p.run().await;
        assert_eq!(run.extracted, 3);
        assert_eq!(run.inserts.join().await, StoreSummary { stored: 0, failed: 3 });

        let m = p.metrics().snapshot();
        assert_eq!(m.task_panics, 3);
        assert_eq!(m.records_stored + m.store_failures + m.task_panics, m.records_extracted);
    }

    #[tokio::test]
    async fn every_record_lands_in_one_counter() {
        let sink = Arc::new(RecordingSink {
            fail_title: Some("One"),
            ..Default::default()
        });
        let p = pipeline(Some(THREE), sink);

        p.run().await.inserts.join().await;
        let m = p.metrics().snapshot();
        assert_eq!(m.records_stored + m.store_failures + m.task_panics, m.records_extracted);
        assert_eq!(m.task_panics, 0);
    }

    #[tokio::test]
    async fn panicking_run_is_counted() {
        let p = Arc::new(ScrapePipeline::new(
            "https://news.test/",
            Arc::new(PanickingFetcher),
            Arc::new(RecordingSink::default()),
            Arc::new(PipelineMetrics::default()),
        ));

        assert_eq!(p.trigger().await.unwrap(), None);
        assert_eq!(p.metrics().snapshot().task_panics, 1);
    }

    #[tokio::test]
    async fn watched_task_returns_its_value() {
        let metrics = Arc::new(PipelineMetrics::default());
        let handle = spawn_watched("answer", Arc::clone(&metrics), async { 42 });
        assert_eq!(handle.await.unwrap(), Some(42));
        assert_eq!(metrics.snapshot().task_panics, 0);
    }
}
