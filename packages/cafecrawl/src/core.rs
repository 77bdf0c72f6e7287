use std::{collections::HashSet, future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::{
    Error,
    error::{FetchError, FetchErrorKind},
};

pub mod fetcher;
pub mod sink;
pub mod store;
pub mod text;
pub mod walker;
pub mod window;

use fetcher::{DetailFetcher, FetchReport};
use sink::PostSink;
use store::{BoardKey, EmptyBoardStore, FailureLogStore, PageCursorStore, StateDir};
use walker::{KnownPostPolicy, ListingWalker, WalkOutcome};
use window::DateWindow;

/// Log target of one event per newly collected article.
pub const CONTENT_UPDATE_TARGET: &str = "content_update";
/// Log target of one event per article that could not be collected.
pub const ARTICLE_FAILURE_TARGET: &str = "article_failure";

/// A community to crawl. `name` doubles as the source name of every row it produces.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Cafe {
    pub name: String,
    pub id: u64,
    /// Board names to restrict the crawl to. Empty means every board.
    #[serde(default)]
    pub boards: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArticleRef {
    pub board_id: u64,
    pub article_id: u64,
}

/// One summary row of a board listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub article_id: u64,
    pub written_at: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub source_name: String,
    pub article_id: u64,
    /// `YYYY-MM-DD` in the platform's local offset.
    pub published_date: String,
    pub title: String,
    pub body_text: String,
    pub comment_lines: Vec<String>,
}

/// An article that could not be fetched or parsed. Kept for a human to look at.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FailedArticle {
    pub source_name: String,
    pub article_id: u64,
    pub url: String,
    pub kind: FetchErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

impl FailedArticle {
    pub fn new(cafe: &Cafe, article_id: u64, error: &FetchError) -> Self {
        Self {
            source_name: cafe.name.clone(),
            article_id,
            url: error.url().to_string(),
            kind: error.kind(),
            message: error.message().to_string(),
            excerpt: error.excerpt().map(str::to_string),
        }
    }
}

/// `(source_name, article_id)` pairs already stored in the sink.
#[derive(Debug, Default, Clone)]
pub struct KnownPostSet(HashSet<(String, u64)>);

impl KnownPostSet {
    pub fn contains(&self, source_name: &str, article_id: u64) -> bool {
        self.0.contains(&(source_name.to_string(), article_id))
    }

    pub fn insert(&mut self, source_name: impl Into<String>, article_id: u64) -> bool {
        self.0.insert((source_name.into(), article_id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for KnownPostSet {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(s, id)| (s.into(), id)).collect())
    }
}

/// The remote platform: board menus, listing pages and article details.
pub trait CafeSource: Send + Sync {
    fn boards(&self, cafe: &Cafe) -> impl Future<Output = Result<Vec<Board>, FetchError>> + Send;

    /// Summaries on `page` of a board, newest first. Empty once the board runs out.
    fn listing_page(
        &self,
        cafe: &Cafe,
        board_id: u64,
        page: u32,
    ) -> impl Future<Output = Result<Vec<ListingItem>, FetchError>> + Send;

    fn article(
        &self,
        cafe: &Cafe,
        article: ArticleRef,
    ) -> impl Future<Output = Result<ArticleRecord, FetchError>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOptions {
    pub concurrency: usize,
    pub policy: KnownPostPolicy,
    /// Start each board at its persisted page cursor and update the cursor on cutoff.
    pub resume_pages: bool,
    /// Walk boards previously marked empty instead of skipping them.
    pub recheck_empty: bool,
}

impl CrawlOptions {
    pub const CONCURRENCY: usize = 30;
    /// Pause between two daily chunks of a backfill.
    pub const CHUNK_PAUSE: Duration = Duration::from_secs(3);
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: Self::CONCURRENCY,
            policy: KnownPostPolicy::Stop,
            resume_pages: false,
            recheck_empty: false,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub boards_walked: usize,
    pub boards_skipped: usize,
    pub discovered: usize,
    pub appended: usize,
    pub records: Vec<ArticleRecord>,
    pub failures: Vec<FailedArticle>,
}

impl RunSummary {
    fn absorb(&mut self, report: FetchReport) {
        self.records.extend(report.records);
        self.failures.extend(report.failures);
    }

    fn merge(&mut self, other: RunSummary) {
        self.boards_walked += other.boards_walked;
        self.boards_skipped += other.boards_skipped;
        self.discovered += other.discovered;
        self.appended += other.appended;
        self.records.extend(other.records);
        self.failures.extend(other.failures);
    }
}

pub struct CafeCrawlCore<S, K> {
    source: S,
    sink: K,
    state_dir: StateDir,
    options: CrawlOptions,
}

impl<S: CafeSource, K: PostSink> CafeCrawlCore<S, K> {
    pub fn new(source: S, sink: K, state_dir: StateDir, options: CrawlOptions) -> Self {
        Self {
            source,
            sink,
            state_dir,
            options,
        }
    }

    /// Crawls every cafe for one date window and appends the new records to the sink.
    pub async fn run(&self, window: &DateWindow, cafes: &[Cafe]) -> Result<RunSummary, Error> {
        tracing::info!(%window, "Starting run");
        let known = self.sink.known_posts().await?;
        tracing::info!("{} known posts loaded", known.len());

        let mut cursors = PageCursorStore::load(self.state_dir.page_cursors()).await?;
        let mut empty_boards = EmptyBoardStore::load(self.state_dir.empty_boards()).await?;

        let mut summary = RunSummary::default();
        for cafe in cafes {
            let boards = self.target_boards(cafe).await?;
            tracing::info!(cafe = %cafe.name, "Crawling {} boards", boards.len());
            for board in boards {
                let key = BoardKey::new(cafe.id, board.id);
                if !self.options.recheck_empty && empty_boards.contains(key) {
                    tracing::debug!(%key, "Skipping board marked empty");
                    summary.boards_skipped += 1;
                    continue;
                }
                let report = self
                    .crawl_board(cafe, &board, window, &known, &mut cursors, &mut empty_boards)
                    .await;
                summary.boards_walked += 1;
                summary.absorb(report);
            }
        }
        summary.discovered = summary.records.len() + summary.failures.len();

        for record in &summary.records {
            tracing::info!(
                target: CONTENT_UPDATE_TARGET,
                source = %record.source_name,
                article_id = record.article_id,
                date = %record.published_date,
                "New article: {}",
                record.title
            );
        }
        summary.appended = self.sink.append(&summary.records).await?;
        FailureLogStore::new(self.state_dir.failures())
            .append(&summary.failures)
            .await?;
        // Cursors and markers move only once the records behind them are stored.
        if self.options.resume_pages {
            cursors.save().await?;
        }
        empty_boards.save().await?;

        tracing::info!(
            %window,
            collected = summary.records.len(),
            failed = summary.failures.len(),
            appended = summary.appended,
            "Run finished"
        );
        Ok(summary)
    }

    /// Runs one crawl per day, from `end` back to `start`.
    pub async fn backfill(
        &self,
        start: Date,
        end: Date,
        cafes: &[Cafe],
        pause: Duration,
    ) -> Result<RunSummary, Error> {
        let mut total = RunSummary::default();
        let mut chunks = DateWindow::daily_chunks(start, end).peekable();
        while let Some(window) = chunks.next() {
            total.merge(self.run(&window, cafes).await?);
            if chunks.peek().is_some() && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
        Ok(total)
    }

    /// Blocking entry for callers without their own runtime.
    pub fn run_blocking(&self, window: &DateWindow, cafes: &[Cafe]) -> Result<RunSummary, Error> {
        current_thread_runtime()?.block_on(self.run(window, cafes))
    }

    pub fn backfill_blocking(
        &self,
        start: Date,
        end: Date,
        cafes: &[Cafe],
        pause: Duration,
    ) -> Result<RunSummary, Error> {
        current_thread_runtime()?.block_on(self.backfill(start, end, cafes, pause))
    }

    async fn target_boards(&self, cafe: &Cafe) -> Result<Vec<Board>, Error> {
        let boards = self.source.boards(cafe).await?;
        if cafe.boards.is_empty() {
            return Ok(boards);
        }
        Ok(boards
            .into_iter()
            .filter(|board| cafe.boards.contains(&board.name))
            .collect())
    }

    #[tracing::instrument(level = tracing::Level::DEBUG, skip_all, fields(cafe = %cafe.name, board = board.id))]
    async fn crawl_board(
        &self,
        cafe: &Cafe,
        board: &Board,
        window: &DateWindow,
        known: &KnownPostSet,
        cursors: &mut PageCursorStore,
        empty_boards: &mut EmptyBoardStore,
    ) -> FetchReport {
        let key = BoardKey::new(cafe.id, board.id);
        let start_page = if self.options.resume_pages {
            cursors.resume_page(key, window).unwrap_or(1)
        } else {
            1
        };

        let walk = ListingWalker::new(&self.source, cafe, board.id, known, self.options.policy)
            .walk(window, start_page)
            .await;

        match &walk.outcome {
            WalkOutcome::StoppedAtCutoff { page } if self.options.resume_pages => {
                cursors.set(key, *page, window.cutoff());
            }
            // Running out after page 1 only means the board was read to its end.
            WalkOutcome::ExhaustedEmpty { page: 1 } => {
                empty_boards.insert(key);
            }
            WalkOutcome::AbortedOnError { page, error } => {
                tracing::warn!(%key, page, %error, "Listing failed, board walk aborted");
            }
            _ => {}
        }
        tracing::info!(
            %key,
            name = %board.name,
            outcome = ?walk.outcome,
            "{} new articles found",
            walk.article_ids.len()
        );

        if walk.article_ids.is_empty() {
            return FetchReport::default();
        }
        DetailFetcher::new(&self.source, self.options.concurrency)
            .fetch(cafe, board.id, &walk.article_ids)
            .await
    }
}

fn current_thread_runtime() -> Result<tokio::runtime::Runtime, Error> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(Error::Runtime)
}
