use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Parser, ValueEnum};
use time::{Date, macros::format_description};
use tracing::{Level, level_filters::LevelFilter};
use tracing_subscriber::{Layer, filter, layer::SubscriberExt as _, util::SubscriberInitExt};

use cafecrawl::{
    FetchErrorKind,
    core::{
        ARTICLE_FAILURE_TARGET, CONTENT_UPDATE_TARGET, CafeCrawlCore, CrawlOptions, RunSummary,
        sink::JsonRowSink,
        store::StateDir,
        walker::KnownPostPolicy,
        window::{DateWindow, today},
    },
    session::{EnvSession, SessionProvider},
};
use cafecrawl_naver::NaverCafeSource;

use crate::config::CrawlConfig;

mod config;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    /// One window, stopping each board at the first post already stored.
    Incremental,
    /// One run per day from `--end` back to `--start`, skipping stored posts.
    Backfill,
}

#[derive(Parser, Debug)]
#[command(
    name = "cafecrawl",
    about = "Collects new posts from Naver cafe boards into a JSON row file.",
    version
)]
struct CafeCrawlOptions {
    /// JSON file listing the cafes (and optionally boards) to crawl.
    #[arg(short = 'c', long = "config", default_value = "./cafes.json")]
    config: PathBuf,

    /// Row file collected posts are appended to.
    #[arg(short = 'o', long = "out", default_value = "./out/rows.json")]
    out: PathBuf,

    /// Directory for page cursors, empty-board markers and the failure log.
    #[arg(long = "state", default_value = "./page")]
    state_dir: PathBuf,

    /// Earliest publish date to collect (YYYY-MM-DD, inclusive).
    #[arg(short = 's', long, value_parser = parse_date)]
    start: Date,

    /// Publish date to stop before (YYYY-MM-DD, exclusive).
    /// Open in incremental mode, tomorrow in backfill mode.
    #[arg(short = 'e', long, value_parser = parse_date)]
    end: Option<Date>,

    #[arg(short = 'm', long, value_enum, default_value_t = RunMode::Incremental)]
    mode: RunMode,

    /// The number of article requests in flight per board.
    #[arg(short = 'j', long, default_value_t = CrawlOptions::CONCURRENCY)]
    concurrency: usize,

    /// Seconds to wait between two backfill days.
    #[arg(long, default_value_t = CrawlOptions::CHUNK_PAUSE.as_secs())]
    pause_secs: u64,

    /// Walk boards previously found empty.
    #[arg(long)]
    recheck_empty: bool,

    /// The cafes to include, by name. By default, every cafe in the config.
    #[arg(short = 'i', long, value_delimiter = ',')]
    include: Vec<String>,

    /// The cafes to exclude, by name.
    #[arg(short = 'x', long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Environment variable holding the session cookie.
    #[arg(long, default_value = EnvSession::DEFAULT_VAR)]
    cookie_var: String,
}

impl CafeCrawlOptions {
    fn crawl_options(&self) -> CrawlOptions {
        let backfill = self.mode == RunMode::Backfill;
        CrawlOptions {
            concurrency: self.concurrency,
            policy: if backfill {
                KnownPostPolicy::Skip
            } else {
                KnownPostPolicy::Stop
            },
            resume_pages: backfill,
            recheck_empty: self.recheck_empty,
        }
    }
}

fn parse_date(s: &str) -> Result<Date, String> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    setup_tracing()?;

    color_eyre::install()?;
    let options = CafeCrawlOptions::parse();

    if !options.include.is_empty() && !options.exclude.is_empty() {
        eyre::bail!("You cannot use both --include and --exclude options at the same time.");
    }

    let config = CrawlConfig::load(&options.config)?;
    let endpoints = config.endpoints.resolve()?;
    let cafes = config.select(&options.include, &options.exclude);
    if cafes.is_empty() {
        eyre::bail!("No cafe left to crawl after filtering");
    }

    let session = EnvSession::new(&options.cookie_var)
        .acquire_session()
        .await?;
    let source = NaverCafeSource::new(&session, endpoints)?;
    let core = CafeCrawlCore::new(
        source,
        JsonRowSink::new(&options.out),
        StateDir::new(&options.state_dir),
        options.crawl_options(),
    );

    let summary = match options.mode {
        RunMode::Incremental => {
            let window = match options.end {
                Some(end) => DateWindow::between(options.start, end),
                None => DateWindow::since(options.start),
            };
            core.run(&window, &cafes).await?
        }
        RunMode::Backfill => {
            let end = match options.end {
                Some(end) => end,
                None => today()
                    .next_day()
                    .ok_or_else(|| eyre::eyre!("No date after today"))?,
            };
            core.backfill(
                options.start,
                end,
                &cafes,
                Duration::from_secs(options.pause_secs),
            )
            .await?
        }
    };

    report(&summary, &options);
    Ok(())
}

fn report(summary: &RunSummary, options: &CafeCrawlOptions) {
    tracing::info!(
        walked = summary.boards_walked,
        skipped = summary.boards_skipped,
        appended = summary.appended,
        out = %options.out.display(),
        "collected: {}, failed: {}",
        summary.records.len(),
        summary.failures.len()
    );
    let expired = summary
        .failures
        .iter()
        .filter(|failure| failure.kind == FetchErrorKind::Session)
        .count();
    if expired > 0 {
        tracing::warn!(
            "{expired} articles required login, refresh {}",
            options.cookie_var
        );
    }
    if !summary.failures.is_empty() {
        tracing::warn!(
            "Failed articles are listed in {}",
            StateDir::new(&options.state_dir).failures().display()
        );
    }
}

const REPORT_DIR: &str = "reports";

fn report_file(dir: &Path, name: &str) -> eyre::Result<Arc<File>> {
    let path = dir.join(name);
    File::create(&path)
        .map(Arc::new)
        .map_err(|e| eyre::eyre!("Failed to create {}: {e}", path.display()))
}

/// Logs to stdout, plus three JSON reports for a run:
/// new articles, failed articles, and warnings such as aborted board walks.
fn setup_tracing() -> eyre::Result<()> {
    let reports = Path::new(REPORT_DIR);
    std::fs::create_dir_all(reports)?;
    let stdout_log = tracing_subscriber::fmt::layer()
        .with_ansi(true)
        .with_level(true)
        .with_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        );

    let new_articles = tracing_subscriber::fmt::layer()
        .json()
        .with_span_list(false)
        .with_writer(report_file(reports, "new_articles.json")?)
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target() == CONTENT_UPDATE_TARGET
        }));

    let failed_articles = tracing_subscriber::fmt::layer()
        .json()
        .with_span_list(false)
        .with_writer(report_file(reports, "failed_articles.json")?)
        .with_filter(filter::filter_fn(|metadata| {
            metadata.target() == ARTICLE_FAILURE_TARGET
        }));

    let run_warnings = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(report_file(reports, "run_warnings.json")?)
        .with_filter(filter::filter_fn(|metadata| {
            *metadata.level() <= Level::WARN && metadata.target() != ARTICLE_FAILURE_TARGET
        }));

    tracing_subscriber::registry()
        .with(stdout_log)
        .with(new_articles)
        .with(failed_articles)
        .with(run_warnings)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use time::macros::date;

    use super::*;

    #[test]
    fn report_files_are_created_fresh() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("new_articles.json"), "stale").unwrap();
        report_file(dir.path(), "new_articles.json").unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("new_articles.json")).unwrap(),
            ""
        );
        assert!(report_file(&dir.path().join("missing"), "run_warnings.json").is_err());
    }

    #[test]
    fn options_are_consistent() {
        CafeCrawlOptions::command().debug_assert();
    }

    #[test]
    fn parses_iso_dates() {
        assert_eq!(parse_date("2025-08-01"), Ok(date!(2025 - 08 - 01)));
        assert!(parse_date("2025/08/01").is_err());
    }

    #[test]
    fn mode_selects_known_post_policy() {
        let options =
            CafeCrawlOptions::parse_from(["cafecrawl", "--start", "2025-08-01"]);
        let crawl = options.crawl_options();
        assert_eq!(crawl.policy, KnownPostPolicy::Stop);
        assert!(!crawl.resume_pages);
        assert_eq!(crawl.concurrency, CrawlOptions::CONCURRENCY);

        let options = CafeCrawlOptions::parse_from([
            "cafecrawl",
            "--start",
            "2025-08-01",
            "--mode",
            "backfill",
            "-j",
            "8",
        ]);
        let crawl = options.crawl_options();
        assert_eq!(crawl.policy, KnownPostPolicy::Skip);
        assert!(crawl.resume_pages);
        assert_eq!(crawl.concurrency, 8);
        assert_eq!(options.pause_secs, 3);
    }
}
