use futures::{StreamExt, stream::FuturesUnordered};
use tokio::sync::Semaphore;

use super::{
    ARTICLE_FAILURE_TARGET, ArticleRecord, ArticleRef, Cafe, CafeSource, FailedArticle,
};

#[derive(Debug)]
pub enum Disposition {
    Collected(ArticleRecord),
    Failed(FailedArticle),
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub records: Vec<ArticleRecord>,
    pub failures: Vec<FailedArticle>,
}

impl FromIterator<Disposition> for FetchReport {
    fn from_iter<I: IntoIterator<Item = Disposition>>(iter: I) -> Self {
        let mut report = FetchReport::default();
        for disposition in iter {
            match disposition {
                Disposition::Collected(record) => report.records.push(record),
                Disposition::Failed(failure) => report.failures.push(failure),
            }
        }
        report
    }
}

/// Fetches article details with at most `concurrency` requests in flight.
pub struct DetailFetcher<'a, S> {
    source: &'a S,
    concurrency: usize,
}

impl<'a, S: CafeSource> DetailFetcher<'a, S> {
    pub fn new(source: &'a S, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Attempts every id exactly once. Failures are reported, never raised.
    pub async fn fetch(&self, cafe: &Cafe, board_id: u64, article_ids: &[u64]) -> FetchReport {
        tracing::info!(
            cafe = %cafe.name,
            board = board_id,
            "fetch {} article details",
            article_ids.len()
        );
        let gate = Semaphore::new(self.concurrency);
        let report = article_ids
            .iter()
            .map(|&article_id| self.fetch_one(&gate, cafe, ArticleRef { board_id, article_id }))
            .collect::<FuturesUnordered<_>>()
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect::<FetchReport>();

        if !report.failures.is_empty() {
            tracing::warn!(
                cafe = %cafe.name,
                board = board_id,
                "{} of {} articles failed",
                report.failures.len(),
                article_ids.len()
            );
        }
        report
    }

    async fn fetch_one(&self, gate: &Semaphore, cafe: &Cafe, article: ArticleRef) -> Disposition {
        // The gate lives as long as this call and is never closed.
        let _permit = gate.acquire().await;
        match self.source.article(cafe, article).await {
            Ok(record) => Disposition::Collected(record),
            Err(error) => {
                tracing::error!(
                    target: ARTICLE_FAILURE_TARGET,
                    cafe = %cafe.name,
                    article_id = article.article_id,
                    kind = ?error.kind(),
                    url = %error.url(),
                    excerpt = error.excerpt(),
                    "Failed to fetch article: {}",
                    error.message()
                );
                Disposition::Failed(FailedArticle::new(cafe, article.article_id, &error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::atomic::Ordering, time::Duration};

    use super::*;
    use crate::{
        core::mock::{MockSource, cafe},
        error::{FetchError, FetchErrorKind},
    };

    #[tokio::test]
    async fn every_id_gets_exactly_one_disposition() {
        let cafe = cafe();
        let mut source = MockSource::default();
        for id in [3, 7, 11] {
            source.articles.insert(
                id,
                Err(FetchError::request(format!("mock://articles/{id}"), "HTTP 502")),
            );
        }
        let ids = (1..=20).collect::<Vec<u64>>();

        let report = DetailFetcher::new(&source, 4).fetch(&cafe, 1, &ids).await;

        assert_eq!(report.records.len() + report.failures.len(), ids.len());
        let resolved = report
            .records
            .iter()
            .map(|r| r.article_id)
            .chain(report.failures.iter().map(|f| f.article_id))
            .collect::<HashSet<_>>();
        assert_eq!(resolved, ids.iter().copied().collect::<HashSet<_>>());
        assert_eq!(source.article_calls.load(Ordering::SeqCst), ids.len());

        let mut failed = report
            .failures
            .iter()
            .map(|f| f.article_id)
            .collect::<Vec<_>>();
        failed.sort_unstable();
        assert_eq!(failed, vec![3, 7, 11]);
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_limit() {
        let cafe = cafe();
        for limit in [1, 3, 25] {
            let source = MockSource {
                latency: Duration::from_millis(5),
                ..Default::default()
            };
            let ids = (1..=60).collect::<Vec<u64>>();
            let report = DetailFetcher::new(&source, limit).fetch(&cafe, 1, &ids).await;
            assert_eq!(report.records.len(), 60);
            let max = source.max_in_flight.load(Ordering::SeqCst);
            assert!(max <= limit, "{max} in flight with limit {limit}");
            assert_eq!(max, limit, "requests were not overlapped up to the limit");
        }
    }

    #[tokio::test]
    async fn zero_limit_still_makes_progress() {
        let cafe = cafe();
        let source = MockSource::default();
        let report = DetailFetcher::new(&source, 0).fetch(&cafe, 1, &[1, 2]).await;
        assert_eq!(report.records.len(), 2);
        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn session_failure_is_recorded_with_its_kind() {
        let cafe = cafe();
        let mut source = MockSource::default();
        source.articles.insert(
            5,
            Err(FetchError::session("mock://articles/5", "errorCode 0004")),
        );
        let report = DetailFetcher::new(&source, 2).fetch(&cafe, 1, &[5]).await;
        assert!(report.records.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, FetchErrorKind::Session);
        assert_eq!(report.failures[0].url, "mock://articles/5");
    }

    #[tokio::test]
    async fn empty_input_fetches_nothing() {
        let cafe = cafe();
        let source = MockSource::default();
        let report = DetailFetcher::new(&source, 5).fetch(&cafe, 1, &[]).await;
        assert!(report.records.is_empty() && report.failures.is_empty());
        assert_eq!(source.article_calls.load(Ordering::SeqCst), 0);
    }
}
