use std::{future::Future, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::Error;

use super::{
    ArticleRecord, KnownPostSet,
    store::{read_json_or_default, write_json_atomic},
};

/// Row-oriented destination of collected articles.
pub trait PostSink: Send + Sync {
    /// Every `(source_name, article_id)` already stored.
    fn known_posts(&self) -> impl Future<Output = Result<KnownPostSet, Error>> + Send;

    /// Appends the records and returns how many rows were written.
    fn append(&self, records: &[ArticleRecord])
    -> impl Future<Output = Result<usize, Error>> + Send;
}

/// One row as stored: `{source, date, title, body, comments, article_id}`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    pub source: String,
    pub date: String,
    pub title: String,
    pub body: String,
    /// One comment per line.
    pub comments: String,
    pub article_id: u64,
}

impl From<&ArticleRecord> for SheetRow {
    fn from(record: &ArticleRecord) -> Self {
        SheetRow {
            source: record.source_name.clone(),
            date: record.published_date.clone(),
            title: record.title.clone(),
            body: record.body_text.clone(),
            comments: record.comment_lines.join("\n"),
            article_id: record.article_id,
        }
    }
}

/// Rows kept as a JSON array in a single file.
#[derive(Debug, Clone)]
pub struct JsonRowSink {
    path: PathBuf,
}

impl JsonRowSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn rows(&self) -> Result<Vec<SheetRow>, Error> {
        read_json_or_default(&self.path).await
    }
}

impl PostSink for JsonRowSink {
    async fn known_posts(&self) -> Result<KnownPostSet, Error> {
        Ok(self
            .rows()
            .await?
            .into_iter()
            .map(|row| (row.source, row.article_id))
            .collect())
    }

    async fn append(&self, records: &[ArticleRecord]) -> Result<usize, Error> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut rows = self.rows().await?;
        let mut known = rows
            .iter()
            .map(|row| (row.source.clone(), row.article_id))
            .collect::<KnownPostSet>();

        let mut new_rows = records
            .iter()
            .filter(|record| known.insert(record.source_name.clone(), record.article_id))
            .map(SheetRow::from)
            .collect::<Vec<_>>();
        // Newest first within the appended batch.
        new_rows.sort_by(|a, b| b.date.cmp(&a.date));

        let appended = new_rows.len();
        rows.append(&mut new_rows);
        write_json_atomic(&self.path, &rows).await?;
        tracing::info!(path = %self.path.display(), "{appended} rows appended");
        Ok(appended)
    }
}
