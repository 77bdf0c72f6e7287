//! Small JSON state files kept between runs.
//!
//! Every file is read once when a run starts and rewritten whole when it changes.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

use crate::Error;

use super::{FailedArticle, window::DateWindow};

/// `<cafe_id>:<board_id>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoardKey {
    pub cafe_id: u64,
    pub board_id: u64,
}

impl BoardKey {
    pub fn new(cafe_id: u64, board_id: u64) -> Self {
        Self { cafe_id, board_id }
    }
}

impl fmt::Display for BoardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cafe_id, self.board_id)
    }
}

impl FromStr for BoardKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cafe_id, board_id) = s
            .split_once(':')
            .ok_or_else(|| format!("Invalid board key: {s}"))?;
        Ok(Self {
            cafe_id: cafe_id.parse().map_err(|e| format!("Invalid cafe id in {s}: {e}"))?,
            board_id: board_id
                .parse()
                .map_err(|e| format!("Invalid board id in {s}: {e}"))?,
        })
    }
}

/// Directory holding the state files of one crawl setup.
#[derive(Debug, Clone)]
pub struct StateDir(PathBuf);

impl StateDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn page_cursors(&self) -> PathBuf {
        self.0.join("last_pages.json")
    }

    pub fn empty_boards(&self) -> PathBuf {
        self.0.join("empty_boards.json")
    }

    pub fn failures(&self) -> PathBuf {
        self.0.join("failures.json")
    }
}

/// Where a backfill stopped on a board, and the cutoff of the window it stopped at.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub cutoff: OffsetDateTime,
}

#[derive(Debug)]
pub struct PageCursorStore {
    path: PathBuf,
    cursors: BTreeMap<String, PageCursor>,
}

impl PageCursorStore {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let cursors = read_json_or_default(&path).await?;
        Ok(Self { path, cursors })
    }

    pub fn get(&self, key: BoardKey) -> Option<PageCursor> {
        self.cursors.get(&key.to_string()).copied()
    }

    /// Page to start `window` at. Only a cursor left by a window no older than
    /// this one applies; pages before it hold nothing this window wants.
    pub fn resume_page(&self, key: BoardKey, window: &DateWindow) -> Option<u32> {
        let cursor = self.get(key)?;
        let until = window.until()?;
        (until <= cursor.cutoff).then_some(cursor.page)
    }

    pub fn set(&mut self, key: BoardKey, page: u32, cutoff: OffsetDateTime) {
        self.cursors
            .insert(key.to_string(), PageCursor { page, cutoff });
    }

    pub async fn save(&self) -> Result<(), Error> {
        write_json_atomic(&self.path, &self.cursors).await
    }
}

#[derive(Debug)]
pub struct EmptyBoardStore {
    path: PathBuf,
    boards: BTreeSet<BoardKey>,
}

impl EmptyBoardStore {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let keys: Vec<String> = read_json_or_default(&path).await?;
        let boards = keys
            .iter()
            .filter_map(|key| {
                key.parse::<BoardKey>()
                    .inspect_err(|e| tracing::warn!(file = %path.display(), "{e}"))
                    .ok()
            })
            .collect();
        Ok(Self { path, boards })
    }

    pub fn contains(&self, key: BoardKey) -> bool {
        self.boards.contains(&key)
    }

    pub fn insert(&mut self, key: BoardKey) -> bool {
        self.boards.insert(key)
    }

    pub async fn save(&self) -> Result<(), Error> {
        let keys = self.boards.iter().map(ToString::to_string).collect::<Vec<_>>();
        write_json_atomic(&self.path, &keys).await
    }
}

/// Append-only log of failed articles.
#[derive(Debug)]
pub struct FailureLogStore {
    path: PathBuf,
}

impl FailureLogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn append(&self, failures: &[FailedArticle]) -> Result<(), Error> {
        if failures.is_empty() {
            return Ok(());
        }
        let mut logged: Vec<FailedArticle> = read_json_or_default(&self.path).await?;
        logged.extend_from_slice(failures);
        write_json_atomic(&self.path, &logged).await
    }

    pub async fn load(&self) -> Result<Vec<FailedArticle>, Error> {
        read_json_or_default(&self.path).await
    }
}

pub(crate) async fn read_json_or_default<T>(path: &Path) -> Result<T, Error>
where
    T: DeserializeOwned + Default,
{
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(serde_json::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

/// Writes to a sibling temp file, then renames it over `path`.
pub(crate) async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), Error> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::macros::{date, datetime};

    use super::*;
    use crate::error::FetchErrorKind;

    #[test]
    fn board_key_round_trips_through_text() {
        let key = BoardKey::new(17175596, 12);
        assert_eq!(key.to_string(), "17175596:12");
        assert_eq!("17175596:12".parse::<BoardKey>(), Ok(key));
        assert!("17175596".parse::<BoardKey>().is_err());
        assert!("a:1".parse::<BoardKey>().is_err());
    }

    #[tokio::test]
    async fn missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::new(dir.path().join("page"));
        let cursors = PageCursorStore::load(state.page_cursors()).await.unwrap();
        let empty = EmptyBoardStore::load(state.empty_boards()).await.unwrap();
        assert_eq!(cursors.get(BoardKey::new(1, 2)), None);
        assert!(!empty.contains(BoardKey::new(1, 2)));
    }

    #[tokio::test]
    async fn cursors_persist_in_keyed_map_format() {
        let dir = tempfile::tempdir().unwrap();
        let state = StateDir::new(dir.path().join("page"));
        let mut cursors = PageCursorStore::load(state.page_cursors()).await.unwrap();
        cursors.set(BoardKey::new(10197921, 3), 14, datetime!(2025-08-15 00:00 +9));
        cursors.save().await.unwrap();

        let raw = tokio::fs::read_to_string(state.page_cursors()).await.unwrap();
        let map: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(map["10197921:3"]["page"], 14);
        assert_eq!(map["10197921:3"]["cutoff"], "2025-08-15T00:00:00+09:00");

        let reloaded = PageCursorStore::load(state.page_cursors()).await.unwrap();
        assert_eq!(
            reloaded.get(BoardKey::new(10197921, 3)),
            Some(PageCursor {
                page: 14,
                cutoff: datetime!(2025-08-15 00:00 +9),
            })
        );
        assert!(!tokio::fs::try_exists(dir.path().join("page/last_pages.json.tmp")).await.unwrap());
    }

    #[tokio::test]
    async fn cursor_only_resumes_windows_older_than_its_cutoff() {
        let dir = tempfile::tempdir().unwrap();
        let key = BoardKey::new(1, 2);
        let mut cursors = PageCursorStore::load(dir.path().join("last_pages.json"))
            .await
            .unwrap();
        cursors.set(key, 47, datetime!(2025-08-01 00:00 +9));

        let older = DateWindow::between(date!(2025 - 07 - 31), date!(2025 - 08 - 01));
        assert_eq!(cursors.resume_page(key, &older), Some(47));

        let newer = DateWindow::between(date!(2025 - 09 - 14), date!(2025 - 09 - 15));
        assert_eq!(cursors.resume_page(key, &newer), None);

        let open = DateWindow::since(date!(2025 - 07 - 01));
        assert_eq!(cursors.resume_page(key, &open), None);
        assert_eq!(cursors.resume_page(BoardKey::new(1, 3), &older), None);
    }

    #[tokio::test]
    async fn empty_boards_persist_as_key_list() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty_boards.json");
        tokio::fs::write(&path, r#"["1:2", "garbage"]"#).await.unwrap();

        let mut empty = EmptyBoardStore::load(&path).await.unwrap();
        assert!(empty.contains(BoardKey::new(1, 2)));
        assert!(empty.insert(BoardKey::new(1, 3)));
        empty.save().await.unwrap();

        let keys: Vec<String> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(keys, vec!["1:2", "1:3"]);
    }

    #[tokio::test]
    async fn failure_log_appends_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let log = FailureLogStore::new(dir.path().join("failures.json"));
        let failure = |id: u64| FailedArticle {
            source_name: "토마스".to_string(),
            article_id: id,
            url: format!("https://article.example/{id}"),
            kind: FetchErrorKind::Decode,
            message: "expected value".to_string(),
            excerpt: Some("<html>".to_string()),
        };
        log.append(&[failure(1)]).await.unwrap();
        log.append(&[]).await.unwrap();
        log.append(&[failure(2)]).await.unwrap();
        let logged = log.load().await.unwrap();
        assert_eq!(logged, vec![failure(1), failure(2)]);
    }

    #[tokio::test]
    async fn corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_pages.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        assert!(matches!(
            PageCursorStore::load(&path).await,
            Err(Error::Serialization(_))
        ));
    }
}
