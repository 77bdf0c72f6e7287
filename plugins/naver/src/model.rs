use serde::Deserialize;

use cafecrawl::{
    FetchError,
    core::{
        ArticleRecord, Board, ListingItem,
        text::html_to_text,
        window::{date_from_millis, datetime_from_millis, today},
    },
};

/// Returned in place of an article when the session cookie is no longer valid.
const LOGIN_ERROR_CODE: &str = "0004";
const UNTITLED: &str = "제목 없음";

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MenuResponse {
    result: MenuResult,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct MenuResult {
    menus: Vec<Menu>,
    link_menus: Vec<Menu>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Menu {
    menu_id: Option<u64>,
    #[serde(default)]
    name: Option<String>,
}

impl MenuResponse {
    pub(crate) fn into_boards(self) -> Vec<Board> {
        self.result
            .menus
            .into_iter()
            .chain(self.result.link_menus)
            .filter_map(|menu| {
                menu.menu_id.map(|id| Board {
                    id,
                    name: menu.name.unwrap_or_default(),
                })
            })
            .collect()
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListingResponse {
    result: ListingResult,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ListingResult {
    article_list: Vec<ListingEntry>,
}

#[derive(Deserialize, Debug)]
struct ListingEntry {
    item: ListingEntryItem,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ListingEntryItem {
    article_id: u64,
    write_date_timestamp: i64,
}

impl ListingResponse {
    pub(crate) fn into_items(self, url: &str) -> Result<Vec<ListingItem>, FetchError> {
        self.result
            .article_list
            .into_iter()
            .map(|entry| {
                let written_at = datetime_from_millis(entry.item.write_date_timestamp)
                    .ok_or_else(|| {
                        FetchError::decode(
                            url,
                            format!(
                                "Timestamp out of range: {}",
                                entry.item.write_date_timestamp
                            ),
                        )
                    })?;
                Ok(ListingItem {
                    article_id: entry.item.article_id,
                    written_at,
                })
            })
            .collect()
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct ArticleResponse {
    error_code: Option<serde_json::Value>,
    result: Option<ArticleResult>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct ArticleResult {
    article: Option<ArticleBody>,
    scrap: Option<ScrapBody>,
    comments: Option<CommentList>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct ArticleBody {
    subject: Option<String>,
    content_html: Option<String>,
    write_date: Option<i64>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct ScrapBody {
    content_html: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct CommentList {
    items: Vec<Comment>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Comment {
    content: Option<String>,
}

impl ArticleResponse {
    fn is_login_error(&self) -> bool {
        matches!(&self.error_code, Some(serde_json::Value::String(code)) if code == LOGIN_ERROR_CODE)
    }
}

/// Decodes an article detail body into a record.
pub(crate) fn parse_article(
    source_name: &str,
    article_id: u64,
    url: &str,
    body: &str,
) -> Result<ArticleRecord, FetchError> {
    let decode_err = |message: String| FetchError::decode(url, message).with_excerpt(body);
    let value = serde_json::from_str::<serde_json::Value>(body)
        .map_err(|e| decode_err(e.to_string()))?;
    if !value.is_object() {
        return Err(decode_err("Response is not a JSON object".to_string()));
    }
    let response = serde_json::from_value::<ArticleResponse>(value)
        .map_err(|e| decode_err(e.to_string()))?;
    if response.is_login_error() {
        return Err(FetchError::session(
            url,
            format!("Login required (errorCode {LOGIN_ERROR_CODE})"),
        ));
    }

    let result = response.result.unwrap_or_default();
    let article = result.article.unwrap_or_default();
    let comments = result.comments.unwrap_or_default();

    let content_html = article
        .content_html
        .filter(|html| !html.is_empty())
        .or_else(|| result.scrap.and_then(|scrap| scrap.content_html))
        .unwrap_or_default();

    let published_date = article
        .write_date
        .and_then(date_from_millis)
        .unwrap_or_else(|| today().to_string());

    Ok(ArticleRecord {
        source_name: source_name.to_string(),
        article_id,
        published_date,
        title: article.subject.unwrap_or_else(|| UNTITLED.to_string()),
        body_text: html_to_text(&content_html),
        comment_lines: comments
            .items
            .into_iter()
            .map(|comment| html_to_text(&comment.content.unwrap_or_default()))
            .collect(),
    })
}
