use std::time::Duration;

use reqwest::header::REFERER;
use thiserror::Error;
use url::Url;

use cafecrawl::{
    FetchError,
    core::{ArticleRecord, ArticleRef, Board, Cafe, CafeSource, ListingItem},
    session::Session,
};
use model::{ListingResponse, MenuResponse, parse_article};

mod model;
mod utils;

#[derive(Debug, Error)]
pub enum NaverSourceError {
    #[error("Failed to build client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Cookie is not a valid header value")]
    Cookie(#[from] reqwest::header::InvalidHeaderValue),
    #[error("Invalid endpoint URL {0}: {1}")]
    Endpoint(String, url::ParseError),
}

/// Base URLs of the three APIs the crawler talks to.
#[derive(Debug, Clone)]
pub struct NaverEndpoints {
    menus: Url,
    listing: Url,
    article: Url,
}

impl NaverEndpoints {
    pub const MENU_BASE: &'static str = "https://apis.naver.com/cafe-web/cafe-cafemain-api/v1.0";
    pub const LISTING_BASE: &'static str = "https://apis.naver.com/cafe-web/cafe-boardlist-api/v1";
    pub const ARTICLE_BASE: &'static str = "https://article.cafe.naver.com/gw/v3";

    pub fn new(menus: &str, listing: &str, article: &str) -> Result<Self, NaverSourceError> {
        let parse =
            |s: &str| Url::parse(s).map_err(|e| NaverSourceError::Endpoint(s.to_string(), e));
        Ok(Self {
            menus: parse(menus)?,
            listing: parse(listing)?,
            article: parse(article)?,
        })
    }

    /// Every API served from one origin. Used against local test servers.
    pub fn single(base: &str) -> Result<Self, NaverSourceError> {
        Self::new(base, base, base)
    }

    fn menus_url(&self, cafe_id: u64) -> String {
        format!("{}/cafes/{cafe_id}/menus", base(&self.menus))
    }

    fn listing_url(&self, cafe_id: u64, board_id: u64, page: u32) -> String {
        format!(
            "{}/cafes/{cafe_id}/menus/{board_id}/articles?page={page}&sortBy=TIME",
            base(&self.listing)
        )
    }

    fn article_url(&self, cafe_id: u64, article: ArticleRef) -> String {
        format!(
            "{}/cafes/{cafe_id}/articles/{}?query=&menuId={}&useCafeId=true&requestFrom=A",
            base(&self.article),
            article.article_id,
            article.board_id
        )
    }
}

impl Default for NaverEndpoints {
    fn default() -> Self {
        Self {
            menus: Url::parse(Self::MENU_BASE).unwrap(),
            listing: Url::parse(Self::LISTING_BASE).unwrap(),
            article: Url::parse(Self::ARTICLE_BASE).unwrap(),
        }
    }
}

fn base(url: &Url) -> &str {
    url.as_str().trim_end_matches('/')
}

/// Naver Cafe over its web client's JSON APIs.
pub struct NaverCafeSource {
    client: reqwest::Client,
    endpoints: NaverEndpoints,
}

impl NaverCafeSource {
    const LISTING_TIMEOUT: Duration = Duration::from_secs(5);
    const ARTICLE_TIMEOUT: Duration = Duration::from_secs(20);
    const MENU_TIMEOUT: Duration = Duration::from_secs(20);

    pub fn new(session: &Session, endpoints: NaverEndpoints) -> Result<Self, NaverSourceError> {
        let client = reqwest::Client::builder()
            .user_agent(utils::DEFAULT_USER_AGENT)
            .default_headers(utils::default_header(session)?)
            .build()?;
        Ok(Self { client, endpoints })
    }

    async fn get_text(
        &self,
        url: &str,
        timeout: Duration,
        referer: Option<String>,
    ) -> Result<String, FetchError> {
        let mut request = self.client.get(url).timeout(timeout);
        if let Some(referer) = referer {
            request = request.header(REFERER, referer);
        }
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::request(url, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::request(url, format!("HTTP {}", status.as_u16())));
        }
        response
            .text()
            .await
            .map_err(|e| FetchError::request(url, e.to_string()))
    }
}

fn decode<T: serde::de::DeserializeOwned>(url: &str, body: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::decode(url, e.to_string()).with_excerpt(body))
}

impl CafeSource for NaverCafeSource {
    async fn boards(&self, cafe: &Cafe) -> Result<Vec<Board>, FetchError> {
        let url = self.endpoints.menus_url(cafe.id);
        let body = self.get_text(&url, Self::MENU_TIMEOUT, None).await?;
        let boards = decode::<MenuResponse>(&url, &body)?.into_boards();
        tracing::info!(cafe = %cafe.name, "{} boards listed", boards.len());
        Ok(boards)
    }

    async fn listing_page(
        &self,
        cafe: &Cafe,
        board_id: u64,
        page: u32,
    ) -> Result<Vec<ListingItem>, FetchError> {
        let url = self.endpoints.listing_url(cafe.id, board_id, page);
        let body = self.get_text(&url, Self::LISTING_TIMEOUT, None).await?;
        decode::<ListingResponse>(&url, &body)?.into_items(&url)
    }

    #[tracing::instrument(level = tracing::Level::DEBUG, skip(self, cafe), fields(cafe = %cafe.name))]
    async fn article(&self, cafe: &Cafe, article: ArticleRef) -> Result<ArticleRecord, FetchError> {
        let url = self.endpoints.article_url(cafe.id, article);
        let referer = utils::board_referer(cafe.id, article.board_id);
        let body = self
            .get_text(&url, Self::ARTICLE_TIMEOUT, Some(referer))
            .await?;
        parse_article(&cafe.name, article.article_id, &url, &body)
    }
}
