use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, ORIGIN, REFERER,
};

use cafecrawl::session::Session;

pub(super) const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/140.0.0.0 Safari/537.36";

pub(super) const CAFE_ORIGIN: &str = "https://cafe.naver.com";

pub(super) fn default_header(
    session: &Session,
) -> Result<HeaderMap, reqwest::header::InvalidHeaderValue> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(ORIGIN, HeaderValue::from_static(CAFE_ORIGIN));
    headers.insert(REFERER, HeaderValue::from_static("https://cafe.naver.com/"));
    headers.insert("x-cafe-product", HeaderValue::from_static("pc"));

    let mut cookie = HeaderValue::from_str(session.cookie())?;
    cookie.set_sensitive(true);
    headers.insert(COOKIE, cookie);
    Ok(headers)
}

/// Referer the web client sends while a board is open.
pub(super) fn board_referer(cafe_id: u64, board_id: u64) -> String {
    format!("{CAFE_ORIGIN}/f-e/cafes/{cafe_id}/menus/{board_id}")
}
