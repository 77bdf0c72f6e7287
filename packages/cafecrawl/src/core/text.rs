use scraper::Html;

/// Plain text of an HTML fragment: text nodes trimmed, blanks dropped, one per line.
pub fn html_to_text(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    Html::parse_fragment(html)
        .root_element()
        .text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
