use std::{collections::HashSet, path::Path};

use serde::Deserialize;

use cafecrawl::core::Cafe;
use cafecrawl_naver::{NaverEndpoints, NaverSourceError};

/// Contents of the cafes file passed with `--config`.
#[derive(Deserialize, Debug)]
pub(crate) struct CrawlConfig {
    pub cafes: Vec<Cafe>,
    #[serde(default)]
    pub endpoints: EndpointOverrides,
}

/// Replaces the public API base URLs, e.g. with a recording proxy.
#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub(crate) struct EndpointOverrides {
    menus: Option<String>,
    listing: Option<String>,
    article: Option<String>,
}

impl EndpointOverrides {
    pub fn resolve(&self) -> Result<NaverEndpoints, NaverSourceError> {
        NaverEndpoints::new(
            self.menus.as_deref().unwrap_or(NaverEndpoints::MENU_BASE),
            self.listing
                .as_deref()
                .unwrap_or(NaverEndpoints::LISTING_BASE),
            self.article
                .as_deref()
                .unwrap_or(NaverEndpoints::ARTICLE_BASE),
        )
    }
}

impl CrawlConfig {
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read {}: {e}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| eyre::eyre!("Invalid cafes file {}: {e}", path.display()))?;
        if config.cafes.is_empty() {
            eyre::bail!("{} lists no cafes", path.display());
        }
        Ok(config)
    }

    /// Cafes whose names pass the `--include`/`--exclude` filters.
    pub fn select(self, include: &[String], exclude: &[String]) -> Vec<Cafe> {
        let include: HashSet<&str> = include.iter().map(String::as_str).collect();
        let exclude: HashSet<&str> = exclude.iter().map(String::as_str).collect();
        self.cafes
            .into_iter()
            .filter(|cafe| include.is_empty() || include.contains(cafe.name.as_str()))
            .filter(|cafe| !exclude.contains(cafe.name.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_cafes_with_optional_boards() {
        let file = write_config(
            r#"{
                "cafes": [
                    { "name": "토마스", "id": 17175596, "boards": ["수시게시판"] },
                    { "name": "수만휘", "id": 10197921 }
                ]
            }"#,
        );
        let config = CrawlConfig::load(file.path()).unwrap();
        assert_eq!(config.cafes.len(), 2);
        assert_eq!(config.cafes[0].boards, vec!["수시게시판"]);
        assert!(config.cafes[1].boards.is_empty());
    }

    #[test]
    fn empty_cafe_list_is_rejected() {
        let file = write_config(r#"{ "cafes": [] }"#);
        assert!(CrawlConfig::load(file.path()).is_err());
    }

    #[test]
    fn include_and_exclude_filter_by_name() {
        let file = write_config(
            r#"{ "cafes": [ { "name": "a", "id": 1 }, { "name": "b", "id": 2 } ] }"#,
        );
        let names = |cafes: Vec<Cafe>| cafes.into_iter().map(|c| c.name).collect::<Vec<_>>();

        let config = CrawlConfig::load(file.path()).unwrap();
        assert_eq!(names(config.select(&["b".to_string()], &[])), vec!["b"]);

        let config = CrawlConfig::load(file.path()).unwrap();
        assert_eq!(names(config.select(&[], &["b".to_string()])), vec!["a"]);

        let config = CrawlConfig::load(file.path()).unwrap();
        assert_eq!(names(config.select(&[], &[])), vec!["a", "b"]);
    }

    #[test]
    fn endpoint_overrides_fall_back_to_public_apis() {
        let file = write_config(
            r#"{
                "cafes": [ { "name": "a", "id": 1 } ],
                "endpoints": { "listing": "http://127.0.0.1:8080" }
            }"#,
        );
        let config = CrawlConfig::load(file.path()).unwrap();
        assert!(config.endpoints.resolve().is_ok());

        let bad = EndpointOverrides {
            article: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(bad.resolve().is_err());
    }
}
