use std::collections::{HashMap, HashSet};

use regex::Regex;
use url::Url;

use crate::models::config::{ConfigError, FilterConfig};

/// Why a URL was dropped before fetching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    Asset(String),
    ExcludedPath,
    Status(u16),
    Duplicate,
}

/// Survivors and rejects of one filtering pass, in input order.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<String>,
    pub rejected: Vec<(String, Rejection)>,
}

/// Drops URLs that cannot take part in matching and normalizes the rest.
#[derive(Debug)]
pub struct UrlFilter {
    extensions: HashSet<String>,
    patterns: Vec<Regex>,
}

impl UrlFilter {
    pub fn new(config: &FilterConfig) -> Result<Self, ConfigError> {
        let patterns = config
            .excluded_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            extensions: config
                .excluded_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            patterns,
        })
    }

    /// Returns the reason `url` should be dropped, if any.
    pub fn rejection(&self, url: &str, status: Option<u16>) -> Option<Rejection> {
        if let Some(status) = status
            && status >= 300
        {
            return Some(Rejection::Status(status));
        }

        let path = url_path(url).to_lowercase();

        if let Some(extension) = path_extension(&path)
            && self.extensions.contains(extension)
        {
            return Some(Rejection::Asset(extension.to_string()));
        }

        if self.patterns.iter().any(|pattern| pattern.is_match(&path)) {
            return Some(Rejection::ExcludedPath);
        }

        None
    }

    /// Filters one side's URLs. Status codes are looked up by the raw URL
    /// first and by its normalized form second.
    pub fn filter(&self, urls: &[String], statuses: &HashMap<String, u16>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        let mut seen = HashSet::new();

        for raw in urls {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let normalized = normalize_url(raw);
            let status = statuses
                .get(raw)
                .or_else(|| statuses.get(&normalized))
                .copied();

            if let Some(reason) = self.rejection(raw, status) {
                log::debug!("Dropping {raw}: {reason:?}");
                outcome.rejected.push((raw.to_string(), reason));
                continue;
            }

            if !seen.insert(normalized.clone()) {
                outcome.rejected.push((raw.to_string(), Rejection::Duplicate));
                continue;
            }

            outcome.kept.push(normalized);
        }

        outcome
    }
}

/// Lower-cases scheme, host and path, drops the fragment and strips a
/// trailing slash from non-root paths. The query string is kept verbatim.
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_fragment(None);
            let path = normalize_path(url.path());
            url.set_path(&path);
            url.to_string()
        }
        Err(_) => {
            let without_fragment = raw.split('#').next().unwrap_or_default();
            let (path, query) = match without_fragment.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (without_fragment, None),
            };
            let path = normalize_path(path);
            match query {
                Some(query) => format!("{path}?{query}"),
                None => path,
            }
        }
    }
}

/// Path plus query, without scheme and host. Used to pair pages across
/// sites whose paths did not change.
pub fn path_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{query}", url.path()),
            None => url.path().to_string(),
        },
        Err(_) => url.to_string(),
    }
}

fn normalize_path(path: &str) -> String {
    let lowered = path.to_lowercase();
    let trimmed = lowered.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

fn path_extension(path: &str) -> Option<&str> {
    let segment = path.rsplit('/').next()?;
    segment.rsplit_once('.').map(|(_, extension)| extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> UrlFilter {
        UrlFilter::new(&FilterConfig::default()).expect("default patterns compile")
    }

    #[test]
    fn rejects_assets_regardless_of_case_and_query() {
        let filter = filter();
        for url in [
            "http://example.com/styles.css",
            "http://example.com/app.JS",
            "http://example.com/logo.PNG?v=2",
            "http://example.com/font.woff2",
            "http://example.com/doc.pdf#page=2",
            "/assets/app.js",
            "http://example.com/sitemap.xml",
            "http://example.com/video.mp4",
        ] {
            assert!(
                matches!(filter.rejection(url, None), Some(Rejection::Asset(_))),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn keeps_pages() {
        let filter = filter();
        for url in [
            "http://example.com/",
            "http://example.com/about",
            "http://example.com/index.html",
            "http://example.com/page.htm",
            "http://example.com/blog/post-title",
            "http://example.com/search?q=test.css",
            "http://example.com/about#team",
            "/about.html",
            "http://example.com/2021/04/spring-launch",
        ] {
            assert_eq!(filter.rejection(url, None), None, "{url} should be kept");
        }
    }

    #[test]
    fn rejects_structural_paths() {
        let filter = filter();
        for url in [
            "http://example.com/2021/",
            "http://example.com/2021/04",
            "http://example.com/2021/04/12/",
            "http://example.com/tag/rust",
            "http://example.com/Category/news/",
            "http://example.com/author/jane",
            "http://example.com/blog/page/3",
        ] {
            assert_eq!(
                filter.rejection(url, None),
                Some(Rejection::ExcludedPath),
                "{url} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_redirect_and_error_statuses() {
        let filter = filter();

        assert_eq!(filter.rejection("http://example.com/a", Some(200)), None);
        assert_eq!(
            filter.rejection("http://example.com/a", Some(301)),
            Some(Rejection::Status(301))
        );
        assert_eq!(
            filter.rejection("http://example.com/a", Some(404)),
            Some(Rejection::Status(404))
        );
    }

    #[test]
    fn normalizes_case_slash_and_fragment() {
        assert_eq!(
            normalize_url("HTTP://Example.COM/About/Team/#top"),
            "http://example.com/about/team"
        );
        assert_eq!(normalize_url("http://example.com"), "http://example.com/");
        assert_eq!(
            normalize_url("http://example.com/Search/?q=Rust"),
            "http://example.com/search?q=Rust"
        );
        assert_eq!(normalize_url("/About/"), "/about");
    }

    #[test]
    fn filter_preserves_order_and_drops_duplicates() {
        let filter = filter();
        let urls = vec![
            "http://example.com/b".to_string(),
            "http://example.com/style.css".to_string(),
            "http://example.com/a/".to_string(),
            "http://example.com/A".to_string(),
            "http://example.com/gone".to_string(),
            "http://example.com/c".to_string(),
        ];
        let statuses = HashMap::from([("http://example.com/gone".to_string(), 410)]);

        let outcome = filter.filter(&urls, &statuses);

        assert_eq!(
            outcome.kept,
            vec![
                "http://example.com/b",
                "http://example.com/a",
                "http://example.com/c",
            ]
        );
        assert_eq!(outcome.rejected.len(), 3);
        assert_eq!(outcome.rejected[1].1, Rejection::Duplicate);
        assert_eq!(outcome.rejected[2].1, Rejection::Status(410));
    }

    #[test]
    fn invalid_pattern_is_a_configuration_error() {
        let config = FilterConfig {
            excluded_patterns: vec!["(".to_string()],
            ..FilterConfig::default()
        };

        assert!(matches!(
            UrlFilter::new(&config),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn path_key_ignores_host() {
        assert_eq!(
            path_key("https://old.example/about?x=1"),
            path_key("https://new.example/about?x=1")
        );
    }
}
