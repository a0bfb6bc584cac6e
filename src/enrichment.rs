//! Best-effort summary and image lookups for ingredients. Every outcome,
//! including failures, is cached for the life of the process by lookup
//! title.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::error::FetchError;
use crate::http::get_json;

const ARTICLE_BASE_URL: &str = "https://en.wikipedia.org/wiki/";

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub extract: Option<String>,
    pub image_url: Option<String>,
}

#[async_trait]
pub trait SummarySource: Send + Sync {
    async fn fetch_summary(&self, title: &str) -> Result<Summary, FetchError>;
}

#[derive(Deserialize)]
struct SummaryResponse {
    extract: Option<String>,
    thumbnail: Option<ImageRef>,
    originalimage: Option<ImageRef>,
}

#[derive(Deserialize)]
struct ImageRef {
    source: Option<String>,
}

/// REST page-summary endpoint (`{base}/{title}`).
pub struct WikipediaSummaries {
    http: reqwest::Client,
    base_url: String,
}

impl WikipediaSummaries {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        WikipediaSummaries {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SummarySource for WikipediaSummaries {
    async fn fetch_summary(&self, title: &str) -> Result<Summary, FetchError> {
        let url = format!("{}/{}", self.base_url, urlencoding::encode(title));
        let data: SummaryResponse = get_json(self.http.get(&url)).await?;
        let image = |r: Option<ImageRef>| r.and_then(|i| i.source).filter(|s| !s.is_empty());
        Ok(Summary {
            extract: data
                .extract
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            image_url: image(data.originalimage).or_else(|| image(data.thumbnail)),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentRecord {
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub canonical_url: Option<String>,
    pub found: bool,
}

impl EnrichmentRecord {
    /// Only entities with a summary page and an image make the catalogue.
    pub fn is_publishable(&self) -> bool {
        self.found && self.image_url.is_some()
    }
}

/// Title to look up and the article URL to publish with it. A preferred
/// URL contributes its last path segment, percent-decoded.
pub fn lookup_title(display_name: &str, preferred_url: Option<&str>) -> (String, String) {
    if let Some(url) = preferred_url {
        if let Ok(parsed) = reqwest::Url::parse(url) {
            let segment = parsed
                .path_segments()
                .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
                .map(|s| {
                    urlencoding::decode(s)
                        .map(|d| d.into_owned())
                        .unwrap_or_else(|_| s.to_string())
                });
            let title = segment.unwrap_or_else(|| display_name.to_string());
            return (title, url.to_string());
        }
    }
    let title = WHITESPACE_RE.replace_all(display_name.trim(), "_").into_owned();
    let url = format!("{}{}", ARTICLE_BASE_URL, title);
    (title, url)
}

pub struct Enricher<S> {
    source: S,
    /// `None` records a failed lookup
    cache: HashMap<String, Option<Summary>>,
}

impl<S: SummarySource> Enricher<S> {
    pub fn new(source: S) -> Self {
        Enricher {
            source,
            cache: HashMap::new(),
        }
    }

    pub async fn enrich(&mut self, display_name: &str, preferred_url: Option<&str>) -> EnrichmentRecord {
        let (title, url) = lookup_title(display_name, preferred_url);

        if !self.cache.contains_key(&title) {
            let fetched = match self.source.fetch_summary(&title).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    debug!(title = %title, "no summary: {}", e);
                    None
                }
            };
            self.cache.insert(title.clone(), fetched);
        }

        match self.cache.get(&title).cloned().flatten() {
            Some(summary) => EnrichmentRecord {
                summary: summary.extract,
                image_url: summary.image_url,
                canonical_url: Some(url),
                found: true,
            },
            None => EnrichmentRecord::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Answers from a fixed table; unknown titles are a 404.
    pub(crate) struct FakeSource {
        pub pages: HashMap<String, Summary>,
        pub calls: Arc<AtomicUsize>,
    }

    impl FakeSource {
        pub fn new(pages: &[(&str, Option<&str>)]) -> Self {
            FakeSource {
                pages: pages
                    .iter()
                    .map(|(title, image)| {
                        (
                            title.to_string(),
                            Summary {
                                extract: Some(format!("About {}", title)),
                                image_url: image.map(str::to_string),
                            },
                        )
                    })
                    .collect(),
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl SummarySource for FakeSource {
        async fn fetch_summary(&self, title: &str) -> Result<Summary, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages.get(title).cloned().ok_or(FetchError::Status {
                status: 404,
                url: title.to_string(),
            })
        }
    }

    #[test]
    fn title_from_name_or_url() {
        assert_eq!(
            lookup_title("Olive oil", None),
            ("Olive_oil".to_string(), "https://en.wikipedia.org/wiki/Olive_oil".to_string())
        );
        assert_eq!(
            lookup_title("Crème fraîche", Some("https://en.wikipedia.org/wiki/Cr%C3%A8me_fra%C3%AEche")).0,
            "Crème_fraîche"
        );
        let (title, url) = lookup_title("Salt", Some("https://fr.wikipedia.org/wiki/Sel_alimentaire/"));
        assert_eq!(title, "Sel_alimentaire");
        assert_eq!(url, "https://fr.wikipedia.org/wiki/Sel_alimentaire/");
        // unparseable URL falls back to the name
        assert_eq!(lookup_title("Sea salt", Some("not a url")).0, "Sea_salt");
    }

    #[tokio::test]
    async fn hits_and_misses_are_cached() {
        let source = FakeSource::new(&[("Olive_oil", Some("https://img/olive.jpg"))]);
        let calls = Arc::clone(&source.calls);
        let mut enricher = Enricher::new(source);

        let first = enricher.enrich("Olive oil", None).await;
        assert!(first.found);
        assert!(first.is_publishable());
        assert_eq!(first.summary.as_deref(), Some("About Olive_oil"));
        assert_eq!(first.canonical_url.as_deref(), Some("https://en.wikipedia.org/wiki/Olive_oil"));

        let again = enricher.enrich("Olive  oil", None).await;
        assert_eq!(again, first);

        let missing = enricher.enrich("Unobtainium", None).await;
        assert!(!missing.found);
        assert_eq!(missing, EnrichmentRecord::default());
        let missing_again = enricher.enrich("Unobtainium", None).await;
        assert!(!missing_again.found);

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn found_without_image_is_not_publishable() {
        let mut enricher = Enricher::new(FakeSource::new(&[("Water", None)]));
        let record = enricher.enrich("Water", None).await;
        assert!(record.found);
        assert!(!record.is_publishable());
    }
}
