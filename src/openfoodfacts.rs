use std::collections::BTreeSet;
use std::time::Duration;

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::FetchError;
use crate::http::{get_json, with_retry};
use crate::taxonomy::{RawTaxonomy, RawTaxonomyEntry};

const MAX_FACET_PAGES: u32 = 10;
const BATCH_SIZE: usize = 10;
const BATCH_DELAY: Duration = Duration::from_millis(50);
const MAX_ATTEMPTS: u32 = 5;
const BACKOFF: Duration = Duration::from_millis(250);

#[derive(Deserialize)]
struct FacetPage {
    #[serde(default)]
    tags: Vec<FacetTag>,
    #[serde(default)]
    page: Value,
}

#[derive(Deserialize)]
struct FacetTag {
    id: Option<String>,
}

impl FacetPage {
    /// Paging metadata comes either as `{page, page_count}` or not at all.
    fn is_last(&self) -> bool {
        let page = self.page.get("page").and_then(Value::as_u64);
        let count = self.page.get("page_count").and_then(Value::as_u64);
        matches!((page, count), (Some(p), Some(c)) if p == c)
    }
}

pub struct OpenFoodFacts {
    http: reqwest::Client,
    base_url: String,
}

impl OpenFoodFacts {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        OpenFoodFacts {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T, FetchError> {
        with_retry(what, MAX_ATTEMPTS, BACKOFF, || get_json(self.http.get(url))).await
    }

    /// Every additive id listed by the facets endpoint, in first-seen
    /// order without duplicates.
    pub async fn fetch_additive_ids(&self) -> Result<Vec<String>, FetchError> {
        let mut seen = BTreeSet::new();
        let mut ids = Vec::new();
        info!("Fetching additive ids from facets endpoint");

        for page in 1..=MAX_FACET_PAGES {
            let url = if page == 1 {
                format!("{}/facets/additives.json", self.base_url)
            } else {
                format!("{}/facets/additives.json?page={}", self.base_url, page)
            };
            let data: FacetPage = self.fetch_json(&url, &format!("facet page {}", page)).await?;
            if data.tags.is_empty() {
                info!("No tags on page {}, stopping", page);
                break;
            }
            let tags_on_page = data.tags.len();
            let last = data.is_last();
            for id in data.tags.into_iter().filter_map(|t| t.id) {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            info!("Page {}: {} tags ({} unique so far)", page, tags_on_page, ids.len());
            if last {
                break;
            }
        }

        info!("Collected {} additive ids", ids.len());
        Ok(ids)
    }

    async fn fetch_additive(&self, id: &str) -> Result<(String, RawTaxonomyEntry), FetchError> {
        let url = format!(
            "{}/api/v2/taxonomy?tagtype=additives&tags={}",
            self.base_url,
            urlencoding::encode(id)
        );
        let mut data: RawTaxonomy = self.fetch_json(&url, &format!("taxonomy for {}", id)).await?;
        let entry = data.remove(id).unwrap_or_else(|| {
            warn!("No taxonomy entry for {}, keeping id only", id);
            RawTaxonomyEntry::default()
        });
        Ok((id.to_string(), entry))
    }

    /// Taxonomy records for `ids`, fetched in batches of ten. Any id that
    /// still fails after retries aborts the whole fetch.
    pub async fn fetch_additive_details(&self, ids: &[String]) -> Result<RawTaxonomy, FetchError> {
        let pb = ProgressBar::new(ids.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let mut taxonomy = RawTaxonomy::new();
        for chunk in ids.chunks(BATCH_SIZE) {
            let results = join_all(chunk.iter().map(|id| self.fetch_additive(id))).await;
            for result in results {
                let (id, entry) = result?;
                taxonomy.insert(id, entry);
            }
            pb.inc(chunk.len() as u64);
            tokio::time::sleep(BATCH_DELAY).await;
        }

        pb.finish_and_clear();
        Ok(taxonomy)
    }

    /// A whole taxonomy file (class list, ingredient taxonomy).
    pub async fn fetch_taxonomy(&self, url: &str) -> Result<RawTaxonomy, FetchError> {
        info!("Fetching taxonomy {}", url);
        self.fetch_json(url, url).await
    }
}
