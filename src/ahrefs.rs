//! Keywords Explorer client: monthly search volume per title and the
//! long-run volume history behind each sparkline.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};

use crate::error::FetchError;
use crate::http::{get_json, with_retry};
use crate::metrics::VolumePoint;

const BATCH_SIZE: usize = 10;
const MAX_CONCURRENCY: usize = 3;
const OVERVIEW_ATTEMPTS: u32 = 3;
const OVERVIEW_BACKOFF: Duration = Duration::from_millis(500);
const HISTORY_ATTEMPTS: u32 = 5;
const HISTORY_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Deserialize)]
struct OverviewResponse {
    #[serde(default)]
    keywords: Vec<KeywordRow>,
}

#[derive(Deserialize)]
struct KeywordRow {
    keyword: Option<String>,
    #[serde(default)]
    volume: Value,
}

#[derive(Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    metrics: Vec<VolumePoint>,
}

/// Lowercased keyword → volume. Rows without a numeric volume map to
/// `None`.
fn volumes_by_keyword(response: OverviewResponse) -> HashMap<String, Option<i64>> {
    response
        .keywords
        .into_iter()
        .filter_map(|row| {
            let keyword = row.keyword?;
            let volume = row.volume.as_i64().or_else(|| {
                row.volume
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .map(|v| v.round() as i64)
            });
            Some((keyword.to_lowercase(), volume))
        })
        .collect()
}

pub struct Ahrefs {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    country: String,
}

impl Ahrefs {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, country: &str) -> Self {
        Ahrefs {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            country: country.to_string(),
        }
    }

    async fn overview(&self, keywords: &[String]) -> Result<HashMap<String, Option<i64>>, FetchError> {
        let url = format!("{}/v3/keywords-explorer/overview", self.base_url);
        let joined = keywords.join(",");
        let request = || {
            self.http
                .get(&url)
                .bearer_auth(&self.api_key)
                .query(&[
                    ("country", self.country.as_str()),
                    ("select", "keyword,volume"),
                    ("keywords", joined.as_str()),
                ])
        };
        let what = format!("volume batch starting with {:?}", keywords.first());
        let response: OverviewResponse =
            with_retry(&what, OVERVIEW_ATTEMPTS, OVERVIEW_BACKOFF, || get_json(request())).await?;
        Ok(volumes_by_keyword(response))
    }

    /// Volume for every title, fetched ten at a time with up to three
    /// batches in flight. A batch that keeps failing yields `None` for each
    /// of its titles.
    pub async fn search_volumes(&self, titles: &[String]) -> Vec<(String, Option<i64>)> {
        let pb = ProgressBar::new(titles.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );

        let mut volumes: HashMap<String, Option<i64>> = HashMap::with_capacity(titles.len());
        let mut batches = stream::iter(titles.chunks(BATCH_SIZE))
            .map(|batch| async move { (batch, self.overview(batch).await) })
            .buffer_unordered(MAX_CONCURRENCY);

        while let Some((batch, result)) = batches.next().await {
            match result {
                Ok(found) => {
                    for title in batch {
                        let volume = found.get(&title.to_lowercase()).copied().flatten();
                        volumes.insert(title.clone(), volume);
                    }
                }
                Err(e) => {
                    error!("Volume batch starting with {:?} failed: {}", batch.first(), e);
                    for title in batch {
                        volumes.entry(title.clone()).or_insert(None);
                    }
                }
            }
            pb.inc(batch.len() as u64);
        }
        pb.finish_and_clear();

        let with_data = volumes.values().filter(|v| v.is_some()).count();
        info!("Search volume for {}/{} titles", with_data, titles.len());

        titles
            .iter()
            .map(|t| (t.clone(), volumes.get(t).copied().flatten()))
            .collect()
    }

    /// Monthly history for `keyword`; `Ok(None)` when the API has no data
    /// for it (404).
    pub async fn volume_history(&self, keyword: &str) -> Result<Option<Vec<VolumePoint>>, FetchError> {
        let url = format!("{}/v3/keywords-explorer/volume-history", self.base_url);
        let request = || {
            self.http
                .get(&url)
                .bearer_auth(&self.api_key)
                .query(&[("keyword", keyword), ("country", self.country.as_str())])
        };
        let what = format!("history for {:?}", keyword);
        match with_retry(&what, HISTORY_ATTEMPTS, HISTORY_BACKOFF, || {
            get_json::<HistoryResponse>(request())
        })
        .await
        {
            Ok(response) => Ok(Some(response.metrics)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn country(&self) -> &str {
        &self.country
    }
}
