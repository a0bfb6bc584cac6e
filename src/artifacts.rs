//! JSON files under the data directory: the raw taxonomy snapshots, the
//! additive index and property files, class list, search history and the
//! ingredient catalogue.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::dataset::{compare_ranked, ClassEntity, Dataset, NormalizedEntity};
use crate::metrics::VolumePoint;

pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DataPaths { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn additives_taxonomy(&self) -> PathBuf {
        self.root.join("taxonomy").join("additives.json")
    }

    pub fn classes_taxonomy(&self) -> PathBuf {
        self.root.join("taxonomy").join("additives_classes.json")
    }

    pub fn index(&self) -> PathBuf {
        self.root.join("additives").join("index.json")
    }

    pub fn entry(&self, slug: &str) -> PathBuf {
        self.root.join("additives").join(format!("{}.json", slug))
    }

    pub fn classes(&self) -> PathBuf {
        self.root.join("additive-classes.json")
    }

    pub fn history(&self, slug: &str) -> PathBuf {
        self.root.join("search-history").join(format!("{}.json", slug))
    }

    pub fn ingredients(&self) -> PathBuf {
        self.root.join("ingredients.json")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub title: String,
    #[serde(default)]
    pub e_number: String,
    pub slug: String,
}

/// One additive property file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueEntry {
    pub slug: String,
    pub title: String,
    pub e_number: String,
    pub synonyms: Vec<String>,
    pub functions: Vec<String>,
    pub description: String,
    pub wikipedia: String,
    pub wikidata: String,
    pub search_volume: Option<i64>,
    pub search_rank: Option<u32>,
    pub search_sparkline: Vec<Option<i64>>,
}

impl CatalogueEntry {
    pub fn from_entity(entity: &NormalizedEntity, dataset: &Dataset) -> Self {
        CatalogueEntry {
            slug: entity.slug.clone(),
            title: entity.display_name.clone(),
            e_number: entity.code.clone().unwrap_or_default(),
            synonyms: entity.synonyms.clone(),
            functions: dataset.class_names(entity),
            description: entity.description.clone().unwrap_or_default(),
            wikipedia: entity.wikipedia_url.clone().unwrap_or_default(),
            wikidata: entity.wikidata_id.clone().unwrap_or_default(),
            search_volume: None,
            search_rank: entity.rank,
            search_sparkline: Vec::new(),
        }
    }

    /// Read leniently: a missing or wrong-typed field becomes its empty
    /// value instead of failing the whole file.
    pub fn from_value(value: &Value) -> Self {
        CatalogueEntry {
            slug: text(value, "slug"),
            title: text(value, "title"),
            e_number: text(value, "eNumber"),
            synonyms: texts(value, "synonyms"),
            functions: texts(value, "functions"),
            description: text(value, "description"),
            wikipedia: text(value, "wikipedia"),
            wikidata: text(value, "wikidata"),
            search_volume: value.get("searchVolume").and_then(Value::as_i64),
            search_rank: value
                .get("searchRank")
                .and_then(Value::as_u64)
                .and_then(|r| u32::try_from(r).ok())
                .filter(|r| *r > 0),
            search_sparkline: value
                .get("searchSparkline")
                .and_then(Value::as_array)
                .map(|points| points.iter().map(Value::as_i64).collect())
                .unwrap_or_default(),
        }
    }

    pub fn index_entry(&self) -> IndexEntry {
        IndexEntry {
            title: self.title.clone(),
            e_number: self.e_number.clone(),
            slug: self.slug.clone(),
        }
    }

    /// Keep demand numbers gathered by earlier runs.
    pub fn carry_search_metrics(&mut self, previous: &CatalogueEntry) {
        if self.search_volume.is_none() {
            self.search_volume = previous.search_volume;
        }
        if self.search_rank.is_none() {
            self.search_rank = previous.search_rank;
        }
        if self.search_sparkline.is_empty() {
            self.search_sparkline = previous.search_sparkline.clone();
        }
    }
}

fn text(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn texts(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHistory {
    pub keyword: String,
    pub country: String,
    pub fetched_at: DateTime<Utc>,
    pub metrics: Vec<VolumePoint>,
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, format!("{}\n", json))
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_index(paths: &DataPaths) -> Result<Vec<IndexEntry>> {
    let path = paths.index();
    let json = fs::read_to_string(&path).with_context(|| {
        format!(
            "Failed to read {} (run 'fetch-additives' first)",
            path.display()
        )
    })?;
    serde_json::from_str(&json).with_context(|| format!("Invalid index {}", path.display()))
}

pub fn write_index(paths: &DataPaths, index: &[IndexEntry]) -> Result<()> {
    write_json(&paths.index(), index)
}

/// `Ok(None)` when the property file does not exist or is not JSON.
pub fn read_entry(paths: &DataPaths, slug: &str) -> Result<Option<CatalogueEntry>> {
    let path = paths.entry(slug);
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    match serde_json::from_str::<Value>(&json) {
        Ok(value) => Ok(Some(CatalogueEntry::from_value(&value))),
        Err(e) => {
            warn!("Ignoring unreadable property file {}: {}", path.display(), e);
            Ok(None)
        }
    }
}

pub fn write_entry(paths: &DataPaths, entry: &CatalogueEntry) -> Result<()> {
    write_json(&paths.entry(&entry.slug), entry)
}

/// Every indexed entry, in rank-then-name order. Entries whose property
/// file is missing are rebuilt from the index line.
pub fn read_catalogue(paths: &DataPaths) -> Result<Vec<CatalogueEntry>> {
    let index = read_index(paths)?;
    let mut entries = Vec::with_capacity(index.len());
    for line in index {
        let mut entry = match read_entry(paths, &line.slug)? {
            Some(entry) => entry,
            None => {
                debug!(slug = %line.slug, "no property file, using index entry");
                CatalogueEntry::default()
            }
        };
        if entry.slug.is_empty() {
            entry.slug = line.slug;
        }
        if entry.title.is_empty() {
            entry.title = line.title;
        }
        if entry.e_number.is_empty() {
            entry.e_number = line.e_number;
        }
        entries.push(entry);
    }
    sort_catalogue(&mut entries);
    Ok(entries)
}

pub fn sort_catalogue(entries: &mut [CatalogueEntry]) {
    entries.sort_by(|a, b| compare_ranked(a.search_rank, &a.title, b.search_rank, &b.title));
}

/// Property files plus the index, in the order given.
pub fn write_catalogue(paths: &DataPaths, entries: &[CatalogueEntry]) -> Result<()> {
    for entry in entries {
        write_entry(paths, entry)?;
    }
    let index: Vec<IndexEntry> = entries.iter().map(CatalogueEntry::index_entry).collect();
    write_index(paths, &index)
}

pub fn write_classes(paths: &DataPaths, classes: &[ClassEntity]) -> Result<()> {
    write_json(&paths.classes(), classes)
}

pub fn read_classes(paths: &DataPaths) -> Result<Vec<ClassEntity>> {
    let path = paths.classes();
    let json = fs::read_to_string(&path).with_context(|| {
        format!(
            "Failed to read {} (run 'fetch-additives' first)",
            path.display()
        )
    })?;
    serde_json::from_str(&json).with_context(|| format!("Invalid class list {}", path.display()))
}

pub fn write_history(paths: &DataPaths, slug: &str, history: &SearchHistory) -> Result<()> {
    write_json(&paths.history(slug), history)
}

pub fn write_ingredients<T: Serialize>(paths: &DataPaths, records: &[T]) -> Result<()> {
    write_json(&paths.ingredients(), records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(slug: &str, title: &str, rank: Option<u32>) -> CatalogueEntry {
        CatalogueEntry {
            slug: slug.into(),
            title: title.into(),
            search_rank: rank,
            ..CatalogueEntry::default()
        }
    }

    #[test]
    fn lenient_read_coerces_bad_fields() {
        let value = json!({
            "slug": "e330-citric-acid",
            "title": "Citric Acid",
            "eNumber": 330,
            "synonyms": ["E330", 7, "citric acid"],
            "functions": "Acid",
            "searchVolume": "lots",
            "searchRank": 0,
            "searchSparkline": [10, null, "x"]
        });
        let e = CatalogueEntry::from_value(&value);
        assert_eq!(e.title, "Citric Acid");
        assert_eq!(e.e_number, "");
        assert_eq!(e.synonyms, vec!["E330", "citric acid"]);
        assert!(e.functions.is_empty());
        assert_eq!(e.description, "");
        assert_eq!(e.search_volume, None);
        assert_eq!(e.search_rank, None);
        assert_eq!(e.search_sparkline, vec![Some(10), None, None]);

        assert_eq!(CatalogueEntry::from_value(&json!("nonsense")), CatalogueEntry::default());
    }

    #[test]
    fn previous_metrics_survive_rebuild() {
        let mut fresh = entry("sugar", "Sugar", None);
        let previous = CatalogueEntry {
            search_volume: Some(12000),
            search_rank: Some(4),
            search_sparkline: vec![Some(1), Some(2)],
            ..entry("sugar", "Old title", None)
        };
        fresh.carry_search_metrics(&previous);
        assert_eq!(fresh.title, "Sugar");
        assert_eq!(fresh.search_volume, Some(12000));
        assert_eq!(fresh.search_rank, Some(4));
        assert_eq!(fresh.search_sparkline.len(), 2);
    }

    #[test]
    fn catalogue_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());

        let entries = vec![
            entry("b", "Beta", None),
            entry("a", "alpha", None),
            entry("c", "Gamma", Some(1)),
        ];
        write_catalogue(&paths, &entries).unwrap();
        // index line without a property file
        fs::remove_file(paths.entry("b")).unwrap();

        let read = read_catalogue(&paths).unwrap();
        let titles: Vec<&str> = read.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Gamma", "alpha", "Beta"]);
        assert_eq!(read[2].slug, "b");

        assert!(read_entry(&paths, "missing").unwrap().is_none());
    }

    #[test]
    fn unreadable_property_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        fs::create_dir_all(paths.entry("x").parent().unwrap()).unwrap();
        fs::write(paths.entry("x"), "{ not json").unwrap();
        assert!(read_entry(&paths, "x").unwrap().is_none());
    }

    #[test]
    fn missing_index_mentions_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let err = read_catalogue(&paths).unwrap_err();
        assert!(format!("{:#}", err).contains("fetch-additives"));
    }

    #[test]
    fn history_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let history = SearchHistory {
            keyword: "citric acid".into(),
            country: "us".into(),
            fetched_at: Utc::now(),
            metrics: vec![VolumePoint {
                date: "2025-01-01".into(),
                volume: 900,
            }],
        };
        write_history(&paths, "e330-citric-acid", &history).unwrap();
        let raw = fs::read_to_string(dir.path().join("search-history/e330-citric-acid.json")).unwrap();
        let back: SearchHistory = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, history);
        assert!(raw.contains("fetchedAt"));
    }
}
