//! Raw Open Food Facts taxonomy records and the typed accessors used to
//! read their loosely-shaped language maps.

pub mod normalize;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Languages tried, in order, when a value exists in several locales.
/// `xx` is the taxonomy's "language-independent" bucket.
pub const LANGUAGE_PREFERENCE: [&str; 6] = ["en", "xx", "fr", "es", "de", "it"];

/// Whole taxonomy keyed by namespaced id (`en:e330`). Sorted keys keep
/// every downstream iteration reproducible.
pub type RawTaxonomy = BTreeMap<String, RawTaxonomyEntry>;

/// A taxonomy field value: a string, a list, or a locale map, nested
/// arbitrarily. Numbers and booleans land in `Other`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedValue {
    Text(String),
    List(Vec<LocalizedValue>),
    Map(BTreeMap<String, LocalizedValue>),
    Other(serde_json::Value),
}

impl LocalizedValue {
    /// First non-blank string, preferring `LANGUAGE_PREFERENCE` locales in
    /// maps and list order in lists.
    pub fn first_text(&self) -> Option<&str> {
        match self {
            LocalizedValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then_some(trimmed)
            }
            LocalizedValue::List(items) => items.iter().find_map(|v| v.first_text()),
            LocalizedValue::Map(map) => LANGUAGE_PREFERENCE
                .iter()
                .filter_map(|lang| map.get(*lang))
                .find_map(|v| v.first_text())
                .or_else(|| map.values().find_map(|v| v.first_text())),
            LocalizedValue::Other(_) => None,
        }
    }

    /// Value stored under one locale, if this is a locale map.
    pub fn locale(&self, lang: &str) -> Option<&LocalizedValue> {
        match self {
            LocalizedValue::Map(map) => map.get(lang),
            _ => None,
        }
    }

    /// The locale's first string, without falling back to other locales.
    pub fn text_in(&self, lang: &str) -> Option<&str> {
        self.locale(lang).and_then(|v| v.first_text())
    }

    /// Every string reachable from this value, English branches first.
    pub fn all_texts(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_texts(&mut out);
        out
    }

    fn collect_texts<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            LocalizedValue::Text(s) => {
                let trimmed = s.trim();
                if !trimmed.is_empty() {
                    out.push(trimmed);
                }
            }
            LocalizedValue::List(items) => items.iter().for_each(|v| v.collect_texts(out)),
            LocalizedValue::Map(map) => {
                if let Some(en) = map.get("en") {
                    en.collect_texts(out);
                }
                map.iter()
                    .filter(|(lang, _)| lang.as_str() != "en")
                    .for_each(|(_, v)| v.collect_texts(out));
            }
            LocalizedValue::Other(_) => {}
        }
    }

    /// `(locale, text)` pairs for a flat locale map; other shapes yield
    /// their strings tagged with `en`.
    pub fn locale_texts(&self) -> Vec<(&str, &str)> {
        match self {
            LocalizedValue::Map(map) => map
                .iter()
                .flat_map(|(lang, v)| v.all_texts().into_iter().map(move |t| (lang.as_str(), t)))
                .collect(),
            other => other.all_texts().into_iter().map(|t| ("en", t)).collect(),
        }
    }
}

/// One taxonomy record as published by Open Food Facts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTaxonomyEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synonyms: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additives_classes: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e_number: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikipedia: Option<LocalizedValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wikidata: Option<LocalizedValue>,
    /// Everything else (CIQUAL codes, carbon footprint, ranks, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl RawTaxonomyEntry {
    /// A pass-through attribute re-read as a language value.
    pub fn extra_localized(&self, key: &str) -> Option<LocalizedValue> {
        self.extra
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Text without a leading `xx:` namespace token.
pub fn local_segment(id: &str) -> &str {
    match id.split_once(':') {
        Some((ns, rest)) if is_namespace(ns) => rest.trim_start(),
        _ => id,
    }
}

fn is_namespace(token: &str) -> bool {
    (2..=3).contains(&token.len()) && token.chars().all(|c| c.is_ascii_alphabetic())
}

pub fn parse_taxonomy(json: &str) -> Result<RawTaxonomy> {
    serde_json::from_str(json).context("Failed to parse taxonomy JSON")
}

pub fn read_taxonomy(path: &Path) -> Result<RawTaxonomy> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read taxonomy file {}", path.display()))?;
    parse_taxonomy(&json).with_context(|| format!("in {}", path.display()))
}

pub fn write_taxonomy(path: &Path, taxonomy: &RawTaxonomy) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(taxonomy)?;
    std::fs::write(path, format!("{}\n", json))
        .with_context(|| format!("Failed to write {}", path.display()))
}
