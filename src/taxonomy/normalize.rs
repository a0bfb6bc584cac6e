use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::{local_segment, LocalizedValue, RawTaxonomyEntry, LANGUAGE_PREFERENCE};
use crate::dataset::NormalizedEntity;
use crate::format::format_taxonomy_id;

/// Legacy "CODE - Name" prefix: a letter, digits, optional letter suffix.
static CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]\d+[A-Za-z]*$").unwrap());
static E_NUMBER_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[eE]\d+[a-zA-Z]*$").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

pub const MAX_SYNONYMS: usize = 6;
const CARBON_FOOTPRINT_KEY: &str = "carbon_footprint_fr_foodges_value";
const RANK_KEY: &str = "search_rank";
const WIKIPEDIA_ABSTRACT_KEY: &str = "wikipedia_abstract";
const WIKIPEDIA_URL_KEY: &str = "wikipedia_url";

/// Flatten one raw record into an English-preferring entity. Returns `None`
/// when no English display name can be derived. The slug is left empty for
/// the dataset builder to assign.
pub fn normalize<F>(id: &str, raw: &RawTaxonomyEntry, is_known_class: F) -> Option<NormalizedEntity>
where
    F: Fn(&str) -> bool,
{
    let english_raw = raw.name.as_ref().and_then(|n| n.text_in("en"));
    if english_raw.is_none() && !id.starts_with("en:") {
        return None;
    }

    let (name_code, display_name) = resolve_display_name(id, raw.name.as_ref(), english_raw)?;
    let code = name_code
        .or_else(|| raw.e_number.as_ref().and_then(|v| v.first_text()).and_then(format_e_number))
        .or_else(|| code_from_id(id));

    let synonyms = extract_synonyms(raw.synonyms.as_ref(), english_raw, &display_name);
    let class_ids = extract_classes(id, raw.additives_classes.as_ref(), is_known_class);

    let abstract_text = raw.extra_localized(WIKIPEDIA_ABSTRACT_KEY);
    let description = raw
        .description
        .as_ref()
        .and_then(|d| d.text_in("en"))
        .or_else(|| abstract_text.as_ref().and_then(|a| a.first_text()))
        .map(str::to_string);

    let parents = raw
        .parents
        .as_ref()
        .map(|p| p.all_texts().into_iter().map(format_taxonomy_id).collect())
        .unwrap_or_default();

    let url_field = raw.extra_localized(WIKIPEDIA_URL_KEY);
    let wikipedia_url = raw
        .wikipedia
        .as_ref()
        .and_then(|w| w.first_text())
        .or_else(|| url_field.as_ref().and_then(|w| w.first_text()))
        .map(|url| WHITESPACE_RE.replace_all(url, "_").into_owned());
    let wikidata_id = raw
        .wikidata
        .as_ref()
        .and_then(|w| w.first_text())
        .map(str::to_string);

    let carbon_footprint = raw.extra.get(CARBON_FOOTPRINT_KEY).and_then(coerce_number);
    let rank = raw.extra.get(RANK_KEY).and_then(coerce_rank);

    Some(NormalizedEntity {
        id: id.to_string(),
        slug: String::new(),
        display_name,
        code,
        synonyms,
        description,
        class_ids,
        parents,
        wikipedia_url,
        wikidata_id,
        carbon_footprint,
        rank,
    })
}

/// `(code from a "CODE - Name" prefix, display name)`.
fn resolve_display_name(
    id: &str,
    name: Option<&LocalizedValue>,
    english_raw: Option<&str>,
) -> Option<(Option<String>, String)> {
    let mut code = None;
    if let Some(english) = english_raw {
        match english.split_once(" - ") {
            Some((prefix, rest)) => {
                let prefix = prefix.trim();
                if CODE_RE.is_match(prefix) {
                    code = Some(prefix.to_uppercase());
                }
                let rest = rest.trim();
                if !rest.is_empty() {
                    return Some((code, rest.to_string()));
                }
            }
            None => return Some((None, english.to_string())),
        }
    }

    let fallback = name
        .and_then(non_english_name)
        .map(str::to_string)
        .unwrap_or_else(|| format_taxonomy_id(id).trim().to_string());
    (!fallback.is_empty()).then_some((code, fallback))
}

fn non_english_name(name: &LocalizedValue) -> Option<&str> {
    match name {
        LocalizedValue::Map(map) => LANGUAGE_PREFERENCE
            .iter()
            .skip(1)
            .find_map(|lang| map.get(*lang).and_then(|v| v.first_text()))
            .or_else(|| {
                map.iter()
                    .filter(|(lang, _)| lang.as_str() != "en")
                    .find_map(|(_, v)| v.first_text())
            }),
        other => other.first_text(),
    }
}

/// `e 330` / `330` / `E330` → `E330`.
fn format_e_number(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let clean = trimmed
        .strip_prefix(['e', 'E'])
        .unwrap_or(trimmed)
        .trim();
    (!clean.is_empty()).then(|| format!("E{}", clean.to_uppercase()))
}

fn code_from_id(id: &str) -> Option<String> {
    let segment = local_segment(id).trim();
    E_NUMBER_ID_RE
        .is_match(segment)
        .then(|| format!("E{}", segment[1..].to_uppercase()))
}

/// Alternate names from a raw string: `" - "` runs, then `;`, `,` and `/`.
fn split_alternates(text: &str) -> impl Iterator<Item = &str> {
    text.split(" - ")
        .flat_map(|part| part.split([';', ',', '/']))
        .map(|part| local_segment(part.trim()).trim())
        .filter(|part| !part.is_empty())
}

fn extract_synonyms(
    synonyms: Option<&LocalizedValue>,
    english_raw: Option<&str>,
    display_name: &str,
) -> Vec<String> {
    let display_lower = display_name.to_lowercase();
    let mut seen = HashSet::new();

    synonyms
        .map(|s| s.all_texts())
        .unwrap_or_default()
        .into_iter()
        .chain(english_raw)
        .flat_map(split_alternates)
        .filter(|s| s.to_lowercase() != display_lower)
        .filter(|s| seen.insert(*s))
        .take(MAX_SYNONYMS)
        .map(str::to_string)
        .collect()
}

/// `Acidity Regulator` → `en:acidity-regulator`; keeps explicit namespaces.
pub fn canonical_class_id(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return lowered;
    }
    let local = local_segment(&lowered);
    let namespace = if local.len() == lowered.len() {
        "en"
    } else {
        lowered.split(':').next().unwrap_or("en")
    };
    let local = WHITESPACE_RE.replace_all(local.trim(), "-");
    if local.is_empty() {
        return String::new();
    }
    format!("{}:{}", namespace, local)
}

fn extract_classes<F>(id: &str, classes: Option<&LocalizedValue>, is_known: F) -> Vec<String>
where
    F: Fn(&str) -> bool,
{
    let mut ids: Vec<String> = Vec::new();
    for text in classes.map(|c| c.all_texts()).unwrap_or_default() {
        for part in text.split(',') {
            let class_id = canonical_class_id(part);
            if class_id.is_empty() || ids.contains(&class_id) {
                continue;
            }
            ids.push(class_id);
        }
    }
    ids.retain(|class_id| {
        let known = is_known(class_id);
        if !known {
            debug!(entry = id, class = %class_id, "dropping unresolved class reference");
        }
        known
    });
    ids
}

/// Numbers, numeric strings, or a language map holding either. Anything
/// non-finite or of another type is `None`.
pub fn coerce_number(value: &serde_json::Value) -> Option<f64> {
    use serde_json::Value;
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Object(map) => map
            .get("en")
            .and_then(coerce_number)
            .or_else(|| map.values().find_map(coerce_number)),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn coerce_rank(value: &serde_json::Value) -> Option<u32> {
    let n = coerce_number(value)?;
    (n >= 1.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX)).then_some(n as u32)
}
