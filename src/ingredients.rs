//! Ingredient catalogue: the full ingredient taxonomy ranked by synthetic
//! search demand, kept only where a summary page with an image exists.

use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use crate::dataset::store::DatasetStore;
use crate::dataset::{build_dataset, NormalizedEntity};
use crate::enrichment::{Enricher, SummarySource};
use crate::format::format_taxonomy_id;
use crate::metrics::{build_metrics, generate_search_trend, total_searches, SearchMetrics, TrendPoint};
use crate::openfoodfacts::OpenFoodFacts;
use crate::taxonomy::{parse_taxonomy, LocalizedValue, RawTaxonomy, RawTaxonomyEntry};

static BUNDLED_SNAPSHOT: &str = include_str!("../data/ingredients-sample.json");

static INGREDIENTS: LazyLock<DatasetStore<Vec<IngredientRecord>>> = LazyLock::new(DatasetStore::new);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngredientAttribute {
    pub label: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientRecord {
    pub slug: String,
    pub original_id: String,
    pub display_name: String,
    pub super_ingredients: Vec<String>,
    pub description: Option<String>,
    pub wikipedia_url: Option<String>,
    pub wikidata_id: Option<String>,
    pub image_url: Option<String>,
    pub synonyms: Vec<String>,
    pub search: SearchMetrics,
    pub attributes: Vec<IngredientAttribute>,
}

/// Live ingredient taxonomy, or the bundled snapshot when it can't be
/// fetched.
pub async fn load_taxonomy(off: &OpenFoodFacts, url: &str) -> Result<RawTaxonomy> {
    match off.fetch_taxonomy(url).await {
        Ok(taxonomy) if !taxonomy.is_empty() => Ok(taxonomy),
        Ok(_) => {
            warn!("Ingredient taxonomy was empty, using bundled snapshot");
            bundled_taxonomy()
        }
        Err(e) => {
            warn!("Ingredient taxonomy unavailable ({}), using bundled snapshot", e);
            bundled_taxonomy()
        }
    }
}

fn bundled_taxonomy() -> Result<RawTaxonomy> {
    parse_taxonomy(BUNDLED_SNAPSHOT).context("Bundled ingredient snapshot is invalid")
}

/// Built once per process; every caller shares the same list.
pub async fn ingredients<F, Fut>(build: F) -> Result<Arc<Vec<IngredientRecord>>>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<IngredientRecord>>>,
{
    INGREDIENTS.get_or_try_init(build).await
}

struct Candidate<'a> {
    entity: &'a NormalizedEntity,
    trend: Vec<TrendPoint>,
    total: i64,
}

/// Rank `en:` ingredients by demand, enrich them one at a time in rank
/// order and keep the first `target` that have both a summary and an
/// image.
pub async fn select_ingredients<S: SummarySource>(
    taxonomy: &RawTaxonomy,
    enricher: &mut Enricher<S>,
    target: usize,
    month_labels: &[String],
) -> Vec<IngredientRecord> {
    // Only en: ids are published, so only they may claim slugs
    let english: RawTaxonomy = taxonomy
        .iter()
        .filter(|(id, _)| id.starts_with("en:"))
        .map(|(id, entry)| (id.clone(), entry.clone()))
        .collect();
    let dataset = build_dataset(&english, &RawTaxonomy::new());

    let mut candidates: Vec<Candidate> = dataset
        .entities()
        .iter()
        .map(|entity| {
            let trend = generate_search_trend(&entity.slug, month_labels);
            let total = total_searches(&trend);
            Candidate { entity, trend, total }
        })
        .collect();
    candidates.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.entity.slug.cmp(&b.entity.slug))
    });
    info!("{} ingredient candidates", candidates.len());

    let pb = ProgressBar::new(target.min(candidates.len()) as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut selected = Vec::new();
    for candidate in candidates {
        if selected.len() >= target {
            break;
        }
        let entity = candidate.entity;
        pb.set_message(entity.display_name.clone());
        let wiki = enricher
            .enrich(&entity.display_name, entity.wikipedia_url.as_deref())
            .await;
        if !wiki.is_publishable() {
            continue;
        }

        let raw = taxonomy.get(&entity.id);
        let metrics = build_metrics(candidate.trend, selected.len() as u32 + 1);
        selected.push(IngredientRecord {
            slug: entity.slug.clone(),
            original_id: entity.id.clone(),
            display_name: entity.display_name.clone(),
            super_ingredients: entity.parents.clone(),
            description: wiki.summary,
            wikipedia_url: wiki.canonical_url,
            wikidata_id: entity.wikidata_id.clone(),
            image_url: wiki.image_url,
            synonyms: entity.synonyms.clone(),
            search: metrics,
            attributes: raw.map(|r| build_attributes(r, entity)).unwrap_or_default(),
        });
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("Selected {} ingredients", selected.len());
    selected
}

/// Labelled fact rows for the detail view. Non-English values carry their
/// locale, e.g. `Sucre blanc (fr)`.
pub fn build_attributes(raw: &RawTaxonomyEntry, entity: &NormalizedEntity) -> Vec<IngredientAttribute> {
    let mut attributes = Vec::new();
    let mut push = |label: &str, values: Vec<String>| {
        if !values.is_empty() {
            attributes.push(IngredientAttribute {
                label: label.to_string(),
                values,
            });
        }
    };

    push("CIQUAL food name", localized_values(raw.extra_localized("ciqual_food_name"), true));
    push("CIQUAL food code", localized_values(raw.extra_localized("ciqual_food_code"), false));
    push(
        "Carbon footprint ingredient",
        localized_values(raw.extra_localized("carbon_footprint_fr_foodges_ingredient"), true),
    );
    push(
        "Carbon footprint (kg CO₂e/kg)",
        entity.carbon_footprint.map(|v| vec![v.to_string()]).unwrap_or_default(),
    );

    let listed = [
        ("additives_classes", raw.additives_classes.clone()),
        ("ingredients_processing", raw.extra_localized("ingredients_processing")),
        ("risk_level", raw.extra_localized("risk_level")),
    ];
    for (key, value) in listed {
        let values = value
            .map(|v| v.all_texts().into_iter().map(format_taxonomy_id).collect())
            .unwrap_or_default();
        push(&format_taxonomy_id(key), values);
    }

    push(
        "Synonyms",
        localized_values(raw.synonyms.clone(), true)
            .into_iter()
            .filter(|s| !s.eq_ignore_ascii_case(&entity.display_name))
            .collect(),
    );

    let children = raw
        .children
        .as_ref()
        .map(|c| c.all_texts().into_iter().map(format_taxonomy_id).collect())
        .unwrap_or_default();
    push("Notable sub-ingredients", children);

    attributes
}

fn localized_values(value: Option<LocalizedValue>, show_locale: bool) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    let mut pairs = value.locale_texts();
    // English first, then the other locales in key order
    pairs.sort_by_key(|(lang, _)| *lang != "en");
    for (lang, text) in pairs {
        let item = if show_locale && lang != "en" {
            format!("{} ({})", text, lang)
        } else {
            text.to_string()
        };
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
