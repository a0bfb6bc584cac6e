//! Turns raw taxonomies into the sorted, slugged, cross-referenced dataset
//! the catalogue commands publish.

pub mod additives;
pub mod store;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::format::format_taxonomy_id;
use crate::slug::{derive_slug, slugify, SlugAllocator};
use crate::taxonomy::normalize::normalize;
use crate::taxonomy::{local_segment, RawTaxonomy, RawTaxonomyEntry, LANGUAGE_PREFERENCE};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEntity {
    pub id: String,
    pub slug: String,
    pub display_name: String,
    pub code: Option<String>,
    pub synonyms: Vec<String>,
    pub description: Option<String>,
    pub class_ids: Vec<String>,
    pub parents: Vec<String>,
    pub wikipedia_url: Option<String>,
    pub wikidata_id: Option<String>,
    pub carbon_footprint: Option<f64>,
    pub rank: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassEntity {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    /// Slugs of the entities referencing this class
    pub members: Vec<String>,
}

/// Finished dataset. Entities and classes are in published order; the
/// index maps give O(1) lookups in both directions.
#[derive(Debug, Default)]
pub struct Dataset {
    entities: Vec<NormalizedEntity>,
    classes: Vec<ClassEntity>,
    entity_by_slug: HashMap<String, usize>,
    class_by_slug: HashMap<String, usize>,
    class_by_id: HashMap<String, usize>,
}

impl Dataset {
    pub fn entities(&self) -> &[NormalizedEntity] {
        &self.entities
    }

    pub fn classes(&self) -> &[ClassEntity] {
        &self.classes
    }

    pub fn entity(&self, slug: &str) -> Option<&NormalizedEntity> {
        self.entity_by_slug.get(slug).map(|&i| &self.entities[i])
    }

    pub fn class(&self, slug: &str) -> Option<&ClassEntity> {
        self.class_by_slug.get(slug).map(|&i| &self.classes[i])
    }

    pub fn class_by_id(&self, id: &str) -> Option<&ClassEntity> {
        self.class_by_id.get(id).map(|&i| &self.classes[i])
    }

    /// Member entities, in the order they were slugged.
    pub fn members_of<'a>(&'a self, class: &'a ClassEntity) -> impl Iterator<Item = &'a NormalizedEntity> {
        class.members.iter().filter_map(|slug| self.entity(slug))
    }

    /// Class display names for an entity, in reference order.
    pub fn class_names(&self, entity: &NormalizedEntity) -> Vec<String> {
        entity
            .class_ids
            .iter()
            .filter_map(|id| self.class_by_id(id))
            .map(|c| c.name.clone())
            .collect()
    }
}

/// Build the dataset: classes first, then entities (normalized in parallel,
/// slugged sequentially in id order), then sort and prune.
pub fn build_dataset(entries: &RawTaxonomy, raw_classes: &RawTaxonomy) -> Dataset {
    let mut class_map = build_classes(raw_classes);

    let normalized: Vec<NormalizedEntity> = entries
        .par_iter()
        .filter_map(|(id, raw)| normalize(id, raw, |class_id| class_map.contains_key(class_id)))
        .collect();

    let dropped = entries.len() - normalized.len();
    if dropped > 0 {
        debug!(dropped, "entries without an English display name");
    }

    // par_iter over a BTreeMap keeps id order in the collected Vec
    let mut allocator = SlugAllocator::new();
    let mut entities = Vec::with_capacity(normalized.len());
    for mut entity in normalized {
        let base = derive_slug(entity.code.as_deref(), Some(&entity.display_name))
            .unwrap_or_else(|_| slugify(local_segment(&entity.id)));
        entity.slug = allocator.assign(&base);
        for class_id in &entity.class_ids {
            if let Some(class) = class_map.get_mut(class_id) {
                class.members.push(entity.slug.clone());
            }
        }
        entities.push(entity);
    }

    sort_entities(&mut entities);

    let mut classes: Vec<ClassEntity> = class_map
        .into_values()
        .filter(|c| !c.members.is_empty())
        .collect();
    classes.sort_by(|a, b| compare_names(&a.name, &b.name));

    info!(entities = entities.len(), classes = classes.len(), "dataset built");
    Dataset::from_parts(entities, classes)
}

impl Dataset {
    pub fn from_parts(entities: Vec<NormalizedEntity>, classes: Vec<ClassEntity>) -> Self {
        let entity_by_slug = entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.slug.clone(), i))
            .collect();
        let class_by_slug = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.slug.clone(), i))
            .collect();
        let class_by_id = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();
        Dataset {
            entities,
            classes,
            entity_by_slug,
            class_by_slug,
            class_by_id,
        }
    }
}

fn build_classes(raw_classes: &RawTaxonomy) -> BTreeMap<String, ClassEntity> {
    let mut allocator = SlugAllocator::new();
    raw_classes
        .iter()
        .map(|(id, raw)| {
            let name = class_name(id, raw);
            let mut base = slugify(&name);
            if base.is_empty() {
                base = slugify(local_segment(id));
            }
            let class = ClassEntity {
                id: id.clone(),
                slug: allocator.assign(&base),
                name,
                description: raw
                    .description
                    .as_ref()
                    .and_then(|d| d.text_in("en"))
                    .map(str::to_string),
                members: Vec::new(),
            };
            (id.clone(), class)
        })
        .collect()
}

fn class_name(id: &str, raw: &RawTaxonomyEntry) -> String {
    raw.name
        .as_ref()
        .and_then(|n| {
            LANGUAGE_PREFERENCE
                .iter()
                .find_map(|lang| n.text_in(lang))
                .or_else(|| n.first_text())
        })
        .map(str::to_string)
        .unwrap_or_else(|| format_taxonomy_id(id))
}

/// Ranked entities first (ascending rank), then unranked; ties and the
/// unranked tail by name.
pub fn sort_entities(entities: &mut [NormalizedEntity]) {
    entities.sort_by(|a, b| compare_ranked(a.rank, &a.display_name, b.rank, &b.display_name));
}

pub fn compare_ranked(a_rank: Option<u32>, a_name: &str, b_rank: Option<u32>, b_name: &str) -> Ordering {
    match (a_rank, b_rank) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| compare_names(a_name, b_name)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => compare_names(a_name, b_name),
    }
}

/// Case- and accent-insensitive ordering with a byte-wise tiebreak so the
/// result is total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

fn collation_key(s: &str) -> String {
    s.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::parse_taxonomy;
    use std::collections::HashSet;

    fn entity(name: &str, rank: Option<u32>) -> NormalizedEntity {
        NormalizedEntity {
            id: format!("en:{}", slugify(name)),
            slug: slugify(name),
            display_name: name.to_string(),
            code: None,
            synonyms: vec![],
            description: None,
            class_ids: vec![],
            parents: vec![],
            wikipedia_url: None,
            wikidata_id: None,
            carbon_footprint: None,
            rank,
        }
    }

    fn sample() -> (RawTaxonomy, RawTaxonomy) {
        let entries = parse_taxonomy(
            r#"{
                "en:e330": {"name": {"en": "E330 - Citric Acid"}, "additives_classes": {"en": "en:acid"}},
                "en:e300": {"name": {"en": "E300 - Ascorbic acid"}, "additives_classes": {"en": "en:antioxidant, en:acid"}},
                "en:sugar-a": {"name": {"en": "Sugar"}},
                "en:sugar-b": {"name": {"en": "Sugar"}},
                "en:sugar-c": {"name": {"en": "Sugar"}},
                "fr:sel": {"name": {"fr": "Sel"}},
                "en:mystery": {"additives_classes": {"en": "en:nonexistent"}}
            }"#,
        )
        .unwrap();
        let classes = parse_taxonomy(
            r#"{
                "en:acid": {"name": {"en": "Acid"}, "description": {"en": "Acids"}},
                "en:antioxidant": {"name": {"en": "Antioxidant"}},
                "en:colour": {"name": {"en": "Colour"}}
            }"#,
        )
        .unwrap();
        (entries, classes)
    }

    #[test]
    fn builds_entities_with_unique_slugs() {
        let (entries, classes) = sample();
        let ds = build_dataset(&entries, &classes);

        // fr:sel has no English name
        assert_eq!(ds.entities().len(), 6);
        let slugs: HashSet<&str> = ds.entities().iter().map(|e| e.slug.as_str()).collect();
        assert_eq!(slugs.len(), ds.entities().len());

        assert_eq!(ds.entity("e330-citric-acid").unwrap().code.as_deref(), Some("E330"));
        // sugar-a, sugar-b, sugar-c iterate in id order
        assert_eq!(ds.entity("sugar").unwrap().id, "en:sugar-a");
        assert_eq!(ds.entity("sugar-2").unwrap().id, "en:sugar-b");
        assert_eq!(ds.entity("sugar-3").unwrap().id, "en:sugar-c");
    }

    #[test]
    fn classes_are_back_referenced_and_pruned() {
        let (entries, classes) = sample();
        let ds = build_dataset(&entries, &classes);

        let names: Vec<&str> = ds.classes().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Acid", "Antioxidant"]);

        let acid = ds.class("acid").unwrap();
        assert_eq!(acid.id, "en:acid");
        assert_eq!(acid.description.as_deref(), Some("Acids"));
        let mut members: Vec<&str> = acid.members.iter().map(String::as_str).collect();
        members.sort();
        assert_eq!(members, vec!["e300-ascorbic-acid", "e330-citric-acid"]);
        assert_eq!(ds.members_of(acid).count(), 2);

        let mystery = ds.entities().iter().find(|e| e.id == "en:mystery").unwrap();
        assert!(mystery.class_ids.is_empty());

        let ascorbic = ds.entity("e300-ascorbic-acid").unwrap();
        assert_eq!(ds.class_names(ascorbic), vec!["Antioxidant", "Acid"]);
    }

    #[test]
    fn build_is_deterministic() {
        let (entries, classes) = sample();
        let a = build_dataset(&entries, &classes);
        let b = build_dataset(&entries, &classes);
        assert_eq!(a.entities(), b.entities());
        assert_eq!(a.classes(), b.classes());
    }

    #[test]
    fn ranked_before_unranked_then_by_name() {
        let mut list = vec![entity("B", None), entity("A", Some(5)), entity("C", Some(5))];
        sort_entities(&mut list);
        let names: Vec<&str> = list.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["A", "C", "B"]);

        let mut list = vec![entity("z", Some(2)), entity("y", None), entity("x", Some(1)), entity("a", None)];
        sort_entities(&mut list);
        let names: Vec<&str> = list.iter().map(|e| e.display_name.as_str()).collect();
        assert_eq!(names, vec!["x", "z", "a", "y"]);
    }

    #[test]
    fn names_compare_case_and_accent_insensitively() {
        let mut names = vec!["beta", "Alpha", "émulsifier", "Zinc", "acid"];
        names.sort_by(|a, b| compare_names(a, b));
        assert_eq!(names, vec!["acid", "Alpha", "beta", "émulsifier", "Zinc"]);
    }
}
