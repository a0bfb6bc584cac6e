//! Additive dataset, built once per process from the taxonomy snapshot
//! that `fetch-additives` writes. Callers get owned copies.

use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};

use super::store::DatasetStore;
use super::{build_dataset, ClassEntity, Dataset};
use crate::artifacts::{sort_catalogue, CatalogueEntry, DataPaths};
use crate::taxonomy::read_taxonomy;

static ADDITIVES: LazyLock<DatasetStore<Dataset>> = LazyLock::new(DatasetStore::new);

fn load_snapshot(paths: &DataPaths) -> Result<Dataset> {
    let entries = read_taxonomy(&paths.additives_taxonomy())
        .context("Additive taxonomy snapshot missing (run 'fetch-additives')")?;
    let classes = read_taxonomy(&paths.classes_taxonomy())
        .context("Additive class snapshot missing (run 'fetch-additives')")?;
    Ok(build_dataset(&entries, &classes))
}

async fn dataset(store: &DatasetStore<Dataset>, paths: &DataPaths) -> Result<Arc<Dataset>> {
    store.get_or_try_init(|| async { load_snapshot(paths) }).await
}

async fn catalogue_from(store: &DatasetStore<Dataset>, paths: &DataPaths) -> Result<Vec<CatalogueEntry>> {
    let ds = dataset(store, paths).await?;
    Ok(ds
        .entities()
        .iter()
        .map(|e| CatalogueEntry::from_entity(e, &ds))
        .collect())
}

async fn classes_from(store: &DatasetStore<Dataset>, paths: &DataPaths) -> Result<Vec<ClassEntity>> {
    Ok(dataset(store, paths).await?.classes().to_vec())
}

async fn class_members_from(
    store: &DatasetStore<Dataset>,
    paths: &DataPaths,
    slug: &str,
) -> Result<Option<(ClassEntity, Vec<CatalogueEntry>)>> {
    let ds = dataset(store, paths).await?;
    let Some(class) = ds.class(slug) else {
        return Ok(None);
    };
    let mut members: Vec<CatalogueEntry> = ds
        .members_of(class)
        .map(|e| CatalogueEntry::from_entity(e, &ds))
        .collect();
    sort_catalogue(&mut members);
    Ok(Some((class.clone(), members)))
}

/// Published additives as catalogue entries, in sort order.
pub async fn catalogue(paths: &DataPaths) -> Result<Vec<CatalogueEntry>> {
    catalogue_from(&ADDITIVES, paths).await
}

/// Classes with at least one member, sorted by name.
pub async fn classes(paths: &DataPaths) -> Result<Vec<ClassEntity>> {
    classes_from(&ADDITIVES, paths).await
}

/// One class by slug with its members as catalogue entries.
pub async fn class_members(paths: &DataPaths, slug: &str) -> Result<Option<(ClassEntity, Vec<CatalogueEntry>)>> {
    class_members_from(&ADDITIVES, paths, slug).await
}
