mod ahrefs;
mod artifacts;
mod dataset;
mod enrichment;
mod error;
mod format;
mod http;
mod ingredients;
mod metrics;
mod openfoodfacts;
mod settings;
mod slug;
mod taxonomy;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::ahrefs::Ahrefs;
use crate::artifacts::{CatalogueEntry, DataPaths, SearchHistory};
use crate::dataset::additives;
use crate::enrichment::{Enricher, WikipediaSummaries};
use crate::format::{compact_number, number_with_separators};
use crate::openfoodfacts::OpenFoodFacts;
use crate::settings::Settings;

const HISTORY_REQUEST_DELAY: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "food_catalog", about = "Food additive and ingredient catalogue builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the additive taxonomy and write the catalogue
    FetchAdditives,
    /// Refresh monthly search volume and ranks (needs AHREFS_API_KEY)
    UpdateSearchVolume,
    /// Fetch ten-year search history and sparklines (needs AHREFS_API_KEY)
    FetchSearchHistory,
    /// Build the ingredient catalogue
    BuildIngredients,
    /// Additive table, ranked additives first
    List {
        /// Only additives with this function (name or slug, e.g. "emulsifier")
        #[arg(short, long)]
        class: Option<String>,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Additive classes with member counts, or one class's members
    Classes {
        /// Class slug, e.g. "emulsifier"
        slug: Option<String>,
    },
    /// One additive in full
    Show {
        slug: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load settings")?;
    info!(settings = ?settings, "Settings loaded");
    let paths = DataPaths::new(&settings.data_dir);

    let result = match cli.command {
        Commands::FetchAdditives => fetch_additives(&settings, &paths).await,
        Commands::UpdateSearchVolume => update_search_volume(&settings, &paths).await,
        Commands::FetchSearchHistory => fetch_search_history(&settings, &paths).await,
        Commands::BuildIngredients => build_ingredients(&settings, &paths).await,
        Commands::List { class, limit } => list(&paths, class.as_deref(), limit),
        Commands::Classes { slug: None } => classes(&paths),
        Commands::Classes { slug: Some(slug) } => class_members(&paths, &slug).await,
        Commands::Show { slug } => show(&paths, &slug),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn fetch_additives(settings: &Settings, paths: &DataPaths) -> anyhow::Result<()> {
    let off = OpenFoodFacts::new(settings.http_client()?, &settings.openfoodfacts_base_url);

    let ids = off
        .fetch_additive_ids()
        .await
        .context("Failed to list additives")?;
    println!("Fetching taxonomy for {} additives...", ids.len());
    let entries = off
        .fetch_additive_details(&ids)
        .await
        .context("Failed to fetch additive taxonomy")?;
    let raw_classes = off
        .fetch_taxonomy(&settings.additive_classes_url)
        .await
        .context("Failed to fetch additive classes")?;

    taxonomy::write_taxonomy(&paths.additives_taxonomy(), &entries)?;
    taxonomy::write_taxonomy(&paths.classes_taxonomy(), &raw_classes)?;

    let mut catalogue = additives::catalogue(paths).await?;
    let mut carried = 0usize;
    for entry in &mut catalogue {
        if let Some(previous) = artifacts::read_entry(paths, &entry.slug)? {
            entry.carry_search_metrics(&previous);
            carried += 1;
        }
    }
    artifacts::sort_catalogue(&mut catalogue);
    artifacts::write_catalogue(paths, &catalogue)?;

    let classes = additives::classes(paths).await?;
    artifacts::write_classes(paths, &classes)?;

    println!(
        "Saved {} additives ({} kept earlier search data) and {} classes to {}",
        catalogue.len(),
        carried,
        classes.len(),
        paths.root().display()
    );
    Ok(())
}

async fn update_search_volume(settings: &Settings, paths: &DataPaths) -> anyhow::Result<()> {
    let key = settings.require_ahrefs_key()?;
    let mut catalogue = artifacts::read_catalogue(paths)?;
    if catalogue.is_empty() {
        println!("No additives. Run 'fetch-additives' first.");
        return Ok(());
    }
    let ahrefs = Ahrefs::new(settings.http_client()?, &settings.ahrefs_base_url, key, &settings.country);

    println!("Fetching search volume for {} additives...", catalogue.len());
    let titles: Vec<String> = catalogue.iter().map(|e| e.title.clone()).collect();
    let volumes = ahrefs.search_volumes(&titles).await;
    let ranks = metrics::assign_ranks(&volumes);
    let by_title: HashMap<&str, Option<i64>> = volumes.iter().map(|(t, v)| (t.as_str(), *v)).collect();

    for entry in &mut catalogue {
        entry.search_volume = by_title.get(entry.title.as_str()).copied().flatten();
        entry.search_rank = ranks.get(&entry.title).copied();
    }
    artifacts::sort_catalogue(&mut catalogue);
    artifacts::write_catalogue(paths, &catalogue)?;

    let with_volume = catalogue.iter().filter(|e| e.search_volume.is_some()).count();
    println!(
        "Updated {} additives: {} with volume, {} ranked.",
        catalogue.len(),
        with_volume,
        ranks.len()
    );
    Ok(())
}

async fn fetch_search_history(settings: &Settings, paths: &DataPaths) -> anyhow::Result<()> {
    let key = settings.require_ahrefs_key()?;
    let mut catalogue = artifacts::read_catalogue(paths)?;
    if catalogue.is_empty() {
        println!("No additives. Run 'fetch-additives' first.");
        return Ok(());
    }
    let ahrefs = Ahrefs::new(settings.http_client()?, &settings.ahrefs_base_url, key, &settings.country);
    let today = Utc::now().date_naive();

    let pb = ProgressBar::new(catalogue.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (mut with_data, mut failed) = (0usize, 0usize);
    for entry in &mut catalogue {
        match ahrefs.volume_history(&entry.title).await {
            Ok(points) => {
                let kept = metrics::filter_last_ten_years(&points.unwrap_or_default(), today);
                entry.search_sparkline = metrics::yearly_average(&kept, today);
                if !kept.is_empty() {
                    with_data += 1;
                }
                let history = SearchHistory {
                    keyword: entry.title.clone(),
                    country: ahrefs.country().to_string(),
                    fetched_at: Utc::now(),
                    metrics: kept,
                };
                artifacts::write_history(paths, &entry.slug, &history)?;
            }
            Err(e) => {
                error!("History for {} failed: {}", entry.title, e);
                entry.search_sparkline = Vec::new();
                failed += 1;
            }
        }
        pb.inc(1);
        tokio::time::sleep(HISTORY_REQUEST_DELAY).await;
    }
    pb.finish_and_clear();

    artifacts::write_catalogue(paths, &catalogue)?;
    println!(
        "Search history: {} with data, {} without, {} failed.",
        with_data,
        catalogue.len() - with_data - failed,
        failed
    );
    Ok(())
}

async fn build_ingredients(settings: &Settings, paths: &DataPaths) -> anyhow::Result<()> {
    let http = settings.http_client()?;
    let off = OpenFoodFacts::new(http.clone(), &settings.openfoodfacts_base_url);
    let labels = metrics::month_labels(Utc::now().date_naive());

    let records = ingredients::ingredients(|| async {
        let taxonomy = ingredients::load_taxonomy(&off, &settings.ingredient_taxonomy_url).await?;
        let mut enricher = Enricher::new(WikipediaSummaries::new(http, &settings.summary_base_url));
        Ok(ingredients::select_ingredients(
            &taxonomy,
            &mut enricher,
            settings.target_ingredient_count,
            &labels,
        )
        .await)
    })
    .await?;

    artifacts::write_ingredients(paths, records.as_slice())?;
    println!(
        "Saved {} ingredients to {}",
        records.len(),
        paths.ingredients().display()
    );
    if records.len() < settings.target_ingredient_count {
        println!(
            "Only {} of {} wanted had a summary page with an image.",
            records.len(),
            settings.target_ingredient_count
        );
    }
    Ok(())
}

fn matches_class(entry: &CatalogueEntry, class: &str) -> bool {
    let wanted = slug::slugify(class);
    entry.functions.iter().any(|f| slug::slugify(f) == wanted)
}

fn list(paths: &DataPaths, class: Option<&str>, limit: usize) -> anyhow::Result<()> {
    let catalogue = artifacts::read_catalogue(paths)?;
    let rows: Vec<&CatalogueEntry> = catalogue
        .iter()
        .filter(|e| class.map_or(true, |c| matches_class(e, c)))
        .collect();
    if rows.is_empty() {
        println!("No additives found.");
        return Ok(());
    }

    println!(
        "{:>4} | {:<32} | {:<7} | {:>11} | {:<28}",
        "Rank", "Additive", "E no.", "Volume", "Functions"
    );
    println!("{}", "-".repeat(94));

    for e in rows.iter().take(limit) {
        let rank = e.search_rank.map(|r| r.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "{:>4} | {:<32} | {:<7} | {:>11} | {:<28}",
            rank,
            truncate(&e.title, 32),
            e.e_number,
            number_with_separators(e.search_volume),
            truncate(&e.functions.join(", "), 28)
        );
    }

    let total: i64 = rows.iter().filter_map(|e| e.search_volume).sum();
    println!(
        "\n{} additives (showing {}) | {} monthly searches | detail: show <slug>",
        rows.len(),
        rows.len().min(limit),
        compact_number(total)
    );
    Ok(())
}

fn classes(paths: &DataPaths) -> anyhow::Result<()> {
    let classes = artifacts::read_classes(paths)?;
    if classes.is_empty() {
        println!("No classes found.");
        return Ok(());
    }

    println!("{:<28} | {:<28} | {:>7}", "Class", "Slug", "Members");
    println!("{}", "-".repeat(70));
    for c in &classes {
        println!(
            "{:<28} | {:<28} | {:>7}",
            truncate(&c.name, 28),
            truncate(&c.slug, 28),
            c.members.len()
        );
    }
    println!("\n{} classes", classes.len());
    Ok(())
}

async fn class_members(paths: &DataPaths, slug: &str) -> anyhow::Result<()> {
    let Some((class, mut members)) = additives::class_members(paths, slug).await? else {
        bail!("No class with slug {:?} (see 'classes')", slug);
    };
    for entry in &mut members {
        if let Some(previous) = artifacts::read_entry(paths, &entry.slug)? {
            entry.carry_search_metrics(&previous);
        }
    }
    artifacts::sort_catalogue(&mut members);

    println!("{}", class.name);
    println!("{}", "=".repeat(class.name.chars().count()));
    if let Some(description) = &class.description {
        println!("{}\n", description);
    }
    for e in &members {
        println!(
            "{:<32} | {:<7} | {:>11}",
            truncate(&e.title, 32),
            e.e_number,
            number_with_separators(e.search_volume)
        );
    }
    println!("\n{} members", members.len());
    Ok(())
}

fn show(paths: &DataPaths, slug: &str) -> anyhow::Result<()> {
    let Some(e) = artifacts::read_entry(paths, slug)? else {
        bail!("No additive with slug {:?} (see 'list')", slug);
    };

    println!("{}", e.title);
    println!("{}", "=".repeat(e.title.chars().count()));
    if !e.e_number.is_empty() {
        println!("E number:   {}", e.e_number);
    }
    if !e.functions.is_empty() {
        println!("Functions:  {}", e.functions.join(", "));
    }
    if !e.synonyms.is_empty() {
        println!("Synonyms:   {}", e.synonyms.join(", "));
    }
    println!("Volume:     {}", number_with_separators(e.search_volume));
    if let Some(rank) = e.search_rank {
        println!("Rank:       #{}", rank);
    }
    if !e.search_sparkline.is_empty() {
        let points: Vec<String> = e
            .search_sparkline
            .iter()
            .map(|p| p.map(compact_number).unwrap_or_else(|| "·".into()))
            .collect();
        println!("10y trend:  {}", points.join(" "));
    }
    if !e.wikipedia.is_empty() {
        println!("Wikipedia:  {}", e.wikipedia);
    }
    if !e.wikidata.is_empty() {
        println!("Wikidata:   {}", e.wikidata);
    }
    if !e.description.is_empty() {
        println!("\n{}", e.description);
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
