use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;

const USER_AGENT: &str = concat!("food_catalog/", env!("CARGO_PKG_VERSION"));

/// Runtime settings. Sources, lowest priority first: built-in defaults,
/// optional `catalog.toml`, `CATALOG_*` environment variables, then the
/// conventional `AHREFS_API_KEY` / `OPENFOODFACTS_IP` variables.
#[derive(Clone, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub openfoodfacts_base_url: String,
    pub ingredient_taxonomy_url: String,
    pub additive_classes_url: String,
    pub summary_base_url: String,
    pub ahrefs_base_url: String,
    pub ahrefs_api_key: Option<String>,
    pub openfoodfacts_ip: Option<String>,
    pub target_ingredient_count: usize,
    pub country: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("data"),
            openfoodfacts_base_url: "https://world.openfoodfacts.org".into(),
            ingredient_taxonomy_url:
                "https://static.openfoodfacts.org/data/taxonomies/ingredients.full.json".into(),
            additive_classes_url:
                "https://static.openfoodfacts.org/data/taxonomies/additives_classes.json".into(),
            summary_base_url: "https://en.wikipedia.org/api/rest_v1/page/summary".into(),
            ahrefs_base_url: "https://api.ahrefs.com".into(),
            ahrefs_api_key: None,
            openfoodfacts_ip: None,
            target_ingredient_count: 100,
            country: "us".into(),
        }
    }
}

// Hand-written so the API key never reaches the logs.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("data_dir", &self.data_dir)
            .field("openfoodfacts_base_url", &self.openfoodfacts_base_url)
            .field("ahrefs_api_key", &self.ahrefs_api_key.as_ref().map(|_| "<set>"))
            .field("openfoodfacts_ip", &self.openfoodfacts_ip)
            .field("target_ingredient_count", &self.target_ingredient_count)
            .field("country", &self.country)
            .finish_non_exhaustive()
    }
}

impl Settings {
    pub fn load() -> Result<Settings, ConfigError> {
        let d = Settings::default();
        let settings = Config::builder()
            .set_default("data_dir", d.data_dir.to_string_lossy().into_owned())?
            .set_default("openfoodfacts_base_url", d.openfoodfacts_base_url)?
            .set_default("ingredient_taxonomy_url", d.ingredient_taxonomy_url)?
            .set_default("additive_classes_url", d.additive_classes_url)?
            .set_default("summary_base_url", d.summary_base_url)?
            .set_default("ahrefs_base_url", d.ahrefs_base_url)?
            .set_default("target_ingredient_count", d.target_ingredient_count as i64)?
            .set_default("country", d.country)?
            .add_source(File::with_name("catalog").required(false))
            .add_source(Environment::with_prefix("CATALOG").try_parsing(true))
            .set_override_option("ahrefs_api_key", non_empty_env("AHREFS_API_KEY"))?
            .set_override_option("openfoodfacts_ip", non_empty_env("OPENFOODFACTS_IP"))?
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn require_ahrefs_key(&self) -> Result<&str, ConfigError> {
        self.ahrefs_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingCredential("AHREFS_API_KEY"))
    }

    /// Shared HTTP client. When `OPENFOODFACTS_IP` is set every Open Food
    /// Facts host we talk to resolves to that address.
    pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(addr) = self.pinned_address()? {
            for host in self.openfoodfacts_hosts() {
                builder = builder.resolve(&host, SocketAddr::new(addr, 443));
            }
        }
        Ok(builder.build()?)
    }

    fn pinned_address(&self) -> Result<Option<IpAddr>, ConfigError> {
        let Some(raw) = self.openfoodfacts_ip.as_deref().map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<IpAddr>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidHostOverride {
                value: raw.to_string(),
                reason: e.to_string(),
            })
    }

    fn openfoodfacts_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = [
            &self.openfoodfacts_base_url,
            &self.ingredient_taxonomy_url,
            &self.additive_classes_url,
        ]
        .iter()
        .filter_map(|url| reqwest::Url::parse(url).ok())
        .filter_map(|url| url.host_str().map(str::to_string))
        .filter(|host| host.ends_with("openfoodfacts.org"))
        .collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
