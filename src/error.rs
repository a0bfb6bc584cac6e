use thiserror::Error;

/// Slug derivation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("unable to derive slug without a code or title")]
    InvalidInput,
}

/// Errors from a single upstream HTTP call.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection, TLS or body read failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Body was not the JSON shape we expect
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::Status { status: 404, .. })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0} (set the {0} environment variable)")]
    MissingCredential(&'static str),

    #[error("invalid host override {value:?}: {reason}")]
    InvalidHostOverride { value: String, reason: String },

    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
