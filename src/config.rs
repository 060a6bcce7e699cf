use crate::error::{AppError, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "CEVENNES_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub http: HttpConfig,
    pub ai: AiConfig,
    pub geocoding: GeocodingConfig,
    pub region: RegionConfig,
    pub publish: PublishConfig,
    #[serde(skip)]
    pub secrets: Secrets,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// SQLite file; the in-memory store is used when absent.
    pub database_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub fetch_timeout_secs: u64,
    pub scrape_timeout_secs: u64,
    pub max_redirects: usize,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 15,
            scrape_timeout_secs: 10,
            max_redirects: 5,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            accept_language: "fr-FR,fr;q=0.9,en;q=0.7".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,
    pub timeout_secs: u64,
    pub base_url: String,
    /// Characters of rendered page text sent for URL extraction.
    pub url_text_limit: usize,
    /// Characters of raw HTML sent for social event pages.
    pub social_html_limit: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4-turbo".to_string(),
            timeout_secs: 30,
            base_url: "https://api.openai.com/v1".to_string(),
            url_text_limit: 12_000,
            social_html_limit: 15_000,
        }
    }
}

impl AiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub base_url: String,
    pub region_hint: String,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://maps.googleapis.com/maps/api/geocode/json".to_string(),
            region_hint: "Cévennes, France".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub fallback_lat: f64,
    pub fallback_lng: f64,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            fallback_lat: crate::constants::FALLBACK_LAT,
            fallback_lng: crate::constants::FALLBACK_LNG,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub repo: Option<String>,
    pub branch: String,
    pub events_path: String,
    pub actors_path: String,
    pub api_base_url: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            repo: None,
            branch: "main".to_string(),
            events_path: "data/events-data.json".to_string(),
            actors_path: "data/actors-data.json".to_string(),
            api_base_url: "https://api.github.com".to_string(),
        }
    }
}

/// Credentials read from the environment only, never from the config file.
#[derive(Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub google_maps_api_key: Option<String>,
    pub github_token: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("openai_api_key", &self.openai_api_key.is_some())
            .field("google_maps_api_key", &self.google_maps_api_key.is_some())
            .field("github_token", &self.github_token.is_some())
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            google_maps_api_key: non_empty_env("GOOGLE_MAPS_API_KEY"),
            github_token: non_empty_env("GITHUB_TOKEN"),
        }
    }
}

impl Config {
    /// Loads `config.toml` (or `$CEVENNES_CONFIG`) when present, then overlays the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            Config::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file '{path}': {e}"))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        self.secrets = Secrets::from_env();
        if let Some(repo) = non_empty_env("GITHUB_REPO") {
            self.publish.repo = Some(repo);
        }
        if let Some(path) = non_empty_env("DATABASE_PATH") {
            self.server.database_path = Some(path);
        }
        if let Some(port) = non_empty_env("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}
