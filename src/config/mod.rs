use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ScrapeError;
use crate::logging::LoggingConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub scraping: ScrapingConfig,
    pub site: SiteConfig,
    pub normalizer: NormalizerConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Which page session implementation drives the site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Headless Chromium through playwright (cargo feature `browser`)
    Browser,
    /// Static fetches through reqwest; interactive steps are skipped
    Http,
}

impl FromStr for SessionBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "browser" => Ok(SessionBackend::Browser),
            "http" => Ok(SessionBackend::Http),
            _ => Err(anyhow::anyhow!("Invalid session backend: {}", s)),
        }
    }
}

impl std::fmt::Display for SessionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionBackend::Browser => write!(f, "browser"),
            SessionBackend::Http => write!(f, "http"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    pub backend: SessionBackend,
    /// Upper bound for every wait-for-element step
    pub timeout_seconds: u64,
    pub headless: bool,
    pub user_agent: String,
    /// Pause after clicks and navigations so scripts can settle
    pub settle_delay_ms: u64,
}

/// Site-specific selectors and addresses. Pure data, no logic depends on
/// the concrete strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    /// Direct search address, `{query}` is replaced by the encoded query
    pub search_url: String,
    pub search_input_selectors: Vec<String>,
    pub search_button_selector: String,
    pub first_result_selector: String,
    pub result_link_selector: String,
    /// Path fragment identifying the search results page
    pub search_path_marker: String,
    pub structured_data_selector: String,
    pub characteristics_tab_selector: String,
    pub all_characteristics_button_selector: String,
    pub all_characteristics_labels: Vec<String>,
    pub characteristics_containers: Vec<String>,
    pub expand_control_selector: String,
    pub row_selector: String,
    pub cell_selector: String,
    pub link_selector: String,
    pub review_count_selectors: Vec<String>,
    pub image_selector: String,
}

/// How keyword matches over characteristics keys are ranked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchOrder {
    /// First matching key in scrape order wins
    Insertion,
    /// Key containing the longest synonym wins, scrape order breaks ties
    Specificity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub match_order: MatchOrder,
    pub model_keys: Vec<String>,
    pub manufacturer_keys: Vec<String>,
    pub color_synonyms: Vec<String>,
    pub color_keys: Vec<String>,
    pub color_palette: Vec<String>,
    pub memory_synonyms: Vec<String>,
    pub memory_keys: Vec<String>,
    pub memory_pattern: String,
    pub screen_size_synonyms: Vec<String>,
    pub screen_size_keys: Vec<String>,
    pub screen_size_secondary: Vec<String>,
    pub resolution_synonyms: Vec<String>,
    pub resolution_keys: Vec<String>,
    pub resolution_secondary: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Intermediate JSON file, overwritten on every run
    pub results_path: PathBuf,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: get_data_directory().join("products.db"),
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            backend: if cfg!(feature = "browser") {
                SessionBackend::Browser
            } else {
                SessionBackend::Http
            },
            timeout_seconds: 25,
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            settle_delay_ms: 500,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://brain.com.ua/".to_string(),
            search_url: "https://brain.com.ua/ukr/search/?Search={query}".to_string(),
            search_input_selectors: strings(&[
                "input.quick-search-input",
                "header form input.quick-search-input",
                "header input[type='text']",
            ]),
            search_button_selector: "input.qsr-submit".to_string(),
            first_result_selector: ".br-pp.br-pp-ex.goods-block__item[data-pid]".to_string(),
            result_link_selector: "a[href*='/ukr/']".to_string(),
            search_path_marker: "/search".to_string(),
            structured_data_selector: "script[type=\"application/ld+json\"]".to_string(),
            characteristics_tab_selector: "a.scroll-to-element-after[href='#br-characteristics']".to_string(),
            all_characteristics_button_selector: "button.br-prs-button".to_string(),
            all_characteristics_labels: strings(&["Всі характеристики", "Приховати"]),
            characteristics_containers: strings(&["#br-pr-7", "#br-characteristics"]),
            expand_control_selector: "a[class*='more'], button[class*='more'], a[class*='expand'], button[class*='expand']".to_string(),
            row_selector: "div".to_string(),
            cell_selector: "span".to_string(),
            link_selector: "a".to_string(),
            review_count_selectors: strings(&[
                ".comments-average-rating-stars + .br-pp-r span",
                "span.forbid-click.reviews-count span",
            ]),
            image_selector: "img[src]".to_string(),
        }
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            match_order: MatchOrder::Insertion,
            model_keys: strings(&["Модель", "Model"]),
            manufacturer_keys: strings(&["Виробник", "Manufacturer"]),
            color_synonyms: strings(&["колір", "цвет", "color", "colour"]),
            color_keys: strings(&["Колір"]),
            color_palette: strings(&[
                "Black", "White", "Blue", "Pink", "Green", "Red", "Yellow", "Purple",
            ]),
            memory_synonyms: strings(&[
                "об'єм пам'яті",
                "вбудована пам'ять",
                "пам",
                "память",
                "memory",
                "storage",
            ]),
            memory_keys: strings(&["Вбудована пам'ять"]),
            memory_pattern: r"(?i)\b(\d+\s?(?:GB|TB|ГБ|ТБ))".to_string(),
            screen_size_synonyms: strings(&[
                "діагональ екрану",
                "діагональ",
                "диагональ",
                "screen",
                "display",
            ]),
            screen_size_keys: strings(&["Діагональ екрану"]),
            screen_size_secondary: strings(&["діагональ", "диагональ"]),
            resolution_synonyms: strings(&[
                "роздільна здатність",
                "роздільна",
                "разрешение",
                "resolution",
            ]),
            resolution_keys: strings(&["Роздільна здатність екрану"]),
            resolution_secondary: strings(&["розділь", "разреш"]),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_path: PathBuf::from("results").join("last_product.json"),
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file existed, defaults were written here
    Created(PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "loaded from {}", path.display()),
            Self::Created(path) => write!(f, "defaults written to {}", path.display()),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating it on first run.
    ///
    /// Runs before logging is set up, so the source is returned for the
    /// caller to report.
    pub async fn load() -> Result<(Self, ConfigSource)> {
        let config_path = get_config_path();

        let (mut config, source) = if config_path.exists() {
            let config = Self::read_file(&config_path).await?;
            (config, ConfigSource::File(config_path))
        } else {
            let config = Self::default();
            config.save_to(&config_path).await?;
            (config, ConfigSource::Created(config_path))
        };

        ConfigOverrides::apply(&mut config);
        config.validate()?;
        Ok((config, source))
    }

    /// Load configuration from a specific file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        let mut config = Self::read_file(path).await?;
        ConfigOverrides::apply(&mut config);
        config.validate()?;

        Ok((config, ConfigSource::File(path.to_path_buf())))
    }

    async fn read_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| ScrapeError::FileRead {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            tracing::error!("Failed to parse {}: {}", path.display(), e);
            ScrapeError::InvalidConfig {
                path: path.display().to_string(),
            }
        })?;
        Ok(config)
    }

    /// Write the configuration as TOML, creating parent directories
    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        tokio::fs::write(config_path, content)
            .await
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scraping.timeout_seconds == 0 {
            return Err(ScrapeError::config("Scraping timeout_seconds must be > 0").into());
        }

        if url::Url::parse(&self.site.base_url).is_err() {
            return Err(ScrapeError::config(format!(
                "Site base_url is not a valid URL: {}",
                self.site.base_url
            ))
            .into());
        }

        if !self.site.search_url.contains("{query}") {
            return Err(ScrapeError::config("Site search_url must contain {query}").into());
        }

        if self.site.search_input_selectors.is_empty() {
            return Err(ScrapeError::config("At least one search input selector must be configured").into());
        }

        if self.site.characteristics_containers.is_empty() {
            return Err(ScrapeError::config("At least one characteristics container must be configured").into());
        }

        if self.site.review_count_selectors.is_empty() {
            return Err(ScrapeError::config("At least one review count selector must be configured").into());
        }

        if let Err(e) = regex::Regex::new(&self.normalizer.memory_pattern) {
            return Err(ScrapeError::config(format!("Normalizer memory_pattern is invalid: {}", e)).into());
        }

        Ok(())
    }

    /// Per-step wait bound
    pub fn step_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scraping.timeout_seconds)
    }
}

/// Get the default data directory
fn get_data_directory() -> PathBuf {
    directories::ProjectDirs::from("ua", "brainscrape", "brain-scrape")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("data"))
}

/// Get the configuration file path
fn get_config_path() -> PathBuf {
    directories::ProjectDirs::from("ua", "brainscrape", "brain-scrape")
        .map(|dirs| dirs.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

/// Environment-based configuration overrides
pub struct ConfigOverrides;

impl ConfigOverrides {
    /// Apply environment variable overrides to configuration
    pub fn apply(config: &mut AppConfig) {
        if let Ok(db_path) = std::env::var("BRS_DB_PATH") {
            config.database.path = PathBuf::from(db_path);
        }

        if let Ok(backend) = std::env::var("BRS_BACKEND") {
            if let Ok(backend) = backend.parse::<SessionBackend>() {
                config.scraping.backend = backend;
            }
        }

        if let Ok(timeout) = std::env::var("BRS_TIMEOUT") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                config.scraping.timeout_seconds = timeout;
            }
        }

        if let Ok(headless) = std::env::var("BRS_HEADLESS") {
            config.scraping.headless = headless.to_lowercase() != "false";
        }

        if let Ok(results_path) = std::env::var("BRS_RESULTS_PATH") {
            config.output.results_path = PathBuf::from(results_path);
        }

        if let Ok(log_level) = std::env::var("BRS_LOG_LEVEL") {
            config.logging.level = log_level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.normalizer.match_order, MatchOrder::Insertion);
        assert_eq!(config.output.results_path, PathBuf::from("results/last_product.json"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [scraping]
            backend = "http"
            timeout_seconds = 5

            [normalizer]
            match_order = "specificity"
            "#,
        )
        .unwrap();

        assert_eq!(config.scraping.backend, SessionBackend::Http);
        assert_eq!(config.scraping.timeout_seconds, 5);
        assert_eq!(config.normalizer.match_order, MatchOrder::Specificity);
        assert_eq!(config.site.characteristics_containers[0], "#br-pr-7");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.scraping.timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.site.search_url = "https://brain.com.ua/search".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.normalizer.memory_pattern = "(\\d+".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Browser".parse::<SessionBackend>().unwrap(), SessionBackend::Browser);
        assert_eq!(" http ".parse::<SessionBackend>().unwrap(), SessionBackend::Http);
        assert!("selenium".parse::<SessionBackend>().is_err());
    }

    #[test]
    fn test_config_roundtrips_through_toml() {
        let config = AppConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.site.review_count_selectors, config.site.review_count_selectors);
        assert_eq!(parsed.normalizer.color_palette, config.normalizer.color_palette);
    }

    #[tokio::test]
    async fn test_config_file_round_trip_reports_source() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.scraping.timeout_seconds = 7;
        config.save_to(&path).await.unwrap();

        let (loaded, source) = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(source, ConfigSource::File(path.clone()));
        assert!(source.to_string().starts_with("loaded from"));
        if std::env::var("BRS_TIMEOUT").is_err() {
            assert_eq!(loaded.scraping.timeout_seconds, 7);
        }
    }

    #[tokio::test]
    async fn test_missing_config_file_is_a_read_error() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let err = AppConfig::load_from_file(temp_dir.path().join("absent.toml"))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScrapeError>(),
            Some(ScrapeError::FileRead { .. })
        ));
    }
}
