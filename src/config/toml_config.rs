use crate::adapters::catalog::{CatalogClient, DEFAULT_BASE_URL, DEFAULT_PAGE_LIMIT};
use crate::adapters::http::{RetryPolicy, RetryingClient};
use crate::core::stable::StablePollOptions;
use crate::domain::model::Marketplace;
use crate::utils::error::{ReportError, Result};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub report: ReportConfig,
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: String,
    pub retry_count: u32,
    pub retry_pause_seconds: f64,
    pub page_limit: usize,
    pub timeout_seconds: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: String::new(),
            retry_count: 5,
            retry_pause_seconds: 5.0,
            page_limit: DEFAULT_PAGE_LIMIT,
            timeout_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Xlsx,
    Csv,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub fbo_price_type: String,
    pub output_path: String,
    /// `{timestamp}` is replaced with the local time of the run.
    pub filename_template: String,
    pub format: OutputFormat,
    /// `{id}` is replaced with the bundle UUID.
    pub edit_url_template: String,
    pub sku_warning_pattern: String,
    pub marketplaces: BTreeMap<Marketplace, Vec<String>>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            fbo_price_type: "Цена FBO".to_string(),
            output_path: "./output".to_string(),
            filename_template: "bundles_{timestamp}".to_string(),
            format: OutputFormat::Xlsx,
            edit_url_template: "https://online.moysklad.ru/app/#bundle/edit?id={id}".to_string(),
            sku_warning_pattern: "(?i)ртикул|sku".to_string(),
            marketplaces: default_marketplaces(),
        }
    }
}

fn default_marketplaces() -> BTreeMap<Marketplace, Vec<String>> {
    BTreeMap::from([
        (
            Marketplace::Ozon,
            vec!["Артикул Ozon".to_string(), "Артикул OZON".to_string()],
        ),
        (
            Marketplace::Wildberries,
            vec!["Артикул WB".to_string(), "Артикул Wildberries".to_string()],
        ),
        (
            Marketplace::YandexMarket,
            vec!["Артикул ЯМ".to_string(), "Артикул Яндекс Маркет".to_string()],
        ),
    ])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub enabled: bool,
    pub chunk: usize,
    pub max_tries: usize,
    pub retry_pause_seconds: f64,
    pub tolerance: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        let options = StablePollOptions::default();
        Self {
            enabled: false,
            chunk: options.chunk,
            max_tries: options.max_tries,
            retry_pause_seconds: options.retry_pause.as_secs_f64(),
            tolerance: options.tolerance,
        }
    }
}

impl AppConfig {
    /// Loads the configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ReportError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ReportError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` with the environment value; unknown variables are left as is.
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| ReportError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("api.base_url", &self.api.base_url)?;
        validation::validate_resolved("api.token", &self.api.token)?;
        if self.api.token.trim().is_empty() {
            return Err(ReportError::MissingConfigError {
                field: "api.token".to_string(),
            });
        }
        validation::validate_positive_number("api.retry_count", self.api.retry_count as usize, 1)?;
        validation::validate_range("api.retry_pause_seconds", self.api.retry_pause_seconds, 0.0, 600.0)?;
        validation::validate_range("api.page_limit", self.api.page_limit, 1, DEFAULT_PAGE_LIMIT)?;

        validation::validate_non_empty_string("report.fbo_price_type", &self.report.fbo_price_type)?;
        validation::validate_path("report.output_path", &self.report.output_path)?;
        validation::validate_non_empty_string(
            "report.filename_template",
            &self.report.filename_template,
        )?;
        validation::validate_regex("report.sku_warning_pattern", &self.report.sku_warning_pattern)?;
        for marketplace in Marketplace::ALL {
            let labels = self.report.marketplaces.get(&marketplace);
            if labels.map_or(true, |l| l.iter().all(|s| s.trim().is_empty())) {
                return Err(ReportError::InvalidConfigValueError {
                    field: "report.marketplaces".to_string(),
                    value: format!("{:?}", marketplace),
                    reason: "at least one attribute label is required".to_string(),
                });
            }
        }

        validation::validate_positive_number("poll.chunk", self.poll.chunk, 1)?;
        validation::validate_positive_number("poll.max_tries", self.poll.max_tries, self.poll.chunk)?;
        validation::validate_range("poll.retry_pause_seconds", self.poll.retry_pause_seconds, 0.0, 600.0)?;

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.api.retry_count,
            pause: Duration::from_secs_f64(self.api.retry_pause_seconds),
        }
    }

    pub fn poll_options(&self) -> StablePollOptions {
        StablePollOptions {
            chunk: self.poll.chunk,
            max_tries: self.poll.max_tries,
            retry_pause: Duration::from_secs_f64(self.poll.retry_pause_seconds),
            tolerance: self.poll.tolerance,
        }
    }

    /// One HTTP session for the whole run.
    pub fn catalog_client(&self) -> Result<CatalogClient> {
        let http = RetryingClient::with_bearer_token(
            &self.api.token,
            self.retry_policy(),
            self.api.timeout_seconds.map(Duration::from_secs),
        )?;
        Ok(CatalogClient::new(http, &self.api.base_url, self.api.page_limit))
    }

    pub fn output_filename(&self, now: chrono::DateTime<chrono::Local>) -> String {
        let stem = self
            .report
            .filename_template
            .replace("{timestamp}", &now.format("%Y-%m-%d_%H-%M-%S").to_string());
        let extension = self.report.format.extension();
        if stem.ends_with(&format!(".{}", extension)) {
            stem
        } else {
            format!("{}.{}", stem, extension)
        }
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_basic_toml_config() {
        let toml_content = r#"
[api]
token = "abc"
retry_count = 3
retry_pause_seconds = 0.5

[report]
fbo_price_type = "FBO"
format = "csv"

[report.marketplaces]
ozon = ["Ozon article"]
wildberries = ["WB article"]
yandex_market = ["YM article"]

[poll]
enabled = true
chunk = 2
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.api.token, "abc");
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.retry_policy().retries, 3);
        assert_eq!(config.retry_policy().pause, Duration::from_millis(500));
        assert_eq!(config.report.format, OutputFormat::Csv);
        assert_eq!(
            config.report.marketplaces[&Marketplace::YandexMarket],
            vec!["YM article".to_string()]
        );
        assert!(config.poll.enabled);
        assert_eq!(config.poll_options().chunk, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("BUNDLE_REPORT_TEST_TOKEN", "from-env");

        let toml_content = r#"
[api]
token = "${BUNDLE_REPORT_TEST_TOKEN}"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.api.token, "from-env");

        std::env::remove_var("BUNDLE_REPORT_TEST_TOKEN");
    }

    #[test]
    fn test_unresolved_token_fails_validation() {
        let toml_content = r#"
[api]
token = "${BUNDLE_REPORT_UNSET_TOKEN_VAR}"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ReportError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.api.token = "abc".to_string();
        assert!(config.validate().is_ok());

        config.api.base_url = "invalid-url".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.token = "abc".to_string();
        config.api.page_limit = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.token = "abc".to_string();
        config.report.marketplaces.remove(&Marketplace::Ozon);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_output_filename() {
        let mut config = AppConfig::default();
        let now = chrono::Local.with_ymd_and_hms(2024, 3, 1, 9, 5, 0).unwrap();
        assert_eq!(config.output_filename(now), "bundles_2024-03-01_09-05-00.xlsx");

        config.report.format = OutputFormat::Csv;
        config.report.filename_template = "kits.csv".to_string();
        assert_eq!(config.output_filename(now), "kits.csv");
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[api]\ntoken = \"file-token\"\npage_limit = 100\n")
            .unwrap();

        let config = AppConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.api.token, "file-token");
        assert_eq!(config.api.page_limit, 100);
    }
}
