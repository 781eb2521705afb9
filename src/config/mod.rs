pub mod toml_config;

pub use toml_config::{AppConfig, OutputFormat};

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "bundle-report")]
#[command(about = "Exports bundles with their FBO and purchase prices to a spreadsheet")]
pub struct CliConfig {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    #[arg(long, env = "MOYSKLAD_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[arg(long)]
    pub output_path: Option<String>,

    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Wait until product and bundle listings stop changing
    #[arg(long)]
    pub stable: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub log_json: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Configuration file (or defaults) with command line overrides applied.
    pub fn load(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };

        if let Some(token) = &self.token {
            config.api.token = token.clone();
        }
        if let Some(output_path) = &self.output_path {
            config.report.output_path = output_path.clone();
        }
        if let Some(format) = self.format {
            config.report.format = format;
        }
        if self.stable {
            config.poll.enabled = true;
        }
        Ok(config)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let cli = CliConfig::parse_from([
            "bundle-report",
            "--token",
            "cli-token",
            "--format",
            "csv",
            "--output-path",
            "/tmp/reports",
            "--stable",
        ]);

        let config = cli.load().unwrap();
        assert_eq!(config.api.token, "cli-token");
        assert_eq!(config.report.format, OutputFormat::Csv);
        assert_eq!(config.report.output_path, "/tmp/reports");
        assert!(config.poll.enabled);
    }
}
