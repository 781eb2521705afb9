use anyhow::{bail, Context};
use bundle_report::core::Storage;
use bundle_report::utils::{logger, validation::Validate};
use bundle_report::{AppConfig, LabelRequest, LocalStorage};
use clap::Parser;

#[derive(Parser)]
#[command(name = "label-export")]
#[command(about = "Exports a printable label for the product or bundle with the given barcode")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long, env = "MOYSKLAD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[arg(long)]
    barcode: String,

    #[arg(long)]
    organization: String,

    #[arg(long)]
    price_type: String,

    #[arg(long)]
    template: String,

    /// Output file; defaults to <barcode>.pdf under report.output_path
    #[arg(short, long)]
    output: Option<String>,

    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config file '{}'", path))?,
        None => AppConfig::default(),
    };
    if let Some(token) = &args.token {
        config.api.token = token.clone();
    }
    config.validate().context("Configuration validation failed")?;

    let catalog = config.catalog_client()?;
    let request = LabelRequest {
        organization: args.organization,
        price_type: args.price_type,
        template: args.template,
        barcode: args.barcode,
    };

    let Some(label) = catalog.export_label_by_barcode(&request).await? else {
        bail!("no product or bundle with barcode \"{}\"", request.barcode);
    };

    let output = args
        .output
        .unwrap_or_else(|| format!("{}.pdf", request.barcode));
    let storage = LocalStorage::new(config.report.output_path.clone());
    storage.write_file(&output, &label).await?;

    tracing::info!("✅ Label saved ({} bytes)", label.len());
    println!("📁 Label saved to: {}/{}", storage.base_path(), output);
    Ok(())
}
