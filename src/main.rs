use bundle_report::utils::{logger, validation::Validate};
use bundle_report::{CliConfig, EtlEngine, LocalStorage, ReportError, ReportPipeline};
use clap::Parser;

fn fail(e: &ReportError) -> ! {
    tracing::error!(
        "❌ Report failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(e.exit_code().max(1));
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting bundle-report");

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => fail(&e),
    };
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        fail(&e);
    }
    if config.poll.enabled {
        tracing::info!("🔍 Waiting for stable listings before pricing");
    }

    let catalog = match config.catalog_client() {
        Ok(catalog) => catalog,
        Err(e) => fail(&e),
    };
    let storage = LocalStorage::new(config.report.output_path.clone());
    let pipeline = match ReportPipeline::new(storage, catalog, config) {
        Ok(pipeline) => pipeline,
        Err(e) => fail(&e),
    };

    match EtlEngine::new(pipeline).run().await {
        Ok(output_path) => {
            tracing::info!("✅ Report completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => fail(&e),
    }
}
