use crate::core::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("Starting report run...");

        // Extract
        let phase = Instant::now();
        let records = self.pipeline.extract().await?;
        tracing::info!(
            "Extracted {} bundles in {:?}",
            records.len(),
            phase.elapsed()
        );

        // Transform
        let phase = Instant::now();
        let result = self.pipeline.transform(records).await?;
        tracing::info!(
            "Priced {} bundles ({} warnings) in {:?}",
            result.rows.len(),
            result.warnings.len(),
            phase.elapsed()
        );

        // Load
        let output_path = self.pipeline.load(result).await?;
        tracing::info!(
            "Output saved to: {} (total {:?})",
            output_path,
            started.elapsed()
        );

        Ok(output_path)
    }
}
