pub mod config;
pub mod ingest;
pub mod report;
pub mod spatial_join;

use std::{fs, path::Path};

use anyhow::Context;
use serde::Serialize;

use crate::geofile::backend::SpatialBackend;

use self::{
    config::Config,
    ingest::{ingest_csv, IngestSummary},
    spatial_join::{run_spatial_join, SpatialJoinOutcome},
};

/// Everything a run produced, written as YAML when `summary_path` is configured.
#[derive(Serialize, Debug)]
pub struct RunSummary {
    pub ingest: IngestSummary,
    pub spatial_join: Option<SpatialJoinOutcome>,
}

/// Ingest the CSV file, then run the spatial join when one is configured.
pub fn run_pipeline<B: SpatialBackend + ?Sized>(
    backend: &mut B,
    config: &Config,
) -> anyhow::Result<RunSummary> {
    let ingest = ingest_csv(backend, &config.ingest, &config.data_dir)?;
    let spatial_join = match &config.spatial_join {
        Some(spatial_join) => Some(run_spatial_join(
            backend,
            &config.ingest.output_path,
            spatial_join,
            config.ingest.projection_reference.as_ref(),
            &config.data_dir,
        )?),
        None => None,
    };
    Ok(RunSummary {
        ingest,
        spatial_join,
    })
}

pub fn write_summary(summary: &RunSummary, output_filepath: &Path) -> anyhow::Result<()> {
    let contents = serde_yaml::to_string(summary)?;
    fs::write(output_filepath, contents)
        .with_context(|| format!("Writing run summary to {:?}", output_filepath))
}
