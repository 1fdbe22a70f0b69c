extern crate log;
pub mod crs;
pub mod csv_input;
pub mod geofile;
pub mod pipeline;
pub mod spatial;
use crate::geofile::gdal_geofile::GdalBackend;
use crate::pipeline::config::Config;
use crate::pipeline::spatial_join::SpatialJoinOutcome;
use crate::pipeline::{run_pipeline, write_summary};
use anyhow::{anyhow, Context};
use clap::Parser;
use std::{fs::read_to_string, path::Path};

/// Convert CSV point records into a feature collection and optionally join them with an overlay.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input config file.
    #[arg(short, long)]
    config_filepath: String,
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    if !Path::new(&args.config_filepath).exists() {
        return Err(anyhow!("Config file {} not found", &args.config_filepath));
    }
    let config_contents = read_to_string(&args.config_filepath)?;
    let config: Config = serde_yaml::from_str(&config_contents)
        .with_context(|| format!("Parsing config file {}", &args.config_filepath))?;

    log::info!(
        "Using {} driver for collections in {:?}",
        config.driver.name(),
        config.data_dir
    );
    let mut backend = GdalBackend::new(&config.data_dir, config.driver);
    let summary = run_pipeline(&mut backend, &config)?;

    match &summary.spatial_join {
        Some(SpatialJoinOutcome::NoMatches) => {
            log::info!("No features matched spatial and attribute criteria")
        }
        Some(SpatialJoinOutcome::Matched {
            matched,
            collection,
            ..
        }) => log::info!("{} matched features written to '{}'", matched, collection),
        None => {}
    }

    if let Some(summary_path) = &config.summary_path {
        let summary_filepath = config.data_dir.join(summary_path);
        log::info!("Writing run summary to {:?}", summary_filepath);
        write_summary(&summary, &summary_filepath)?;
    }
    log::info!("Done");
    Ok(())
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}
