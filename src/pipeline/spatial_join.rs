use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::{
    crs::crs_utils::ProjectionReference,
    geofile::backend::{create_collection_with_schema, InsertCursor, SpatialBackend},
    spatial::statistics::AggregateResult,
};

use super::{
    config::SpatialJoinConfig,
    report::{render_bar_chart, select_report_rows, ReportRow},
};

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SpatialJoinOutcome {
    /// Nothing intersected the overlay; no collection, statistic or chart was produced.
    NoMatches,
    Matched {
        matched: usize,
        collection: String,
        aggregate: AggregateResult,
        report_rows: Vec<ReportRow>,
        chart: Option<PathBuf>,
    },
}

/// Select the features of `primary` that intersect `config.overlay_path`, store them as
/// `config.output_path`, compute the configured statistic and render the optional chart.
pub fn run_spatial_join<B: SpatialBackend + ?Sized>(
    backend: &mut B,
    primary: &str,
    config: &SpatialJoinConfig,
    projection: Option<&ProjectionReference>,
    data_dir: &Path,
) -> anyhow::Result<SpatialJoinOutcome> {
    log::info!(
        "Selecting features of '{}' intersecting '{}'",
        primary,
        config.overlay_path
    );
    let matched = backend
        .intersect(primary, &config.overlay_path)
        .with_context(|| format!("Intersecting '{}' with '{}'", primary, config.overlay_path))?;
    if matched.is_empty() {
        log::info!("No features matched the spatial criteria");
        return Ok(SpatialJoinOutcome::NoMatches);
    }

    if backend.exists(&config.output_path) {
        backend.delete_collection(&config.output_path)?;
        log::info!("Deleted existing collection '{}'", config.output_path);
    }
    create_collection_with_schema(backend, &config.output_path, &matched.schema, projection)
        .with_context(|| format!("Creating collection '{}'", config.output_path))?;
    let mut cursor = InsertCursor::new(backend, &config.output_path);
    for feature in &matched.features {
        cursor.insert(feature)?;
    }
    cursor.close()?;
    log::info!(
        "{} features that matched the criteria written to '{}'",
        matched.len(),
        config.output_path
    );

    let aggregate = backend.aggregate(
        &config.output_path,
        &config.aggregate.field,
        config.aggregate.statistic,
    )?;
    log::info!(
        "{} of '{}' over {} values: {:?}",
        aggregate.statistic,
        aggregate.field,
        aggregate.count,
        aggregate.value
    );

    let (report_rows, chart) = match &config.report {
        Some(report) => {
            let rows = select_report_rows(
                &matched,
                &report.label_field,
                &report.value_field,
                report.threshold,
            )?;
            let chart_filepath = data_dir.join(&report.output_path);
            render_bar_chart(&rows, report, &chart_filepath)?;
            (rows, Some(chart_filepath))
        }
        None => (Vec::new(), None),
    };

    Ok(SpatialJoinOutcome::Matched {
        matched: matched.len(),
        collection: config.output_path.clone(),
        aggregate,
        report_rows,
        chart,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rstest::rstest;
    use testdir::testdir;

    use crate::{
        geofile::{
            backend::SpatialBackend,
            feature::{AttributeValue, Feature, FeatureCollection},
            memory::MemoryBackend,
            schema::{FeatureSchema, FieldDefinition, FieldType},
        },
        pipeline::config::{AggregateConfig, ReportConfig, SpatialJoinConfig},
        spatial::statistics::Statistic,
    };

    use super::{run_spatial_join, SpatialJoinOutcome};

    fn covid_collection() -> FeatureCollection {
        let schema = FeatureSchema::new(vec![
            FieldDefinition::new("record_id", FieldType::Integer),
            FieldDefinition::new("cases", FieldType::Integer),
            FieldDefinition::new("country", FieldType::Text),
        ])
        .unwrap();
        let mut collection = FeatureCollection::new("covid.shp", schema, Vec::new());
        let rows = [
            ("Haiti", -72.3, 18.9, 5000),
            ("Cuba", -77.8, 21.5, 12000),
            ("Dominican Republic", -70.2, 18.7, 15000),
            ("Jamaica", -77.3, 18.1, 9999),
            ("Germany", 10.4, 51.2, 260000),
        ];
        for (id, (country, lon, lat, cases)) in rows.iter().enumerate() {
            collection.features.push(Feature::new(
                geo::Geometry::Point(geo::Point::new(*lon, *lat)),
                vec![
                    AttributeValue::Integer(id as i64),
                    AttributeValue::Integer(*cases),
                    AttributeValue::Text(country.to_string()),
                ],
            ));
        }
        collection
    }

    /// A hurricane swath covering the Greater Antilles, or an empty stretch of the Pacific.
    fn hurricane_collection(min: (f64, f64), max: (f64, f64)) -> FeatureCollection {
        let schema =
            FeatureSchema::new(vec![FieldDefinition::new("name", FieldType::Text)]).unwrap();
        let mut collection = FeatureCollection::new("hurricane.shp", schema, Vec::new());
        let swath = geo::Polygon::new(
            vec![
                (min.0, min.1),
                (max.0, min.1),
                (max.0, max.1),
                (min.0, max.1),
                (min.0, min.1),
            ]
            .into(),
            vec![],
        );
        collection.features.push(Feature::new(
            geo::Geometry::Polygon(swath),
            vec![AttributeValue::Text("Laura".to_string())],
        ));
        collection
    }

    fn join_config() -> SpatialJoinConfig {
        SpatialJoinConfig {
            overlay_path: "hurricane.shp".to_string(),
            output_path: "hurricane_cases.shp".to_string(),
            aggregate: AggregateConfig {
                field: "cases".to_string(),
                statistic: Statistic::Sum,
            },
            report: Some(ReportConfig {
                label_field: "country".to_string(),
                value_field: "cases".to_string(),
                threshold: 10_000.0,
                title: "Covid Countries Hit By The Hurricane".to_string(),
                output_path: PathBuf::from("covid_and_hurricane.html"),
            }),
        }
    }

    #[rstest]
    fn test_matched_features_are_materialized_summed_and_charted() {
        let data_dir = testdir!();
        let mut backend = MemoryBackend::new();
        backend.insert_collection(covid_collection());
        backend.insert_collection(hurricane_collection((-80.0, 17.0), (-68.0, 23.0)));

        let outcome =
            run_spatial_join(&mut backend, "covid.shp", &join_config(), None, &data_dir).unwrap();
        match outcome {
            SpatialJoinOutcome::Matched {
                matched,
                collection,
                aggregate,
                report_rows,
                chart,
            } => {
                assert_eq!(matched, 4);
                assert_eq!(collection, "hurricane_cases.shp");
                assert_eq!(aggregate.value, Some(41999.0));
                let labels: Vec<&str> = report_rows.iter().map(|row| row.label.as_str()).collect();
                assert_eq!(labels, vec!["Cuba", "Dominican Republic"]);
                assert!(chart.unwrap().exists());
            }
            SpatialJoinOutcome::NoMatches => panic!("Expected matches"),
        }
        assert_eq!(backend.read_collection("hurricane_cases.shp").unwrap().len(), 4);
    }

    #[rstest]
    fn test_previous_output_is_replaced() {
        let data_dir = testdir!();
        let mut backend = MemoryBackend::new();
        backend.insert_collection(covid_collection());
        backend.insert_collection(hurricane_collection((-80.0, 17.0), (-68.0, 23.0)));
        let mut stale = covid_collection();
        stale.name = "hurricane_cases.shp".to_string();
        backend.insert_collection(stale);

        run_spatial_join(&mut backend, "covid.shp", &join_config(), None, &data_dir).unwrap();
        assert_eq!(backend.read_collection("hurricane_cases.shp").unwrap().len(), 4);
    }

    #[rstest]
    fn test_empty_intersection_produces_nothing() {
        let data_dir = testdir!();
        let mut backend = MemoryBackend::new();
        backend.insert_collection(covid_collection());
        backend.insert_collection(hurricane_collection((-150.0, -10.0), (-140.0, 0.0)));

        let outcome =
            run_spatial_join(&mut backend, "covid.shp", &join_config(), None, &data_dir).unwrap();
        assert_eq!(outcome, SpatialJoinOutcome::NoMatches);
        assert!(!backend.exists("hurricane_cases.shp"));
        assert!(!data_dir.join("covid_and_hurricane.html").exists());
    }
}
