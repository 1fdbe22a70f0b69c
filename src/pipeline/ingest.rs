use std::path::Path;

use anyhow::Context;
use indicatif::ProgressBar;
use serde::Serialize;
use thiserror::Error;

use crate::{
    csv_input::reader::{CsvRecordReader, InputRecord, UnreadableRowError},
    geofile::{
        backend::{create_collection_with_schema, InsertCursor, SpatialBackend},
        feature::{AttributeValue, Feature},
        schema::{FieldDefinition, FieldType},
    },
};

use super::config::IngestConfig;

/// Why a single row was skipped.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowFailure {
    #[error("value for '{field}' is missing")]
    MissingValue { field: String },
    #[error("value '{value}' of '{field}' is not a number")]
    InvalidNumber { field: String, value: String },
    #[error("value '{value}' of '{field}' is not an integer")]
    InvalidInteger { field: String, value: String },
    #[error("value '{value}' of '{field}' is not a finite coordinate")]
    InvalidCoordinate { field: String, value: String },
    #[error("{message}")]
    Unreadable { message: String },
}

/// A row that could not be converted into a feature. The row is skipped, ingestion continues.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("row {row}: {failure}")]
pub struct RowParseError {
    pub row: usize,
    pub line: Option<u64>,
    pub failure: RowFailure,
}

impl From<UnreadableRowError> for RowParseError {
    fn from(err: UnreadableRowError) -> Self {
        Self {
            row: err.row,
            line: err.line,
            failure: RowFailure::Unreadable {
                message: err.message,
            },
        }
    }
}

/// Outcome of one ingestion pass.
#[derive(Serialize, Debug, Default, Clone, PartialEq)]
pub struct IngestSummary {
    pub collection: String,
    pub rows_read: usize,
    pub written: usize,
    pub skipped: usize,
    pub failures: Vec<RowParseError>,
}

impl IngestSummary {
    fn record_failure(&mut self, err: RowParseError) {
        log::warn!("Skipping {}", err);
        self.skipped += 1;
        self.failures.push(err);
    }
}

fn required_value<'a>(record: &'a InputRecord, column: &str) -> Result<&'a str, RowFailure> {
    match record.get(column).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(RowFailure::MissingValue {
            field: column.to_string(),
        }),
    }
}

fn parse_coordinate(record: &InputRecord, column: &str) -> Result<f64, RowFailure> {
    let value = required_value(record, column)?;
    match value.parse::<f64>() {
        Ok(coordinate) if coordinate.is_finite() => Ok(coordinate),
        _ => Err(RowFailure::InvalidCoordinate {
            field: column.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Integers may be written with a zero fraction, e.g. `1200.0`.
fn parse_integer(value: &str) -> Option<i64> {
    if let Ok(integer) = value.parse::<i64>() {
        return Some(integer);
    }
    let real = value.parse::<f64>().ok()?;
    if real.is_finite() && real.fract() == 0.0 && real.abs() < i64::MAX as f64 {
        Some(real as i64)
    } else {
        None
    }
}

/// Convert the raw CSV value of `column` into a value for `field`.
pub fn parse_attribute(
    record: &InputRecord,
    column: &str,
    field: &FieldDefinition,
) -> Result<AttributeValue, RowFailure> {
    let raw = match record.get(column) {
        Some(raw) => raw,
        None if field.nullable => return Ok(AttributeValue::Null),
        None => {
            return Err(RowFailure::MissingValue {
                field: column.to_string(),
            })
        }
    };
    if raw.trim().is_empty() {
        if field.nullable {
            return Ok(AttributeValue::Null);
        }
        if field.field_type != FieldType::Text {
            return Err(RowFailure::MissingValue {
                field: column.to_string(),
            });
        }
    }
    match field.field_type {
        FieldType::Text => Ok(AttributeValue::Text(raw.to_string())),
        FieldType::Real => raw
            .trim()
            .parse::<f64>()
            .map(AttributeValue::Real)
            .map_err(|_| RowFailure::InvalidNumber {
                field: column.to_string(),
                value: raw.to_string(),
            }),
        FieldType::Integer => parse_integer(raw.trim())
            .filter(|integer| field.holds_integer(*integer))
            .map(AttributeValue::Integer)
            .ok_or_else(|| RowFailure::InvalidInteger {
                field: column.to_string(),
                value: raw.to_string(),
            }),
    }
}

/// Turns input records into point features. Identifiers start at 0 and only advance when a
/// row converts successfully, so the written identifiers are dense.
pub struct FeatureBuilder<'a> {
    config: &'a IngestConfig,
    next_id: i64,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(config: &'a IngestConfig) -> Self {
        Self { config, next_id: 0 }
    }

    /// Convert without consuming an identifier; the identifier slot holds a placeholder.
    fn convert(&self, record: &InputRecord) -> Result<Feature, RowFailure> {
        let coordinate_fields = &self.config.coordinate_fields;
        let latitude = parse_coordinate(record, &coordinate_fields.latitude)?;
        let longitude = parse_coordinate(record, &coordinate_fields.longitude)?;

        let mut attributes = Vec::with_capacity(self.config.attribute_fields.len() + 1);
        attributes.push(AttributeValue::Null);
        for attribute in &self.config.attribute_fields {
            attributes.push(parse_attribute(
                record,
                attribute.source_column(),
                &attribute.field,
            )?);
        }
        Ok(Feature::new(
            geo::Geometry::Point(geo::Point::new(longitude, latitude)),
            attributes,
        ))
    }

    pub fn build(&mut self, record: &InputRecord) -> Result<Feature, RowParseError> {
        let mut feature = self.convert(record).map_err(|failure| RowParseError {
            row: record.row_number,
            line: record.line,
            failure,
        })?;
        feature.attributes[0] = AttributeValue::Integer(self.next_id);
        self.next_id += 1;
        Ok(feature)
    }
}

/// Stream the configured CSV file into a new point collection.
///
/// Structural problems (missing file or columns, invalid schema, storage failures) are returned
/// as errors. Rows that fail to convert are skipped and listed in the summary; everything written
/// before an error stays written.
pub fn ingest_csv<B: SpatialBackend + ?Sized>(
    backend: &mut B,
    config: &IngestConfig,
    data_dir: &Path,
) -> anyhow::Result<IngestSummary> {
    let schema = config.schema().context("Declaring output schema")?;
    let input_filepath = data_dir.join(&config.input_path);
    let reader = CsvRecordReader::open(&input_filepath, &config.required_columns())?;
    log::info!(
        "Reading {:?} with columns {:?}",
        input_filepath,
        reader.columns()
    );

    if backend.exists(&config.output_path) {
        if !config.overwrite {
            return Err(anyhow::anyhow!(
                "Output collection '{}' already exists",
                config.output_path
            ));
        }
        backend.delete_collection(&config.output_path)?;
        log::info!("Deleted existing collection '{}'", config.output_path);
    }

    log::info!(
        "Creating collection '{}' in {}",
        config.output_path,
        config.projection_reference.clone().unwrap_or_default()
    );
    create_collection_with_schema(
        backend,
        &config.output_path,
        &schema,
        config.projection_reference.as_ref(),
    )
    .with_context(|| format!("Creating collection '{}'", config.output_path))?;

    let mut summary = IngestSummary {
        collection: config.output_path.clone(),
        ..Default::default()
    };
    let mut builder = FeatureBuilder::new(config);
    let mut cursor = InsertCursor::new(backend, &config.output_path);
    let bar = ProgressBar::new_spinner();
    for result in reader {
        summary.rows_read += 1;
        bar.inc(1);
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                summary.record_failure(err.into());
                continue;
            }
        };
        log::debug!(
            "Coord: {},{}",
            record.get(&config.coordinate_fields.latitude).unwrap_or(""),
            record.get(&config.coordinate_fields.longitude).unwrap_or("")
        );
        match builder.build(&record) {
            Ok(feature) => {
                cursor
                    .insert(&feature)
                    .with_context(|| format!("Writing row {}", record.row_number))?;
                summary.written += 1;
            }
            Err(err) => summary.record_failure(err),
        }
    }
    bar.finish_and_clear();
    cursor.close()?;

    log::info!(
        "Wrote {} features to '{}', skipped {} of {} rows",
        summary.written,
        summary.collection,
        summary.skipped,
        summary.rows_read
    );
    Ok(summary)
}
