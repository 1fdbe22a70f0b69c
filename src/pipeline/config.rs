use std::path::PathBuf;

use serde::Deserialize;

use crate::{
    crs::crs_utils::ProjectionReference,
    geofile::{
        gdal_geofile::GdalDriverType,
        schema::{FeatureSchema, FieldDefinition, FieldType, SchemaError},
    },
    spatial::statistics::Statistic,
};

/// Top level configuration, read from YAML.
#[derive(Deserialize, Debug)]
pub struct Config {
    /// Base directory for relative input paths and output collection names.
    pub data_dir: PathBuf,
    #[serde(default)]
    pub driver: GdalDriverType,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub spatial_join: Option<SpatialJoinConfig>,
    /// Where to write the YAML run summary, relative to `data_dir`.
    #[serde(default)]
    pub summary_path: Option<PathBuf>,
}

/// CSV columns holding the point coordinates.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct CoordinateFields {
    pub longitude: String,
    pub latitude: String,
}

/// A CSV column copied into an attribute field of the output collection.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AttributeField {
    /// CSV column name. Defaults to the field name.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(flatten)]
    pub field: FieldDefinition,
}

impl AttributeField {
    pub fn source_column(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.field.name)
    }
}

/// Name and width of the sequential record identifier field.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IdField {
    pub name: String,
    #[serde(default = "default_id_length")]
    pub length: i32,
}

fn default_id_length() -> i32 {
    9
}

impl Default for IdField {
    fn default() -> Self {
        Self {
            name: "record_id".to_string(),
            length: default_id_length(),
        }
    }
}

fn default_overwrite() -> bool {
    true
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub input_path: PathBuf,
    /// Name of the output collection, e.g. `earthquakes.shp`.
    pub output_path: String,
    pub coordinate_fields: CoordinateFields,
    #[serde(default)]
    pub attribute_fields: Vec<AttributeField>,
    #[serde(default)]
    pub projection_reference: Option<ProjectionReference>,
    #[serde(default)]
    pub id_field: IdField,
    /// Replace an existing output collection instead of failing.
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,
}

impl IngestConfig {
    /// Output schema: the identifier field first, then the attribute fields in declared order.
    pub fn schema(&self) -> Result<FeatureSchema, SchemaError> {
        let mut fields = vec![
            FieldDefinition::new(&self.id_field.name, FieldType::Integer)
                .with_length(self.id_field.length),
        ];
        fields.extend(
            self.attribute_fields
                .iter()
                .map(|attribute| attribute.field.clone()),
        );
        FeatureSchema::new(fields)
    }

    /// CSV columns that must be present in the input header.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut columns = vec![
            self.coordinate_fields.latitude.as_str(),
            self.coordinate_fields.longitude.as_str(),
        ];
        for attribute in &self.attribute_fields {
            let column = attribute.source_column();
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        columns
    }
}

fn default_threshold() -> f64 {
    10_000.0
}

fn default_chart_title() -> String {
    "Features intersecting the overlay".to_string()
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct AggregateConfig {
    pub field: String,
    #[serde(default)]
    pub statistic: Statistic,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ReportConfig {
    pub label_field: String,
    pub value_field: String,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_chart_title")]
    pub title: String,
    pub output_path: PathBuf,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct SpatialJoinConfig {
    /// Collection whose geometries select the ingested features, e.g. `hurricane.shp`.
    pub overlay_path: String,
    /// Collection receiving the matched features.
    pub output_path: String,
    pub aggregate: AggregateConfig,
    #[serde(default)]
    pub report: Option<ReportConfig>,
}
