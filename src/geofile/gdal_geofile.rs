use anyhow::{anyhow, Context};
use gdal::vector::{FieldValue, LayerAccess, OGRFieldType};
use serde::Deserialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use crate::crs::crs_utils::{epsg_4326, ProjectionReference};

use super::{
    backend::SpatialBackend,
    feature::{AttributeValue, Feature, FeatureCollection},
    schema::{FeatureSchema, FieldDefinition, FieldType},
};

/// Companion files of a shapefile that are removed together with the `.shp`.
const SHAPEFILE_EXTENSIONS: [&str; 8] = ["shp", "shx", "dbf", "prj", "cpg", "qix", "sbn", "sbx"];

/// dBASE limits field names to 10 characters, longer names get truncated by the driver.
const SHAPEFILE_MAX_FIELD_NAME_LENGTH: usize = 10;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GdalDriverType {
    #[default]
    Shapefile,
    GeoPackage,
    GeoJson,
}

impl GdalDriverType {
    pub fn name(&self) -> &'static str {
        match self {
            GdalDriverType::Shapefile => "ESRI Shapefile",
            GdalDriverType::GeoPackage => "GPKG",
            GdalDriverType::GeoJson => "GeoJSON",
        }
    }
}

/// A collection that is open for writing, with the field names and types as the driver
/// actually created them.
struct OpenCollection {
    dataset: gdal::Dataset,
    field_names: Vec<String>,
    field_types: Vec<OGRFieldType::Type>,
}

/// Backend storing each collection as a GDAL vector dataset below `root_dir`. Collection names
/// are file names (or relative paths) such as `earthquakes.shp`.
pub struct GdalBackend {
    root_dir: PathBuf,
    driver: GdalDriverType,
    open_collections: HashMap<String, OpenCollection>,
}

impl GdalBackend {
    pub fn new(root_dir: &Path, driver: GdalDriverType) -> Self {
        gdal::DriverManager::register_all();
        Self {
            root_dir: root_dir.to_path_buf(),
            driver,
            open_collections: HashMap::new(),
        }
    }

    pub fn collection_path(&self, name: &str) -> PathBuf {
        self.root_dir.join(name)
    }

    fn open_collection(&mut self, name: &str) -> anyhow::Result<&mut OpenCollection> {
        self.open_collections
            .get_mut(name)
            .ok_or_else(|| anyhow!("Collection '{}' is not open for writing", name))
    }
}

fn ogr_field_type(field: &FieldDefinition) -> OGRFieldType::Type {
    match field.field_type {
        FieldType::Integer if field.is_wide_integer() => OGRFieldType::OFTInteger64,
        FieldType::Integer => OGRFieldType::OFTInteger,
        FieldType::Real => OGRFieldType::OFTReal,
        FieldType::Text => OGRFieldType::OFTString,
    }
}

fn field_type_from_ogr(ogr_type: OGRFieldType::Type) -> FieldType {
    match ogr_type {
        OGRFieldType::OFTInteger | OGRFieldType::OFTInteger64 => FieldType::Integer,
        OGRFieldType::OFTReal => FieldType::Real,
        _ => FieldType::Text,
    }
}

fn to_field_value(
    value: &AttributeValue,
    ogr_type: OGRFieldType::Type,
    field_name: &str,
) -> anyhow::Result<Option<FieldValue>> {
    let field_value = match (value, ogr_type) {
        (AttributeValue::Null, _) => return Ok(None),
        (AttributeValue::Integer(value), OGRFieldType::OFTInteger) => {
            let value = i32::try_from(*value).map_err(|_| {
                anyhow!("Value {} does not fit integer field '{}'", value, field_name)
            })?;
            FieldValue::IntegerValue(value)
        }
        (AttributeValue::Integer(value), OGRFieldType::OFTInteger64) => {
            FieldValue::Integer64Value(*value)
        }
        (AttributeValue::Integer(value), OGRFieldType::OFTReal) => {
            FieldValue::RealValue(*value as f64)
        }
        (AttributeValue::Real(value), OGRFieldType::OFTReal) => FieldValue::RealValue(*value),
        (value, OGRFieldType::OFTString) => FieldValue::StringValue(value.to_string()),
        (value, _) => {
            return Err(anyhow!(
                "Value {:?} does not fit field '{}'",
                value,
                field_name
            ))
        }
    };
    Ok(Some(field_value))
}

fn attribute_from_field_value(value: Option<FieldValue>) -> AttributeValue {
    match value {
        Some(FieldValue::IntegerValue(value)) => AttributeValue::Integer(value as i64),
        Some(FieldValue::Integer64Value(value)) => AttributeValue::Integer(value),
        Some(FieldValue::RealValue(value)) => AttributeValue::Real(value),
        Some(FieldValue::StringValue(value)) => AttributeValue::Text(value),
        Some(other) => {
            log::debug!("Reading unsupported field value {:?} as null", other);
            AttributeValue::Null
        }
        None => AttributeValue::Null,
    }
}

/// Remove a dataset from disk. For shapefiles all companion files are removed as well.
pub fn delete_geofile(filepath: &Path) -> anyhow::Result<()> {
    let is_shapefile = filepath
        .extension()
        .map_or(false, |extension| extension.eq_ignore_ascii_case("shp"));
    if !is_shapefile {
        return fs::remove_file(filepath).with_context(|| format!("Deleting {:?}", filepath));
    }
    for extension in SHAPEFILE_EXTENSIONS {
        let companion = filepath.with_extension(extension);
        if companion.exists() {
            fs::remove_file(&companion).with_context(|| format!("Deleting {:?}", companion))?;
        }
    }
    Ok(())
}

/// Read the single layer of a vector dataset. All fields are reported as nullable since
/// most formats do not record it.
pub fn read_features_from_geofile(
    filepath: &Path,
) -> anyhow::Result<(FeatureSchema, Vec<Feature>)> {
    gdal::DriverManager::register_all();
    let mut open_options = gdal::DatasetOptions::default();
    open_options.open_flags = gdal::GdalOpenFlags::GDAL_OF_VECTOR;
    let dataset = gdal::Dataset::open_ex(filepath, open_options)
        .with_context(|| format!("Opening {:?}", filepath))?;

    let layer_count = dataset.layer_count();
    if 0 == layer_count || 1 < layer_count {
        return Err(anyhow!(
            "Found {} layers, only one layer is supported.",
            layer_count
        ));
    }
    let mut layer = dataset.layer(0)?;

    let fields: Vec<FieldDefinition> = layer
        .defn()
        .fields()
        .map(|field| {
            let mut definition =
                FieldDefinition::new(&field.name(), field_type_from_ogr(field.field_type()))
                    .nullable();
            definition.length = Some(field.width()).filter(|width| *width > 0);
            definition.precision = Some(field.precision()).filter(|precision| *precision > 0);
            definition
        })
        .collect();
    let schema = FeatureSchema::new(fields)?;

    let mut features = Vec::new();
    for gdal_feature in layer.features() {
        let wkb = match gdal_feature
            .geometry_by_index(0)
            .and_then(|geometry| geometry.wkb())
        {
            Ok(wkb) => wkb,
            Err(err) => {
                log::warn!("Skipping feature without readable geometry: {}", err);
                continue;
            }
        };
        let geometry = wkb::wkb_to_geom(&mut wkb.as_slice())
            .map_err(|err| anyhow!("Could not read geometry from WKB, {:?}", err))?;
        let attributes = gdal_feature
            .fields()
            .map(|(_, value)| attribute_from_field_value(value))
            .collect();
        features.push(Feature::new(geometry, attributes));
    }
    Ok((schema, features))
}

impl SpatialBackend for GdalBackend {
    fn create_collection(
        &mut self,
        name: &str,
        projection: Option<&ProjectionReference>,
    ) -> anyhow::Result<()> {
        let filepath = self.collection_path(name);
        if filepath.exists() {
            return Err(anyhow!("Collection {:?} already exists", filepath));
        }
        let driver = gdal::DriverManager::get_driver_by_name(self.driver.name())
            .context("Getting GDAL driver")?;

        let crs = match projection {
            Some(projection) => projection.to_spatial_ref(&self.root_dir)?,
            None => epsg_4326()?,
        };
        let crs_name = crs.name()?;
        log::debug!("Using spatial ref {} for writing {:?}", crs_name, filepath);

        let layer_name = filepath
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("");
        let mut dataset = driver
            .create_vector_only(&filepath)
            .with_context(|| format!("Creating {:?}", filepath))?;
        dataset.create_layer(gdal::LayerOptions {
            name: layer_name,
            srs: Some(&crs),
            ty: gdal::vector::OGRwkbGeometryType::wkbPoint,
            options: None,
        })?;

        self.open_collections.insert(
            name.to_string(),
            OpenCollection {
                dataset,
                field_names: Vec::new(),
                field_types: Vec::new(),
            },
        );
        Ok(())
    }

    fn add_field(&mut self, name: &str, field: &FieldDefinition) -> anyhow::Result<()> {
        if self.driver == GdalDriverType::Shapefile
            && field.name.len() > SHAPEFILE_MAX_FIELD_NAME_LENGTH
        {
            log::warn!(
                "Field name '{}' is longer than {} characters and will be truncated",
                field.name,
                SHAPEFILE_MAX_FIELD_NAME_LENGTH
            );
        }
        let open_collection = self.open_collection(name)?;
        let layer = open_collection.dataset.layer(0)?;
        if layer.feature_count() > 0 {
            return Err(anyhow!(
                "Cannot add field '{}' to '{}' after features were inserted",
                field.name,
                name
            ));
        }

        let ogr_type = ogr_field_type(field);
        let field_defn = gdal::vector::FieldDefn::new(&field.name, ogr_type)?;
        if let Some(length) = field.length {
            field_defn.set_width(length);
        }
        if let Some(precision) = field.precision {
            field_defn.set_precision(precision);
        }
        field_defn.add_to_layer(&layer)?;

        // The driver may have shortened the name.
        let created_name = layer
            .defn()
            .fields()
            .last()
            .map(|created| created.name())
            .unwrap_or_else(|| field.name.clone());
        open_collection.field_names.push(created_name);
        open_collection.field_types.push(ogr_type);
        Ok(())
    }

    fn insert_feature(&mut self, name: &str, feature: &Feature) -> anyhow::Result<()> {
        let open_collection = self.open_collection(name)?;
        if feature.attributes.len() != open_collection.field_names.len() {
            return Err(anyhow!(
                "Feature has {} attributes, collection '{}' declares {} fields",
                feature.attributes.len(),
                name,
                open_collection.field_names.len()
            ));
        }

        let mut field_names = Vec::new();
        let mut values = Vec::new();
        for ((field_name, ogr_type), value) in open_collection
            .field_names
            .iter()
            .zip(&open_collection.field_types)
            .zip(&feature.attributes)
        {
            if let Some(field_value) = to_field_value(value, *ogr_type, field_name)? {
                field_names.push(field_name.as_str());
                values.push(field_value);
            }
        }

        let wkb = wkb::geom_to_wkb(&feature.geometry)
            .map_err(|err| anyhow!("Could not write geometry to WKB, {:?}", err))?;
        let geometry = gdal::vector::Geometry::from_wkb(&wkb)?;
        let mut layer = open_collection.dataset.layer(0)?;
        layer.create_feature_fields(geometry, &field_names, &values)?;
        Ok(())
    }

    fn close_collection(&mut self, name: &str) -> anyhow::Result<()> {
        // Dropping the dataset flushes it to disk.
        if self.open_collections.remove(name).is_some() {
            log::debug!("Closed collection {:?}", self.collection_path(name));
        }
        Ok(())
    }

    fn read_collection(&self, name: &str) -> anyhow::Result<FeatureCollection> {
        if self.open_collections.contains_key(name) {
            return Err(anyhow!("Collection '{}' is still open for writing", name));
        }
        let (schema, features) = read_features_from_geofile(&self.collection_path(name))?;
        Ok(FeatureCollection::new(name, schema, features))
    }

    fn exists(&self, name: &str) -> bool {
        self.collection_path(name).exists()
    }

    fn delete_collection(&mut self, name: &str) -> anyhow::Result<()> {
        self.open_collections.remove(name);
        delete_geofile(&self.collection_path(name))
    }
}
