use std::collections::HashMap;

use anyhow::anyhow;

use crate::crs::crs_utils::ProjectionReference;

use super::{
    backend::SpatialBackend,
    feature::{AttributeValue, Feature, FeatureCollection},
    schema::{FeatureSchema, FieldDefinition, FieldType},
};

struct StoredCollection {
    fields: Vec<FieldDefinition>,
    features: Vec<Feature>,
    projection: Option<ProjectionReference>,
    open: bool,
}

/// In-process backend keeping collections in a map. Enforces the same contract as the on-disk
/// backend: fields are fixed once features exist and every feature matches the schema.
#[derive(Default)]
pub struct MemoryBackend {
    collections: HashMap<String, StoredCollection>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a complete, already closed collection, replacing any collection of the same name.
    pub fn insert_collection(&mut self, collection: FeatureCollection) {
        self.collections.insert(
            collection.name.clone(),
            StoredCollection {
                fields: collection.schema.fields().to_vec(),
                features: collection.features,
                projection: None,
                open: false,
            },
        );
    }

    pub fn is_open(&self, name: &str) -> bool {
        self.collections
            .get(name)
            .map_or(false, |collection| collection.open)
    }

    pub fn projection(&self, name: &str) -> Option<&ProjectionReference> {
        self.collections
            .get(name)
            .and_then(|collection| collection.projection.as_ref())
    }

    fn get_open_mut(&mut self, name: &str) -> anyhow::Result<&mut StoredCollection> {
        let collection = self
            .collections
            .get_mut(name)
            .ok_or_else(|| anyhow!("Collection '{}' does not exist", name))?;
        if !collection.open {
            return Err(anyhow!("Collection '{}' is not open for writing", name));
        }
        Ok(collection)
    }
}

fn value_matches_field(value: &AttributeValue, field: &FieldDefinition) -> bool {
    match (value, field.field_type) {
        (AttributeValue::Null, _) => field.nullable,
        (AttributeValue::Integer(value), FieldType::Integer) => field.holds_integer(*value),
        (AttributeValue::Real(_), FieldType::Real) => true,
        (AttributeValue::Text(_), FieldType::Text) => true,
        _ => false,
    }
}

impl SpatialBackend for MemoryBackend {
    fn create_collection(
        &mut self,
        name: &str,
        projection: Option<&ProjectionReference>,
    ) -> anyhow::Result<()> {
        if self.collections.contains_key(name) {
            return Err(anyhow!("Collection '{}' already exists", name));
        }
        self.collections.insert(
            name.to_string(),
            StoredCollection {
                fields: Vec::new(),
                features: Vec::new(),
                projection: projection.cloned(),
                open: true,
            },
        );
        Ok(())
    }

    fn add_field(&mut self, name: &str, field: &FieldDefinition) -> anyhow::Result<()> {
        let collection = self.get_open_mut(name)?;
        if !collection.features.is_empty() {
            return Err(anyhow!(
                "Cannot add field '{}' to collection '{}' after features were inserted",
                field.name,
                name
            ));
        }
        if collection.fields.iter().any(|existing| existing.name == field.name) {
            return Err(anyhow!("Field '{}' already exists in '{}'", field.name, name));
        }
        collection.fields.push(field.clone());
        Ok(())
    }

    fn insert_feature(&mut self, name: &str, feature: &Feature) -> anyhow::Result<()> {
        let collection = self.get_open_mut(name)?;
        if feature.attributes.len() != collection.fields.len() {
            return Err(anyhow!(
                "Feature has {} attributes, collection '{}' declares {} fields",
                feature.attributes.len(),
                name,
                collection.fields.len()
            ));
        }
        for (value, field) in feature.attributes.iter().zip(&collection.fields) {
            if !value_matches_field(value, field) {
                return Err(anyhow!(
                    "Value {:?} does not fit field '{}' of type {:?}",
                    value,
                    field.name,
                    field.field_type
                ));
            }
        }
        collection.features.push(feature.clone());
        Ok(())
    }

    fn close_collection(&mut self, name: &str) -> anyhow::Result<()> {
        if let Some(collection) = self.collections.get_mut(name) {
            collection.open = false;
        }
        Ok(())
    }

    fn read_collection(&self, name: &str) -> anyhow::Result<FeatureCollection> {
        let collection = self
            .collections
            .get(name)
            .ok_or_else(|| anyhow!("Collection '{}' does not exist", name))?;
        Ok(FeatureCollection::new(
            name,
            FeatureSchema::new(collection.fields.clone())?,
            collection.features.clone(),
        ))
    }

    fn exists(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    fn delete_collection(&mut self, name: &str) -> anyhow::Result<()> {
        self.collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| anyhow!("Collection '{}' does not exist", name))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::{
        crs::crs_utils::ProjectionReference,
        geofile::{
            backend::SpatialBackend,
            feature::{AttributeValue, Feature},
            schema::{FieldDefinition, FieldType},
        },
    };

    use super::MemoryBackend;

    fn backend_with_cases_collection() -> MemoryBackend {
        let mut backend = MemoryBackend::new();
        backend
            .create_collection("covid", Some(&ProjectionReference::Epsg(4326)))
            .unwrap();
        backend
            .add_field("covid", &FieldDefinition::new("cases", FieldType::Integer))
            .unwrap();
        backend
    }

    fn cases_feature(cases: AttributeValue) -> Feature {
        Feature::new(geo::Geometry::Point(geo::Point::new(1.0, 2.0)), vec![cases])
    }

    #[rstest]
    fn test_fields_are_fixed_after_first_insert() {
        let mut backend = backend_with_cases_collection();
        backend
            .insert_feature("covid", &cases_feature(AttributeValue::Integer(10)))
            .unwrap();
        let result = backend.add_field("covid", &FieldDefinition::new("country", FieldType::Text));
        assert!(result.is_err());
    }

    #[rstest]
    #[case(AttributeValue::Text("10".to_string()))]
    #[case(AttributeValue::Real(10.0))]
    #[case(AttributeValue::Null)]
    #[case(AttributeValue::Integer(3_000_000_000))]
    fn test_mismatching_value_is_rejected(#[case] value: AttributeValue) {
        let mut backend = backend_with_cases_collection();
        assert!(backend.insert_feature("covid", &cases_feature(value)).is_err());
    }

    #[rstest]
    fn test_insert_after_close_is_rejected() {
        let mut backend = backend_with_cases_collection();
        backend.close_collection("covid").unwrap();
        let result = backend.insert_feature("covid", &cases_feature(AttributeValue::Integer(1)));
        assert!(result.is_err());
    }

    #[rstest]
    fn test_read_back_and_delete() {
        let mut backend = backend_with_cases_collection();
        backend
            .insert_feature("covid", &cases_feature(AttributeValue::Integer(7)))
            .unwrap();
        backend.close_collection("covid").unwrap();

        let collection = backend.read_collection("covid").unwrap();
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.features[0].attributes, vec![AttributeValue::Integer(7)]);
        assert_eq!(backend.projection("covid"), Some(&ProjectionReference::Epsg(4326)));

        backend.delete_collection("covid").unwrap();
        assert!(!backend.exists("covid"));
    }
}
