use crate::{
    crs::crs_utils::ProjectionReference,
    spatial::{
        intersection::select_intersecting,
        statistics::{self, AggregateResult, Statistic},
    },
};

use super::{
    feature::{Feature, FeatureCollection},
    schema::{FeatureSchema, FieldDefinition},
};

/// Storage and geometry capabilities the pipeline needs from a GIS backend.
///
/// Collections are addressed by name; what a name means (a file below a data directory, a key in
/// memory) is up to the backend. A collection is created empty, receives its fields through
/// `add_field`, then features through `insert_feature`, and is finalized by `close_collection`.
/// Fields cannot be added once the first feature was inserted.
pub trait SpatialBackend {
    fn create_collection(
        &mut self,
        name: &str,
        projection: Option<&ProjectionReference>,
    ) -> anyhow::Result<()>;

    fn add_field(&mut self, name: &str, field: &FieldDefinition) -> anyhow::Result<()>;

    /// Append a feature whose attributes are in the order of the collection's fields.
    fn insert_feature(&mut self, name: &str, feature: &Feature) -> anyhow::Result<()>;

    /// Flush and release the write handle of a collection. Closing a collection that is not
    /// open for writing is a no-op.
    fn close_collection(&mut self, name: &str) -> anyhow::Result<()>;

    fn read_collection(&self, name: &str) -> anyhow::Result<FeatureCollection>;

    fn exists(&self, name: &str) -> bool;

    fn delete_collection(&mut self, name: &str) -> anyhow::Result<()>;

    /// Features of `primary` that intersect any geometry of `overlay`, as a collection named
    /// after `primary` with its schema.
    fn intersect(&self, primary: &str, overlay: &str) -> anyhow::Result<FeatureCollection> {
        let primary_collection = self.read_collection(primary)?;
        let overlay_collection = self.read_collection(overlay)?;
        log::debug!(
            "Intersecting {} features of '{}' with {} features of '{}'",
            primary_collection.len(),
            primary,
            overlay_collection.len(),
            overlay
        );
        let features =
            select_intersecting(&primary_collection.features, &overlay_collection.features)
                .into_iter()
                .cloned()
                .collect();
        Ok(FeatureCollection::new(primary, primary_collection.schema, features))
    }

    fn aggregate(
        &self,
        name: &str,
        field: &str,
        statistic: Statistic,
    ) -> anyhow::Result<AggregateResult> {
        statistics::aggregate(&self.read_collection(name)?, field, statistic)
    }
}

/// Create collection `name` and declare every field of `schema` on it.
pub fn create_collection_with_schema<B: SpatialBackend + ?Sized>(
    backend: &mut B,
    name: &str,
    schema: &FeatureSchema,
    projection: Option<&ProjectionReference>,
) -> anyhow::Result<()> {
    backend.create_collection(name, projection)?;
    for field in schema.fields() {
        backend.add_field(name, field)?;
    }
    Ok(())
}

/// Write handle into a collection. The collection is closed when the cursor is closed explicitly
/// or, failing that, when it is dropped, so an early return through `?` still releases it.
pub struct InsertCursor<'a, B: SpatialBackend + ?Sized> {
    backend: &'a mut B,
    name: String,
    inserted: usize,
    closed: bool,
}

impl<'a, B: SpatialBackend + ?Sized> InsertCursor<'a, B> {
    pub fn new(backend: &'a mut B, name: &str) -> Self {
        Self {
            backend,
            name: name.to_string(),
            inserted: 0,
            closed: false,
        }
    }

    pub fn insert(&mut self, feature: &Feature) -> anyhow::Result<()> {
        self.backend.insert_feature(&self.name, feature)?;
        self.inserted += 1;
        Ok(())
    }

    pub fn close(mut self) -> anyhow::Result<usize> {
        self.closed = true;
        self.backend.close_collection(&self.name)?;
        Ok(self.inserted)
    }
}

impl<'a, B: SpatialBackend + ?Sized> Drop for InsertCursor<'a, B> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.backend.close_collection(&self.name) {
            log::error!("Could not close collection '{}': {:?}", self.name, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::geofile::{
        feature::{AttributeValue, Feature},
        memory::MemoryBackend,
        schema::{FeatureSchema, FieldDefinition, FieldType},
    };

    use super::{create_collection_with_schema, InsertCursor, SpatialBackend};

    fn id_schema() -> FeatureSchema {
        FeatureSchema::new(vec![FieldDefinition::new("record_id", FieldType::Integer)]).unwrap()
    }

    fn point(id: i64) -> Feature {
        Feature::new(
            geo::Geometry::Point(geo::Point::new(id as f64, 0.0)),
            vec![AttributeValue::Integer(id)],
        )
    }

    fn insert_then_fail(backend: &mut MemoryBackend) -> anyhow::Result<()> {
        let mut cursor = InsertCursor::new(backend, "points");
        cursor.insert(&point(0))?;
        cursor.insert(&Feature::from(geo::Geometry::Point(geo::Point::new(1.0, 1.0))))?;
        cursor.close()?;
        Ok(())
    }

    #[rstest]
    fn test_cursor_is_released_when_dropped_on_error() {
        let mut backend = MemoryBackend::new();
        create_collection_with_schema(&mut backend, "points", &id_schema(), None).unwrap();

        // The second feature lacks attributes, the insert fails and the cursor is dropped.
        assert!(insert_then_fail(&mut backend).is_err());
        assert!(!backend.is_open("points"));

        let collection = backend.read_collection("points").unwrap();
        assert_eq!(collection.len(), 1);
    }

    #[rstest]
    fn test_cursor_counts_inserted_features() {
        let mut backend = MemoryBackend::new();
        create_collection_with_schema(&mut backend, "points", &id_schema(), None).unwrap();
        let mut cursor = InsertCursor::new(&mut backend, "points");
        for id in 0..3 {
            cursor.insert(&point(id)).unwrap();
        }
        assert_eq!(cursor.close().unwrap(), 3);
        assert!(!backend.is_open("points"));
    }
}
