use geo::{BoundingRect, Intersects};
use rstar::{RTree, RTreeObject, AABB};

use crate::geofile::feature::Feature;

/// Overlay geometry stored in the R-tree together with its bounding box.
struct IndexedGeometry<'a> {
    geometry: &'a geo::Geometry,
    envelope: AABB<[f64; 2]>,
}

impl<'a> RTreeObject for IndexedGeometry<'a> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn envelope_of(geometry: &geo::Geometry) -> Option<AABB<[f64; 2]>> {
    geometry.bounding_rect().map(|rect| {
        AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
    })
}

/// Select the features of `primary` whose geometry intersects at least one geometry of `overlay`.
/// Touching boundaries count as an intersection. The primary order is preserved.
///
/// Overlay geometries are indexed by bounding box, the exact predicate is evaluated only for
/// candidates whose envelopes overlap.
pub fn select_intersecting<'a>(primary: &'a [Feature], overlay: &[Feature]) -> Vec<&'a Feature> {
    let indexed: Vec<IndexedGeometry> = overlay
        .iter()
        .filter_map(|feature| {
            envelope_of(&feature.geometry).map(|envelope| IndexedGeometry {
                geometry: &feature.geometry,
                envelope,
            })
        })
        .collect();
    if indexed.is_empty() {
        return Vec::new();
    }
    let tree = RTree::bulk_load(indexed);

    primary
        .iter()
        .filter(|feature| match envelope_of(&feature.geometry) {
            Some(envelope) => tree
                .locate_in_envelope_intersecting(&envelope)
                .any(|candidate| candidate.geometry.intersects(&feature.geometry)),
            None => false,
        })
        .collect()
}
