use std::{fmt, fs::read_to_string, path::Path};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

pub type EpsgCode = u32;

pub const WGS84_EPSG_CODE: EpsgCode = 4326;

/// Coordinate reference system attached to an output collection.
///
/// In YAML this is written as one of
/// ```yaml
/// projection_reference: { epsg: 4326 }
/// projection_reference: { prj_file: wgs_84.prj }
/// projection_reference: { wkt: 'GEOGCS["GCS_WGS_1984", ...]' }
/// ```
/// Relative `prj_file` paths are resolved against the data directory.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionReference {
    Epsg(EpsgCode),
    PrjFile(std::path::PathBuf),
    Wkt(String),
}

impl Default for ProjectionReference {
    fn default() -> Self {
        ProjectionReference::Epsg(WGS84_EPSG_CODE)
    }
}

impl fmt::Display for ProjectionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionReference::Epsg(code) => {
                write!(f, "{}", epsg_code_to_authority_string(*code))
            }
            ProjectionReference::PrjFile(path) => write!(f, "{}", path.display()),
            ProjectionReference::Wkt(_) => write!(f, "inline WKT"),
        }
    }
}

impl ProjectionReference {
    /// Build the GDAL spatial reference, reading `.prj` files relative to `base_dir`.
    pub fn to_spatial_ref(&self, base_dir: &Path) -> anyhow::Result<gdal::spatial_ref::SpatialRef> {
        match self {
            ProjectionReference::Epsg(code) => gdal::spatial_ref::SpatialRef::from_epsg(*code)
                .map_err(|err| {
                    anyhow!("Could not create SpatialRef from EPSG code {}. {}", code, err)
                }),
            ProjectionReference::PrjFile(path) => {
                let prj_filepath = base_dir.join(path);
                let definition = read_to_string(&prj_filepath)
                    .with_context(|| format!("Reading projection file {:?}", prj_filepath))?;
                spatial_ref_from_definition(definition.trim())
            }
            ProjectionReference::Wkt(wkt) => spatial_ref_from_definition(wkt),
        }
    }
}

fn spatial_ref_from_definition(definition: &str) -> anyhow::Result<gdal::spatial_ref::SpatialRef> {
    gdal::spatial_ref::SpatialRef::from_definition(definition)
        .map_err(|err| anyhow!("Could not parse projection definition. {}", err))
}

pub fn epsg_4326() -> anyhow::Result<gdal::spatial_ref::SpatialRef> {
    ProjectionReference::default().to_spatial_ref(Path::new("."))
}

pub fn epsg_code_to_authority_string(code: EpsgCode) -> String {
    format!("EPSG:{}", code)
}
