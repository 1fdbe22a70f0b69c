pub mod backend;
pub mod feature;
pub mod gdal_geofile;
#[cfg(test)]
pub mod memory;
pub mod schema;
