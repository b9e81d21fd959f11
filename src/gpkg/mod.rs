//! GeoPackage container, layer and feature types backed by rusqlite.

mod batch_iterator;
mod feature;
mod gpkg;
mod layer;

pub use batch_iterator::FeatureBatchIterator;
pub use feature::GpkgFeature;
pub use gpkg::Gpkg;
pub use layer::GpkgLayer;

pub(crate) use feature::{geometry_to_gpkg_blob, gpkg_blob_to_wkb};
