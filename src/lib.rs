//! GeoPackage writer/reader for bulk point loading, built on top of rusqlite.
//!
//! ## Overview
//!
//! - `Gpkg` represents one GeoPackage file (or an in-memory database).
//! - `GpkgLayer` represents a single feature layer in the file.
//! - `GpkgFeature` represents a single feature in a layer.
//!
//! `Gpkg` is the entry point and supports several open modes:
//!
//! - `Gpkg::create(path)`: create a new GeoPackage file, failing if it exists.
//! - `Gpkg::open(path)`: open an existing file for read/write.
//! - `Gpkg::open_read_only(path)`: open an existing file without write access.
//! - `Gpkg::create_in_memory()`: create a transient in-memory GeoPackage.
//!
//! You access a `GpkgLayer` via `Gpkg::open_layer(name)` for existing layers
//! or `Gpkg::ensure_layer(...)`, which creates the layer on first use and
//! verifies the schema on later runs.
//!
//! ## Writing
//!
//! ```no_run
//! use gpkg_bulk::types::{BulkInsertOptions, ColumnSpec, ColumnType, LayerOptions};
//! use gpkg_bulk::{Gpkg, Value};
//! use geo_types::Point;
//! use wkb::reader::{Dimension, GeometryType};
//!
//! fn main() -> gpkg_bulk::Result<()> {
//!     let gpkg = Gpkg::create("cities.gpkg")?;
//!     gpkg.register_srs(
//!         "SWEREF99 TM",
//!         3006,
//!         "EPSG",
//!         3006,
//!         gpkg_bulk::SWEREF99_TM_DEFINITION,
//!         "Swedish national grid",
//!     )?;
//!
//!     let columns = vec![ColumnSpec::new("name", ColumnType::Text)];
//!     let layer = gpkg.ensure_layer(
//!         "cities",
//!         "geom",
//!         GeometryType::Point,
//!         Dimension::Xy,
//!         3006,
//!         &columns,
//!         &LayerOptions::default(),
//!     )?;
//!
//!     // One statement per call; use bulk_insert for anything non-trivial.
//!     layer.insert(
//!         Point::new(674032.0, 6580822.0),
//!         vec![Value::Text("Stockholm".to_string())],
//!     )?;
//!
//!     let records = (0..10_000).map(|i| {
//!         (
//!             Point::new(500_000.0 + i as f64, 6_500_000.0),
//!             vec![Value::Text(format!("point {i}"))],
//!         )
//!     });
//!     layer.bulk_insert(
//!         records,
//!         &BulkInsertOptions {
//!             batch_size: 1000,
//!             ..Default::default()
//!         },
//!     )?;
//!     Ok(())
//! }
//! ```
//!
//! ## Reading
//!
//! `GpkgLayer::features()` allocates a `Vec<GpkgFeature>` for the whole
//! result set. For large layers, use `features_batch(batch_size)` to iterate
//! in chunks and limit peak memory:
//!
//! ```no_run
//! use gpkg_bulk::Gpkg;
//! use gpkg_bulk::types::ReadOptions;
//!
//! let gpkg = Gpkg::open_read_only("cities.gpkg")?;
//! let layer = gpkg.open_layer("cities")?;
//!
//! for feature in layer.features(&ReadOptions::default())? {
//!     let name: String = feature.property("name")?;
//!     let _geom = feature.geometry()?;
//!     println!("{}: {name}", feature.id());
//! }
//!
//! for batch in layer.features_batch(500)? {
//!     for feature in batch? {
//!         let _id = feature.id();
//!     }
//! }
//! # Ok::<(), gpkg_bulk::GpkgError>(())
//! ```
//!
//! ## Spatial queries
//!
//! `GpkgLayer::features_in_envelope` answers bounding-box queries. It uses
//! the layer's R-tree when one exists (see
//! [`GpkgLayer::build_spatial_index`]) and otherwise falls back to a full
//! scan through the registered `ST_MinX`/`ST_MaxX`/`ST_MinY`/`ST_MaxY`
//! functions:
//!
//! ```no_run
//! use gpkg_bulk::Gpkg;
//! use gpkg_bulk::types::Envelope;
//!
//! let gpkg = Gpkg::open("cities.gpkg")?;
//! let layer = gpkg.open_layer("cities")?;
//! layer.build_spatial_index()?;
//!
//! let hits = layer.features_in_envelope(&Envelope::new(
//!     260_000.0, 6_130_000.0, 930_000.0, 7_700_000.0,
//! ))?;
//! println!("{} features in envelope", hits.len());
//! # Ok::<(), gpkg_bulk::GpkgError>(())
//! ```
mod error;
mod gpkg;
mod sql_functions;

mod conversions;
mod ogc_sql;
pub mod types;

pub use error::{GpkgError, Result};
pub use gpkg::{FeatureBatchIterator, Gpkg, GpkgFeature, GpkgLayer};
pub use ogc_sql::SWEREF99_TM_DEFINITION;
pub use sql_functions::register_envelope_functions;

/// Owned dynamic SQLite value used for feature properties.
pub use rusqlite::types::Value;

// Re-export types used in public fields to keep the public API stable.
pub use wkb::reader::{Dimension, GeometryType};
