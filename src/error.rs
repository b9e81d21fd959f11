use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Crate error type for GeoPackage operations.
#[derive(Debug)]
pub enum GpkgError {
    /// Wraps errors returned by `rusqlite`.
    Sql(rusqlite::Error),
    /// Wraps errors returned by the `wkb` crate.
    Wkb(wkb::error::WkbError),
    /// The target file already exists, so a new GeoPackage cannot be created there.
    FileAlreadyExists(PathBuf),
    /// The GeoPackage file to open does not exist.
    FileNotFound(PathBuf),
    /// A geometry type in metadata could not be mapped to a supported WKB geometry type.
    UnsupportedGeometryType(String),
    /// A column type declared in SQLite metadata is not supported by this crate.
    UnsupportedColumnType {
        column: String,
        declared_type: String,
    },
    /// Invalid or mixed `z` / `m` dimension flags in GeoPackage metadata.
    InvalidDimension { z: i8, m: i8 },
    /// Property count did not match the layer schema.
    InvalidPropertyCount { expected: usize, got: usize },
    /// Invalid GeoPackage geometry flags byte.
    InvalidGeometryFlags(u8),
    /// GeoPackage geometry blob is too short or does not start with the `GP` magic.
    InvalidGeometryHeader { len: usize, required: usize },
    /// An existing layer does not match the schema requested from `ensure_layer`.
    LayerSchemaMismatch { layer_name: String, detail: String },
    /// Referenced `srs_id` does not exist in `gpkg_spatial_ref_sys`.
    MissingSpatialRefSysId { srs_id: u32 },
    /// Layer schema has multiple primary key columns, which is unsupported.
    CompositePrimaryKeyUnsupported { layer_name: String },
    /// Layer schema has no primary key column.
    MissingPrimaryKeyColumn { layer_name: String },
    /// Requested feature property does not exist in the layer schema.
    MissingProperty { property: String },
    /// A feature row has a `NULL` geometry value.
    NullGeometryValue,
    /// Write attempted through a read-only connection.
    ReadOnly,
}

impl fmt::Display for GpkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(err) => write!(f, "{err}"),
            Self::Wkb(err) => write!(f, "{err}"),
            Self::FileAlreadyExists(path) => {
                write!(f, "GeoPackage file already exists: {}", path.display())
            }
            Self::FileNotFound(path) => {
                write!(f, "GeoPackage file does not exist: {}", path.display())
            }
            Self::UnsupportedGeometryType(ty) => write!(f, "unsupported geometry type: {ty}"),
            Self::UnsupportedColumnType {
                column,
                declared_type,
            } => write!(
                f,
                "unsupported column type for column '{column}': {declared_type}"
            ),
            Self::InvalidDimension { z, m } => {
                write!(f, "invalid or mixed geometry dimension (z={z}, m={m})")
            }
            Self::InvalidPropertyCount { expected, got } => {
                write!(f, "invalid property count: expected {expected}, got {got}")
            }
            Self::InvalidGeometryFlags(flags) => {
                write!(f, "invalid gpkg geometry flags: {flags:#04x}")
            }
            Self::InvalidGeometryHeader { len, required } => {
                write!(
                    f,
                    "invalid gpkg geometry header: got {len} bytes, required at least {required}"
                )
            }
            Self::LayerSchemaMismatch { layer_name, detail } => {
                write!(f, "layer '{layer_name}' does not match requested schema: {detail}")
            }
            Self::MissingSpatialRefSysId { srs_id } => {
                write!(f, "srs_id {srs_id} not found in gpkg_spatial_ref_sys")
            }
            Self::CompositePrimaryKeyUnsupported { layer_name } => write!(
                f,
                "composite primary keys are not supported for layer: {layer_name}"
            ),
            Self::MissingPrimaryKeyColumn { layer_name } => {
                write!(f, "no primary key column found for layer: {layer_name}")
            }
            Self::MissingProperty { property } => write!(f, "missing property: {property}"),
            Self::NullGeometryValue => write!(f, "feature has null geometry value"),
            Self::ReadOnly => write!(f, "operation not allowed on read-only connection"),
        }
    }
}

impl Error for GpkgError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sql(err) => Some(err),
            Self::Wkb(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for GpkgError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err)
    }
}

impl From<wkb::error::WkbError> for GpkgError {
    fn from(err: wkb::error::WkbError) -> Self {
        Self::Wkb(err)
    }
}

pub type Result<T> = std::result::Result<T, GpkgError>;
