use std::fmt;

/// SQLite storage class for a layer property column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Integer,
    Double,
    Text,
    Blob,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(crate::conversions::column_type_to_str(*self))
    }
}

/// A named property column in a layer schema.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

pub(crate) struct ColumnSpecs {
    pub(crate) primary_key: String,
    pub(crate) other_columns: Vec<ColumnSpec>,
}

/// Options for `Gpkg::ensure_layer`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LayerOptions {
    /// Install the R-tree spatial index (virtual table + maintenance
    /// triggers) when the layer is created.
    pub spatial_index: bool,
}

/// What to do when an insert conflicts with an existing row.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Plain `INSERT`: the statement fails and the current batch rolls back.
    #[default]
    Abort,
    /// `INSERT OR IGNORE`: conflicting rows are skipped.
    Ignore,
    /// `INSERT OR REPLACE`: conflicting rows are overwritten.
    Replace,
}

/// Options for `GpkgLayer::bulk_insert`.
#[derive(Clone, Copy, Debug)]
pub struct BulkInsertOptions {
    /// Rows per transaction. Values below 1 are treated as 1.
    pub batch_size: usize,
    pub conflict: ConflictPolicy,
    /// Build the layer's spatial index after the load if it does not exist
    /// yet. With an already-indexed layer the triggers keep the index
    /// current and this flag has no effect.
    pub spatial_index: bool,
}

impl Default for BulkInsertOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            conflict: ConflictPolicy::default(),
            spatial_index: false,
        }
    }
}

/// Options for `GpkgLayer::features`.
///
/// `filter` and `order_by` are spliced into the generated SQL verbatim, in
/// the same spirit as the `WHERE`-string APIs of desktop GIS libraries. They
/// must come from trusted input.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Raw SQL predicate for the `WHERE` clause.
    pub filter: Option<String>,
    /// Column name to order by. Defaults to the primary key.
    pub order_by: Option<String>,
    pub limit: Option<u32>,
}

/// An axis-aligned bounding box in the layer's coordinate reference system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }
}
