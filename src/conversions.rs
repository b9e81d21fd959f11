use crate::error::GpkgError;
use crate::types::ColumnType;

#[inline]
pub(crate) fn geometry_type_to_str(geometry_type: wkb::reader::GeometryType) -> &'static str {
    match geometry_type {
        wkb::reader::GeometryType::Point => "POINT",
        wkb::reader::GeometryType::LineString => "LINESTRING",
        wkb::reader::GeometryType::Polygon => "POLYGON",
        wkb::reader::GeometryType::MultiPoint => "MULTIPOINT",
        wkb::reader::GeometryType::MultiLineString => "MULTILINESTRING",
        wkb::reader::GeometryType::MultiPolygon => "MULTIPOLYGON",
        wkb::reader::GeometryType::GeometryCollection => "GEOMETRYCOLLECTION",
        _ => unreachable!(),
    }
}

#[inline]
pub(crate) fn geometry_type_from_str(
    geometry_type_str: &str,
) -> Result<wkb::reader::GeometryType, GpkgError> {
    match geometry_type_str.to_ascii_uppercase().as_str() {
        "POINT" => Ok(wkb::reader::GeometryType::Point),
        "LINESTRING" => Ok(wkb::reader::GeometryType::LineString),
        "POLYGON" => Ok(wkb::reader::GeometryType::Polygon),
        "MULTIPOINT" => Ok(wkb::reader::GeometryType::MultiPoint),
        "MULTILINESTRING" => Ok(wkb::reader::GeometryType::MultiLineString),
        "MULTIPOLYGON" => Ok(wkb::reader::GeometryType::MultiPolygon),
        "GEOMETRY" | "GEOMETRYCOLLECTION" => Ok(wkb::reader::GeometryType::GeometryCollection),
        _ => Err(GpkgError::UnsupportedGeometryType(
            geometry_type_str.to_string(),
        )),
    }
}

#[inline]
pub(crate) fn dimension_to_zm(dimension: wkb::reader::Dimension) -> (i8, i8) {
    match dimension {
        wkb::reader::Dimension::Xy => (0, 0),
        wkb::reader::Dimension::Xyz => (1, 0),
        wkb::reader::Dimension::Xym => (0, 1),
        wkb::reader::Dimension::Xyzm => (1, 1),
    }
}

#[inline]
pub(crate) fn dimension_from_zm(z: i8, m: i8) -> Result<wkb::reader::Dimension, GpkgError> {
    match (z, m) {
        (0, 0) => Ok(wkb::reader::Dimension::Xy),
        (1, 0) => Ok(wkb::reader::Dimension::Xyz),
        (0, 1) => Ok(wkb::reader::Dimension::Xym),
        (1, 1) => Ok(wkb::reader::Dimension::Xyzm),
        // The spec also allows 2 ("optional"), but a value that may or may
        // not be there cannot be mapped to a single WKB dimension.
        _ => Err(GpkgError::InvalidDimension { z, m }),
    }
}

#[inline]
pub(crate) fn column_type_to_str(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Integer => "INTEGER",
        ColumnType::Double => "DOUBLE",
        ColumnType::Text => "TEXT",
        ColumnType::Blob => "BLOB",
    }
}

// cf. https://www.geopackage.org/spec140/index.html#_sqlite_container
#[inline]
pub(crate) fn column_type_from_str(column_type_str: &str) -> Option<ColumnType> {
    match column_type_str.to_ascii_uppercase().as_str() {
        "BOOLEAN" => Some(ColumnType::Boolean),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" => Some(ColumnType::Integer),
        "DOUBLE" | "FLOAT" | "REAL" => Some(ColumnType::Double),
        "TEXT" | "VARCHAR" => Some(ColumnType::Text),
        "BLOB" | "GEOMETRY" | "POINT" | "LINESTRING" | "POLYGON" | "MULTIPOINT"
        | "MULTILINESTRING" | "MULTIPOLYGON" | "GEOMETRYCOLLECTION" => Some(ColumnType::Blob),
        _ => None,
    }
}

#[inline]
pub(crate) fn conflict_to_insert_sql(conflict: crate::types::ConflictPolicy) -> &'static str {
    match conflict {
        crate::types::ConflictPolicy::Abort => "INSERT",
        crate::types::ConflictPolicy::Ignore => "INSERT OR IGNORE",
        crate::types::ConflictPolicy::Replace => "INSERT OR REPLACE",
    }
}
