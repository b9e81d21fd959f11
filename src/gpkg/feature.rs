use crate::error::{GpkgError, Result};
use crate::types::ColumnSpec;
use geo_traits::GeometryTrait;
use rusqlite::types::{FromSql, FromSqlError, Value, ValueRef};
use std::collections::HashMap;
use std::sync::Arc;
use wkb::reader::Wkb;

// SELECT statements place these two columns first, so readers never have to
// look up their positions per row.
pub(crate) const GEOMETRY_INDEX: usize = 0;
pub(crate) const PRIMARY_INDEX: usize = 1;

/// A single feature: primary key, GeoPackage geometry blob and owned
/// property values addressable by column name.
pub struct GpkgFeature {
    pub(super) id: i64,
    pub(super) geometry: Option<Vec<u8>>,
    pub(super) properties: Vec<Value>,
    pub(super) property_index_by_name: Arc<HashMap<String, usize>>,
}

impl GpkgFeature {
    /// Return the primary key value.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Decode the geometry column into WKB.
    pub fn geometry(&self) -> Result<Wkb<'_>> {
        let bytes = self.geometry.as_ref().ok_or(GpkgError::NullGeometryValue)?;
        gpkg_blob_to_wkb(bytes)
    }

    /// Read a property by column name using rusqlite's `FromSql` conversion.
    pub fn property<T: FromSql>(&self, name: &str) -> Result<T> {
        let idx = *self
            .property_index_by_name
            .get(name)
            .ok_or_else(|| GpkgError::MissingProperty {
                property: name.to_string(),
            })?;
        let value_ref = ValueRef::from(&self.properties[idx]);
        FromSql::column_result(value_ref).map_err(|err| match err {
            FromSqlError::InvalidType => GpkgError::Sql(rusqlite::Error::InvalidColumnType(
                idx,
                name.to_string(),
                value_ref.data_type(),
            )),
            FromSqlError::OutOfRange(i) => {
                GpkgError::Sql(rusqlite::Error::IntegralValueOutOfRange(idx, i))
            }
            FromSqlError::Other(err) => GpkgError::Sql(rusqlite::Error::FromSqlConversionFailure(
                idx,
                value_ref.data_type(),
                err,
            )),
            err => GpkgError::Sql(rusqlite::Error::FromSqlConversionFailure(
                idx,
                value_ref.data_type(),
                Box::new(err),
            )),
        })
    }

    /// Borrow a property as the dynamic SQLite value, `None` for unknown names.
    pub fn property_value(&self, name: &str) -> Option<&Value> {
        let idx = *self.property_index_by_name.get(name)?;
        self.properties.get(idx)
    }
}

/// Map one SELECTed row (geometry and primary key first) to a feature.
pub(crate) fn row_to_feature(
    row: &rusqlite::Row<'_>,
    geometry_column: &str,
    primary_key_column: &str,
    property_count: usize,
    property_index_by_name: &Arc<HashMap<String, usize>>,
) -> rusqlite::Result<GpkgFeature> {
    let geometry = match row.get_ref(GEOMETRY_INDEX)? {
        ValueRef::Null => None,
        ValueRef::Blob(bytes) => Some(bytes.to_vec()),
        other => {
            return Err(rusqlite::Error::InvalidColumnType(
                GEOMETRY_INDEX,
                geometry_column.to_string(),
                other.data_type(),
            ));
        }
    };

    let id = match row.get_ref(PRIMARY_INDEX)? {
        ValueRef::Integer(id) => id,
        other => {
            return Err(rusqlite::Error::InvalidColumnType(
                PRIMARY_INDEX,
                primary_key_column.to_string(),
                other.data_type(),
            ));
        }
    };

    let mut properties = Vec::with_capacity(property_count);
    for idx in 0..property_count {
        properties.push(row.get::<_, Value>(idx + 2)?);
    }

    Ok(GpkgFeature {
        id,
        geometry,
        properties,
        property_index_by_name: Arc::clone(property_index_by_name),
    })
}

pub(crate) fn property_index_by_name(property_columns: &[ColumnSpec]) -> HashMap<String, usize> {
    property_columns
        .iter()
        .enumerate()
        .map(|(idx, column)| (column.name.clone(), idx))
        .collect()
}

/// Encode a geometry as a GeoPackage blob: WKB behind the fixed 8-byte
/// header (magic, version, flags, little-endian SRID, no envelope).
// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub(crate) fn geometry_to_gpkg_blob<G>(geometry: &G, srs_id: u32) -> Result<Vec<u8>>
where
    G: GeometryTrait<T = f64>,
{
    let mut wkb_buf = Vec::new();
    wkb::writer::write_geometry(&mut wkb_buf, geometry, &Default::default())?;

    let mut blob = Vec::with_capacity(wkb_buf.len() + 8);
    blob.extend_from_slice(&[
        0x47u8, // 'G'
        0x50u8, // 'P'
        0x00u8, // version
        0x01u8, // flags: little-endian SRID, no envelope
    ]);
    blob.extend_from_slice(&srs_id.to_le_bytes());
    blob.extend_from_slice(&wkb_buf);
    Ok(blob)
}

/// Strip the GeoPackage header and envelope bytes to access the raw WKB.
// cf. https://www.geopackage.org/spec140/index.html#gpb_format
pub(crate) fn gpkg_blob_to_wkb<'a>(blob: &'a [u8]) -> Result<Wkb<'a>> {
    const HEADER_LEN: usize = 8;
    if blob.len() < HEADER_LEN || blob[0] != 0x47 || blob[1] != 0x50 {
        return Err(GpkgError::InvalidGeometryHeader {
            len: blob.len(),
            required: HEADER_LEN,
        });
    }

    let flags = blob[3];
    let envelope_size: usize = match flags & 0b00001110 {
        0b00000000 => 0,  // no envelope
        0b00000010 => 32, // [minx, maxx, miny, maxy]
        0b00000100 => 48, // [minx, maxx, miny, maxy, minz, maxz]
        0b00000110 => 48, // [minx, maxx, miny, maxy, minm, maxm]
        0b00001000 => 64, // [minx, maxx, miny, maxy, minz, maxz, minm, maxm]
        _ => {
            return Err(GpkgError::InvalidGeometryFlags(flags));
        }
    };

    let offset = HEADER_LEN + envelope_size;
    if blob.len() < offset {
        return Err(GpkgError::InvalidGeometryHeader {
            len: blob.len(),
            required: offset,
        });
    }

    Ok(Wkb::try_new(&blob[offset..])?)
}

#[cfg(test)]
mod tests {
    use super::{geometry_to_gpkg_blob, gpkg_blob_to_wkb};
    use crate::Result;
    use crate::error::GpkgError;
    use geo_types::Point;

    #[test]
    fn gpkg_blob_roundtrip() -> Result<()> {
        let point = Point::new(3.0, -1.0);
        let mut expected_wkb = Vec::new();
        wkb::writer::write_geometry(&mut expected_wkb, &point, &Default::default())?;

        let blob = geometry_to_gpkg_blob(&point, 3006)?;
        assert_eq!(&blob[..2], b"GP");
        assert_eq!(u32::from_le_bytes(blob[4..8].try_into().unwrap()), 3006);

        let recovered = gpkg_blob_to_wkb(&blob)?;
        assert_eq!(recovered.buf(), expected_wkb.as_slice());
        Ok(())
    }

    #[test]
    fn decode_skips_declared_envelope() -> Result<()> {
        let point = Point::new(7.0, 8.0);
        let mut wkb_buf = Vec::new();
        wkb::writer::write_geometry(&mut wkb_buf, &point, &Default::default())?;

        // Hand-build a blob with flags declaring a 32-byte XY envelope.
        let mut blob = vec![0x47, 0x50, 0x00, 0x03];
        blob.extend_from_slice(&4326u32.to_le_bytes());
        blob.extend_from_slice(&[0u8; 32]);
        blob.extend_from_slice(&wkb_buf);

        let recovered = gpkg_blob_to_wkb(&blob)?;
        assert_eq!(recovered.buf(), wkb_buf.as_slice());
        Ok(())
    }

    #[test]
    fn decode_rejects_invalid_flags() {
        let mut blob = vec![0x47, 0x50, 0x00, 0x0A, 0, 0, 0, 0];
        blob.extend_from_slice(&[0; 16]);
        assert!(matches!(
            gpkg_blob_to_wkb(&blob),
            Err(GpkgError::InvalidGeometryFlags(0x0A))
        ));
    }

    #[test]
    fn decode_rejects_short_or_foreign_blobs() {
        assert!(matches!(
            gpkg_blob_to_wkb(&[0x47, 0x50, 0x00]),
            Err(GpkgError::InvalidGeometryHeader { len: 3, .. })
        ));
        assert!(matches!(
            gpkg_blob_to_wkb(&[0u8; 16]),
            Err(GpkgError::InvalidGeometryHeader { .. })
        ));
        // Truncated before the declared envelope ends.
        let blob = vec![0x47, 0x50, 0x00, 0x03, 0, 0, 0, 0, 1, 2, 3];
        assert!(matches!(
            gpkg_blob_to_wkb(&blob),
            Err(GpkgError::InvalidGeometryHeader { len: 11, required: 40 })
        ));
    }
}
