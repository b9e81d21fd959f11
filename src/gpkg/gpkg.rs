use crate::conversions::{
    column_type_from_str, column_type_to_str, dimension_from_zm, dimension_to_zm,
    geometry_type_from_str, geometry_type_to_str,
};
use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    SQL_DELETE_GPKG_CONTENTS, SQL_DELETE_GPKG_EXTENSIONS, SQL_DELETE_GPKG_GEOMETRY_COLUMNS,
    SQL_INSERT_GPKG_CONTENTS, SQL_INSERT_GPKG_GEOMETRY_COLUMNS, SQL_LIST_LAYERS,
    SQL_SELECT_GEOMETRY_COLUMN_META, SQL_SRS_EXISTS, SQL_TABLE_COLUMNS, gpkg_rtree_teardown_sql,
    initialize_gpkg, sql_create_table, sql_drop_table,
};
use crate::sql_functions::register_envelope_functions;
use crate::types::{ColumnSpec, ColumnSpecs, LayerOptions};
use rusqlite::OpenFlags;
use std::path::Path;

use super::layer::GpkgLayer;

/// GeoPackage connection wrapper. One per file, closed on drop.
#[derive(Debug)]
pub struct Gpkg {
    conn: rusqlite::Connection,
    read_only: bool,
}

impl Gpkg {
    /// Create a new GeoPackage file with the OGC metadata tables installed.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(GpkgError::FileAlreadyExists(path.to_path_buf()));
        }

        let conn = rusqlite::Connection::open(path)?;
        initialize_gpkg(&conn)?;
        register_envelope_functions(&conn)?;

        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Create a transient in-memory GeoPackage.
    pub fn create_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        initialize_gpkg(&conn)?;
        register_envelope_functions(&conn)?;

        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Open an existing GeoPackage in read-write mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GpkgError::FileNotFound(path.to_path_buf()));
        }

        let conn = rusqlite::Connection::open(path)?;
        register_envelope_functions(&conn)?;
        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Open an existing GeoPackage without write access.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GpkgError::FileNotFound(path.to_path_buf()));
        }

        let conn = rusqlite::Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        register_envelope_functions(&conn)?;
        Ok(Self {
            conn,
            read_only: true,
        })
    }

    /// Register a spatial reference system in `gpkg_spatial_ref_sys`.
    ///
    /// Layers must reference an `srs_id` that exists in the catalog, and the
    /// GeoPackage spec requires the full WKT definition. This crate bundles
    /// only the mandatory defaults (4326, -1, 0) plus
    /// [`crate::SWEREF99_TM_DEFINITION`]; anything else must be supplied by
    /// the caller from an authoritative source such as the EPSG registry.
    pub fn register_srs(
        &self,
        srs_name: &str,
        srs_id: i32,
        organization: &str,
        organization_coordsys_id: i32,
        definition: &str,
        description: &str,
    ) -> Result<()> {
        self.ensure_writable()?;

        self.conn.execute(
            "INSERT INTO gpkg_spatial_ref_sys \
            (srs_name, srs_id, organization, organization_coordsys_id, definition, description) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                srs_name,
                srs_id,
                organization,
                organization_coordsys_id,
                definition,
                description
            ],
        )?;
        Ok(())
    }

    /// List the names of the feature layers.
    pub fn list_layers(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(SQL_LIST_LAYERS)?;
        let layers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(layers)
    }

    /// Load an existing layer's definition and metadata by name.
    pub fn open_layer<'a>(&'a self, layer_name: &str) -> Result<GpkgLayer<'a>> {
        let (geometry_column, geometry_type, geometry_dimension, srs_id) =
            self.get_geometry_column_meta(layer_name)?;
        let column_specs = self.get_column_specs(layer_name)?;
        let primary_key_column = column_specs.primary_key;
        let property_columns = column_specs
            .other_columns
            .into_iter()
            .filter(|spec| spec.name != geometry_column)
            .collect();

        Ok(GpkgLayer::new(
            self,
            layer_name.to_string(),
            geometry_column,
            primary_key_column,
            geometry_type,
            geometry_dimension,
            srs_id,
            property_columns,
        ))
    }

    /// Open the layer if it exists, create it otherwise.
    ///
    /// When the layer already exists, its geometry metadata and property
    /// columns are checked against the request; a mismatch is an error
    /// rather than a silently different schema.
    pub fn ensure_layer<'a>(
        &'a self,
        layer_name: &str,
        geometry_column: &str,
        geometry_type: wkb::reader::GeometryType,
        geometry_dimension: wkb::reader::Dimension,
        srs_id: u32,
        property_columns: &[ColumnSpec],
        options: &LayerOptions,
    ) -> Result<GpkgLayer<'a>> {
        if self.list_layers()?.iter().any(|name| name == layer_name) {
            let layer = self.open_layer(layer_name)?;
            verify_layer_matches(
                &layer,
                geometry_column,
                geometry_type,
                geometry_dimension,
                srs_id,
                property_columns,
            )?;
            return Ok(layer);
        }

        self.create_layer(
            layer_name,
            geometry_column,
            geometry_type,
            geometry_dimension,
            srs_id,
            property_columns,
            options,
        )
    }

    /// Drop a layer together with its spatial index and metadata rows.
    pub fn delete_layer(&self, layer_name: &str) -> Result<()> {
        self.ensure_writable()?;

        let (geometry_column, _, _, _) = self.get_geometry_column_meta(layer_name)?;

        self.conn
            .execute_batch(&gpkg_rtree_teardown_sql(layer_name, &geometry_column))?;
        self.conn.execute_batch(&sql_drop_table(layer_name))?;

        self.conn
            .execute(SQL_DELETE_GPKG_EXTENSIONS, rusqlite::params![layer_name])?;
        self.conn
            .execute(SQL_DELETE_GPKG_GEOMETRY_COLUMNS, rusqlite::params![layer_name])?;
        self.conn
            .execute(SQL_DELETE_GPKG_CONTENTS, rusqlite::params![layer_name])?;
        Ok(())
    }

    fn create_layer<'a>(
        &'a self,
        layer_name: &str,
        geometry_column: &str,
        geometry_type: wkb::reader::GeometryType,
        geometry_dimension: wkb::reader::Dimension,
        srs_id: u32,
        property_columns: &[ColumnSpec],
        options: &LayerOptions,
    ) -> Result<GpkgLayer<'a>> {
        self.ensure_writable()?;

        let srs_exists: i64 =
            self.conn
                .query_row(SQL_SRS_EXISTS, rusqlite::params![srs_id], |row| row.get(0))?;
        if srs_exists == 0 {
            return Err(GpkgError::MissingSpatialRefSysId { srs_id });
        }

        let geometry_type_name = geometry_type_to_str(geometry_type);
        let (z, m) = dimension_to_zm(geometry_dimension);

        let mut column_defs = Vec::with_capacity(property_columns.len() + 2);
        column_defs.push("fid INTEGER PRIMARY KEY AUTOINCREMENT".to_string());
        column_defs.push(format!(r#""{geometry_column}" BLOB"#));
        for spec in property_columns {
            let col_type = column_type_to_str(spec.column_type);
            column_defs.push(format!(r#""{}" {col_type}"#, spec.name));
        }

        let create_sql = sql_create_table(layer_name, &column_defs.join(", "));
        self.conn.execute_batch(&create_sql)?;

        self.conn.execute(
            SQL_INSERT_GPKG_CONTENTS,
            rusqlite::params![layer_name, layer_name, srs_id],
        )?;
        self.conn.execute(
            SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
            rusqlite::params![
                layer_name,
                geometry_column,
                geometry_type_name,
                srs_id,
                z,
                m
            ],
        )?;

        let layer = GpkgLayer::new(
            self,
            layer_name.to_string(),
            geometry_column.to_string(),
            "fid".to_string(),
            geometry_type,
            geometry_dimension,
            srs_id,
            property_columns.to_vec(),
        );

        if options.spatial_index {
            layer.build_spatial_index()?;
        }

        Ok(layer)
    }

    pub(crate) fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    /// Whether the connection was opened without write access.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(GpkgError::ReadOnly);
        }
        Ok(())
    }

    /// Resolve the table columns and map SQLite declared types.
    fn get_column_specs(&self, layer_name: &str) -> Result<ColumnSpecs> {
        let mut stmt = self.conn.prepare(SQL_TABLE_COLUMNS)?;

        let rows = stmt.query_map([layer_name], |row| {
            let name: String = row.get(0)?;
            let declared_type: String = row.get(1)?;
            let primary_key: i32 = row.get(2)?;
            Ok((name, declared_type, primary_key != 0))
        })?;

        let mut primary_key: Option<String> = None;
        let mut other_columns = Vec::new();
        for row in rows {
            let (name, declared_type, is_primary_key) = row?;
            let column_type =
                column_type_from_str(&declared_type).ok_or(GpkgError::UnsupportedColumnType {
                    column: name.clone(),
                    declared_type,
                })?;

            if is_primary_key {
                if primary_key.is_some() {
                    return Err(GpkgError::CompositePrimaryKeyUnsupported {
                        layer_name: layer_name.to_string(),
                    });
                }
                primary_key = Some(name);
            } else {
                other_columns.push(ColumnSpec { name, column_type });
            }
        }

        let primary_key = primary_key.ok_or_else(|| GpkgError::MissingPrimaryKeyColumn {
            layer_name: layer_name.to_string(),
        })?;

        Ok(ColumnSpecs {
            primary_key,
            other_columns,
        })
    }

    /// Resolve the geometry column metadata and SRS information for a layer.
    fn get_geometry_column_meta(
        &self,
        layer_name: &str,
    ) -> Result<(
        String,
        wkb::reader::GeometryType,
        wkb::reader::Dimension,
        u32,
    )> {
        let mut stmt = self.conn.prepare(SQL_SELECT_GEOMETRY_COLUMN_META)?;

        let (geometry_column, geometry_type_str, z, m, srs_id) =
            stmt.query_row([layer_name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i8>(2)?,
                    row.get::<_, i8>(3)?,
                    row.get::<_, u32>(4)?,
                ))
            })?;

        let geometry_type = geometry_type_from_str(&geometry_type_str)?;
        let geometry_dimension = dimension_from_zm(z, m)?;

        Ok((geometry_column, geometry_type, geometry_dimension, srs_id))
    }
}

fn verify_layer_matches(
    layer: &GpkgLayer<'_>,
    geometry_column: &str,
    geometry_type: wkb::reader::GeometryType,
    geometry_dimension: wkb::reader::Dimension,
    srs_id: u32,
    property_columns: &[ColumnSpec],
) -> Result<()> {
    let mismatch = |detail: String| {
        Err(GpkgError::LayerSchemaMismatch {
            layer_name: layer.layer_name.clone(),
            detail,
        })
    };

    if layer.geometry_column != geometry_column {
        return mismatch(format!(
            "geometry column is '{}', requested '{}'",
            layer.geometry_column, geometry_column
        ));
    }
    if layer.geometry_type != geometry_type {
        return mismatch(format!(
            "geometry type is {}, requested {}",
            geometry_type_to_str(layer.geometry_type),
            geometry_type_to_str(geometry_type)
        ));
    }
    if layer.geometry_dimension != geometry_dimension {
        return mismatch("geometry dimension differs".to_string());
    }
    if layer.srs_id != srs_id {
        return mismatch(format!(
            "srs_id is {}, requested {srs_id}",
            layer.srs_id
        ));
    }
    if layer.property_columns != property_columns {
        return mismatch(format!(
            "property columns are {:?}, requested {:?}",
            layer.property_columns, property_columns
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::Gpkg;
    use crate::error::GpkgError;
    use crate::types::{ColumnSpec, ColumnType, LayerOptions};
    use wkb::reader::{Dimension, GeometryType};

    fn point_columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("name", ColumnType::Text),
            ColumnSpec::new("value", ColumnType::Integer),
        ]
    }

    #[test]
    fn ensure_layer_requires_existing_srs() {
        let gpkg = Gpkg::create_in_memory().expect("new gpkg");
        let err = gpkg
            .ensure_layer(
                "missing_srs",
                "geom",
                GeometryType::Point,
                Dimension::Xy,
                9999,
                &[],
                &LayerOptions::default(),
            )
            .expect_err("missing srs should fail");

        assert!(matches!(
            err,
            GpkgError::MissingSpatialRefSysId { srs_id: 9999 }
        ));
    }

    #[test]
    fn ensure_layer_is_idempotent() -> crate::Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let columns = point_columns();

        gpkg.ensure_layer(
            "points",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &columns,
            &LayerOptions::default(),
        )?;
        // A second call with the same schema just opens the layer.
        let layer = gpkg.ensure_layer(
            "points",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &columns,
            &LayerOptions::default(),
        )?;

        assert_eq!(layer.layer_name, "points");
        assert_eq!(layer.primary_key_column, "fid");
        assert_eq!(layer.property_columns, columns);
        assert_eq!(gpkg.list_layers()?, vec!["points".to_string()]);
        Ok(())
    }

    #[test]
    fn ensure_layer_rejects_schema_drift() -> crate::Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        gpkg.ensure_layer(
            "points",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &point_columns(),
            &LayerOptions::default(),
        )?;

        let err = gpkg
            .ensure_layer(
                "points",
                "geom",
                GeometryType::LineString,
                Dimension::Xy,
                4326,
                &point_columns(),
                &LayerOptions::default(),
            )
            .expect_err("different geometry type should fail");
        assert!(matches!(err, GpkgError::LayerSchemaMismatch { .. }));

        let err = gpkg
            .ensure_layer(
                "points",
                "geom",
                GeometryType::Point,
                Dimension::Xy,
                4326,
                &[ColumnSpec::new("name", ColumnType::Text)],
                &LayerOptions::default(),
            )
            .expect_err("different property columns should fail");
        assert!(matches!(err, GpkgError::LayerSchemaMismatch { .. }));
        Ok(())
    }

    #[test]
    fn create_records_geometry_metadata() -> crate::Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        gpkg.ensure_layer(
            "points",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &point_columns(),
            &LayerOptions::default(),
        )?;

        let (geometry_type_name, srs_id, z, m): (String, u32, i8, i8) =
            gpkg.connection().query_row(
                "SELECT geometry_type_name, srs_id, z, m FROM gpkg_geometry_columns WHERE table_name = 'points'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        assert_eq!(geometry_type_name, "POINT");
        assert_eq!(srs_id, 4326);
        assert_eq!(z, 0);
        assert_eq!(m, 0);
        Ok(())
    }

    #[test]
    fn create_stamps_gpkg_application_id() -> crate::Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let application_id: i64 =
            gpkg.connection()
                .query_row("PRAGMA application_id", [], |row| row.get(0))?;
        assert_eq!(application_id, 0x47504B47); // "GPKG"
        Ok(())
    }

    #[test]
    fn register_srs_enables_layer_creation() -> crate::Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        gpkg.register_srs(
            "SWEREF99 TM",
            3006,
            "EPSG",
            3006,
            crate::SWEREF99_TM_DEFINITION,
            "Swedish national grid",
        )?;

        let layer = gpkg.ensure_layer(
            "points",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            3006,
            &[],
            &LayerOptions::default(),
        )?;
        assert_eq!(layer.srs_id, 3006);
        Ok(())
    }

    #[test]
    fn delete_layer_removes_table_and_metadata() -> crate::Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        gpkg.ensure_layer(
            "points",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &[],
            &LayerOptions {
                spatial_index: true,
            },
        )?;

        gpkg.delete_layer("points")?;

        assert!(gpkg.list_layers()?.is_empty());
        let leftovers: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name LIKE '%points%'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[test]
    fn create_fails_if_file_exists() {
        use std::fs;
        use std::time::{SystemTime, UNIX_EPOCH};

        let mut path = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        path.push(format!("gpkg_bulk_exists_{nanos}.gpkg"));

        fs::write(&path, []).expect("create temp file");
        let err = Gpkg::create(&path).expect_err("existing file should fail");
        assert!(matches!(err, GpkgError::FileAlreadyExists(_)));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_fails_if_missing_file() {
        use std::time::{SystemTime, UNIX_EPOCH};

        let mut path = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        path.push(format!("gpkg_bulk_missing_{nanos}.gpkg"));

        let err = Gpkg::open(&path).expect_err("missing file should fail");
        assert!(matches!(err, GpkgError::FileNotFound(_)));

        let err = Gpkg::open_read_only(&path).expect_err("missing file should fail");
        assert!(matches!(err, GpkgError::FileNotFound(_)));
    }
}
