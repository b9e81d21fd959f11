//! SQL text for the OGC GeoPackage container.
//!
//! Table definitions follow https://www.geopackage.org/spec140/index.html#table_definition_sql
//! and the R-tree statements follow the `gpkg_rtree_index` extension chapter.

use crate::types::{ConflictPolicy, ReadOptions};

// "GPKG" in big-endian ASCII, required in the SQLite header of every GeoPackage.
const SQL_PRAGMAS: &str = "
PRAGMA application_id = 1196444487;
PRAGMA user_version = 10300;
";

// gpkg_spatial_ref_sys: the SRS catalog referenced by gpkg_contents and
// gpkg_geometry_columns.
const SQL_GPKG_SPATIAL_REF_SYS: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition  TEXT NOT NULL,
  description TEXT
);
";

// gpkg_contents: lists all geospatial contents in the package.
const SQL_GPKG_CONTENTS: &str = "
CREATE TABLE gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

// gpkg_geometry_columns: identifies geometry columns and geometry types for
// vector feature user data tables.
const SQL_GPKG_GEOMETRY_COLUMNS: &str = "
CREATE TABLE gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT uk_gc_table_name UNIQUE (table_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

// gpkg_extensions: declares which extensions apply to the GeoPackage, a table,
// or a column. We use it to announce the R-tree index extension.
const SQL_GPKG_EXTENSIONS: &str = "
CREATE TABLE gpkg_extensions (
  table_name TEXT,
  column_name TEXT,
  extension_name TEXT NOT NULL,
  definition TEXT NOT NULL,
  scope TEXT NOT NULL,
  CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
";

pub(crate) const SQL_LIST_LAYERS: &str =
    "SELECT table_name FROM gpkg_contents WHERE data_type = 'features'";

pub(crate) const SQL_INSERT_GPKG_CONTENTS: &str = "
INSERT INTO gpkg_contents
  (table_name, data_type, identifier, description, srs_id)
VALUES
  (?1, 'features', ?2, '', ?3)
";

pub(crate) const SQL_INSERT_GPKG_GEOMETRY_COLUMNS: &str = "
INSERT INTO gpkg_geometry_columns
  (table_name, column_name, geometry_type_name, srs_id, z, m)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_SELECT_GEOMETRY_COLUMN_META: &str = "
SELECT column_name, geometry_type_name, z, m, srs_id
FROM gpkg_geometry_columns
WHERE table_name = ?
";

pub(crate) const SQL_DELETE_GPKG_CONTENTS: &str =
    "DELETE FROM gpkg_contents WHERE table_name = ?1";

pub(crate) const SQL_DELETE_GPKG_GEOMETRY_COLUMNS: &str =
    "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1";

pub(crate) const SQL_DELETE_GPKG_EXTENSIONS: &str =
    "DELETE FROM gpkg_extensions WHERE table_name = ?1";

pub(crate) const SQL_INSERT_RTREE_EXTENSION: &str = "
INSERT OR IGNORE INTO gpkg_extensions
  (table_name, column_name, extension_name, definition, scope)
VALUES
  (?1, ?2, 'gpkg_rtree_index', 'https://www.geopackage.org/spec140/index.html#extension_rtree', 'write-only')
";

pub(crate) const SQL_SRS_EXISTS: &str =
    "SELECT EXISTS(SELECT 1 FROM gpkg_spatial_ref_sys WHERE srs_id = ?1)";

/// WKT definition for SWEREF99 TM (EPSG:3006), the Swedish national grid
/// used by the example binaries. GeoPackage files must carry the full SRS
/// definition, so this crate bundles the one SRS its drivers rely on.
pub const SWEREF99_TM_DEFINITION: &str = r#"PROJCS["SWEREF99 TM",GEOGCS["SWEREF99",DATUM["SWEREF99",SPHEROID["GRS 1980",6378137,298.257222101,AUTHORITY["EPSG","7019"]],AUTHORITY["EPSG","6619"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4619"]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",15],PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Northing",NORTH],AXIS["Easting",EAST],AUTHORITY["EPSG","3006"]]"#;

pub(crate) fn initialize_gpkg(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SQL_PRAGMAS)?;
    conn.execute_batch(SQL_GPKG_SPATIAL_REF_SYS)?;
    register_default_srs_ids(conn)?;
    conn.execute_batch(SQL_GPKG_CONTENTS)?;
    conn.execute_batch(SQL_GPKG_GEOMETRY_COLUMNS)?;
    conn.execute_batch(SQL_GPKG_EXTENSIONS)?;
    Ok(())
}

// The three SRS rows every GeoPackage must contain: WGS 84 plus the two
// "undefined" placeholders. Anything else goes through Gpkg::register_srs.
fn register_default_srs_ids(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    const EPSG4326_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

    let sql = "INSERT INTO gpkg_spatial_ref_sys \
            (srs_name, srs_id, organization, organization_coordsys_id, definition, description) \
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
    conn.execute(
        sql,
        rusqlite::params!["WGS 84", 4326, "EPSG", 4326, EPSG4326_WKT, "WGS 84"],
    )?;
    conn.execute(
        sql,
        rusqlite::params![
            "Undefined Cartesian SRS",
            -1,
            "NONE",
            -1,
            "undefined",
            "undefined Cartesian coordinate reference system"
        ],
    )?;
    conn.execute(
        sql,
        rusqlite::params![
            "Undefined geographic SRS",
            0,
            "NONE",
            0,
            "undefined",
            "undefined geographic coordinate reference system"
        ],
    )?;
    Ok(())
}

pub(crate) fn sql_create_table(layer_name: &str, column_defs: &str) -> String {
    format!(r#"CREATE TABLE "{layer_name}" ({column_defs})"#)
}

pub(crate) fn sql_drop_table(layer_name: &str) -> String {
    format!(r#"DROP TABLE "{layer_name}""#)
}

pub(crate) const SQL_TABLE_COLUMNS: &str =
    "SELECT name, type, pk FROM pragma_table_info(?1)";

// Geometry and primary key always come first in SELECTed rows so readers
// don't have to look their positions up per row.
fn feature_column_list<'a, I>(geometry_column: &str, primary_key_column: &str, others: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut columns = vec![
        format!(r#""{geometry_column}""#),
        format!(r#""{primary_key_column}""#),
    ];
    columns.extend(others.into_iter().map(|name| format!(r#""{name}""#)));
    columns.join(", ")
}

pub(crate) fn sql_select_features<'a, I>(
    layer_name: &str,
    geometry_column: &str,
    primary_key_column: &str,
    other_columns: I,
    options: &ReadOptions,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = feature_column_list(geometry_column, primary_key_column, other_columns);

    let where_clause = match &options.filter {
        Some(predicate) => format!("WHERE {predicate} "),
        None => String::new(),
    };
    let order_column = options.order_by.as_deref().unwrap_or(primary_key_column);
    let limit_clause = match options.limit {
        Some(n) => format!(" LIMIT {n}"),
        None => String::new(),
    };

    format!(
        r#"SELECT {columns} FROM "{layer_name}" {where_clause}ORDER BY "{order_column}"{limit_clause}"#
    )
}

pub(crate) fn sql_select_features_batch<'a, I>(
    layer_name: &str,
    geometry_column: &str,
    primary_key_column: &str,
    other_columns: I,
    batch_size: u32,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = feature_column_list(geometry_column, primary_key_column, other_columns);
    format!(
        r#"SELECT {columns} FROM "{layer_name}" ORDER BY "{primary_key_column}" LIMIT {batch_size} OFFSET ?"#
    )
}

/// Envelope query against the R-tree. Parameters: min_x, min_y, max_x, max_y.
///
/// The R-tree stores f32 bounds rounded outward, so its hits are only
/// candidates. The `ST_*` predicates re-check each one against the exact
/// f64 envelope, keeping the result identical to the full-scan plan.
pub(crate) fn sql_select_features_in_envelope_rtree<'a, I>(
    layer_name: &str,
    geometry_column: &str,
    primary_key_column: &str,
    other_columns: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut columns = vec![
        format!(r#""{layer_name}"."{geometry_column}""#),
        format!(r#""{layer_name}"."{primary_key_column}""#),
    ];
    columns.extend(
        other_columns
            .into_iter()
            .map(|name| format!(r#""{layer_name}"."{name}""#)),
    );
    let geom = format!(r#""{layer_name}"."{geometry_column}""#);

    format!(
        r#"SELECT {columns} FROM "{layer_name}"
JOIN "rtree_{layer_name}_{geometry_column}" idx ON "{layer_name}"."{primary_key_column}" = idx.id
WHERE idx.maxx >= ?1 AND idx.maxy >= ?2 AND idx.minx <= ?3 AND idx.miny <= ?4
  AND ST_MaxX({geom}) >= ?1 AND ST_MaxY({geom}) >= ?2
  AND ST_MinX({geom}) <= ?3 AND ST_MinY({geom}) <= ?4
ORDER BY "{layer_name}"."{primary_key_column}""#,
        columns = columns.join(", "),
    )
}

/// Envelope query without an index: full scan through the ST_* functions.
/// Parameters: min_x, min_y, max_x, max_y.
pub(crate) fn sql_select_features_in_envelope_scan<'a, I>(
    layer_name: &str,
    geometry_column: &str,
    primary_key_column: &str,
    other_columns: I,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = feature_column_list(geometry_column, primary_key_column, other_columns);
    format!(
        r#"SELECT {columns} FROM "{layer_name}"
WHERE "{geometry_column}" NOT NULL AND NOT ST_IsEmpty("{geometry_column}")
  AND ST_MaxX("{geometry_column}") >= ?1 AND ST_MaxY("{geometry_column}") >= ?2
  AND ST_MinX("{geometry_column}") <= ?3 AND ST_MinY("{geometry_column}") <= ?4
ORDER BY "{primary_key_column}""#
    )
}

pub(crate) fn sql_count(layer_name: &str, predicate: Option<&str>) -> String {
    match predicate {
        Some(predicate) => {
            format!(r#"SELECT COUNT(*) FROM "{layer_name}" WHERE {predicate}"#)
        }
        None => format!(r#"SELECT COUNT(*) FROM "{layer_name}""#),
    }
}

pub(crate) fn sql_delete_where(layer_name: &str, predicate: Option<&str>) -> String {
    match predicate {
        Some(predicate) => format!(r#"DELETE FROM "{layer_name}" WHERE {predicate}"#),
        None => format!(r#"DELETE FROM "{layer_name}""#),
    }
}

pub(crate) fn sql_insert_feature(
    layer_name: &str,
    columns: &str,
    values: &str,
    conflict: ConflictPolicy,
) -> String {
    let verb = crate::conversions::conflict_to_insert_sql(conflict);
    format!(r#"{verb} INTO "{layer_name}" ({columns}) VALUES ({values})"#)
}

// cf. https://www.geopackage.org/spec140/index.html#extension_rtree
pub(crate) fn rtree_table_name(table: &str, geom_column: &str) -> String {
    format!("rtree_{table}_{geom_column}")
}

pub(crate) fn gpkg_rtree_create_sql(table: &str, geom_column: &str) -> String {
    format!(
        "CREATE VIRTUAL TABLE \"rtree_{t}_{c}\" USING rtree(id, minx, maxx, miny, maxy);",
        t = table,
        c = geom_column,
    )
}

/// One-pass index population: read every row, compute its bounding box,
/// insert it. NULL and empty geometries are skipped.
pub(crate) fn gpkg_rtree_load_sql(table: &str, geom_column: &str, id_column: &str) -> String {
    format!(
        "INSERT OR REPLACE INTO \"rtree_{t}_{c}\"
  SELECT \"{i}\", ST_MinX(\"{c}\"), ST_MaxX(\"{c}\"), ST_MinY(\"{c}\"), ST_MaxY(\"{c}\")
  FROM \"{t}\" WHERE \"{c}\" NOT NULL AND NOT ST_IsEmpty(\"{c}\");",
        t = table,
        c = geom_column,
        i = id_column
    )
}

pub(crate) fn gpkg_rtree_teardown_sql(table: &str, geom_column: &str) -> String {
    let trigger_names = [
        "insert", "update2", "update4", "update5", "update6", "update7", "delete",
    ];
    let mut sql = String::new();
    for name in trigger_names {
        sql.push_str(&format!(
            "DROP TRIGGER IF EXISTS \"rtree_{table}_{geom_column}_{name}\";\n"
        ));
    }
    sql.push_str(&format!(
        "DROP TABLE IF EXISTS \"rtree_{table}_{geom_column}\";\n"
    ));
    sql
}

pub(crate) fn gpkg_rtree_triggers_sql(table: &str, geom_column: &str, id_column: &str) -> String {
    format!(
        "CREATE TRIGGER \"rtree_{t}_{c}_insert\" AFTER INSERT ON \"{t}\"
  WHEN (NEW.\"{c}\" NOT NULL AND NOT ST_IsEmpty(NEW.\"{c}\"))
BEGIN
  INSERT OR REPLACE INTO \"rtree_{t}_{c}\" VALUES (
    NEW.\"{i}\",
    ST_MinX(NEW.\"{c}\"), ST_MaxX(NEW.\"{c}\"),
    ST_MinY(NEW.\"{c}\"), ST_MaxY(NEW.\"{c}\")
  );
END;

CREATE TRIGGER \"rtree_{t}_{c}_update2\" AFTER UPDATE OF \"{c}\" ON \"{t}\"
  WHEN OLD.\"{i}\" = NEW.\"{i}\" AND
       (NEW.\"{c}\" ISNULL OR ST_IsEmpty(NEW.\"{c}\"))
BEGIN
  DELETE FROM \"rtree_{t}_{c}\" WHERE id = OLD.\"{i}\";
END;

CREATE TRIGGER \"rtree_{t}_{c}_update4\" AFTER UPDATE ON \"{t}\"
  WHEN OLD.\"{i}\" != NEW.\"{i}\" AND
       (NEW.\"{c}\" ISNULL OR ST_IsEmpty(NEW.\"{c}\"))
BEGIN
  DELETE FROM \"rtree_{t}_{c}\" WHERE id IN (OLD.\"{i}\", NEW.\"{i}\");
END;

CREATE TRIGGER \"rtree_{t}_{c}_update5\" AFTER UPDATE ON \"{t}\"
  WHEN OLD.\"{i}\" != NEW.\"{i}\" AND
       (NEW.\"{c}\" NOTNULL AND NOT ST_IsEmpty(NEW.\"{c}\"))
BEGIN
  DELETE FROM \"rtree_{t}_{c}\" WHERE id = OLD.\"{i}\";
  INSERT OR REPLACE INTO \"rtree_{t}_{c}\" VALUES (
    NEW.\"{i}\",
    ST_MinX(NEW.\"{c}\"), ST_MaxX(NEW.\"{c}\"),
    ST_MinY(NEW.\"{c}\"), ST_MaxY(NEW.\"{c}\")
  );
END;

CREATE TRIGGER \"rtree_{t}_{c}_update6\" AFTER UPDATE OF \"{c}\" ON \"{t}\"
  WHEN OLD.\"{i}\" = NEW.\"{i}\" AND
       (NEW.\"{c}\" NOTNULL AND NOT ST_IsEmpty(NEW.\"{c}\")) AND
       (OLD.\"{c}\" NOTNULL AND NOT ST_IsEmpty(OLD.\"{c}\"))
BEGIN
  UPDATE \"rtree_{t}_{c}\" SET
    minx = ST_MinX(NEW.\"{c}\"),
    maxx = ST_MaxX(NEW.\"{c}\"),
    miny = ST_MinY(NEW.\"{c}\"),
    maxy = ST_MaxY(NEW.\"{c}\")
  WHERE id = NEW.\"{i}\";
END;

CREATE TRIGGER \"rtree_{t}_{c}_update7\" AFTER UPDATE OF \"{c}\" ON \"{t}\"
  WHEN OLD.\"{i}\" = NEW.\"{i}\" AND
       (NEW.\"{c}\" NOTNULL AND NOT ST_IsEmpty(NEW.\"{c}\")) AND
       (OLD.\"{c}\" ISNULL OR ST_IsEmpty(OLD.\"{c}\"))
BEGIN
  INSERT INTO \"rtree_{t}_{c}\" VALUES (
    NEW.\"{i}\",
    ST_MinX(NEW.\"{c}\"), ST_MaxX(NEW.\"{c}\"),
    ST_MinY(NEW.\"{c}\"), ST_MaxY(NEW.\"{c}\")
  );
END;

CREATE TRIGGER \"rtree_{t}_{c}_delete\" AFTER DELETE ON \"{t}\"
  WHEN OLD.\"{c}\" NOT NULL
BEGIN
  DELETE FROM \"rtree_{t}_{c}\" WHERE id = OLD.\"{i}\";
END;",
        t = table,
        c = geom_column,
        i = id_column
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReadOptions;

    #[test]
    fn select_features_defaults_to_primary_key_order() {
        let sql = sql_select_features("points", "geom", "fid", [], &ReadOptions::default());
        assert_eq!(sql, r#"SELECT "geom", "fid" FROM "points" ORDER BY "fid""#);
    }

    #[test]
    fn select_features_with_all_options() {
        let options = ReadOptions {
            filter: Some("kind = 'city'".to_string()),
            order_by: Some("name".to_string()),
            limit: Some(10),
        };
        let sql = sql_select_features("points", "geom", "fid", ["name", "kind"], &options);
        assert_eq!(
            sql,
            r#"SELECT "geom", "fid", "name", "kind" FROM "points" WHERE kind = 'city' ORDER BY "name" LIMIT 10"#
        );
    }

    #[test]
    fn count_and_delete_with_optional_predicate() {
        assert_eq!(sql_count("points", None), r#"SELECT COUNT(*) FROM "points""#);
        assert_eq!(
            sql_count("points", Some("value > 3")),
            r#"SELECT COUNT(*) FROM "points" WHERE value > 3"#
        );
        assert_eq!(
            sql_delete_where("points", Some("value > 3")),
            r#"DELETE FROM "points" WHERE value > 3"#
        );
    }

    #[test]
    fn teardown_covers_all_rtree_artifacts() {
        let sql = gpkg_rtree_teardown_sql("points", "geom");
        assert!(sql.contains("DROP TRIGGER IF EXISTS \"rtree_points_geom_insert\";"));
        assert!(sql.contains("DROP TRIGGER IF EXISTS \"rtree_points_geom_update7\";"));
        assert!(sql.contains("DROP TABLE IF EXISTS \"rtree_points_geom\";"));
    }

    #[test]
    fn rtree_envelope_query_rechecks_exact_bounds() {
        let sql = sql_select_features_in_envelope_rtree("points", "geom", "fid", []);
        assert!(sql.contains("idx.maxx >= ?1"));
        assert!(sql.contains(r#"ST_MaxX("points"."geom") >= ?1"#));
        assert!(sql.contains(r#"ST_MinY("points"."geom") <= ?4"#));
    }
}
