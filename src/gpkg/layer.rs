use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    SQL_INSERT_RTREE_EXTENSION, gpkg_rtree_create_sql, gpkg_rtree_load_sql,
    gpkg_rtree_teardown_sql, gpkg_rtree_triggers_sql, rtree_table_name, sql_count,
    sql_delete_where, sql_insert_feature, sql_select_features, sql_select_features_batch,
    sql_select_features_in_envelope_rtree, sql_select_features_in_envelope_scan,
};
use crate::types::{BulkInsertOptions, ColumnSpec, ConflictPolicy, Envelope, ReadOptions};
use geo_traits::GeometryTrait;
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::batch_iterator::FeatureBatchIterator;
use super::feature::{geometry_to_gpkg_blob, property_index_by_name, row_to_feature};
use super::{Gpkg, GpkgFeature};

/// A GeoPackage feature layer with geometry metadata and column specs.
#[derive(Debug)]
pub struct GpkgLayer<'a> {
    gpkg: &'a Gpkg,
    pub layer_name: String,
    pub geometry_column: String,
    pub primary_key_column: String,
    pub geometry_type: wkb::reader::GeometryType,
    pub geometry_dimension: wkb::reader::Dimension,
    pub srs_id: u32,
    pub property_columns: Vec<ColumnSpec>,
    property_index_by_name: Arc<HashMap<String, usize>>,
    insert_sql: String,
}

impl<'a> GpkgLayer<'a> {
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        gpkg: &'a Gpkg,
        layer_name: String,
        geometry_column: String,
        primary_key_column: String,
        geometry_type: wkb::reader::GeometryType,
        geometry_dimension: wkb::reader::Dimension,
        srs_id: u32,
        property_columns: Vec<ColumnSpec>,
    ) -> Self {
        let insert_sql = build_insert_sql(
            &layer_name,
            &geometry_column,
            &property_columns,
            ConflictPolicy::Abort,
        );
        let property_index_by_name = Arc::new(property_index_by_name(&property_columns));

        Self {
            gpkg,
            layer_name,
            geometry_column,
            primary_key_column,
            geometry_type,
            geometry_dimension,
            srs_id,
            property_columns,
            property_index_by_name,
            insert_sql,
        }
    }

    /// Insert a single feature in its own autocommit statement.
    ///
    /// Property values must be ordered like the layer's property columns.
    /// This is the simple code path; for loading many features at once,
    /// [`bulk_insert`](Self::bulk_insert) is considerably faster.
    pub fn insert<G>(&self, geometry: G, properties: Vec<Value>) -> Result<()>
    where
        G: GeometryTrait<T = f64>,
    {
        self.ensure_writable()?;
        self.check_property_count(properties.len())?;

        let blob = geometry_to_gpkg_blob(&geometry, self.srs_id)?;
        let params = std::iter::once(Value::Blob(blob)).chain(properties);

        let mut stmt = self.connection().prepare_cached(&self.insert_sql)?;
        stmt.execute(params_from_iter(params))?;
        Ok(())
    }

    /// Load many features, committing one transaction per batch.
    ///
    /// Returns the number of rows actually inserted, which can be lower
    /// than the record count under [`ConflictPolicy::Ignore`]. An empty
    /// record iterator is a no-op.
    pub fn bulk_insert<G, R>(&self, records: R, options: &BulkInsertOptions) -> Result<usize>
    where
        G: GeometryTrait<T = f64>,
        R: IntoIterator<Item = (G, Vec<Value>)>,
    {
        self.ensure_writable()?;

        let batch_size = options.batch_size.max(1);
        let sql = build_insert_sql(
            &self.layer_name,
            &self.geometry_column,
            &self.property_columns,
            options.conflict,
        );

        let conn = self.connection();
        let mut records = records.into_iter();
        let mut inserted = 0usize;

        loop {
            let tx = conn.unchecked_transaction()?;
            let mut in_batch = 0usize;
            {
                let mut stmt = tx.prepare_cached(&sql)?;
                while in_batch < batch_size {
                    let Some((geometry, properties)) = records.next() else {
                        break;
                    };
                    self.check_property_count(properties.len())?;

                    let blob = geometry_to_gpkg_blob(&geometry, self.srs_id)?;
                    let params = std::iter::once(Value::Blob(blob)).chain(properties);
                    inserted += stmt.execute(params_from_iter(params))?;
                    in_batch += 1;
                }
            }
            tx.commit()?;

            if in_batch < batch_size {
                break;
            }
        }

        if options.spatial_index && !self.has_spatial_index()? {
            self.build_spatial_index()?;
        }

        Ok(inserted)
    }

    /// Read features, optionally filtered, ordered and limited.
    pub fn features(&self, options: &ReadOptions) -> Result<Vec<GpkgFeature>> {
        let sql = sql_select_features(
            &self.layer_name,
            &self.geometry_column,
            &self.primary_key_column,
            self.property_column_names(),
            options,
        );
        self.query_features(&sql, [])
    }

    /// Iterate over the layer in chunks of `batch_size` features.
    ///
    /// This is the streaming alternative to [`features`](Self::features),
    /// which allocates one vector for the whole result set.
    pub fn features_batch(&self, batch_size: u32) -> Result<FeatureBatchIterator<'a>> {
        let batch_size = batch_size.max(1);
        let sql = sql_select_features_batch(
            &self.layer_name,
            &self.geometry_column,
            &self.primary_key_column,
            self.property_column_names(),
            batch_size,
        );
        let stmt = self.connection().prepare(&sql)?;

        Ok(FeatureBatchIterator {
            stmt,
            geometry_column: self.geometry_column.clone(),
            primary_key_column: self.primary_key_column.clone(),
            property_count: self.property_columns.len(),
            property_index_by_name: Arc::clone(&self.property_index_by_name),
            batch_size,
            offset: 0,
            end_or_invalid_state: false,
        })
    }

    /// Features whose bounding box intersects the envelope.
    ///
    /// Uses the R-tree when the layer has one, otherwise falls back to a
    /// full scan through the registered ST_* functions.
    pub fn features_in_envelope(&self, envelope: &Envelope) -> Result<Vec<GpkgFeature>> {
        let sql = if self.has_spatial_index()? {
            sql_select_features_in_envelope_rtree(
                &self.layer_name,
                &self.geometry_column,
                &self.primary_key_column,
                self.property_column_names(),
            )
        } else {
            sql_select_features_in_envelope_scan(
                &self.layer_name,
                &self.geometry_column,
                &self.primary_key_column,
                self.property_column_names(),
            )
        };

        self.query_features(
            &sql,
            rusqlite::params![
                envelope.min_x,
                envelope.min_y,
                envelope.max_x,
                envelope.max_y
            ],
        )
    }

    /// Count all features in the layer.
    pub fn count(&self) -> Result<u64> {
        self.count_with(None)
    }

    /// Count features matching a raw SQL predicate.
    pub fn count_where(&self, predicate: &str) -> Result<u64> {
        self.count_with(Some(predicate))
    }

    /// Delete features matching a raw SQL predicate, returning the number
    /// of rows removed.
    pub fn delete_where(&self, predicate: &str) -> Result<usize> {
        self.ensure_writable()?;
        let sql = sql_delete_where(&self.layer_name, Some(predicate));
        Ok(self.connection().execute(&sql, [])?)
    }

    /// Remove all rows from the layer.
    pub fn truncate(&self) -> Result<usize> {
        self.ensure_writable()?;
        let sql = sql_delete_where(&self.layer_name, None);
        Ok(self.connection().execute(&sql, [])?)
    }

    /// Build (or rebuild) the layer's R-tree spatial index.
    ///
    /// Creates the `rtree_<table>_<column>` virtual table, populates it in a
    /// single pass over the existing rows, installs the maintenance triggers
    /// and announces the extension in `gpkg_extensions`.
    pub fn build_spatial_index(&self) -> Result<()> {
        self.ensure_writable()?;

        let conn = self.connection();
        conn.execute_batch(&gpkg_rtree_teardown_sql(
            &self.layer_name,
            &self.geometry_column,
        ))?;
        conn.execute_batch(&gpkg_rtree_create_sql(
            &self.layer_name,
            &self.geometry_column,
        ))?;
        conn.execute_batch(&gpkg_rtree_load_sql(
            &self.layer_name,
            &self.geometry_column,
            &self.primary_key_column,
        ))?;
        conn.execute_batch(&gpkg_rtree_triggers_sql(
            &self.layer_name,
            &self.geometry_column,
            &self.primary_key_column,
        ))?;
        conn.execute(
            SQL_INSERT_RTREE_EXTENSION,
            rusqlite::params![self.layer_name, self.geometry_column],
        )?;
        Ok(())
    }

    /// Whether the layer currently has an R-tree spatial index.
    pub fn has_spatial_index(&self) -> Result<bool> {
        let name = rtree_table_name(&self.layer_name, &self.geometry_column);
        let exists: i64 = self.connection().query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        Ok(exists != 0)
    }

    fn query_features<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<GpkgFeature>> {
        let mut stmt = self.connection().prepare(sql)?;
        let features = stmt
            .query_map(params, |row| {
                row_to_feature(
                    row,
                    &self.geometry_column,
                    &self.primary_key_column,
                    self.property_columns.len(),
                    &self.property_index_by_name,
                )
            })?
            .collect::<std::result::Result<Vec<GpkgFeature>, _>>()?;
        Ok(features)
    }

    fn count_with(&self, predicate: Option<&str>) -> Result<u64> {
        let sql = sql_count(&self.layer_name, predicate);
        let count: i64 = self.connection().query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn property_column_names(&self) -> impl Iterator<Item = &str> {
        self.property_columns.iter().map(|spec| spec.name.as_str())
    }

    fn check_property_count(&self, got: usize) -> Result<()> {
        let expected = self.property_columns.len();
        if got != expected {
            return Err(GpkgError::InvalidPropertyCount { expected, got });
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.gpkg.ensure_writable()
    }

    fn connection(&self) -> &'a rusqlite::Connection {
        self.gpkg.connection()
    }
}

fn build_insert_sql(
    layer_name: &str,
    geometry_column: &str,
    property_columns: &[ColumnSpec],
    conflict: ConflictPolicy,
) -> String {
    let mut columns = Vec::with_capacity(property_columns.len() + 1);
    columns.push(format!(r#""{geometry_column}""#));
    columns.extend(
        property_columns
            .iter()
            .map(|spec| format!(r#""{}""#, spec.name)),
    );

    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<String>>()
        .join(",");

    sql_insert_feature(layer_name, &columns.join(","), &placeholders, conflict)
}

#[cfg(test)]
mod tests {
    use super::super::Gpkg;
    use crate::Result;
    use crate::error::GpkgError;
    use crate::types::{
        BulkInsertOptions, ColumnSpec, ColumnType, ConflictPolicy, Envelope, LayerOptions,
        ReadOptions,
    };
    use geo_types::Point;
    use rusqlite::types::Value;
    use wkb::reader::{Dimension, GeometryType};

    fn point_layer_columns() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("name", ColumnType::Text),
            ColumnSpec::new("value", ColumnType::Integer),
        ]
    }

    fn new_point_layer(gpkg: &Gpkg, spatial_index: bool) -> Result<super::GpkgLayer<'_>> {
        gpkg.ensure_layer(
            "points",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &point_layer_columns(),
            &LayerOptions { spatial_index },
        )
    }

    fn point_records(n: usize) -> Vec<(Point<f64>, Vec<Value>)> {
        (0..n)
            .map(|i| {
                (
                    Point::new(i as f64, i as f64),
                    vec![Value::Text(format!("p{i}")), Value::Integer(i as i64)],
                )
            })
            .collect()
    }

    #[test]
    fn insert_and_read_back() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;

        layer.insert(
            Point::new(1.0, 2.0),
            vec![Value::Text("alpha".to_string()), Value::Integer(7)],
        )?;

        let features = layer.features(&ReadOptions::default())?;
        assert_eq!(features.len(), 1);

        let feature = &features[0];
        assert_eq!(feature.id(), 1);
        let name: String = feature.property("name")?;
        assert_eq!(name, "alpha");
        let value: i64 = feature.property("value")?;
        assert_eq!(value, 7);

        let geom = feature.geometry()?;
        assert_eq!(geom.geometry_type(), GeometryType::Point);
        Ok(())
    }

    #[test]
    fn insert_rejects_wrong_property_count() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;

        let err = layer
            .insert(Point::new(0.0, 0.0), vec![Value::Integer(1)])
            .expect_err("one property instead of two");
        assert!(matches!(
            err,
            GpkgError::InvalidPropertyCount {
                expected: 2,
                got: 1
            }
        ));
        Ok(())
    }

    #[test]
    fn bulk_insert_commits_all_batches() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;

        // 7 records with batch size 3: two full batches plus a short one.
        let inserted = layer.bulk_insert(
            point_records(7),
            &BulkInsertOptions {
                batch_size: 3,
                ..Default::default()
            },
        )?;

        assert_eq!(inserted, 7);
        assert_eq!(layer.count()?, 7);
        Ok(())
    }

    #[test]
    fn bulk_insert_empty_iterator_is_noop() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;

        let inserted = layer.bulk_insert(point_records(0), &BulkInsertOptions::default())?;
        assert_eq!(inserted, 0);
        assert_eq!(layer.count()?, 0);
        Ok(())
    }

    #[test]
    fn bulk_insert_ignore_skips_conflicting_rows() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let columns = vec![ColumnSpec::new("code", ColumnType::Text)];
        let layer = gpkg.ensure_layer(
            "stations",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &columns,
            &LayerOptions::default(),
        )?;
        gpkg.connection()
            .execute_batch("CREATE UNIQUE INDEX stations_code ON stations(code)")?;

        let records = vec![
            (Point::new(0.0, 0.0), vec![Value::Text("A".to_string())]),
            (Point::new(1.0, 1.0), vec![Value::Text("B".to_string())]),
            (Point::new(2.0, 2.0), vec![Value::Text("A".to_string())]),
        ];
        let inserted = layer.bulk_insert(
            records,
            &BulkInsertOptions {
                conflict: ConflictPolicy::Ignore,
                ..Default::default()
            },
        )?;

        assert_eq!(inserted, 2);
        assert_eq!(layer.count()?, 2);
        Ok(())
    }

    #[test]
    fn bulk_insert_builds_index_when_requested() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;
        assert!(!layer.has_spatial_index()?);

        layer.bulk_insert(
            point_records(10),
            &BulkInsertOptions {
                spatial_index: true,
                ..Default::default()
            },
        )?;

        assert!(layer.has_spatial_index()?);
        let indexed: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM rtree_points_geom",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(indexed, 10);
        Ok(())
    }

    #[test]
    fn features_respect_filter_order_and_limit() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;
        layer.bulk_insert(point_records(10), &BulkInsertOptions::default())?;

        let options = ReadOptions {
            filter: Some("value >= 5".to_string()),
            order_by: Some("value".to_string()),
            limit: Some(3),
        };
        let features = layer.features(&options)?;

        assert_eq!(features.len(), 3);
        let values: Vec<i64> = features
            .iter()
            .map(|f| f.property("value"))
            .collect::<Result<_>>()?;
        assert_eq!(values, vec![5, 6, 7]);
        Ok(())
    }

    #[test]
    fn count_and_delete_by_predicate() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;
        layer.bulk_insert(point_records(10), &BulkInsertOptions::default())?;

        assert_eq!(layer.count()?, 10);
        assert_eq!(layer.count_where("value < 4")?, 4);

        let deleted = layer.delete_where("value < 4")?;
        assert_eq!(deleted, 4);
        assert_eq!(layer.count()?, 6);

        let deleted = layer.truncate()?;
        assert_eq!(deleted, 6);
        assert_eq!(layer.count()?, 0);
        Ok(())
    }

    #[test]
    fn features_preserve_dynamic_value_types() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let columns = vec![
            ColumnSpec::new("label", ColumnType::Text),
            ColumnSpec::new("score", ColumnType::Double),
            ColumnSpec::new("payload", ColumnType::Blob),
        ];
        let layer = gpkg.ensure_layer(
            "mixed",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &columns,
            &LayerOptions::default(),
        )?;

        layer.insert(
            Point::new(1.0, 2.0),
            vec![
                Value::Text("alpha".to_string()),
                Value::Real(0.5),
                Value::Blob(vec![1, 2, 3]),
            ],
        )?;
        layer.insert(
            Point::new(3.0, 4.0),
            vec![Value::Null, Value::Null, Value::Null],
        )?;

        let features = layer.features(&ReadOptions::default())?;
        assert_eq!(
            features[0].property::<Value>("label")?,
            Value::Text("alpha".to_string())
        );
        assert_eq!(features[0].property::<Value>("score")?, Value::Real(0.5));
        assert_eq!(
            features[0].property::<Value>("payload")?,
            Value::Blob(vec![1, 2, 3])
        );
        assert_eq!(features[1].property::<Value>("label")?, Value::Null);
        let score: Option<f64> = features[1].property("score")?;
        assert!(score.is_none());
        Ok(())
    }

    #[test]
    fn envelope_query_matches_with_and_without_index() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;
        layer.bulk_insert(point_records(20), &BulkInsertOptions::default())?;

        let envelope = Envelope::new(4.5, 4.5, 9.5, 9.5);

        let scanned = layer.features_in_envelope(&envelope)?;
        let scanned_ids: Vec<i64> = scanned.iter().map(|f| f.id()).collect();

        layer.build_spatial_index()?;
        let indexed = layer.features_in_envelope(&envelope)?;
        let indexed_ids: Vec<i64> = indexed.iter().map(|f| f.id()).collect();

        // Points at (5,5)..(9,9), fids are 1-based.
        assert_eq!(scanned_ids, vec![6, 7, 8, 9, 10]);
        assert_eq!(indexed_ids, scanned_ids);
        Ok(())
    }

    #[test]
    fn rtree_query_rechecks_f32_rounded_bounds() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;

        // x is not representable in f32, so the R-tree stores a slightly
        // widened box. An envelope ending just below x must not match.
        layer.insert(
            Point::new(674_032.123, 6_580_822.456),
            vec![Value::Text("edge".to_string()), Value::Integer(1)],
        )?;

        let outside = Envelope::new(600_000.0, 6_500_000.0, 674_032.1, 6_600_000.0);
        let inside = Envelope::new(600_000.0, 6_500_000.0, 674_032.2, 6_600_000.0);

        assert_eq!(layer.features_in_envelope(&outside)?.len(), 0);
        assert_eq!(layer.features_in_envelope(&inside)?.len(), 1);

        layer.build_spatial_index()?;
        assert_eq!(layer.features_in_envelope(&outside)?.len(), 0);
        assert_eq!(layer.features_in_envelope(&inside)?.len(), 1);
        Ok(())
    }

    #[test]
    fn layer_names_needing_quoting_are_supported() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let columns = vec![ColumnSpec::new("name", ColumnType::Text)];
        let layer = gpkg.ensure_layer(
            "harbour point's layer",
            "geom",
            GeometryType::Point,
            Dimension::Xy,
            4326,
            &columns,
            &LayerOptions { spatial_index: true },
        )?;

        layer.insert(
            Point::new(1.0, 2.0),
            vec![Value::Text("quay".to_string())],
        )?;

        assert!(layer.has_spatial_index()?);
        assert_eq!(layer.count()?, 1);
        let hits = layer.features_in_envelope(&Envelope::new(0.0, 0.0, 5.0, 5.0))?;
        assert_eq!(hits.len(), 1);

        gpkg.delete_layer("harbour point's layer")?;
        assert!(gpkg.list_layers()?.is_empty());
        Ok(())
    }

    #[test]
    fn triggers_keep_index_current_after_build() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, true)?;

        layer.insert(
            Point::new(1.5, -2.0),
            vec![Value::Text("a".to_string()), Value::Integer(1)],
        )?;

        let (min_x, max_x, min_y, max_y): (f64, f64, f64, f64) = gpkg.connection().query_row(
            "SELECT minx, maxx, miny, maxy FROM rtree_points_geom WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        assert_eq!((min_x, max_x, min_y, max_y), (1.5, 1.5, -2.0, -2.0));

        layer.delete_where("value = 1")?;
        let indexed: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM rtree_points_geom",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(indexed, 0);
        Ok(())
    }

    #[test]
    fn rebuilding_index_is_idempotent() -> Result<()> {
        let gpkg = Gpkg::create_in_memory()?;
        let layer = new_point_layer(&gpkg, false)?;
        layer.bulk_insert(point_records(5), &BulkInsertOptions::default())?;

        layer.build_spatial_index()?;
        layer.build_spatial_index()?;

        assert!(layer.has_spatial_index()?);
        let indexed: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM rtree_points_geom",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(indexed, 5);

        let registered: i64 = gpkg.connection().query_row(
            "SELECT COUNT(*) FROM gpkg_extensions WHERE table_name = 'points' AND extension_name = 'gpkg_rtree_index'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(registered, 1);
        Ok(())
    }
}
