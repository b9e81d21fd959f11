use crate::Result;
use crate::gpkg::GpkgFeature;
use rusqlite;
use std::collections::HashMap;
use std::sync::Arc;

use super::feature::row_to_feature;

/// Iterator that yields batches of features from a layer.
///
/// Each call to `next()` returns a `Result<Vec<GpkgFeature>>` containing up
/// to `batch_size` features, re-running the underlying SELECT with a moving
/// OFFSET so only one batch is resident at a time.
pub struct FeatureBatchIterator<'a> {
    pub(super) stmt: rusqlite::Statement<'a>,
    pub(super) geometry_column: String,
    pub(super) primary_key_column: String,
    pub(super) property_count: usize,
    pub(super) property_index_by_name: Arc<HashMap<String, usize>>,
    pub(super) batch_size: u32,
    pub(super) offset: u32,
    pub(super) end_or_invalid_state: bool,
}

impl<'a> Iterator for FeatureBatchIterator<'a> {
    type Item = Result<Vec<GpkgFeature>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end_or_invalid_state {
            return None;
        }

        let result = self.stmt.query_map([self.offset], |row| {
            row_to_feature(
                row,
                &self.geometry_column,
                &self.primary_key_column,
                self.property_count,
                &self.property_index_by_name,
            )
        });

        let collected_result = match result {
            Ok(mapped_rows) => mapped_rows.collect::<rusqlite::Result<Vec<GpkgFeature>>>(),
            Err(e) => {
                self.end_or_invalid_state = true;
                return Some(Err(e.into()));
            }
        };

        let features = match collected_result {
            Ok(features) => features,
            Err(e) => {
                self.end_or_invalid_state = true;
                return Some(Err(e.into()));
            }
        };

        // A short batch means the scan reached the end of the layer.
        let result_size = features.len();
        if result_size < self.batch_size as usize {
            self.end_or_invalid_state = true;
            if features.is_empty() {
                return None;
            }
        }

        self.offset += result_size as u32;

        Some(Ok(features))
    }
}
