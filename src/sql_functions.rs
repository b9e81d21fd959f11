//! Scalar SQL functions backing the R-tree extension.
//!
//! The R-tree load statement and maintenance triggers call
//! `ST_MinX`/`ST_MaxX`/`ST_MinY`/`ST_MaxY`/`ST_IsEmpty` on stored GeoPackage
//! geometry blobs, so every connection registers them up front.

use crate::error::Result;
use crate::gpkg::gpkg_blob_to_wkb;
use geo_traits::{
    CoordTrait, GeometryCollectionTrait, GeometryTrait, LineStringTrait, MultiLineStringTrait,
    MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};
use wkb::reader::Wkb;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Bounds {
    pub(crate) min_x: f64,
    pub(crate) max_x: f64,
    pub(crate) min_y: f64,
    pub(crate) max_y: f64,
}

impl Bounds {
    fn of_coord<C: CoordTrait<T = f64>>(coord: &C) -> Self {
        let (x, y) = coord.x_y();
        Self {
            min_x: x,
            max_x: x,
            min_y: y,
            max_y: y,
        }
    }

    fn merge(&mut self, other: Self) {
        self.min_x = self.min_x.min(other.min_x);
        self.max_x = self.max_x.max(other.max_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_y = self.max_y.max(other.max_y);
    }
}

/// Register the envelope helper functions in the provided connection.
pub fn register_envelope_functions(conn: &Connection) -> Result<()> {
    let components: [(&str, fn(&Bounds) -> f64); 4] = [
        ("ST_MinX", |b| b.min_x),
        ("ST_MaxX", |b| b.max_x),
        ("ST_MinY", |b| b.min_y),
        ("ST_MaxY", |b| b.max_y),
    ];
    for (name, component) in components {
        conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
            let Some(wkb) = wkb_from_ctx(ctx)? else {
                return Ok(None);
            };
            Ok(geometry_bounds(&wkb).map(|b| component(&b)))
        })?;
    }

    conn.create_scalar_function(
        "ST_IsEmpty",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let Some(wkb) = wkb_from_ctx(ctx)? else {
                return Ok(None);
            };
            Ok(Some(i64::from(geometry_bounds(&wkb).is_none())))
        },
    )?;
    Ok(())
}

fn wkb_from_ctx<'a>(ctx: &'a Context<'a>) -> std::result::Result<Option<Wkb<'a>>, Error> {
    match ctx.get_raw(0) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => {
            let wkb =
                gpkg_blob_to_wkb(blob).map_err(|err| Error::UserFunctionError(Box::new(err)))?;
            Ok(Some(wkb))
        }
        _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
    }
}

/// Bounding box of a geometry, `None` when it has no coordinates.
pub(crate) fn geometry_bounds<G: GeometryTrait<T = f64>>(geom: &G) -> Option<Bounds> {
    use geo_traits::GeometryType as GeoType;

    let mut bounds: Option<Bounds> = None;
    let mut add = |coord_bounds: Bounds| {
        bounds = Some(match bounds.take() {
            Some(mut existing) => {
                existing.merge(coord_bounds);
                existing
            }
            None => coord_bounds,
        });
    };

    match geom.as_type() {
        GeoType::Point(point) => {
            if let Some(coord) = point.coord() {
                add(Bounds::of_coord(&coord));
            }
        }
        GeoType::LineString(line) => {
            for coord in line.coords() {
                add(Bounds::of_coord(&coord));
            }
        }
        GeoType::Polygon(poly) => {
            for ring in poly.exterior().into_iter().chain(poly.interiors()) {
                for coord in ring.coords() {
                    add(Bounds::of_coord(&coord));
                }
            }
        }
        GeoType::MultiPoint(multi) => {
            for point in multi.points() {
                if let Some(coord) = point.coord() {
                    add(Bounds::of_coord(&coord));
                }
            }
        }
        GeoType::MultiLineString(multi) => {
            for line in multi.line_strings() {
                for coord in line.coords() {
                    add(Bounds::of_coord(&coord));
                }
            }
        }
        GeoType::MultiPolygon(multi) => {
            for poly in multi.polygons() {
                for ring in poly.exterior().into_iter().chain(poly.interiors()) {
                    for coord in ring.coords() {
                        add(Bounds::of_coord(&coord));
                    }
                }
            }
        }
        GeoType::GeometryCollection(collection) => {
            for sub_geom in collection.geometries() {
                if let Some(sub_bounds) = geometry_bounds(&sub_geom) {
                    add(sub_bounds);
                }
            }
        }
        GeoType::Rect(_) | GeoType::Triangle(_) | GeoType::Line(_) => {
            // No GeoPackage geometry types should reach here.
            unreachable!()
        }
    }

    bounds
}
