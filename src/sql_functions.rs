use std::collections::HashSet;

use crate::error::{GpkgError, Result};
use crate::geom::{Envelope, GeometryData};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, Error};

/// Register all spatial SQL helper functions in the provided connection.
///
/// `ST_MinX`, `ST_MaxX`, `ST_MinY` and `ST_MaxY` return the bounds of a
/// GeoPackage geometry blob (taken from the header envelope when present),
/// `ST_IsEmpty` returns 1 for empty geometries. All return NULL for NULL input.
///
/// Example:
/// ```no_run
/// use rusqlite::Connection;
/// use rusqlite_gpkg_features::register_spatial_functions;
///
/// let conn = Connection::open_in_memory()?;
/// register_spatial_functions(&conn)?;
/// # Ok::<(), rusqlite_gpkg_features::GpkgError>(())
/// ```
pub fn register_spatial_functions(conn: &Connection) -> Result<()> {
    register_bounds_component(conn, "ST_MinX", |e| e.min_x)?;
    register_bounds_component(conn, "ST_MinY", |e| e.min_y)?;
    register_bounds_component(conn, "ST_MaxX", |e| e.max_x)?;
    register_bounds_component(conn, "ST_MaxY", |e| e.max_y)?;
    register_st_isempty(conn)?;
    Ok(())
}

fn register_st_isempty(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "ST_IsEmpty",
        1,
        FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let data = match geometry_from_ctx(ctx)? {
                Some(data) => data,
                None => return Ok(None),
            };
            let is_empty = data.is_empty() || data.geometry().is_empty();
            Ok(Some(i64::from(is_empty)))
        },
    )?;
    Ok(())
}

fn register_bounds_component<F>(conn: &Connection, name: &str, f: F) -> Result<()>
where
    F: Fn(&Envelope) -> f64 + Copy + Send + Sync + 'static,
{
    conn.create_scalar_function(name, 1, FunctionFlags::SQLITE_DETERMINISTIC, move |ctx| {
        let data = match geometry_from_ctx(ctx)? {
            Some(data) => data,
            None => return Ok(None),
        };
        let envelope = match data.envelope() {
            Some(envelope) => Some(*envelope),
            None => Envelope::from_geometry(data.geometry()),
        };
        Ok(envelope.as_ref().map(f))
    })?;
    Ok(())
}

fn geometry_from_ctx(ctx: &Context<'_>) -> std::result::Result<Option<GeometryData>, Error> {
    match ctx.get_raw(0) {
        ValueRef::Null => Ok(None),
        ValueRef::Blob(blob) => GeometryData::from_bytes(blob)
            .map(Some)
            .map_err(|err| Error::UserFunctionError(Box::new(err))),
        _ => Err(Error::InvalidFunctionParameterType(0, Type::Blob)),
    }
}

/// Optional SQLite capabilities, probed once from a connection.
///
/// Probing queries the compile options and the function and module lists
/// instead of waiting for statements to fail with "no such function" or
/// "no such module" errors.
#[derive(Clone, Debug, Default)]
pub struct SqliteFeatures {
    rtree: bool,
    functions: HashSet<String>,
}

impl SqliteFeatures {
    pub fn probe(conn: &Connection) -> Result<Self> {
        let compiled_rtree: bool =
            conn.query_one("SELECT sqlite_compileoption_used('ENABLE_RTREE')", [], |row| {
                row.get(0)
            })?;
        let rtree_module: bool = conn.query_one(
            "SELECT EXISTS (SELECT 1 FROM pragma_module_list WHERE name = 'rtree')",
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare("SELECT DISTINCT name FROM pragma_function_list")?;
        let functions = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .map(|name| name.map(|n| n.to_ascii_lowercase()))
            .collect::<rusqlite::Result<HashSet<String>>>()?;

        log::debug!(
            "probed SQLite features: rtree={}, {} functions",
            compiled_rtree || rtree_module,
            functions.len()
        );

        Ok(Self {
            rtree: compiled_rtree || rtree_module,
            functions,
        })
    }

    pub fn has_rtree(&self) -> bool {
        self.rtree
    }

    /// Function names are compared case-insensitively.
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains(&name.to_ascii_lowercase())
    }

    pub fn require_rtree(&self) -> Result<()> {
        if self.rtree {
            Ok(())
        } else {
            Err(GpkgError::UnsupportedSqliteFeature("rtree module".to_string()))
        }
    }

    pub fn require_function(&self, name: &str) -> Result<()> {
        if self.has_function(name) {
            Ok(())
        } else {
            Err(GpkgError::UnsupportedSqliteFeature(format!(
                "function {name}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{SqliteFeatures, register_spatial_functions};
    use crate::error::GpkgError;
    use crate::geom::{Geometry, GeometryData};
    use geo_types::{Geometry as GeoGeometry, GeometryCollection, LineString, MultiPoint, Point};
    use rusqlite::{Connection, params};

    fn gpkg_blob_from_geometry<G: geo_traits::GeometryTrait<T = f64>>(
        geometry: G,
    ) -> crate::Result<Vec<u8>> {
        GeometryData::new(4326, Geometry::from_geo(&geometry)?).to_bytes()
    }

    fn bounds(conn: &Connection, blob: &[u8]) -> rusqlite::Result<(f64, f64, f64, f64)> {
        conn.query_row(
            "SELECT ST_MinX(?1), ST_MaxX(?1), ST_MinY(?1), ST_MaxY(?1)",
            params![blob],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
    }

    #[test]
    fn st_bounds_for_point() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let blob = gpkg_blob_from_geometry(Point::new(1.5, -2.0))?;
        assert_eq!(bounds(&conn, &blob)?, (1.5, 1.5, -2.0, -2.0));

        let empty: i64 = conn.query_row("SELECT ST_IsEmpty(?1)", params![blob], |row| row.get(0))?;
        assert_eq!(empty, 0);
        Ok(())
    }

    #[test]
    fn st_is_empty_for_empty_linestring() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let line: LineString<f64> = LineString::new(Vec::new());
        let blob = gpkg_blob_from_geometry(line)?;

        let (minx, empty): (Option<f64>, i64) =
            conn.query_row("SELECT ST_MinX(?1), ST_IsEmpty(?1)", params![blob], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })?;

        assert!(minx.is_none());
        assert_eq!(empty, 1);
        Ok(())
    }

    #[test]
    fn st_bounds_for_collections() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let mp = MultiPoint::from(vec![Point::new(1.0, 5.0), Point::new(-2.0, 3.0)]);
        let blob = gpkg_blob_from_geometry(mp)?;
        assert_eq!(bounds(&conn, &blob)?, (-2.0, 1.0, 3.0, 5.0));

        let point = GeoGeometry::Point(Point::new(5.0, -1.0));
        let line = GeoGeometry::LineString(LineString::from(vec![(-2.0, 2.0), (1.0, 3.0)]));
        let collection = GeometryCollection::from(vec![point, line]);
        let blob = gpkg_blob_from_geometry(collection)?;
        assert_eq!(bounds(&conn, &blob)?, (-2.0, 5.0, -1.0, 3.0));
        Ok(())
    }

    #[test]
    fn st_bounds_prefer_header_envelope() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;

        let mut data = GeometryData::new(4326, Geometry::from_geo(&Point::new(1.0, 1.0))?);
        data.set_envelope(Some(crate::geom::Envelope::new(-10.0, 10.0, -20.0, 20.0)));
        assert_eq!(bounds(&conn, &data.to_bytes()?)?, (-10.0, 10.0, -20.0, 20.0));
        Ok(())
    }

    #[test]
    fn st_functions_reject_garbage() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        register_spatial_functions(&conn)?;
        let result: rusqlite::Result<Option<f64>> =
            conn.query_row("SELECT ST_MinX(x'00ff')", [], |row| row.get(0));
        assert!(result.is_err());
        let null: Option<f64> = conn.query_row("SELECT ST_MinX(NULL)", [], |row| row.get(0))?;
        assert!(null.is_none());
        Ok(())
    }

    #[test]
    fn probes_rtree_and_functions() -> crate::Result<()> {
        let conn = Connection::open_in_memory()?;
        let before = SqliteFeatures::probe(&conn)?;
        assert!(before.has_rtree());
        assert!(before.require_rtree().is_ok());
        assert!(!before.has_function("ST_IsEmpty"));
        assert!(matches!(
            before.require_function("ST_IsEmpty"),
            Err(GpkgError::UnsupportedSqliteFeature(_))
        ));

        register_spatial_functions(&conn)?;
        let after = SqliteFeatures::probe(&conn)?;
        assert!(after.has_function("st_isempty"));
        assert!(after.require_function("ST_MinX").is_ok());
        Ok(())
    }
}
