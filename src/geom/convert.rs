use crate::error::{GpkgError, Result};
use geo_traits::{
    CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, LineStringTrait,
    MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait, PolygonTrait,
};

use super::{
    Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
    Polygon,
};

impl Geometry {
    /// Convert any `geo_traits` geometry (for example `geo_types::Point` or
    /// `wkt::Wkt`) into the crate's model.
    ///
    /// ```
    /// use rusqlite_gpkg_features::Geometry;
    ///
    /// let geometry = Geometry::from_geo(&geo_types::Point::new(1.0, 2.0))?;
    /// assert_eq!(geometry.num_points(), 1);
    /// # Ok::<(), rusqlite_gpkg_features::GpkgError>(())
    /// ```
    pub fn from_geo<G: GeometryTrait<T = f64>>(geometry: &G) -> Result<Self> {
        use geo_traits::GeometryType as GeoType;

        let (has_z, has_m) = match geometry.dim() {
            Dimensions::Xy => (false, false),
            Dimensions::Xyz => (true, false),
            Dimensions::Xym => (false, true),
            Dimensions::Xyzm => (true, true),
            Dimensions::Unknown(n) => {
                return Err(GpkgError::UnsupportedGeometryType(format!(
                    "geometry with {n} dimensions"
                )));
            }
        };

        let converted = match geometry.as_type() {
            GeoType::Point(point) => Geometry::Point(point_from_trait(point, has_z, has_m)),
            GeoType::LineString(line) => {
                Geometry::LineString(line_from_trait(line, has_z, has_m))
            }
            GeoType::Polygon(polygon) => {
                Geometry::Polygon(polygon_from_trait(polygon, has_z, has_m))
            }
            GeoType::MultiPoint(multi) => Geometry::MultiPoint(MultiPoint {
                has_z,
                has_m,
                points: multi
                    .points()
                    .map(|point| point_from_trait(&point, has_z, has_m))
                    .collect(),
            }),
            GeoType::MultiLineString(multi) => Geometry::MultiLineString(MultiLineString {
                has_z,
                has_m,
                line_strings: multi
                    .line_strings()
                    .map(|line| line_from_trait(&line, has_z, has_m))
                    .collect(),
            }),
            GeoType::MultiPolygon(multi) => Geometry::MultiPolygon(MultiPolygon {
                has_z,
                has_m,
                polygons: multi
                    .polygons()
                    .map(|polygon| polygon_from_trait(&polygon, has_z, has_m))
                    .collect(),
            }),
            GeoType::GeometryCollection(collection) => {
                let mut geometries = Vec::with_capacity(collection.num_geometries());
                for member in collection.geometries() {
                    geometries.push(Self::from_geo(&member)?);
                }
                Geometry::GeometryCollection(GeometryCollection::new(has_z, has_m, geometries)?)
            }
            GeoType::Rect(_) => return Err(GpkgError::UnsupportedGeometryType("Rect".into())),
            GeoType::Triangle(_) => {
                return Err(GpkgError::UnsupportedGeometryType("Triangle".into()));
            }
            GeoType::Line(_) => return Err(GpkgError::UnsupportedGeometryType("Line".into())),
        };

        Ok(converted)
    }
}

fn point_from_coord<C: CoordTrait<T = f64>>(coord: &C, has_z: bool, has_m: bool) -> Point {
    let (x, y) = coord.x_y();
    let m_index = if has_z { 3 } else { 2 };
    Point {
        x,
        y,
        z: has_z.then(|| coord.nth(2).unwrap_or(f64::NAN)),
        m: has_m.then(|| coord.nth(m_index).unwrap_or(f64::NAN)),
    }
}

fn point_from_trait<P: PointTrait<T = f64>>(point: &P, has_z: bool, has_m: bool) -> Point {
    match point.coord() {
        Some(coord) => point_from_coord(&coord, has_z, has_m),
        None => Point::empty(has_z, has_m),
    }
}

fn line_from_trait<L: LineStringTrait<T = f64>>(line: &L, has_z: bool, has_m: bool) -> LineString {
    LineString {
        has_z,
        has_m,
        points: line
            .coords()
            .map(|coord| point_from_coord(&coord, has_z, has_m))
            .collect(),
    }
}

fn polygon_from_trait<P: PolygonTrait<T = f64>>(polygon: &P, has_z: bool, has_m: bool) -> Polygon {
    let mut rings = Vec::with_capacity(polygon.num_interiors() + 1);
    if let Some(exterior) = polygon.exterior() {
        rings.push(line_from_trait(&exterior, has_z, has_m));
    }
    for interior in polygon.interiors() {
        rings.push(line_from_trait(&interior, has_z, has_m));
    }
    Polygon {
        has_z,
        has_m,
        rings,
    }
}

#[cfg(test)]
mod tests {
    use crate::geom::{Geometry, GeometryType};
    use geo_types::{LineString, MultiPoint, Point, Polygon};
    use std::str::FromStr;
    use wkt::Wkt;

    #[test]
    fn converts_geo_types() -> crate::Result<()> {
        let polygon = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (3.0, 0.0), (3.0, 3.0), (0.0, 0.0)]),
            vec![LineString::from(vec![(1.0, 1.0), (2.0, 1.0), (1.0, 2.0), (1.0, 1.0)])],
        );
        let geometry = Geometry::from_geo(&polygon)?;
        match &geometry {
            Geometry::Polygon(p) => {
                assert_eq!(p.num_rings(), 2);
                assert_eq!(p.rings[0].points[1].x, 3.0);
            }
            other => panic!("unexpected geometry: {other:?}"),
        }

        let multi = MultiPoint::from(vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)]);
        let geometry = Geometry::from_geo(&multi)?;
        assert_eq!(geometry.geometry_type(), GeometryType::MultiPoint);
        assert_eq!(geometry.num_points(), 2);
        Ok(())
    }

    #[test]
    fn converts_z_and_m_from_wkt() -> crate::Result<()> {
        let point_z = Wkt::<f64>::from_str("POINT Z (1 2 3)").expect("valid wkt");
        let geometry = Geometry::from_geo(&point_z)?;
        assert!(geometry.has_z());
        assert!(!geometry.has_m());
        match geometry {
            Geometry::Point(p) => assert_eq!(p.z, Some(3.0)),
            other => panic!("unexpected geometry: {other:?}"),
        }

        let line_m = Wkt::<f64>::from_str("LINESTRING M (0 0 5, 1 1 6)").expect("valid wkt");
        match Geometry::from_geo(&line_m)? {
            Geometry::LineString(line) => {
                assert!(line.has_m && !line.has_z);
                assert_eq!(line.points[1].m, Some(6.0));
            }
            other => panic!("unexpected geometry: {other:?}"),
        }
        Ok(())
    }
}
