//! Geometry model: a tagged variant over the seven OGC simple feature shapes.
//!
//! Every shape carries explicit Z/M flags. A valid geometry has uniform flags:
//! every point reachable from the root has Z iff the root does, likewise M.
//! [`Geometry::check_dimensions`] verifies this and the WKB codec refuses to
//! read or write geometries that break it.

mod convert;
mod data;
mod envelope;
pub(crate) mod wkb;

pub use data::GeometryData;
pub use envelope::Envelope;

use crate::error::{GpkgError, Result};

/// Geometry type names as they appear in `gpkg_geometry_columns` and in WKB type codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Geometry,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GeometryType {
    /// Base WKB type code (without the ISO Z/M offset).
    pub fn wkb_code(self) -> u32 {
        match self {
            Self::Geometry => 0,
            Self::Point => 1,
            Self::LineString => 2,
            Self::Polygon => 3,
            Self::MultiPoint => 4,
            Self::MultiLineString => 5,
            Self::MultiPolygon => 6,
            Self::GeometryCollection => 7,
        }
    }

    pub fn from_wkb_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Point),
            2 => Some(Self::LineString),
            3 => Some(Self::Polygon),
            4 => Some(Self::MultiPoint),
            5 => Some(Self::MultiLineString),
            6 => Some(Self::MultiPolygon),
            7 => Some(Self::GeometryCollection),
            _ => None,
        }
    }

    /// Whether a value of type `other` may be stored in a column declared as `self`.
    ///
    /// GEOMETRY accepts everything, GEOMETRYCOLLECTION accepts the Multi* types,
    /// and every other type only accepts itself.
    pub fn is_assignable_from(self, other: GeometryType) -> bool {
        match self {
            Self::Geometry => true,
            Self::GeometryCollection => matches!(
                other,
                Self::GeometryCollection
                    | Self::MultiPoint
                    | Self::MultiLineString
                    | Self::MultiPolygon
            ),
            _ => self == other,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: None,
        }
    }

    pub fn new_z(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            m: None,
        }
    }

    pub fn new_m(x: f64, y: f64, m: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            m: Some(m),
        }
    }

    pub fn new_zm(x: f64, y: f64, z: f64, m: f64) -> Self {
        Self {
            x,
            y,
            z: Some(z),
            m: Some(m),
        }
    }

    /// An empty point, encoded in WKB with NaN coordinates.
    pub fn empty(has_z: bool, has_m: bool) -> Self {
        Self {
            x: f64::NAN,
            y: f64::NAN,
            z: has_z.then_some(f64::NAN),
            m: has_m.then_some(f64::NAN),
        }
    }

    pub fn has_z(&self) -> bool {
        self.z.is_some()
    }

    pub fn has_m(&self) -> bool {
        self.m.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_nan() && self.y.is_nan()
    }

    fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        close(self.x, other.x, epsilon)
            && close(self.y, other.y, epsilon)
            && close_opt(self.z, other.z, epsilon)
            && close_opt(self.m, other.m, epsilon)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineString {
    pub has_z: bool,
    pub has_m: bool,
    pub points: Vec<Point>,
}

impl LineString {
    pub fn new(has_z: bool, has_m: bool, points: Vec<Point>) -> Result<Self> {
        let line = Self {
            has_z,
            has_m,
            points,
        };
        line.check_dimensions(has_z, has_m)?;
        Ok(line)
    }

    /// Build from points, taking the Z/M flags from the first point.
    pub fn from_points(points: Vec<Point>) -> Result<Self> {
        let (has_z, has_m) = points
            .first()
            .map(|p| (p.has_z(), p.has_m()))
            .unwrap_or((false, false));
        Self::new(has_z, has_m, points)
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    fn check_dimensions(&self, has_z: bool, has_m: bool) -> Result<()> {
        check_flags(self.has_z, self.has_m, has_z, has_m)?;
        for point in &self.points {
            check_flags(point.has_z(), point.has_m(), has_z, has_m)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    pub has_z: bool,
    pub has_m: bool,
    /// The exterior ring first, holes after it.
    pub rings: Vec<LineString>,
}

impl Polygon {
    pub fn new(has_z: bool, has_m: bool, rings: Vec<LineString>) -> Result<Self> {
        let polygon = Self {
            has_z,
            has_m,
            rings,
        };
        polygon.check_dimensions(has_z, has_m)?;
        Ok(polygon)
    }

    pub fn exterior(&self) -> Option<&LineString> {
        self.rings.first()
    }

    pub fn interiors(&self) -> &[LineString] {
        self.rings.get(1..).unwrap_or(&[])
    }

    pub fn num_rings(&self) -> usize {
        self.rings.len()
    }

    fn check_dimensions(&self, has_z: bool, has_m: bool) -> Result<()> {
        check_flags(self.has_z, self.has_m, has_z, has_m)?;
        for ring in &self.rings {
            ring.check_dimensions(has_z, has_m)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultiPoint {
    pub has_z: bool,
    pub has_m: bool,
    pub points: Vec<Point>,
}

impl MultiPoint {
    pub fn new(has_z: bool, has_m: bool, points: Vec<Point>) -> Result<Self> {
        for point in &points {
            check_flags(point.has_z(), point.has_m(), has_z, has_m)?;
        }
        Ok(Self {
            has_z,
            has_m,
            points,
        })
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultiLineString {
    pub has_z: bool,
    pub has_m: bool,
    pub line_strings: Vec<LineString>,
}

impl MultiLineString {
    pub fn new(has_z: bool, has_m: bool, line_strings: Vec<LineString>) -> Result<Self> {
        let multi = Self {
            has_z,
            has_m,
            line_strings,
        };
        for line in &multi.line_strings {
            line.check_dimensions(has_z, has_m)?;
        }
        Ok(multi)
    }

    pub fn num_line_strings(&self) -> usize {
        self.line_strings.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultiPolygon {
    pub has_z: bool,
    pub has_m: bool,
    pub polygons: Vec<Polygon>,
}

impl MultiPolygon {
    pub fn new(has_z: bool, has_m: bool, polygons: Vec<Polygon>) -> Result<Self> {
        let multi = Self {
            has_z,
            has_m,
            polygons,
        };
        for polygon in &multi.polygons {
            polygon.check_dimensions(has_z, has_m)?;
        }
        Ok(multi)
    }

    pub fn num_polygons(&self) -> usize {
        self.polygons.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeometryCollection {
    pub has_z: bool,
    pub has_m: bool,
    pub geometries: Vec<Geometry>,
}

impl GeometryCollection {
    pub fn new(has_z: bool, has_m: bool, geometries: Vec<Geometry>) -> Result<Self> {
        let collection = Self {
            has_z,
            has_m,
            geometries,
        };
        for geometry in &collection.geometries {
            geometry.check_dimensions_against(has_z, has_m)?;
        }
        Ok(collection)
    }

    pub fn num_geometries(&self) -> usize {
        self.geometries.len()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
    MultiPoint(MultiPoint),
    MultiLineString(MultiLineString),
    MultiPolygon(MultiPolygon),
    GeometryCollection(GeometryCollection),
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Self::Point(_) => GeometryType::Point,
            Self::LineString(_) => GeometryType::LineString,
            Self::Polygon(_) => GeometryType::Polygon,
            Self::MultiPoint(_) => GeometryType::MultiPoint,
            Self::MultiLineString(_) => GeometryType::MultiLineString,
            Self::MultiPolygon(_) => GeometryType::MultiPolygon,
            Self::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }

    pub fn has_z(&self) -> bool {
        match self {
            Self::Point(p) => p.has_z(),
            Self::LineString(g) => g.has_z,
            Self::Polygon(g) => g.has_z,
            Self::MultiPoint(g) => g.has_z,
            Self::MultiLineString(g) => g.has_z,
            Self::MultiPolygon(g) => g.has_z,
            Self::GeometryCollection(g) => g.has_z,
        }
    }

    pub fn has_m(&self) -> bool {
        match self {
            Self::Point(p) => p.has_m(),
            Self::LineString(g) => g.has_m,
            Self::Polygon(g) => g.has_m,
            Self::MultiPoint(g) => g.has_m,
            Self::MultiLineString(g) => g.has_m,
            Self::MultiPolygon(g) => g.has_m,
            Self::GeometryCollection(g) => g.has_m,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Point(p) => p.is_empty(),
            Self::LineString(g) => g.points.is_empty(),
            Self::Polygon(g) => g.rings.is_empty(),
            Self::MultiPoint(g) => g.points.is_empty(),
            Self::MultiLineString(g) => g.line_strings.is_empty(),
            Self::MultiPolygon(g) => g.polygons.is_empty(),
            Self::GeometryCollection(g) => g.geometries.iter().all(Geometry::is_empty),
        }
    }

    /// Total number of points reachable from this geometry.
    pub fn num_points(&self) -> usize {
        match self {
            Self::Point(_) => 1,
            Self::LineString(g) => g.points.len(),
            Self::Polygon(g) => g.rings.iter().map(LineString::num_points).sum(),
            Self::MultiPoint(g) => g.points.len(),
            Self::MultiLineString(g) => g.line_strings.iter().map(LineString::num_points).sum(),
            Self::MultiPolygon(g) => g
                .polygons
                .iter()
                .flat_map(|p| p.rings.iter())
                .map(LineString::num_points)
                .sum(),
            Self::GeometryCollection(g) => g.geometries.iter().map(Geometry::num_points).sum(),
        }
    }

    /// Verify that every nested shape carries the same Z/M flags as this one.
    pub fn check_dimensions(&self) -> Result<()> {
        self.check_dimensions_against(self.has_z(), self.has_m())
    }

    fn check_dimensions_against(&self, has_z: bool, has_m: bool) -> Result<()> {
        match self {
            Self::Point(p) => check_flags(p.has_z(), p.has_m(), has_z, has_m),
            Self::LineString(g) => g.check_dimensions(has_z, has_m),
            Self::Polygon(g) => g.check_dimensions(has_z, has_m),
            Self::MultiPoint(g) => {
                check_flags(g.has_z, g.has_m, has_z, has_m)?;
                for p in &g.points {
                    check_flags(p.has_z(), p.has_m(), has_z, has_m)?;
                }
                Ok(())
            }
            Self::MultiLineString(g) => {
                check_flags(g.has_z, g.has_m, has_z, has_m)?;
                g.line_strings
                    .iter()
                    .try_for_each(|line| line.check_dimensions(has_z, has_m))
            }
            Self::MultiPolygon(g) => {
                check_flags(g.has_z, g.has_m, has_z, has_m)?;
                g.polygons
                    .iter()
                    .try_for_each(|polygon| polygon.check_dimensions(has_z, has_m))
            }
            Self::GeometryCollection(g) => {
                check_flags(g.has_z, g.has_m, has_z, has_m)?;
                g.geometries
                    .iter()
                    .try_for_each(|geometry| geometry.check_dimensions_against(has_z, has_m))
            }
        }
    }

    /// Visit every point reachable from this geometry.
    pub fn for_each_point<F: FnMut(&Point)>(&self, f: &mut F) {
        match self {
            Self::Point(p) => f(p),
            Self::LineString(g) => g.points.iter().for_each(f),
            Self::Polygon(g) => g.rings.iter().flat_map(|r| r.points.iter()).for_each(f),
            Self::MultiPoint(g) => g.points.iter().for_each(f),
            Self::MultiLineString(g) => g
                .line_strings
                .iter()
                .flat_map(|l| l.points.iter())
                .for_each(f),
            Self::MultiPolygon(g) => g
                .polygons
                .iter()
                .flat_map(|p| p.rings.iter())
                .flat_map(|r| r.points.iter())
                .for_each(f),
            Self::GeometryCollection(g) => {
                for geometry in &g.geometries {
                    geometry.for_each_point(f);
                }
            }
        }
    }

    /// Structural equality where coordinates may differ by at most `epsilon`.
    pub fn approx_eq(&self, other: &Geometry, epsilon: f64) -> bool {
        if self.has_z() != other.has_z() || self.has_m() != other.has_m() {
            return false;
        }
        match (self, other) {
            (Self::Point(a), Self::Point(b)) => a.approx_eq(b, epsilon),
            (Self::LineString(a), Self::LineString(b)) => lines_approx_eq(a, b, epsilon),
            (Self::Polygon(a), Self::Polygon(b)) => polygons_approx_eq(a, b, epsilon),
            (Self::MultiPoint(a), Self::MultiPoint(b)) => {
                a.points.len() == b.points.len()
                    && a.points
                        .iter()
                        .zip(&b.points)
                        .all(|(p, q)| p.approx_eq(q, epsilon))
            }
            (Self::MultiLineString(a), Self::MultiLineString(b)) => {
                a.line_strings.len() == b.line_strings.len()
                    && a.line_strings
                        .iter()
                        .zip(&b.line_strings)
                        .all(|(l, k)| lines_approx_eq(l, k, epsilon))
            }
            (Self::MultiPolygon(a), Self::MultiPolygon(b)) => {
                a.polygons.len() == b.polygons.len()
                    && a.polygons
                        .iter()
                        .zip(&b.polygons)
                        .all(|(p, q)| polygons_approx_eq(p, q, epsilon))
            }
            (Self::GeometryCollection(a), Self::GeometryCollection(b)) => {
                a.geometries.len() == b.geometries.len()
                    && a.geometries
                        .iter()
                        .zip(&b.geometries)
                        .all(|(g, h)| g.approx_eq(h, epsilon))
            }
            _ => false,
        }
    }
}

impl From<Point> for Geometry {
    fn from(value: Point) -> Self {
        Self::Point(value)
    }
}

impl From<LineString> for Geometry {
    fn from(value: LineString) -> Self {
        Self::LineString(value)
    }
}

impl From<Polygon> for Geometry {
    fn from(value: Polygon) -> Self {
        Self::Polygon(value)
    }
}

impl From<MultiPoint> for Geometry {
    fn from(value: MultiPoint) -> Self {
        Self::MultiPoint(value)
    }
}

impl From<MultiLineString> for Geometry {
    fn from(value: MultiLineString) -> Self {
        Self::MultiLineString(value)
    }
}

impl From<MultiPolygon> for Geometry {
    fn from(value: MultiPolygon) -> Self {
        Self::MultiPolygon(value)
    }
}

impl From<GeometryCollection> for Geometry {
    fn from(value: GeometryCollection) -> Self {
        Self::GeometryCollection(value)
    }
}

fn check_flags(has_z: bool, has_m: bool, expected_z: bool, expected_m: bool) -> Result<()> {
    if has_z != expected_z || has_m != expected_m {
        return Err(GpkgError::MalformedWkb(format!(
            "mixed dimensions: expected z={expected_z} m={expected_m}, got z={has_z} m={has_m}"
        )));
    }
    Ok(())
}

fn close(a: f64, b: f64, epsilon: f64) -> bool {
    (a.is_nan() && b.is_nan()) || (a - b).abs() <= epsilon
}

fn close_opt(a: Option<f64>, b: Option<f64>, epsilon: f64) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => close(a, b, epsilon),
        (None, None) => true,
        _ => false,
    }
}

fn lines_approx_eq(a: &LineString, b: &LineString, epsilon: f64) -> bool {
    a.points.len() == b.points.len()
        && a.points
            .iter()
            .zip(&b.points)
            .all(|(p, q)| p.approx_eq(q, epsilon))
}

fn polygons_approx_eq(a: &Polygon, b: &Polygon, epsilon: f64) -> bool {
    a.rings.len() == b.rings.len()
        && a.rings
            .iter()
            .zip(&b.rings)
            .all(|(r, s)| lines_approx_eq(r, s, epsilon))
}
