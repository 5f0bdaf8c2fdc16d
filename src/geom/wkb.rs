//! ISO WKB reader and writer.
//!
//! Each geometry is `byte_order (1) | type_code (4) | payload`. The type code
//! carries the ISO dimension offset: +1000 for Z, +2000 for M, +3000 for ZM.
//! The reader honours the byte-order marker of every nested geometry; the
//! writer emits one byte order throughout.

use crate::error::{GpkgError, Result};
use crate::io::{ByteOrder, ByteReader, ByteWriter};

use super::{
    Geometry, GeometryCollection, GeometryType, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Point, Polygon,
};

// Smallest encoding of a tagged sub-geometry: marker, type code and a u32 count.
const MIN_TAGGED_SIZE: usize = 1 + 4 + 4;

// Multi* and GeometryCollection members are decoded recursively.
const MAX_NESTING_DEPTH: usize = 64;

impl Geometry {
    /// Decode a complete WKB buffer.
    pub fn from_wkb(bytes: &[u8]) -> Result<Self> {
        read_wkb(bytes).map(|(geometry, _)| geometry)
    }

    /// Encode as WKB with the given byte order.
    pub fn to_wkb(&self, byte_order: ByteOrder) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::with_capacity(byte_order, self.wkb_size());
        write_geometry(&mut writer, self)?;
        Ok(writer.finish())
    }

    /// Number of bytes `to_wkb` produces.
    pub fn wkb_size(&self) -> usize {
        let point_size = coord_size(self.has_z(), self.has_m());
        let header = 1 + 4;
        match self {
            Self::Point(_) => header + point_size,
            Self::LineString(g) => header + 4 + g.points.len() * point_size,
            Self::Polygon(g) => header + polygon_body_size(g, point_size),
            Self::MultiPoint(g) => header + 4 + g.points.len() * (header + point_size),
            Self::MultiLineString(g) => {
                header
                    + 4
                    + g.line_strings
                        .iter()
                        .map(|l| header + 4 + l.points.len() * point_size)
                        .sum::<usize>()
            }
            Self::MultiPolygon(g) => {
                header
                    + 4
                    + g.polygons
                        .iter()
                        .map(|p| header + polygon_body_size(p, point_size))
                        .sum::<usize>()
            }
            Self::GeometryCollection(g) => {
                header + 4 + g.geometries.iter().map(Geometry::wkb_size).sum::<usize>()
            }
        }
    }
}

fn polygon_body_size(polygon: &Polygon, point_size: usize) -> usize {
    4 + polygon
        .rings
        .iter()
        .map(|r| 4 + r.points.len() * point_size)
        .sum::<usize>()
}

fn coord_size(has_z: bool, has_m: bool) -> usize {
    8 * (2 + usize::from(has_z) + usize::from(has_m))
}

/// Decode a WKB buffer, also returning the byte order of the outermost geometry.
///
/// The whole buffer must be consumed.
pub(crate) fn read_wkb(bytes: &[u8]) -> Result<(Geometry, ByteOrder)> {
    let mut reader = ByteReader::new(bytes);
    let geometry = read_geometry(&mut reader)?;
    let byte_order = bytes
        .first()
        .and_then(|marker| ByteOrder::from_wkb_marker(*marker))
        .unwrap_or_default();
    if reader.remaining() != 0 {
        return Err(GpkgError::MalformedWkb(format!(
            "{} trailing bytes after geometry",
            reader.remaining()
        )));
    }
    Ok((geometry, byte_order))
}

/// Read one tagged geometry from the reader.
pub fn read_geometry(reader: &mut ByteReader<'_>) -> Result<Geometry> {
    read_tagged(reader, None, 0).map_err(truncated_as_malformed)
}

/// Write one tagged geometry using the writer's byte order.
pub fn write_geometry(writer: &mut ByteWriter, geometry: &Geometry) -> Result<()> {
    geometry.check_dimensions()?;
    write_tagged(writer, geometry);
    Ok(())
}

fn truncated_as_malformed(err: GpkgError) -> GpkgError {
    match err {
        GpkgError::UnexpectedEnd {
            offset,
            needed,
            remaining,
        } => GpkgError::MalformedWkb(format!(
            "truncated payload at offset {offset}: needed {needed} bytes, {remaining} remaining"
        )),
        other => other,
    }
}

struct TypeCode {
    geometry_type: GeometryType,
    has_z: bool,
    has_m: bool,
}

fn read_header(reader: &mut ByteReader<'_>) -> Result<TypeCode> {
    let marker = reader.read_u8()?;
    let byte_order = ByteOrder::from_wkb_marker(marker)
        .ok_or_else(|| GpkgError::MalformedWkb(format!("invalid byte order marker {marker}")))?;
    reader.set_byte_order(byte_order);

    let code = reader.read_u32()?;
    // Only the ISO offsets 0, 1000, 2000 and 3000 are accepted. A larger
    // thousands digit is rejected instead of being reduced modulo 10.
    let (has_z, has_m) = match code / 1000 {
        0 => (false, false),
        1 => (true, false),
        2 => (false, true),
        3 => (true, true),
        _ => return Err(GpkgError::MalformedWkb(format!("unknown type code {code}"))),
    };
    let geometry_type = GeometryType::from_wkb_code(code % 1000)
        .ok_or_else(|| GpkgError::MalformedWkb(format!("unknown type code {code}")))?;

    Ok(TypeCode {
        geometry_type,
        has_z,
        has_m,
    })
}

fn read_tagged(
    reader: &mut ByteReader<'_>,
    parent: Option<(bool, bool)>,
    depth: usize,
) -> Result<Geometry> {
    if depth > MAX_NESTING_DEPTH {
        return Err(GpkgError::MalformedWkb(format!(
            "geometry nesting deeper than {MAX_NESTING_DEPTH} levels"
        )));
    }
    let code = read_header(reader)?;
    let (has_z, has_m) = (code.has_z, code.has_m);
    if let Some((parent_z, parent_m)) = parent {
        if parent_z != has_z || parent_m != has_m {
            return Err(GpkgError::MalformedWkb(format!(
                "nested {:?} has z={has_z} m={has_m}, parent has z={parent_z} m={parent_m}",
                code.geometry_type
            )));
        }
    }
    let point_size = coord_size(has_z, has_m);

    let geometry = match code.geometry_type {
        GeometryType::Point => Geometry::Point(read_point(reader, has_z, has_m)?),
        GeometryType::LineString => Geometry::LineString(read_line_string(reader, has_z, has_m)?),
        GeometryType::Polygon => Geometry::Polygon(read_polygon(reader, has_z, has_m)?),
        GeometryType::MultiPoint => {
            let count = read_count(reader, 1 + 4 + point_size)?;
            let mut points = Vec::with_capacity(count);
            for _ in 0..count {
                match read_tagged(reader, Some((has_z, has_m)), depth + 1)? {
                    Geometry::Point(point) => points.push(point),
                    other => return Err(unexpected_member("MultiPoint", &other)),
                }
            }
            Geometry::MultiPoint(MultiPoint {
                has_z,
                has_m,
                points,
            })
        }
        GeometryType::MultiLineString => {
            let count = read_count(reader, MIN_TAGGED_SIZE)?;
            let mut line_strings = Vec::with_capacity(count);
            for _ in 0..count {
                match read_tagged(reader, Some((has_z, has_m)), depth + 1)? {
                    Geometry::LineString(line) => line_strings.push(line),
                    other => return Err(unexpected_member("MultiLineString", &other)),
                }
            }
            Geometry::MultiLineString(MultiLineString {
                has_z,
                has_m,
                line_strings,
            })
        }
        GeometryType::MultiPolygon => {
            let count = read_count(reader, MIN_TAGGED_SIZE)?;
            let mut polygons = Vec::with_capacity(count);
            for _ in 0..count {
                match read_tagged(reader, Some((has_z, has_m)), depth + 1)? {
                    Geometry::Polygon(polygon) => polygons.push(polygon),
                    other => return Err(unexpected_member("MultiPolygon", &other)),
                }
            }
            Geometry::MultiPolygon(MultiPolygon {
                has_z,
                has_m,
                polygons,
            })
        }
        GeometryType::GeometryCollection => {
            let count = read_count(reader, MIN_TAGGED_SIZE)?;
            let mut geometries = Vec::with_capacity(count);
            for _ in 0..count {
                geometries.push(read_tagged(reader, Some((has_z, has_m)), depth + 1)?);
            }
            Geometry::GeometryCollection(GeometryCollection {
                has_z,
                has_m,
                geometries,
            })
        }
        GeometryType::Geometry => {
            return Err(GpkgError::MalformedWkb("abstract geometry type code".into()));
        }
    };
    Ok(geometry)
}

fn unexpected_member(container: &str, member: &Geometry) -> GpkgError {
    GpkgError::MalformedWkb(format!(
        "{container} cannot contain {:?}",
        member.geometry_type()
    ))
}

/// Read an element count and reject counts the remaining bytes cannot hold.
fn read_count(reader: &mut ByteReader<'_>, min_element_size: usize) -> Result<usize> {
    let count = reader.read_u32()? as usize;
    if count > reader.remaining() / min_element_size {
        return Err(GpkgError::MalformedWkb(format!(
            "count {count} exceeds remaining {} bytes",
            reader.remaining()
        )));
    }
    Ok(count)
}

fn read_point(reader: &mut ByteReader<'_>, has_z: bool, has_m: bool) -> Result<Point> {
    let x = reader.read_f64()?;
    let y = reader.read_f64()?;
    let z = if has_z { Some(reader.read_f64()?) } else { None };
    let m = if has_m { Some(reader.read_f64()?) } else { None };
    Ok(Point { x, y, z, m })
}

fn read_line_string(reader: &mut ByteReader<'_>, has_z: bool, has_m: bool) -> Result<LineString> {
    let count = read_count(reader, coord_size(has_z, has_m))?;
    let mut points = Vec::with_capacity(count);
    for _ in 0..count {
        points.push(read_point(reader, has_z, has_m)?);
    }
    Ok(LineString {
        has_z,
        has_m,
        points,
    })
}

fn read_polygon(reader: &mut ByteReader<'_>, has_z: bool, has_m: bool) -> Result<Polygon> {
    let count = read_count(reader, 4)?;
    let mut rings = Vec::with_capacity(count);
    for _ in 0..count {
        rings.push(read_line_string(reader, has_z, has_m)?);
    }
    Ok(Polygon {
        has_z,
        has_m,
        rings,
    })
}

fn write_header(writer: &mut ByteWriter, geometry_type: GeometryType, has_z: bool, has_m: bool) {
    let offset = match (has_z, has_m) {
        (false, false) => 0,
        (true, false) => 1000,
        (false, true) => 2000,
        (true, true) => 3000,
    };
    writer.write_u8(writer.byte_order().wkb_marker());
    writer.write_u32(geometry_type.wkb_code() + offset);
}

fn write_tagged(writer: &mut ByteWriter, geometry: &Geometry) {
    let (has_z, has_m) = (geometry.has_z(), geometry.has_m());
    write_header(writer, geometry.geometry_type(), has_z, has_m);
    match geometry {
        Geometry::Point(point) => write_point(writer, point),
        Geometry::LineString(line) => write_line_string(writer, line),
        Geometry::Polygon(polygon) => write_polygon(writer, polygon),
        Geometry::MultiPoint(multi) => {
            writer.write_u32(multi.points.len() as u32);
            for point in &multi.points {
                write_header(writer, GeometryType::Point, has_z, has_m);
                write_point(writer, point);
            }
        }
        Geometry::MultiLineString(multi) => {
            writer.write_u32(multi.line_strings.len() as u32);
            for line in &multi.line_strings {
                write_header(writer, GeometryType::LineString, has_z, has_m);
                write_line_string(writer, line);
            }
        }
        Geometry::MultiPolygon(multi) => {
            writer.write_u32(multi.polygons.len() as u32);
            for polygon in &multi.polygons {
                write_header(writer, GeometryType::Polygon, has_z, has_m);
                write_polygon(writer, polygon);
            }
        }
        Geometry::GeometryCollection(collection) => {
            writer.write_u32(collection.geometries.len() as u32);
            for member in &collection.geometries {
                write_tagged(writer, member);
            }
        }
    }
}

fn write_point(writer: &mut ByteWriter, point: &Point) {
    writer.write_f64(point.x);
    writer.write_f64(point.y);
    if let Some(z) = point.z {
        writer.write_f64(z);
    }
    if let Some(m) = point.m {
        writer.write_f64(m);
    }
}

fn write_line_string(writer: &mut ByteWriter, line: &LineString) {
    writer.write_u32(line.points.len() as u32);
    for point in &line.points {
        write_point(writer, point);
    }
}

fn write_polygon(writer: &mut ByteWriter, polygon: &Polygon) {
    writer.write_u32(polygon.rings.len() as u32);
    for ring in &polygon.rings {
        write_line_string(writer, ring);
    }
}

#[cfg(test)]
mod tests {
    use super::read_wkb;
    use crate::error::GpkgError;
    use crate::geom::{Geometry, LineString, MultiPoint, Point, Polygon};
    use crate::io::ByteOrder;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).expect("valid hex"))
            .collect()
    }

    #[test]
    fn reads_and_writes_xy_point() -> crate::Result<()> {
        let bytes = hex("010100000000000000000024400000000000003e40");
        let (geometry, order) = read_wkb(&bytes)?;
        assert_eq!(order, ByteOrder::LittleEndian);
        assert_eq!(geometry, Geometry::Point(Point::new(10.0, 30.0)));
        assert_eq!(geometry.to_wkb(ByteOrder::LittleEndian)?, bytes);
        assert_eq!(geometry.wkb_size(), bytes.len());
        Ok(())
    }

    #[test]
    fn reads_big_endian_point_z() -> crate::Result<()> {
        let mut bytes = vec![0x00];
        bytes.extend_from_slice(&1001u32.to_be_bytes());
        for v in [1.0f64, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let (geometry, order) = read_wkb(&bytes)?;
        assert_eq!(order, ByteOrder::BigEndian);
        assert_eq!(geometry, Geometry::Point(Point::new_z(1.0, 2.0, 3.0)));
        assert_eq!(geometry.to_wkb(ByteOrder::BigEndian)?, bytes);
        Ok(())
    }

    #[test]
    fn honours_nested_byte_orders() -> crate::Result<()> {
        // Little-endian MultiPoint holding one big-endian and one little-endian point.
        let mut bytes = vec![0x01];
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.push(0x00);
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&1.0f64.to_be_bytes());
        bytes.extend_from_slice(&2.0f64.to_be_bytes());
        bytes.push(0x01);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&3.0f64.to_le_bytes());
        bytes.extend_from_slice(&4.0f64.to_le_bytes());

        let geometry = Geometry::from_wkb(&bytes)?;
        let expected = MultiPoint::new(
            false,
            false,
            vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)],
        )?;
        assert_eq!(geometry, Geometry::MultiPoint(expected));

        // Written back with a single byte order.
        let rewritten = geometry.to_wkb(ByteOrder::LittleEndian)?;
        assert_ne!(rewritten, bytes);
        assert_eq!(rewritten.len(), bytes.len());
        assert_eq!(Geometry::from_wkb(&rewritten)?, geometry);
        Ok(())
    }

    #[test]
    fn matches_reference_writer() -> crate::Result<()> {
        let polygon = geo_types::Polygon::new(
            geo_types::LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 0.0)]),
            vec![geo_types::LineString::from(vec![
                (1.0, 1.0),
                (2.0, 1.0),
                (1.0, 2.0),
                (1.0, 1.0),
            ])],
        );
        let collection = geo_types::GeometryCollection::new_from(vec![
            geo_types::Geometry::Point(geo_types::Point::new(1.0, 2.0)),
            geo_types::Geometry::Polygon(polygon.clone()),
            geo_types::Geometry::MultiLineString(geo_types::MultiLineString::new(vec![
                geo_types::LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]),
            ])),
        ]);

        for geo in [
            geo_types::Geometry::Polygon(polygon),
            geo_types::Geometry::GeometryCollection(collection),
        ] {
            let mut expected = Vec::new();
            ::wkb::writer::write_geometry(&mut expected, &geo, &Default::default())
                .expect("reference wkb writer");
            let ours = Geometry::from_geo(&geo)?;
            assert_eq!(ours.to_wkb(ByteOrder::LittleEndian)?, expected);
            assert_eq!(Geometry::from_wkb(&expected)?, ours);
        }
        Ok(())
    }

    #[test]
    fn writes_zm_type_codes() -> crate::Result<()> {
        let line = LineString::from_points(vec![
            Point::new_zm(0.0, 0.0, 1.0, 2.0),
            Point::new_zm(1.0, 1.0, 3.0, 4.0),
        ])?;
        let bytes = Geometry::LineString(line).to_wkb(ByteOrder::BigEndian)?;
        assert_eq!(bytes[0], 0x00);
        assert_eq!(u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]), 3002);
        assert_eq!(bytes.len(), 1 + 4 + 4 + 2 * 32);
        Ok(())
    }

    #[test]
    fn refuses_to_write_mixed_dimensions() {
        let geometry = Geometry::Polygon(Polygon {
            has_z: false,
            has_m: false,
            rings: vec![LineString {
                has_z: false,
                has_m: false,
                points: vec![Point::new(0.0, 0.0), Point::new_z(1.0, 1.0, 1.0)],
            }],
        });
        assert!(matches!(
            geometry.to_wkb(ByteOrder::LittleEndian),
            Err(GpkgError::MalformedWkb(_))
        ));
    }

    #[test]
    fn rejects_mismatched_nested_dimensions() {
        // XY MultiPoint holding a PointZ.
        let mut bytes = hex("010400000001000000");
        bytes.extend_from_slice(&hex("01e9030000"));
        for v in [1.0f64, 2.0, 3.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        match Geometry::from_wkb(&bytes) {
            Err(GpkgError::MalformedWkb(message)) => {
                assert!(message.contains("parent has z=false"), "{message}")
            }
            other => panic!("expected a dimension mismatch, got {other:?}"),
        }

        // The same point with the collection's dimensions decodes.
        bytes[1..5].copy_from_slice(&1004u32.to_le_bytes());
        assert!(Geometry::from_wkb(&bytes).is_ok());
    }

    #[test]
    fn limits_nesting_depth() -> crate::Result<()> {
        fn nested(levels: usize) -> Vec<u8> {
            let mut bytes = Vec::new();
            for _ in 0..levels {
                bytes.extend_from_slice(&hex("010700000001000000"));
            }
            bytes.extend_from_slice(&hex("010700000000000000"));
            bytes
        }

        let mut geometry = Geometry::from_wkb(&nested(10))?;
        let mut levels = 0;
        while let Geometry::GeometryCollection(mut collection) = geometry {
            match collection.geometries.pop() {
                Some(member) => {
                    levels += 1;
                    geometry = member;
                }
                None => break,
            }
        }
        assert_eq!(levels, 10);

        match Geometry::from_wkb(&nested(100_000)) {
            Err(GpkgError::MalformedWkb(message)) => assert!(message.contains("nesting")),
            other => panic!("expected a nesting error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn rejects_malformed_input() {
        let cases = [
            // truncated point
            hex("01010000000000000000002440"),
            // unknown type code 8
            hex("0108000000"),
            // dimension offset 4000
            hex("01a10f0000"),
            // invalid byte order marker
            hex("020100000000000000000024400000000000003e40"),
            // line string claiming u32::MAX points
            hex("0102000000ffffffff"),
            // trailing garbage
            hex("010100000000000000000024400000000000003e40ff"),
        ];
        for bytes in cases {
            assert!(
                matches!(Geometry::from_wkb(&bytes), Err(GpkgError::MalformedWkb(_))),
                "accepted {bytes:02x?}"
            );
        }
    }
}
