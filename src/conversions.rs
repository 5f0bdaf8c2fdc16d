use crate::error::GpkgError;
use crate::geom::GeometryType;
use crate::types::{ColumnType, DimensionRequirement};

#[inline]
pub(crate) fn geometry_type_to_str(geometry_type: GeometryType) -> &'static str {
    match geometry_type {
        GeometryType::Geometry => "GEOMETRY",
        GeometryType::Point => "POINT",
        GeometryType::LineString => "LINESTRING",
        GeometryType::Polygon => "POLYGON",
        GeometryType::MultiPoint => "MULTIPOINT",
        GeometryType::MultiLineString => "MULTILINESTRING",
        GeometryType::MultiPolygon => "MULTIPOLYGON",
        GeometryType::GeometryCollection => "GEOMETRYCOLLECTION",
    }
}

#[inline]
pub(crate) fn geometry_type_from_str(geometry_type_str: &str) -> Result<GeometryType, GpkgError> {
    const TYPES: [GeometryType; 8] = [
        GeometryType::Geometry,
        GeometryType::Point,
        GeometryType::LineString,
        GeometryType::Polygon,
        GeometryType::MultiPoint,
        GeometryType::MultiLineString,
        GeometryType::MultiPolygon,
        GeometryType::GeometryCollection,
    ];
    TYPES
        .into_iter()
        .find(|t| geometry_type_to_str(*t).eq_ignore_ascii_case(geometry_type_str.trim()))
        .ok_or_else(|| GpkgError::UnsupportedGeometryType(geometry_type_str.to_string()))
}

#[inline]
pub(crate) fn dimension_from_i8(value: i8) -> Option<DimensionRequirement> {
    match value {
        0 => Some(DimensionRequirement::Prohibited),
        1 => Some(DimensionRequirement::Mandatory),
        2 => Some(DimensionRequirement::Optional),
        _ => None,
    }
}

#[inline]
pub(crate) fn dimensions_from_zm(
    z: i8,
    m: i8,
) -> Result<(DimensionRequirement, DimensionRequirement), GpkgError> {
    match (dimension_from_i8(z), dimension_from_i8(m)) {
        (Some(z), Some(m)) => Ok((z, m)),
        _ => Err(GpkgError::InvalidDimension { z, m }),
    }
}

#[inline]
pub(crate) fn column_type_to_str(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::TinyInt => "TINYINT",
        ColumnType::SmallInt => "SMALLINT",
        ColumnType::MediumInt => "MEDIUMINT",
        ColumnType::Int => "INT",
        ColumnType::Integer => "INTEGER",
        ColumnType::Float => "FLOAT",
        ColumnType::Double => "DOUBLE",
        ColumnType::Real => "REAL",
        ColumnType::Text => "TEXT",
        ColumnType::Blob => "BLOB",
        ColumnType::Date => "DATE",
        ColumnType::DateTime => "DATETIME",
        ColumnType::Geometry => "GEOMETRY",
    }
}

/// Parse a declared column type such as `INTEGER`, `TEXT(50)` or `POINT`.
///
/// Returns the logical type and the maximum length if one is given.
/// Geometry type names all map to [`ColumnType::Geometry`].
pub(crate) fn column_type_from_str(column_type_str: &str) -> Option<(ColumnType, Option<u64>)> {
    let s = column_type_str.trim();
    let (name, type_max) = match s.split_once('(') {
        Some((name, rest)) => {
            let max = rest.strip_suffix(')')?.trim().parse::<u64>().ok()?;
            (name.trim(), Some(max))
        }
        None => (s, None),
    };

    let column_type = if name.eq_ignore_ascii_case("BOOLEAN") {
        ColumnType::Boolean
    } else if name.eq_ignore_ascii_case("TINYINT") {
        ColumnType::TinyInt
    } else if name.eq_ignore_ascii_case("SMALLINT") {
        ColumnType::SmallInt
    } else if name.eq_ignore_ascii_case("MEDIUMINT") {
        ColumnType::MediumInt
    } else if name.eq_ignore_ascii_case("INT") {
        ColumnType::Int
    } else if name.eq_ignore_ascii_case("INTEGER") {
        ColumnType::Integer
    } else if name.eq_ignore_ascii_case("FLOAT") {
        ColumnType::Float
    } else if name.eq_ignore_ascii_case("DOUBLE") {
        ColumnType::Double
    } else if name.eq_ignore_ascii_case("REAL") {
        ColumnType::Real
    } else if name.eq_ignore_ascii_case("TEXT") {
        ColumnType::Text
    } else if name.eq_ignore_ascii_case("BLOB") {
        ColumnType::Blob
    } else if name.eq_ignore_ascii_case("DATE") {
        ColumnType::Date
    } else if name.eq_ignore_ascii_case("DATETIME") {
        ColumnType::DateTime
    } else if geometry_type_from_str(name).is_ok() {
        ColumnType::Geometry
    } else {
        return None;
    };

    match column_type {
        ColumnType::Text | ColumnType::Blob => Some((column_type, type_max)),
        _ if type_max.is_some() => None,
        _ => Some((column_type, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::{column_type_from_str, dimensions_from_zm, geometry_type_from_str};
    use crate::geom::GeometryType;
    use crate::types::{ColumnType, DimensionRequirement};

    #[test]
    fn parses_declared_column_types() {
        assert_eq!(
            column_type_from_str("integer"),
            Some((ColumnType::Integer, None))
        );
        assert_eq!(
            column_type_from_str("TEXT(50)"),
            Some((ColumnType::Text, Some(50)))
        );
        assert_eq!(
            column_type_from_str("BLOB (16)"),
            Some((ColumnType::Blob, Some(16)))
        );
        assert_eq!(
            column_type_from_str("MultiPolygon"),
            Some((ColumnType::Geometry, None))
        );
        assert_eq!(column_type_from_str("INTEGER(4)"), None);
        assert_eq!(column_type_from_str("VARCHAR"), None);
        assert_eq!(column_type_from_str("TEXT(abc)"), None);
    }

    #[test]
    fn parses_geometry_types_and_dimensions() {
        assert_eq!(
            geometry_type_from_str("geometrycollection").ok(),
            Some(GeometryType::GeometryCollection)
        );
        assert!(geometry_type_from_str("CURVEPOLYGON").is_err());
        assert_eq!(
            dimensions_from_zm(2, 0).ok(),
            Some((DimensionRequirement::Optional, DimensionRequirement::Prohibited))
        );
        assert!(dimensions_from_zm(3, 0).is_err());
    }
}
