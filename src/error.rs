use std::error::Error;
use std::fmt;

/// Crate error type for GeoPackage operations.
#[derive(Debug)]
pub enum GpkgError {
    /// Wraps errors returned by `rusqlite`.
    Sql(rusqlite::Error),
    /// A byte reader ran past the end of its buffer.
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    /// WKB bytes could not be decoded (or a geometry could not be encoded).
    MalformedWkb(String),
    /// The GeoPackage geometry header is invalid.
    MalformedHeader(String),
    /// A stored cell's SQLite storage class does not fit the column type.
    TypeMismatch {
        column: String,
        row: usize,
        expected: &'static str,
        found: &'static str,
    },
    /// A value handed to a setter is of the wrong kind for the column.
    ValueTypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },
    /// Numeric conversion failed because the value is out of range.
    ValueOutOfRange {
        column: String,
        target: &'static str,
    },
    /// A TEXT/BLOB value exceeds the declared maximum under strict truncation.
    ValueTooLong {
        column: String,
        max: u64,
        len: usize,
    },
    /// The primary key cell cannot be assigned by callers.
    PrimaryKeySet {
        table: String,
    },
    /// Update or delete was requested for a row that has no primary key yet.
    NoPrimaryKey {
        table: String,
    },
    /// A SQLite module or function required for an operation is unavailable.
    UnsupportedSqliteFeature(String),
    /// A geometry type in metadata could not be mapped to a supported geometry type.
    UnsupportedGeometryType(String),
    /// A geometry value's type does not fit the column's declared geometry type.
    GeometryTypeNotAssignable {
        column: String,
        declared: &'static str,
        actual: &'static str,
    },
    /// A geometry value has Z/M dimensions the column prohibits (or lacks mandatory ones).
    GeometryDimensionMismatch {
        column: String,
    },
    /// A column type declared in SQLite metadata is not supported by this crate.
    UnsupportedColumnType {
        column: String,
        declared_type: String,
    },
    /// Invalid `z` / `m` flag in GeoPackage metadata.
    InvalidDimension {
        z: i8,
        m: i8,
    },
    /// Requested column does not exist in the table.
    UnknownColumn {
        column: String,
    },
    /// The table is not registered in `gpkg_geometry_columns`.
    MissingTable {
        table_name: String,
    },
    /// A table with the same name already exists.
    LayerAlreadyExists {
        layer_name: String,
    },
    /// Referenced `srs_id` does not exist in `gpkg_spatial_ref_sys`.
    MissingSpatialRefSysId {
        srs_id: i32,
    },
    /// Table schema has multiple primary key columns, which is unsupported.
    CompositePrimaryKeyUnsupported {
        table_name: String,
    },
    /// Table schema has no integer primary key column.
    MissingPrimaryKeyColumn {
        table_name: String,
    },
    /// Table schema has no geometry column.
    MissingGeometryColumn {
        table_name: String,
    },
    /// The cursor was used after `close()`.
    CursorClosed,
    /// `get_row` was called while the cursor is not on a row.
    CursorNotPositioned,
    ReadOnly,
    /// Generic error message.
    Message(String),
}

impl fmt::Display for GpkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(err) => write!(f, "{err}"),
            Self::UnexpectedEnd {
                offset,
                needed,
                remaining,
            } => write!(
                f,
                "unexpected end of buffer at offset {offset}: needed {needed} bytes, {remaining} remaining"
            ),
            Self::MalformedWkb(msg) => write!(f, "malformed wkb: {msg}"),
            Self::MalformedHeader(msg) => write!(f, "malformed gpkg geometry header: {msg}"),
            Self::TypeMismatch {
                column,
                row,
                expected,
                found,
            } => write!(
                f,
                "type mismatch in column '{column}' at row {row}: expected {expected}, found {found}"
            ),
            Self::ValueTypeMismatch {
                column,
                expected,
                actual,
            } => write!(
                f,
                "invalid value for column '{column}': expected {expected}, got {actual}"
            ),
            Self::ValueOutOfRange { column, target } => {
                write!(f, "value for column '{column}' out of range for {target}")
            }
            Self::ValueTooLong { column, max, len } => write!(
                f,
                "value for column '{column}' is {len} long, maximum is {max}"
            ),
            Self::PrimaryKeySet { table } => {
                write!(f, "primary key of a row in '{table}' cannot be set")
            }
            Self::NoPrimaryKey { table } => {
                write!(f, "row in '{table}' has no primary key value")
            }
            Self::UnsupportedSqliteFeature(feature) => {
                write!(f, "unsupported sqlite feature: {feature}")
            }
            Self::UnsupportedGeometryType(ty) => write!(f, "unsupported geometry type: {ty}"),
            Self::GeometryTypeNotAssignable {
                column,
                declared,
                actual,
            } => write!(
                f,
                "geometry type {actual} cannot be stored in column '{column}' declared as {declared}"
            ),
            Self::GeometryDimensionMismatch { column } => {
                write!(f, "geometry dimensions do not match column '{column}'")
            }
            Self::UnsupportedColumnType {
                column,
                declared_type,
            } => write!(
                f,
                "unsupported column type for column '{column}': {declared_type}"
            ),
            Self::InvalidDimension { z, m } => {
                write!(f, "invalid geometry dimension flags (z={z}, m={m})")
            }
            Self::UnknownColumn { column } => write!(f, "unknown column: {column}"),
            Self::MissingTable { table_name } => {
                write!(f, "no geometry columns entry for table: {table_name}")
            }
            Self::LayerAlreadyExists { layer_name } => {
                write!(f, "layer already exists: {layer_name}")
            }
            Self::MissingSpatialRefSysId { srs_id } => {
                write!(f, "srs_id {srs_id} not found in gpkg_spatial_ref_sys")
            }
            Self::CompositePrimaryKeyUnsupported { table_name } => write!(
                f,
                "composite primary keys are not supported for table: {table_name}"
            ),
            Self::MissingPrimaryKeyColumn { table_name } => {
                write!(f, "no integer primary key column found for table: {table_name}")
            }
            Self::MissingGeometryColumn { table_name } => {
                write!(f, "no geometry column found for table: {table_name}")
            }
            Self::CursorClosed => write!(f, "cursor is closed"),
            Self::CursorNotPositioned => write!(f, "cursor is not positioned on a row"),
            Self::ReadOnly => write!(f, "operation not allowed on read-only connection"),
            Self::Message(message) => write!(f, "{message}"),
        }
    }
}

impl Error for GpkgError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sql(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for GpkgError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(err)
    }
}

pub type Result<T> = std::result::Result<T, GpkgError>;
