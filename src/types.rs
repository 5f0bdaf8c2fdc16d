use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;

use crate::error::Result;
use crate::geom::GeometryData;

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Logical column types a feature table may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Boolean,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    Integer,
    Float,
    Double,
    Real,
    Text,
    Blob,
    Date,
    DateTime,
    Geometry,
}

impl ColumnType {
    /// The SQLite storage class cells of this type are stored with.
    pub fn storage_class(self) -> rusqlite::types::Type {
        use rusqlite::types::Type;
        match self {
            Self::Boolean
            | Self::TinyInt
            | Self::SmallInt
            | Self::MediumInt
            | Self::Int
            | Self::Integer => Type::Integer,
            Self::Float | Self::Double | Self::Real => Type::Real,
            Self::Text | Self::Date | Self::DateTime => Type::Text,
            Self::Blob | Self::Geometry => Type::Blob,
        }
    }

    pub fn is_integer(self) -> bool {
        self.storage_class() == rusqlite::types::Type::Integer && self != Self::Boolean
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub not_null: bool,
    /// Maximum length for TEXT (characters) or BLOB (bytes) columns.
    pub type_max: Option<u64>,
    /// SQL literal used as the column's DEFAULT clause.
    pub default: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            not_null: false,
            type_max: None,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_max(mut self, type_max: u64) -> Self {
        self.type_max = Some(type_max);
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Value of `z` / `m` in `gpkg_geometry_columns`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DimensionRequirement {
    #[default]
    Prohibited = 0,
    Mandatory = 1,
    Optional = 2,
}

impl DimensionRequirement {
    pub fn allows(self, present: bool) -> bool {
        match self {
            Self::Prohibited => !present,
            Self::Mandatory => present,
            Self::Optional => true,
        }
    }
}

/// What happens when a TEXT or BLOB value is longer than the column's maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TruncationPolicy {
    /// Cut the value down to the maximum length.
    #[default]
    Silent,
    /// Fail with [`crate::GpkgError::ValueTooLong`].
    Strict,
}

/// A typed cell value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    MediumInt(i32),
    Integer(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Geometry(GeometryData),
}

impl Value {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Boolean(_) => "BOOLEAN",
            Self::TinyInt(_) => "TINYINT",
            Self::SmallInt(_) => "SMALLINT",
            Self::MediumInt(_) => "MEDIUMINT",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Double(_) => "DOUBLE",
            Self::Text(_) => "TEXT",
            Self::Blob(_) => "BLOB",
            Self::Date(_) => "DATE",
            Self::DateTime(_) => "DATETIME",
            Self::Geometry(_) => "GEOMETRY",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::TinyInt(v) => Some(i64::from(*v)),
            Self::SmallInt(v) => Some(i64::from(*v)),
            Self::MediumInt(v) => Some(i64::from(*v)),
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Either float variant widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&GeometryData> {
        match self {
            Self::Geometry(v) => Some(v),
            _ => None,
        }
    }

    /// Convert into the value bound to a SQLite statement parameter.
    pub fn to_sql_value(&self) -> Result<SqlValue> {
        let value = match self {
            Self::Null => SqlValue::Null,
            Self::Boolean(v) => SqlValue::Integer(i64::from(*v)),
            Self::TinyInt(v) => SqlValue::Integer(i64::from(*v)),
            Self::SmallInt(v) => SqlValue::Integer(i64::from(*v)),
            Self::MediumInt(v) => SqlValue::Integer(i64::from(*v)),
            Self::Integer(v) => SqlValue::Integer(*v),
            Self::Float(v) => SqlValue::Real(f64::from(*v)),
            Self::Double(v) => SqlValue::Real(*v),
            Self::Text(v) => SqlValue::Text(v.clone()),
            Self::Blob(v) => SqlValue::Blob(v.clone()),
            Self::Date(v) => SqlValue::Text(format_date(*v)),
            Self::DateTime(v) => SqlValue::Text(format_datetime(v)),
            Self::Geometry(v) => SqlValue::Blob(v.to_bytes()?),
        };
        Ok(value)
    }
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// GeoPackage DATETIME text: ISO 8601 in UTC with millisecond precision.
pub(crate) fn format_datetime(datetime: &DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Accepts RFC 3339 text, or a timestamp without offset which is taken as UTC.
pub(crate) fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Some(datetime.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_for_value! {
    bool => Boolean,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => MediumInt,
    i64 => Integer,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Blob,
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
    GeometryData => Geometry,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A value used in an equality query, optionally matched within a tolerance.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldValue {
    pub value: Value,
    pub tolerance: Option<f64>,
}

impl FieldValue {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            tolerance: None,
        }
    }

    /// Match numeric values within `value - tolerance ..= value + tolerance`.
    pub fn with_tolerance(value: impl Into<Value>, tolerance: f64) -> Self {
        Self {
            value: value.into(),
            tolerance: Some(tolerance),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FieldValue, Value, parse_date, parse_datetime};
    use chrono::{NaiveDate, TimeZone, Utc};
    use rusqlite::types::Value as SqlValue;

    #[test]
    fn converts_to_sql_values() -> crate::Result<()> {
        assert_eq!(Value::Boolean(true).to_sql_value()?, SqlValue::Integer(1));
        assert_eq!(Value::TinyInt(-3).to_sql_value()?, SqlValue::Integer(-3));
        assert_eq!(Value::Float(0.5).to_sql_value()?, SqlValue::Real(0.5));
        assert_eq!(Value::from(None::<i64>).to_sql_value()?, SqlValue::Null);

        let date = NaiveDate::from_ymd_opt(2024, 2, 29).expect("valid date");
        assert_eq!(
            Value::Date(date).to_sql_value()?,
            SqlValue::Text("2024-02-29".to_string())
        );
        let datetime = Utc
            .with_ymd_and_hms(2024, 2, 29, 12, 30, 5)
            .single()
            .expect("valid datetime");
        assert_eq!(
            Value::DateTime(datetime).to_sql_value()?,
            SqlValue::Text("2024-02-29T12:30:05.000Z".to_string())
        );
        Ok(())
    }

    #[test]
    fn parses_date_and_datetime_text() {
        assert_eq!(parse_date("2024-02-29"), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(parse_date("2024-02-30"), None);

        let expected = Utc
            .with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
            .single()
            .expect("valid datetime");
        assert_eq!(parse_datetime("2024-01-01T09:00:00.000Z"), Some(expected));
        assert_eq!(parse_datetime("2024-01-01T10:00:00+01:00"), Some(expected));
        assert_eq!(parse_datetime("2024-01-01 09:00:00"), Some(expected));
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn widens_numbers() {
        assert_eq!(Value::SmallInt(7).as_i64(), Some(7));
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Text("x".into()).as_i64(), None);
        assert_eq!(FieldValue::new(3i64).tolerance, None);
        assert_eq!(FieldValue::with_tolerance(1.0, 1e-6).tolerance, Some(1e-6));
    }
}
