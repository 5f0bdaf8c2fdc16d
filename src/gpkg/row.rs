use crate::error::{GpkgError, Result};
use crate::geom::GeometryData;
use crate::types::{ColumnType, TruncationPolicy, Value, parse_date, parse_datetime};
use chrono::SubsecRound;
use rusqlite::types::{Type, Value as SqlValue};
use std::sync::Arc;

use super::table::{FeatureColumn, FeatureTable};

/// A detached snapshot of one feature: a value per column of its table.
///
/// A row without a primary key value is transient; `FeatureDao::create`
/// assigns one. The primary key cannot be set through the setters.
#[derive(Clone, Debug)]
pub struct FeatureRow {
    table: Arc<FeatureTable>,
    values: Vec<Value>,
    truncation: TruncationPolicy,
}

impl FeatureRow {
    pub(crate) fn new(table: Arc<FeatureTable>, truncation: TruncationPolicy) -> Self {
        let values = vec![Value::Null; table.column_count()];
        Self {
            table,
            values,
            truncation,
        }
    }

    pub(crate) fn from_values(
        table: Arc<FeatureTable>,
        values: Vec<Value>,
        truncation: TruncationPolicy,
    ) -> Self {
        Self {
            table,
            values,
            truncation,
        }
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    pub(crate) fn table_arc(&self) -> &Arc<FeatureTable> {
        &self.table
    }

    pub fn column_count(&self) -> usize {
        self.values.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.table.column_names()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.table.column_index(name)
    }

    /// The primary key value, or `None` for a row that was never persisted.
    pub fn id(&self) -> Option<i64> {
        self.values[self.table.primary_key_index()].as_i64()
    }

    pub fn has_id(&self) -> bool {
        self.id().is_some()
    }

    pub(crate) fn set_id(&mut self, id: i64) {
        self.values[self.table.primary_key_index()] = Value::Integer(id);
    }

    /// Clear the primary key so the row can be inserted as a new feature.
    pub fn reset_id(&mut self) {
        self.values[self.table.primary_key_index()] = Value::Null;
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn value_by_name(&self, name: &str) -> Result<&Value> {
        let column = self.table.require_column(name)?;
        Ok(&self.values[column.index])
    }

    /// SQLite storage class the cell is written with.
    pub fn storage_type(&self, index: usize) -> Option<Type> {
        self.values.get(index).map(|value| match value {
            Value::Null => Type::Null,
            Value::Boolean(_)
            | Value::TinyInt(_)
            | Value::SmallInt(_)
            | Value::MediumInt(_)
            | Value::Integer(_) => Type::Integer,
            Value::Float(_) | Value::Double(_) => Type::Real,
            Value::Text(_) | Value::Date(_) | Value::DateTime(_) => Type::Text,
            Value::Blob(_) | Value::Geometry(_) => Type::Blob,
        })
    }

    /// Set a cell after checking the value against the column.
    ///
    /// Integers are range-checked against narrow column types. TEXT and BLOB
    /// values longer than the column's maximum are truncated (or rejected under
    /// [`TruncationPolicy::Strict`]). Geometry values must be assignable to the
    /// declared geometry type and respect the column's z/m requirements.
    /// DATETIME values are truncated to whole milliseconds.
    pub fn set_value(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let column = self
            .table
            .column(index)
            .ok_or_else(|| GpkgError::UnknownColumn {
                column: index.to_string(),
            })?;
        if column.primary_key {
            return Err(GpkgError::PrimaryKeySet {
                table: self.table.table_name().to_string(),
            });
        }
        let value = self.coerce(column, value.into())?;
        self.values[index] = value;
        Ok(())
    }

    pub fn set_value_by_name(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self.table.require_column(name)?.index;
        self.set_value(index, value)
    }

    pub fn geometry(&self) -> Option<&GeometryData> {
        self.values[self.table.geometry_index()].as_geometry()
    }

    /// Mutable access to the stored geometry. The caller is responsible for
    /// keeping it compatible with the column.
    pub fn geometry_mut(&mut self) -> Option<&mut GeometryData> {
        match &mut self.values[self.table.geometry_index()] {
            Value::Geometry(data) => Some(data),
            _ => None,
        }
    }

    pub fn set_geometry(&mut self, geometry: GeometryData) -> Result<()> {
        self.set_value(self.table.geometry_index(), Value::Geometry(geometry))
    }

    fn coerce(&self, column: &FeatureColumn, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        let mismatch = |value: &Value| GpkgError::ValueTypeMismatch {
            column: column.name.clone(),
            expected: crate::conversions::column_type_to_str(column.column_type),
            actual: value.kind_name(),
        };
        let out_of_range = |target: &'static str| GpkgError::ValueOutOfRange {
            column: column.name.clone(),
            target,
        };

        let coerced = match column.column_type {
            ColumnType::Boolean => match value {
                Value::Boolean(_) => value,
                other => return Err(mismatch(&other)),
            },
            ColumnType::TinyInt => {
                let v = value.as_i64().ok_or_else(|| mismatch(&value))?;
                Value::TinyInt(i8::try_from(v).map_err(|_| out_of_range("TINYINT"))?)
            }
            ColumnType::SmallInt => {
                let v = value.as_i64().ok_or_else(|| mismatch(&value))?;
                Value::SmallInt(i16::try_from(v).map_err(|_| out_of_range("SMALLINT"))?)
            }
            ColumnType::MediumInt => {
                let v = value.as_i64().ok_or_else(|| mismatch(&value))?;
                Value::MediumInt(i32::try_from(v).map_err(|_| out_of_range("MEDIUMINT"))?)
            }
            ColumnType::Int | ColumnType::Integer => {
                Value::Integer(value.as_i64().ok_or_else(|| mismatch(&value))?)
            }
            ColumnType::Float => {
                let v = value.as_f64().ok_or_else(|| mismatch(&value))?;
                Value::Float(f32_in_range(v).ok_or_else(|| out_of_range("FLOAT"))?)
            }
            ColumnType::Double | ColumnType::Real => {
                Value::Double(value.as_f64().ok_or_else(|| mismatch(&value))?)
            }
            ColumnType::Text => match value {
                Value::Text(text) => Value::Text(self.truncate_text(column, text)?),
                other => return Err(mismatch(&other)),
            },
            ColumnType::Blob => match value {
                Value::Blob(bytes) => Value::Blob(self.truncate_blob(column, bytes)?),
                other => return Err(mismatch(&other)),
            },
            ColumnType::Date => match value {
                Value::Date(_) => value,
                other => return Err(mismatch(&other)),
            },
            // Stored text keeps milliseconds only.
            ColumnType::DateTime => match value {
                Value::DateTime(datetime) => Value::DateTime(datetime.trunc_subsecs(3)),
                other => return Err(mismatch(&other)),
            },
            ColumnType::Geometry => match value {
                Value::Geometry(data) => {
                    self.check_geometry(column, &data)?;
                    Value::Geometry(data)
                }
                other => return Err(mismatch(&other)),
            },
        };
        Ok(coerced)
    }

    fn check_geometry(&self, column: &FeatureColumn, data: &GeometryData) -> Result<()> {
        let Some(declared) = column.geometry_type else {
            return Ok(());
        };
        let actual = data.geometry_type();
        if !declared.is_assignable_from(actual) {
            return Err(GpkgError::GeometryTypeNotAssignable {
                column: column.name.clone(),
                declared: crate::conversions::geometry_type_to_str(declared),
                actual: crate::conversions::geometry_type_to_str(actual),
            });
        }
        let descriptor = self.table.geometry_columns();
        if !descriptor.z.allows(data.geometry().has_z())
            || !descriptor.m.allows(data.geometry().has_m())
        {
            return Err(GpkgError::GeometryDimensionMismatch {
                column: column.name.clone(),
            });
        }
        Ok(())
    }

    fn truncate_text(&self, column: &FeatureColumn, text: String) -> Result<String> {
        let Some(max) = column.type_max else {
            return Ok(text);
        };
        let len = text.chars().count();
        if len as u64 <= max {
            return Ok(text);
        }
        match self.truncation {
            TruncationPolicy::Strict => Err(GpkgError::ValueTooLong {
                column: column.name.clone(),
                max,
                len,
            }),
            TruncationPolicy::Silent => {
                log::debug!(
                    "truncating TEXT value for column '{}' from {len} to {max} characters",
                    column.name
                );
                Ok(text.chars().take(max as usize).collect())
            }
        }
    }

    fn truncate_blob(&self, column: &FeatureColumn, mut bytes: Vec<u8>) -> Result<Vec<u8>> {
        let Some(max) = column.type_max else {
            return Ok(bytes);
        };
        let len = bytes.len();
        if len as u64 <= max {
            return Ok(bytes);
        }
        match self.truncation {
            TruncationPolicy::Strict => Err(GpkgError::ValueTooLong {
                column: column.name.clone(),
                max,
                len,
            }),
            TruncationPolicy::Silent => {
                log::debug!(
                    "truncating BLOB value for column '{}' from {len} to {max} bytes",
                    column.name
                );
                bytes.truncate(max as usize);
                Ok(bytes)
            }
        }
    }
}

impl PartialEq for FeatureRow {
    fn eq(&self, other: &Self) -> bool {
        self.table.table_name() == other.table.table_name() && self.values == other.values
    }
}

fn f32_in_range(value: f64) -> Option<f32> {
    if value.is_finite() && value.abs() > f64::from(f32::MAX) {
        None
    } else {
        Some(value as f32)
    }
}

fn storage_name(value: &SqlValue) -> &'static str {
    match value {
        SqlValue::Null => "NULL",
        SqlValue::Integer(_) => "INTEGER",
        SqlValue::Real(_) => "REAL",
        SqlValue::Text(_) => "TEXT",
        SqlValue::Blob(_) => "BLOB",
    }
}

/// Turn a raw SQLite cell into the value kind dictated by the column type.
///
/// `row` is the cursor position, used in error messages.
pub(crate) fn decode_cell(column: &FeatureColumn, raw: SqlValue, row: usize) -> Result<Value> {
    let mismatch = |expected: &'static str, found: &'static str| GpkgError::TypeMismatch {
        column: column.name.clone(),
        row,
        expected,
        found,
    };
    let out_of_range = |target: &'static str| GpkgError::ValueOutOfRange {
        column: column.name.clone(),
        target,
    };

    let value = match (column.column_type, raw) {
        (_, SqlValue::Null) => Value::Null,
        (ColumnType::Boolean, SqlValue::Integer(v)) => Value::Boolean(v != 0),
        (ColumnType::TinyInt, SqlValue::Integer(v)) => {
            Value::TinyInt(i8::try_from(v).map_err(|_| out_of_range("TINYINT"))?)
        }
        (ColumnType::SmallInt, SqlValue::Integer(v)) => {
            Value::SmallInt(i16::try_from(v).map_err(|_| out_of_range("SMALLINT"))?)
        }
        (ColumnType::MediumInt, SqlValue::Integer(v)) => {
            Value::MediumInt(i32::try_from(v).map_err(|_| out_of_range("MEDIUMINT"))?)
        }
        (ColumnType::Int | ColumnType::Integer, SqlValue::Integer(v)) => Value::Integer(v),
        (ColumnType::Float, SqlValue::Real(v)) => {
            Value::Float(f32_in_range(v).ok_or_else(|| out_of_range("FLOAT"))?)
        }
        (ColumnType::Double | ColumnType::Real, SqlValue::Real(v)) => Value::Double(v),
        (ColumnType::Text, SqlValue::Text(text)) => Value::Text(text),
        (ColumnType::Blob, SqlValue::Blob(bytes)) => Value::Blob(bytes),
        (ColumnType::Geometry, SqlValue::Blob(bytes)) => {
            Value::Geometry(GeometryData::from_bytes(&bytes)?)
        }
        (ColumnType::Date, SqlValue::Text(text)) => {
            Value::Date(parse_date(&text).ok_or_else(|| mismatch("DATE text", "TEXT"))?)
        }
        (ColumnType::DateTime, SqlValue::Text(text)) => Value::DateTime(
            parse_datetime(&text).ok_or_else(|| mismatch("DATETIME text", "TEXT"))?,
        ),
        (column_type, other) => {
            let expected = match column_type.storage_class() {
                Type::Integer => "INTEGER",
                Type::Real => "REAL",
                Type::Text => "TEXT",
                _ => "BLOB",
            };
            return Err(mismatch(expected, storage_name(&other)));
        }
    };
    Ok(value)
}
