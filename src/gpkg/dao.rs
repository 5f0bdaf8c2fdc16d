use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    quote_identifier, sql_count, sql_delete_where, sql_insert, sql_min_max, sql_select_page,
    sql_update,
};
use crate::types::{FieldValue, TruncationPolicy, Value};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use std::collections::HashMap;
use std::sync::Arc;

use super::cursor::FeatureCursor;
use super::row::FeatureRow;
use super::table::{FeatureTable, GeometryColumns};

/// Tuning knobs for a [`FeatureDao`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureDaoOptions {
    /// Rows fetched per round trip by cursors.
    pub page_size: usize,
    /// How oversized TEXT/BLOB values are handled by rows from this DAO.
    pub truncation: TruncationPolicy,
}

impl Default for FeatureDaoOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            truncation: TruncationPolicy::Silent,
        }
    }
}

/// Typed access to one feature table.
///
/// The DAO borrows the connection and shares the immutable schema with every
/// row and cursor it produces. It keeps no state between operations and never
/// opens transactions itself.
///
/// ```no_run
/// use rusqlite_gpkg_features::{GeometryData, Gpkg, Point};
///
/// let gpkg = Gpkg::open("data/example.gpkg")?;
/// let dao = gpkg.feature_dao("points")?;
///
/// let mut row = dao.new_row();
/// row.set_geometry(GeometryData::new(4326, Point::new(1.0, 2.0)))?;
/// row.set_value_by_name("name", "alpha")?;
/// let id = dao.create(&mut row)?;
///
/// for row in dao.query_for_eq("name", "alpha")? {
///     let row = row?;
///     assert_eq!(row.id(), Some(id));
/// }
/// # Ok::<(), rusqlite_gpkg_features::GpkgError>(())
/// ```
#[derive(Debug)]
pub struct FeatureDao<'a> {
    conn: &'a Connection,
    table: Arc<FeatureTable>,
    options: FeatureDaoOptions,
    read_only: bool,
}

impl<'a> FeatureDao<'a> {
    pub fn new(conn: &'a Connection, table: FeatureTable) -> Self {
        Self::with_options(conn, table, FeatureDaoOptions::default())
    }

    pub fn with_options(conn: &'a Connection, table: FeatureTable, options: FeatureDaoOptions) -> Self {
        Self {
            conn,
            table: Arc::new(table),
            options,
            read_only: false,
        }
    }

    pub(crate) fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    pub fn table_name(&self) -> &str {
        self.table.table_name()
    }

    pub fn geometry_columns(&self) -> &GeometryColumns {
        self.table.geometry_columns()
    }

    pub fn geometry_column_name(&self) -> &str {
        &self.table.geometry_column().name
    }

    pub fn column_exists(&self, name: &str) -> bool {
        self.table.has_column(name)
    }

    pub fn options(&self) -> FeatureDaoOptions {
        self.options
    }

    /// A transient row with every cell NULL.
    pub fn new_row(&self) -> FeatureRow {
        FeatureRow::new(Arc::clone(&self.table), self.options.truncation)
    }

    pub fn query_for_all(&self) -> Result<FeatureCursor<'a>> {
        self.query(None, Vec::new())
    }

    pub fn query_for_id(&self, id: i64) -> Result<Option<FeatureRow>> {
        let where_clause = format!("{} = ?", quote_identifier(&self.table.primary_key_column().name));
        let mut cursor = self.query(Some(where_clause), vec![SqlValue::Integer(id)])?;
        let row = if cursor.move_to_first()? {
            Some(cursor.get_row()?)
        } else {
            None
        };
        cursor.close();
        Ok(row)
    }

    pub fn query_for_eq(&self, column: &str, value: impl Into<Value>) -> Result<FeatureCursor<'a>> {
        let mut fields = HashMap::with_capacity(1);
        fields.insert(column.to_string(), FieldValue::new(value));
        self.query_for_field_values(&fields)
    }

    /// Rows matching every entry of `fields`.
    ///
    /// Entries are combined with AND in column-name order. NULL values match
    /// with `IS NULL`; numeric values with a tolerance match the closed range
    /// around them.
    pub fn query_for_field_values(
        &self,
        fields: &HashMap<String, FieldValue>,
    ) -> Result<FeatureCursor<'a>> {
        let (where_clause, args) = self.field_values_where(fields)?;
        self.query(where_clause, args)
    }

    /// Rows matching a raw SQL `WHERE` clause with `?` placeholders.
    pub fn query_where<I>(&self, where_clause: &str, args: I) -> Result<FeatureCursor<'a>>
    where
        I: IntoIterator<Item = Value>,
    {
        let args = to_sql_values(args)?;
        self.query(Some(where_clause.to_string()), args)
    }

    /// Count rows, optionally restricted by a `WHERE` clause with `?` placeholders.
    pub fn count<I>(&self, where_clause: Option<&str>, args: I) -> Result<u64>
    where
        I: IntoIterator<Item = Value>,
    {
        let args = to_sql_values(args)?;
        let sql = sql_count(self.table.table_name(), where_clause);
        log::debug!("{sql}");
        let count: i64 = self
            .conn
            .query_one(&sql, params_from_iter(args), |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Insert a transient row and store the assigned primary key in it.
    ///
    /// The row is left untouched if the insert fails.
    pub fn create(&self, row: &mut FeatureRow) -> Result<i64> {
        self.ensure_writable()?;
        self.ensure_same_table(row)?;
        if row.has_id() {
            return Err(GpkgError::PrimaryKeySet {
                table: self.table.table_name().to_string(),
            });
        }

        let (columns, values) = self.non_key_values(row)?;
        let sql = sql_insert(self.table.table_name(), columns);
        log::debug!("{sql}");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(values))?;
        let id = self.conn.last_insert_rowid();
        row.set_id(id);
        Ok(id)
    }

    /// Write every non-key cell of a persisted row. Returns the rows affected.
    pub fn update(&self, row: &FeatureRow) -> Result<usize> {
        self.ensure_writable()?;
        self.ensure_same_table(row)?;
        let id = self.require_id(row)?;

        let (columns, mut values) = self.non_key_values(row)?;
        values.push(SqlValue::Integer(id));
        let sql = sql_update(
            self.table.table_name(),
            columns,
            &self.table.primary_key_column().name,
        );
        log::debug!("{sql}");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        Ok(stmt.execute(params_from_iter(values))?)
    }

    pub fn delete(&self, row: &FeatureRow) -> Result<usize> {
        self.ensure_same_table(row)?;
        let id = self.require_id(row)?;
        self.delete_by_id(id)
    }

    pub fn delete_by_id(&self, id: i64) -> Result<usize> {
        let where_clause = format!("{} = ?", quote_identifier(&self.table.primary_key_column().name));
        self.delete_where(Some(&where_clause), [Value::Integer(id)])
    }

    /// Delete rows matching a `WHERE` clause, or all rows when it is `None`.
    pub fn delete_where<I>(&self, where_clause: Option<&str>, args: I) -> Result<usize>
    where
        I: IntoIterator<Item = Value>,
    {
        self.ensure_writable()?;
        let args = to_sql_values(args)?;
        let sql = sql_delete_where(self.table.table_name(), where_clause);
        log::debug!("{sql}");
        Ok(self.conn.execute(&sql, params_from_iter(args))?)
    }

    pub fn min_id(&self) -> Result<Option<i64>> {
        self.aggregate_id("MIN")
    }

    pub fn max_id(&self) -> Result<Option<i64>> {
        self.aggregate_id("MAX")
    }

    fn aggregate_id(&self, function: &str) -> Result<Option<i64>> {
        let sql = sql_min_max(
            self.table.table_name(),
            &self.table.primary_key_column().name,
            function,
        );
        Ok(self.conn.query_one(&sql, [], |row| row.get(0))?)
    }

    fn query(&self, where_clause: Option<String>, args: Vec<SqlValue>) -> Result<FeatureCursor<'a>> {
        let table_name = self.table.table_name();
        let select_sql = sql_select_page(
            table_name,
            self.table.column_names(),
            &self.table.primary_key_column().name,
            where_clause.as_deref(),
        );
        let count_sql = sql_count(table_name, where_clause.as_deref());
        FeatureCursor::new(
            self.conn,
            Arc::clone(&self.table),
            &select_sql,
            count_sql,
            args,
            self.options.page_size,
            self.options.truncation,
        )
    }

    fn field_values_where(
        &self,
        fields: &HashMap<String, FieldValue>,
    ) -> Result<(Option<String>, Vec<SqlValue>)> {
        if fields.is_empty() {
            return Ok((None, Vec::new()));
        }

        let mut names: Vec<&String> = fields.keys().collect();
        names.sort();

        let mut clauses = Vec::with_capacity(names.len());
        let mut args = Vec::with_capacity(names.len());
        for name in names {
            let column = self.table.require_column(name)?;
            let quoted = quote_identifier(&column.name);
            let field = &fields[name];
            let numeric = field
                .value
                .as_f64()
                .or_else(|| field.value.as_i64().map(|v| v as f64));
            match (&field.value, field.tolerance, numeric) {
                (Value::Null, _, _) => clauses.push(format!("{quoted} IS NULL")),
                (_, Some(tolerance), Some(v)) => {
                    clauses.push(format!("{quoted} >= ? AND {quoted} <= ?"));
                    args.push(SqlValue::Real(v - tolerance));
                    args.push(SqlValue::Real(v + tolerance));
                }
                (value, _, _) => {
                    clauses.push(format!("{quoted} = ?"));
                    args.push(value.to_sql_value()?);
                }
            }
        }
        Ok((Some(clauses.join(" AND ")), args))
    }

    fn non_key_values<'r>(&'r self, row: &'r FeatureRow) -> Result<(Vec<&'r str>, Vec<SqlValue>)> {
        let primary_key_index = self.table.primary_key_index();
        let mut columns = Vec::with_capacity(self.table.column_count());
        let mut values = Vec::with_capacity(self.table.column_count());
        for (column, value) in self.table.columns().iter().zip(row.values()) {
            if column.index == primary_key_index {
                continue;
            }
            columns.push(column.name.as_str());
            values.push(value.to_sql_value()?);
        }
        Ok((columns, values))
    }

    fn require_id(&self, row: &FeatureRow) -> Result<i64> {
        row.id().ok_or_else(|| GpkgError::NoPrimaryKey {
            table: self.table.table_name().to_string(),
        })
    }

    fn ensure_same_table(&self, row: &FeatureRow) -> Result<()> {
        if Arc::ptr_eq(row.table_arc(), &self.table)
            || row.table().table_name() == self.table.table_name()
        {
            Ok(())
        } else {
            Err(GpkgError::Message(format!(
                "row belongs to table '{}', not '{}'",
                row.table().table_name(),
                self.table.table_name()
            )))
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(GpkgError::ReadOnly);
        }
        Ok(())
    }
}

fn to_sql_values<I>(values: I) -> Result<Vec<SqlValue>>
where
    I: IntoIterator<Item = Value>,
{
    values.into_iter().map(|value| value.to_sql_value()).collect()
}
