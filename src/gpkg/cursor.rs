use crate::error::{GpkgError, Result};
use crate::geom::GeometryData;
use crate::types::{TruncationPolicy, Value};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Statement, params_from_iter};
use std::sync::Arc;

use super::row::{FeatureRow, decode_cell};
use super::table::FeatureTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CursorState {
    Fresh,
    Positioned(usize),
    Exhausted,
    Closed,
}

/// A cursor over the rows of a feature table query.
///
/// Rows are fetched lazily in pages ordered by primary key; the prepared
/// statement is reused for every page. Each page starts after the last key of
/// the previous one, so rows deleted or inserted while iterating do not shift
/// the rows still to come. [`FeatureCursor::get_row`] returns a
/// detached [`FeatureRow`] that stays usable after the cursor moves on or is
/// closed. The statement is released by [`FeatureCursor::close`] or on drop.
///
/// The cursor is also an iterator of `Result<FeatureRow>`. A cell that cannot
/// be decoded yields an error for that row only; iteration continues with the
/// next row.
pub struct FeatureCursor<'a> {
    conn: &'a Connection,
    stmt: Option<Statement<'a>>,
    table: Arc<FeatureTable>,
    count_sql: String,
    args: Vec<SqlValue>,
    page_size: usize,
    truncation: TruncationPolicy,
    page: Vec<Vec<SqlValue>>,
    page_start: usize,
    // primary key of the last buffered row
    last_key: Option<i64>,
    // false once a short page proved there is nothing after it
    more_rows: bool,
    state: CursorState,
}

impl<'a> FeatureCursor<'a> {
    pub(crate) fn new(
        conn: &'a Connection,
        table: Arc<FeatureTable>,
        select_sql: &str,
        count_sql: String,
        args: Vec<SqlValue>,
        page_size: usize,
        truncation: TruncationPolicy,
    ) -> Result<Self> {
        log::debug!("preparing feature query: {select_sql}");
        let stmt = conn.prepare(select_sql)?;
        Ok(Self {
            conn,
            stmt: Some(stmt),
            table,
            count_sql,
            args,
            page_size: page_size.max(1),
            truncation,
            page: Vec::new(),
            page_start: 0,
            last_key: None,
            more_rows: true,
            state: CursorState::Fresh,
        })
    }

    pub fn table(&self) -> &FeatureTable {
        &self.table
    }

    /// Current position, or `None` before the first move or past the end.
    pub fn position(&self) -> Option<usize> {
        match self.state {
            CursorState::Positioned(position) => Some(position),
            _ => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == CursorState::Closed
    }

    pub fn move_to_first(&mut self) -> Result<bool> {
        self.move_to_position(0)
    }

    /// Advance one row. Returns `false` once the end is reached.
    pub fn move_to_next(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Fresh => self.move_to_position(0),
            CursorState::Positioned(position) => self.move_to_position(position + 1),
            CursorState::Exhausted => Ok(false),
            CursorState::Closed => Err(GpkgError::CursorClosed),
        }
    }

    pub fn move_to_position(&mut self, position: usize) -> Result<bool> {
        if self.state == CursorState::Closed {
            return Err(GpkgError::CursorClosed);
        }
        if self.load(position)? {
            self.state = CursorState::Positioned(position);
            Ok(true)
        } else {
            self.state = CursorState::Exhausted;
            Ok(false)
        }
    }

    /// Materialise the row at the current position.
    pub fn get_row(&self) -> Result<FeatureRow> {
        let (position, raw) = self.current()?;
        let values = self
            .table
            .columns()
            .iter()
            .zip(raw.iter().cloned())
            .map(|(column, cell)| decode_cell(column, cell, position))
            .collect::<Result<Vec<Value>>>()?;
        Ok(FeatureRow::from_values(
            Arc::clone(&self.table),
            values,
            self.truncation,
        ))
    }

    /// Decode a single cell of the current row.
    pub fn get_value(&self, index: usize) -> Result<Value> {
        let (position, raw) = self.current()?;
        let column = self
            .table
            .column(index)
            .ok_or_else(|| GpkgError::UnknownColumn {
                column: index.to_string(),
            })?;
        decode_cell(column, raw[index].clone(), position)
    }

    /// Decode only the geometry cell of the current row.
    pub fn get_geometry(&self) -> Result<Option<GeometryData>> {
        match self.get_value(self.table.geometry_index())? {
            Value::Geometry(data) => Ok(Some(data)),
            _ => Ok(None),
        }
    }

    /// Number of rows the query matches, independent of the cursor position.
    pub fn row_count(&self) -> Result<u64> {
        if self.state == CursorState::Closed {
            return Err(GpkgError::CursorClosed);
        }
        let count: i64 = self.conn.query_one(
            &self.count_sql,
            params_from_iter(self.args.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Release the statement and any buffered rows. Calling it again is a no-op.
    pub fn close(&mut self) {
        if self.state != CursorState::Closed {
            log::trace!("closing cursor on '{}'", self.table.table_name());
        }
        self.stmt = None;
        self.page = Vec::new();
        self.state = CursorState::Closed;
    }

    fn current(&self) -> Result<(usize, &[SqlValue])> {
        match self.state {
            CursorState::Closed => Err(GpkgError::CursorClosed),
            CursorState::Positioned(position) => position
                .checked_sub(self.page_start)
                .and_then(|index| self.page.get(index))
                .map(|raw| (position, raw.as_slice()))
                .ok_or(GpkgError::CursorNotPositioned),
            CursorState::Fresh | CursorState::Exhausted => Err(GpkgError::CursorNotPositioned),
        }
    }

    // Make sure `position` is in the buffered page, walking pages forward if needed.
    fn load(&mut self, position: usize) -> Result<bool> {
        // A table never holds more than i64::MAX rows.
        if i64::try_from(position).is_err() {
            return Ok(false);
        }
        if position < self.page_start {
            self.rewind();
        }
        while position >= self.page_start + self.page.len() {
            if !self.more_rows {
                return Ok(false);
            }
            self.fetch_next_page()?;
            if self.page.is_empty() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn rewind(&mut self) {
        self.page = Vec::new();
        self.page_start = 0;
        self.last_key = None;
        self.more_rows = true;
    }

    fn fetch_next_page(&mut self) -> Result<()> {
        let stmt = self.stmt.as_mut().ok_or(GpkgError::CursorClosed)?;
        let column_count = self.table.column_count();
        let key_index = self.table.primary_key_index();
        let after = self.last_key.unwrap_or(i64::MIN);
        let limit = i64::try_from(self.page_size).unwrap_or(i64::MAX);
        let params = self
            .args
            .iter()
            .cloned()
            .chain([SqlValue::Integer(after), SqlValue::Integer(limit)]);

        let mut page = Vec::new();
        let mut rows = stmt.query(params_from_iter(params))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(row.get::<_, SqlValue>(index)?);
            }
            page.push(values);
        }

        let next_start = self.page_start + self.page.len();
        log::trace!(
            "fetched {} rows from '{}' after key {after}",
            page.len(),
            self.table.table_name()
        );
        self.more_rows = page.len() == self.page_size;
        if let Some(last) = page.last() {
            match last.get(key_index) {
                Some(SqlValue::Integer(key)) => self.last_key = Some(*key),
                _ => {
                    log::warn!(
                        "non-integer primary key in '{}', stopping after this page",
                        self.table.table_name()
                    );
                    self.more_rows = false;
                }
            }
        }
        self.page_start = next_start;
        self.page = page;
        Ok(())
    }
}

impl Iterator for FeatureCursor<'_> {
    type Item = Result<FeatureRow>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.move_to_next() {
            Ok(true) => Some(self.get_row()),
            Ok(false) | Err(GpkgError::CursorClosed) => None,
            Err(err) => {
                // A failed fetch leaves the statement in an unknown state.
                self.state = CursorState::Exhausted;
                Some(Err(err))
            }
        }
    }
}

impl std::fmt::Debug for FeatureCursor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureCursor")
            .field("table", &self.table.table_name())
            .field("state", &self.state)
            .field("page_start", &self.page_start)
            .field("page_len", &self.page.len())
            .finish()
    }
}
