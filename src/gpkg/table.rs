use crate::error::{GpkgError, Result};
use crate::geom::GeometryType;
use crate::types::{ColumnType, DimensionRequirement};
use std::collections::HashMap;

/// A row of `gpkg_geometry_columns`.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryColumns {
    pub table_name: String,
    pub column_name: String,
    pub geometry_type: GeometryType,
    pub srs_id: i32,
    pub z: DimensionRequirement,
    pub m: DimensionRequirement,
}

impl GeometryColumns {
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        geometry_type: GeometryType,
        srs_id: i32,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            geometry_type,
            srs_id,
            z: DimensionRequirement::Prohibited,
            m: DimensionRequirement::Prohibited,
        }
    }

    pub fn with_z(mut self, z: DimensionRequirement) -> Self {
        self.z = z;
        self
    }

    pub fn with_m(mut self, m: DimensionRequirement) -> Self {
        self.m = m;
        self
    }
}

/// One column of a feature table.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureColumn {
    pub index: usize,
    pub name: String,
    pub column_type: ColumnType,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
    /// Maximum length of TEXT (characters) or BLOB (bytes) values.
    pub type_max: Option<u64>,
    /// Declared geometry type, only set on the table's geometry column.
    pub geometry_type: Option<GeometryType>,
}

impl FeatureColumn {
    pub fn new(index: usize, name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            index,
            name: name.into(),
            column_type,
            not_null: false,
            default_value: None,
            primary_key: false,
            type_max: None,
            geometry_type: None,
        }
    }

    pub fn is_geometry(&self) -> bool {
        self.geometry_type.is_some()
    }
}

/// Immutable schema of a feature table.
///
/// Holds exactly one integer primary key and exactly one geometry column, the
/// latter being the column named by the table's `gpkg_geometry_columns` entry.
#[derive(Clone, Debug)]
pub struct FeatureTable {
    columns: Vec<FeatureColumn>,
    geometry_columns: GeometryColumns,
    primary_key_index: usize,
    geometry_index: usize,
    index_by_name: HashMap<String, usize>,
}

impl FeatureTable {
    /// Build a schema from columns in table order.
    ///
    /// Column indexes are renumbered to their position. The column matching
    /// `geometry_columns.column_name` becomes the geometry column.
    pub fn new(columns: Vec<FeatureColumn>, geometry_columns: GeometryColumns) -> Result<Self> {
        let table_name = &geometry_columns.table_name;
        let mut columns = columns;
        let mut primary_key_index = None;
        let mut geometry_index = None;

        for (index, column) in columns.iter_mut().enumerate() {
            column.index = index;
            if column.primary_key {
                if primary_key_index.is_some() {
                    return Err(GpkgError::CompositePrimaryKeyUnsupported {
                        table_name: table_name.clone(),
                    });
                }
                if !column.column_type.is_integer() {
                    return Err(GpkgError::MissingPrimaryKeyColumn {
                        table_name: table_name.clone(),
                    });
                }
                primary_key_index = Some(index);
            }
            if column.name.eq_ignore_ascii_case(&geometry_columns.column_name) {
                column.column_type = ColumnType::Geometry;
                column.geometry_type = Some(geometry_columns.geometry_type);
                geometry_index = Some(index);
            } else {
                column.geometry_type = None;
            }
        }

        let primary_key_index =
            primary_key_index.ok_or_else(|| GpkgError::MissingPrimaryKeyColumn {
                table_name: table_name.clone(),
            })?;
        let geometry_index = geometry_index.ok_or_else(|| GpkgError::MissingGeometryColumn {
            table_name: table_name.clone(),
        })?;
        if primary_key_index == geometry_index {
            return Err(GpkgError::MissingGeometryColumn {
                table_name: table_name.clone(),
            });
        }

        let index_by_name = columns
            .iter()
            .map(|column| (column.name.to_ascii_lowercase(), column.index))
            .collect();

        Ok(Self {
            columns,
            geometry_columns,
            primary_key_index,
            geometry_index,
            index_by_name,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.geometry_columns.table_name
    }

    pub fn geometry_columns(&self) -> &GeometryColumns {
        &self.geometry_columns
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&FeatureColumn> {
        self.columns.get(index)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Column names are matched case-insensitively, like SQLite identifiers.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index_by_name.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub(crate) fn require_column(&self, name: &str) -> Result<&FeatureColumn> {
        self.column_index(name)
            .map(|index| &self.columns[index])
            .ok_or_else(|| GpkgError::UnknownColumn {
                column: name.to_string(),
            })
    }

    pub fn primary_key_index(&self) -> usize {
        self.primary_key_index
    }

    pub fn primary_key_column(&self) -> &FeatureColumn {
        &self.columns[self.primary_key_index]
    }

    pub fn geometry_index(&self) -> usize {
        self.geometry_index
    }

    pub fn geometry_column(&self) -> &FeatureColumn {
        &self.columns[self.geometry_index]
    }
}
