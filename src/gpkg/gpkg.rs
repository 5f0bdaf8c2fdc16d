use crate::conversions::{
    column_type_from_str, column_type_to_str, dimensions_from_zm, geometry_type_from_str,
    geometry_type_to_str,
};
use crate::error::{GpkgError, Result};
use crate::ogc_sql::{
    SQL_DELETE_GPKG_CONTENTS, SQL_DELETE_GPKG_EXTENSIONS, SQL_DELETE_GPKG_GEOMETRY_COLUMNS,
    SQL_INSERT_GPKG_CONTENTS, SQL_INSERT_GPKG_GEOMETRY_COLUMNS, SQL_INSERT_GPKG_SPATIAL_REF_SYS,
    SQL_LIST_FEATURE_TABLES, SQL_SELECT_ALL_GEOMETRY_COLUMN_META, SQL_SELECT_GEOMETRY_COLUMN_META,
    SQL_SRS_EXISTS, SQL_TABLE_EXISTS, SQL_TABLE_INFO, initialize_gpkg, quote_identifier,
    sql_create_table, sql_drop_table,
};
use crate::sql_functions::{SqliteFeatures, register_spatial_functions};
use crate::types::{ColumnSpec, ColumnType};
use rusqlite::{OpenFlags, OptionalExtension};
use std::path::Path;

use super::dao::{FeatureDao, FeatureDaoOptions};
use super::table::{FeatureColumn, FeatureTable, GeometryColumns};

#[derive(Debug)]
/// GeoPackage connection wrapper giving access to its feature tables.
pub struct Gpkg {
    conn: rusqlite::Connection,
    read_only: bool,
}

impl Gpkg {
    /// Open a GeoPackage in read-only mode.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = rusqlite::Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        register_spatial_functions(&conn)?;
        Ok(Self {
            conn,
            read_only: true,
        })
    }

    /// Open a GeoPackage in read-write mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GpkgError::Message(format!(
                "GeoPackage file does not exist: {}",
                path.display()
            )));
        }

        let conn = rusqlite::Connection::open(path)?;
        register_spatial_functions(&conn)?;
        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Create a new GeoPackage
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(GpkgError::Message(format!(
                "GeoPackage file already exists: {}",
                path.display()
            )));
        }

        let conn = rusqlite::Connection::open(path)?;

        initialize_gpkg(&conn)?;
        register_spatial_functions(&conn)?;

        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Create a new GeoPackage in memory
    pub fn new_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;

        initialize_gpkg(&conn)?;
        register_spatial_functions(&conn)?;

        Ok(Self {
            conn,
            read_only: false,
        })
    }

    /// Register a spatial reference system in `gpkg_spatial_ref_sys`.
    ///
    /// Feature tables must reference an `srs_id` that already exists there. A
    /// new GeoPackage only carries EPSG:4326 and the two undefined systems
    /// (`-1` and `0`), so any other system has to be inserted before creating
    /// a table that uses it. The WKT `definition` is stored as given.
    ///
    /// Example: register EPSG:3857 (Web Mercator / Pseudo-Mercator).
    /// ```
    /// # use rusqlite_gpkg_features::Gpkg;
    /// let gpkg = Gpkg::new_in_memory()?;
    /// let definition = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AUTHORITY["EPSG","4326"]],PROJECTION["Mercator_1SP"],PARAMETER["central_meridian",0],PARAMETER["scale_factor",1],PARAMETER["false_easting",0],PARAMETER["false_northing",0],UNIT["metre",1,AUTHORITY["EPSG","9001"]],AXIS["Easting",EAST],AXIS["Northing",NORTH],AUTHORITY["EPSG","3857"]]"#;
    /// gpkg.register_srs(
    ///     "WGS 84 / Pseudo-Mercator",
    ///     3857,
    ///     "EPSG",
    ///     3857,
    ///     definition,
    ///     "Web Mercator / Pseudo-Mercator (EPSG:3857)",
    /// )?;
    /// # Ok::<(), rusqlite_gpkg_features::GpkgError>(())
    /// ```
    pub fn register_srs(
        &self,
        srs_name: &str,
        srs_id: i32,
        organization: &str,
        organization_coordsys_id: i32,
        definition: &str,
        description: &str,
    ) -> Result<()> {
        self.ensure_writable()?;
        self.conn.execute(
            SQL_INSERT_GPKG_SPATIAL_REF_SYS,
            rusqlite::params![
                srs_name,
                srs_id,
                organization,
                organization_coordsys_id,
                definition,
                description
            ],
        )?;
        Ok(())
    }

    /// List the feature tables registered in `gpkg_contents`.
    pub fn list_feature_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(SQL_LIST_FEATURE_TABLES)?;
        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tables)
    }

    /// Look up the `gpkg_geometry_columns` entry of a table.
    pub fn geometry_columns(&self, table_name: &str) -> Result<GeometryColumns> {
        let mut stmt = self.conn.prepare(SQL_SELECT_GEOMETRY_COLUMN_META)?;
        let raw = stmt
            .query_row([table_name], read_geometry_columns_row)
            .optional()?
            .ok_or_else(|| GpkgError::MissingTable {
                table_name: table_name.to_string(),
            })?;
        geometry_columns_from_raw(raw)
    }

    /// Every `gpkg_geometry_columns` entry, ordered by table name.
    pub fn list_geometry_columns(&self) -> Result<Vec<GeometryColumns>> {
        let mut stmt = self.conn.prepare(SQL_SELECT_ALL_GEOMETRY_COLUMN_META)?;
        let rows = stmt
            .query_map([], read_geometry_columns_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(geometry_columns_from_raw).collect()
    }

    /// Resolve the schema of a feature table from `PRAGMA table_info` and its
    /// geometry columns entry.
    pub fn feature_table(&self, table_name: &str) -> Result<FeatureTable> {
        let geometry_columns = self.geometry_columns(table_name)?;
        let mut stmt = self.conn.prepare(SQL_TABLE_INFO)?;
        let infos = stmt
            .query_map([table_name], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, i64>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if infos.is_empty() {
            return Err(GpkgError::MissingTable {
                table_name: table_name.to_string(),
            });
        }

        let mut columns = Vec::with_capacity(infos.len());
        for (cid, name, declared_type, not_null, default_value, pk) in infos {
            // cf. https://www.geopackage.org/spec140/index.html#_sqlite_container
            let (column_type, type_max) = column_type_from_str(&declared_type).ok_or_else(|| {
                GpkgError::UnsupportedColumnType {
                    column: name.clone(),
                    declared_type: declared_type.clone(),
                }
            })?;
            columns.push(FeatureColumn {
                not_null: not_null != 0,
                default_value,
                primary_key: pk != 0,
                type_max,
                ..FeatureColumn::new(cid as usize, name, column_type)
            });
        }

        log::debug!(
            "resolved feature table '{table_name}' with {} columns",
            columns.len()
        );
        FeatureTable::new(columns, geometry_columns)
    }

    /// Typed access to a feature table with default options.
    pub fn feature_dao(&self, table_name: &str) -> Result<FeatureDao<'_>> {
        self.feature_dao_with_options(table_name, FeatureDaoOptions::default())
    }

    pub fn feature_dao_with_options(
        &self,
        table_name: &str,
        options: FeatureDaoOptions,
    ) -> Result<FeatureDao<'_>> {
        let table = self.feature_table(table_name)?;
        Ok(FeatureDao::with_options(&self.conn, table, options).read_only(self.read_only))
    }

    /// Create a feature table and register it in `gpkg_contents` and
    /// `gpkg_geometry_columns`.
    ///
    /// The table gets an `fid INTEGER PRIMARY KEY AUTOINCREMENT` column, the
    /// geometry column declared with its geometry type name, then `columns`.
    pub fn create_feature_table(
        &self,
        geometry_columns: &GeometryColumns,
        columns: &[ColumnSpec],
    ) -> Result<FeatureDao<'_>> {
        self.ensure_writable()?;
        let table_name = geometry_columns.table_name.as_str();

        let table_exists: bool = self
            .conn
            .query_one(SQL_TABLE_EXISTS, [table_name], |row| row.get(0))?;
        if table_exists || self.list_feature_tables()?.iter().any(|t| t == table_name) {
            return Err(GpkgError::LayerAlreadyExists {
                layer_name: table_name.to_string(),
            });
        }

        let srs_exists: bool =
            self.conn
                .query_one(SQL_SRS_EXISTS, [geometry_columns.srs_id], |row| row.get(0))?;
        if !srs_exists {
            return Err(GpkgError::MissingSpatialRefSysId {
                srs_id: geometry_columns.srs_id,
            });
        }

        let geometry_type_name = geometry_type_to_str(geometry_columns.geometry_type);
        let mut column_defs = Vec::with_capacity(columns.len() + 2);
        column_defs.push(r#""fid" INTEGER PRIMARY KEY AUTOINCREMENT"#.to_string());
        column_defs.push(format!(
            "{} {geometry_type_name}",
            quote_identifier(&geometry_columns.column_name)
        ));
        for spec in columns {
            column_defs.push(column_def(spec)?);
        }

        let create_sql = sql_create_table(table_name, &column_defs.join(", "));
        log::debug!("{create_sql}");

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&create_sql)?;
        tx.execute(
            SQL_INSERT_GPKG_CONTENTS,
            rusqlite::params![table_name, table_name, geometry_columns.srs_id],
        )?;
        tx.execute(
            SQL_INSERT_GPKG_GEOMETRY_COLUMNS,
            rusqlite::params![
                table_name,
                geometry_columns.column_name,
                geometry_type_name,
                geometry_columns.srs_id,
                geometry_columns.z as i8,
                geometry_columns.m as i8
            ],
        )?;
        tx.commit()?;

        self.feature_dao(table_name)
    }

    /// Drop a feature table and its metadata rows.
    pub fn delete_feature_table(&self, table_name: &str) -> Result<()> {
        self.ensure_writable()?;
        // Fails with MissingTable for unknown tables.
        self.geometry_columns(table_name)?;

        let tx = self.conn.unchecked_transaction()?;
        tx.execute(SQL_DELETE_GPKG_EXTENSIONS, [table_name])?;
        tx.execute(SQL_DELETE_GPKG_GEOMETRY_COLUMNS, [table_name])?;
        tx.execute(SQL_DELETE_GPKG_CONTENTS, [table_name])?;
        tx.execute_batch(&sql_drop_table(table_name))?;
        tx.commit()?;
        Ok(())
    }

    /// Probe optional capabilities of the underlying SQLite library.
    pub fn sqlite_features(&self) -> Result<SqliteFeatures> {
        SqliteFeatures::probe(&self.conn)
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// The underlying connection, for queries this crate does not cover.
    pub fn connection(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(GpkgError::ReadOnly);
        }
        Ok(())
    }
}

type GeometryColumnsRow = (String, String, String, i32, i8, i8);

fn read_geometry_columns_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GeometryColumnsRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn geometry_columns_from_raw(raw: GeometryColumnsRow) -> Result<GeometryColumns> {
    let (table_name, column_name, geometry_type_name, srs_id, z, m) = raw;
    let geometry_type = geometry_type_from_str(&geometry_type_name)?;
    let (z, m) = dimensions_from_zm(z, m)?;
    Ok(GeometryColumns {
        table_name,
        column_name,
        geometry_type,
        srs_id,
        z,
        m,
    })
}

fn column_def(spec: &ColumnSpec) -> Result<String> {
    if spec.column_type == ColumnType::Geometry {
        return Err(GpkgError::UnsupportedColumnType {
            column: spec.name.clone(),
            declared_type: column_type_to_str(spec.column_type).to_string(),
        });
    }

    let mut def = format!(
        "{} {}",
        quote_identifier(&spec.name),
        column_type_to_str(spec.column_type)
    );
    if let Some(max) = spec.type_max {
        if matches!(spec.column_type, ColumnType::Text | ColumnType::Blob) {
            def.push_str(&format!("({max})"));
        }
    }
    if spec.not_null {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = &spec.default {
        def.push_str(&format!(" DEFAULT {default}"));
    }
    Ok(def)
}

#[cfg(test)]
mod tests {
    use super::Gpkg;
    use crate::error::GpkgError;
    use crate::geom::GeometryType;
    use crate::gpkg::table::GeometryColumns;
    use crate::types::{ColumnSpec, ColumnType, DimensionRequirement};

    fn temp_path(prefix: &str) -> std::path::PathBuf {
        use std::time::{SystemTime, UNIX_EPOCH};

        let mut path = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        path.push(format!("{prefix}_{nanos}.gpkg"));
        path
    }

    #[test]
    fn create_feature_table_requires_existing_srs() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let descriptor = GeometryColumns::new("missing_srs", "geom", GeometryType::Point, 9999);
        let err = gpkg
            .create_feature_table(&descriptor, &[])
            .expect_err("missing srs should fail");
        assert!(matches!(
            err,
            GpkgError::MissingSpatialRefSysId { srs_id: 9999 }
        ));
        assert!(gpkg.list_feature_tables()?.is_empty());
        Ok(())
    }

    #[test]
    fn creates_and_describes_feature_table() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let descriptor = GeometryColumns::new("roads", "shape", GeometryType::LineString, 4326)
            .with_z(DimensionRequirement::Optional);
        let columns = [
            ColumnSpec::new("name", ColumnType::Text).with_max(20).not_null().with_default("''"),
            ColumnSpec::new("lanes", ColumnType::TinyInt),
            ColumnSpec::new("opened", ColumnType::Date),
        ];
        gpkg.create_feature_table(&descriptor, &columns)?;

        assert_eq!(gpkg.list_feature_tables()?, vec!["roads".to_string()]);
        assert_eq!(gpkg.geometry_columns("roads")?, descriptor);
        assert_eq!(gpkg.list_geometry_columns()?, vec![descriptor]);

        let table = gpkg.feature_table("roads")?;
        assert_eq!(table.column_names(), vec!["fid", "shape", "name", "lanes", "opened"]);
        assert_eq!(table.primary_key_index(), 0);
        assert_eq!(table.geometry_index(), 1);
        assert_eq!(
            table.geometry_column().geometry_type,
            Some(GeometryType::LineString)
        );
        let name = table.column(2).expect("name column");
        assert_eq!(name.column_type, ColumnType::Text);
        assert_eq!(name.type_max, Some(20));
        assert!(name.not_null);
        assert_eq!(name.default_value.as_deref(), Some("''"));
        assert_eq!(table.column(3).map(|c| c.column_type), Some(ColumnType::TinyInt));
        assert_eq!(table.column(4).map(|c| c.column_type), Some(ColumnType::Date));
        Ok(())
    }

    #[test]
    fn rejects_duplicate_and_geometry_typed_columns() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let descriptor = GeometryColumns::new("points", "geom", GeometryType::Point, 4326);
        gpkg.create_feature_table(&descriptor, &[])?;
        assert!(matches!(
            gpkg.create_feature_table(&descriptor, &[]),
            Err(GpkgError::LayerAlreadyExists { .. })
        ));

        let other = GeometryColumns::new("other", "geom", GeometryType::Point, 4326);
        assert!(matches!(
            gpkg.create_feature_table(&other, &[ColumnSpec::new("g2", ColumnType::Geometry)]),
            Err(GpkgError::UnsupportedColumnType { .. })
        ));
        Ok(())
    }

    #[test]
    fn deletes_feature_table() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let descriptor = GeometryColumns::new("points", "geom", GeometryType::Point, 0);
        gpkg.create_feature_table(&descriptor, &[])?;
        gpkg.delete_feature_table("points")?;
        assert!(gpkg.list_feature_tables()?.is_empty());
        assert!(matches!(
            gpkg.geometry_columns("points"),
            Err(GpkgError::MissingTable { .. })
        ));
        assert!(matches!(
            gpkg.feature_dao("points"),
            Err(GpkgError::MissingTable { .. })
        ));
        Ok(())
    }

    #[test]
    fn unknown_declared_type_is_reported() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let descriptor = GeometryColumns::new("odd", "geom", GeometryType::Point, 4326);
        gpkg.create_feature_table(&descriptor, &[])?;
        gpkg.connection()
            .execute_batch(r#"ALTER TABLE "odd" ADD COLUMN "payload" JSONB"#)?;
        match gpkg.feature_table("odd") {
            Err(GpkgError::UnsupportedColumnType {
                column,
                declared_type,
            }) => {
                assert_eq!(column, "payload");
                assert_eq!(declared_type, "JSONB");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn registers_srs() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        gpkg.register_srs("local grid", 32000, "LOCAL", 32000, "LOCAL_CS[\"grid\"]", "")?;
        let descriptor = GeometryColumns::new("grid", "geom", GeometryType::Polygon, 32000);
        let dao = gpkg.create_feature_table(&descriptor, &[])?;
        assert_eq!(dao.geometry_columns().srs_id, 32000);
        Ok(())
    }

    #[test]
    fn probes_sqlite_features() -> crate::Result<()> {
        let gpkg = Gpkg::new_in_memory()?;
        let features = gpkg.sqlite_features()?;
        assert!(features.has_function("st_minx"));
        assert!(features.require_function("ST_IsEmpty").is_ok());
        Ok(())
    }

    #[test]
    fn new_fails_if_file_exists() {
        use std::fs;

        let path = temp_path("rusqlite_gpkg_features_exists");
        fs::write(&path, []).expect("create temp file");
        let err = Gpkg::new(&path).expect_err("existing file should fail");
        match err {
            GpkgError::Message(message) => {
                assert!(message.contains("already exists"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn open_fails_if_missing_file() {
        let path = temp_path("rusqlite_gpkg_features_missing");
        let err = Gpkg::open(&path).expect_err("missing file should fail");
        match err {
            GpkgError::Message(message) => {
                assert!(message.contains("does not exist"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn read_only_rejects_writes() -> crate::Result<()> {
        let path = temp_path("rusqlite_gpkg_features_read_only");
        {
            let gpkg = Gpkg::new(&path)?;
            let descriptor = GeometryColumns::new("points", "geom", GeometryType::Point, 4326);
            gpkg.create_feature_table(&descriptor, &[])?;
        }

        let gpkg = Gpkg::open_read_only(&path)?;
        assert!(gpkg.is_read_only());
        assert!(matches!(
            gpkg.delete_feature_table("points"),
            Err(GpkgError::ReadOnly)
        ));
        let dao = gpkg.feature_dao("points")?;
        let mut row = dao.new_row();
        assert!(matches!(dao.create(&mut row), Err(GpkgError::ReadOnly)));
        assert_eq!(dao.count(None, [])?, 0);

        drop(dao);
        drop(gpkg);
        let _ = std::fs::remove_file(&path);
        Ok(())
    }
}
