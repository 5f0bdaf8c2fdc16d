// cf. https://www.geopackage.org/spec140/index.html#table_definition_sql

// gpkg_spatial_ref_sys: the SRS catalog referenced by gpkg_contents and
// gpkg_geometry_columns to describe spatial reference systems.
pub(crate) const SQL_GPKG_SPATIAL_REF_SYS: &str = "
CREATE TABLE gpkg_spatial_ref_sys (
  srs_name TEXT NOT NULL,
  srs_id INTEGER PRIMARY KEY,
  organization TEXT NOT NULL,
  organization_coordsys_id INTEGER NOT NULL,
  definition  TEXT NOT NULL,
  description TEXT
);
";

// gpkg_contents: lists all geospatial contents in the package with identifying
// and descriptive metadata for user display and access.
pub(crate) const SQL_GPKG_CONTENTS: &str = "
CREATE TABLE gpkg_contents (
  table_name TEXT NOT NULL PRIMARY KEY,
  data_type TEXT NOT NULL,
  identifier TEXT UNIQUE,
  description TEXT DEFAULT '',
  last_change DATETIME NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ','now')),
  min_x DOUBLE,
  min_y DOUBLE,
  max_x DOUBLE,
  max_y DOUBLE,
  srs_id INTEGER,
  CONSTRAINT fk_gc_r_srs_id FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys(srs_id)
);
";

// gpkg_geometry_columns: identifies geometry columns and geometry types for
// vector feature user data tables.
pub(crate) const SQL_GPKG_GEOMETRY_COLUMNS: &str = "
CREATE TABLE gpkg_geometry_columns (
  table_name TEXT NOT NULL,
  column_name TEXT NOT NULL,
  geometry_type_name TEXT NOT NULL,
  srs_id INTEGER NOT NULL,
  z TINYINT NOT NULL,
  m TINYINT NOT NULL,
  CONSTRAINT pk_geom_cols PRIMARY KEY (table_name, column_name),
  CONSTRAINT uk_gc_table_name UNIQUE (table_name),
  CONSTRAINT fk_gc_tn FOREIGN KEY (table_name) REFERENCES gpkg_contents(table_name),
  CONSTRAINT fk_gc_srs FOREIGN KEY (srs_id) REFERENCES gpkg_spatial_ref_sys (srs_id)
);
";

// gpkg_extensions: declares which extensions apply to the GeoPackage, a table,
// or a column so clients can detect requirements without scanning user tables.
pub(crate) const SQL_GPKG_EXTENSIONS: &str = "
CREATE TABLE gpkg_extensions (
  table_name TEXT,
  column_name TEXT,
  extension_name TEXT NOT NULL,
  definition TEXT NOT NULL,
  scope TEXT NOT NULL,
  CONSTRAINT ge_tce UNIQUE (table_name, column_name, extension_name)
);
";

pub(crate) const SQL_LIST_FEATURE_TABLES: &str =
    "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name";

pub(crate) const SQL_INSERT_GPKG_CONTENTS: &str = "
INSERT INTO gpkg_contents
  (table_name, data_type, identifier, description, srs_id)
VALUES
  (?1, 'features', ?2, '', ?3)
";

pub(crate) const SQL_INSERT_GPKG_GEOMETRY_COLUMNS: &str = "
INSERT INTO gpkg_geometry_columns
  (table_name, column_name, geometry_type_name, srs_id, z, m)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_SELECT_GEOMETRY_COLUMN_META: &str = "
SELECT table_name, column_name, geometry_type_name, srs_id, z, m
FROM gpkg_geometry_columns
WHERE table_name = ?1
";

pub(crate) const SQL_SELECT_ALL_GEOMETRY_COLUMN_META: &str = "
SELECT table_name, column_name, geometry_type_name, srs_id, z, m
FROM gpkg_geometry_columns
ORDER BY table_name
";

pub(crate) const SQL_INSERT_GPKG_SPATIAL_REF_SYS: &str = "
INSERT INTO gpkg_spatial_ref_sys
  (srs_name, srs_id, organization, organization_coordsys_id, definition, description)
VALUES
  (?1, ?2, ?3, ?4, ?5, ?6)
";

pub(crate) const SQL_SRS_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM gpkg_spatial_ref_sys WHERE srs_id = ?1)";

pub(crate) const SQL_TABLE_EXISTS: &str =
    "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)";

pub(crate) const SQL_TABLE_INFO: &str =
    r#"SELECT cid, name, type, "notnull", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid"#;

pub(crate) const SQL_DELETE_GPKG_CONTENTS: &str = "DELETE FROM gpkg_contents WHERE table_name = ?1";

pub(crate) const SQL_DELETE_GPKG_GEOMETRY_COLUMNS: &str =
    "DELETE FROM gpkg_geometry_columns WHERE table_name = ?1";

pub(crate) const SQL_DELETE_GPKG_EXTENSIONS: &str =
    "DELETE FROM gpkg_extensions WHERE table_name = ?1";

/// Quote an identifier for use in SQL, doubling embedded quotes.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!(r#""{}""#, name.replace('"', r#""""#))
}

pub(crate) fn sql_create_table(table_name: &str, column_defs: &str) -> String {
    format!("CREATE TABLE {} ({})", quote_identifier(table_name), column_defs)
}

pub(crate) fn sql_drop_table(table_name: &str) -> String {
    format!("DROP TABLE {}", quote_identifier(table_name))
}

/// `SELECT` of the given columns with an optional `WHERE` clause, paged by
/// primary key: the two trailing parameters are the last key already seen and
/// the page size (`pk > ? ORDER BY pk LIMIT ?`).
pub(crate) fn sql_select_page<'a, I>(
    table_name: &str,
    columns: I,
    primary_key_column: &str,
    where_clause: Option<&str>,
) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = columns
        .into_iter()
        .map(quote_identifier)
        .collect::<Vec<String>>()
        .join(", ");
    let primary_key_column = quote_identifier(primary_key_column);
    let where_clause = match where_clause {
        Some(clause) => format!("({clause}) AND {primary_key_column} > ?"),
        None => format!("{primary_key_column} > ?"),
    };
    format!(
        "SELECT {columns} FROM {} WHERE {where_clause} ORDER BY {primary_key_column} LIMIT ?",
        quote_identifier(table_name),
    )
}

pub(crate) fn sql_count(table_name: &str, where_clause: Option<&str>) -> String {
    match where_clause {
        Some(clause) => format!(
            "SELECT COUNT(*) FROM {} WHERE {clause}",
            quote_identifier(table_name)
        ),
        None => format!("SELECT COUNT(*) FROM {}", quote_identifier(table_name)),
    }
}

pub(crate) fn sql_insert<'a, I>(table_name: &str, columns: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let columns = columns.into_iter().map(quote_identifier).collect::<Vec<_>>();
    if columns.is_empty() {
        return format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table_name));
    }
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        quote_identifier(table_name),
        columns.join(", "),
    )
}

/// `UPDATE` setting the given columns from `?1..?n`; the primary key is `?n+1`.
pub(crate) fn sql_update<'a, I>(table_name: &str, columns: I, primary_key_column: &str) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let assignments = columns
        .into_iter()
        .enumerate()
        .map(|(i, name)| format!("{}=?{}", quote_identifier(name), i + 1))
        .collect::<Vec<_>>();
    format!(
        "UPDATE {} SET {} WHERE {}=?{}",
        quote_identifier(table_name),
        assignments.join(", "),
        quote_identifier(primary_key_column),
        assignments.len() + 1,
    )
}

pub(crate) fn sql_delete_where(table_name: &str, where_clause: Option<&str>) -> String {
    match where_clause {
        Some(clause) => format!("DELETE FROM {} WHERE {clause}", quote_identifier(table_name)),
        None => format!("DELETE FROM {}", quote_identifier(table_name)),
    }
}

pub(crate) fn sql_min_max(table_name: &str, column: &str, function: &str) -> String {
    format!(
        "SELECT {function}({}) FROM {}",
        quote_identifier(column),
        quote_identifier(table_name)
    )
}

pub(crate) fn initialize_gpkg(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SQL_GPKG_SPATIAL_REF_SYS)?;
    register_default_srs_ids(conn)?;
    conn.execute_batch(SQL_GPKG_CONTENTS)?;
    conn.execute_batch(SQL_GPKG_GEOMETRY_COLUMNS)?;
    conn.execute_batch(SQL_GPKG_EXTENSIONS)?;
    Ok(())
}

// The three rows every GeoPackage must carry.
fn register_default_srs_ids(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    const EPSG4326_WKT: &str = r#"GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],PRIMEM["Greenwich",0,AUTHORITY["EPSG","8901"]],UNIT["degree",0.0174532925199433,AUTHORITY["EPSG","9122"]],AXIS["Latitude",NORTH],AXIS["Longitude",EAST],AUTHORITY["EPSG","4326"]]"#;

    conn.execute(
        SQL_INSERT_GPKG_SPATIAL_REF_SYS,
        rusqlite::params!["WGS 84", 4326, "EPSG", 4326, EPSG4326_WKT, "WGS 84"],
    )?;
    conn.execute(
        SQL_INSERT_GPKG_SPATIAL_REF_SYS,
        rusqlite::params![
            "Undefined Cartesian SRS",
            -1,
            "NONE",
            -1,
            "undefined",
            "undefined Cartesian coordinate reference system"
        ],
    )?;
    conn.execute(
        SQL_INSERT_GPKG_SPATIAL_REF_SYS,
        rusqlite::params![
            "Undefined geographic SRS",
            0,
            "NONE",
            0,
            "undefined",
            "undefined geographic coordinate reference system"
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{quote_identifier, sql_insert, sql_select_page, sql_update};

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("roads"), r#""roads""#);
        assert_eq!(quote_identifier(r#"odd"name"#), r#""odd""name""#);
    }

    #[test]
    fn builds_dml() {
        assert_eq!(
            sql_select_page("t", ["fid", "geom"], "fid", Some(r#""name" = ?"#)),
            r#"SELECT "fid", "geom" FROM "t" WHERE ("name" = ?) AND "fid" > ? ORDER BY "fid" LIMIT ?"#
        );
        assert_eq!(
            sql_select_page("t", ["fid"], "fid", None),
            r#"SELECT "fid" FROM "t" WHERE "fid" > ? ORDER BY "fid" LIMIT ?"#
        );
        assert_eq!(
            sql_insert("t", ["geom", "name"]),
            r#"INSERT INTO "t" ("geom", "name") VALUES (?1, ?2)"#
        );
        assert_eq!(sql_insert("t", []), r#"INSERT INTO "t" DEFAULT VALUES"#);
        assert_eq!(
            sql_update("t", ["geom", "name"], "fid"),
            r#"UPDATE "t" SET "geom"=?1, "name"=?2 WHERE "fid"=?3"#
        );
    }
}
