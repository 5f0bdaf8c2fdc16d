//! Typed access to GeoPackage feature tables, built on top of rusqlite.
//!
//! ## Overview
//!
//! - `Gpkg` owns the SQLite connection and knows the GeoPackage metadata tables.
//! - `FeatureDao` gives typed access to one feature table.
//! - `FeatureCursor` iterates the rows of a query, page by page.
//! - `FeatureRow` is a detached snapshot of one feature, one `Value` per column.
//! - `GeometryData` is a decoded geometry cell: the GeoPackage header plus the
//!   `Geometry` parsed from its WKB body.
//!
//! `Gpkg` is the entry point and supports several open modes:
//!
//! - `Gpkg::open_read_only(path)`: open an existing file without write access.
//! - `Gpkg::open(path)`: open an existing file for read/write.
//! - `Gpkg::new(path)`: create a new file with the GeoPackage metadata tables.
//! - `Gpkg::new_in_memory()`: create a transient in-memory GeoPackage.
//!
//! Cell values are converted according to the column's declared type: a
//! `BOOLEAN` column yields `Value::Boolean`, a `DATE` column `Value::Date`, the
//! geometry column `Value::Geometry`, and so on. A cell whose SQLite storage
//! class does not fit its column fails with `GpkgError::TypeMismatch` for that
//! row only; the cursor moves on to the next row.
//!
//! ## Reading
//!
//! ```no_run
//! use rusqlite_gpkg_features::Gpkg;
//!
//! let gpkg = Gpkg::open_read_only("data/example.gpkg")?;
//! for table_name in gpkg.list_feature_tables()? {
//!     let dao = gpkg.feature_dao(&table_name)?;
//!     println!("{table_name}: {} features", dao.count(None, [])?);
//!     for row in dao.query_for_all()? {
//!         let row = row?;
//!         let geometry = row.geometry().map(|data| data.geometry_type());
//!         println!("  {:?} {:?}", row.id(), geometry);
//!     }
//! }
//! # Ok::<(), rusqlite_gpkg_features::GpkgError>(())
//! ```
//!
//! ## Writing
//!
//! ```no_run
//! use rusqlite_gpkg_features::{
//!     ColumnSpec, ColumnType, GeometryColumns, GeometryData, GeometryType, Gpkg, Point,
//! };
//!
//! let gpkg = Gpkg::new("data/new.gpkg")?;
//! let descriptor = GeometryColumns::new("points", "geom", GeometryType::Point, 4326);
//! let dao = gpkg.create_feature_table(
//!     &descriptor,
//!     &[
//!         ColumnSpec::new("name", ColumnType::Text).with_max(50),
//!         ColumnSpec::new("visits", ColumnType::Integer),
//!     ],
//! )?;
//!
//! let mut row = dao.new_row();
//! row.set_geometry(GeometryData::new(4326, Point::new(1.0, 2.0)))?;
//! row.set_value_by_name("name", "alpha")?;
//! row.set_value_by_name("visits", 7_i64)?;
//! let id = dao.create(&mut row)?;
//!
//! let mut stored = dao.query_for_id(id)?.ok_or("missing row")?;
//! if let Some(data) = stored.geometry_mut() {
//!     *data.geometry_mut() = Point::new(3.0, 4.0).into();
//! }
//! dao.update(&stored)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Geometries from other crates can be brought in through `geo-traits`:
//! `Geometry::from_geo(&geo_types::Point::new(1.0, 2.0))`.

mod conversions;
mod error;
mod geom;
mod gpkg;
mod io;
mod ogc_sql;
mod sql_functions;
mod types;

pub use error::{GpkgError, Result};
pub use geom::wkb::{read_geometry, write_geometry};
pub use geom::{
    Envelope, Geometry, GeometryCollection, GeometryData, GeometryType, LineString,
    MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
pub use gpkg::{
    FeatureColumn, FeatureCursor, FeatureDao, FeatureDaoOptions, FeatureRow, FeatureTable,
    GeometryColumns, Gpkg,
};
pub use io::{ByteOrder, ByteReader, ByteWriter};
pub use sql_functions::{SqliteFeatures, register_spatial_functions};
pub use types::{
    ColumnSpec, ColumnType, DimensionRequirement, FieldValue, TruncationPolicy, Value,
};
