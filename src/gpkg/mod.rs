//! Feature data access over a GeoPackage connection.
//!
//! [`Gpkg`] owns the connection and resolves feature table schemas. A
//! [`FeatureDao`] borrows it to query and write one table; queries return a
//! [`FeatureCursor`] of detached [`FeatureRow`] snapshots.

mod cursor;
mod dao;
mod gpkg;
mod row;
mod table;

pub use cursor::FeatureCursor;
pub use dao::{FeatureDao, FeatureDaoOptions};
pub use gpkg::Gpkg;
pub use row::FeatureRow;
pub use table::{FeatureColumn, FeatureTable, GeometryColumns};
