pub mod catalog;

pub use catalog::{leading_key, Catalog, CatalogError, IndexInfo, TableInfo};
