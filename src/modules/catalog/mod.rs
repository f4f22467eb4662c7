pub mod models;
pub mod parser;

pub use models::{
    CatalogCategory, CatalogSnapshot, ProcessCatalogEntry, RecommendedAction, RiskLevel,
};
pub use parser::{load_snapshot, load_snapshot_from, resolve_catalog_path};
