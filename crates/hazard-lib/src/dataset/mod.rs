//! Corpus preparation: consolidation, schema binding and splitting

mod consolidate;
mod schema;
mod split;

pub use consolidate::{consolidate, ConsolidationStats};
pub use schema::{
    bind, Attribute, AttributeKind, BinaryClass, BindOptions, BindStats, ClassAttribute, Dataset,
    Instance, Schema, FALSE_LABEL, TRUE_LABEL,
};
pub use split::{stratified_split, Split};
