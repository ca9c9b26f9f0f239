//! Catalog attribute helpers
//!
//! Datasets carry their catalog metadata as `cat:`-prefixed global
//! attributes. This module extracts them and rebuilds the derived
//! identifier attribute after a clean-up has modified them.

use crate::dataset::{AttrMap, Dataset};
use std::collections::BTreeMap;

/// Prefix of catalog attributes on dataset globals
pub const CATALOG_PREFIX: &str = "cat:";

/// Catalog columns that participate in the identifier, in order
const ID_COLUMNS: [&str; 10] = [
    "mip_era",
    "activity",
    "driving_model",
    "institution",
    "source",
    "experiment",
    "member",
    "bias_adjust_project",
    "domain",
    "frequency",
];

/// Return the catalog-specific attributes from an attribute map.
///
/// Keys are returned with the prefix stripped.
pub fn get_cat_attrs(attrs: &AttrMap, prefix: &str) -> BTreeMap<String, String> {
    attrs
        .iter()
        .filter_map(|(key, value)| {
            key.strip_prefix(prefix)
                .map(|stripped| (stripped.to_string(), value.to_string()))
        })
        .collect()
}

/// Build a dataset identifier from its catalog attributes.
///
/// Joins the known identifier columns present on the dataset with
/// underscores; columns without a value are skipped.
pub fn generate_id(ds: &Dataset) -> String {
    let cat = get_cat_attrs(&ds.attrs, CATALOG_PREFIX);
    ID_COLUMNS
        .iter()
        .filter_map(|column| cat.get(*column))
        .filter(|value| !value.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join("_")
}
