#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ecosystem service taxonomy and the static service-layer catalog.
//!
//! Every point in the survey project carries four multi-valued code
//! columns, one per [`ServiceCategory`]. A [`ServiceLayer`] selects the
//! points whose code column contains its single-character code. The
//! catalog returned by [`catalog`] defines the order in which layers are
//! drawn, listed in the layer control, and stacked on the map.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Column holding provisioning service codes.
pub const PROVISIONING_COLUMN: &str = "provisioning_type";
/// Column holding regulating service codes.
pub const REGULATING_COLUMN: &str = "regulating_type";
/// Column holding cultural service codes.
pub const CULTURAL_COLUMN: &str = "cultural_type";
/// Column holding supporting service codes.
pub const SUPPORTING_COLUMN: &str = "supporting_type";

/// The four multi-valued code columns, in category order.
pub const CODE_COLUMNS: [&str; 4] = [
    PROVISIONING_COLUMN,
    REGULATING_COLUMN,
    CULTURAL_COLUMN,
    SUPPORTING_COLUMN,
];

/// Top-level ecosystem service groupings.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceCategory {
    /// Material outputs (food, fibre, fresh water, minerals)
    Provisioning,
    /// Regulation of ecosystem processes (climate, water, pollination)
    Regulating,
    /// Non-material benefits (heritage, recreation, aesthetics)
    Cultural,
    /// Processes underpinning all other services (soil, nutrients)
    Supporting,
}

impl ServiceCategory {
    /// All categories in legend order.
    pub const ALL: [Self; 4] = [
        Self::Provisioning,
        Self::Regulating,
        Self::Cultural,
        Self::Supporting,
    ];

    /// Human-readable label shown in the legend.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Provisioning => "Provisioning",
            Self::Regulating => "Regulating",
            Self::Cultural => "Cultural",
            Self::Supporting => "Supporting",
        }
    }

    /// Color used for this category in the map legend.
    #[must_use]
    pub const fn legend_color(self) -> &'static str {
        match self {
            Self::Provisioning => "green",
            Self::Regulating => "blue",
            Self::Cultural => "orange",
            Self::Supporting => "brown",
        }
    }

    /// The attribute column that stores this category's codes.
    #[must_use]
    pub const fn code_column(self) -> &'static str {
        match self {
            Self::Provisioning => PROVISIONING_COLUMN,
            Self::Regulating => REGULATING_COLUMN,
            Self::Cultural => CULTURAL_COLUMN,
            Self::Supporting => SUPPORTING_COLUMN,
        }
    }
}

/// Display and selection metadata for one ecosystem service layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLayer {
    /// Stable identifier (e.g. `"food"`).
    pub id: &'static str,
    /// Display name used for the cluster, popup heading and layer control.
    pub name: &'static str,
    /// Marker color (CSS color name).
    pub color: &'static str,
    /// Font Awesome icon name, without the `fa-` prefix.
    pub icon: &'static str,
    /// Category this layer belongs to.
    pub category: ServiceCategory,
    /// Attribute column searched for [`Self::filter_val`].
    pub filter_col: &'static str,
    /// Single-character code matched as a substring of the column value.
    pub filter_val: char,
}

impl ServiceLayer {
    const fn new(
        id: &'static str,
        name: &'static str,
        color: &'static str,
        icon: &'static str,
        category: ServiceCategory,
        filter_val: char,
    ) -> Self {
        Self {
            id,
            name,
            color,
            icon,
            category,
            filter_col: category.code_column(),
            filter_val,
        }
    }
}

const CATALOG: &[ServiceLayer] = &[
    // ── Provisioning ─────────────────────────────────────────────────
    ServiceLayer::new("food", "Food", "green", "utensils", ServiceCategory::Provisioning, '1'),
    ServiceLayer::new(
        "fibrefuel",
        "Fibre and Fuel",
        "brown",
        "fire",
        ServiceCategory::Provisioning,
        '2',
    ),
    ServiceLayer::new(
        "genetics",
        "Genetic Resources",
        "darkgreen",
        "dna",
        ServiceCategory::Provisioning,
        '3',
    ),
    ServiceLayer::new(
        "pharma",
        "Biochemicals & Pharmaceuticals",
        "darkred",
        "prescription-bottle-medical",
        ServiceCategory::Provisioning,
        '4',
    ),
    ServiceLayer::new(
        "ornamentals",
        "Ornamental Resources",
        "purple",
        "leaf",
        ServiceCategory::Provisioning,
        '5',
    ),
    ServiceLayer::new(
        "freshwater",
        "Fresh Water",
        "blue",
        "tint",
        ServiceCategory::Provisioning,
        '6',
    ),
    ServiceLayer::new(
        "minerals",
        "Minerals",
        "gray",
        "mountain",
        ServiceCategory::Provisioning,
        '7',
    ),
    // ── Regulating ───────────────────────────────────────────────────
    ServiceLayer::new(
        "airquality",
        "Air Quality Regulation",
        "lightblue",
        "wind",
        ServiceCategory::Regulating,
        '1',
    ),
    ServiceLayer::new(
        "climate",
        "Climate Regulation",
        "darkblue",
        "cloud-sun",
        ServiceCategory::Regulating,
        '2',
    ),
    ServiceLayer::new(
        "water",
        "Water Regulation",
        "cyan",
        "water",
        ServiceCategory::Regulating,
        '3',
    ),
    ServiceLayer::new(
        "hazards",
        "Natural Hazard Regulation",
        "red",
        "exclamation-triangle",
        ServiceCategory::Regulating,
        '4',
    ),
    ServiceLayer::new(
        "pests",
        "Pest & Disease Regulation",
        "orange",
        "bug",
        ServiceCategory::Regulating,
        '5',
    ),
    ServiceLayer::new(
        "waterpurity",
        "Water Purification",
        "lightcyan",
        "filter",
        ServiceCategory::Regulating,
        '6',
    ),
    ServiceLayer::new(
        "pollination",
        "Pollination",
        "yellow",
        "seedling",
        ServiceCategory::Regulating,
        '7',
    ),
    // ── Cultural ─────────────────────────────────────────────────────
    ServiceLayer::new(
        "heritage",
        "Cultural Heritage",
        "darkred",
        "landmark",
        ServiceCategory::Cultural,
        '1',
    ),
    ServiceLayer::new(
        "recreation",
        "Recreation & Tourism",
        "orange",
        "hiking",
        ServiceCategory::Cultural,
        '2',
    ),
    ServiceLayer::new(
        "aesthetics",
        "Aesthetic Value",
        "pink",
        "image",
        ServiceCategory::Cultural,
        '3',
    ),
    ServiceLayer::new(
        "religion",
        "Spiritual & Religious Value",
        "purple",
        "place-of-worship",
        ServiceCategory::Cultural,
        '4',
    ),
    // ── Supporting ───────────────────────────────────────────────────
    ServiceLayer::new(
        "soilform",
        "Soil Formation",
        "saddlebrown",
        "layer-group",
        ServiceCategory::Supporting,
        '1',
    ),
    ServiceLayer::new(
        "primaryprod",
        "Primary Production",
        "darkgreen",
        "sun",
        ServiceCategory::Supporting,
        '2',
    ),
    ServiceLayer::new(
        "nutcycling",
        "Nutrient Cycling",
        "olive",
        "recycle",
        ServiceCategory::Supporting,
        '3',
    ),
    ServiceLayer::new(
        "watercycling",
        "Water Cycling",
        "darkblue",
        "sync",
        ServiceCategory::Supporting,
        '4',
    ),
    ServiceLayer::new("photo", "Photosynthesis", "lime", "leaf", ServiceCategory::Supporting, '5'),
];

/// Returns the service-layer catalog in declaration order.
#[must_use]
pub const fn catalog() -> &'static [ServiceLayer] {
    CATALOG
}

/// Looks up a service layer by its identifier.
#[must_use]
pub fn find_layer(id: &str) -> Option<&'static ServiceLayer> {
    CATALOG.iter().find(|layer| layer.id == id)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use super::*;

    #[test]
    fn layer_ids_are_unique() {
        let mut ids: Vec<&str> = catalog().iter().map(|l| l.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), catalog().len());
    }

    #[test]
    fn codes_are_unique_within_column() {
        for layer in catalog() {
            let clashes = catalog()
                .iter()
                .filter(|other| {
                    other.filter_col == layer.filter_col && other.filter_val == layer.filter_val
                })
                .count();
            assert_eq!(clashes, 1, "{} shares its code", layer.id);
            assert!(layer.filter_val.is_ascii_digit(), "{}", layer.id);
        }
    }

    #[test]
    fn catalog_is_grouped_in_category_order() {
        let categories: Vec<ServiceCategory> = catalog().iter().map(|l| l.category).collect();
        let mut sorted = categories.clone();
        sorted.sort();
        assert_eq!(categories, sorted);
        assert_eq!(catalog().first().map(|l| l.id), Some("food"));
        assert_eq!(catalog().last().map(|l| l.id), Some("photo"));
    }

    #[test]
    fn catalog_has_23_layers_across_categories() {
        assert_eq!(catalog().len(), 23);

        let per_category: Vec<usize> = ServiceCategory::ALL
            .iter()
            .map(|c| catalog().iter().filter(|l| l.category == *c).count())
            .collect();
        assert_eq!(per_category, vec![7, 7, 4, 5]);
    }

    #[test]
    fn filter_column_follows_category() {
        for layer in catalog() {
            assert_eq!(layer.filter_col, layer.category.code_column());
            assert!(CODE_COLUMNS.contains(&layer.filter_col));
        }
    }

    #[test]
    fn category_round_trips_through_strum() {
        assert_eq!(ServiceCategory::Cultural.to_string(), "cultural");
        assert_eq!(
            ServiceCategory::from_str("supporting"),
            Ok(ServiceCategory::Supporting)
        );
    }

    #[test]
    fn finds_layer_by_id() {
        let layer = find_layer("pollination").expect("pollination layer");
        assert_eq!(layer.filter_col, REGULATING_COLUMN);
        assert_eq!(layer.filter_val, '7');
        assert!(find_layer("nonexistent").is_none());
    }
}
