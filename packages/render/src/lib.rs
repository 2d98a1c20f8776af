#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Map construction for ecosystem service layers.
//!
//! [`build_map`] turns a (filtered) [`FeatureTable`] into a
//! [`MapDocument`]: one marker cluster per non-empty service layer, a
//! layer control and a category legend. The document is plain data and
//! serializes to JSON; [`html::render_html`] embeds it in a standalone
//! Leaflet page.

pub mod html;

use ecosystem_map_feature_models::{FeatureRow, FeatureTable};
use ecosystem_map_filter::filter_by_service;
use ecosystem_map_service_models::{ServiceCategory, ServiceLayer};
use serde::{Deserialize, Serialize};

pub use html::{RenderError, escape_html, render_html};

/// Default `OpenStreetMap` tile URL template.
pub const OSM_TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Default `OpenStreetMap` attribution.
pub const OSM_ATTRIBUTION: &str =
    "&copy; <a href=\"https://www.openstreetmap.org/copyright\">OpenStreetMap</a> contributors";

/// Maximum popup width in pixels.
pub const POPUP_MAX_WIDTH: u32 = 300;

/// Basemap tile source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileSource {
    /// URL template with `{s}`, `{z}`, `{x}`, `{y}` placeholders.
    pub url: String,
    /// Attribution HTML shown in the map corner.
    pub attribution: String,
}

impl Default for TileSource {
    fn default() -> Self {
        Self {
            url: OSM_TILE_URL.to_string(),
            attribution: OSM_ATTRIBUTION.to_string(),
        }
    }
}

/// Settings that shape a [`MapDocument`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapOptions {
    /// Zoom used when the map is centered on data.
    pub zoom: u8,
    /// Basemap tiles.
    pub tiles: TileSource,
    /// Center used when no row has a point.
    pub fallback_center: LatLng,
    /// Zoom used together with [`Self::fallback_center`].
    pub fallback_zoom: u8,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            zoom: 10,
            tiles: TileSource::default(),
            fallback_center: LatLng { lat: 0.0, lng: 0.0 },
            fallback_zoom: 2,
        }
    }
}

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

/// A marker popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Popup {
    /// Escaped popup HTML.
    pub html: String,
    /// Maximum width in pixels.
    pub max_width: u32,
}

/// One marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: LatLng,
    pub popup: Popup,
}

/// A named cluster holding the markers of one service layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkerCluster {
    /// Service layer id.
    pub id: &'static str,
    /// Name shown in the layer control.
    pub name: &'static str,
    /// Marker color.
    pub color: &'static str,
    /// Font Awesome icon name.
    pub icon: &'static str,
    pub category: ServiceCategory,
    pub markers: Vec<Marker>,
}

/// Layer toggle widget settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LayerControl {
    /// Whether the control starts collapsed.
    pub collapsed: bool,
}

/// One legend row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LegendEntry {
    pub label: &'static str,
    pub color: &'static str,
}

/// Static category legend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Legend {
    pub title: &'static str,
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    /// The four ecosystem service categories with their colors.
    #[must_use]
    pub fn categories() -> Self {
        Self {
            title: "Ecosystem Services",
            entries: ServiceCategory::ALL
                .iter()
                .map(|category| LegendEntry {
                    label: category.label(),
                    color: category.legend_color(),
                })
                .collect(),
        }
    }
}

/// A complete map description, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDocument {
    pub center: LatLng,
    pub zoom: u8,
    pub tiles: TileSource,
    /// Clusters in catalog order. Empty layers are absent.
    pub layers: Vec<MarkerCluster>,
    pub layer_control: LayerControl,
    pub legend: Legend,
}

impl MapDocument {
    /// Total number of markers across all clusters.
    #[must_use]
    pub fn marker_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.markers.len()).sum()
    }
}

/// Why a row could not become a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MarkerErrorKind {
    /// Latitude or longitude is NaN or infinite.
    #[error("coordinates are not finite")]
    NonFinite,
    /// Latitude outside ±90 or longitude outside ±180.
    #[error("coordinates are out of range")]
    OutOfRange,
}

/// A per-row marker failure. Never fatal to the build.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("could not place marker for row {row} of layer '{layer}' at ({lat}, {lng}): {kind}")]
pub struct MarkerError {
    /// Layer name.
    pub layer: &'static str,
    /// Row index within the layer.
    pub row: usize,
    pub lat: f64,
    pub lng: f64,
    pub kind: MarkerErrorKind,
}

/// Result of [`build_map`].
#[derive(Debug, Clone, PartialEq)]
pub struct MapBuild {
    pub document: MapDocument,
    /// Rows that matched a layer but could not be placed.
    pub errors: Vec<MarkerError>,
}

/// Builds the map document for `table`.
///
/// Layers are visited in `catalog` order; empty layers produce no cluster
/// and no layer-control entry. Rows without a point are skipped silently.
/// Rows with unusable coordinates are reported in [`MapBuild::errors`] and
/// the build continues.
#[must_use]
pub fn build_map(table: &FeatureTable, catalog: &[ServiceLayer], options: &MapOptions) -> MapBuild {
    let (center, zoom) = compute_center(table).map_or_else(
        || {
            log::debug!("No plottable rows; using fallback center");
            (options.fallback_center, options.fallback_zoom)
        },
        |center| (center, options.zoom),
    );

    let mut layers = Vec::new();
    let mut errors = Vec::new();

    for descriptor in catalog {
        let layer = filter_by_service(table, descriptor);
        if layer.is_empty() {
            continue;
        }

        let mut markers = Vec::with_capacity(layer.len());
        for (index, row) in layer.rows().iter().enumerate() {
            match build_marker(&layer, row, descriptor) {
                Ok(Some(marker)) => markers.push(marker),
                Ok(None) => {}
                Err(kind) => {
                    let error = MarkerError {
                        layer: descriptor.name,
                        row: index,
                        lat: row.latitude().unwrap_or(f64::NAN),
                        lng: row.longitude().unwrap_or(f64::NAN),
                        kind,
                    };
                    log::error!("{error}");
                    errors.push(error);
                }
            }
        }

        log::debug!("Layer {}: {} markers", descriptor.id, markers.len());

        layers.push(MarkerCluster {
            id: descriptor.id,
            name: descriptor.name,
            color: descriptor.color,
            icon: descriptor.icon,
            category: descriptor.category,
            markers,
        });
    }

    MapBuild {
        document: MapDocument {
            center,
            zoom,
            tiles: options.tiles.clone(),
            layers,
            layer_control: LayerControl { collapsed: false },
            legend: Legend::categories(),
        },
        errors,
    }
}

/// Mean latitude and longitude over rows that have a point, or `None`
/// when there are none.
#[must_use]
pub fn compute_center(table: &FeatureTable) -> Option<LatLng> {
    let (count, lat_sum, lng_sum) = table
        .plottable_rows()
        .filter_map(|row| row.geometry)
        .filter(|point| point.x().is_finite() && point.y().is_finite())
        .fold((0_u32, 0.0, 0.0), |(n, lat, lng), point| {
            (n + 1, lat + point.y(), lng + point.x())
        });

    (count > 0).then(|| LatLng {
        lat: lat_sum / f64::from(count),
        lng: lng_sum / f64::from(count),
    })
}

fn build_marker(
    table: &FeatureTable,
    row: &FeatureRow,
    layer: &ServiceLayer,
) -> Result<Option<Marker>, MarkerErrorKind> {
    let Some(point) = row.geometry else {
        return Ok(None);
    };
    let (lat, lng) = (point.y(), point.x());

    if !lat.is_finite() || !lng.is_finite() {
        return Err(MarkerErrorKind::NonFinite);
    }
    if lat.abs() > 90.0 || lng.abs() > 180.0 {
        return Err(MarkerErrorKind::OutOfRange);
    }

    Ok(Some(Marker {
        position: LatLng { lat, lng },
        popup: Popup {
            html: popup_html(table, row, layer.name),
            max_width: POPUP_MAX_WIDTH,
        },
    }))
}

/// Popup body: the layer name in bold, then one `field: value` line per
/// non-null attribute. Names and values are HTML-escaped.
#[must_use]
pub fn popup_html(table: &FeatureTable, row: &FeatureRow, title: &str) -> String {
    let mut html = format!("<b>{}</b><br>", escape_html(title));
    for (field, value) in table.attributes(row) {
        if value.is_null() {
            continue;
        }
        html.push_str(&escape_html(field));
        html.push_str(": ");
        html.push_str(&escape_html(&value.to_string()));
        html.push_str("<br>");
    }
    html
}

#[cfg(test)]
mod tests {
    use ecosystem_map_feature_models::{AttributeValue, Point};
    use ecosystem_map_service_models::{catalog, find_layer};

    use super::*;

    fn columns() -> Vec<String> {
        [
            "provisioning_type",
            "regulating_type",
            "cultural_type",
            "supporting_type",
            "Your name",
        ]
        .iter()
        .map(ToString::to_string)
        .collect()
    }

    fn row(point: Option<(f64, f64)>, provisioning: &str, user: Option<&str>) -> FeatureRow {
        FeatureRow::new(
            point.map(|(lng, lat)| Point::new(lng, lat)),
            vec![
                provisioning.into(),
                "".into(),
                "".into(),
                "".into(),
                user.into(),
            ],
        )
    }

    fn table(rows: Vec<FeatureRow>) -> FeatureTable {
        FeatureTable::new(columns(), rows).unwrap()
    }

    #[test]
    fn empty_table_uses_fallback_view() {
        let build = build_map(&table(Vec::new()), catalog(), &MapOptions::default());

        assert_eq!(build.document.center, LatLng { lat: 0.0, lng: 0.0 });
        assert_eq!(build.document.zoom, 2);
        assert!(build.document.layers.is_empty());
        assert!(build.errors.is_empty());
        assert_eq!(build.document.legend.entries.len(), 4);
    }

    #[test]
    fn center_is_mean_of_points() {
        let t = table(vec![
            row(Some((-2.0, 50.0)), "1", None),
            row(Some((0.0, 52.0)), "1", None),
            row(None, "1", None),
        ]);
        assert_eq!(compute_center(&t), Some(LatLng { lat: 51.0, lng: -1.0 }));

        let build = build_map(&t, catalog(), &MapOptions::default());
        assert_eq!(build.document.zoom, 10);
    }

    #[test]
    fn rows_without_geometry_never_become_markers() {
        let t = table(vec![
            row(Some((-1.0, 53.0)), "1", Some("alice")),
            row(None, "1", Some("bob")),
        ]);

        let build = build_map(&t, catalog(), &MapOptions::default());

        assert_eq!(build.document.marker_count(), 1);
        assert!(build.errors.is_empty());
    }

    #[test]
    fn empty_layers_are_skipped_in_catalog_order() {
        let t = table(vec![
            row(Some((-1.0, 53.0)), "3", None),
            row(Some((-1.1, 53.1)), "1", None),
        ]);

        let build = build_map(&t, catalog(), &MapOptions::default());
        let ids: Vec<_> = build.document.layers.iter().map(|l| l.id).collect();

        let food = find_layer("food").unwrap();
        let genetics = find_layer("genetics").unwrap();
        assert_eq!(ids, vec![food.id, genetics.id]);
        assert!(!build.document.layer_control.collapsed);
    }

    #[test]
    fn bad_coordinates_are_reported_and_skipped() {
        let t = table(vec![
            row(Some((f64::NAN, 53.0)), "1", None),
            row(Some((200.0, 53.0)), "1", None),
            row(Some((-1.0, 53.0)), "1", None),
        ]);

        let build = build_map(&t, catalog(), &MapOptions::default());

        assert_eq!(build.document.marker_count(), 1);
        let kinds: Vec<_> = build.errors.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![MarkerErrorKind::NonFinite, MarkerErrorKind::OutOfRange]);
        assert_eq!(build.errors[1].row, 1);
    }

    #[test]
    fn popup_lists_non_null_attributes_escaped() {
        let t = FeatureTable::new(
            vec!["note".to_string(), "count".to_string(), "gone".to_string()],
            vec![FeatureRow::new(
                Some(Point::new(0.0, 0.0)),
                vec!["<b>big</b> & tall".into(), 4_i64.into(), AttributeValue::Null],
            )],
        )
        .unwrap();

        let html = popup_html(&t, &t.rows()[0], "Food");

        assert_eq!(
            html,
            "<b>Food</b><br>note: &lt;b&gt;big&lt;/b&gt; &amp; tall<br>count: 4<br>"
        );
    }

    #[test]
    fn build_does_not_mutate_table() {
        let t = table(vec![row(Some((-1.0, 53.0)), "12", Some("alice"))]);
        let before = t.clone();
        let _ = build_map(&t, catalog(), &MapOptions::default());
        assert_eq!(t, before);
    }
}
