//! Standalone Leaflet page for a [`MapDocument`].

use std::borrow::Cow;

use crate::{Legend, MapDocument};

/// Errors raised while rendering a map page.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The document could not be serialized.
    #[error("failed to serialize map document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Escapes the five HTML-significant characters.
#[must_use]
pub fn escape_html(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    Cow::Owned(out)
}

/// Renders `document` as a complete HTML page whose map element is
/// `width` x `height` pixels.
///
/// # Errors
///
/// Returns [`RenderError::Serialize`] if the document cannot be encoded
/// as JSON.
pub fn render_html(document: &MapDocument, width: u32, height: u32) -> Result<String, RenderError> {
    // `</` inside a script block would terminate it early.
    let json = serde_json::to_string(document)?.replace("</", "<\\/");

    Ok(MAP_TEMPLATE
        .replace("{{WIDTH}}", &width.to_string())
        .replace("{{HEIGHT}}", &height.to_string())
        .replace("{{LEGEND}}", &legend_html(&document.legend))
        .replace("{{DOCUMENT}}", &json))
}

/// The fixed-position legend box.
#[must_use]
pub fn legend_html(legend: &Legend) -> String {
    let mut html = format!(
        "<div class=\"es-legend\">\n      <h4>{}</h4>\n",
        escape_html(legend.title)
    );
    for entry in &legend.entries {
        html.push_str(&format!(
            "      <div style=\"color: {};\">&#9679; {}</div>\n",
            escape_html(entry.color),
            escape_html(entry.label)
        ));
    }
    html.push_str("    </div>");
    html
}

const MAP_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Ecosystem Services Map</title>
    <link
      rel="stylesheet"
      href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css"
      integrity="sha256-p4NxAoJBhIIN+hmNHrzRCf9tD/miZyoHS5obTRR9BMY="
      crossorigin=""
    />
    <link
      rel="stylesheet"
      href="https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.css"
    />
    <link
      rel="stylesheet"
      href="https://unpkg.com/leaflet.markercluster@1.5.3/dist/MarkerCluster.Default.css"
    />
    <link
      rel="stylesheet"
      href="https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.5.2/css/all.min.css"
    />
    <style>
      html, body { margin: 0; padding: 0; }
      #map { width: {{WIDTH}}px; height: {{HEIGHT}}px; position: relative; }
      .es-pin {
        display: flex;
        align-items: center;
        justify-content: center;
        width: 28px;
        height: 28px;
        border-radius: 50% 50% 50% 0;
        transform: rotate(-45deg);
        border: 1px solid rgba(0, 0, 0, 0.35);
        box-shadow: 0 1px 3px rgba(0, 0, 0, 0.4);
      }
      .es-pin i { transform: rotate(45deg); color: white; font-size: 13px; }
      .es-legend {
        position: fixed;
        bottom: 50px;
        left: 50px;
        width: 180px;
        z-index: 9999;
        background-color: white;
        border: 2px solid grey;
        border-radius: 5px;
        font-size: 14px;
        padding: 10px;
      }
      .es-legend h4 { margin: 0 0 6px 0; }
    </style>
  </head>
  <body>
    <div id="map">
    {{LEGEND}}
    </div>

    <script
      src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"
      integrity="sha256-20nQCchB9co0qIjJZRGuk2/Z9VM+kNiyxNV1lvTlZBo="
      crossorigin=""
    ></script>
    <script
      src="https://unpkg.com/leaflet.markercluster@1.5.3/dist/leaflet.markercluster.js"
    ></script>

    <script>
      const doc = {{DOCUMENT}};

      const map = L.map('map').setView([doc.center.lat, doc.center.lng], doc.zoom);
      L.tileLayer(doc.tiles.url, { attribution: doc.tiles.attribution, maxZoom: 19 }).addTo(map);

      const overlays = {};
      for (const layer of doc.layers) {
        const icon = L.divIcon({
          className: '',
          html:
            `<span class="es-pin" style="background:${layer.color}">` +
            `<i class="fa fa-${layer.icon}"></i></span>`,
          iconSize: [28, 28],
          iconAnchor: [14, 28],
          popupAnchor: [0, -26],
        });

        const cluster = L.markerClusterGroup();
        for (const marker of layer.markers) {
          L.marker([marker.position.lat, marker.position.lng], { icon })
            .bindPopup(marker.popup.html, { maxWidth: marker.popup.maxWidth })
            .addTo(cluster);
        }

        cluster.addTo(map);
        overlays[layer.name] = cluster;
      }

      L.control.layers(null, overlays, { collapsed: doc.layerControl.collapsed }).addTo(map);
    </script>
  </body>
</html>
"#;

#[cfg(test)]
mod tests {
    use ecosystem_map_feature_models::{FeatureRow, FeatureTable, Point};
    use ecosystem_map_service_models::catalog;

    use super::*;
    use crate::{MapOptions, build_map};

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("plain"), "plain");
        assert!(matches!(escape_html("plain"), Cow::Borrowed(_)));
        assert_eq!(
            escape_html("<a href=\"x\">'&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn legend_lists_categories_in_order() {
        let html = legend_html(&Legend::categories());
        let positions: Vec<_> = ["Provisioning", "Regulating", "Cultural", "Supporting"]
            .iter()
            .map(|label| html.find(label).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(html.contains("color: brown;"));
    }

    #[test]
    fn page_embeds_document_and_size() {
        let table = FeatureTable::new(
            vec![
                "provisioning_type".to_string(),
                "regulating_type".to_string(),
                "cultural_type".to_string(),
                "supporting_type".to_string(),
                "note".to_string(),
            ],
            vec![FeatureRow::new(
                Some(Point::new(-1.0, 53.0)),
                vec!["1".into(), "".into(), "".into(), "".into(), "</script>".into()],
            )],
        )
        .unwrap();
        let build = build_map(&table, catalog(), &MapOptions::default());

        let html = render_html(&build.document, 1000, 600).unwrap();

        assert!(html.contains("width: 1000px; height: 600px;"));
        assert!(html.contains("leaflet@1.9.4"));
        assert!(html.contains("leaflet.markercluster"));
        assert!(html.contains("\"name\":\"Food\""));
        assert!(!html.contains("{{"));
        // The popup value is escaped once as HTML and never closes the script.
        assert_eq!(html.matches("</script>").count(), 3);
    }
}
