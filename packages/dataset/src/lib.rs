#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! GeoPackage snapshot loader for ecosystem service features.
//!
//! Reads the survey layer out of the downloaded snapshot, decodes point
//! geometries, reprojects them to WGS84 and normalizes the four service
//! code columns so that missing codes become empty strings. The resulting
//! [`FeatureTable`] is what the filters and map builder operate on.

pub mod geometry;
pub mod gpkg;
pub mod reproject;

use std::path::{Path, PathBuf};

use ecosystem_map_feature_models::{AttributeValue, FeatureTable, SchemaError};
use ecosystem_map_service_models::CODE_COLUMNS;

use crate::reproject::Reprojector;

/// Errors that can occur while loading a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The snapshot file does not exist.
    #[error("snapshot file not found: {}", .0.display())]
    MissingSnapshot(PathBuf),

    /// The file could not be read as `SQLite`.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The GeoPackage has no features table.
    #[error("no feature layer in {}", .0.display())]
    NoFeatureLayer(PathBuf),

    /// The requested layer does not exist.
    #[error("layer '{0}' not found")]
    NoSuchLayer(String),

    /// The layer has no registered geometry column.
    #[error("layer '{0}' has no geometry column")]
    NoGeometryColumn(String),

    /// A column the map depends on is missing.
    #[error("missing required column '{column}'")]
    MissingColumn {
        /// Name of the missing column.
        column: String,
    },

    /// The layer CRS has no usable definition.
    #[error("unsupported coordinate reference system {0}")]
    UnsupportedCrs(String),

    /// A coordinate could not be transformed.
    #[error("reprojection failed: {0}")]
    Reprojection(String),

    /// The rows do not fit the schema.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Loads the feature layer from the GeoPackage at `path`.
///
/// Geometries are reprojected to EPSG:4326 when the layer uses another
/// CRS, and the service code columns are normalized with
/// [`normalize_code_columns`].
///
/// # Errors
///
/// Returns [`LoadError`] if the file is missing or unreadable, the layer
/// cannot be resolved, reprojection fails, or a code column is absent.
pub fn load_snapshot(path: &Path, layer: Option<&str>) -> Result<FeatureTable, LoadError> {
    if !path.is_file() {
        return Err(LoadError::MissingSnapshot(path.to_path_buf()));
    }

    log::info!("Loading features from {}", path.display());
    let mut raw = gpkg::read_layer(path, layer)?;

    if raw.undecodable_geometries > 0 {
        log::warn!(
            "{} row(s) in {} have geometries that could not be decoded",
            raw.undecodable_geometries,
            raw.table
        );
    }

    if let Some(reprojector) = raw.epsg.map(Reprojector::from_epsg).transpose()?.flatten() {
        log::info!(
            "Reprojecting {} rows from EPSG:{} to EPSG:{}",
            raw.rows.len(),
            reprojector.source_epsg(),
            reproject::WGS84_EPSG
        );
        for row in &mut raw.rows {
            if let Some(point) = row.geometry {
                row.geometry = Some(reprojector.transform(point)?);
            }
        }
    }

    let mut table = FeatureTable::new(raw.columns, raw.rows)?;
    normalize_code_columns(&mut table)?;

    log::info!(
        "Loaded {} features ({} with geometry) from layer {}",
        table.len(),
        table.plottable_rows().count(),
        raw.table
    );

    Ok(table)
}

/// Normalizes the service code columns in place: nulls become empty
/// strings and numeric codes become their text form.
///
/// # Errors
///
/// Returns [`LoadError::MissingColumn`] if any code column is absent.
pub fn normalize_code_columns(table: &mut FeatureTable) -> Result<(), LoadError> {
    for column in CODE_COLUMNS {
        let present = table.map_column(column, |value| match value {
            AttributeValue::Text(_) => value,
            other if other.is_null() => AttributeValue::Text(String::new()),
            other => AttributeValue::Text(other.to_string()),
        });

        if !present {
            return Err(LoadError::MissingColumn {
                column: column.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::path::{Path, PathBuf};

    use rusqlite::{Connection, params};

    use crate::geometry::tests::gpkg_point;

    /// A fixture row: optional point plus the four code columns and a user.
    pub type FixtureRow<'a> = (
        Option<(f64, f64)>,
        [Option<&'a str>; 4],
        Option<&'a str>,
    );

    /// Writes a minimal GeoPackage with one point layer to a fresh temp
    /// directory and returns the file path.
    pub fn write_gpkg(name: &str, epsg: i64, rows: &[FixtureRow<'_>]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ecosystem_map_dataset_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ecosystem_service.gpkg");
        create(&path, epsg, rows);
        path
    }

    fn create(path: &Path, epsg: i64, rows: &[FixtureRow<'_>]) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE gpkg_spatial_ref_sys (
                srs_name TEXT NOT NULL,
                srs_id INTEGER PRIMARY KEY,
                organization TEXT NOT NULL,
                organization_coordsys_id INTEGER NOT NULL,
                definition TEXT NOT NULL,
                description TEXT
            );
            CREATE TABLE gpkg_contents (
                table_name TEXT NOT NULL PRIMARY KEY,
                data_type TEXT NOT NULL,
                identifier TEXT,
                srs_id INTEGER
            );
            CREATE TABLE gpkg_geometry_columns (
                table_name TEXT NOT NULL,
                column_name TEXT NOT NULL,
                geometry_type_name TEXT NOT NULL,
                srs_id INTEGER NOT NULL,
                z TINYINT NOT NULL,
                m TINYINT NOT NULL
            );
            CREATE TABLE ecosystem_service (
                fid INTEGER PRIMARY KEY AUTOINCREMENT,
                geom POINT,
                provisioning_type TEXT,
                regulating_type TEXT,
                cultural_type TEXT,
                supporting_type TEXT,
                \"Your name\" TEXT
            );",
        )
        .unwrap();

        conn.execute(
            "INSERT INTO gpkg_spatial_ref_sys
             VALUES ('fixture', ?1, 'EPSG', ?1, 'undefined', NULL)",
            params![epsg],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO gpkg_contents
             VALUES ('ecosystem_service', 'features', 'ecosystem_service', ?1)",
            params![epsg],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO gpkg_geometry_columns
             VALUES ('ecosystem_service', 'geom', 'POINT', ?1, 0, 0)",
            params![epsg],
        )
        .unwrap();

        for (point, codes, user) in rows {
            let blob = point.map(|(x, y)| gpkg_point(i32::try_from(epsg).unwrap(), x, y));
            conn.execute(
                "INSERT INTO ecosystem_service
                    (geom, provisioning_type, regulating_type, cultural_type,
                     supporting_type, \"Your name\")
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![blob, codes[0], codes[1], codes[2], codes[3], user],
            )
            .unwrap();
        }
    }
}
