//! Raw GeoPackage layer reader.
//!
//! Resolves the feature layer, its geometry column and CRS from the
//! GeoPackage metadata tables, then reads every row of the layer. The
//! primary-key column is treated as a row id, not an attribute.

use std::path::Path;

use ecosystem_map_feature_models::{AttributeValue, FeatureRow};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, OptionalExtension as _, params};

use crate::LoadError;
use crate::geometry::decode_gpkg_point;

/// GeoPackage SRS id for "undefined geographic coordinate reference system".
const UNDEFINED_GEOGRAPHIC_SRS: i64 = 0;
/// GeoPackage SRS id for "undefined Cartesian coordinate reference system".
const UNDEFINED_CARTESIAN_SRS: i64 = -1;

/// A feature layer read verbatim from a GeoPackage, before reprojection.
#[derive(Debug)]
pub struct RawLayer {
    /// Name of the layer's table.
    pub table: String,
    /// Attribute column names (geometry and primary key excluded).
    pub columns: Vec<String>,
    /// Rows with geometries still in the layer CRS.
    pub rows: Vec<FeatureRow>,
    /// EPSG code of the layer CRS, when the SRS is an EPSG definition.
    pub epsg: Option<u16>,
    /// Rows whose geometry blob could not be decoded.
    pub undecodable_geometries: usize,
}

/// Opens `path` read-only and reads one feature layer.
///
/// When `layer` is `None` the first features table registered in
/// `gpkg_contents` is used.
///
/// # Errors
///
/// Returns [`LoadError`] if the file is not a readable GeoPackage or the
/// requested layer does not exist.
pub fn read_layer(path: &Path, layer: Option<&str>) -> Result<RawLayer, LoadError> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;

    let table = resolve_table(&conn, path, layer)?;

    let (geometry_column, srs_id): (String, i64) = conn
        .query_row(
            "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
            params![table],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?
        .ok_or_else(|| LoadError::NoGeometryColumn(table.clone()))?;

    let epsg = resolve_epsg(&conn, srs_id)?;
    let primary_key = primary_key_column(&conn, &table)?;

    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote_identifier(&table)))?;
    let all_columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let geometry_index = all_columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(&geometry_column))
        .ok_or_else(|| LoadError::NoGeometryColumn(table.clone()))?;

    let attribute_indices: Vec<usize> = (0..all_columns.len())
        .filter(|&i| i != geometry_index)
        .filter(|&i| primary_key.as_deref() != Some(all_columns[i].as_str()))
        .collect();

    let columns: Vec<String> = attribute_indices
        .iter()
        .map(|&i| all_columns[i].clone())
        .collect();

    let mut rows = Vec::new();
    let mut undecodable_geometries = 0;
    let mut query = stmt.query([])?;

    while let Some(row) = query.next()? {
        let geometry = match row.get_ref(geometry_index)? {
            ValueRef::Blob(blob) => match decode_gpkg_point(blob) {
                Ok(point) => point,
                Err(e) => {
                    log::warn!("{table} row {}: skipping geometry: {e}", rows.len());
                    undecodable_geometries += 1;
                    None
                }
            },
            _ => None,
        };

        let mut values = Vec::with_capacity(attribute_indices.len());
        for &i in &attribute_indices {
            values.push(to_attribute(row.get_ref(i)?));
        }

        rows.push(FeatureRow::new(geometry, values));
    }

    log::debug!(
        "Read {} rows from layer {table} (geometry column {geometry_column}, EPSG {epsg:?})",
        rows.len()
    );

    Ok(RawLayer {
        table,
        columns,
        rows,
        epsg,
        undecodable_geometries,
    })
}

fn resolve_table(conn: &Connection, path: &Path, layer: Option<&str>) -> Result<String, LoadError> {
    if let Some(name) = layer {
        return conn
            .query_row(
                "SELECT table_name FROM gpkg_contents \
                 WHERE data_type = 'features' AND table_name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| LoadError::NoSuchLayer(name.to_string()));
    }

    conn.query_row(
        "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY rowid LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| LoadError::NoFeatureLayer(path.to_path_buf()))
}

/// Maps a GeoPackage SRS id to an EPSG code. Undefined SRS ids are taken
/// to be WGS84, matching how the survey app writes its layers.
fn resolve_epsg(conn: &Connection, srs_id: i64) -> Result<Option<u16>, LoadError> {
    if srs_id == UNDEFINED_GEOGRAPHIC_SRS || srs_id == UNDEFINED_CARTESIAN_SRS {
        log::warn!("Layer has undefined SRS id {srs_id}; assuming EPSG:4326");
        return Ok(Some(crate::reproject::WGS84_EPSG));
    }

    let definition: Option<(String, i64)> = conn
        .query_row(
            "SELECT organization, organization_coordsys_id \
             FROM gpkg_spatial_ref_sys WHERE srs_id = ?1",
            params![srs_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match definition {
        Some((organization, code)) if organization.eq_ignore_ascii_case("epsg") => {
            u16::try_from(code)
                .map(Some)
                .map_err(|_| LoadError::UnsupportedCrs(format!("EPSG:{code}")))
        }
        Some((organization, code)) => Err(LoadError::UnsupportedCrs(format!(
            "{organization}:{code}"
        ))),
        None => Err(LoadError::UnsupportedCrs(format!("srs_id {srs_id}"))),
    }
}

fn primary_key_column(conn: &Connection, table: &str) -> Result<Option<String>, LoadError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        let pk: i64 = row.get(5)?;
        if pk > 0 {
            return Ok(Some(name));
        }
    }

    Ok(None)
}

fn to_attribute(value: ValueRef<'_>) -> AttributeValue {
    match value {
        ValueRef::Null => AttributeValue::Null,
        ValueRef::Integer(i) => AttributeValue::Integer(i),
        ValueRef::Real(r) => AttributeValue::Real(r),
        ValueRef::Text(bytes) => AttributeValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => AttributeValue::Blob(bytes.to_vec()),
    }
}

/// Quotes an SQL identifier, doubling embedded quotes.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier("plain"), "\"plain\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn converts_sqlite_values() {
        assert_eq!(to_attribute(ValueRef::Null), AttributeValue::Null);
        assert_eq!(to_attribute(ValueRef::Integer(4)), AttributeValue::Integer(4));
        assert_eq!(
            to_attribute(ValueRef::Text(b"13")),
            AttributeValue::Text("13".to_string())
        );
        assert_eq!(
            to_attribute(ValueRef::Blob(&[1, 2])),
            AttributeValue::Blob(vec![1, 2])
        );
    }
}
