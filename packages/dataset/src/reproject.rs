//! Reprojection of layer coordinates to WGS84 (EPSG:4326).

use geo::Point;
use proj4rs::proj::Proj;

use crate::LoadError;

/// EPSG code of the geographic CRS every feature table is delivered in.
pub const WGS84_EPSG: u16 = 4326;

/// Transforms points from a source CRS into WGS84 longitude/latitude.
pub struct Reprojector {
    source_epsg: u16,
    source: Proj,
    target: Proj,
}

impl Reprojector {
    /// Builds a reprojector for `epsg`, or returns `None` when the source
    /// is already WGS84 and no transform is needed.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::UnsupportedCrs`] if either CRS definition is
    /// unknown.
    pub fn from_epsg(epsg: u16) -> Result<Option<Self>, LoadError> {
        if epsg == WGS84_EPSG {
            return Ok(None);
        }

        let source = Proj::from_epsg_code(epsg)
            .map_err(|e| LoadError::UnsupportedCrs(format!("EPSG:{epsg} ({e:?})")))?;
        let target = Proj::from_epsg_code(WGS84_EPSG)
            .map_err(|e| LoadError::UnsupportedCrs(format!("EPSG:{WGS84_EPSG} ({e:?})")))?;

        Ok(Some(Self {
            source_epsg: epsg,
            source,
            target,
        }))
    }

    /// The EPSG code points are transformed from.
    #[must_use]
    pub const fn source_epsg(&self) -> u16 {
        self.source_epsg
    }

    /// Transforms one point. Geographic coordinates are in degrees on both
    /// sides; `proj4rs` works in radians for lat/long systems.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Reprojection`] if the transform fails.
    pub fn transform(&self, point: Point<f64>) -> Result<Point<f64>, LoadError> {
        let mut coord = if self.source.is_latlong() {
            (point.x().to_radians(), point.y().to_radians(), 0.0)
        } else {
            (point.x(), point.y(), 0.0)
        };

        proj4rs::transform::transform(&self.source, &self.target, &mut coord).map_err(|e| {
            LoadError::Reprojection(format!(
                "EPSG:{} ({}, {}): {e:?}",
                self.source_epsg,
                point.x(),
                point.y()
            ))
        })?;

        Ok(Point::new(coord.0.to_degrees(), coord.1.to_degrees()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wgs84_needs_no_transform() {
        assert!(Reprojector::from_epsg(WGS84_EPSG).unwrap().is_none());
    }

    #[test]
    fn web_mercator_origin_maps_to_null_island() {
        let reprojector = Reprojector::from_epsg(3857).unwrap().unwrap();
        let p = reprojector.transform(Point::new(0.0, 0.0)).unwrap();
        assert!(p.x().abs() < 1e-9);
        assert!(p.y().abs() < 1e-9);
    }

    #[test]
    fn web_mercator_one_degree_east() {
        let reprojector = Reprojector::from_epsg(3857).unwrap().unwrap();
        let p = reprojector
            .transform(Point::new(111_319.490_793_273_57, 0.0))
            .unwrap();
        assert!((p.x() - 1.0).abs() < 1e-6, "lon = {}", p.x());
        assert!(p.y().abs() < 1e-6, "lat = {}", p.y());
    }
}
