//! GeoPackage binary geometry decoding.
//!
//! A GeoPackage geometry blob is a small header (magic `GP`, version,
//! flags, SRS id, optional envelope) followed by standard WKB. Only
//! `Point` and `MultiPoint` bodies are decoded; a multipoint is reduced to
//! its centroid so every feature maps to a single marker position.

use geo::{Centroid as _, MultiPoint, Point};

const WKB_POINT: u32 = 1;
const WKB_MULTI_POINT: u32 = 4;

const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;

/// Errors raised while decoding a geometry blob.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// The blob ended before a complete value could be read.
    #[error("geometry blob truncated at byte {0}")]
    Truncated(usize),

    /// The blob does not start with the `GP` magic.
    #[error("not a GeoPackage geometry (bad magic)")]
    BadMagic,

    /// The envelope indicator in the header flags is invalid.
    #[error("invalid envelope indicator {0}")]
    InvalidEnvelope(u8),

    /// Extended (non-standard) GeoPackage geometry.
    #[error("extended GeoPackage geometries are not supported")]
    Extended,

    /// A byte-order marker other than 0 or 1.
    #[error("invalid WKB byte order {0}")]
    InvalidByteOrder(u8),

    /// A WKB geometry type other than point or multipoint.
    #[error("unsupported WKB geometry type {0}")]
    UnsupportedType(u32),
}

/// Decodes a GeoPackage geometry blob into a point.
///
/// Returns `Ok(None)` for empty geometries (header flag or an empty WKB
/// body), which callers treat as "no geometry".
///
/// # Errors
///
/// Returns [`GeometryError`] if the blob is malformed or holds a geometry
/// type other than `Point` / `MultiPoint`.
pub fn decode_gpkg_point(blob: &[u8]) -> Result<Option<Point<f64>>, GeometryError> {
    if blob.len() < 8 {
        return Err(GeometryError::Truncated(blob.len()));
    }
    if &blob[..2] != b"GP" {
        return Err(GeometryError::BadMagic);
    }

    let flags = blob[3];
    if flags & 0b0010_0000 != 0 {
        return Err(GeometryError::Extended);
    }
    if flags & 0b0001_0000 != 0 {
        return Ok(None);
    }

    let envelope_len = match (flags >> 1) & 0b111 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => return Err(GeometryError::InvalidEnvelope(other)),
    };

    let start = 8 + envelope_len;
    if blob.len() < start {
        return Err(GeometryError::Truncated(blob.len()));
    }

    decode_wkb_point(&blob[start..])
}

/// Decodes a WKB `Point` or `MultiPoint` (ISO or EWKB dimension flags).
///
/// # Errors
///
/// Returns [`GeometryError`] if the WKB is malformed or unsupported.
pub fn decode_wkb_point(wkb: &[u8]) -> Result<Option<Point<f64>>, GeometryError> {
    let mut reader = WkbReader::new(wkb);
    reader.read_geometry()
}

struct WkbReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    little_endian: bool,
}

impl<'a> WkbReader<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            little_endian: true,
        }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], GeometryError> {
        let end = self.pos + N;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(GeometryError::Truncated(self.pos))?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn read_byte_order(&mut self) -> Result<(), GeometryError> {
        let [order] = self.take::<1>()?;
        self.little_endian = match order {
            0 => false,
            1 => true,
            other => return Err(GeometryError::InvalidByteOrder(other)),
        };
        Ok(())
    }

    fn read_u32(&mut self) -> Result<u32, GeometryError> {
        let raw = self.take::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(raw)
        } else {
            u32::from_be_bytes(raw)
        })
    }

    fn read_f64(&mut self) -> Result<f64, GeometryError> {
        let raw = self.take::<8>()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(raw)
        } else {
            f64::from_be_bytes(raw)
        })
    }

    /// Reads the byte order and type word, returning the base type and the
    /// number of ordinates per coordinate.
    fn read_header(&mut self) -> Result<(u32, usize), GeometryError> {
        self.read_byte_order()?;
        let raw = self.read_u32()?;

        let mut dims = 2;
        if raw & EWKB_Z_FLAG != 0 {
            dims += 1;
        }
        if raw & EWKB_M_FLAG != 0 {
            dims += 1;
        }
        if raw & EWKB_SRID_FLAG != 0 {
            self.read_u32()?;
        }

        let iso = raw & 0x0FFF_FFFF;
        dims += match iso / 1000 {
            1 | 2 => 1,
            3 => 2,
            _ => 0,
        };

        Ok((iso % 1000, dims))
    }

    fn read_coordinate(&mut self, dims: usize) -> Result<Option<Point<f64>>, GeometryError> {
        let x = self.read_f64()?;
        let y = self.read_f64()?;
        for _ in 2..dims {
            self.read_f64()?;
        }

        if x.is_nan() && y.is_nan() {
            Ok(None)
        } else {
            Ok(Some(Point::new(x, y)))
        }
    }

    fn read_geometry(&mut self) -> Result<Option<Point<f64>>, GeometryError> {
        let (kind, dims) = self.read_header()?;

        match kind {
            WKB_POINT => self.read_coordinate(dims),
            WKB_MULTI_POINT => {
                let count = self.read_u32()?;
                let mut points = Vec::new();
                for _ in 0..count {
                    let (member, member_dims) = self.read_header()?;
                    if member != WKB_POINT {
                        return Err(GeometryError::UnsupportedType(member));
                    }
                    if let Some(point) = self.read_coordinate(member_dims)? {
                        points.push(point);
                    }
                }
                Ok(MultiPoint::new(points).centroid())
            }
            other => Err(GeometryError::UnsupportedType(other)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a little-endian GeoPackage point blob with no envelope.
    pub(crate) fn gpkg_point(srs_id: i32, x: f64, y: f64) -> Vec<u8> {
        let mut blob = vec![b'G', b'P', 0, 0b0000_0001];
        blob.extend_from_slice(&srs_id.to_le_bytes());
        blob.push(1);
        blob.extend_from_slice(&WKB_POINT.to_le_bytes());
        blob.extend_from_slice(&x.to_le_bytes());
        blob.extend_from_slice(&y.to_le_bytes());
        blob
    }

    #[test]
    fn decodes_little_endian_point() {
        let point = decode_gpkg_point(&gpkg_point(4326, -1.25, 53.5)).unwrap();
        assert_eq!(point, Some(Point::new(-1.25, 53.5)));
    }

    #[test]
    fn decodes_big_endian_point_with_envelope() {
        let mut blob = vec![b'G', b'P', 0, 0b0000_0010];
        blob.extend_from_slice(&4326_i32.to_be_bytes());
        for v in [1.0_f64, 1.0, 2.0, 2.0] {
            blob.extend_from_slice(&v.to_be_bytes());
        }
        blob.push(0);
        blob.extend_from_slice(&WKB_POINT.to_be_bytes());
        blob.extend_from_slice(&1.0_f64.to_be_bytes());
        blob.extend_from_slice(&2.0_f64.to_be_bytes());

        assert_eq!(decode_gpkg_point(&blob).unwrap(), Some(Point::new(1.0, 2.0)));
    }

    #[test]
    fn empty_flag_yields_none() {
        let mut blob = gpkg_point(4326, 0.0, 0.0);
        blob[3] |= 0b0001_0000;
        assert_eq!(decode_gpkg_point(&blob).unwrap(), None);
    }

    #[test]
    fn nan_point_is_empty() {
        let blob = gpkg_point(4326, f64::NAN, f64::NAN);
        assert_eq!(decode_gpkg_point(&blob).unwrap(), None);
    }

    #[test]
    fn point_z_skips_extra_ordinate() {
        let mut wkb = vec![1];
        wkb.extend_from_slice(&1001_u32.to_le_bytes());
        for v in [3.0_f64, 4.0, 99.0] {
            wkb.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(decode_wkb_point(&wkb).unwrap(), Some(Point::new(3.0, 4.0)));
    }

    #[test]
    fn multipoint_collapses_to_centroid() {
        let mut wkb = vec![1];
        wkb.extend_from_slice(&WKB_MULTI_POINT.to_le_bytes());
        wkb.extend_from_slice(&2_u32.to_le_bytes());
        for (x, y) in [(0.0_f64, 0.0_f64), (2.0, 4.0)] {
            wkb.push(1);
            wkb.extend_from_slice(&WKB_POINT.to_le_bytes());
            wkb.extend_from_slice(&x.to_le_bytes());
            wkb.extend_from_slice(&y.to_le_bytes());
        }
        assert_eq!(decode_wkb_point(&wkb).unwrap(), Some(Point::new(1.0, 2.0)));
    }

    #[test]
    fn rejects_polygons_and_garbage() {
        let mut wkb = vec![1];
        wkb.extend_from_slice(&3_u32.to_le_bytes());
        assert_eq!(
            decode_wkb_point(&wkb),
            Err(GeometryError::UnsupportedType(3))
        );
        assert_eq!(
            decode_gpkg_point(b"XX\0\x01\0\0\0\0"),
            Err(GeometryError::BadMagic)
        );
        assert!(matches!(
            decode_gpkg_point(b"GP\0"),
            Err(GeometryError::Truncated(_))
        ));
    }
}
