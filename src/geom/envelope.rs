use crate::error::{GpkgError, Result};
use crate::io::{ByteReader, ByteWriter};

use super::{Geometry, Point};

/// Axis-aligned bounding box stored in a GeoPackage geometry header.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
    pub z_range: Option<(f64, f64)>,
    pub m_range: Option<(f64, f64)>,
}

impl Envelope {
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
            z_range: None,
            m_range: None,
        }
    }

    /// Envelope contents indicator (flags bits 1-3): 1 xy, 2 xyz, 3 xym, 4 xyzm.
    pub fn indicator(&self) -> u8 {
        match (self.z_range.is_some(), self.m_range.is_some()) {
            (false, false) => 1,
            (true, false) => 2,
            (false, true) => 3,
            (true, true) => 4,
        }
    }

    /// Number of doubles on the wire for an indicator, or `None` if it is invalid.
    pub fn doubles_for_indicator(indicator: u8) -> Option<usize> {
        match indicator {
            0 => Some(0),
            1 => Some(4),
            2 | 3 => Some(6),
            4 => Some(8),
            _ => None,
        }
    }

    /// Compute the bounds of all non-empty points, or `None` for an empty geometry.
    pub fn from_geometry(geometry: &Geometry) -> Option<Self> {
        let (has_z, has_m) = (geometry.has_z(), geometry.has_m());
        let mut envelope: Option<Envelope> = None;
        geometry.for_each_point(&mut |point: &Point| {
            if point.is_empty() {
                return;
            }
            match envelope.as_mut() {
                Some(existing) => existing.expand(point),
                None => {
                    envelope = Some(Envelope {
                        min_x: point.x,
                        max_x: point.x,
                        min_y: point.y,
                        max_y: point.y,
                        z_range: point.z.filter(|_| has_z).map(|z| (z, z)),
                        m_range: point.m.filter(|_| has_m).map(|m| (m, m)),
                    })
                }
            }
        });
        envelope
    }

    fn expand(&mut self, point: &Point) {
        self.min_x = self.min_x.min(point.x);
        self.max_x = self.max_x.max(point.x);
        self.min_y = self.min_y.min(point.y);
        self.max_y = self.max_y.max(point.y);
        if let (Some((min, max)), Some(z)) = (self.z_range.as_mut(), point.z) {
            *min = min.min(z);
            *max = max.max(z);
        }
        if let (Some((min, max)), Some(m)) = (self.m_range.as_mut(), point.m) {
            *min = min.min(m);
            *max = max.max(m);
        }
    }

    pub(crate) fn read(reader: &mut ByteReader<'_>, indicator: u8) -> Result<Option<Self>> {
        if indicator == 0 {
            return Ok(None);
        }
        if Self::doubles_for_indicator(indicator).is_none() {
            return Err(GpkgError::MalformedHeader(format!(
                "invalid envelope indicator {indicator}"
            )));
        }
        let min_x = reader.read_f64()?;
        let max_x = reader.read_f64()?;
        let min_y = reader.read_f64()?;
        let max_y = reader.read_f64()?;
        let z_range = if indicator == 2 || indicator == 4 {
            Some((reader.read_f64()?, reader.read_f64()?))
        } else {
            None
        };
        let m_range = if indicator == 3 || indicator == 4 {
            Some((reader.read_f64()?, reader.read_f64()?))
        } else {
            None
        };
        Ok(Some(Self {
            min_x,
            max_x,
            min_y,
            max_y,
            z_range,
            m_range,
        }))
    }

    pub(crate) fn write(&self, writer: &mut ByteWriter) {
        writer.write_f64(self.min_x);
        writer.write_f64(self.max_x);
        writer.write_f64(self.min_y);
        writer.write_f64(self.max_y);
        if let Some((min, max)) = self.z_range {
            writer.write_f64(min);
            writer.write_f64(max);
        }
        if let Some((min, max)) = self.m_range {
            writer.write_f64(min);
            writer.write_f64(max);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Envelope;
    use crate::geom::{Geometry, LineString, MultiPoint, Point};

    #[test]
    fn bounds_of_line_string() -> crate::Result<()> {
        let line = LineString::from_points(vec![
            Point::new_z(0.0, 2.0, -1.0),
            Point::new_z(-3.0, 4.0, 7.0),
        ])?;
        let envelope = Envelope::from_geometry(&Geometry::LineString(line)).expect("bounds");
        assert_eq!(envelope.min_x, -3.0);
        assert_eq!(envelope.max_x, 0.0);
        assert_eq!(envelope.min_y, 2.0);
        assert_eq!(envelope.max_y, 4.0);
        assert_eq!(envelope.z_range, Some((-1.0, 7.0)));
        assert_eq!(envelope.m_range, None);
        assert_eq!(envelope.indicator(), 2);
        Ok(())
    }

    #[test]
    fn empty_geometry_has_no_bounds() -> crate::Result<()> {
        let multi = MultiPoint::new(false, false, Vec::new())?;
        assert!(Envelope::from_geometry(&Geometry::MultiPoint(multi)).is_none());
        assert!(Envelope::from_geometry(&Geometry::Point(Point::empty(false, false))).is_none());
        Ok(())
    }

    #[test]
    fn indicator_sizes() {
        assert_eq!(Envelope::doubles_for_indicator(0), Some(0));
        assert_eq!(Envelope::doubles_for_indicator(1), Some(4));
        assert_eq!(Envelope::doubles_for_indicator(3), Some(6));
        assert_eq!(Envelope::doubles_for_indicator(4), Some(8));
        assert_eq!(Envelope::doubles_for_indicator(5), None);
    }
}
