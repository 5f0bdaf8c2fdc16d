use std::borrow::Cow;

use crate::error::{GpkgError, Result};
use crate::io::{ByteOrder, ByteReader, ByteWriter};

use super::wkb::read_wkb;
use super::{Envelope, Geometry, GeometryType};

const MAGIC: [u8; 2] = [0x47, 0x50]; // 'G', 'P'
const VERSION: u8 = 0;
const FIXED_HEADER_LEN: usize = 8;

const FLAG_LITTLE_ENDIAN: u8 = 0b0000_0001;
const FLAG_ENVELOPE_MASK: u8 = 0b0000_1110;
const FLAG_EMPTY: u8 = 0b0001_0000;
const FLAG_EXTENDED: u8 = 0b0010_0000;

/// The content of a geometry column cell: GeoPackage header plus decoded WKB.
///
/// The encoded WKB is cached as it was read. It is reused verbatim when the
/// cell is written back, so an untouched cell round-trips bit for bit even if
/// its nested geometries used mixed byte orders. Any mutable access to the
/// geometry drops the cache and the WKB is re-encoded on the next write using
/// [`GeometryData::wkb_byte_order`].
// cf. https://www.geopackage.org/spec140/index.html#gpb_format
#[derive(Clone, Debug)]
pub struct GeometryData {
    srs_id: i32,
    byte_order: ByteOrder,
    envelope: Option<Envelope>,
    empty: bool,
    extended: bool,
    geometry: Geometry,
    wkb_byte_order: ByteOrder,
    wkb_bytes: Option<Vec<u8>>,
}

impl GeometryData {
    /// Wrap a geometry with a little-endian header and no envelope.
    pub fn new(srs_id: i32, geometry: impl Into<Geometry>) -> Self {
        let geometry = geometry.into();
        Self {
            srs_id,
            byte_order: ByteOrder::LittleEndian,
            envelope: None,
            empty: geometry.is_empty(),
            extended: false,
            geometry,
            wkb_byte_order: ByteOrder::LittleEndian,
            wkb_bytes: None,
        }
    }

    /// Decode a geometry blob as stored in a feature table.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(GpkgError::MalformedHeader(format!(
                "got {} bytes, expected at least {FIXED_HEADER_LEN}",
                bytes.len()
            )));
        }
        if bytes[0..2] != MAGIC {
            return Err(GpkgError::MalformedHeader(format!(
                "bad magic {:#04x} {:#04x}",
                bytes[0], bytes[1]
            )));
        }
        if bytes[2] != VERSION {
            return Err(GpkgError::MalformedHeader(format!(
                "unknown version {}",
                bytes[2]
            )));
        }

        let flags = bytes[3];
        let indicator = (flags & FLAG_ENVELOPE_MASK) >> 1;
        if Envelope::doubles_for_indicator(indicator).is_none() {
            return Err(GpkgError::MalformedHeader(format!(
                "invalid envelope indicator {indicator} in flags {flags:#04x}"
            )));
        }
        let byte_order = if flags & FLAG_LITTLE_ENDIAN != 0 {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        };

        let mut reader = ByteReader::new(&bytes[4..]);
        reader.set_byte_order(byte_order);
        let (srs_id, envelope) = read_header_fields(&mut reader, indicator).map_err(|err| {
            match err {
                GpkgError::UnexpectedEnd { .. } => GpkgError::MalformedHeader(format!(
                    "envelope indicator {indicator} needs more bytes than the blob holds"
                )),
                other => other,
            }
        })?;

        let wkb = reader.read_rest();
        let (geometry, wkb_byte_order) = read_wkb(wkb)?;

        Ok(Self {
            srs_id,
            byte_order,
            envelope,
            empty: flags & FLAG_EMPTY != 0,
            extended: flags & FLAG_EXTENDED != 0,
            geometry,
            wkb_byte_order,
            wkb_bytes: Some(wkb.to_vec()),
        })
    }

    /// Encode header and WKB body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = self.header_bytes();
        bytes.extend_from_slice(&self.wkb_bytes()?);
        Ok(bytes)
    }

    /// Encode the header only: magic, version, flags, srs_id and envelope.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(self.byte_order, FIXED_HEADER_LEN + 64);
        writer.write_bytes(&MAGIC);
        writer.write_u8(VERSION);
        writer.write_u8(self.flags());
        writer.write_i32(self.srs_id);
        if let Some(envelope) = &self.envelope {
            envelope.write(&mut writer);
        }
        writer.finish()
    }

    /// The WKB body, either as read from storage or freshly encoded.
    pub fn wkb_bytes(&self) -> Result<Cow<'_, [u8]>> {
        match &self.wkb_bytes {
            Some(bytes) => Ok(Cow::Borrowed(bytes.as_slice())),
            None => Ok(Cow::Owned(self.geometry.to_wkb(self.wkb_byte_order)?)),
        }
    }

    pub fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.byte_order == ByteOrder::LittleEndian {
            flags |= FLAG_LITTLE_ENDIAN;
        }
        if let Some(envelope) = &self.envelope {
            flags |= envelope.indicator() << 1;
        }
        if self.empty {
            flags |= FLAG_EMPTY;
        }
        if self.extended {
            flags |= FLAG_EXTENDED;
        }
        flags
    }

    pub fn srs_id(&self) -> i32 {
        self.srs_id
    }

    pub fn set_srs_id(&mut self, srs_id: i32) {
        self.srs_id = srs_id;
    }

    /// Byte order of the header's srs_id and envelope.
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_byte_order(&mut self, byte_order: ByteOrder) {
        self.byte_order = byte_order;
    }

    /// Byte order of the outermost WKB geometry, used when the WKB is re-encoded.
    pub fn wkb_byte_order(&self) -> ByteOrder {
        self.wkb_byte_order
    }

    pub fn set_wkb_byte_order(&mut self, byte_order: ByteOrder) {
        if self.wkb_byte_order != byte_order {
            self.wkb_byte_order = byte_order;
            self.wkb_bytes = None;
        }
    }

    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    pub fn set_envelope(&mut self, envelope: Option<Envelope>) {
        self.envelope = envelope;
    }

    /// Recompute the envelope from the current geometry and store it in the header.
    ///
    /// The envelope is never refreshed implicitly.
    pub fn build_envelope(&mut self) -> Option<&Envelope> {
        self.envelope = Envelope::from_geometry(&self.geometry);
        self.envelope.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn geometry_type(&self) -> GeometryType {
        self.geometry.geometry_type()
    }

    /// Mutable access to the geometry. The header (including the empty flag
    /// and any envelope) is left as it is.
    pub fn geometry_mut(&mut self) -> &mut Geometry {
        self.wkb_bytes = None;
        &mut self.geometry
    }

    /// Replace the geometry and update the empty flag.
    pub fn set_geometry(&mut self, geometry: impl Into<Geometry>) {
        self.geometry = geometry.into();
        self.empty = self.geometry.is_empty();
        self.wkb_bytes = None;
    }

    pub fn into_geometry(self) -> Geometry {
        self.geometry
    }
}

fn read_header_fields(
    reader: &mut ByteReader<'_>,
    indicator: u8,
) -> Result<(i32, Option<Envelope>)> {
    let srs_id = reader.read_i32()?;
    let envelope = Envelope::read(reader, indicator)?;
    Ok((srs_id, envelope))
}

impl PartialEq for GeometryData {
    fn eq(&self, other: &Self) -> bool {
        self.srs_id == other.srs_id
            && self.byte_order == other.byte_order
            && self.envelope == other.envelope
            && self.empty == other.empty
            && self.extended == other.extended
            && self.geometry == other.geometry
    }
}

#[cfg(test)]
mod tests {
    use super::GeometryData;
    use crate::error::GpkgError;
    use crate::geom::{Envelope, Geometry, Point};
    use crate::io::ByteOrder;

    const S1_WKB: [u8; 21] = [
        0x01, 0x01, 0x00, 0x00, 0x00, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x24, 0x40, //
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3e, 0x40,
    ];

    fn s3_blob() -> Vec<u8> {
        let mut blob = vec![0x47, 0x50, 0x00, 0x01];
        blob.extend_from_slice(&4326i32.to_le_bytes());
        blob.extend_from_slice(&S1_WKB);
        blob
    }

    #[test]
    fn decodes_and_reencodes_point_cell() -> crate::Result<()> {
        let blob = s3_blob();
        let data = GeometryData::from_bytes(&blob)?;
        assert_eq!(data.srs_id(), 4326);
        assert!(data.envelope().is_none());
        assert!(!data.is_empty());
        assert!(!data.is_extended());
        assert_eq!(data.byte_order(), ByteOrder::LittleEndian);
        assert_eq!(data.geometry(), &Geometry::Point(Point::new(10.0, 30.0)));
        assert_eq!(data.to_bytes()?, blob);
        assert_eq!(data.header_bytes(), blob[..8].to_vec());
        Ok(())
    }

    #[test]
    fn big_endian_header_with_envelope_roundtrips() -> crate::Result<()> {
        let mut blob = vec![0x47, 0x50, 0x00, 0b0000_0010];
        blob.extend_from_slice(&3857i32.to_be_bytes());
        for v in [10.0f64, 10.0, 30.0, 30.0] {
            blob.extend_from_slice(&v.to_be_bytes());
        }
        blob.extend_from_slice(&S1_WKB);

        let data = GeometryData::from_bytes(&blob)?;
        assert_eq!(data.srs_id(), 3857);
        assert_eq!(data.byte_order(), ByteOrder::BigEndian);
        assert_eq!(
            data.envelope(),
            Some(&Envelope::new(10.0, 10.0, 30.0, 30.0))
        );
        // The header is big endian, the WKB body is little endian.
        assert_eq!(data.wkb_byte_order(), ByteOrder::LittleEndian);
        assert_eq!(data.to_bytes()?, blob);
        Ok(())
    }

    #[test]
    fn z_and_m_envelopes_roundtrip() -> crate::Result<()> {
        let cases = [
            (2u8, Point::new_z(1.0, 2.0, 3.0), 1001u32),
            (3, Point::new_m(1.0, 2.0, 4.0), 2001),
            (4, Point::new_zm(1.0, 2.0, 3.0, 4.0), 3001),
        ];
        for (indicator, point, code) in cases {
            let mut blob = vec![0x47, 0x50, 0x00, indicator << 1];
            blob.extend_from_slice(&4326i32.to_be_bytes());
            let mut doubles = vec![1.0f64, 1.0, 2.0, 2.0];
            if let Some(z) = point.z {
                doubles.extend([z, z]);
            }
            if let Some(m) = point.m {
                doubles.extend([m, m]);
            }
            for v in &doubles {
                blob.extend_from_slice(&v.to_be_bytes());
            }
            let header_len = blob.len();
            assert_eq!(header_len, 8 + 8 * doubles.len());

            blob.push(0x01);
            blob.extend_from_slice(&code.to_le_bytes());
            for v in [Some(point.x), Some(point.y), point.z, point.m]
                .into_iter()
                .flatten()
            {
                blob.extend_from_slice(&v.to_le_bytes());
            }

            let data = GeometryData::from_bytes(&blob)?;
            let envelope = data.envelope().expect("envelope present");
            assert_eq!(envelope.indicator(), indicator);
            assert_eq!(envelope.z_range, point.z.map(|z| (z, z)));
            assert_eq!(envelope.m_range, point.m.map(|m| (m, m)));
            assert_eq!((data.flags() >> 1) & 0b111, indicator);
            assert_eq!(data.header_bytes(), blob[..header_len].to_vec());
            assert_eq!(data.to_bytes()?, blob);

            let mut built = GeometryData::new(4326, point);
            built.set_byte_order(ByteOrder::BigEndian);
            built.build_envelope();
            assert_eq!(built.to_bytes()?, blob);
        }
        Ok(())
    }

    #[test]
    fn mutation_keeps_header_and_reencodes_body() -> crate::Result<()> {
        let blob = s3_blob();
        let mut data = GeometryData::from_bytes(&blob)?;
        if let Geometry::Point(point) = data.geometry_mut() {
            point.x = 45.11111;
            point.y = 89.99999;
        }
        let bytes = data.to_bytes()?;
        assert_eq!(bytes[..8], blob[..8]);
        assert_eq!(bytes.len(), blob.len());
        let reread = GeometryData::from_bytes(&bytes)?;
        assert_eq!(
            reread.geometry(),
            &Geometry::Point(Point::new(45.11111, 89.99999))
        );
        Ok(())
    }

    #[test]
    fn rejects_bad_headers() {
        let mut bad_magic = s3_blob();
        bad_magic[0] = b'X';
        assert!(matches!(
            GeometryData::from_bytes(&bad_magic),
            Err(GpkgError::MalformedHeader(_))
        ));

        let mut bad_version = s3_blob();
        bad_version[2] = 1;
        assert!(matches!(
            GeometryData::from_bytes(&bad_version),
            Err(GpkgError::MalformedHeader(_))
        ));

        let mut bad_envelope = s3_blob();
        bad_envelope[3] = 0b0000_1011; // indicator 5
        assert!(matches!(
            GeometryData::from_bytes(&bad_envelope),
            Err(GpkgError::MalformedHeader(_))
        ));

        assert!(matches!(
            GeometryData::from_bytes(&[0x47, 0x50, 0x00]),
            Err(GpkgError::MalformedHeader(_))
        ));
    }

    #[test]
    fn propagates_wkb_errors() {
        let mut blob = s3_blob();
        blob.truncate(blob.len() - 4);
        assert!(matches!(
            GeometryData::from_bytes(&blob),
            Err(GpkgError::MalformedWkb(_))
        ));
    }

    #[test]
    fn new_cell_and_envelope() -> crate::Result<()> {
        let mut data = GeometryData::new(4326, Point::new(1.5, -2.0));
        assert_eq!(data.flags(), 0b0000_0001);
        let envelope = *data.build_envelope().expect("point has bounds");
        assert_eq!(envelope, Envelope::new(1.5, 1.5, -2.0, -2.0));
        assert_eq!(data.flags(), 0b0000_0011);

        let bytes = data.to_bytes()?;
        assert_eq!(bytes.len(), 8 + 32 + 21);
        assert_eq!(GeometryData::from_bytes(&bytes)?, data);
        Ok(())
    }

    #[test]
    fn empty_flag_follows_geometry() {
        let mut data = GeometryData::new(0, Point::new(1.0, 1.0));
        assert!(!data.is_empty());
        data.set_geometry(Point::empty(false, false));
        assert!(data.is_empty());
        assert_eq!(data.flags() & 0b0001_0000, 0b0001_0000);
    }
}
