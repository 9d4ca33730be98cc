use crate::persist::{ReadStep, RecordReader, RecordWriter, VersionLadder, VersionedRecord};

use super::errors::Result;
use super::types::{AccessLevel, Point3D, Serial, Totals};

/// A character. Mobiles are the non-container base of every ownership chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Mobile {
    pub(crate) serial: Serial,
    pub name: String,
    pub access_level: AccessLevel,
    pub location: Point3D,
    /// Worn items, including the backpack and bank box.
    pub(crate) items: Vec<Serial>,
    pub(crate) backpack: Option<Serial>,
    pub(crate) bank_box: Option<Serial>,
    pub(crate) totals: Totals,
}

impl Mobile {
    pub fn new(name: impl Into<String>, access_level: AccessLevel) -> Self {
        Self {
            serial: Serial::ZERO,
            name: name.into(),
            access_level,
            location: Point3D::default(),
            items: Vec::new(),
            backpack: None,
            bank_box: None,
            totals: Totals::default(),
        }
    }

    pub fn serial(&self) -> Serial {
        self.serial
    }

    pub fn items(&self) -> &[Serial] {
        &self.items
    }

    pub fn backpack(&self) -> Option<Serial> {
        self.backpack
    }

    pub fn bank_box(&self) -> Option<Serial> {
        self.bank_box
    }

    /// Carried aggregates. Bank contents are excluded.
    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn is_elevated(&self) -> bool {
        self.access_level.is_elevated()
    }

    pub(crate) fn blank(serial: Serial) -> Self {
        let mut mobile = Mobile::new(String::new(), AccessLevel::Player);
        mobile.serial = serial;
        mobile
    }
}

fn read_mobile_v0(mobile: &mut Mobile, reader: &mut RecordReader<'_>) -> Result<()> {
    mobile.name = reader.read_string()?;
    mobile.access_level = AccessLevel::from_u8(reader.read_u8()?);
    mobile.backpack = reader.read_opt_serial()?;
    mobile.bank_box = reader.read_opt_serial()?;
    mobile.items = reader.read_serial_list()?;
    Ok(())
}

fn read_mobile_v1(mobile: &mut Mobile, reader: &mut RecordReader<'_>) -> Result<()> {
    mobile.location = reader.read_point()?;
    Ok(())
}

fn read_mobile_v2(mobile: &mut Mobile, reader: &mut RecordReader<'_>) -> Result<()> {
    mobile.totals = reader.read_totals()?;
    Ok(())
}

/// Layer version that first stored the aggregates.
pub const MOBILE_TOTALS_VERSION: u32 = 2;

const MOBILE_STEPS: &[ReadStep<Mobile>] = &[read_mobile_v0, read_mobile_v1, read_mobile_v2];
static MOBILE_LADDER: VersionLadder<Mobile> = VersionLadder::new("mobile", MOBILE_STEPS);

impl VersionedRecord for Mobile {
    fn ladder() -> &'static VersionLadder<Self> {
        &MOBILE_LADDER
    }

    fn write_fields(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_totals(self.totals)?;
        writer.write_point(self.location)?;

        writer.write_string(&self.name)?;
        writer.write_u8(self.access_level.to_u8())?;
        writer.write_opt_serial(self.backpack)?;
        writer.write_opt_serial(self.bank_box)?;
        writer.write_serial_list(&self.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_mobile_v0_has_origin_location() {
        let now = Utc::now();
        let mut writer = RecordWriter::new(now);
        writer.write_version(0).unwrap();
        writer.write_string("Aldous").unwrap();
        writer.write_u8(AccessLevel::Seer.to_u8()).unwrap();
        writer.write_opt_serial(Some(Serial(0x4000_0001))).unwrap();
        writer.write_opt_serial(None).unwrap();
        writer.write_serial_list(&[Serial(0x4000_0001)]).unwrap();
        let bytes = writer.into_bytes();

        let mut mobile = Mobile::blank(Serial(1));
        let mut reader = RecordReader::new(&bytes, now);
        assert_eq!(mobile.deserialize_into(&mut reader).unwrap(), 0);
        assert_eq!(mobile.name, "Aldous");
        assert_eq!(mobile.access_level, AccessLevel::Seer);
        assert_eq!(mobile.backpack, Some(Serial(0x4000_0001)));
        assert_eq!(mobile.bank_box, None);
        assert_eq!(mobile.location, Point3D::default());
    }
}
