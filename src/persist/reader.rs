use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::de::DeserializeOwned;

use crate::world::errors::{Result, WorldError};
use crate::world::types::{Point3D, Serial, Totals};

/// A layer that was read at an older version than the current build writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgrade {
    pub entity: &'static str,
    pub from: u32,
    pub to: u32,
}

/// Cursor over one entity record. Mirrors [`RecordWriter`](super::RecordWriter).
pub struct RecordReader<'a> {
    cursor: &'a [u8],
    now: DateTime<Utc>,
    upgrades: Vec<Upgrade>,
}

impl<'a> RecordReader<'a> {
    pub fn new(bytes: &'a [u8], now: DateTime<Utc>) -> Self {
        Self {
            cursor: bytes,
            now,
            upgrades: Vec::new(),
        }
    }

    fn take<T: DeserializeOwned>(&mut self) -> Result<T> {
        Ok(bincode::deserialize_from(&mut self.cursor)?)
    }

    pub fn read_version(&mut self) -> Result<u32> {
        self.take()
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        self.take()
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.take()
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.take()
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.take()
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.take()
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.take()
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.take()
    }

    /// Length prefix is a u64 and must fit in what is left of the record.
    pub fn read_string(&mut self) -> Result<String> {
        let len: u64 = self.take()?;
        if len > self.cursor.len() as u64 {
            return Err(WorldError::Corrupt(format!(
                "string of {} bytes exceeds remaining {} bytes",
                len,
                self.cursor.len()
            )));
        }
        let (bytes, rest) = self.cursor.split_at(len as usize);
        self.cursor = rest;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| WorldError::Corrupt(format!("string is not utf-8: {}", e)))
    }

    pub fn read_opt_string(&mut self) -> Result<Option<String>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.read_string()?)),
            tag => Err(WorldError::Corrupt(format!("option tag {}", tag))),
        }
    }

    pub fn read_serial(&mut self) -> Result<Serial> {
        Ok(Serial(self.take()?))
    }

    pub fn read_opt_serial(&mut self) -> Result<Option<Serial>> {
        let serial = self.read_serial()?;
        Ok((serial != Serial::ZERO).then_some(serial))
    }

    pub fn read_serial_list(&mut self) -> Result<Vec<Serial>> {
        let count = self.read_u32()? as usize;
        if count > self.cursor.len() / 4 {
            return Err(WorldError::Corrupt(format!(
                "serial list of {} entries exceeds remaining {} bytes",
                count,
                self.cursor.len()
            )));
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_serial()?);
        }
        Ok(values)
    }

    pub fn read_point(&mut self) -> Result<Point3D> {
        Ok(Point3D {
            x: self.read_i32()?,
            y: self.read_i32()?,
            z: self.read_i32()?,
        })
    }

    pub fn read_totals(&mut self) -> Result<Totals> {
        Ok(Totals {
            gold: self.read_i64()?,
            items: self.read_i64()?,
            weight: self.read_i64()?,
        })
    }

    pub fn read_time(&mut self) -> Result<DateTime<Utc>> {
        let millis: i64 = self.take()?;
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| WorldError::Corrupt(format!("timestamp {} out of range", millis)))
    }

    /// Offset is applied to the load clock, not the clock that wrote it.
    pub fn read_delta_time(&mut self) -> Result<DateTime<Utc>> {
        let offset: i64 = self.take()?;
        Duration::try_milliseconds(offset)
            .and_then(|delta| self.now.checked_add_signed(delta))
            .ok_or_else(|| WorldError::Corrupt(format!("time offset {} ms out of range", offset)))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn remaining(&self) -> usize {
        self.cursor.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_empty()
    }

    pub(crate) fn note_upgrade(&mut self, entity: &'static str, from: u32, to: u32) {
        self.upgrades.push(Upgrade { entity, from, to });
    }

    pub fn upgrades(&self) -> &[Upgrade] {
        &self.upgrades
    }

    pub fn take_upgrades(&mut self) -> Vec<Upgrade> {
        std::mem::take(&mut self.upgrades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::RecordWriter;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_strings_read_back() {
        let mut writer = RecordWriter::new(now());
        writer.write_string("lantern").unwrap();
        writer.write_opt_string(Some("brass lantern")).unwrap();
        writer.write_opt_string(None).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = RecordReader::new(&bytes, now());
        assert_eq!(reader.read_string().unwrap(), "lantern");
        assert_eq!(reader.read_opt_string().unwrap().as_deref(), Some("brass lantern"));
        assert_eq!(reader.read_opt_string().unwrap(), None);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_oversized_string_length_is_corrupt() {
        let bytes = [0xFF; 8];
        let mut reader = RecordReader::new(&bytes, now());
        assert!(matches!(reader.read_string(), Err(WorldError::Corrupt(_))));

        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&16u64.to_le_bytes());
        bytes.extend_from_slice(b"short");
        let mut reader = RecordReader::new(&bytes, now());
        assert!(matches!(reader.read_opt_string(), Err(WorldError::Corrupt(_))));
    }

    #[test]
    fn test_bad_option_tag_is_corrupt() {
        let bytes = [7u8];
        let mut reader = RecordReader::new(&bytes, now());
        assert!(matches!(reader.read_opt_string(), Err(WorldError::Corrupt(_))));
    }

    #[test]
    fn test_delta_time_rebases_on_reader_clock() {
        let mut writer = RecordWriter::new(now());
        writer.write_delta_time(now() + Duration::minutes(5)).unwrap();
        let bytes = writer.into_bytes();

        let later = now() + Duration::hours(3);
        let mut reader = RecordReader::new(&bytes, later);
        assert_eq!(reader.read_delta_time().unwrap(), later + Duration::minutes(5));
    }

    #[test]
    fn test_out_of_range_delta_time_is_corrupt() {
        for offset in [i64::MAX, i64::MIN] {
            let bytes = offset.to_le_bytes();
            let mut reader = RecordReader::new(&bytes, now());
            assert!(matches!(reader.read_delta_time(), Err(WorldError::Corrupt(_))));
        }
    }
}
