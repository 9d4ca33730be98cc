use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::world::errors::Result;
use crate::world::types::{Point3D, Serial, Totals};

/// Sequential binary writer for one entity record.
///
/// Primitives go through bincode's fixed-width little-endian encoding. Delta-time fields
/// are stored relative to `now`, the clock of the save pass.
pub struct RecordWriter {
    buf: Vec<u8>,
    now: DateTime<Utc>,
}

impl RecordWriter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            buf: Vec::with_capacity(64),
            now,
        }
    }

    fn put<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        bincode::serialize_into(&mut self.buf, value)?;
        Ok(())
    }

    /// Version tags always lead a layer.
    pub fn write_version(&mut self, version: u32) -> Result<()> {
        self.put(&version)
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.put(&value)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.put(&value)
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.put(&value)
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.put(&value)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.put(&value)
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.put(&value)
    }

    pub fn write_f64(&mut self, value: f64) -> Result<()> {
        self.put(&value)
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.put(value)
    }

    pub fn write_opt_string(&mut self, value: Option<&str>) -> Result<()> {
        self.put(&value)
    }

    pub fn write_serial(&mut self, value: Serial) -> Result<()> {
        self.put(&value.0)
    }

    /// `Serial::ZERO` stands for "none", matching how references to deleted entities read back.
    pub fn write_opt_serial(&mut self, value: Option<Serial>) -> Result<()> {
        self.write_serial(value.unwrap_or(Serial::ZERO))
    }

    pub fn write_serial_list(&mut self, values: &[Serial]) -> Result<()> {
        self.write_u32(values.len() as u32)?;
        for serial in values {
            self.write_serial(*serial)?;
        }
        Ok(())
    }

    pub fn write_point(&mut self, value: Point3D) -> Result<()> {
        self.write_i32(value.x)?;
        self.write_i32(value.y)?;
        self.write_i32(value.z)
    }

    pub fn write_totals(&mut self, value: Totals) -> Result<()> {
        self.write_i64(value.gold)?;
        self.write_i64(value.items)?;
        self.write_i64(value.weight)
    }

    /// Absolute UTC timestamp in milliseconds.
    pub fn write_time(&mut self, value: DateTime<Utc>) -> Result<()> {
        self.put(&value.timestamp_millis())
    }

    /// Offset from the save clock in milliseconds.
    pub fn write_delta_time(&mut self, value: DateTime<Utc>) -> Result<()> {
        let offset = value.signed_duration_since(self.now).num_milliseconds();
        self.put(&offset)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
