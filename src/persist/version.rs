//! Cumulative version ladders.
//!
//! A record layer writes its version tag and then its fields newest-version-first. On
//! read, every step from the stored version down to zero runs in that order, so a record
//! written by an older build simply skips the steps it never had and those fields keep
//! the defaults of the freshly constructed target.
//!
//! # Adding a field
//!
//! 1. Append a new step to the layer's step table (its index is the new version)
//! 2. Write the new field first in the layer's `write_fields`
//! 3. Never reorder or edit existing steps

use log::debug;

use super::{RecordReader, RecordWriter};
use crate::world::errors::{Result, WorldError};

/// Reads the fields one version introduced.
pub type ReadStep<T> = fn(&mut T, &mut RecordReader<'_>) -> Result<()>;

/// Ordered table of read steps; the step at index `n` reads the fields added in version `n`.
pub struct VersionLadder<T: 'static> {
    entity: &'static str,
    steps: &'static [ReadStep<T>],
}

impl<T: 'static> VersionLadder<T> {
    pub const fn new(entity: &'static str, steps: &'static [ReadStep<T>]) -> Self {
        Self { entity, steps }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    /// Version written by this build.
    pub fn newest(&self) -> u32 {
        self.steps.len().saturating_sub(1) as u32
    }

    /// Read the version tag and run the steps it covers, newest first.
    ///
    /// Returns the stored version. A version above [`newest`](Self::newest) came from a
    /// newer build and cannot be interpreted.
    pub fn read(&self, target: &mut T, reader: &mut RecordReader<'_>) -> Result<u32> {
        let found = reader.read_version()?;
        let newest = self.newest();
        if found > newest {
            return Err(WorldError::UnknownVersion {
                entity: self.entity,
                found,
                newest,
            });
        }

        for step in self.steps[..=found as usize].iter().rev() {
            step(target, reader)?;
        }

        if found < newest {
            debug!("Upgrading {} layer from v{} to v{}", self.entity, found, newest);
            reader.note_upgrade(self.entity, found, newest);
        }
        Ok(found)
    }
}

/// A persisted layer of an entity.
pub trait VersionedRecord: Sized + 'static {
    fn ladder() -> &'static VersionLadder<Self>;

    /// Write every field of the newest version, newest-version fields first. The version
    /// tag is written by [`serialize`](Self::serialize).
    fn write_fields(&self, writer: &mut RecordWriter) -> Result<()>;

    /// Hook for data transformations that depend on the stored version, run after all
    /// steps when the stored version is older than the newest.
    fn upgrade(&mut self, _from: u32) {}

    fn serialize(&self, writer: &mut RecordWriter) -> Result<()> {
        writer.write_version(Self::ladder().newest())?;
        self.write_fields(writer)
    }

    /// Read this layer into an already-defaulted target. Returns the stored version.
    fn deserialize_into(&mut self, reader: &mut RecordReader<'_>) -> Result<u32> {
        let ladder = Self::ladder();
        let found = ladder.read(self, reader)?;
        if found < ladder.newest() {
            self.upgrade(found);
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    /// A record that grew one field per version.
    #[derive(Debug, Default, PartialEq)]
    struct Lantern {
        name: String,
        fuel: i32,
        lit: bool,
        legacy_upgraded_from: Option<u32>,
    }

    fn read_v0(lantern: &mut Lantern, reader: &mut RecordReader<'_>) -> Result<()> {
        lantern.name = reader.read_string()?;
        Ok(())
    }

    fn read_v1(lantern: &mut Lantern, reader: &mut RecordReader<'_>) -> Result<()> {
        lantern.fuel = reader.read_i32()?;
        Ok(())
    }

    fn read_v2(lantern: &mut Lantern, reader: &mut RecordReader<'_>) -> Result<()> {
        lantern.lit = reader.read_bool()?;
        Ok(())
    }

    const LANTERN_STEPS: &[ReadStep<Lantern>] = &[read_v0, read_v1, read_v2];
    static LANTERN_LADDER: VersionLadder<Lantern> = VersionLadder::new("lantern", LANTERN_STEPS);

    impl VersionedRecord for Lantern {
        fn ladder() -> &'static VersionLadder<Self> {
            &LANTERN_LADDER
        }

        fn write_fields(&self, writer: &mut RecordWriter) -> Result<()> {
            writer.write_bool(self.lit)?;
            writer.write_i32(self.fuel)?;
            writer.write_string(&self.name)
        }

        fn upgrade(&mut self, from: u32) {
            self.legacy_upgraded_from = Some(from);
        }
    }

    #[test]
    fn test_current_version_roundtrip() {
        let now = Utc::now();
        let lantern = Lantern {
            name: "brass".into(),
            fuel: 12,
            lit: true,
            legacy_upgraded_from: None,
        };
        let mut writer = RecordWriter::new(now);
        lantern.serialize(&mut writer).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = RecordReader::new(&bytes, now);
        let mut back = Lantern::default();
        assert_eq!(back.deserialize_into(&mut reader).unwrap(), 2);
        assert_eq!(back, lantern);
        assert!(reader.is_exhausted());
        assert!(reader.upgrades().is_empty());
    }

    #[test]
    fn test_old_version_falls_through_to_defaults() {
        let now = Utc::now();
        // What a v1 build wrote: tag, fuel, name.
        let mut writer = RecordWriter::new(now);
        writer.write_version(1).unwrap();
        writer.write_i32(7).unwrap();
        writer.write_string("tin").unwrap();
        let bytes = writer.into_bytes();

        let mut reader = RecordReader::new(&bytes, now);
        let mut back = Lantern::default();
        assert_eq!(back.deserialize_into(&mut reader).unwrap(), 1);
        assert_eq!(back.name, "tin");
        assert_eq!(back.fuel, 7);
        assert!(!back.lit);
        assert_eq!(back.legacy_upgraded_from, Some(1));
        assert_eq!(
            reader.upgrades(),
            &[crate::persist::Upgrade {
                entity: "lantern",
                from: 1,
                to: 2
            }]
        );
    }

    #[test]
    fn test_future_version_is_rejected() {
        let now = Utc::now();
        let mut writer = RecordWriter::new(now);
        writer.write_version(3).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = RecordReader::new(&bytes, now);
        let err = Lantern::default().deserialize_into(&mut reader).unwrap_err();
        match err {
            WorldError::UnknownVersion {
                entity,
                found,
                newest,
            } => {
                assert_eq!(entity, "lantern");
                assert_eq!(found, 3);
                assert_eq!(newest, 2);
            }
            other => panic!("Expected UnknownVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let now = Utc::now();
        let mut writer = RecordWriter::new(now);
        writer.write_version(2).unwrap();
        writer.write_bool(true).unwrap();
        let bytes = writer.into_bytes();

        let mut reader = RecordReader::new(&bytes, now);
        assert!(Lantern::default().deserialize_into(&mut reader).is_err());
    }

    #[test]
    fn test_delta_time_rebases_on_load_clock() {
        let saved_at = Utc::now();
        let expires = saved_at + chrono::Duration::minutes(5);
        let mut writer = RecordWriter::new(saved_at);
        writer.write_delta_time(expires).unwrap();
        let bytes = writer.into_bytes();

        let loaded_at = saved_at + chrono::Duration::hours(3);
        let mut reader = RecordReader::new(&bytes, loaded_at);
        let back = reader.read_delta_time().unwrap();
        assert_eq!(back, loaded_at + chrono::Duration::minutes(5));
    }
}
