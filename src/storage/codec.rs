//! Record framing.
//!
//! A stored value is `[crc32 LE][kind tag][payload]`. The checksum covers the tag and
//! the payload. The payload is the entity's layers in order: item, then container,
//! then the specialization layer the tag names.

use crc::{Crc, CRC_32_ISO_HDLC};
use chrono::{DateTime, Utc};

use crate::container::{BankState, ContainerKind, ContainerState, CorpseState, TradeState};
use crate::persist::{RecordReader, RecordWriter, Upgrade, VersionedRecord};
use crate::world::errors::{Result, WorldError};
use crate::world::{Item, Mobile, Serial};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
const HEADER_LEN: usize = 5;

/// Which layers a record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Item = 0,
    Container = 1,
    BankBox = 2,
    SecureTrade = 3,
    Corpse = 4,
    Mobile = 5,
}

impl EntityKind {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            0 => EntityKind::Item,
            1 => EntityKind::Container,
            2 => EntityKind::BankBox,
            3 => EntityKind::SecureTrade,
            4 => EntityKind::Corpse,
            5 => EntityKind::Mobile,
            other => return Err(WorldError::UnknownEntityKind(other)),
        })
    }

    pub fn of_item(item: &Item) -> Self {
        match item.container().map(|state| &state.kind) {
            None => EntityKind::Item,
            Some(ContainerKind::Plain) => EntityKind::Container,
            Some(ContainerKind::BankBox(_)) => EntityKind::BankBox,
            Some(ContainerKind::SecureTrade(_)) => EntityKind::SecureTrade,
            Some(ContainerKind::Corpse(_)) => EntityKind::Corpse,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Item => "item",
            EntityKind::Container => "container",
            EntityKind::BankBox => "bank box",
            EntityKind::SecureTrade => "secure trade container",
            EntityKind::Corpse => "corpse",
            EntityKind::Mobile => "mobile",
        }
    }

    fn blank_container(self) -> Option<ContainerState> {
        let kind = match self {
            EntityKind::Item | EntityKind::Mobile => return None,
            EntityKind::Container => ContainerKind::Plain,
            EntityKind::BankBox => ContainerKind::BankBox(BankState::default()),
            EntityKind::SecureTrade => ContainerKind::SecureTrade(TradeState::default()),
            EntityKind::Corpse => ContainerKind::Corpse(Box::default()),
        };
        Some(ContainerState::new(kind))
    }
}

/// Prefix a payload with its kind tag and checksum.
pub fn frame(kind: EntityKind, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(payload.len() + 1);
    body.push(kind.tag());
    body.extend_from_slice(payload);

    let mut framed = Vec::with_capacity(body.len() + 4);
    framed.extend_from_slice(&CRC32.checksum(&body).to_le_bytes());
    framed.extend_from_slice(&body);
    framed
}

/// Verify the checksum and split off the kind tag.
pub fn unframe(serial: Serial, bytes: &[u8]) -> Result<(EntityKind, &[u8])> {
    if bytes.len() < HEADER_LEN {
        return Err(WorldError::Corrupt(format!(
            "record {} is {} bytes, shorter than its header",
            serial,
            bytes.len()
        )));
    }
    let (crc, body) = bytes.split_at(4);
    let stored = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
    if CRC32.checksum(body) != stored {
        return Err(WorldError::Checksum(serial));
    }
    Ok((EntityKind::from_tag(body[0])?, &body[1..]))
}

pub fn encode_item(item: &Item, now: DateTime<Utc>) -> Result<Vec<u8>> {
    let mut writer = RecordWriter::new(now);
    item.serialize(&mut writer)?;
    if let Some(state) = item.container() {
        state.serialize(&mut writer)?;
        match &state.kind {
            ContainerKind::Plain => {}
            ContainerKind::BankBox(bank) => bank.serialize(&mut writer)?,
            ContainerKind::SecureTrade(trade) => trade.serialize(&mut writer)?,
            ContainerKind::Corpse(corpse) => corpse.serialize(&mut writer)?,
        }
    }
    Ok(frame(EntityKind::of_item(item), &writer.into_bytes()))
}

/// Decode an item record; also returns the layers that were upgraded on the way.
pub fn decode_item(serial: Serial, bytes: &[u8], now: DateTime<Utc>) -> Result<(Item, Vec<Upgrade>)> {
    let (kind, payload) = unframe(serial, bytes)?;
    if kind == EntityKind::Mobile {
        return Err(WorldError::Corrupt(format!("{} is a mobile record, expected an item", serial)));
    }
    let mut reader = RecordReader::new(payload, now);
    let mut item = Item::blank(serial);
    item.deserialize_into(&mut reader)?;

    if let Some(mut state) = kind.blank_container() {
        state.deserialize_into(&mut reader)?;
        match &mut state.kind {
            ContainerKind::Plain => {}
            ContainerKind::BankBox(bank) => {
                bank.deserialize_into(&mut reader)?;
            }
            ContainerKind::SecureTrade(trade) => {
                trade.deserialize_into(&mut reader)?;
            }
            ContainerKind::Corpse(corpse) => {
                CorpseState::deserialize_into(corpse, &mut reader)?;
            }
        }
        item.container = Some(state);
    }
    finish(serial, reader).map(|upgrades| (item, upgrades))
}

pub fn encode_mobile(mobile: &Mobile, now: DateTime<Utc>) -> Result<Vec<u8>> {
    let mut writer = RecordWriter::new(now);
    mobile.serialize(&mut writer)?;
    Ok(frame(EntityKind::Mobile, &writer.into_bytes()))
}

pub fn decode_mobile(
    serial: Serial,
    bytes: &[u8],
    now: DateTime<Utc>,
) -> Result<(Mobile, Vec<Upgrade>)> {
    let (kind, payload) = unframe(serial, bytes)?;
    if kind != EntityKind::Mobile {
        return Err(WorldError::Corrupt(format!(
            "{} is a {} record, expected a mobile",
            serial,
            kind.label()
        )));
    }
    let mut reader = RecordReader::new(payload, now);
    let mut mobile = Mobile::blank(serial);
    mobile.deserialize_into(&mut reader)?;
    finish(serial, reader).map(|upgrades| (mobile, upgrades))
}

fn finish(serial: Serial, mut reader: RecordReader<'_>) -> Result<Vec<Upgrade>> {
    if !reader.is_exhausted() {
        return Err(WorldError::Corrupt(format!(
            "{} trailing bytes after record {}",
            reader.remaining(),
            serial
        )));
    }
    Ok(reader.take_upgrades())
}
