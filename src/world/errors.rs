use thiserror::Error;

use super::types::Serial;

/// Errors that can arise while loading, saving, or restructuring the world.
///
/// Capacity and access refusals are not errors; those are reported through the boolean
/// results of the container operations.
#[derive(Debug, Error)]
pub enum WorldError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode encoding and decoding errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, registry table, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when an operation names an entity that is not present.
    #[error("entity not found: {0}")]
    NotFound(Serial),

    /// The stored record was written by a newer build than this one.
    #[error("{entity} record has version {found}, newest supported is {newest}")]
    UnknownVersion {
        entity: &'static str,
        found: u32,
        newest: u32,
    },

    /// Stored record failed its integrity check.
    #[error("checksum mismatch for record {0}")]
    Checksum(Serial),

    /// Stored record carries a kind tag this build does not know.
    #[error("unknown entity kind tag {0}")]
    UnknownEntityKind(u8),

    /// The record decoded but its content is inconsistent.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The named item carries no container state.
    #[error("{0} is not a container")]
    NotAContainer(Serial),

    /// No open trade session has this id.
    #[error("no secure trade session {0}")]
    NoSuchTrade(u32),

    /// A structural change would break the ownership tree.
    #[error("invalid parent for {item}: {reason}")]
    InvalidParent { item: Serial, reason: String },
}

pub type Result<T> = std::result::Result<T, WorldError>;
