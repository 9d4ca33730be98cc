//! Outbound client notifications.
//!
//! The world queues these on its outbox; framing and delivery belong to the network
//! layer that drains it.

use serde::Serialize;

use super::types::{Point3D, Serial};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "packet", rename_all = "snake_case")]
pub enum Packet {
    /// Open the container gump.
    ContainerDisplay {
        to: Serial,
        container: Serial,
        gump_id: i32,
    },
    /// Full listing of the items the viewer may see.
    ContainerContent {
        to: Serial,
        container: Serial,
        items: Vec<Serial>,
    },
    /// A single item appeared, moved or changed amount inside an opened container.
    ContainerContentUpdate {
        to: Serial,
        container: Serial,
        item: Serial,
        location: Point3D,
    },
    RemoveEntity { to: Serial, entity: Serial },
    EquipUpdate { to: Serial, item: Serial, mobile: Serial },
    Message { to: Serial, text: String },
    PlaySound { to: Serial, sound: i32 },
    TradeOpen {
        to: Serial,
        with: Serial,
        first: Serial,
        second: Serial,
    },
    TradeUpdate {
        to: Serial,
        container: Serial,
        first: bool,
        second: bool,
    },
    TradeClose { to: Serial, container: Serial },
}

impl Packet {
    pub fn recipient(&self) -> Serial {
        match self {
            Packet::ContainerDisplay { to, .. }
            | Packet::ContainerContent { to, .. }
            | Packet::ContainerContentUpdate { to, .. }
            | Packet::RemoveEntity { to, .. }
            | Packet::EquipUpdate { to, .. }
            | Packet::Message { to, .. }
            | Packet::PlaySound { to, .. }
            | Packet::TradeOpen { to, .. }
            | Packet::TradeUpdate { to, .. }
            | Packet::TradeClose { to, .. } => *to,
        }
    }
}
