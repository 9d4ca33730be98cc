//! Container display metadata keyed by visual id.
//!
//! Rows of the table file look like
//!
//! ```text
//! 0x3C	"44 65 142 94"	0x48	0x9B0,0xE75,0xE79
//! ```
//!
//! gump id, display bounds, drop sound, and the item ids sharing the entry. Numbers
//! may be decimal or `0x` hex.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::path::Path;

use crate::world::errors::Result;
use crate::world::types::Rect2D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerData {
    pub gump_id: i32,
    pub bounds: Rect2D,
    pub drop_sound: i32,
}

impl ContainerData {
    /// Entry used when no table could be read.
    pub const FALLBACK: ContainerData = ContainerData {
        gump_id: 0x3C,
        bounds: Rect2D {
            x: 44,
            y: 65,
            width: 142,
            height: 94,
        },
        drop_sound: 0x48,
    };
}

/// Read-only after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ContainerDataRegistry {
    default: ContainerData,
    table: HashMap<u16, ContainerData>,
}

impl Default for ContainerDataRegistry {
    fn default() -> Self {
        Self {
            default: ContainerData::FALLBACK,
            table: HashMap::new(),
        }
    }
}

impl ContainerDataRegistry {
    /// Load the table at `path`. A missing file yields the fallback entry alone.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "Container table {} not found, using fallback container data",
                path.display()
            );
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let registry = Self::parse(&text);
        info!(
            "Loaded {} container id mappings from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn parse(text: &str) -> Self {
        let mut registry = Self::default();
        let mut first: Option<ContainerData> = None;

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((data, ids)) = parse_row(line) else {
                debug!("Skipping malformed container row {}: {:?}", index + 1, line);
                continue;
            };
            if first.is_none() {
                first = Some(data);
            }
            for id in ids {
                if registry.table.contains_key(&id) {
                    warn!("Duplicate container item id 0x{:04X} on row {}", id, index + 1);
                    continue;
                }
                registry.table.insert(id, data);
            }
        }

        if let Some(data) = first {
            registry.default = data;
        }
        registry
    }

    pub fn get(&self, item_id: u16) -> &ContainerData {
        self.table.get(&item_id).unwrap_or(&self.default)
    }

    pub fn default_data(&self) -> &ContainerData {
        &self.default
    }

    /// Number of item ids with an explicit entry.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn parse_row(line: &str) -> Option<(ContainerData, Vec<u16>)> {
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() < 3 {
        return None;
    }

    let gump_id = parse_number(fields[0])?;
    let rect: Vec<i32> = fields[1]
        .trim_matches('"')
        .split_whitespace()
        .map(parse_number)
        .collect::<Option<_>>()?;
    if rect.len() < 4 {
        return None;
    }
    let drop_sound = parse_number(fields[2])?;

    let mut ids = Vec::new();
    if let Some(list) = fields.get(3) {
        for raw in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            ids.push(u16::try_from(parse_number(raw)?).ok()?);
        }
    }

    let data = ContainerData {
        gump_id,
        bounds: Rect2D::new(rect[0], rect[1], rect[2], rect[3]),
        drop_sound,
    };
    Some((data, ids))
}

fn parse_number(raw: &str) -> Option<i32> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => i32::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}
