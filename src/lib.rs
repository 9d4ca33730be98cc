//! # Mushcore - Container Engine and Versioned World Persistence
//!
//! Mushcore keeps a world of items and mobiles, the containers that nest them, and a
//! versioned binary format that lets old saves keep loading as record layouts grow.
//!
//! ## Features
//!
//! - **Versioned records**: every entity layer writes a version tag; readers run a
//!   cumulative ladder of per-version steps so older records upgrade on load.
//! - **Container engine**: capacity checks along the parent chain, incremental
//!   totals, stacking and drop placement, typed search and atomic consumption.
//! - **Specialized containers**: owner-bound bank boxes, secure trade containers with
//!   acceptance that resets on any change, and corpses with timed decay and loot rights.
//! - **Persistence**: sled-backed store with checksummed framing and load-time repair.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mushcore::config::Config;
//! use mushcore::storage::WorldStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let registry = Arc::new(config.containers.load_registry()?);
//!     let store = WorldStore::open(config.storage.world_db_path())?;
//!     let (mut world, _report) = store.load_world(config.world.clone(), registry, chrono::Utc::now())?;
//!
//!     let player = world.create_player("Avatar", mushcore::world::AccessLevel::Player)?;
//!     println!("created {}", player);
//!     store.save_world(&world)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`persist`] - Record writer/reader and version ladders
//! - [`world`] - Item and mobile arenas, parent tree, clock and timers
//! - [`container`] - Capacity, totals, placement, search and the container specializations
//! - [`storage`] - Sled-backed world store
//! - [`config`] - Configuration management

pub mod config;
pub mod container;
pub mod persist;
pub mod storage;
pub mod world;

pub use container::{ContainerKind, ContainerState};
pub use world::{Item, Mobile, Serial, World, WorldError};
