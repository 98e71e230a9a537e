//! BindSync - state synchronization core for a keybind configuration editor
//!
//! A single coordinator owns the profile state (keybinds, aliases, bindsets,
//! settings) and is the only writer. Collaborators talk to it two ways: a
//! fire-and-forget pub/sub [`bus`] for state-change broadcasts, and an [`rpc`]
//! correlation layer on top of the same bus for request/response. Late joiners
//! fetch one full snapshot and then follow the broadcast topics.
//!
//! # Core Concepts
//!
//! - **Single Writer**: every mutation flows through the coordinator actor
//! - **Persist Before Commit**: storage is awaited before the cache changes
//! - **Explicit Operations**: profile updates are `{add, delete, modify,
//!   properties}` payloads applied in a fixed order
//! - **Broadcast + Late Join**: subscribers stay current from events alone
//!
//! # Modules
//!
//! - [`bus`] - named-topic broadcast bus
//! - [`rpc`] - request/response correlation over the bus
//! - [`domain`] - profiles, update operations, coordinator state
//! - [`storage`] - persistence backends
//! - [`coordinator`] - the state-owning actor and its RPC surface
//! - [`client`] - typed RPC client for subscribers

pub mod bus;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod events;
pub mod rpc;
pub mod storage;

pub use bus::Bus;
pub use client::CoordinatorClient;
pub use config::CoordinatorConfig;
pub use coordinator::{CoordError, CoordinatorHandle};
pub use rpc::RpcError;
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
