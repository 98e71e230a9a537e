//! State coordinator: single writer, broadcaster, RPC service
//!
//! [`core::spawn`] starts the actor; [`CoordinatorHandle`] is the typed
//! in-process client and [`service::register`] exposes the same operations
//! over the bus.

pub mod core;
pub mod handle;
pub mod merge;
pub mod messages;
pub mod service;

pub use self::core::spawn;
pub use handle::CoordinatorHandle;
pub use messages::{CoordError, CoordResult};
pub use service::{register, RpcSurface};
