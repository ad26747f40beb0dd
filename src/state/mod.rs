//! Shared in-process state: the session registry and room membership.
//!
//! Both registries are plain injectable structs; they are created once in
//! `main` and passed through constructors, so a broker-backed implementation
//! can replace them without touching caller contracts.

mod dashmap_ext;
mod registry;
mod rooms;

pub use dashmap_ext::DashMapExt;
pub use registry::{ConnectionId, RegisterOutcome, SessionRegistry, UnregisterOutcome};
pub use rooms::RoomRegistry;
