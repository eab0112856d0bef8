//! Background Tasks Module
//!
//! Contains background tasks that run alongside a store.
//!
//! # Tasks
//! - TTL Sweep: Removes expired entries at a configured interval, in bounded batches

mod sweep;

pub use sweep::spawn_sweeper;
