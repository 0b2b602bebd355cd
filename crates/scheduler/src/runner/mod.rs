//! Scheduler runner -- owns the registry, the worker pool and the dispatch pass.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, registration, cancellation and queries
//! - `dispatch`: the per-tick `advance` pass and execution bookkeeping

mod core;
mod dispatch;

pub use self::core::Scheduler;
