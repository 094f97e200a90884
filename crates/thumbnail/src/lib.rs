//! Coalescing thumbnail scheduler.
//!
//! Any number of concurrent requests for the same thumbnail result in at most
//! one run of the external converter, and the number of converter processes
//! running at once across the whole server is capped.
//!
//! # Architecture
//! ```text
//!  request ──► PendingTable ──owner──► spawned task ──► WorkTickets ──► Converter
//!     │            │                        │
//!     │          joined                     └── outcome ──► every waiter
//!     └────────────┴──────── wait ◄───────────────────────────┘
//! ```
//! - **[`ThumbnailKey`]**: source, destination and dimension; equal keys coalesce.
//! - **Pending table**: one entry per key in flight, holding one channel per
//!   waiter. The entry is removed in the same critical section that delivers
//!   the outcome, so a later request always starts a fresh conversion.
//! - **Work tickets**: a counting semaphore bounding concurrent conversions.
//! - **[`Converter`](convert::Converter)**: the seam to the external tool.
//!
//! Nothing here caches results or retries failures; whether a thumbnail
//! already exists on disk is the caller's concern.

pub mod convert;
pub mod error;
mod key;
mod pending;
mod scheduler;
#[cfg(test)]
mod testing;
mod tickets;

pub use crate::key::ThumbnailKey;
pub use crate::scheduler::{Scheduler, SchedulerStats};
pub use crate::tickets::DEFAULT_MAX_CONVERSIONS;
