//! # wayfarer-core
//!
//! Provider abstractions shared by the wayfarer crates.
//!
//! Reference resolution and connection monitoring never touch the clock,
//! the random number generator or background threads directly. They go
//! through the providers in this crate so production code runs on real
//! time while tests drive a manual clock and a seeded RNG.
//!
//! ## Provider Traits
//!
//! - [`TimeProvider`]: monotonic "now" ([`SystemTimeProvider`], [`ManualTimeProvider`])
//! - [`RandomProvider`]: index sampling for shuffles ([`ThreadRandomProvider`], [`SeededRandomProvider`])
//! - [`Timer`]: one-shot and repeating tasks ([`ThreadTimer`])
//!
//! [`Providers`] bundles one of each.
//!
//! ## Configuration
//!
//! [`Properties`] is the flat key/value store configuration is read from.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod properties;
mod providers;
mod random;
mod time;
mod timer;

pub use properties::Properties;
pub use providers::Providers;
pub use random::{shuffle, RandomProvider, SeededRandomProvider, ThreadRandomProvider};
pub use time::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
pub use timer::{ThreadTimer, Timer, TimerError, TimerTask, TimerToken};
