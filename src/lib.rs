//! Photo Wrapped - incremental per-user photo analytics
//!
//! Wrapped folds per-photo content-analysis observations into a rolling,
//! per-user summary through a deterministic pipeline: event dispatch →
//! timestamp normalization and mood classification → incremental merge →
//! derived metrics → conditional persist.
//!
//! ## Modules
//!
//! - **Aggregator**: label/mood/colour/time-of-day/day histograms and the
//!   busiest-day timeline
//! - **Store**: versioned document storage with compare-and-swap writes

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod mood;
pub mod normalizer;
pub mod pipeline;
pub mod store;
pub mod types;

pub use aggregator::Aggregator;
pub use config::WrappedConfig;
pub use error::WrappedError;
pub use pipeline::{wrap_observation, BatchReport, Outcome, WrappedProcessor};
pub use store::{DocumentStore, FsDocumentStore, MemoryDocumentStore};
pub use types::{PhotoObservation, UserSummary};

/// Wrapped version reported by the CLI
pub const WRAPPED_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "photo-wrapped";
