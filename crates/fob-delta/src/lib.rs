//! # fob-delta
//!
//! Turns a stream of file system events into incremental graph deltas.
//!
//! Events are coalesced into pending added, modified and deleted sets. When
//! a client asks for a delta, the pending sets are swapped out and handed to
//! one incremental traversal of a [`fob_delta_graph::Graph`]. A failed build
//! keeps its input, so asking again retries the same changes.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fob_delta::{DeltaCalculator, DeltaCalculatorOptions, DeltaConfig, DeltaRequest};
//!
//! let config = DeltaConfig::load(&project_root)?;
//! fob_delta::logging::init_logging_from_config(&config);
//! let options = DeltaCalculatorOptions::new(transformer, resolver).with_config(&config);
//! let calculator = DeltaCalculator::new(["/app/index.js"], options)?;
//!
//! let (_watcher, feed) = fob_delta::FileWatcher::new(&project_root, &config.watch)?;
//! calculator.listen(feed);
//!
//! let mut changes = calculator.subscribe();
//! loop {
//!     let delta = calculator.get_delta(DeltaRequest::default()).await?;
//!     send_update(&delta);
//!     changes.recv().await?;
//! }
//! ```
//!
//! ## Features
//!
//! - `watch` (default): [`FileWatcher`] built on `notify`
//! - `logging`: `init_logging` helpers built on `tracing-subscriber`

pub mod calculator;
pub mod changes;
pub mod config;
pub mod error;
pub mod logging;
#[cfg(feature = "watch")]
pub mod watcher;

pub use calculator::{DeltaCalculator, DeltaCalculatorOptions, DeltaRequest};
pub use changes::{ChangeNotification, ChangeSet, FileEvent, FileEventKind};
pub use config::{DeltaConfig, WatchConfig};
pub use error::{ConfigError, DeltaError, Result};
pub use logging::LogLevel;
#[cfg(feature = "watch")]
pub use watcher::FileWatcher;

pub use fob_delta_graph::{DeltaResult, Graph, Module};

#[cfg(test)]
mod tests;
