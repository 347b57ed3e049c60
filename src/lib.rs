//! EPG matcher library
//!
//! Reconciles an M3U playlist against one or more XMLTV EPG sources and
//! annotates each playlist entry with the best-matching guide channel. The
//! crate exposes a [`service::MatcherService`] facade for callers (the CLI
//! binary, or a UI layer); everything below it is pure library code.

pub mod cache;
pub mod config;
pub mod errors;
pub mod matching;
pub mod models;
pub mod playlist;
pub mod service;
pub mod sources;

pub use config::Config;
pub use errors::{MatcherError, RunError, SourceError};
pub use service::{MatcherService, RunConfig};
