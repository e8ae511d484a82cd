//! Arrival board for a fixed list of transit stops.
//!
//! Feeds come from a SIRI `StopMonitoring` API through a proxy that holds
//! the API key; each stop's feed is parsed, filtered and reduced to a short
//! sorted list of upcoming arrivals.

pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod normalizer;
pub mod orchestrator;
pub mod output;
pub mod page;
pub mod parser;
pub mod presentation;
pub mod server;
pub mod stats;
pub mod timer;
pub mod upstream;
