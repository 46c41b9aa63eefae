//! # sukyan_engine
//!
//! The audit execution engine: the concurrent, cancellable orchestrator
//! that fans a battery of dynamic web-application security audits out
//! over HTTP and browser infrastructure, correlates out-of-band
//! interactions, and deduplicates findings into one issue per logical
//! vulnerability (spec §1). See `SPEC_FULL.md` for the full component
//! breakdown; this crate implements every component except the ones
//! spec §1 names as external collaborators (CLI framing, config
//! loading, the relational store, the reporting UI, the crawl/proxy
//! front-end, payload dictionaries as data, and the CDP driver).

pub mod audits;
pub mod browser;
pub mod config;
pub mod dedup;
pub mod error;
pub mod http;
pub mod insertion_points;
pub mod issues;
pub mod oob;
pub mod orchestrator;
pub mod payloads;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use orchestrator::Orchestrator;
