//! # payloads
//!
//! The Payload Catalog (spec §4): returns payload sets keyed by issue
//! kind, filtered by CSP posture and reflection context.

pub mod catalog;

pub use catalog::CspPosture;
