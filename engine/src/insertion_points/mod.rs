//! # insertion_points
//!
//! The Insertion-Point Analyzer (spec §4.3): parses a history item into
//! its mutable positions, classifies each by dynamic/reflected behavior,
//! and re-emits requests with one position substituted.

pub mod analyzer;
pub mod reflection;

pub use analyzer::{analyze_dynamicity_and_reflection, create_request_from_insertion_points, extract_points};
