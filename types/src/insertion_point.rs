//! # insertion_point
//!
//! A mutable position in a request, produced by the Insertion-Point
//! Analyzer in a deterministic order. See spec §3 "InsertionPoint" and
//! §4.3.

use serde::{Deserialize, Serialize};

/// Where in the request an insertion point sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionPointType {
    Parameter,
    Body,
    Header,
    Cookie,
    Path,
    JsonField,
    XmlAttr,
}

/// The declared shape of the value at an insertion point. `Unknown` is
/// the default before the analyzer's dynamicity/reflection pass runs;
/// `Email` is not named explicitly in spec §3's "…" but is needed by the
/// mass-assignment and JSONP heuristics, so it is added here (see
/// SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Url,
    Number,
    FreeText,
    Boolean,
    Email,
    Unknown,
}

/// Where a reflected marker landed in the response, used to filter
/// payloads by reflection context (spec §4.3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionContext {
    HtmlContent,
    ScriptBlock,
    AttributeValue,
    JavascriptString,
    Comment,
}

/// Result of the analyzer's reflection-context pass: where the marker
/// landed and whether the response applied common encodings to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionAnalysis {
    pub context: ReflectionContext,
    pub html_encoded: bool,
    pub quote_encoded: bool,
    pub backslash_escaped: bool,
}

/// A mutable position in a request that the scanner may substitute with a
/// payload. `original_data` is the surrounding material the analyzer
/// needs to re-render the request with everything else bit-identical
/// (spec §8: "all other positions' bytes are bit-identical to the
/// baseline").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertionPoint {
    pub name: String,
    pub point_type: InsertionPointType,
    pub value: String,
    pub original_data: String,
    pub value_type: ValueType,
    pub is_dynamic: bool,
    pub is_reflected: bool,
    pub reflection: Option<ReflectionAnalysis>,
}

impl InsertionPoint {
    pub fn new(name: impl Into<String>, point_type: InsertionPointType, value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            name: name.into(),
            point_type,
            original_data: value.clone(),
            value,
            value_type: ValueType::Unknown,
            is_dynamic: false,
            is_reflected: false,
            reflection: None,
        }
    }

    /// A stable, human-legible identifier for this point, used as the
    /// dedup sub-key (spec §4.6: "source or insertion-point string").
    pub fn summary(&self) -> String {
        format!("{:?}:{}", self.point_type, self.name)
    }

    pub fn is_header_or_cookie(&self) -> bool {
        matches!(self.point_type, InsertionPointType::Header | InsertionPointType::Cookie)
    }
}
