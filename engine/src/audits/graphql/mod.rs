//! # graphql
//!
//! The GraphQL API suite (spec §1, §4.2): introspection evasions, batch
//! and alias-amplification abuse, query-depth limits (including a
//! schema-aware cyclic-chain probe), directive misuse, field-suggestion
//! leakage, and sensitive-field probing. Every audit in this suite is
//! history-level and shares the response-classification function and
//! parsed schema representation in `schema`.

pub mod batching;
pub mod depth_limit;
pub mod directives;
pub mod field_suggestions;
pub mod introspection;
pub mod schema;
pub mod sensitive_fields;

pub use batching::BatchingAudit;
pub use depth_limit::DepthLimitAudit;
pub use directives::DirectivesAudit;
pub use field_suggestions::FieldSuggestionsAudit;
pub use introspection::IntrospectionAudit;
pub use sensitive_fields::SensitiveFieldsAudit;
