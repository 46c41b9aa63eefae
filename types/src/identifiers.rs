//! # identifiers
//!
//! Workspace/task/scan identifier newtypes threaded through every
//! component. Kept as distinct types (rather than bare `i64`/`Uuid`) so a
//! scan-job id can never be passed where a workspace id is expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(WorkspaceId, "Identifies a workspace — the top-level grouping of captured history.");
uuid_id!(TaskId, "Identifies a crawl/scan task within a workspace.");
uuid_id!(ScanId, "Identifies one invocation of the audit orchestrator.");
uuid_id!(ScanJobId, "Identifies one (history item, audit) unit of work within a scan.");
