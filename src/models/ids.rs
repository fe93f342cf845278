// Workflow identifiers - the names stages, transitions and workflows go by
//
// ## Admissions Workflow Overview
//
// An admissions workflow is a small state machine configured by an institution:
//
// ```
//     [submitted] --start_review--> [under_review] --decide--> [decision]
//                                        |
//                                        +--reject--> [rejected]
// ```
//
// **Stages (StageId)**: where an application currently sits.
// **Transitions (TransitionId)**: the explicit edges an application may follow.
// **Workflows (WorkflowId)**: the versioned template owning both.
//
// ### Implementation Notes:
//
// - All three ids are plain string wrappers so administrators can use readable
//   slugs ("undergrad-fall", "under_review") in configuration files
// - They serialize as bare JSON strings (serde newtype structs are transparent)
// - Applications and status records use UUIDs / store-assigned integers instead,
//   because those are created at runtime rather than written by hand

use serde::{Deserialize, Serialize};

/// Declares a string-backed identifier type with the usual conversions.
///
/// ## Rust Learning Notes:
///
/// ### Declarative Macros
/// `macro_rules!` lets us stamp out the same newtype three times without
/// copy-pasting the `From`/`Display` impls. `$(#[$meta:meta])*` forwards doc
/// comments written at the call site onto the generated struct.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier from any string-like input
            pub fn new<S: Into<String>>(value: S) -> Self {
                $name(value.into())
            }

            /// Get the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Identifies a workflow template (all of its versions share the id)
    ///
    /// Examples: "undergrad-fall", "graduate-rolling", "transfer-spring"
    WorkflowId
);

string_id!(
    /// Identifies a stage within a workflow
    ///
    /// Examples: "submitted", "under_review", "decision", "enrolled"
    StageId
);

string_id!(
    /// Identifies a directed edge between two stages
    ///
    /// Examples: "start_review", "auto_decide", "reject"
    TransitionId
);

/// Pins an application to one immutable snapshot of a workflow
///
/// Editing a workflow registers a new version; applications already in flight
/// keep evaluating against the version recorded here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowRef {
    pub workflow_id: WorkflowId,
    pub version: u32,
}

impl WorkflowRef {
    pub fn new(workflow_id: WorkflowId, version: u32) -> Self {
        Self { workflow_id, version }
    }
}

impl std::fmt::Display for WorkflowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@v{}", self.workflow_id, self.version)
    }
}
