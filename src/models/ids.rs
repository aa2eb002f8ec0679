//! Identifier newtypes for resources, processes, and deliverables.
//!
//! Identifiers are opaque strings with a non-standard total order:
//! shorter strings sort first, equal lengths fall back to lexicographic
//! comparison. This order drives every `BTreeMap`/`BTreeSet` in the
//! crate and therefore the tie-breaking of allocation enumeration and
//! plan search; changing it changes which of several equally good plans
//! is produced first.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                // Length first, then lexicographic.
                self.0
                    .len()
                    .cmp(&other.0.len())
                    .then_with(|| self.0.cmp(&other.0))
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

define_id!(
    /// Identifier of a resource (machine, worker, tool).
    ResourceId
);
define_id!(
    /// Identifier of a process (a unit of work in the flow diagram).
    ProcessId
);
define_id!(
    /// Identifier of a deliverable (a unit of output in the flow diagram).
    DeliverableId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_before_lexicographic() {
        // "z" is shorter than "aa", so it sorts first.
        assert!(ProcessId::new("z") < ProcessId::new("aa"));
        assert!(ProcessId::new("ab") < ProcessId::new("ba"));
        assert!(ProcessId::new("p1") < ProcessId::new("p10"));
    }

    #[test]
    fn test_equality_and_display() {
        let a = ResourceId::new("M1");
        let b = ResourceId::from("M1");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "M1");
        assert_eq!(a.as_str(), "M1");
    }

    #[test]
    fn test_btree_ordering() {
        let mut set = std::collections::BTreeSet::new();
        set.insert(DeliverableId::new("doc10"));
        set.insert(DeliverableId::new("d"));
        set.insert(DeliverableId::new("doc2"));
        let order: Vec<_> = set.iter().map(|d| d.as_str()).collect();
        assert_eq!(order, vec!["d", "doc2", "doc10"]);
    }

    #[test]
    fn test_serde_transparent() {
        let id = ProcessId::new("design");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"design\"");
        let back: ProcessId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
