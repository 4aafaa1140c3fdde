// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed identifiers
//!
//! Ids are numeric and allocated by the store in insertion order, so
//! comparing two ids of the same kind also compares their creation order.

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(n: u64) -> Self {
                $name(n)
            }
        }
    };
}

numeric_id!(
    /// Project that owns resource groups
    ProjectId,
    "project"
);
numeric_id!(
    /// Pipeline a processable belongs to
    PipelineId,
    "pipeline"
);
numeric_id!(
    /// Resource group
    ResourceGroupId,
    "group"
);
numeric_id!(
    /// One slot in a resource group's pool
    ResourceId,
    "resource"
);
numeric_id!(
    /// Job or bridge scheduled through a resource group
    ProcessableId,
    "job"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_kind_prefix() {
        assert_eq!(ProcessableId(7).to_string(), "job-7");
        assert_eq!(ResourceGroupId(2).to_string(), "group-2");
        assert_eq!(ResourceId(11).to_string(), "resource-11");
    }

    #[test]
    fn ids_order_by_allocation() {
        assert!(ProcessableId(1) < ProcessableId(2));
    }

    #[test]
    fn ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&ProcessableId(42)).unwrap();
        assert_eq!(json, "42");
        let back: ProcessableId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ProcessableId(42));
    }
}
