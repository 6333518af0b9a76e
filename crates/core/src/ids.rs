//! Identifier and key types for the lock/operation data model.
//!
//! Uses a newtype-over-`Uuid` pattern for every identifier this subsystem
//! needs, so a `PlanId` and a `LockId` can never be swapped by accident.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Get the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(PlanId, "Unique identifier for a plan `P`.");
uuid_id!(LockId, "Unique identifier for a lock record.");
uuid_id!(OperationId, "Unique identifier for a queued operation.");
uuid_id!(TxnId, "Unique identifier for a file transaction.");
uuid_id!(WorkspaceId, "Unique identifier for a workspace.");

/// A plan's branch name.
///
/// The empty string is a first-class value meaning the plan's root/default
/// branch — *not* a null. Batching and conflict rules treat the root
/// branch conservatively, so this type makes "is this the root branch" an
/// explicit, checked question rather than a string comparison sprinkled
/// through the codebase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchName(String);

impl BranchName {
    /// The plan's root/default branch.
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Wrap an arbitrary branch name (empty string means root).
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// True if this is the plan's root/default branch.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for BranchName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for BranchName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Lock scope requested by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// Shared read access.
    Read,
    /// Exclusive write access.
    Write,
}

impl Scope {
    /// True for [`Scope::Write`].
    pub fn is_write(&self) -> bool {
        matches!(self, Scope::Write)
    }

    /// True for [`Scope::Read`].
    pub fn is_read(&self) -> bool {
        matches!(self, Scope::Read)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Read => write!(f, "READ"),
            Scope::Write => write!(f, "WRITE"),
        }
    }
}
