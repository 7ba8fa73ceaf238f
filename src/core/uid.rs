//! Module identifier allocation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque module identifier.
///
/// Serializes as a bare JSON string: uuid text in normal operation, a decimal
/// counter when the owning container allocates sequentially.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(String);

impl Uid {
    /// View the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Uid {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Uid {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Issues identifiers for new modules.
///
/// Random mode hands out fresh universally-unique identifiers; sequential
/// mode counts up from 0 and exists for deterministic tests. The mode is
/// fixed at container construction.
pub struct UidAllocator {
    sequential: bool,
    next: AtomicU64,
}

impl UidAllocator {
    /// Allocator producing universally-unique identifiers.
    #[must_use]
    pub fn random() -> Self {
        Self {
            sequential: false,
            next: AtomicU64::new(0),
        }
    }

    /// Allocator producing 0, 1, 2, …
    #[must_use]
    pub fn sequential() -> Self {
        Self {
            sequential: true,
            next: AtomicU64::new(0),
        }
    }

    /// Hand out the next identifier.
    pub fn allocate(&self) -> Uid {
        if self.sequential {
            Uid(self.next.fetch_add(1, Ordering::Relaxed).to_string())
        } else {
            Uid(uuid::Uuid::new_v4().to_string())
        }
    }
}
