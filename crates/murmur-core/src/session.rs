//! Session identity.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of a session admitted into the registry.
///
/// Identifiers are handed out in increasing order, so comparing two of them
/// compares their admission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Get the raw numeric value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sess_{}", self.0)
    }
}

/// Monotonic source of session identifiers.
#[derive(Debug, Default)]
pub(crate) struct SessionIdGenerator {
    next: AtomicU64,
}

impl SessionIdGenerator {
    pub(crate) fn next(&self) -> SessionId {
        SessionId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_increase() {
        let ids = SessionIdGenerator::default();
        let first = ids.next();
        let second = ids.next();
        assert!(first < second);
        assert_eq!(first.to_string(), "sess_1");
        assert_eq!(second.as_u64(), 2);
    }
}
