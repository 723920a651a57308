//! Actor identities

use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Unique identifier for an actor in one configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl ActorId {
    /// Create a new actor ID
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor:{}", self.0)
    }
}

/// Mints fresh actor ids.
///
/// Clones share one counter. An id can be reserved before the actor it
/// names is registered (the evaluator stages actors inside a transaction
/// and registers them on commit) without ever colliding with ids the
/// configuration hands out directly.
#[derive(Debug, Clone, Default)]
pub struct IdSource(Rc<Cell<u64>>);

impl IdSource {
    /// Create a source whose first id is `actor:1`
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next id
    pub fn next_id(&self) -> ActorId {
        let id = self.0.get() + 1;
        self.0.set(id);
        ActorId(id)
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.0.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_id() {
        let id = ActorId::new(42);
        assert_eq!(id.raw(), 42);
        assert_eq!(format!("{}", id), "actor:42");
    }

    #[test]
    fn test_id_source_shared_between_clones() {
        let ids = IdSource::new();
        let other = ids.clone();

        assert_eq!(ids.next_id(), ActorId(1));
        assert_eq!(other.next_id(), ActorId(2));
        assert_eq!(ids.next_id(), ActorId(3));
        assert_eq!(other.issued(), 3);
    }
}
