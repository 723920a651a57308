//! Transactions
//!
//! A `Sponsor` buffers the effects of one delivery: sends, actor creations
//! and global definitions pile up while the delivery runs, and nothing touches the
//! configuration until the owner calls `commit`. The first `throw` latches
//! the transaction into the failed state, after which every request fails
//! and `commit` hands back nothing.

use crate::{Env, Outcome, Value};
use humus_core::{ActorId, IdSource, Millis};
use std::cell::RefCell;
use std::mem;
use std::rc::Rc;

/// A buffered send
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub message: Value,
    pub target: ActorId,
    pub delay: Option<Millis>,
}

/// A buffered actor creation
#[derive(Debug, Clone)]
pub struct StagedActor {
    pub id: ActorId,
    pub name: String,
    pub behavior: Value,
    pub env: Env,
}

/// Effects released by a successful transaction, in issue order
#[derive(Debug, Default)]
pub struct Commit {
    pub sends: Vec<PendingSend>,
    pub created: Vec<StagedActor>,
    /// Names to set in the global environment
    pub defines: Vec<(Rc<str>, Value)>,
}

impl Commit {
    /// Whether the transaction left nothing to apply
    pub fn is_empty(&self) -> bool {
        self.sends.is_empty() && self.created.is_empty() && self.defines.is_empty()
    }
}

#[derive(Debug)]
enum Transaction {
    Accumulating {
        sends: Vec<PendingSend>,
        staged: Vec<StagedActor>,
        defines: Vec<(Rc<str>, Value)>,
    },
    Failed {
        exception: Value,
    },
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction::Accumulating {
            sends: Vec::new(),
            staged: Vec::new(),
            defines: Vec::new(),
        }
    }
}

/// Transaction coordinator for one delivery
#[derive(Debug, Clone)]
pub struct Sponsor {
    ids: IdSource,
    xact: Rc<RefCell<Transaction>>,
}

impl Sponsor {
    /// Open a transaction minting actor ids from `ids`
    pub fn new(ids: IdSource) -> Self {
        Self {
            ids,
            xact: Rc::new(RefCell::new(Transaction::default())),
        }
    }

    /// Mint an id for an actor that will be staged with `init`
    ///
    /// In a failed transaction the id is a placeholder that never gets
    /// registered.
    pub fn reserve(&self) -> ActorId {
        self.ids.next_id()
    }

    /// Stage an actor under a reserved id
    pub fn init(&self, id: ActorId, name: impl Into<String>, behavior: Value, env: Env) -> Outcome {
        match &mut *self.xact.borrow_mut() {
            Transaction::Accumulating { staged, .. } => {
                staged.push(StagedActor {
                    id,
                    name: name.into(),
                    behavior,
                    env,
                });
                Outcome::Ok
            }
            Transaction::Failed { .. } => Outcome::Fail,
        }
    }

    /// Reserve and stage in one step, answering the new actor's address
    pub fn create(&self, behavior: Value, env: Env, name: &str) -> Value {
        let id = self.reserve();
        self.init(id, name, behavior, env);
        Value::Actor(id)
    }

    /// Buffer a send; a target that is not an actor fails the transaction
    pub fn send(&self, message: Value, target: Value, delay: Option<Millis>) -> Outcome {
        let Some(target) = target.as_actor() else {
            return self.throw(Value::pair(Value::symbol("not-an-actor"), target));
        };
        match &mut *self.xact.borrow_mut() {
            Transaction::Accumulating { sends, .. } => {
                sends.push(PendingSend {
                    message,
                    target,
                    delay,
                });
                Outcome::Ok
            }
            Transaction::Failed { .. } => Outcome::Fail,
        }
    }

    /// Buffer a global definition
    pub fn define(&self, ident: Rc<str>, value: Value) -> Outcome {
        match &mut *self.xact.borrow_mut() {
            Transaction::Accumulating { defines, .. } => {
                defines.push((ident, value));
                Outcome::Ok
            }
            Transaction::Failed { .. } => Outcome::Fail,
        }
    }

    /// Fail the transaction; only the first exception is kept
    pub fn throw(&self, exception: Value) -> Outcome {
        let mut xact = self.xact.borrow_mut();
        if let Transaction::Accumulating { .. } = &*xact {
            tracing::trace!(%exception, "transaction failed");
            *xact = Transaction::Failed { exception };
        }
        Outcome::Fail
    }

    /// Whether a `throw` has happened
    pub fn is_failed(&self) -> bool {
        matches!(&*self.xact.borrow(), Transaction::Failed { .. })
    }

    /// Take the buffered effects; empty if the transaction failed
    pub fn commit(&self) -> Commit {
        match &mut *self.xact.borrow_mut() {
            Transaction::Accumulating {
                sends,
                staged,
                defines,
            } => Commit {
                sends: mem::take(sends),
                created: mem::take(staged),
                defines: mem::take(defines),
            },
            Transaction::Failed { .. } => Commit::default(),
        }
    }

    /// Discard the buffered effects, answering the exception if any
    pub fn revert(&self) -> Option<Value> {
        match &mut *self.xact.borrow_mut() {
            Transaction::Accumulating {
                sends,
                staged,
                defines,
            } => {
                sends.clear();
                staged.clear();
                defines.clear();
                None
            }
            Transaction::Failed { exception } => Some(exception.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_in_issue_order() {
        let sponsor = Sponsor::new(IdSource::new());
        let a = Value::Actor(ActorId(10));
        assert_eq!(sponsor.send(1.into(), a.clone(), None), Outcome::Ok);
        assert_eq!(sponsor.send(2.into(), a.clone(), Some(5)), Outcome::Ok);
        let created = sponsor.create(Value::Nil, Env::empty(), "new");

        let commit = sponsor.commit();
        let messages: Vec<Value> = commit.sends.iter().map(|s| s.message.clone()).collect();
        assert_eq!(messages, vec![Value::Number(1), Value::Number(2)]);
        assert_eq!(commit.sends[1].delay, Some(5));
        assert_eq!(commit.created.len(), 1);
        assert_eq!(Value::Actor(commit.created[0].id), created);
        assert!(sponsor.commit().is_empty());
    }

    #[test]
    fn test_throw_latches_first_exception() {
        let sponsor = Sponsor::new(IdSource::new());
        sponsor.send(1.into(), Value::Actor(ActorId(1)), None);

        assert_eq!(sponsor.throw(Value::symbol("first")), Outcome::Fail);
        assert_eq!(sponsor.throw(Value::symbol("second")), Outcome::Fail);
        assert!(sponsor.is_failed());

        assert_eq!(sponsor.send(2.into(), Value::Actor(ActorId(1)), None), Outcome::Fail);
        assert!(sponsor.commit().is_empty());
        assert_eq!(sponsor.revert(), Some(Value::symbol("first")));
    }

    #[test]
    fn test_failed_sponsor_hands_out_placeholders() {
        let ids = IdSource::new();
        let sponsor = Sponsor::new(ids.clone());
        sponsor.throw(Value::Nil);

        let placeholder = sponsor.create(Value::Nil, Env::empty(), "new");
        assert!(matches!(placeholder, Value::Actor(_)));
        assert_eq!(sponsor.init(ActorId(99), "x", Value::Nil, Env::empty()), Outcome::Fail);
        assert!(sponsor.commit().created.is_empty());
        assert_eq!(ids.issued(), 1);
    }

    #[test]
    fn test_send_to_non_actor_fails() {
        let sponsor = Sponsor::new(IdSource::new());
        assert_eq!(sponsor.send(1.into(), Value::Number(3), None), Outcome::Fail);
        assert_eq!(
            sponsor.revert(),
            Some(Value::pair(Value::symbol("not-an-actor"), 3))
        );
    }

    #[test]
    fn test_defines_follow_the_transaction() {
        let sponsor = Sponsor::new(IdSource::new());
        assert_eq!(sponsor.define(Rc::from("x"), Value::Number(7)), Outcome::Ok);
        let commit = sponsor.commit();
        assert_eq!(commit.defines, vec![(Rc::<str>::from("x"), Value::Number(7))]);
        assert!(!commit.is_empty());

        let sponsor = Sponsor::new(IdSource::new());
        sponsor.define(Rc::from("y"), Value::Nil);
        sponsor.throw(Value::symbol("abort"));
        assert_eq!(sponsor.define(Rc::from("z"), Value::Nil), Outcome::Fail);
        assert!(sponsor.commit().defines.is_empty());
    }

    #[test]
    fn test_revert_discards() {
        let sponsor = Sponsor::new(IdSource::new());
        sponsor.send(1.into(), Value::Actor(ActorId(1)), None);
        assert_eq!(sponsor.revert(), None);
        assert!(sponsor.commit().is_empty());
    }
}
