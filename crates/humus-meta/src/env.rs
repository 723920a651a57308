//! Environment chains
//!
//! An `Env` is a persistent chain of frames. Lookup walks the chain to the
//! first frame that knows the identifier; the terminal empty frame answers
//! `?`. Only two kinds of frame accept bindings:
//!
//! - dynamic layers, which grow their own chain of binding nodes
//! - block layers, which fill slots declared when the block started
//!
//! The global dictionary at the top of a session refuses binds; it changes
//! through `define` only, once a transaction has committed. Every other
//! frame forwards a bind to its parent.

use crate::Value;
use humus_core::ActorId;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::mem;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Persistent environment handle
#[derive(Clone)]
pub struct Env(Rc<Frame>);

enum Frame {
    Empty,
    Binding {
        ident: Rc<str>,
        value: Value,
        next: Env,
    },
    Dynamic {
        /// Newest binding node; equals `base` while the layer is empty
        head: RefCell<Env>,
        base: Env,
    },
    Block {
        slots: RefCell<Vec<Rc<Slot>>>,
        next: Env,
        /// Environment the block executes in; answers `SELF`
        denv: Env,
    },
    Actor {
        id: ActorId,
        next: Env,
    },
    Global {
        dict: RefCell<IndexMap<Rc<str>, Value>>,
        next: Env,
    },
}

impl Frame {
    /// Move the parent links out, leaving empty environments in their place
    fn unlink(&mut self, out: &mut Vec<Env>) {
        match self {
            Frame::Empty => {}
            Frame::Binding { next, .. } | Frame::Actor { next, .. } | Frame::Global { next, .. } => {
                out.push(mem::take(next));
            }
            Frame::Dynamic { head, base } => {
                out.push(mem::take(head.get_mut()));
                out.push(mem::take(base));
            }
            Frame::Block { next, denv, .. } => {
                out.push(mem::take(next));
                out.push(mem::take(denv));
            }
        }
    }
}

// Long chains are released one frame at a time instead of recursively.
impl Drop for Frame {
    fn drop(&mut self) {
        if let Frame::Empty = self {
            return;
        }
        let mut parents = Vec::new();
        self.unlink(&mut parents);
        while let Some(env) = parents.pop() {
            if let Ok(mut frame) = Rc::try_unwrap(env.0) {
                frame.unlink(&mut parents);
            }
        }
    }
}

/// A declared identifier, bound at most once
struct Slot {
    ident: Rc<str>,
    state: RefCell<SlotState>,
}

enum SlotState {
    Unbound { waiting: Vec<Waker> },
    Bound(Value),
}

impl Slot {
    fn new(ident: Rc<str>) -> Self {
        Self {
            ident,
            state: RefCell::new(SlotState::Unbound {
                waiting: Vec::new(),
            }),
        }
    }

    /// Bind the slot, releasing queued lookups in arrival order
    fn bind(&self, value: Value) -> bool {
        let waiting = {
            let mut state = self.state.borrow_mut();
            if let SlotState::Bound(current) = &*state {
                return *current == value;
            }
            match std::mem::replace(&mut *state, SlotState::Bound(value)) {
                SlotState::Unbound { waiting } => waiting,
                SlotState::Bound(_) => Vec::new(),
            }
        };
        tracing::trace!(ident = %self.ident, released = waiting.len(), "slot bound");
        for waker in waiting {
            waker.wake();
        }
        true
    }
}

/// Future for a lookup parked on an unbound slot
struct SlotWait {
    slot: Rc<Slot>,
}

impl Future for SlotWait {
    type Output = Value;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Value> {
        let mut state = self.slot.state.borrow_mut();
        match &mut *state {
            SlotState::Bound(value) => Poll::Ready(value.clone()),
            SlotState::Unbound { waiting } => {
                if !waiting.iter().any(|w| w.will_wake(cx.waker())) {
                    waiting.push(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}

enum Step {
    Found(Value),
    Wait(Rc<Slot>),
    Next(Env),
}

impl Env {
    fn from_frame(frame: Frame) -> Self {
        Env(Rc::new(frame))
    }

    /// The empty environment
    pub fn empty() -> Self {
        Self::from_frame(Frame::Empty)
    }

    /// A mutable dictionary on top of `next`
    pub fn global(next: Env) -> Self {
        Self::from_frame(Frame::Global {
            dict: RefCell::new(IndexMap::new()),
            next,
        })
    }

    /// A fresh, empty binding layer on top of `base`
    pub fn dynamic(base: Env) -> Self {
        Self::from_frame(Frame::Dynamic {
            head: RefCell::new(base.clone()),
            base,
        })
    }

    /// A block layer declaring `vars` as unbound slots
    ///
    /// Lookups continue in `captured`; `SELF` resolves through `denv`.
    pub fn block(captured: Env, denv: Env, vars: &[Rc<str>]) -> Self {
        let slots = vars.iter().map(|v| Rc::new(Slot::new(v.clone()))).collect();
        Self::from_frame(Frame::Block {
            slots: RefCell::new(slots),
            next: captured,
            denv,
        })
    }

    /// A frame naming the actor that `SELF` refers to
    pub fn actor(id: ActorId, next: Env) -> Self {
        Self::from_frame(Frame::Actor { id, next })
    }

    /// Look up an identifier
    ///
    /// Never fails: an unknown identifier is `?`. The only way this future
    /// stays pending is a declared block variable that has no value yet.
    pub async fn lookup(&self, ident: &str) -> Value {
        let mut env = self.clone();
        loop {
            match env.step(ident) {
                Step::Found(value) => return value,
                Step::Wait(slot) => {
                    tracing::trace!(ident, "lookup waits on unbound slot");
                    return SlotWait { slot }.await;
                }
                Step::Next(next) => env = next,
            }
        }
    }

    fn step(&self, ident: &str) -> Step {
        match &*self.0 {
            Frame::Empty => {
                tracing::debug!(ident, "unbound identifier");
                Step::Found(Value::Undefined)
            }
            Frame::Binding {
                ident: name,
                value,
                next,
            } => {
                if &**name == ident {
                    Step::Found(value.clone())
                } else {
                    Step::Next(next.clone())
                }
            }
            Frame::Dynamic { head, .. } => Step::Next(head.borrow().clone()),
            Frame::Block { slots, next, .. } => {
                let slot = slots.borrow().iter().find(|s| &*s.ident == ident).cloned();
                let Some(slot) = slot else {
                    return Step::Next(next.clone());
                };
                let bound = match &*slot.state.borrow() {
                    SlotState::Bound(value) => Some(value.clone()),
                    SlotState::Unbound { .. } => None,
                };
                match bound {
                    Some(value) => Step::Found(value),
                    None => Step::Wait(slot),
                }
            }
            Frame::Actor { next, .. } => Step::Next(next.clone()),
            Frame::Global { dict, next } => match dict.borrow().get(ident) {
                Some(value) => Step::Found(value.clone()),
                None => Step::Next(next.clone()),
            },
        }
    }

    /// Bind an identifier, answering the environment or `None` on conflict
    ///
    /// Rebinding to an equal value succeeds without change.
    pub fn bind(&self, ident: &Rc<str>, value: Value) -> Option<Env> {
        let mut env = self.clone();
        loop {
            let next = match &*env.0 {
                Frame::Empty => {
                    tracing::trace!(%ident, "bind refused by empty frame");
                    return None;
                }
                Frame::Dynamic { head, base } => {
                    if let Some(current) = Self::layer_value(&head.borrow(), base, ident) {
                        return (current == value).then(|| self.clone());
                    }
                    let mut head = head.borrow_mut();
                    *head = Self::from_frame(Frame::Binding {
                        ident: ident.clone(),
                        value,
                        next: (*head).clone(),
                    });
                    return Some(self.clone());
                }
                Frame::Block { slots, next, .. } => {
                    let slot = slots.borrow().iter().find(|s| s.ident == *ident).cloned();
                    match slot {
                        Some(slot) => return slot.bind(value).then(|| self.clone()),
                        None => next.clone(),
                    }
                }
                Frame::Global { .. } => {
                    tracing::trace!(%ident, "bind refused by global frame");
                    return None;
                }
                Frame::Binding { next, .. } | Frame::Actor { next, .. } => next.clone(),
            };
            env = next;
        }
    }

    /// Value bound by the layer between `head` and `base`, if any
    fn layer_value(head: &Env, base: &Env, ident: &str) -> Option<Value> {
        let mut node = head.clone();
        while !node.ptr_eq(base) {
            let next = match &*node.0 {
                Frame::Binding {
                    ident: name,
                    value,
                    next,
                } => {
                    if &**name == ident {
                        return Some(value.clone());
                    }
                    next.clone()
                }
                _ => return None,
            };
            node = next;
        }
        None
    }

    /// Declare an unbound slot on the nearest block layer
    pub fn declare(&self, ident: &Rc<str>) -> bool {
        let mut env = self.clone();
        loop {
            let next = match &*env.0 {
                Frame::Block { slots, .. } => {
                    slots.borrow_mut().push(Rc::new(Slot::new(ident.clone())));
                    return true;
                }
                Frame::Empty => return false,
                Frame::Dynamic { base, .. } => base.clone(),
                Frame::Binding { next, .. }
                | Frame::Actor { next, .. }
                | Frame::Global { next, .. } => next.clone(),
            };
            env = next;
        }
    }

    /// Set a name in the nearest global dictionary
    pub fn define(&self, ident: &str, value: Value) -> bool {
        let mut env = self.clone();
        loop {
            let next = match &*env.0 {
                Frame::Global { dict, .. } => {
                    dict.borrow_mut().insert(Rc::from(ident), value);
                    return true;
                }
                Frame::Empty => return false,
                Frame::Dynamic { base, .. } => base.clone(),
                Frame::Block { next, .. }
                | Frame::Binding { next, .. }
                | Frame::Actor { next, .. } => next.clone(),
            };
            env = next;
        }
    }

    /// The actor `SELF` refers to here
    pub fn self_id(&self) -> Option<ActorId> {
        let mut env = self.clone();
        loop {
            let next = match &*env.0 {
                Frame::Actor { id, .. } => return Some(*id),
                Frame::Empty => return None,
                Frame::Block { denv, .. } => denv.clone(),
                Frame::Dynamic { base, .. } => base.clone(),
                Frame::Binding { next, .. } | Frame::Global { next, .. } => next.clone(),
            };
            env = next;
        }
    }

    /// Whether both handles name the same frame
    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.0 {
            Frame::Empty => "empty",
            Frame::Binding { .. } => "binding",
            Frame::Dynamic { .. } => "dynamic",
            Frame::Block { .. } => "block",
            Frame::Actor { .. } => "actor",
            Frame::Global { .. } => "global",
        };
        write!(f, "Env({})", kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;
    use futures::FutureExt;

    fn ident(s: &str) -> Rc<str> {
        Rc::from(s)
    }

    fn lookup_now(env: &Env, name: &str) -> Option<Value> {
        env.lookup(name).now_or_never()
    }

    #[test]
    fn test_empty_answers_undefined() {
        let env = Env::empty();
        assert_eq!(lookup_now(&env, "x"), Some(Value::Undefined));
        assert!(env.bind(&ident("x"), Value::Nil).is_none());
    }

    #[test]
    fn test_dynamic_layer_extends() {
        let base = Env::dynamic(Env::empty());
        base.bind(&ident("x"), Value::Number(1)).unwrap();

        let layer = Env::dynamic(base.clone());
        layer.bind(&ident("x"), Value::Number(2)).unwrap();
        layer.bind(&ident("y"), Value::Number(3)).unwrap();

        assert_eq!(lookup_now(&layer, "x"), Some(Value::Number(2)));
        assert_eq!(lookup_now(&layer, "y"), Some(Value::Number(3)));
        // the parent layer is untouched
        assert_eq!(lookup_now(&base, "x"), Some(Value::Number(1)));
        assert_eq!(lookup_now(&base, "y"), Some(Value::Undefined));
    }

    #[test]
    fn test_dynamic_rebind_is_idempotent() {
        let layer = Env::dynamic(Env::empty());
        let pair = || Value::pair(1, Value::symbol("a"));

        assert!(layer.bind(&ident("p"), pair()).is_some());
        assert!(layer.bind(&ident("p"), pair()).is_some());
        assert!(layer.bind(&ident("p"), Value::pair(1, 2)).is_none());
        assert_eq!(lookup_now(&layer, "p"), Some(pair()));
    }

    #[test]
    fn test_slot_waits_until_bound() {
        let outer = Env::dynamic(Env::empty());
        let block = Env::block(outer, Env::actor(ActorId(5), Env::empty()), &[ident("x")]);

        let mut first = Box::pin(block.lookup("x"));
        let mut second = Box::pin(block.lookup("x"));
        let mut cx = Context::from_waker(noop_waker_ref());
        assert!(first.as_mut().poll(&mut cx).is_pending());
        assert!(second.as_mut().poll(&mut cx).is_pending());

        assert!(block.bind(&ident("x"), Value::Number(9)).is_some());
        assert_eq!(first.as_mut().poll(&mut cx), Poll::Ready(Value::Number(9)));
        assert_eq!(second.as_mut().poll(&mut cx), Poll::Ready(Value::Number(9)));
    }

    #[test]
    fn test_slot_rebind_requires_equality() {
        let block = Env::block(Env::empty(), Env::empty(), &[ident("x")]);
        assert!(block.bind(&ident("x"), Value::tuple([1.into(), 2.into()])).is_some());
        assert!(block.bind(&ident("x"), Value::tuple([1.into(), 2.into()])).is_some());
        assert!(block.bind(&ident("x"), Value::Number(1)).is_none());
    }

    #[test]
    fn test_block_forwards_undeclared_binds() {
        let outer = Env::dynamic(Env::empty());
        let block = Env::block(outer.clone(), Env::empty(), &[]);
        assert!(block.bind(&ident("z"), Value::TRUE).is_some());
        assert_eq!(lookup_now(&outer, "z"), Some(Value::TRUE));
    }

    #[test]
    fn test_global_refuses_bind() {
        let global = Env::global(Env::empty());
        let block = Env::block(global.clone(), global.clone(), &[]);
        assert!(block.bind(&ident("z"), Value::TRUE).is_none());
        assert_eq!(lookup_now(&global, "z"), Some(Value::Undefined));
        assert!(global.define("z", Value::TRUE));
        assert_eq!(lookup_now(&global, "z"), Some(Value::TRUE));
    }

    #[test]
    fn test_declare_adds_slot() {
        let block = Env::block(Env::empty(), Env::empty(), &[]);
        let layer = Env::dynamic(block.clone());
        assert!(layer.declare(&ident("late")));
        assert!(lookup_now(&block, "late").is_none());
        assert!(!Env::empty().declare(&ident("late")));
    }

    #[test]
    fn test_self_id_through_block() {
        let actor = Env::actor(ActorId(3), Env::empty());
        let captured = Env::dynamic(Env::empty());
        let block = Env::block(captured.clone(), actor, &[]);
        assert_eq!(block.self_id(), Some(ActorId(3)));
        assert_eq!(captured.self_id(), None);
    }

    #[test]
    fn test_define_global() {
        let global = Env::global(Env::empty());
        let layer = Env::dynamic(global.clone());
        assert!(layer.define("answer", Value::Number(42)));
        assert_eq!(lookup_now(&layer, "answer"), Some(Value::Number(42)));
        assert!(!Env::empty().define("answer", Value::Nil));
    }

    #[test]
    fn test_deep_chain_lookup() {
        let mut env = Env::empty();
        for i in 0..500 {
            env = Env::dynamic(env);
            env.bind(&ident(&format!("v{i}")), Value::Number(i)).unwrap();
        }
        assert_eq!(lookup_now(&env, "v0"), Some(Value::Number(0)));
        assert_eq!(lookup_now(&env, "v499"), Some(Value::Number(499)));
    }

    #[test]
    fn test_long_chain_drops() {
        let mut env = Env::global(Env::empty());
        for i in 0..200_000 {
            env = Env::dynamic(env);
            env.bind(&ident("v"), Value::Number(i)).unwrap();
        }
        let shared = env.clone();
        drop(env);
        assert_eq!(lookup_now(&shared, "v"), Some(Value::Number(199_999)));
        drop(shared);
    }
}
