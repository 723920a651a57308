//! Behaviors and the context they run in
//!
//! A behavior is the code an actor runs for each delivered message. While a
//! behavior runs it is taken out of the registry, so it gets exclusive access
//! to its own state and a `Context` for talking to the configuration.

use crate::{ActorId, Configuration, IdSource, Millis, Result};
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

/// How an actor responds to messages
pub trait Behavior<M> {
    /// Handle one delivered message.
    fn receive(&mut self, ctx: &mut Context<'_, M>, message: M);

    /// Continue work parked by an earlier delivery.
    ///
    /// Called when this actor's id is pulled off the configuration's
    /// wake-up queue instead of a message.
    fn resume(&mut self, _ctx: &mut Context<'_, M>) {}
}

/// Behavior built from a closure, see [`from_fn`]
pub struct FromFn<F>(F);

/// Wrap a closure as a behavior.
pub fn from_fn<M, F>(f: F) -> FromFn<F>
where
    F: FnMut(&mut Context<'_, M>, M),
{
    FromFn(f)
}

impl<M, F> Behavior<M> for FromFn<F>
where
    F: FnMut(&mut Context<'_, M>, M),
{
    fn receive(&mut self, ctx: &mut Context<'_, M>, message: M) {
        (self.0)(ctx, message)
    }
}

impl<F> fmt::Debug for FromFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FromFn")
    }
}

/// Accepts and discards every message
#[derive(Debug, Clone, Copy, Default)]
pub struct Sink;

impl<M> Behavior<M> for Sink {
    fn receive(&mut self, _ctx: &mut Context<'_, M>, _message: M) {}
}

/// Queue of actors asking to be resumed.
///
/// Wakers may be invoked from anywhere, so the queue is thread-safe even
/// though a configuration itself is single-threaded.
#[derive(Debug, Clone, Default)]
pub struct Wakeups(Arc<Mutex<VecDeque<ActorId>>>);

impl Wakeups {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for `id` to be resumed on a later dispatch
    pub fn wake(&self, id: ActorId) {
        let mut queue = match self.0.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.push_back(id);
    }

    /// Take the oldest wake-up request
    pub fn pop(&self) -> Option<ActorId> {
        match self.0.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }

    /// Number of outstanding wake-up requests
    pub fn len(&self) -> usize {
        match self.0.lock() {
            Ok(queue) => queue.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Whether no actor is waiting to be resumed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a running behavior can do
///
/// Created by the configuration for exactly one delivery. Sends and
/// creations take effect on the configuration immediately; a replacement
/// behavior installed with [`Context::become_`] only applies to the next
/// delivery.
pub struct Context<'a, M> {
    self_id: ActorId,
    config: &'a mut Configuration<M>,
    replacement: Option<Box<dyn Behavior<M>>>,
}

impl<'a, M: 'static> Context<'a, M> {
    pub(crate) fn new(self_id: ActorId, config: &'a mut Configuration<M>) -> Self {
        Self {
            self_id,
            config,
            replacement: None,
        }
    }

    /// The actor this delivery is addressed to
    pub fn self_id(&self) -> ActorId {
        self.self_id
    }

    /// Current logical time
    pub fn now(&self) -> Millis {
        self.config.now()
    }

    /// Enqueue a message
    pub fn send(&mut self, message: M, target: ActorId) -> Result<()> {
        self.config.send(message, target)
    }

    /// Enqueue a message once `delay` ms of logical time have passed
    pub fn send_after(&mut self, delay: Millis, message: M, target: ActorId) -> Result<()> {
        self.config.send_after(delay, message, target)
    }

    /// Register a new actor
    pub fn create(
        &mut self,
        behavior: impl Behavior<M> + 'static,
        name: impl Into<String>,
    ) -> ActorId {
        self.config.create(behavior, name)
    }

    /// Register an actor under an id reserved earlier from [`Context::ids`]
    pub fn create_reserved(
        &mut self,
        id: ActorId,
        behavior: impl Behavior<M> + 'static,
        name: impl Into<String>,
    ) -> Result<()> {
        self.config.create_reserved(id, behavior, name)
    }

    /// Replace this actor's behavior, starting with its next delivery
    pub fn become_(&mut self, behavior: impl Behavior<M> + 'static) {
        self.replacement = Some(Box::new(behavior));
    }

    /// The configuration's id source
    pub fn ids(&self) -> &IdSource {
        self.config.ids()
    }

    /// The configuration's wake-up queue
    pub fn wakeups(&self) -> &Wakeups {
        self.config.wakeups()
    }

    pub(crate) fn into_replacement(self) -> Option<Box<dyn Behavior<M>>> {
        self.replacement
    }
}
