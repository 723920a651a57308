//! Humus actors
//!
//! A `HumusActor` holds a behavior value and the environment it was created
//! in. Each delivered message becomes one transaction: the behavior is
//! applied to the message, the resulting block runs against a fresh
//! `Sponsor`, and the monitor step either commits the buffered effects to
//! the configuration or throws them away.
//!
//! Messages are handled strictly one at a time. A delivery that suspends
//! on an unbound variable keeps the actor busy; later messages queue behind
//! it until a wake-up lets it finish.

use crate::{apply, Commit, Env, EvalContext, Outcome, Sponsor, Task, Value};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use humus_core::{ActorId, Behavior, Configuration, Context, Millis};
use std::collections::VecDeque;
use std::task::Poll;

/// Where committed effects go
///
/// Both the per-delivery `Context` and the configuration itself can take
/// them, so host-side evaluation commits the same way actors do.
pub(crate) trait Host {
    fn create_reserved(&mut self, id: ActorId, actor: HumusActor, name: &str)
        -> humus_core::Result<()>;
    fn send(&mut self, message: Value, target: ActorId) -> humus_core::Result<()>;
    fn send_after(&mut self, delay: Millis, message: Value, target: ActorId)
        -> humus_core::Result<()>;
}

impl Host for Context<'_, Value> {
    fn create_reserved(
        &mut self,
        id: ActorId,
        actor: HumusActor,
        name: &str,
    ) -> humus_core::Result<()> {
        Context::create_reserved(self, id, actor, name)
    }

    fn send(&mut self, message: Value, target: ActorId) -> humus_core::Result<()> {
        Context::send(self, message, target)
    }

    fn send_after(
        &mut self,
        delay: Millis,
        message: Value,
        target: ActorId,
    ) -> humus_core::Result<()> {
        Context::send_after(self, delay, message, target)
    }
}

impl Host for Configuration<Value> {
    fn create_reserved(
        &mut self,
        id: ActorId,
        actor: HumusActor,
        name: &str,
    ) -> humus_core::Result<()> {
        Configuration::create_reserved(self, id, actor, name)
    }

    fn send(&mut self, message: Value, target: ActorId) -> humus_core::Result<()> {
        Configuration::send(self, message, target)
    }

    fn send_after(
        &mut self,
        delay: Millis,
        message: Value,
        target: ActorId,
    ) -> humus_core::Result<()> {
        Configuration::send_after(self, delay, message, target)
    }
}

/// Register staged actors, then release sends in the order they were issued
///
/// Answers the `(sends, created)` summary used in trace tuples.
pub(crate) fn flush(host: &mut impl Host, commit: Commit, logger: Option<ActorId>) -> Value {
    let created = Value::list(commit.created.iter().map(|a| Value::Actor(a.id)));
    let sent = Value::list(
        commit
            .sends
            .iter()
            .map(|s| Value::pair(s.message.clone(), Value::Actor(s.target))),
    );

    for staged in commit.created {
        let actor = HumusActor::new(staged.behavior, staged.env, logger);
        if let Err(err) = host.create_reserved(staged.id, actor, &staged.name) {
            tracing::warn!(%err, "staged actor not registered");
        }
    }
    for send in commit.sends {
        let result = match send.delay {
            Some(delay) => host.send_after(delay, send.message, send.target),
            None => host.send(send.message, send.target),
        };
        if let Err(err) = result {
            tracing::warn!(%err, "committed send dropped");
        }
    }
    Value::pair(sent, created)
}

/// Apply `behavior` to `message` and run the resulting block as actor `id`
///
/// With `export` the block's declared variables become global definitions
/// when the transaction commits.
pub(crate) fn deliver(
    behavior: Value,
    env: Env,
    id: ActorId,
    message: Value,
    export: bool,
    cx: EvalContext,
) -> LocalBoxFuture<'static, Outcome> {
    async move {
        match apply(behavior, message, cx.clone()).await {
            Value::Block(block) if export => block.exec_exported(Env::actor(id, env), cx).await,
            Value::Block(block) => block.exec(Env::actor(id, env), cx).await,
            other => {
                tracing::debug!(%id, result = %other, "behavior did not produce a block");
                cx.sponsor().throw(Value::symbol("behavior-block-required"))
            }
        }
    }
    .boxed_local()
}

/// A message in progress
struct Delivery {
    message: Value,
    sponsor: Sponsor,
    task: Task<Outcome>,
}

/// An actor programmed in Humus
pub struct HumusActor {
    behavior: Value,
    env: Env,
    /// Receives an `(action, result)` tuple per transaction
    logger: Option<ActorId>,
    /// Copy committed block variables into the global environment
    export: bool,
    current: Option<Delivery>,
    pending: VecDeque<Value>,
}

impl HumusActor {
    /// An actor with `behavior`, created in `env`
    pub fn new(behavior: Value, env: Env, logger: Option<ActorId>) -> Self {
        Self {
            behavior,
            env,
            logger,
            export: false,
            current: None,
            pending: VecDeque::new(),
        }
    }

    /// The top-level actor
    ///
    /// Every message is a block, run as is. What the block declares is
    /// defined in `env`'s global dictionary once the transaction commits.
    pub fn repl(env: Env, logger: Option<ActorId>) -> Self {
        let identity = Value::native("repl", |message| message.clone());
        Self {
            export: true,
            ..Self::new(identity, env, logger)
        }
    }

    /// Current behavior
    pub fn behavior(&self) -> &Value {
        &self.behavior
    }

    /// Whether a delivery is suspended
    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// Messages waiting behind the current delivery
    pub fn backlog(&self) -> usize {
        self.pending.len()
    }

    fn start(&self, ctx: &Context<'_, Value>, message: Value) -> Delivery {
        let id = ctx.self_id();
        let sponsor = Sponsor::new(ctx.ids().clone());
        let cx = EvalContext::new(sponsor.clone(), ctx.now());
        let trampoline = cx.trampoline().clone();
        let future = deliver(
            self.behavior.clone(),
            self.env.clone(),
            id,
            message.clone(),
            self.export,
            cx,
        );
        Delivery {
            message,
            sponsor,
            task: Task::new(id, ctx.wakeups().clone(), trampoline, future),
        }
    }

    /// Run deliveries until one suspends or the backlog is empty
    fn drain(&mut self, ctx: &mut Context<'_, Value>) {
        loop {
            let mut delivery = match self.current.take() {
                Some(delivery) => delivery,
                None => match self.pending.pop_front() {
                    Some(message) => self.start(ctx, message),
                    None => return,
                },
            };
            match delivery.task.poll() {
                Poll::Ready(outcome) => self.settle(ctx, delivery, outcome),
                Poll::Pending => {
                    tracing::trace!(id = %ctx.self_id(), backlog = self.pending.len(), "delivery suspended");
                    self.current = Some(delivery);
                    return;
                }
            }
        }
    }

    /// Commit or revert a finished delivery and report it to the logger
    fn settle(&mut self, ctx: &mut Context<'_, Value>, delivery: Delivery, outcome: Outcome) {
        let Delivery {
            message, sponsor, ..
        } = delivery;
        let id = ctx.self_id();

        let result = if outcome != Outcome::Fail && !sponsor.is_failed() {
            if let Outcome::Become(behavior) = outcome {
                self.behavior = behavior;
            }
            let mut commit = sponsor.commit();
            tracing::debug!(%id, sends = commit.sends.len(), created = commit.created.len(), "commit");
            for (ident, value) in commit.defines.drain(..) {
                self.env.define(&ident, value);
            }
            flush(ctx, commit, self.logger)
        } else {
            let exception = sponsor.revert().unwrap_or_default();
            tracing::warn!(%id, %message, %exception, "transaction reverted");
            Value::pair(Value::symbol("exception"), exception)
        };

        if let Some(logger) = self.logger {
            let trace = Value::pair(Value::pair(message, Value::Actor(id)), result);
            if let Err(err) = ctx.send(trace, logger) {
                tracing::warn!(%err, "trace not delivered");
            }
        }
    }
}

impl Behavior<Value> for HumusActor {
    fn receive(&mut self, ctx: &mut Context<'_, Value>, message: Value) {
        self.pending.push_back(message);
        self.drain(ctx);
    }

    fn resume(&mut self, ctx: &mut Context<'_, Value>) {
        self.drain(ctx);
    }
}
