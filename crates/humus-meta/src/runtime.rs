//! Humus runtime
//!
//! `Humus` wires a configuration, the service actors and a global
//! environment together:
//! - `logger` receives one trace tuple per transaction
//! - `println`, `sink`, `timer` and `random` are reachable by name
//! - the native prelude is defined in the global environment
//! - a REPL actor runs top-level statements as transactions
//!
//! Each top-level statement runs as one REPL transaction. The names it
//! binds live in the transaction until it commits; then they are copied into
//! the global environment and visible to everything evaluated afterwards. A
//! reverted statement leaves the globals as they were.

use crate::actor::{flush, HumusActor};
use crate::prelude::{self, Logger, Println, Random, Timer};
use crate::value::Block;
use crate::{Env, Error, EvalContext, Expr, Result, Sponsor, Stmt, Task, Value};
use futures::FutureExt;
use humus_core::{ActorId, Configuration, Settings, Sink, Wakeups};
use std::cell::RefCell;
use std::rc::Rc;
use std::task::Poll;

/// A Humus session
pub struct Humus {
    config: Configuration<Value>,
    global: Env,
    repl: ActorId,
    logger: ActorId,
    output: Rc<RefCell<Vec<String>>>,
    traces: Rc<RefCell<Vec<Value>>>,
}

impl Humus {
    /// Create a session with default settings
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Create a session with custom settings
    pub fn with_settings(settings: Settings) -> Self {
        let seed = settings.seed;
        let mut config = Configuration::with_settings(settings);
        let output = Rc::new(RefCell::new(Vec::new()));
        let traces = Rc::new(RefCell::new(Vec::new()));

        let logger = config.create(Logger::new(traces.clone()), "logger");
        let println = config.create(Println::new(output.clone()), "println");
        let sink = config.create(Sink, "sink");
        let timer = config.create(Timer, "timer");
        let random = config.create(Random::new(seed), "random");

        let global = Env::global(Env::empty());
        for (name, native) in prelude::natives() {
            global.define(name, native);
        }
        global.define("versions", prelude::versions());
        global.define("println", Value::Actor(println));
        global.define("sink", Value::Actor(sink));
        global.define("timer", Value::Actor(timer));
        global.define("random", Value::Actor(random));

        let repl = config.create(HumusActor::repl(global.clone(), Some(logger)), "repl");

        tracing::debug!(%repl, %logger, "humus session ready");
        Self {
            config,
            global,
            repl,
            logger,
            output,
            traces,
        }
    }

    /// Queue top-level statements for the REPL actor
    pub fn execute(&mut self, stmt: Rc<Stmt>) -> Result<()> {
        let block = Value::Block(Rc::new(Block {
            vars: stmt.declared().into(),
            stmt,
            env: self.global.clone(),
        }));
        self.send(block, self.repl)
    }

    /// Send a message from outside the configuration
    pub fn send(&mut self, message: Value, target: ActorId) -> Result<()> {
        Ok(self.config.send(message, target)?)
    }

    /// Set a global name, outside any transaction
    pub fn define(&mut self, ident: &str, value: Value) {
        self.global.define(ident, value);
    }

    /// Read a global name; `?` if it is not defined
    pub fn lookup(&self, ident: &str) -> Value {
        self.global.lookup(ident).now_or_never().unwrap_or_default()
    }

    /// Create an actor running `behavior` in the global environment
    pub fn spawn(&mut self, behavior: Value) -> ActorId {
        let actor = HumusActor::new(behavior, self.global.clone(), Some(self.logger));
        self.config.create(actor, "spawn")
    }

    /// Evaluate an expression in the global environment
    ///
    /// Actors created with `NEW` are registered once evaluation finishes.
    pub fn evaluate(&mut self, expr: &Rc<Expr>) -> Result<Value> {
        let sponsor = Sponsor::new(self.config.ids().clone());
        let cx = EvalContext::new(sponsor.clone(), self.config.now());
        let mut task = Task::new(
            self.repl,
            Wakeups::new(),
            cx.trampoline().clone(),
            expr.eval(self.global.clone(), cx),
        );
        let Poll::Ready(value) = task.poll() else {
            return Err(Error::Suspended);
        };
        flush(&mut self.config, sponsor.commit(), Some(self.logger));
        Ok(value)
    }

    /// Dispatch until quiescent or `limit` deliveries have run
    pub fn run_until_idle(&mut self, limit: usize) -> usize {
        self.config.run_until_idle(limit)
    }

    /// Lines printed through `println`
    pub fn output(&self) -> Vec<String> {
        self.output.borrow().clone()
    }

    /// Trace tuples received by the logger
    pub fn traces(&self) -> Vec<Value> {
        self.traces.borrow().clone()
    }

    /// The underlying configuration
    pub fn configuration(&self) -> &Configuration<Value> {
        &self.config
    }

    /// The underlying configuration, mutably
    pub fn configuration_mut(&mut self) -> &mut Configuration<Value> {
        &mut self.config
    }

    /// The global environment
    pub fn global(&self) -> &Env {
        &self.global
    }

    /// The REPL actor
    pub fn repl(&self) -> ActorId {
        self.repl
    }

    /// The logger actor
    pub fn logger(&self) -> ActorId {
        self.logger
    }
}

impl Default for Humus {
    fn default() -> Self {
        Self::new()
    }
}
