//! Expressions
//!
//! Every expression evaluates to exactly one value. Nothing here fails: a
//! mismatch, a missing identifier or applying a non-function answers `?`.
//!
//! Calls in tail position (a closure body, the chosen `CASE` arm, the
//! branch of an `IF` or `LET`) continue in the caller's loop instead of
//! nesting another future. Other nesting is bounded by `EvalContext::nest`.

use crate::value::{Block, Closure};
use crate::{Env, Equation, Pattern, Sponsor, Stmt, Trampoline, Value};
use futures::channel::oneshot;
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use humus_core::Millis;
use std::rc::Rc;

/// Nested evaluations allowed before one is detached onto the trampoline
const MAX_NESTING: usize = 32;

/// What evaluation needs besides the environment
#[derive(Debug, Clone)]
pub struct EvalContext {
    sponsor: Sponsor,
    now: Millis,
    depth: usize,
    trampoline: Trampoline,
}

impl EvalContext {
    /// Context for one transaction at logical time `now`
    pub fn new(sponsor: Sponsor, now: Millis) -> Self {
        Self {
            sponsor,
            now,
            depth: 0,
            trampoline: Trampoline::new(),
        }
    }

    /// Transaction of the current delivery
    pub fn sponsor(&self) -> &Sponsor {
        &self.sponsor
    }

    /// Logical time of the current delivery
    pub fn now(&self) -> Millis {
        self.now
    }

    /// Where over-deep evaluations are detached to; the driving `Task` polls it
    pub fn trampoline(&self) -> &Trampoline {
        &self.trampoline
    }

    /// Run `step` one level deeper
    ///
    /// Past `MAX_NESTING` the step is queued on the trampoline with a fresh
    /// depth and the caller waits on its answer instead. A step whose task
    /// is dropped answers the default.
    pub(crate) fn nest<T, F>(&self, step: F) -> LocalBoxFuture<'static, T>
    where
        T: Default + 'static,
        F: FnOnce(EvalContext) -> LocalBoxFuture<'static, T> + 'static,
    {
        if self.depth < MAX_NESTING {
            return step(EvalContext {
                depth: self.depth + 1,
                ..self.clone()
            });
        }
        let (tx, rx) = oneshot::channel();
        let fresh = EvalContext {
            depth: 0,
            ..self.clone()
        };
        self.trampoline.push(
            async move {
                let _ = tx.send(step(fresh).await);
            }
            .boxed_local(),
        );
        async move { rx.await.unwrap_or_default() }.boxed_local()
    }
}

/// One arm of a `CASE`
#[derive(Debug, Clone)]
pub struct Choice {
    pub ptrn: Rc<Pattern>,
    pub expr: Rc<Expr>,
}

impl Choice {
    /// `ptrn : expr`
    pub fn new(ptrn: Rc<Pattern>, expr: Rc<Expr>) -> Self {
        Self { ptrn, expr }
    }
}

/// An expression
#[derive(Debug)]
pub enum Expr {
    Const(Value),
    Ident(Rc<str>),
    /// `\ptrn.body`
    Abs(Rc<Pattern>, Rc<Expr>),
    /// `func(arg)`
    App(Rc<Expr>, Rc<Expr>),
    Pair(Rc<Expr>, Rc<Expr>),
    /// `CASE subject OF choices END`
    Case(Rc<Expr>, Vec<Choice>),
    /// `IF eqtn expr ELIF ... ELSE otherwise`
    If {
        eqtn: Equation,
        then: Rc<Expr>,
        otherwise: Option<Rc<Expr>>,
    },
    /// `LET eqtn IN body`
    Let(Equation, Rc<Expr>),
    /// `[ stmt ]`; `vars` are the identifiers the block's statements bind
    Block {
        vars: Rc<[Rc<str>]>,
        stmt: Rc<Stmt>,
    },
    Now,
    SelfRef,
    /// `NEW behavior`
    New(Rc<Expr>),
}

impl Expr {
    /// A literal
    pub fn constant(value: impl Into<Value>) -> Rc<Self> {
        Rc::new(Expr::Const(value.into()))
    }

    /// An identifier to look up
    pub fn ident(name: &str) -> Rc<Self> {
        Rc::new(Expr::Ident(Rc::from(name)))
    }

    /// `\ptrn.body`
    pub fn abs(ptrn: Rc<Pattern>, body: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::Abs(ptrn, body))
    }

    /// `func(arg)`
    pub fn app(func: Rc<Expr>, arg: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::App(func, arg))
    }

    /// `head, tail`
    pub fn pair(head: Rc<Expr>, tail: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::Pair(head, tail))
    }

    /// Right-nested tuple; empty is `NIL`
    pub fn tuple(mut items: Vec<Rc<Expr>>) -> Rc<Self> {
        let Some(mut acc) = items.pop() else {
            return Expr::constant(Value::Nil);
        };
        while let Some(item) = items.pop() {
            acc = Expr::pair(item, acc);
        }
        acc
    }

    /// `CASE subject OF choices END`
    pub fn case(subject: Rc<Expr>, choices: Vec<Choice>) -> Rc<Self> {
        Rc::new(Expr::Case(subject, choices))
    }

    /// `IF eqtn then ELSE otherwise`; without `otherwise` a failed match is `?`
    pub fn if_(eqtn: Equation, then: Rc<Expr>, otherwise: Option<Rc<Expr>>) -> Rc<Self> {
        Rc::new(Expr::If {
            eqtn,
            then,
            otherwise,
        })
    }

    /// `LET eqtn IN body`
    pub fn let_in(eqtn: Equation, body: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::Let(eqtn, body))
    }

    /// Block expression; its variables are collected from `stmt`
    pub fn block(stmt: Rc<Stmt>) -> Rc<Self> {
        let vars: Rc<[Rc<str>]> = stmt.declared().into();
        Rc::new(Expr::Block { vars, stmt })
    }

    /// `NOW`
    pub fn now() -> Rc<Self> {
        Rc::new(Expr::Now)
    }

    /// `SELF`
    pub fn self_ref() -> Rc<Self> {
        Rc::new(Expr::SelfRef)
    }

    /// `NEW behavior`
    pub fn new_actor(behavior: Rc<Expr>) -> Rc<Self> {
        Rc::new(Expr::New(behavior))
    }

    /// Evaluate in `env`
    pub fn eval(self: &Rc<Self>, env: Env, cx: EvalContext) -> LocalBoxFuture<'static, Value> {
        let this = self.clone();
        cx.nest(move |cx| {
            async move {
                let (mut expr, mut env) = (this, env);
                loop {
                    let (next, next_env) = match &*expr {
                        Expr::Const(value) => return value.clone(),
                        Expr::Ident(ident) => return env.lookup(ident).await,
                        Expr::Abs(ptrn, body) => {
                            return Value::Closure(Rc::new(Closure {
                                ptrn: ptrn.clone(),
                                body: body.clone(),
                                env,
                            }))
                        }
                        Expr::App(func, arg) => {
                            let (func, arg) = future::join(
                                func.eval(env.clone(), cx.clone()),
                                arg.eval(env, cx.clone()),
                            )
                            .await;
                            let closure = match func {
                                Value::Closure(closure) => closure,
                                other => return apply(other, arg, cx).await,
                            };
                            let layer = Env::dynamic(closure.env.clone());
                            match closure.ptrn.matches(arg, layer, cx.clone()).await {
                                Some(env) => (closure.body.clone(), env),
                                None => return Value::Undefined,
                            }
                        }
                        Expr::Pair(head, tail) => {
                            let (head, tail) = future::join(
                                head.eval(env.clone(), cx.clone()),
                                tail.eval(env, cx),
                            )
                            .await;
                            return Value::pair(head, tail);
                        }
                        Expr::Case(subject, choices) => {
                            let value = subject.eval(env.clone(), cx.clone()).await;
                            let mut chosen = None;
                            for choice in choices {
                                let trial = Env::dynamic(env.clone());
                                if let Some(env) =
                                    choice.ptrn.matches(value.clone(), trial, cx.clone()).await
                                {
                                    chosen = Some((choice.expr.clone(), env));
                                    break;
                                }
                            }
                            match chosen {
                                Some(next) => next,
                                None => {
                                    tracing::trace!(%value, "no choice matched");
                                    return Value::Undefined;
                                }
                            }
                        }
                        Expr::If {
                            eqtn,
                            then,
                            otherwise,
                        } => match eqtn.unify(Env::dynamic(env.clone()), cx.clone()).await {
                            Some(bound) => (then.clone(), bound),
                            None => match otherwise {
                                Some(otherwise) => (otherwise.clone(), env),
                                None => return Value::Undefined,
                            },
                        },
                        Expr::Let(eqtn, body) => {
                            match eqtn.unify(Env::dynamic(env.clone()), cx.clone()).await {
                                Some(bound) => (body.clone(), bound),
                                None => return Value::Undefined,
                            }
                        }
                        Expr::Block { vars, stmt } => {
                            return Value::Block(Rc::new(Block {
                                vars: vars.clone(),
                                stmt: stmt.clone(),
                                env,
                            }))
                        }
                        Expr::Now => return Value::Number(i64::try_from(cx.now()).unwrap_or(i64::MAX)),
                        Expr::SelfRef => return env.self_id().map(Value::Actor).unwrap_or_default(),
                        Expr::New(behavior) => {
                            let behavior = behavior.eval(env.clone(), cx.clone()).await;
                            return cx.sponsor().create(behavior, env, "new");
                        }
                    };
                    expr = next;
                    env = next_env;
                }
            }
            .boxed_local()
        })
    }
}

/// Apply a function value to an argument
///
/// Closures match their parameter on a fresh layer over the captured
/// environment. Anything that is not a function answers `?`.
pub fn apply(func: Value, arg: Value, cx: EvalContext) -> LocalBoxFuture<'static, Value> {
    async move {
        match func {
            Value::Closure(closure) => {
                let layer = Env::dynamic(closure.env.clone());
                match closure.ptrn.matches(arg, layer, cx.clone()).await {
                    Some(env) => closure.body.eval(env, cx).await,
                    None => Value::Undefined,
                }
            }
            Value::Native(native) => native.call(&arg),
            other => {
                tracing::trace!(func = %other, "apply to non-function");
                Value::Undefined
            }
        }
    }
    .boxed_local()
}
