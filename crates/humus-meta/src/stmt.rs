//! Statements
//!
//! Statements run inside a transaction. Their effects (sends, creations)
//! go to the delivery's `Sponsor`; their result says whether the block
//! finished, failed, or asked for a new behavior.

use crate::value::Block;
use crate::{Env, Equation, EvalContext, Expr, Pattern, Value};
use futures::future::{self, Either, LocalBoxFuture};
use futures::FutureExt;
use std::rc::Rc;

/// Result of executing a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Outcome {
    #[default]
    Ok,
    /// The transaction has failed; the sponsor holds the exception
    Fail,
    /// Finished, and the actor should switch to this behavior
    Become(Value),
}

/// A statement
#[derive(Debug)]
pub enum Stmt {
    Empty,
    /// Both sides run concurrently
    Seq(Rc<Stmt>, Rc<Stmt>),
    /// `DEF ptrn = expr`
    Def(Rc<Pattern>, Rc<Expr>),
    /// `LET eqtn`
    Let(Equation),
    /// `SEND message TO target`, or `AFTER delay SEND ...`
    Send {
        message: Rc<Expr>,
        target: Rc<Expr>,
        delay: Option<Rc<Expr>>,
    },
    /// `CREATE ident WITH behavior`
    Create(Rc<str>, Rc<Expr>),
    Become(Rc<Expr>),
    Throw(Rc<Expr>),
    /// An expression; a block result is executed in place
    Expr(Rc<Expr>),
}

impl Stmt {
    /// A statement that does nothing
    pub fn empty() -> Rc<Self> {
        Rc::new(Stmt::Empty)
    }

    /// Sequence of statements; empty is `Empty`
    pub fn seq(mut stmts: Vec<Rc<Stmt>>) -> Rc<Self> {
        let Some(mut acc) = stmts.pop() else {
            return Stmt::empty();
        };
        while let Some(stmt) = stmts.pop() {
            acc = Rc::new(Stmt::Seq(stmt, acc));
        }
        acc
    }

    /// `DEF ptrn = expr`
    pub fn def(ptrn: Rc<Pattern>, expr: Rc<Expr>) -> Rc<Self> {
        Rc::new(Stmt::Def(ptrn, expr))
    }

    /// `LET eqtn`
    pub fn let_(eqtn: Equation) -> Rc<Self> {
        Rc::new(Stmt::Let(eqtn))
    }

    /// `SEND message TO target`
    pub fn send(message: Rc<Expr>, target: Rc<Expr>) -> Rc<Self> {
        Rc::new(Stmt::Send {
            message,
            target,
            delay: None,
        })
    }

    /// `AFTER delay SEND message TO target`
    pub fn send_after(delay: Rc<Expr>, message: Rc<Expr>, target: Rc<Expr>) -> Rc<Self> {
        Rc::new(Stmt::Send {
            message,
            target,
            delay: Some(delay),
        })
    }

    /// `CREATE ident WITH behavior`
    pub fn create(ident: &str, behavior: Rc<Expr>) -> Rc<Self> {
        Rc::new(Stmt::Create(Rc::from(ident), behavior))
    }

    /// `BECOME behavior`
    pub fn become_(behavior: Rc<Expr>) -> Rc<Self> {
        Rc::new(Stmt::Become(behavior))
    }

    /// `THROW exception`
    pub fn throw(exception: Rc<Expr>) -> Rc<Self> {
        Rc::new(Stmt::Throw(exception))
    }

    /// An expression statement
    pub fn expr(expr: Rc<Expr>) -> Rc<Self> {
        Rc::new(Stmt::Expr(expr))
    }

    /// Identifiers bound at this level, not counting nested blocks
    pub fn declared(&self) -> Vec<Rc<str>> {
        let mut out = Vec::new();
        self.collect_declared(&mut out);
        out
    }

    fn collect_declared(&self, out: &mut Vec<Rc<str>>) {
        match self {
            Stmt::Seq(first, second) => {
                first.collect_declared(out);
                second.collect_declared(out);
            }
            Stmt::Def(ptrn, _) => ptrn.idents(out),
            Stmt::Let(eqtn) => eqtn.idents(out),
            Stmt::Create(ident, _) => {
                if !out.contains(ident) {
                    out.push(ident.clone());
                }
            }
            Stmt::Empty
            | Stmt::Send { .. }
            | Stmt::Become(_)
            | Stmt::Throw(_)
            | Stmt::Expr(_) => {}
        }
    }

    /// Execute in `env`, recording effects on the context's sponsor
    pub fn exec(self: &Rc<Self>, env: Env, cx: EvalContext) -> LocalBoxFuture<'static, Outcome> {
        let this = self.clone();
        cx.nest(move |cx| Stmt::run(this, env, cx))
    }

    fn run(this: Rc<Self>, env: Env, cx: EvalContext) -> LocalBoxFuture<'static, Outcome> {
        async move {
            let sponsor = cx.sponsor().clone();
            match &*this {
                Stmt::Empty => Outcome::Ok,
                Stmt::Seq(first, second) => {
                    let first = first.exec(env.clone(), cx.clone());
                    let second = second.exec(env, cx);
                    // a failed side settles the sequence without waiting on the other
                    let (a, b) = match future::select(first, second).await {
                        Either::Left((Outcome::Fail, _)) | Either::Right((Outcome::Fail, _)) => {
                            return Outcome::Fail
                        }
                        Either::Left((a, rest)) => (a, rest.await),
                        Either::Right((b, rest)) => (rest.await, b),
                    };
                    match (a, b) {
                        (Outcome::Fail, _) | (_, Outcome::Fail) => Outcome::Fail,
                        (Outcome::Ok, other) | (other, Outcome::Ok) => other,
                        (Outcome::Become(_), Outcome::Become(_)) => {
                            sponsor.throw(Value::symbol("become-conflict"))
                        }
                    }
                }
                Stmt::Def(ptrn, expr) => {
                    let value = expr.eval(env.clone(), cx.clone()).await;
                    match ptrn.matches(value.clone(), env, cx).await {
                        Some(_) => Outcome::Ok,
                        None => sponsor.throw(Value::pair(Value::symbol("mismatch"), value)),
                    }
                }
                Stmt::Let(eqtn) => match eqtn.unify(env, cx).await {
                    Some(_) => Outcome::Ok,
                    None => sponsor.throw(Value::symbol("conflict")),
                },
                Stmt::Send {
                    message,
                    target,
                    delay,
                } => {
                    let delay = match delay {
                        Some(expr) => {
                            let value = expr.eval(env.clone(), cx.clone()).await;
                            match value.as_number().and_then(|n| u64::try_from(n).ok()) {
                                Some(ms) => Some(ms),
                                None => {
                                    return sponsor
                                        .throw(Value::pair(Value::symbol("bad-delay"), value))
                                }
                            }
                        }
                        None => None,
                    };
                    let (target, message) = future::join(
                        target.eval(env.clone(), cx.clone()),
                        message.eval(env, cx),
                    )
                    .await;
                    sponsor.send(message, target, delay)
                }
                Stmt::Create(ident, behavior) => {
                    let id = sponsor.reserve();
                    let Some(env) = env.bind(ident, Value::Actor(id)) else {
                        return sponsor.throw(Value::pair(
                            Value::symbol("conflict"),
                            Value::Symbol(ident.clone()),
                        ));
                    };
                    let behavior = behavior.eval(env.clone(), cx).await;
                    sponsor.init(id, format!("@{}", ident), behavior, env)
                }
                Stmt::Become(behavior) => Outcome::Become(behavior.eval(env, cx).await),
                Stmt::Throw(exception) => {
                    let exception = exception.eval(env, cx).await;
                    sponsor.throw(exception)
                }
                Stmt::Expr(expr) => match expr.eval(env.clone(), cx.clone()).await {
                    Value::Block(block) => block.exec(env, cx).await,
                    _ => Outcome::Ok,
                },
            }
        }
        .boxed_local()
    }
}

impl Block {
    /// Run the block's statements on a fresh layer of its declared variables
    ///
    /// `denv` is the environment the block runs in; it answers `SELF`.
    pub fn exec(self: &Rc<Self>, denv: Env, cx: EvalContext) -> LocalBoxFuture<'static, Outcome> {
        let env = Env::block(self.env.clone(), denv, &self.vars);
        self.stmt.exec(env, cx)
    }

    /// Like `exec`, then stage every declared variable as a global definition
    ///
    /// The definitions reach the global environment only if the transaction
    /// commits.
    pub fn exec_exported(
        self: &Rc<Self>,
        denv: Env,
        cx: EvalContext,
    ) -> LocalBoxFuture<'static, Outcome> {
        let this = self.clone();
        async move {
            let env = Env::block(this.env.clone(), denv, &this.vars);
            let outcome = this.stmt.exec(env.clone(), cx.clone()).await;
            if outcome == Outcome::Fail {
                return outcome;
            }
            for ident in this.vars.iter() {
                match env.lookup(ident).now_or_never() {
                    Some(value) => {
                        cx.sponsor().define(ident.clone(), value);
                    }
                    None => tracing::trace!(%ident, "unbound variable not exported"),
                }
            }
            outcome
        }
        .boxed_local()
    }
}
