//! Patterns and unification
//!
//! `matches` checks a pattern against a concrete value. `eq` unifies two
//! patterns; the left side dispatches on its own shape and asks the right
//! side to continue through `bind`, `unify_pair` or `matches`, so it does not
//! matter which operand holds the concrete parts.
//!
//! All of these answer `None` on failure. Bindings made before a failure are
//! left in place, so callers that need all-or-nothing run on a throwaway
//! dynamic layer.

use crate::{Env, EvalContext, Expr, Value};
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use std::rc::Rc;

/// A pattern
#[derive(Debug)]
pub enum Pattern {
    /// `_`
    Any,
    /// Binds an identifier
    Ident(Rc<str>),
    /// Matches an equal value
    Const(Value),
    /// `$expr`: evaluates, then matches like a constant
    Value(Rc<Expr>),
    /// `(head, tail)`
    Pair(Rc<Pattern>, Rc<Pattern>),
    /// `SELF`: the current actor, matched like a constant
    SelfRef,
}

impl Pattern {
    /// `_`
    pub fn any() -> Rc<Self> {
        Rc::new(Pattern::Any)
    }

    /// An identifier to bind
    pub fn ident(name: &str) -> Rc<Self> {
        Rc::new(Pattern::Ident(Rc::from(name)))
    }

    /// A literal the value must equal
    pub fn constant(value: impl Into<Value>) -> Rc<Self> {
        Rc::new(Pattern::Const(value.into()))
    }

    /// `$expr`
    pub fn value(expr: Rc<Expr>) -> Rc<Self> {
        Rc::new(Pattern::Value(expr))
    }

    /// `(head, tail)`
    pub fn pair(head: Rc<Pattern>, tail: Rc<Pattern>) -> Rc<Self> {
        Rc::new(Pattern::Pair(head, tail))
    }

    /// `SELF`
    pub fn self_ref() -> Rc<Self> {
        Rc::new(Pattern::SelfRef)
    }

    /// Right-nested tuple pattern; needs at least one element
    pub fn tuple(mut items: Vec<Rc<Pattern>>) -> Rc<Self> {
        let mut acc = items.pop().unwrap_or_else(|| Pattern::constant(Value::Nil));
        while let Some(item) = items.pop() {
            acc = Pattern::pair(item, acc);
        }
        acc
    }

    /// Identifiers this pattern binds, in first-seen order
    pub fn idents(&self, out: &mut Vec<Rc<str>>) {
        match self {
            Pattern::Ident(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Pattern::Pair(head, tail) => {
                head.idents(out);
                tail.idents(out);
            }
            Pattern::Any | Pattern::Const(_) | Pattern::Value(_) | Pattern::SelfRef => {}
        }
    }

    /// The value a constant-like pattern stands for
    ///
    /// `None` for identifiers, wildcards and pairs.
    fn constant_value(&self, env: &Env, cx: &EvalContext) -> LocalBoxFuture<'static, Option<Value>> {
        match self {
            Pattern::Const(value) => future::ready(Some(value.clone())).boxed_local(),
            Pattern::Value(expr) => expr.eval(env.clone(), cx.clone()).map(Some).boxed_local(),
            Pattern::SelfRef => {
                let id = env.self_id().map(Value::Actor).unwrap_or_default();
                future::ready(Some(id)).boxed_local()
            }
            Pattern::Any | Pattern::Ident(_) | Pattern::Pair(..) => future::ready(None).boxed_local(),
        }
    }

    /// Match a concrete value
    pub fn matches(
        self: &Rc<Self>,
        value: Value,
        env: Env,
        cx: EvalContext,
    ) -> LocalBoxFuture<'static, Option<Env>> {
        let this = self.clone();
        async move {
            match &*this {
                Pattern::Any => Some(env),
                Pattern::Ident(ident) => env.bind(ident, value),
                Pattern::Pair(head, tail) => {
                    let (h, t) = match value.as_pair() {
                        Some((h, t)) => (h.clone(), t.clone()),
                        None => return None,
                    };
                    let env = head.matches(h, env, cx.clone()).await?;
                    tail.matches(t, env, cx).await
                }
                Pattern::Const(_) | Pattern::Value(_) | Pattern::SelfRef => {
                    let expected = this.constant_value(&env, &cx).await?;
                    (expected == value).then_some(env)
                }
            }
        }
        .boxed_local()
    }

    /// Unify with `right`
    pub fn eq(
        self: &Rc<Self>,
        right: &Rc<Pattern>,
        env: Env,
        cx: EvalContext,
    ) -> LocalBoxFuture<'static, Option<Env>> {
        let (left, right) = (self.clone(), right.clone());
        async move {
            match &*left {
                Pattern::Any | Pattern::Ident(_) => right.bind(&left, env, cx).await,
                Pattern::Pair(..) => right.unify_pair(&left, env, cx).await,
                Pattern::Const(_) | Pattern::Value(_) | Pattern::SelfRef => {
                    let value = left.constant_value(&env, &cx).await?;
                    right.matches(value, env, cx).await
                }
            }
        }
        .boxed_local()
    }

    /// Continue a unification whose left side is an identifier or wildcard
    pub fn bind(
        self: &Rc<Self>,
        left: &Rc<Pattern>,
        env: Env,
        cx: EvalContext,
    ) -> LocalBoxFuture<'static, Option<Env>> {
        let (this, left) = (self.clone(), left.clone());
        async move {
            match &*this {
                // nothing concrete on either side
                Pattern::Any | Pattern::Ident(_) => None,
                Pattern::Pair(..) => {
                    let value = this.resolve(env.clone(), cx.clone()).await?;
                    left.matches(value, env, cx).await
                }
                Pattern::Const(_) | Pattern::Value(_) | Pattern::SelfRef => {
                    let value = this.constant_value(&env, &cx).await?;
                    left.matches(value, env, cx).await
                }
            }
        }
        .boxed_local()
    }

    /// Continue a unification whose left side is a pair pattern
    pub fn unify_pair(
        self: &Rc<Self>,
        left: &Rc<Pattern>,
        env: Env,
        cx: EvalContext,
    ) -> LocalBoxFuture<'static, Option<Env>> {
        let (this, left) = (self.clone(), left.clone());
        async move {
            match &*this {
                Pattern::Any | Pattern::Ident(_) => left.bind(&this, env, cx).await,
                Pattern::Pair(head, tail) => left.both(head, tail, env, cx).await,
                Pattern::Const(_) | Pattern::Value(_) | Pattern::SelfRef => {
                    let value = this.constant_value(&env, &cx).await?;
                    left.matches(value, env, cx).await
                }
            }
        }
        .boxed_local()
    }

    /// Unify a pair pattern's parts with `head` and `tail`, left to right
    fn both(
        self: &Rc<Self>,
        head: &Rc<Pattern>,
        tail: &Rc<Pattern>,
        env: Env,
        cx: EvalContext,
    ) -> LocalBoxFuture<'static, Option<Env>> {
        let (this, head, tail) = (self.clone(), head.clone(), tail.clone());
        async move {
            let Pattern::Pair(h, t) = &*this else {
                return None;
            };
            let env = h.eq(&head, env, cx.clone()).await?;
            t.eq(&tail, env, cx).await
        }
        .boxed_local()
    }

    /// The concrete value this pattern denotes, if it has one
    ///
    /// Pairs evaluate both parts concurrently. `?` counts as no value.
    pub fn resolve(self: &Rc<Self>, env: Env, cx: EvalContext) -> LocalBoxFuture<'static, Option<Value>> {
        let this = self.clone();
        async move {
            match &*this {
                Pattern::Any | Pattern::Ident(_) => None,
                Pattern::Pair(head, tail) => {
                    let (h, t) = future::join(
                        head.resolve(env.clone(), cx.clone()),
                        tail.resolve(env, cx),
                    )
                    .await;
                    Some(Value::pair(h?, t?))
                }
                Pattern::Const(_) | Pattern::Value(_) | Pattern::SelfRef => this
                    .constant_value(&env, &cx)
                    .await
                    .filter(|v| !v.is_undefined()),
            }
        }
        .boxed_local()
    }
}

/// `left = right`
#[derive(Debug, Clone)]
pub struct Equation {
    pub left: Rc<Pattern>,
    pub right: Rc<Pattern>,
}

impl Equation {
    /// `left = right`
    pub fn new(left: Rc<Pattern>, right: Rc<Pattern>) -> Self {
        Self { left, right }
    }

    /// Unify both sides in `env`
    pub fn unify(&self, env: Env, cx: EvalContext) -> LocalBoxFuture<'static, Option<Env>> {
        self.left.eq(&self.right, env, cx)
    }

    /// Identifiers either side binds
    pub fn idents(&self, out: &mut Vec<Rc<str>>) {
        self.left.idents(out);
        self.right.idents(out);
    }
}
