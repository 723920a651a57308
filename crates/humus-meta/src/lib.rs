//! Humus Meta - Meta-circular evaluator for the Humus actor language
//!
//! This crate runs Humus programs on a `humus_core::Configuration<Value>`:
//! - Runtime values (`Value`, `Pair`, closures, native functions, blocks)
//! - Persistent environment chains with dynamic layers and declared slots
//! - Pattern matching and two-sided unification
//! - Expression evaluation with fork/join sub-evaluation
//! - Statement execution against a transactional `Sponsor`
//! - Serializer-guarded actors whose every message is one atomic transaction
//! - A native prelude and runtime services (`println`, `timer`, `random`, ...)
//!
//! ## Evaluation model
//!
//! Expressions, patterns and statements are plain enums evaluated by async
//! recursion. Evaluation only suspends on a lookup of a block variable that is
//! declared but not bound yet; the owning actor stays busy until a later bind
//! wakes it. Fork/join is `futures::future::join`.
//!
//! Tail calls loop inside one evaluation. Deeper non-tail nesting is cut
//! off onto a `Trampoline` that the driving `Task` polls from the top of its
//! stack, so recursion depth in a Humus program is bounded by memory rather
//! than by the native stack.
//!
//! ## Example
//!
//! ```
//! use humus_meta::{Expr, Humus, Pattern, Value};
//!
//! let mut humus = Humus::new();
//! // (\i.i)(42)
//! let expr = Expr::app(
//!     Expr::abs(Pattern::ident("i"), Expr::ident("i")),
//!     Expr::constant(Value::Number(42)),
//! );
//! assert_eq!(humus.evaluate(&expr).unwrap(), Value::Number(42));
//! ```

mod actor;
mod env;
mod error;
mod expr;
mod pattern;
pub mod prelude;
mod runtime;
mod sponsor;
mod stmt;
mod task;
mod value;

pub use actor::HumusActor;
pub use env::Env;
pub use error::{Error, Result};
pub use expr::{apply, Choice, EvalContext, Expr};
pub use pattern::{Equation, Pattern};
pub use runtime::Humus;
pub use sponsor::{Commit, PendingSend, Sponsor, StagedActor};
pub use stmt::{Outcome, Stmt};
pub use task::{Task, Trampoline};
pub use value::{Block, Closure, NativeFn, Pair, Value};
