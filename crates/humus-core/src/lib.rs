//! Humus Core - Cooperative actor configuration
//!
//! This crate provides the actor substrate the Humus evaluator runs on:
//! - Actor identities and a shared id source (`ActorId`, `IdSource`)
//! - Behaviors and the per-delivery `Context`
//! - The `Configuration` scheduler: FIFO mailbox queue, actor registry,
//!   logical-time timers and the run/pause/halt state machine
//! - A trace `Journal` of creations, sends and deliveries
//! - RON-loadable `Settings` and a deterministic `SeededRng`
//!
//! The configuration is generic over the message type, so it can be driven
//! directly by host code as well as by the evaluator in `humus-meta`.
//!
//! ## Example
//!
//! ```
//! use humus_core::{behavior, Configuration};
//! use std::{cell::RefCell, rc::Rc};
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let log = seen.clone();
//! let mut config: Configuration<i64> = Configuration::new();
//! let echo = config.create(behavior::from_fn(move |_ctx, n| log.borrow_mut().push(n)), "echo");
//!
//! config.send(1, echo).unwrap();
//! config.send(2, echo).unwrap();
//! config.dispatch_loop(10);
//! assert_eq!(*seen.borrow(), vec![1, 2]);
//! ```

pub mod behavior;
pub mod configuration;
mod error;
mod identity;
pub mod journal;
mod rng;
mod settings;
pub mod time;

pub use behavior::{Behavior, Context, Sink, Wakeups};
pub use configuration::{Configuration, Envelope};
pub use error::{Error, Result};
pub use identity::{ActorId, IdSource};
pub use journal::{Journal, JournalConfig, JournalEntry, JournalStats};
pub use rng::SeededRng;
pub use settings::Settings;
pub use time::{Clock, Millis, RunState};
