//! The actor configuration: registry, mailbox queue and timers
//!
//! A `Configuration` owns every actor created in it. Delivery is strictly
//! FIFO and one at a time: `dispatch()` pops one envelope and runs the
//! target's behavior to completion before anything else happens.
//!
//! Time is logical. Delayed sends sit in a timer list ordered by due time
//! and move into the queue when `tick()`, `advance()` or `run_until_idle()`
//! carries the clock past them.

use crate::{
    behavior::{Behavior, Context, Wakeups},
    ActorId, Clock, Error, IdSource, Journal, Millis, Result, RunState, Settings,
};
use indexmap::IndexMap;
use std::collections::VecDeque;

/// A message addressed to an actor
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<M> {
    pub target: ActorId,
    pub message: M,
}

/// A delayed send waiting for the clock
struct Timer<M> {
    due: Millis,
    seq: u64,
    envelope: Envelope<M>,
}

/// A registered actor
struct Entry<M> {
    name: String,
    /// `None` while the behavior is running
    behavior: Option<Box<dyn Behavior<M>>>,
}

/// The scheduler
pub struct Configuration<M> {
    settings: Settings,
    registry: IndexMap<ActorId, Entry<M>>,
    queue: VecDeque<Envelope<M>>,
    /// Sorted by (due, seq)
    timers: Vec<Timer<M>>,
    timer_seq: u64,
    clock: Clock,
    state: RunState,
    ids: IdSource,
    wakeups: Wakeups,
    journal: Journal,
}

impl<M: 'static> Configuration<M> {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Create a configuration with custom settings
    pub fn with_settings(settings: Settings) -> Self {
        let journal = Journal::with_config(settings.journal.clone());
        Self {
            settings,
            registry: IndexMap::new(),
            queue: VecDeque::new(),
            timers: Vec::new(),
            timer_seq: 0,
            clock: Clock::new(),
            state: RunState::Halted,
            ids: IdSource::new(),
            wakeups: Wakeups::new(),
            journal,
        }
    }

    /// Settings this configuration was built with
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Register a new actor and return its fresh id
    pub fn create(
        &mut self,
        behavior: impl Behavior<M> + 'static,
        name: impl Into<String>,
    ) -> ActorId {
        let id = self.ids.next_id();
        self.register(id, Box::new(behavior), name.into());
        id
    }

    /// Register an actor under an id reserved earlier from [`Configuration::ids`]
    pub fn create_reserved(
        &mut self,
        id: ActorId,
        behavior: impl Behavior<M> + 'static,
        name: impl Into<String>,
    ) -> Result<()> {
        if self.registry.contains_key(&id) {
            return Err(Error::AlreadyRegistered(id));
        }
        self.register(id, Box::new(behavior), name.into());
        Ok(())
    }

    fn register(&mut self, id: ActorId, behavior: Box<dyn Behavior<M>>, name: String) {
        tracing::debug!(%id, %name, "create");
        self.journal.record_created(self.clock.now(), id, &name);
        self.registry.insert(
            id,
            Entry {
                name,
                behavior: Some(behavior),
            },
        );
    }

    /// Whether `id` names a registered actor
    pub fn contains(&self, id: ActorId) -> bool {
        self.registry.contains_key(&id)
    }

    /// Debug name of an actor
    pub fn name(&self, id: ActorId) -> Option<&str> {
        self.registry.get(&id).map(|e| e.name.as_str())
    }

    /// Number of registered actors
    pub fn actor_count(&self) -> usize {
        self.registry.len()
    }

    /// Enqueue a message for FIFO delivery
    ///
    /// Fails if `target` is not a registered actor. Sending resumes a paused
    /// configuration.
    pub fn send(&mut self, message: M, target: ActorId) -> Result<()> {
        if !self.contains(target) {
            return Err(Error::NotAnActor(target));
        }
        tracing::trace!(%target, "send");
        self.journal.record_sent(self.clock.now(), target);
        self.queue.push_back(Envelope { target, message });
        self.resume();
        Ok(())
    }

    /// Enqueue a message once `delay` ms of logical time have passed
    ///
    /// There is no cancellation. Timers with the same due time fire in the
    /// order they were scheduled.
    pub fn send_after(&mut self, delay: Millis, message: M, target: ActorId) -> Result<()> {
        if !self.contains(target) {
            return Err(Error::NotAnActor(target));
        }
        let now = self.clock.now();
        let due = now.saturating_add(delay);
        let seq = self.timer_seq;
        self.timer_seq += 1;

        tracing::trace!(%target, due, "send after");
        self.journal.record_scheduled(now, due, target);
        let at = self
            .timers
            .partition_point(|t| (t.due, t.seq) <= (due, seq));
        self.timers.insert(
            at,
            Timer {
                due,
                seq,
                envelope: Envelope { target, message },
            },
        );
        Ok(())
    }

    /// Deliver one unit of work
    ///
    /// Pending wake-ups are serviced before the message queue. Returns
    /// whether anything was done.
    pub fn dispatch(&mut self) -> bool {
        if let Some(id) = self.wakeups.pop() {
            self.invoke(id, None);
            return true;
        }
        match self.queue.pop_front() {
            Some(Envelope { target, message }) => {
                self.journal.record_delivered(self.clock.now(), target);
                self.invoke(target, Some(message));
                true
            }
            None => false,
        }
    }

    fn invoke(&mut self, id: ActorId, message: Option<M>) {
        let Some(mut behavior) = self.registry.get_mut(&id).and_then(|e| e.behavior.take())
        else {
            tracing::warn!(%id, "dispatch to unknown actor");
            return;
        };

        let mut ctx = Context::new(id, self);
        match message {
            Some(message) => behavior.receive(&mut ctx, message),
            None => behavior.resume(&mut ctx),
        }
        let next = ctx.into_replacement().unwrap_or(behavior);

        if let Some(entry) = self.registry.get_mut(&id) {
            entry.behavior = Some(next);
        }
    }

    /// Dispatch until idle or `limit` deliveries have run
    pub fn dispatch_loop(&mut self, limit: usize) -> usize {
        let mut count = 0;
        while count < limit && self.dispatch() {
            count += 1;
        }
        count
    }

    /// Start driving the configuration from `tick()` every `period` ms
    pub fn run(&mut self, period: Millis) {
        self.state = RunState::Running { period };
    }

    /// Stop running
    pub fn halt(&mut self) {
        self.state = RunState::Halted;
    }

    /// Stop dispatching until the next send or `resume()`
    pub fn pause(&mut self) {
        if let RunState::Running { period } = self.state {
            self.state = RunState::Paused { period };
        }
    }

    /// Continue a paused run
    pub fn resume(&mut self) {
        if let RunState::Paused { period } = self.state {
            self.state = RunState::Running { period };
        }
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        self.state
    }

    /// One run step
    ///
    /// Advances the clock by the run period, releases due timers and
    /// dispatches up to `batch_limit` deliveries. Pauses when nothing is
    /// left to do, including no timers. Does nothing unless running.
    pub fn tick(&mut self) -> usize {
        let RunState::Running { period } = self.state else {
            return 0;
        };
        self.advance(period);
        self.clock.record_tick();
        let count = self.dispatch_loop(self.settings.batch_limit);
        if self.pending() == 0 && self.timers.is_empty() {
            self.pause();
        }
        count
    }

    /// Move logical time forward, releasing due timers into the queue
    pub fn advance(&mut self, ms: Millis) {
        self.clock.advance(ms);
        self.release_timers();
    }

    fn release_timers(&mut self) {
        let now = self.clock.now();
        let due = self.timers.partition_point(|t| t.due <= now);
        let released: Vec<Timer<M>> = self.timers.drain(..due).collect();
        for timer in released {
            let Envelope { target, message } = timer.envelope;
            if let Err(err) = self.send(message, target) {
                tracing::warn!(%err, "timer fired for missing actor");
            }
        }
    }

    /// Dispatch until quiescent, jumping the clock to the next timer
    /// whenever the queue drains. Stops after `limit` deliveries.
    pub fn run_until_idle(&mut self, limit: usize) -> usize {
        let mut count = 0;
        while count < limit {
            if self.dispatch() {
                count += 1;
                continue;
            }
            match self.timers.first() {
                Some(timer) => {
                    let due = timer.due;
                    self.clock.advance_to(due);
                    self.release_timers();
                }
                None => break,
            }
        }
        count
    }

    /// Deliveries and wake-ups waiting to be dispatched
    pub fn pending(&self) -> usize {
        self.queue.len() + self.wakeups.len()
    }

    /// Delayed sends not yet released
    pub fn scheduled(&self) -> usize {
        self.timers.len()
    }

    /// Current logical time
    pub fn now(&self) -> Millis {
        self.clock.now()
    }

    /// The clock
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Id source shared with everything that reserves ids for this configuration
    pub fn ids(&self) -> &IdSource {
        &self.ids
    }

    /// Wake-up queue serviced by `dispatch()`
    pub fn wakeups(&self) -> &Wakeups {
        &self.wakeups
    }

    /// Scheduler trace
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Scheduler trace, mutably
    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self.journal
    }
}

impl<M: 'static> Default for Configuration<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{from_fn, Sink};
    use crate::JournalConfig;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<(ActorId, i64)>>>;

    fn recorder(config: &mut Configuration<i64>, log: &Log) -> ActorId {
        let log = log.clone();
        config.create(
            from_fn(move |ctx: &mut Context<'_, i64>, n| log.borrow_mut().push((ctx.self_id(), n))),
            "recorder",
        )
    }

    #[test]
    fn test_fifo_delivery() {
        let log = Log::default();
        let mut config = Configuration::new();
        let a = recorder(&mut config, &log);
        let b = recorder(&mut config, &log);

        config.send(1, a).unwrap();
        config.send(2, b).unwrap();
        config.send(3, a).unwrap();
        assert_eq!(config.pending(), 3);

        assert_eq!(config.dispatch_loop(100), 3);
        assert_eq!(*log.borrow(), vec![(a, 1), (b, 2), (a, 3)]);
        assert!(!config.dispatch());
    }

    #[test]
    fn test_send_to_non_actor_fails() {
        let mut config: Configuration<i64> = Configuration::new();
        assert_eq!(
            config.send(1, ActorId(99)),
            Err(Error::NotAnActor(ActorId(99)))
        );
        assert_eq!(
            config.send_after(5, 1, ActorId(99)),
            Err(Error::NotAnActor(ActorId(99)))
        );
        assert_eq!(config.pending(), 0);
    }

    #[test]
    fn test_one_delivery_per_dispatch() {
        let log = Log::default();
        let mut config = Configuration::new();
        let target = recorder(&mut config, &log);
        let fan = config.create(
            from_fn(move |ctx: &mut Context<'_, i64>, n| {
                for i in 0..n {
                    ctx.send(i, target).unwrap();
                }
            }),
            "fan",
        );

        config.send(3, fan).unwrap();
        assert!(config.dispatch());
        assert!(log.borrow().is_empty());
        assert_eq!(config.pending(), 3);

        config.dispatch_loop(10);
        assert_eq!(*log.borrow(), vec![(target, 0), (target, 1), (target, 2)]);
    }

    #[test]
    fn test_send_after() {
        let log = Log::default();
        let mut config = Configuration::new();
        let a = recorder(&mut config, &log);

        config.send_after(50, 2, a).unwrap();
        config.send_after(10, 1, a).unwrap();
        config.send(0, a).unwrap();
        assert_eq!(config.scheduled(), 2);

        config.dispatch_loop(10);
        assert_eq!(*log.borrow(), vec![(a, 0)]);

        config.advance(10);
        config.dispatch_loop(10);
        assert_eq!(log.borrow().len(), 2);

        config.advance(39);
        assert_eq!(config.dispatch_loop(10), 0);

        config.advance(1);
        config.dispatch_loop(10);
        assert_eq!(*log.borrow(), vec![(a, 0), (a, 1), (a, 2)]);
        assert_eq!(config.scheduled(), 0);
    }

    #[test]
    fn test_equal_delays_fire_in_schedule_order() {
        let log = Log::default();
        let mut config = Configuration::new();
        let a = recorder(&mut config, &log);

        for n in 0..4 {
            config.send_after(20, n, a).unwrap();
        }
        config.run_until_idle(100);

        assert_eq!(*log.borrow(), vec![(a, 0), (a, 1), (a, 2), (a, 3)]);
        assert_eq!(config.now(), 20);
    }

    #[test]
    fn test_run_until_idle_jumps_clock() {
        let log = Log::default();
        let mut config = Configuration::new();
        let a = recorder(&mut config, &log);

        config.send_after(1000, 7, a).unwrap();
        assert_eq!(config.run_until_idle(10), 1);
        assert_eq!(config.now(), 1000);
        assert_eq!(*log.borrow(), vec![(a, 7)]);
    }

    #[test]
    fn test_run_until_idle_limit() {
        let mut config: Configuration<i64> = Configuration::new();
        let ping = config.create(
            from_fn(|ctx: &mut Context<'_, i64>, n| {
                let me = ctx.self_id();
                ctx.send(n + 1, me).unwrap();
            }),
            "ping",
        );
        config.send(0, ping).unwrap();

        assert_eq!(config.run_until_idle(25), 25);
        assert_eq!(config.pending(), 1);
    }

    #[test]
    fn test_run_state_machine() {
        let settings = Settings {
            batch_limit: 2,
            ..Settings::default()
        };
        let log = Log::default();
        let mut config = Configuration::with_settings(settings);
        let a = recorder(&mut config, &log);

        config.send(1, a).unwrap();
        assert_eq!(config.tick(), 0, "halted configurations do not tick");

        config.run(10);
        config.send(2, a).unwrap();
        config.send(3, a).unwrap();

        assert_eq!(config.tick(), 2);
        assert!(config.state().is_running());
        assert_eq!(config.tick(), 1);
        assert!(config.state().is_paused(), "idle run pauses");
        assert_eq!(config.now(), 20);

        config.send(4, a).unwrap();
        assert!(config.state().is_running(), "send resumes");
        assert_eq!(config.tick(), 1);

        config.halt();
        config.send(5, a).unwrap();
        assert_eq!(config.state(), RunState::Halted);
        assert_eq!(config.tick(), 0);
    }

    #[test]
    fn test_tick_keeps_running_while_timers_pending() {
        let log = Log::default();
        let mut config = Configuration::new();
        let a = recorder(&mut config, &log);
        config.run(10);
        config.send_after(25, 1, a).unwrap();

        assert_eq!(config.tick(), 0);
        assert_eq!(config.tick(), 0);
        assert!(config.state().is_running());
        assert_eq!(config.tick(), 1);
        assert!(config.state().is_paused());
    }

    #[test]
    fn test_create_reserved() {
        let mut config: Configuration<i64> = Configuration::new();
        let id = config.ids().next_id();
        assert!(!config.contains(id));

        config.create_reserved(id, Sink, "staged").unwrap();
        assert!(config.contains(id));
        assert_eq!(config.name(id), Some("staged"));
        assert_eq!(
            config.create_reserved(id, Sink, "again"),
            Err(Error::AlreadyRegistered(id))
        );

        let next = config.create(Sink, "fresh");
        assert_ne!(next, id);
        assert_eq!(config.actor_count(), 2);
    }

    #[test]
    fn test_wakeup_calls_resume() {
        struct Parked {
            resumed: Rc<RefCell<u32>>,
        }

        impl Behavior<i64> for Parked {
            fn receive(&mut self, _ctx: &mut Context<'_, i64>, _message: i64) {}

            fn resume(&mut self, _ctx: &mut Context<'_, i64>) {
                *self.resumed.borrow_mut() += 1;
            }
        }

        let resumed = Rc::new(RefCell::new(0));
        let mut config = Configuration::new();
        let id = config.create(
            Parked {
                resumed: resumed.clone(),
            },
            "parked",
        );
        let other = config.create(Sink, "sink");
        config.send(0, other).unwrap();
        config.wakeups().wake(id);

        assert_eq!(config.pending(), 2);
        assert!(config.dispatch());
        assert_eq!(*resumed.borrow(), 1, "wake-ups run before queued messages");
        assert_eq!(config.pending(), 1);
    }

    #[test]
    fn test_journal_records_deliveries() {
        let settings = Settings {
            journal: JournalConfig {
                recording_enabled: true,
                max_entries: 0,
            },
            ..Settings::default()
        };
        let log = Log::default();
        let mut config = Configuration::with_settings(settings);
        let a = recorder(&mut config, &log);
        let b = recorder(&mut config, &log);

        config.send(1, b).unwrap();
        config.send(2, a).unwrap();
        config.dispatch_loop(10);

        let stats = config.journal().stats();
        assert_eq!(stats.created, 2);
        assert_eq!(stats.sent, 2);
        assert_eq!(stats.delivered, 2);
        assert_eq!(config.journal().deliveries().collect::<Vec<_>>(), vec![b, a]);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_fifo_across_targets(targets in proptest::collection::vec(0usize..4, 0..40)) {
                let log = Log::default();
                let mut config = Configuration::new();
                let actors: Vec<ActorId> = (0..4).map(|_| recorder(&mut config, &log)).collect();

                let mut expected = Vec::new();
                for (n, t) in targets.iter().enumerate() {
                    config.send(n as i64, actors[*t]).unwrap();
                    expected.push((actors[*t], n as i64));
                }
                config.dispatch_loop(usize::MAX);

                prop_assert_eq!(log.borrow().clone(), expected);
            }
        }
    }
}
