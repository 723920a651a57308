//! Suspended evaluations
//!
//! A `Task` owns the future for one delivery. Its waker does not reschedule
//! anything itself: a wake that arrives while the task is being polled just
//! makes `poll` go around again, and a wake from anywhere else queues the
//! owning actor on the configuration's wake-up queue so `dispatch` resumes it.
//!
//! Evaluation that nests too deep is cut loose onto a `Trampoline`. The task
//! polls those detached pieces from the top of its own stack, so a long
//! chain of nested calls never turns into an equally long chain of `poll`
//! frames.

use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::task::{waker, ArcWake};
use humus_core::{ActorId, Wakeups};
use std::cell::RefCell;
use std::fmt;
use std::mem;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

/// Evaluations waiting to be polled from the top of a task
#[derive(Clone, Default)]
pub struct Trampoline(Rc<RefCell<Vec<LocalBoxFuture<'static, ()>>>>);

impl Trampoline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a detached evaluation
    pub fn push(&self, future: LocalBoxFuture<'static, ()>) {
        self.0.borrow_mut().push(future);
    }

    /// Take everything queued so far
    pub fn take(&self) -> Vec<LocalBoxFuture<'static, ()>> {
        mem::take(&mut *self.0.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

impl fmt::Debug for Trampoline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trampoline({})", self.0.borrow().len())
    }
}

struct Signal {
    actor: ActorId,
    wakeups: Wakeups,
    woken: AtomicBool,
    polling: AtomicBool,
}

impl ArcWake for Signal {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        arc_self.woken.store(true, Ordering::SeqCst);
        if !arc_self.polling.load(Ordering::SeqCst) {
            tracing::trace!(actor = %arc_self.actor, "task woken");
            arc_self.wakeups.wake(arc_self.actor);
        }
    }
}

/// A future driven on behalf of one actor
pub struct Task<T> {
    future: LocalBoxFuture<'static, T>,
    trampoline: Trampoline,
    detached: FuturesUnordered<LocalBoxFuture<'static, ()>>,
    signal: Arc<Signal>,
}

impl<T> Task<T> {
    /// Wrap `future`; wake-ups outside `poll` go to `wakeups` as `actor`
    ///
    /// `trampoline` is where `future` leaves the evaluations it detaches.
    pub fn new(
        actor: ActorId,
        wakeups: Wakeups,
        trampoline: Trampoline,
        future: LocalBoxFuture<'static, T>,
    ) -> Self {
        Self {
            future,
            trampoline,
            detached: FuturesUnordered::new(),
            signal: Arc::new(Signal {
                actor,
                wakeups,
                woken: AtomicBool::new(false),
                polling: AtomicBool::new(false),
            }),
        }
    }

    /// Poll until the future finishes or stops making progress
    pub fn poll(&mut self) -> Poll<T> {
        let waker = waker(self.signal.clone());
        let mut cx = Context::from_waker(&waker);
        self.signal.polling.store(true, Ordering::SeqCst);
        let result = loop {
            self.signal.woken.store(false, Ordering::SeqCst);
            self.detached.extend(self.trampoline.take());
            while let Poll::Ready(Some(())) = self.detached.poll_next_unpin(&mut cx) {}
            match self.future.as_mut().poll(&mut cx) {
                Poll::Ready(value) => break Poll::Ready(value),
                Poll::Pending
                    if self.signal.woken.load(Ordering::SeqCst) || !self.trampoline.is_empty() =>
                {
                    continue
                }
                Poll::Pending => break Poll::Pending,
            }
        };
        self.signal.polling.store(false, Ordering::SeqCst);
        result
    }

    /// The actor this task runs for
    pub fn actor(&self) -> ActorId {
        self.signal.actor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::task::Waker;

    /// A future that finishes once `flag` is set, parking its waker otherwise
    fn gate(flag: Rc<RefCell<(bool, Option<Waker>)>>) -> LocalBoxFuture<'static, u32> {
        futures::future::poll_fn(move |cx| {
            let mut state = flag.borrow_mut();
            if state.0 {
                Poll::Ready(7)
            } else {
                state.1 = Some(cx.waker().clone());
                Poll::Pending
            }
        })
        .boxed_local()
    }

    #[test]
    fn test_ready_future() {
        let mut task = Task::new(
            ActorId(1),
            Wakeups::new(),
            Trampoline::new(),
            async { 3 }.boxed_local(),
        );
        assert_eq!(task.poll(), Poll::Ready(3));
        assert_eq!(task.actor(), ActorId(1));
    }

    #[test]
    fn test_external_wake_queues_actor() {
        let wakeups = Wakeups::new();
        let flag = Rc::new(RefCell::new((false, None)));
        let mut task = Task::new(
            ActorId(4),
            wakeups.clone(),
            Trampoline::new(),
            gate(flag.clone()),
        );

        assert_eq!(task.poll(), Poll::Pending);
        assert!(wakeups.is_empty());

        let waker = {
            let mut state = flag.borrow_mut();
            state.0 = true;
            state.1.take()
        };
        waker.expect("waker parked").wake();
        assert_eq!(wakeups.pop(), Some(ActorId(4)));
        assert_eq!(task.poll(), Poll::Ready(7));
    }

    #[test]
    fn test_wake_during_poll_repolls() {
        let wakeups = Wakeups::new();
        let polls = Rc::new(RefCell::new(0));
        let counter = polls.clone();
        let future = futures::future::poll_fn(move |cx| {
            *counter.borrow_mut() += 1;
            if *counter.borrow() < 3 {
                cx.waker().wake_by_ref();
                Poll::Pending
            } else {
                Poll::Ready(())
            }
        })
        .boxed_local();

        let mut task = Task::new(ActorId(2), wakeups.clone(), Trampoline::new(), future);
        assert_eq!(task.poll(), Poll::Ready(()));
        assert_eq!(*polls.borrow(), 3);
        assert!(wakeups.is_empty(), "wakes inside poll are not queued");
    }

    /// Each level detaches the next one and waits for its answer
    fn countdown(n: u32, trampoline: Trampoline) -> LocalBoxFuture<'static, u32> {
        async move {
            if n == 0 {
                return 0;
            }
            let (tx, rx) = futures::channel::oneshot::channel();
            let next = countdown(n - 1, trampoline.clone());
            trampoline.push(
                async move {
                    let _ = tx.send(next.await);
                }
                .boxed_local(),
            );
            rx.await.unwrap_or_default() + 1
        }
        .boxed_local()
    }

    #[test]
    fn test_detached_evaluations_finish() {
        let wakeups = Wakeups::new();
        let trampoline = Trampoline::new();
        let future = countdown(10_000, trampoline.clone());
        let mut task = Task::new(ActorId(3), wakeups.clone(), trampoline.clone(), future);

        assert_eq!(task.poll(), Poll::Ready(10_000));
        assert!(trampoline.is_empty());
        assert!(wakeups.is_empty());
    }
}
