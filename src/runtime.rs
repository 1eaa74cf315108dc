//! The [`TestingActorRuntime`] runs every actor on its own OS thread but lets exactly one of them
//! execute at a time. Each blocking primitive ([`Mailbox::send`], [`Mailbox::receive`],
//! [`TestingActorRuntime::create`], [`TestingActorRuntime::join`], ...) is a scheduling point at
//! which the configured [`Scheduler`] picks the next actor to run, so a deterministic program
//! follows exactly the schedule that the scheduler dictates.
//!
//! An execution ends when no actor can run. Parked actors are then woken and every primitive
//! returns [`ActorError::Terminated`], so actor bodies unwind with `?`.
//!
//! Executions are normally driven by a [`TestLauncher`].

mod launcher;

use crate::actor::{
    ActorError, ActorId, ActorList, ActorRecord, ActorSnapshot, ActorStatus, Mailbox, OpType,
    Operation,
};
use crate::scheduler::{NextActor, Scheduler};
use crate::util::DenseNatMap;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

pub use launcher::*;

/// A runtime for one execution of a program under test. Cheap to clone; every clone refers to
/// the same execution.
#[derive(Clone)]
pub struct TestingActorRuntime(Arc<RuntimeShared>);

struct RuntimeShared {
    scheduler: Arc<Mutex<dyn Scheduler>>,
    /// Coarse lock taken at each scheduling point.
    table: Mutex<ActorTable>,
    threads: DashMap<ThreadId, Arc<ActorRecord>, ahash::RandomState>,
    terminated: AtomicBool,
    sleep_set_blocked: AtomicBool,
    hit_step_limit: AtomicBool,
    /// Actors that were still live when no actor could run.
    deadlocked: Mutex<Vec<ActorId>>,
    error: Mutex<Option<ActorError>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Default)]
struct ActorTable {
    actors: DenseNatMap<ActorId, Arc<ActorRecord>>,
    steps: usize,
    trace: Vec<ActorId>,
    max_enabled: usize,
}

impl ActorTable {
    /// When nothing is enabled, actors that yielded are released first. Failing that, actors
    /// waiting for a deadlock are released.
    fn release_blocked_waiters(&self) {
        if self.actors.values().any(|r| r.lock().enabled) {
            return;
        }
        let mut released = false;
        for record in self.actors.values() {
            let mut state = record.lock();
            if state.yielded {
                state.yielded = false;
                state.enabled = true;
                released = true;
            }
        }
        if released {
            return;
        }
        for record in self.actors.values() {
            let mut state = record.lock();
            if state.waiting_for_deadlock {
                state.waiting_for_deadlock = false;
                state.enabled = true;
            }
        }
    }

    /// Releases every yielded actor other than `progressing`.
    fn release_yielded(&self, progressing: ActorId) {
        for record in self.actors.values().filter(|r| r.id != progressing) {
            let mut state = record.lock();
            if state.yielded {
                state.yielded = false;
                state.enabled = true;
            }
        }
    }
}

impl TestingActorRuntime {
    pub(crate) fn new(scheduler: Arc<Mutex<dyn Scheduler>>) -> Self {
        TestingActorRuntime(Arc::new(RuntimeShared {
            scheduler,
            table: Mutex::new(ActorTable::default()),
            threads: DashMap::with_hasher(ahash::RandomState::new()),
            terminated: AtomicBool::new(false),
            sleep_set_blocked: AtomicBool::new(false),
            hit_step_limit: AtomicBool::new(false),
            deadlocked: Mutex::new(Vec::new()),
            error: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }))
    }

    /// Creates an actor running `body`, and returns the new actor's mailbox. This is a
    /// scheduling point, and the new actor does not run until it is scheduled.
    pub fn create<M, F>(&self, body: F) -> Result<Mailbox<M>, ActorError>
    where
        M: Send + 'static,
        F: FnOnce(Mailbox<M>) -> Result<(), ActorError> + Send + 'static,
    {
        self.spawn_actor(None, body)
    }

    /// Same as [`TestingActorRuntime::create`], but names the actor for reports.
    pub fn create_named<M, F>(&self, name: impl Into<String>, body: F) -> Result<Mailbox<M>, ActorError>
    where
        M: Send + 'static,
        F: FnOnce(Mailbox<M>) -> Result<(), ActorError> + Send + 'static,
    {
        self.spawn_actor(Some(name.into()), body)
    }

    /// Creates an additional mailbox owned by the calling actor. Not a scheduling point.
    pub fn create_mailbox<M>(&self) -> Mailbox<M> {
        Mailbox::new(&self.current_record(), self.clone())
    }

    /// Blocks until `actor` terminates. Fails with [`ActorError::Joined`] if the actor failed.
    pub fn join(&self, actor: ActorId) -> Result<(), ActorError> {
        let faults = self.join_actor(actor)?;
        if faults.is_empty() {
            Ok(())
        } else {
            Err(ActorError::Joined { actor, faults })
        }
    }

    /// Blocks until `actor` terminates, regardless of how it terminated.
    pub fn join_ignoring_faults(&self, actor: ActorId) -> Result<(), ActorError> {
        self.join_actor(actor).map(|_| ())
    }

    /// Blocks until the owner of `mailbox` terminates.
    pub fn wait_for_actor<M>(&self, mailbox: &Mailbox<M>) -> Result<(), ActorError> {
        self.join(mailbox.owner())
    }

    /// Lets other actors run. The caller is not scheduled again until another actor makes
    /// progress (or nothing else can run).
    pub fn yield_now(&self) -> Result<(), ActorError> {
        let me = self.current_record();
        {
            let mut state = me.lock();
            state.enabled = false;
            state.yielded = true;
        }
        self.schedule_as(&me, Operation::yield_now(me.id))
    }

    /// Time does not pass under test, so sleeping only yields.
    pub fn sleep(&self, _duration: Duration) -> Result<(), ActorError> {
        self.yield_now()
    }

    /// Blocks until every other actor is blocked.
    pub fn wait_for_deadlock(&self) -> Result<(), ActorError> {
        let me = self.current_record();
        {
            let mut state = me.lock();
            state.enabled = false;
            state.waiting_for_deadlock = true;
        }
        self.schedule_as(&me, Operation::wait_for_deadlock(me.id))
    }

    /// Returns the error that cancels the calling actor, for use as
    /// `return Err(runtime.cancel_self())` in an actor body. Joiners observe the cancellation as
    /// a fault.
    pub fn cancel_self(&self) -> ActorError {
        log::debug!("Actor cancelled itself. id={}", self.current_actor());
        ActorError::Cancelled
    }

    /// Names the calling actor for reports.
    pub fn assign_name(&self, name: impl Into<String>) {
        self.current_record().lock().name = Some(name.into());
    }

    /// The calling actor. Panics if called from a thread that is not running an actor.
    pub fn current_actor(&self) -> ActorId {
        self.current_record().id
    }

    /// Scheduling steps taken so far in this execution.
    pub fn current_step(&self) -> usize {
        self.0.table.lock().steps
    }

    /// Whether this execution has ended.
    pub fn is_terminated(&self) -> bool {
        self.0.terminated.load(Ordering::SeqCst)
    }

    /// A summary of every actor created so far.
    pub fn statuses(&self) -> Vec<ActorStatus> {
        let table = self.0.table.lock();
        table.actors.values().map(|r| r.status()).collect()
    }

    /// Announces `op` for the calling actor and lets the scheduler decide who runs next.
    pub(crate) fn schedule(&self, op: Operation) -> Result<(), ActorError> {
        let me = self.current_record();
        self.schedule_as(&me, op)
    }

    fn schedule_as(&self, me: &Arc<ActorRecord>, op: Operation) -> Result<(), ActorError> {
        self.check_terminated()?;
        me.stamp(op);

        let next = {
            let mut table = self.0.table.lock();
            table.release_blocked_waiters();
            let actors: Vec<ActorSnapshot> =
                table.actors.values().map(|r| r.snapshot()).collect();
            table.steps += 1;
            let enabled = actors.iter().filter(|a| a.enabled).count();
            table.max_enabled = table.max_enabled.max(enabled);

            let decision = self.0.scheduler.lock().get_next(&actors, me.id);
            log::trace!(
                "Step {}. current={}, decision={:?}\n{}",
                table.steps,
                me.id,
                decision,
                ActorList::new(&actors, match decision {
                    NextActor::Run(id) => Some(id),
                    _ => None,
                })
            );
            match decision {
                NextActor::Run(id) => {
                    table.trace.push(id);
                    if actors[usize::from(id)].op.op_type.is_progress() {
                        table.release_yielded(id);
                    }
                    Some(Arc::clone(&table.actors[id]))
                }
                NextActor::Deadlock => {
                    let live: Vec<ActorId> = table
                        .actors
                        .values()
                        .filter(|r| !r.lock().terminated)
                        .map(|r| r.id)
                        .collect();
                    if live.is_empty() {
                        log::trace!("Execution complete. step={}", table.steps);
                    } else {
                        log::debug!("Deadlock. step={}, live={:?}", table.steps, live);
                        *self.0.deadlocked.lock() = live;
                    }
                    None
                }
                NextActor::SleepSetBlocked => {
                    log::trace!("Sleep set blocked. step={}", table.steps);
                    self.0.sleep_set_blocked.store(true, Ordering::SeqCst);
                    None
                }
                NextActor::HitStepLimit => {
                    log::debug!("Hit step limit. step={}", table.steps);
                    self.0.hit_step_limit.store(true, Ordering::SeqCst);
                    None
                }
            }
        };

        let next = match next {
            Some(next) => next,
            None => {
                self.terminate();
                return Err(ActorError::Terminated);
            }
        };
        if Arc::ptr_eq(&next, me) {
            return Ok(());
        }
        me.deactivate();
        next.activate();
        me.wait_until_active(op.op_type == OpType::End);
        self.check_terminated()
    }

    fn check_terminated(&self) -> Result<(), ActorError> {
        if self.is_terminated() {
            Err(ActorError::Terminated)
        } else {
            Ok(())
        }
    }

    /// Ends the execution and wakes every actor so that it can unwind.
    fn terminate(&self) {
        self.0.terminated.store(true, Ordering::SeqCst);
        let records: Vec<_> = self.0.table.lock().actors.values().cloned().collect();
        for record in records {
            record.release();
        }
    }

    fn current_record(&self) -> Arc<ActorRecord> {
        match self.0.threads.get(&thread::current().id()) {
            Some(entry) => Arc::clone(entry.value()),
            None => crate::engine_fault(format!(
                "An actor primitive was called outside of an actor. thread={:?}",
                thread::current().name()
            )),
        }
    }

    fn spawn_actor<M, F>(&self, name: Option<String>, body: F) -> Result<Mailbox<M>, ActorError>
    where
        M: Send + 'static,
        F: FnOnce(Mailbox<M>) -> Result<(), ActorError> + Send + 'static,
    {
        self.schedule(Operation::create())?;
        let record = {
            let mut table = self.0.table.lock();
            let id = table.actors.next_key();
            let record = Arc::new(ActorRecord::new(id, name));
            table.actors.push(Arc::clone(&record));
            record
        };
        let mailbox = Mailbox::new(&record, self.clone());

        let runtime = self.clone();
        let child = Arc::clone(&record);
        let child_mailbox = mailbox.clone();
        let handle = thread::Builder::new()
            .name(format!("actor-{}", record.id))
            .spawn(move || runtime.run_actor(child, false, move || body(child_mailbox)))
            .expect("Failed to spawn a thread");
        self.0.handles.lock().push(handle);
        record.wait_until_parked();
        log::trace!("Created actor. id={}", record.id);
        Ok(mailbox)
    }

    fn join_actor(&self, other: ActorId) -> Result<Vec<ActorError>, ActorError> {
        let me = self.current_record();
        self.check_terminated()?;
        let theirs = match self.0.table.lock().actors.get(other) {
            Some(record) => Arc::clone(record),
            None => crate::engine_fault(format!("Joined an unknown actor. id={}", other)),
        };
        let waiting = {
            let mut state = theirs.lock();
            if !state.terminated {
                state.terminate_waiters.push(Arc::downgrade(&me));
            }
            !state.terminated
        };
        if waiting {
            me.lock().enabled = false;
        }
        self.schedule_as(&me, Operation::join(other))?;
        let state = theirs.lock();
        if !state.terminated {
            crate::engine_fault(format!("Joined actor did not terminate. id={}", other));
        }
        Ok(state.faults.clone())
    }

    /// Runs the root actor on the calling thread.
    pub(crate) fn run_main<F>(&self, body: F)
    where
        F: FnOnce(&TestingActorRuntime) -> Result<(), ActorError>,
    {
        let record = Arc::new(ActorRecord::new(ActorId::MAIN, Some("main".to_owned())));
        self.0.table.lock().actors.insert(ActorId::MAIN, Arc::clone(&record));
        self.run_actor(record, true, || body(self));
    }

    fn run_actor<F>(&self, record: Arc<ActorRecord>, is_main: bool, body: F)
    where
        F: FnOnce() -> Result<(), ActorError>,
    {
        let thread_id = thread::current().id();
        self.0.threads.insert(thread_id, Arc::clone(&record));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.actor_lifecycle(&record, is_main, body)
        }));
        self.0.threads.remove(&thread_id);
        if let Err(payload) = outcome {
            // Only engine faults reach this point.
            self.terminate();
            panic::resume_unwind(payload);
        }
    }

    fn actor_lifecycle<F>(&self, record: &Arc<ActorRecord>, is_main: bool, body: F)
    where
        F: FnOnce() -> Result<(), ActorError>,
    {
        if !is_main {
            // Park at the start point until scheduled.
            record.deactivate();
            record.wait_until_active(false);
        }
        let result = if self.is_terminated() {
            Err(ActorError::Terminated)
        } else {
            match panic::catch_unwind(AssertUnwindSafe(body)) {
                Ok(result) => result,
                Err(payload) if crate::take_engine_fault() => panic::resume_unwind(payload),
                Err(payload) => Err(ActorError::Panicked(panic_message(payload.as_ref()))),
            }
        };
        self.settle(record, is_main, result);
        self.end_actor(record);
    }

    /// Classifies how an actor body ended.
    fn settle(&self, record: &ActorRecord, is_main: bool, result: Result<(), ActorError>) {
        match result {
            Ok(()) => {}
            Err(ActorError::Terminated) => {
                let dead_end = self.0.sleep_set_blocked.load(Ordering::SeqCst)
                    || self.0.hit_step_limit.load(Ordering::SeqCst);
                if is_main && !dead_end {
                    self.report_bug(ActorError::Deadlock);
                }
            }
            Err(ActorError::Cancelled) => {
                let mut state = record.lock();
                state.cancelled = true;
                state.faults.push(ActorError::Cancelled);
            }
            Err(error) => {
                record.lock().faults.push(error.clone());
                if is_main || matches!(error, ActorError::Panicked(_)) {
                    self.report_bug(error);
                    self.terminate();
                } else {
                    log::debug!("Actor failed. id={}, error={}", record.id, error);
                }
            }
        }
    }

    /// Performs the two end-of-life scheduling points. Waiters are released in between. An actor
    /// unwound by the end of the execution before its first end point is not marked terminated.
    fn end_actor(&self, record: &Arc<ActorRecord>) {
        let ended = self
            .schedule_as(record, Operation::end(record.id))
            .and_then(|()| {
                for waiter in record.finish() {
                    waiter.lock().enabled = true;
                }
                self.schedule_as(record, Operation::end(record.id))
            });
        if ended.is_err() {
            log::trace!("Actor ended with the execution. id={}", record.id);
            record.lock().terminate_waiters.clear();
        }
    }

    fn report_bug(&self, error: ActorError) {
        let mut slot = self.0.error.lock();
        if slot.is_none() {
            log::warn!("Bug found. error={}", error);
            *slot = Some(error);
        }
    }

    /// Joins every actor thread. Returns the first panic payload if a thread died from an
    /// engine fault.
    pub(crate) fn join_actors(&self) -> Option<Box<dyn Any + Send>> {
        let mut first_panic = None;
        loop {
            let handle = self.0.handles.lock().pop();
            match handle {
                Some(handle) => {
                    if let Err(payload) = handle.join() {
                        if first_panic.is_none() {
                            first_panic = Some(payload);
                        }
                    }
                }
                None => return first_panic,
            }
        }
    }

    pub(crate) fn error(&self) -> Option<ActorError> {
        self.0.error.lock().clone()
    }

    pub(crate) fn was_sleep_set_blocked(&self) -> bool {
        self.0.sleep_set_blocked.load(Ordering::SeqCst)
    }

    pub(crate) fn hit_step_limit(&self) -> bool {
        self.0.hit_step_limit.load(Ordering::SeqCst)
    }

    pub(crate) fn deadlocked(&self) -> Vec<ActorId> {
        self.0.deadlocked.lock().clone()
    }

    pub(crate) fn trace(&self) -> Vec<ActorId> {
        self.0.table.lock().trace.clone()
    }

    pub(crate) fn max_enabled(&self) -> usize {
        self.0.table.lock().max_enabled
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
