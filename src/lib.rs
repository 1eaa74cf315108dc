//! A library for systematically testing actor programs for concurrency bugs.
//!
//! Actors communicate only through FIFO [`Mailbox`]es. Under test, every actor runs on its own
//! OS thread, but the [`TestingActorRuntime`] lets exactly one of them execute at a time and
//! consults a [`Scheduler`] at every send, receive, create, and join. Running the same test
//! action under many schedules exposes message orderings that rarely occur in production.
//!
//! Several scheduling policies are available:
//!
//! - [`RandomScheduler`] samples schedules uniformly at random.
//! - [`PctScheduler`] samples schedules with a bias toward few priority inversions.
//! - [`DporStrategy`] enumerates schedules depth first, with dynamic partial-order reduction and
//!   sleep sets pruning schedules that only reorder independent operations. It can also sample
//!   randomly while reversing one detected race per execution.
//! - [`ReplayScheduler`] replays the [`ScheduleTrace`] of a bug.
//!
//! A small example follows.
//!
//! ```rust
//! use actorcheck::*;
//!
//! // Two actors race to send to the root actor, which expects a fixed order.
//! let mut launcher = TestLauncher::new(SchedulerConfig::default().dfs());
//! let report = launcher.explore(|runtime| {
//!     let inbox = runtime.create_mailbox::<&'static str>();
//!     for msg in ["ping", "pong"] {
//!         let inbox = inbox.clone();
//!         runtime.create(move |_: Mailbox<()>| inbox.send(msg))?;
//!     }
//!     let first = inbox.receive()?;
//!     let second = inbox.receive()?;
//!     if (first, second) != ("ping", "pong") {
//!         return Err(ActorError::fault(format!("out of order: {} {}", first, second)));
//!     }
//!     Ok(())
//! });
//! assert_eq!(
//!     report.first_bug().map(|bug| bug.error.as_str()),
//!     Some("out of order: pong ping"));
//! ```

use std::cell::Cell;

pub mod actor;
mod finish_when;
pub mod por;
pub mod report;
mod runtime;
pub mod scheduler;
#[cfg(test)]
pub mod test_util;
pub mod util;

pub use actor::{
    ActorError, ActorId, ActorSnapshot, ActorStatus, Mailbox, OpType, Operation, TargetKind,
};
pub use finish_when::FinishWhen;
pub use report::{BugReport, ReportData, Reporter, ScheduleTrace, WriteReporter};
pub use runtime::*;
pub use scheduler::{
    DporStrategy, NextActor, PctScheduler, RandomScheduler, ReplayScheduler, Scheduler,
    SchedulerConfig,
};

thread_local! {
    static ENGINE_FAULT: Cell<bool> = Cell::new(false);
}

/// Panics because the exploration engine reached an inconsistent state (for example a program
/// under test that behaves nondeterministically). Such failures abort exploration instead of
/// being reported as bugs in the program.
#[track_caller]
pub(crate) fn engine_fault(msg: impl Into<String>) -> ! {
    let msg = msg.into();
    ENGINE_FAULT.with(|flag| flag.set(true));
    log::error!("{}", msg);
    panic!("{}", msg)
}

/// Whether the panic being handled on this thread was raised by [`engine_fault`]. Clears the flag.
pub(crate) fn take_engine_fault() -> bool {
    ENGINE_FAULT.with(|flag| flag.replace(false))
}
