//! Pluggable scheduling policies. A [`Scheduler`] is consulted at every scheduling point and
//! chooses which actor runs next; between executions it is asked to prepare the next schedule.
//!
//! Policies are built from a [`SchedulerConfig`]:
//!
//! ```
//! use actorcheck::SchedulerConfig;
//! let random = SchedulerConfig::default().seed(7).step_limit(Some(500)).random();
//! let pct = SchedulerConfig::default().seed(7).change_points(3).pct();
//! let dfs = SchedulerConfig::default().dpor(true).sleep_sets(true).dfs();
//! ```

mod dpor_strategy;
mod pct;
mod random;
mod replay;

use crate::actor::{ActorId, ActorSnapshot};

pub use dpor_strategy::*;
pub use pct::*;
pub use random::*;
pub use replay::*;

/// What a [`Scheduler`] decided at one scheduling point.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NextActor {
    /// Run this actor, which must be enabled.
    Run(ActorId),
    /// No actor is enabled.
    Deadlock,
    /// Every enabled actor is asleep, so the rest of this schedule is redundant.
    SleepSetBlocked,
    /// The configured step budget is exhausted.
    HitStepLimit,
}

/// A scheduling policy.
///
/// `actors` holds one snapshot per actor created so far in the current execution, indexed by
/// [`ActorId`]. `current` is the actor that reached the scheduling point.
pub trait Scheduler: Send {
    fn get_next(&mut self, actors: &[ActorSnapshot], current: ActorId) -> NextActor;

    /// Prepares the next execution. Returns `false` once there is nothing left to explore.
    fn next_schedule(&mut self) -> bool;

    /// Scheduling steps taken during the current execution.
    fn num_steps(&self) -> usize;
}

impl<S: Scheduler + ?Sized> Scheduler for Box<S> {
    fn get_next(&mut self, actors: &[ActorSnapshot], current: ActorId) -> NextActor {
        (**self).get_next(actors, current)
    }

    fn next_schedule(&mut self) -> bool {
        (**self).next_schedule()
    }

    fn num_steps(&self) -> usize {
        (**self).num_steps()
    }
}

/// Configuration shared by the scheduling policies.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchedulerConfig {
    pub(crate) seed: u64,
    pub(crate) step_limit: Option<usize>,
    pub(crate) dpor: bool,
    pub(crate) sleep_sets: bool,
    pub(crate) randomized: bool,
    pub(crate) change_points: usize,
    pub(crate) bad_actor: Option<ActorId>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            seed: 0,
            step_limit: Some(10_000),
            dpor: true,
            sleep_sets: true,
            randomized: false,
            change_points: 2,
            bad_actor: None,
        }
    }
}

impl SchedulerConfig {
    /// Seed for the randomized policies.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Ends an execution (without reporting a bug) once it takes this many steps.
    pub fn step_limit(mut self, step_limit: Option<usize>) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Enables dynamic partial-order reduction for [`SchedulerConfig::dfs`].
    pub fn dpor(mut self, dpor: bool) -> Self {
        self.dpor = dpor;
        self
    }

    /// Enables sleep sets for [`SchedulerConfig::dfs`].
    pub fn sleep_sets(mut self, sleep_sets: bool) -> Self {
        self.sleep_sets = sleep_sets;
        self
    }

    /// Makes [`SchedulerConfig::dfs`] sample schedules randomly instead of exhaustively. Combined
    /// with DPOR, each execution reverses one race of the previous execution.
    pub fn randomized(mut self, randomized: bool) -> Self {
        self.randomized = randomized;
        self
    }

    /// Number of priority change points for [`SchedulerConfig::pct`].
    pub fn change_points(mut self, change_points: usize) -> Self {
        self.change_points = change_points;
        self
    }

    /// An actor that [`SchedulerConfig::pct`] boosts to the highest priority at change points.
    pub fn bad_actor(mut self, bad_actor: Option<ActorId>) -> Self {
        self.bad_actor = bad_actor;
        self
    }

    pub fn random(self) -> RandomScheduler {
        RandomScheduler::new(self)
    }

    pub fn pct(self) -> PctScheduler {
        PctScheduler::new(self)
    }

    pub fn dfs(self) -> DporStrategy {
        DporStrategy::new(self)
    }

    pub fn replay(self, trace: crate::ScheduleTrace) -> ReplayScheduler {
        ReplayScheduler::new(trace)
    }
}

/// Enabled actors, optionally restricted to those whose operation satisfies `preferred` when
/// any do.
pub(crate) fn enabled_preferring<'a>(
    actors: impl Iterator<Item = &'a ActorSnapshot> + Clone,
    preferred: impl Fn(&ActorSnapshot) -> bool,
) -> Vec<&'a ActorSnapshot> {
    let enabled = actors.filter(|a| a.enabled);
    let choices: Vec<_> = enabled.clone().filter(|a| preferred(a)).collect();
    if choices.is_empty() {
        enabled.collect()
    } else {
        choices
    }
}
