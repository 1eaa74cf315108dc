//! Private module for selective re-export.

use crate::actor::{ActorId, ActorList, ActorSnapshot};
use crate::scheduler::{NextActor, Scheduler};
use crate::ScheduleTrace;

/// Replays a recorded [`ScheduleTrace`] exactly once, for example to reproduce a bug that an
/// exploration found. Diverging from the trace indicates nondeterminism and panics.
pub struct ReplayScheduler {
    trace: ScheduleTrace,
    position: usize,
}

impl ReplayScheduler {
    pub fn new(trace: ScheduleTrace) -> Self {
        ReplayScheduler { trace, position: 0 }
    }
}

impl Scheduler for ReplayScheduler {
    fn get_next(&mut self, actors: &[ActorSnapshot], _current: ActorId) -> NextActor {
        let next = match self.trace.steps.get(self.position) {
            Some(&next) => next,
            None if actors.iter().any(|a| a.enabled) => return NextActor::HitStepLimit,
            None => return NextActor::Deadlock,
        };
        self.position += 1;
        match actors.get(usize::from(next)) {
            Some(actor) if actor.enabled => NextActor::Run(next),
            _ => crate::engine_fault(format!(
                "Unable to replay schedule trace. Actor {} is not enabled at step {}.\n{}",
                next,
                self.position,
                ActorList::new(actors, None)
            )),
        }
    }

    fn next_schedule(&mut self) -> bool {
        self.position = 0;
        false
    }

    fn num_steps(&self) -> usize {
        self.position
    }
}
