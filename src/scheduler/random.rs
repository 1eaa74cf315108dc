//! Private module for selective re-export.

use crate::actor::{ActorId, ActorSnapshot, OpType};
use crate::scheduler::{enabled_preferring, NextActor, Scheduler, SchedulerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks uniformly among the enabled actors. Actors about to send or yield are only picked when
/// nothing else is enabled, so that executions make progress before spinning on sends.
pub struct RandomScheduler {
    rng: StdRng,
    step_limit: Option<usize>,
    num_steps: usize,
}

impl RandomScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        RandomScheduler {
            rng: StdRng::seed_from_u64(config.seed),
            step_limit: config.step_limit,
            num_steps: 0,
        }
    }
}

impl Scheduler for RandomScheduler {
    fn get_next(&mut self, actors: &[ActorSnapshot], _current: ActorId) -> NextActor {
        self.num_steps += 1;
        if matches!(self.step_limit, Some(limit) if self.num_steps > limit) {
            return NextActor::HitStepLimit;
        }
        let choices = enabled_preferring(actors.iter(), |a| {
            !matches!(a.op.op_type, OpType::Send | OpType::Yield)
        });
        if choices.is_empty() {
            return NextActor::Deadlock;
        }
        let index = self.rng.gen_range(0..choices.len());
        NextActor::Run(choices[index].id)
    }

    fn next_schedule(&mut self) -> bool {
        self.num_steps = 0;
        true
    }

    fn num_steps(&self) -> usize {
        self.num_steps
    }
}
