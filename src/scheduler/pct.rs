//! Private module for selective re-export.

use crate::actor::{ActorId, ActorSnapshot, OpType};
use crate::scheduler::{NextActor, Scheduler, SchedulerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Probabilistic concurrency testing. Actors get a random priority order when they first appear,
/// and the highest-priority enabled actor always runs. At a few randomly chosen change points
/// (counted in sends, which are the steps that can race) the running actor drops to the lowest
/// priority, or the configured bad actor jumps to the highest.
pub struct PctScheduler {
    rng: StdRng,
    num_change_points: usize,
    change_points: Vec<usize>,
    /// Highest priority first.
    priorities: Vec<ActorId>,
    bad_actor: Option<ActorId>,
    step_limit: Option<usize>,
    num_steps: usize,
    num_sends: usize,
    max_sends: usize,
}

impl PctScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        PctScheduler {
            rng: StdRng::seed_from_u64(config.seed),
            num_change_points: config.change_points,
            change_points: Vec::new(),
            priorities: Vec::new(),
            bad_actor: config.bad_actor,
            step_limit: config.step_limit,
            num_steps: 0,
            num_sends: 0,
            max_sends: 0,
        }
    }

    /// Current priority order, highest first.
    pub fn priorities(&self) -> &[ActorId] {
        &self.priorities
    }

    /// Change points of the current execution, in sends.
    pub fn change_points(&self) -> &[usize] {
        &self.change_points
    }

    fn move_to(&mut self, id: ActorId, front: bool) {
        if let Some(pos) = self.priorities.iter().position(|&p| p == id) {
            self.priorities.remove(pos);
            if front {
                self.priorities.insert(0, id);
            } else {
                self.priorities.push(id);
            }
        }
    }
}

impl Scheduler for PctScheduler {
    fn get_next(&mut self, actors: &[ActorSnapshot], current: ActorId) -> NextActor {
        for actor in &actors[self.priorities.len().min(actors.len())..] {
            let pos = self.rng.gen_range(0..=self.priorities.len());
            self.priorities.insert(pos, actor.id);
        }

        self.num_steps += 1;
        if matches!(self.step_limit, Some(limit) if self.num_steps > limit) {
            return NextActor::HitStepLimit;
        }

        let current_op = actors.get(usize::from(current)).map(|a| a.op.op_type);
        if current_op == Some(OpType::Send) {
            self.num_sends += 1;
            if let Some(pos) = self.change_points.iter().position(|&c| c == self.num_sends) {
                self.change_points.remove(pos);
                match self.bad_actor {
                    Some(bad) if usize::from(bad) < actors.len() => {
                        log::trace!("Change point. boosted={}", bad);
                        self.move_to(bad, true);
                    }
                    _ => {
                        log::trace!("Change point. demoted={}", current);
                        self.move_to(current, false);
                    }
                }
            }
        }

        let enabled: Vec<&ActorSnapshot> = self
            .priorities
            .iter()
            .map(|&id| &actors[usize::from(id)])
            .filter(|a| a.enabled)
            .collect();
        let chosen = enabled
            .iter()
            .find(|a| a.op.op_type != OpType::Send)
            .or_else(|| enabled.first());
        match chosen {
            Some(actor) => NextActor::Run(actor.id),
            None => NextActor::Deadlock,
        }
    }

    fn next_schedule(&mut self) -> bool {
        self.priorities.clear();
        self.max_sends = self.max_sends.max(self.num_sends);
        self.num_sends = 0;
        self.num_steps = 0;
        self.change_points.clear();
        if self.max_sends > 0 {
            for _ in 0..self.num_change_points {
                let point = self.rng.gen_range(1..=self.max_sends);
                self.change_points.push(point);
            }
        }
        true
    }

    fn num_steps(&self) -> usize {
        self.num_steps
    }
}
