//! Private module for selective re-export.

use crate::actor::{ActorId, ActorSnapshot, OpType};
use crate::por::{update_sleep_sets, DporAlgorithm, Selection, Stack};
use crate::scheduler::{NextActor, Scheduler, SchedulerConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Systematic exploration over the schedule [`Stack`].
///
/// In the default mode this is a depth-first search that enumerates schedules until the stack
/// is exhausted. With DPOR only one actor is initially explored per frame and races add the
/// alternatives; without DPOR every enabled actor is explored. Sleep sets prune branches that
/// only reorder independent operations.
///
/// In randomized mode each execution is an independent random walk, except that with DPOR
/// enabled the next execution replays a prefix of the previous one and then reverses one of its
/// races, chosen uniformly at random.
pub struct DporStrategy {
    stack: Stack,
    dpor: Option<DporAlgorithm>,
    sleep_sets: bool,
    randomized: bool,
    rng: StdRng,
    step_limit: Option<usize>,
    replay_suffix: VecDeque<ActorId>,
}

impl DporStrategy {
    pub fn new(config: SchedulerConfig) -> Self {
        DporStrategy {
            stack: Stack::new(),
            dpor: config.dpor.then(DporAlgorithm::new),
            sleep_sets: config.sleep_sets,
            randomized: config.randomized,
            rng: StdRng::seed_from_u64(config.seed),
            step_limit: config.step_limit,
            replay_suffix: VecDeque::new(),
        }
    }

    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    /// Forgets all exploration state.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.replay_suffix.clear();
    }

    /// Marks the actor to run at a new frame in randomized mode: the next actor of a reversed
    /// race if there is one, otherwise a random enabled actor.
    fn choose_randomly(&mut self, current: ActorId) {
        let top = self.stack.top_mut();
        if let Some(next) = self.replay_suffix.pop_front() {
            match top.entries.get_mut(usize::from(next)) {
                Some(entry) if entry.enabled() => {
                    entry.backtrack = true;
                    return;
                }
                _ => {
                    log::debug!("Race reversal diverged. actor={}", next);
                    self.replay_suffix.clear();
                }
            }
        }
        let enabled: Vec<usize> = top
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled())
            .map(|(i, _)| i)
            .collect();
        let preferred: Vec<usize> = enabled
            .iter()
            .copied()
            .filter(|&i| top.entries[i].op_type() != OpType::Yield)
            .collect();
        let choices = if preferred.is_empty() { enabled } else { preferred };
        if choices.is_empty() {
            return;
        }
        let pick = choices[self.rng.gen_range(0..choices.len())];
        log::trace!("Random pick. actor={}, current={}", pick, current);
        top.entries[pick].backtrack = true;
    }
}

impl Scheduler for DporStrategy {
    fn get_next(&mut self, actors: &[ActorSnapshot], current: ActorId) -> NextActor {
        if matches!(self.step_limit, Some(limit) if self.stack.num_steps() >= limit) {
            return NextActor::HitStepLimit;
        }
        let added = self.stack.push(actors);
        if added {
            if self.randomized {
                self.choose_randomly(current);
            } else {
                if self.sleep_sets {
                    update_sleep_sets(&mut self.stack);
                }
                let top = self.stack.top_mut();
                if self.dpor.is_some() {
                    top.add_first_enabled_not_slept_to_backtrack(usize::from(current));
                } else {
                    top.set_all_enabled_to_be_backtracked();
                }
            }
        }
        match self.stack.select(current) {
            Selection::Index(i) => NextActor::Run(self.stack.top().entries[i].id()),
            Selection::SleepSetBlocked => NextActor::SleepSetBlocked,
            Selection::Deadlock => NextActor::Deadlock,
        }
    }

    fn next_schedule(&mut self) -> bool {
        if self.randomized {
            self.replay_suffix.clear();
            let race = match &mut self.dpor {
                Some(dpor) => {
                    dpor.analyze(&mut self.stack, true);
                    dpor.choose_race(&mut self.rng)
                        .map(|race| (race, dpor.replay_suffix(&self.stack, race)))
                }
                None => None,
            };
            match race {
                Some((race, suffix)) => {
                    log::debug!(
                        "Reversing race. a={}, b={}, suffix={:?}",
                        race.a,
                        race.b,
                        suffix
                    );
                    self.stack.truncate(race.a - 1);
                    self.replay_suffix = suffix.into();
                }
                None => self.stack.clear(),
            }
            return true;
        }
        if let Some(dpor) = &mut self.dpor {
            dpor.analyze(&mut self.stack, false);
        }
        self.stack.prepare_for_next_schedule()
    }

    fn num_steps(&self) -> usize {
        self.stack.num_steps()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actor::Operation;

    fn snapshot(id: usize, enabled: bool, op: Operation) -> ActorSnapshot {
        ActorSnapshot {
            id: id.into(),
            enabled,
            op,
            send_step_index: None,
        }
    }

    /// Two actors that each perform one independent step and then finish.
    fn run_independent(scheduler: &mut DporStrategy) -> Vec<ActorId> {
        let mut done = [false, false];
        let mut trace = Vec::new();
        loop {
            let actors: Vec<_> = (0..2)
                .map(|i| {
                    if done[i] {
                        snapshot(i, false, Operation::end(i.into()))
                    } else {
                        snapshot(i, true, Operation::send((10 + i).into()))
                    }
                })
                .collect();
            match scheduler.get_next(&actors, 0.into()) {
                NextActor::Run(id) => {
                    done[usize::from(id)] = true;
                    trace.push(id);
                }
                _ => return trace,
            }
        }
    }

    #[test]
    fn dfs_without_reduction_explores_every_order() {
        let mut scheduler = SchedulerConfig::default().dpor(false).sleep_sets(false).dfs();
        let mut traces = Vec::new();
        loop {
            traces.push(run_independent(&mut scheduler));
            if !scheduler.next_schedule() {
                break;
            }
        }
        assert_eq!(traces, vec![ActorId::vec_from([0, 1]), ActorId::vec_from([1, 0])]);
    }

    #[test]
    fn dpor_explores_independent_steps_once() {
        let mut scheduler = SchedulerConfig::default().dfs();
        assert_eq!(run_independent(&mut scheduler), ActorId::vec_from([0, 1]));
        assert!(!scheduler.next_schedule());
    }

    #[test]
    fn honors_step_limit() {
        let mut scheduler = SchedulerConfig::default().step_limit(Some(1)).dfs();
        let actors = vec![snapshot(0, true, Operation::send(1.into()))];
        assert_eq!(scheduler.get_next(&actors, 0.into()), NextActor::Run(0.into()));
        assert_eq!(scheduler.get_next(&actors, 0.into()), NextActor::HitStepLimit);
        assert!(!scheduler.next_schedule());
    }

    #[test]
    fn randomized_without_dpor_samples_fresh_schedules() {
        let mut scheduler = SchedulerConfig::default()
            .dpor(false)
            .randomized(true)
            .seed(1)
            .dfs();
        for _ in 0..10 {
            let trace = run_independent(&mut scheduler);
            assert_eq!(trace.len(), 2);
            assert!(scheduler.next_schedule());
            assert_eq!(scheduler.stack().internal_len(), 0);
        }
    }
}
