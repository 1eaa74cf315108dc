//! Private module for selective re-export.

use crate::actor::{ActorId, OpType};
use crate::por::{Stack, TidEntry};
use crate::util::VectorClock;
use nohash_hasher::IntSet;
use rand::seq::SliceRandom;
use rand::Rng;

/// A pair of dependent, reversible steps `a < b` of one schedule that are not ordered by
/// happens-before.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Race {
    pub a: usize,
    pub b: usize,
}

/// Dynamic partial-order reduction over a completed schedule. [`DporAlgorithm::analyze`] walks
/// the stack computing a vector clock per step and, for every race it finds, either adds a
/// backtrack point to the stack or records the race for randomized reversal.
#[derive(Clone, Debug, Default)]
pub struct DporAlgorithm {
    num_threads: usize,
    /// One clock per step. Step `i` owns `clocks[i - 1]`.
    clocks: Vec<VectorClock>,
    thread_to_last_op: Vec<usize>,
    target_to_last_create_start_end: Vec<usize>,
    target_to_last_send: Vec<usize>,
    races: Vec<Race>,
}

impl DporAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyzes the steps pushed during the last run. With `record_races` the races are only
    /// recorded (see [`DporAlgorithm::races`]), otherwise each race adds a backtrack point.
    pub fn analyze(&mut self, stack: &mut Stack, record_races: bool) {
        let num_steps = stack.num_steps();
        self.reset(stack, num_steps);

        for i in 1..=num_steps {
            let step = match stack.frame(i).try_selected() {
                Some(index) => stack.frame(i).entries[index],
                None => continue,
            };
            let tid = usize::from(step.id());
            let last = self.thread_to_last_op[tid];
            if last > 0 {
                self.copy_clock(last, i);
            }
            self.set_clock(i, tid, i);
            self.thread_to_last_op[tid] = i;

            let target = match step.op_type() {
                // The target of a create is the child, which only exists in the next frame.
                OpType::Create if i < num_steps => Some(stack.frame(i).len()),
                OpType::Create => None,
                _ => step.op().target.map(usize::from),
            };
            let partner = match (step.op_type(), target) {
                (OpType::Start | OpType::End | OpType::Create | OpType::Join, Some(target)) => {
                    Some(std::mem::replace(
                        slot(&mut self.target_to_last_create_start_end, target),
                        i,
                    ))
                }
                (OpType::Send, Some(target)) => Some(std::mem::replace(
                    slot(&mut self.target_to_last_send, target),
                    i,
                )),
                (OpType::Receive, _) => step.snapshot.send_step_index,
                (OpType::WaitForDeadlock, _) => {
                    for other in 0..self.num_threads {
                        let last = self.thread_to_last_op[other];
                        if other != tid && last > 0 {
                            self.join_clock(i, last);
                        }
                    }
                    None
                }
                (OpType::Invalid, _) => crate::engine_fault(format!(
                    "Invalid operation in a completed schedule. step={}, actor={}",
                    i,
                    step.id()
                )),
                _ => None,
            };
            let a = match partner {
                Some(a) if a > 0 => a,
                _ => continue,
            };
            if !self.happens_before(stack, a, i) && self.reversible(stack, a, i) {
                log::trace!("Race. a={}, b={}, clock={}", a, i, self.clocks[i - 1]);
                if record_races {
                    self.races.push(Race { a, b: i });
                } else {
                    self.add_backtrack(stack, a, i, &step);
                }
            }
            self.join_clock(i, a);
        }
    }

    /// Races recorded by the last [`DporAlgorithm::analyze`] call.
    pub fn races(&self) -> &[Race] {
        &self.races
    }

    /// Picks a recorded race uniformly at random.
    pub fn choose_race(&self, rng: &mut impl Rng) -> Option<Race> {
        self.races.choose(rng).copied()
    }

    /// The actors to run right after the prefix `1..race.a` so that `race.b` executes before
    /// `race.a`: every step between the two that does not happen after `race.a`, then `race.b`.
    ///
    /// Skipped steps that created actors shift the identifiers of later-created actors down.
    pub fn replay_suffix(&self, stack: &Stack, race: Race) -> Vec<ActorId> {
        let mut skipped_creates = Vec::new();
        let mut suffix = Vec::new();
        for k in (race.a + 1)..race.b {
            let step = stack.frame(k).selected();
            if self.happens_before(stack, race.a, k) {
                if step.op_type() == OpType::Create {
                    skipped_creates.push(stack.frame(k).len());
                }
                continue;
            }
            suffix.push(usize::from(step.id()));
        }
        suffix.push(usize::from(stack.frame(race.b).selected().id()));
        suffix
            .into_iter()
            .map(|tid| {
                let shift = skipped_creates.iter().filter(|&&c| c < tid).count();
                ActorId::from(tid - shift)
            })
            .collect()
    }

    /// The clock of a 1-based step.
    pub fn clock(&self, step: usize) -> &VectorClock {
        &self.clocks[step - 1]
    }

    /// `a` happens before `b` iff `a` is covered by `b`'s clock component for `a`'s actor.
    pub fn happens_before(&self, stack: &Stack, a: usize, b: usize) -> bool {
        let a_tid = usize::from(stack.frame(a).selected().id());
        a as u32 <= self.clock(b).get(a_tid)
    }

    fn reversible(&self, stack: &Stack, a: usize, b: usize) -> bool {
        stack.frame(a).selected().op_type() == OpType::Send
            && stack.frame(b).selected().op_type() == OpType::Send
    }

    /// Ensures that some actor that could have run in place of step `a` (at the frame where `a`
    /// was chosen) is explored.
    fn add_backtrack(&mut self, stack: &mut Stack, a: usize, b: usize, b_step: &TidEntry) {
        let a_tid = usize::from(stack.frame(a).selected().id());
        let b_tid = usize::from(b_step.id());
        let before_a = stack.frame(a);

        let mut candidates: IntSet<usize> = IntSet::default();
        if before_a.entries.get(b_tid).map_or(false, |e| e.enabled()) {
            candidates.insert(b_tid);
        }
        let mut looking_for: IntSet<usize> = before_a
            .entries
            .iter()
            .enumerate()
            .filter(|(t, e)| *t != a_tid && *t != b_tid && e.enabled())
            .map(|(t, _)| t)
            .collect();

        // The first step of each other actor after `a`, unless it happens after `a` or after
        // one of the steps already considered.
        let mut vc = VectorClock::zeroed(self.num_threads);
        vc.set(a_tid, a as u32);
        for k in (a + 1)..b {
            if looking_for.is_empty() {
                break;
            }
            let k_tid = usize::from(stack.frame(k).selected().id());
            if !looking_for.remove(&k_tid) {
                continue;
            }
            let does_ha_another = vc.any_happens_before(self.clock(k));
            vc.set(k_tid, k as u32);
            if !does_ha_another {
                candidates.insert(k_tid);
            }
        }

        if candidates.is_empty() {
            crate::engine_fault(format!(
                "There were no candidate backtrack points. a={}, b={}",
                a, b
            ));
        }

        let frame = stack.frame_mut(a);
        if candidates.iter().any(|&t| frame.entries[t].backtrack) {
            return;
        }
        let len = frame.len();
        let order: Vec<usize> = (0..len).map(|offset| (b_tid + offset) % len).collect();
        let chosen = order
            .iter()
            .find(|&&t| candidates.contains(&t) && frame.entries[t].sleep)
            .or_else(|| {
                order.iter().find(|&&t| {
                    candidates.contains(&t)
                        && frame.entries[t].enabled()
                        && frame.entries[t].op_type() != OpType::Yield
                })
            })
            .or_else(|| order.iter().find(|&&t| candidates.contains(&t)));
        match chosen {
            Some(&t) => {
                log::trace!("Backtrack point. step={}, actor={}", a, t);
                frame.entries[t].backtrack = true;
            }
            None => crate::engine_fault(format!(
                "Did not manage to add a backtrack point. a={}, b={}",
                a, b
            )),
        }
    }

    fn reset(&mut self, stack: &Stack, num_steps: usize) {
        self.num_threads = (1..=num_steps)
            .map(|i| stack.frame(i).len())
            .max()
            .unwrap_or(0);
        self.clocks = vec![VectorClock::zeroed(self.num_threads); num_steps];
        for table in [
            &mut self.thread_to_last_op,
            &mut self.target_to_last_create_start_end,
            &mut self.target_to_last_send,
        ] {
            table.clear();
            table.resize(self.num_threads, 0);
        }
        self.races.clear();
    }

    fn copy_clock(&mut self, from: usize, to: usize) {
        self.clocks[to - 1] = self.clocks[from - 1].clone();
    }

    fn set_clock(&mut self, step: usize, tid: usize, value: usize) {
        self.clocks[step - 1].set(tid, value as u32);
    }

    fn join_clock(&mut self, to: usize, from: usize) {
        let from = self.clocks[from - 1].clone();
        self.clocks[to - 1].join(&from);
    }
}

fn slot(table: &mut Vec<usize>, target: usize) -> &mut usize {
    if target >= table.len() {
        table.resize(target + 1, 0);
    }
    &mut table[target]
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actor::{ActorSnapshot, Operation};

    /// Pushes a frame and selects `selected`.
    fn step(stack: &mut Stack, actors: &[(bool, Operation)], selected: usize) {
        let snapshots: Vec<_> = actors
            .iter()
            .enumerate()
            .map(|(i, &(enabled, op))| ActorSnapshot {
                id: i.into(),
                enabled,
                op,
                send_step_index: None,
            })
            .collect();
        stack.push(&snapshots);
        stack.top_mut().entries[selected].selected = true;
    }

    /// Actor 0 is the receiver; actors 1 and 2 each send it one message.
    fn two_senders() -> Stack {
        let q = ActorId::from(0);
        let mut stack = Stack::new();
        let recv = (false, Operation::receive(q));
        step(
            &mut stack,
            &[recv, (true, Operation::send(q)), (true, Operation::send(q))],
            1,
        );
        step(
            &mut stack,
            &[recv, (true, Operation::end(1.into())), (true, Operation::send(q))],
            2,
        );
        stack
    }

    #[test]
    fn can_find_send_race() {
        let mut stack = two_senders();
        let mut dpor = DporAlgorithm::new();
        dpor.analyze(&mut stack, true);
        assert_eq!(dpor.races(), &[Race { a: 1, b: 2 }]);
        // The clock of the later send is joined with the earlier one after the race is found.
        assert_eq!(dpor.clock(2), &VectorClock::from(vec![0, 1, 2]));
    }

    #[test]
    fn adds_backtrack_for_racing_actor() {
        let mut stack = two_senders();
        let mut dpor = DporAlgorithm::new();
        dpor.analyze(&mut stack, false);
        assert!(stack.frame(1).entries[2].backtrack);
        assert!(!stack.frame(1).entries[0].backtrack);
    }

    #[test]
    fn program_order_is_not_a_race() {
        let q = ActorId::from(0);
        let mut stack = Stack::new();
        let recv = (false, Operation::receive(q));
        step(&mut stack, &[recv, (true, Operation::send(q))], 1);
        step(&mut stack, &[recv, (true, Operation::send(q))], 1);
        let mut dpor = DporAlgorithm::new();
        dpor.analyze(&mut stack, true);
        assert!(dpor.races().is_empty());
        assert!(dpor.happens_before(&stack, 1, 2));
    }

    #[test]
    fn can_compute_replay_suffix() {
        let q = ActorId::from(0);
        let mut stack = Stack::new();
        let recv = (false, Operation::receive(q));
        step(
            &mut stack,
            &[recv, (true, Operation::send(q)), (true, Operation::send(q))],
            1,
        );
        // Actor 1 creates actor 3 after its send, which happens after step 1.
        step(
            &mut stack,
            &[recv, (true, Operation::create()), (true, Operation::send(q))],
            1,
        );
        step(
            &mut stack,
            &[
                recv,
                (true, Operation::end(1.into())),
                (true, Operation::send(q)),
                (true, Operation::start(3.into())),
            ],
            2,
        );
        let mut dpor = DporAlgorithm::new();
        dpor.analyze(&mut stack, true);
        assert_eq!(dpor.races(), &[Race { a: 1, b: 3 }]);
        assert_eq!(
            dpor.replay_suffix(&stack, Race { a: 1, b: 3 }),
            vec![ActorId::from(2)]
        );
    }
}
