//! Private module for selective re-export.

use crate::actor::{ActorId, ActorList, ActorSnapshot};
use crate::por::{Selection, TidEntryList};

/// The schedule stack: one [`TidEntryList`] per step of the current schedule. Frames are
/// numbered from `1`. The frames below `next_pos` have been pushed during the current run, and
/// any frames above it are a recorded prefix that the run must replay exactly.
#[derive(Clone, Debug, Default)]
pub struct Stack {
    frames: Vec<TidEntryList>,
    next_pos: usize,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a frame for the actors at the current step. Returns `true` if the frame is new, or
    /// `false` if a recorded frame was replayed (in which case the recorded frame must be
    /// identical).
    pub fn push(&mut self, actors: &[ActorSnapshot]) -> bool {
        if self.next_pos > self.frames.len() {
            crate::engine_fault(format!(
                "Unexpected stack state. next_pos={}, len={}",
                self.next_pos,
                self.frames.len()
            ));
        }
        let added = self.next_pos == self.frames.len();
        if added {
            self.frames.push(TidEntryList::new(actors));
        } else if !self.frames[self.next_pos].matches(actors) {
            let expected: Vec<_> = self.frames[self.next_pos]
                .entries
                .iter()
                .map(|e| e.snapshot)
                .collect();
            crate::engine_fault(format!(
                r#"
Unable to replay a recorded schedule prefix. The actors at step {} differ from the actors that
were recorded at the same step of an earlier schedule.

The most obvious cause would be a program that operates directly upon untracked external state
such as the file system, the wall clock, a source of randomness, or memory that is shared between
actors without going through a mailbox. Iterating over a `HashMap` is a common inadvertent source
of nondeterminism.

Recorded:
{}
Observed:
{}"#,
                self.next_pos + 1,
                ActorList::new(&expected, None),
                ActorList::new(actors, None),
            ));
        }
        self.next_pos += 1;
        added
    }

    /// Steps pushed during the current run.
    pub fn num_steps(&self) -> usize {
        self.next_pos
    }

    /// Recorded frames, including a prefix still to be replayed.
    pub fn internal_len(&self) -> usize {
        self.frames.len()
    }

    /// The frame for a 1-based step.
    pub fn frame(&self, step: usize) -> &TidEntryList {
        &self.frames[step - 1]
    }

    pub fn frame_mut(&mut self, step: usize) -> &mut TidEntryList {
        &mut self.frames[step - 1]
    }

    pub fn top(&self) -> &TidEntryList {
        &self.frames[self.next_pos - 1]
    }

    pub fn top_mut(&mut self) -> &mut TidEntryList {
        &mut self.frames[self.next_pos - 1]
    }

    pub fn second_from_top(&self) -> &TidEntryList {
        &self.frames[self.next_pos - 2]
    }

    /// The top frame, which must also be the last recorded frame.
    pub fn real_top(&self) -> &TidEntryList {
        self.ensure_aligned();
        self.top()
    }

    /// Chooses the entry to run at the top frame: the recorded selection while replaying a
    /// prefix, otherwise the first backtrack point that is not asleep (scanning from `start`).
    /// The chosen entry is marked selected.
    pub fn select(&mut self, start: ActorId) -> Selection {
        let at_frontier = self.next_pos == self.frames.len();
        let top = self.top_mut();
        if !at_frontier {
            return Selection::Index(top.selected_index());
        }
        if let Some(i) = top.try_selected() {
            return Selection::Index(i);
        }
        match top.first_backtrack_not_slept(usize::from(start) % top.len().max(1)) {
            Some(i) => {
                top.entries[i].selected = true;
                Selection::Index(i)
            }
            None => top.blocked(),
        }
    }

    /// Moves to the next unexplored branch after a full run: puts the last explored choice to
    /// sleep and pops exhausted frames. Returns `false` once every branch has been explored.
    pub fn prepare_for_next_schedule(&mut self) -> bool {
        if self.frames.is_empty() {
            self.next_pos = 0;
            return false;
        }
        // Deadlock or sleep-set-blocked frames have no selection.
        if self.real_top().try_selected().is_none() {
            self.pop();
        }
        while !self.frames.is_empty() {
            let top = self.real_top_mut();
            top.set_selected_to_sleep();
            top.clear_selected();
            if !top.all_done_or_slept() {
                break;
            }
            self.pop();
        }
        self.next_pos = 0;
        !self.frames.is_empty()
    }

    /// Keeps the first `len` frames, with their selections, as a prefix to replay.
    pub fn truncate(&mut self, len: usize) {
        self.frames.truncate(len);
        self.next_pos = 0;
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.next_pos = 0;
    }

    fn real_top_mut(&mut self) -> &mut TidEntryList {
        self.ensure_aligned();
        self.top_mut()
    }

    fn pop(&mut self) {
        self.ensure_aligned();
        self.frames.pop();
        self.next_pos -= 1;
    }

    fn ensure_aligned(&self) {
        if self.next_pos != self.frames.len() {
            crate::engine_fault(format!(
                "Top of stack is not aligned. next_pos={}, len={}",
                self.next_pos,
                self.frames.len()
            ));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actor::Operation;

    fn actors(enabled: &[bool]) -> Vec<ActorSnapshot> {
        enabled
            .iter()
            .enumerate()
            .map(|(i, &enabled)| ActorSnapshot {
                id: i.into(),
                enabled,
                op: Operation::send(9.into()),
                send_step_index: None,
            })
            .collect()
    }

    #[test]
    fn can_push_and_replay() {
        let mut stack = Stack::new();
        assert!(stack.push(&actors(&[true, true])));
        stack.top_mut().set_all_enabled_to_be_backtracked();
        assert_eq!(stack.select(0.into()), Selection::Index(0));
        assert!(stack.push(&actors(&[true, false])));
        stack.top_mut().set_all_enabled_to_be_backtracked();
        assert_eq!(stack.select(1.into()), Selection::Index(0));
        assert_eq!(stack.num_steps(), 2);

        // The first frame still has an unexplored alternative.
        assert!(stack.prepare_for_next_schedule());
        assert_eq!(stack.internal_len(), 1);
        assert_eq!(stack.num_steps(), 0);
        assert!(!stack.push(&actors(&[true, true])));
        assert_eq!(stack.select(0.into()), Selection::Index(1));
        assert!(stack.frame(1).entries[0].sleep);
    }

    #[test]
    fn replays_recorded_selection() {
        let mut stack = Stack::new();
        stack.push(&actors(&[true, true]));
        stack.top_mut().set_all_enabled_to_be_backtracked();
        stack.select(1.into());
        stack.push(&actors(&[true, true]));
        stack.top_mut().set_all_enabled_to_be_backtracked();
        stack.select(1.into());
        stack.truncate(1);

        assert!(!stack.push(&actors(&[true, true])));
        assert_eq!(stack.select(0.into()), Selection::Index(1));
        assert!(stack.push(&actors(&[true, true])));
    }

    #[test]
    fn exhausts() {
        let mut stack = Stack::new();
        stack.push(&actors(&[true]));
        stack.top_mut().set_all_enabled_to_be_backtracked();
        assert_eq!(stack.select(0.into()), Selection::Index(0));
        stack.push(&actors(&[false]));
        assert_eq!(stack.select(0.into()), Selection::Deadlock);
        assert!(!stack.prepare_for_next_schedule());
        assert_eq!(stack.internal_len(), 0);
    }

    #[test]
    #[should_panic(expected = "Unable to replay a recorded schedule prefix.")]
    fn detects_nondeterminism() {
        let mut stack = Stack::new();
        stack.push(&actors(&[true, true]));
        stack.top_mut().set_all_enabled_to_be_backtracked();
        stack.select(0.into());
        stack.truncate(1);
        stack.push(&actors(&[true, false]));
    }
}
