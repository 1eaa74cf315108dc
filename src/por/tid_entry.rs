//! Private module for selective re-export.

use crate::actor::{ActorId, ActorSnapshot, OpType, Operation};
use std::fmt::{self, Display, Formatter};

/// One actor's slot in a scheduling frame, plus the exploration flags for that slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TidEntry {
    pub snapshot: ActorSnapshot,
    /// Chosen at this frame in the current schedule.
    pub selected: bool,
    /// In the sleep set (or already explored) at this frame.
    pub sleep: bool,
    /// Must be explored from this frame.
    pub backtrack: bool,
}

impl TidEntry {
    pub fn new(snapshot: ActorSnapshot) -> Self {
        TidEntry {
            snapshot,
            selected: false,
            sleep: false,
            backtrack: false,
        }
    }

    pub fn id(&self) -> ActorId {
        self.snapshot.id
    }

    pub fn enabled(&self) -> bool {
        self.snapshot.enabled
    }

    pub fn op(&self) -> &Operation {
        &self.snapshot.op
    }

    pub fn op_type(&self) -> OpType {
        self.snapshot.op.op_type
    }
}

/// The result of choosing an entry from the top frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Selection {
    Index(usize),
    /// Every remaining enabled entry is asleep, so this branch is redundant.
    SleepSetBlocked,
    /// Nothing is enabled.
    Deadlock,
}

/// A scheduling frame: every actor that exists at one step, indexed by actor id.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TidEntryList {
    pub entries: Vec<TidEntry>,
}

impl TidEntryList {
    pub fn new(actors: &[ActorSnapshot]) -> Self {
        TidEntryList {
            entries: actors.iter().copied().map(TidEntry::new).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ActorId) -> Option<&TidEntry> {
        self.entries.get(usize::from(id))
    }

    /// Whether the recorded snapshots are identical to `actors`, ignoring exploration flags.
    pub fn matches(&self, actors: &[ActorSnapshot]) -> bool {
        self.entries.len() == actors.len()
            && self
                .entries
                .iter()
                .zip(actors)
                .all(|(entry, actor)| &entry.snapshot == actor)
    }

    pub fn set_all_enabled_to_be_backtracked(&mut self) {
        for entry in self.entries.iter_mut().filter(|e| e.enabled()) {
            entry.backtrack = true;
        }
    }

    /// Marks the first enabled entry that is not asleep, scanning cyclically from `start`.
    pub fn add_first_enabled_not_slept_to_backtrack(&mut self, start: usize) {
        if let Some(i) = self.cyclic_position(start, |e| e.enabled() && !e.sleep) {
            self.entries[i].backtrack = true;
        }
    }

    /// Finds the first entry marked for backtracking that is not asleep, scanning cyclically
    /// from `start`.
    pub fn first_backtrack_not_slept(&self, start: usize) -> Option<usize> {
        self.cyclic_position(start, |e| e.backtrack && !e.sleep)
    }

    /// Every backtrack point of this frame has been explored or put to sleep.
    pub fn all_done_or_slept(&self) -> bool {
        self.first_backtrack_not_slept(0).is_none()
    }

    /// Panics if more than one entry is selected.
    pub fn try_selected(&self) -> Option<usize> {
        let mut selected = self.entries.iter().enumerate().filter(|(_, e)| e.selected);
        let first = selected.next().map(|(i, _)| i);
        if selected.next().is_some() {
            crate::engine_fault("More than one selected entry in a frame.");
        }
        first
    }

    /// Panics unless exactly one entry is selected.
    pub fn selected_index(&self) -> usize {
        match self.try_selected() {
            Some(i) => i,
            None => crate::engine_fault("No selected entry in a frame."),
        }
    }

    pub fn selected(&self) -> &TidEntry {
        &self.entries[self.selected_index()]
    }

    pub fn set_selected_to_sleep(&mut self) {
        let i = self.selected_index();
        self.entries[i].sleep = true;
    }

    pub fn clear_selected(&mut self) {
        let i = self.selected_index();
        self.entries[i].selected = false;
    }

    /// The outcome when no entry can be chosen.
    pub fn blocked(&self) -> Selection {
        if self.entries.iter().any(|e| e.enabled() && e.sleep) {
            Selection::SleepSetBlocked
        } else {
            Selection::Deadlock
        }
    }

    fn cyclic_position(&self, start: usize, pred: impl Fn(&TidEntry) -> bool) -> Option<usize> {
        let len = self.entries.len();
        (0..len).map(|offset| (start + offset) % len).find(|&i| pred(&self.entries[i]))
    }
}

impl Display for TidEntryList {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for entry in self.entries.iter().filter(|e| e.enabled()) {
            if entry.selected {
                write!(f, "*")?;
            }
            write!(f, "{} ", entry.snapshot)?;
        }
        write!(f, "]")
    }
}
