//! Private module for selective re-export.

use std::cmp::max;
use std::fmt::{self, Display, Formatter};

/// A [vector clock](https://en.wikipedia.org/wiki/Vector_clock) over the steps of one execution.
/// Component `t` holds the (1-based) index of the latest step of actor `t` that happens before
/// the step owning the clock, or `0` if there is none.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VectorClock(Vec<u32>);

impl VectorClock {
    /// Instantiates a vector clock with `len` zeroed components.
    pub fn zeroed(len: usize) -> Self {
        VectorClock(vec![0; len])
    }

    /// Reads a component. Missing components are implicitly zero.
    pub fn get(&self, index: usize) -> u32 {
        *self.0.get(index).unwrap_or(&0)
    }

    /// Overwrites a component, growing the clock if needed.
    pub fn set(&mut self, index: usize, value: u32) {
        if index >= self.0.len() {
            self.0.resize(1 + index, 0);
        }
        self.0[index] = value;
    }

    /// Merges another clock into this one by picking the maximum of each component.
    pub fn join(&mut self, other: &VectorClock) {
        if other.0.len() > self.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (mine, &theirs) in self.0.iter_mut().zip(&other.0) {
            *mine = max(*mine, theirs);
        }
    }

    /// Whether any step recorded in this clock happens before the step that owns `later`, i.e.
    /// some non-zero component of `self` is covered by the same component of `later`.
    pub fn any_happens_before(&self, later: &VectorClock) -> bool {
        self.0
            .iter()
            .enumerate()
            .any(|(i, &step)| step > 0 && step <= later.get(i))
    }
}

impl Display for VectorClock {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "<")?;
        for c in &self.0 {
            write!(f, "{}, ", c)?;
        }
        write!(f, "...>")?;
        Ok(())
    }
}

impl From<Vec<u32>> for VectorClock {
    fn from(v: Vec<u32>) -> Self {
        VectorClock(v)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn can_display() {
        assert_eq!(
            format!("{}", VectorClock::from(vec![1, 2, 3, 4])),
            "<1, 2, 3, 4, ...>"
        );
        assert_eq!(format!("{}", VectorClock::zeroed(1)), "<0, ...>");
    }

    #[test]
    fn can_set_and_get() {
        let mut clock = VectorClock::zeroed(2);
        clock.set(3, 7);
        assert_eq!(clock, VectorClock::from(vec![0, 0, 0, 7]));
        assert_eq!(clock.get(3), 7);
        assert_eq!(clock.get(1), 0);
        assert_eq!(clock.get(10), 0);
    }

    #[test]
    fn can_join() {
        let mut clock = VectorClock::from(vec![1, 0, 2]);
        clock.join(&VectorClock::from(vec![3, 1, 0, 4]));
        assert_eq!(clock, VectorClock::from(vec![3, 1, 2, 4]));

        let mut clock = VectorClock::from(vec![5, 0, 2]);
        clock.join(&VectorClock::from(vec![3]));
        assert_eq!(clock, VectorClock::from(vec![5, 0, 2]));
    }

    #[test]
    fn can_detect_predecessors() {
        let later = VectorClock::from(vec![4, 0, 6]);
        assert!(VectorClock::from(vec![0, 0, 5]).any_happens_before(&later));
        assert!(!VectorClock::from(vec![5, 0, 7]).any_happens_before(&later));
        // Zero components never count.
        assert!(!VectorClock::from(vec![0, 0, 0]).any_happens_before(&later));
        assert!(!VectorClock::from(vec![0, 2]).any_happens_before(&later));
    }
}
