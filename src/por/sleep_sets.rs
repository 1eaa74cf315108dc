//! Private module for selective re-export.

use crate::por::Stack;

/// Carries the sleep set of the previous frame into the newly pushed top frame: an actor stays
/// asleep if it was asleep before and its operation is independent of the operation that was
/// just executed. Actors created by that operation start awake.
pub fn update_sleep_sets(stack: &mut Stack) {
    if stack.num_steps() <= 1 {
        return;
    }
    let prev = stack.second_from_top();
    let prev_selected = *prev.selected();
    let still_asleep: Vec<usize> = prev
        .entries
        .iter()
        .enumerate()
        .filter(|(i, entry)| {
            *i != usize::from(prev_selected.id())
                && entry.sleep
                && !entry.op().is_dependent(prev_selected.op())
        })
        .map(|(i, _)| i)
        .collect();
    let top = stack.top_mut();
    for i in still_asleep {
        if let Some(entry) = top.entries.get_mut(i) {
            entry.sleep = true;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::actor::{ActorSnapshot, Operation};

    fn actors(ops: &[Operation]) -> Vec<ActorSnapshot> {
        ops.iter()
            .enumerate()
            .map(|(i, &op)| ActorSnapshot {
                id: i.into(),
                enabled: true,
                op,
                send_step_index: None,
            })
            .collect()
    }

    #[test]
    fn keeps_independent_sleepers_asleep() {
        let ops = [
            Operation::send(5.into()),
            Operation::send(6.into()),
            Operation::send(5.into()),
        ];
        let mut stack = Stack::new();
        stack.push(&actors(&ops));
        stack.top_mut().entries[0].selected = true;
        stack.top_mut().entries[1].sleep = true;
        stack.top_mut().entries[2].sleep = true;
        stack.push(&actors(&ops));
        update_sleep_sets(&mut stack);

        let sleep: Vec<_> = stack.top().entries.iter().map(|e| e.sleep).collect();
        // Actor 2 sends to the same queue as the executed send, so it wakes up.
        assert_eq!(sleep, vec![false, true, false]);
    }

    #[test]
    fn ignores_first_frame() {
        let mut stack = Stack::new();
        stack.push(&actors(&[Operation::send(1.into())]));
        update_sleep_sets(&mut stack);
        assert!(!stack.top().entries[0].sleep);
    }
}
