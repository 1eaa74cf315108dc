//! Private module for selective re-export.

use crate::actor::{ActorError, ActorId, ActorSnapshot, Operation};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::{Arc, Weak};

/// Per-actor bookkeeping. The `state` lock guards every flag, and `wakeup` is the condition the
/// actor's thread parks on while it is not the active actor.
pub(crate) struct ActorRecord {
    pub(crate) id: ActorId,
    state: Mutex<ActorState>,
    wakeup: Condvar,
}

pub(crate) struct ActorState {
    pub(crate) name: Option<String>,
    pub(crate) enabled: bool,
    pub(crate) active: bool,
    pub(crate) terminated: bool,
    pub(crate) cancelled: bool,
    pub(crate) yielded: bool,
    pub(crate) waiting_for_deadlock: bool,
    pub(crate) op: Operation,
    pub(crate) send_step_index: Option<usize>,
    pub(crate) terminate_waiters: Vec<Weak<ActorRecord>>,
    pub(crate) faults: Vec<ActorError>,
}

impl ActorRecord {
    /// New records start enabled and active: the root actor is running, and a child's creator
    /// waits for the child thread to park before it continues.
    pub(crate) fn new(id: ActorId, name: Option<String>) -> Self {
        ActorRecord {
            id,
            state: Mutex::new(ActorState {
                name,
                enabled: true,
                active: true,
                terminated: false,
                cancelled: false,
                yielded: false,
                waiting_for_deadlock: false,
                op: Operation::start(id),
                send_step_index: None,
                terminate_waiters: Vec::new(),
                faults: Vec::new(),
            }),
            wakeup: Condvar::new(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ActorState> {
        self.state.lock()
    }

    pub(crate) fn snapshot(&self) -> ActorSnapshot {
        let state = self.state.lock();
        ActorSnapshot {
            id: self.id,
            enabled: state.enabled,
            op: state.op,
            send_step_index: state.send_step_index,
        }
    }

    /// Records the operation this actor is about to perform. Only a receive carries the index of
    /// the send that it will consume.
    pub(crate) fn stamp(&self, op: Operation) {
        let mut state = self.state.lock();
        state.op = op;
        if op.op_type != crate::OpType::Receive {
            state.send_step_index = None;
        }
    }

    /// Hands control to this actor.
    pub(crate) fn activate(&self) {
        let mut state = self.state.lock();
        if !state.enabled || state.active {
            crate::engine_fault(format!(
                "Scheduled actor is not ready to run. id={}, enabled={}, active={}",
                self.id, state.enabled, state.active
            ));
        }
        state.active = true;
        self.wakeup.notify_all();
    }

    /// Forces this actor awake once the execution has ended so that it can unwind.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        state.enabled = true;
        state.active = true;
        self.wakeup.notify_all();
    }

    /// Gives up control.
    pub(crate) fn deactivate(&self) {
        let mut state = self.state.lock();
        if !state.active {
            crate::engine_fault(format!(
                "Actor gave up control without holding it. id={}",
                self.id
            ));
        }
        state.active = false;
        self.wakeup.notify_all();
    }

    /// Parks the calling thread until this actor becomes active again. A terminated actor that
    /// just handed off its final operation returns immediately.
    pub(crate) fn wait_until_active(&self, final_op: bool) {
        let mut state = self.state.lock();
        if final_op && state.terminated {
            return;
        }
        while !state.active {
            self.wakeup.wait(&mut state);
        }
    }

    /// Parks the calling thread until the actor's own thread has stopped being active. Used by a
    /// creator to wait for its child to reach its start point.
    pub(crate) fn wait_until_parked(&self) {
        let mut state = self.state.lock();
        while state.active {
            self.wakeup.wait(&mut state);
        }
    }

    /// Marks the actor terminated and returns the actors that were waiting for that.
    pub(crate) fn finish(&self) -> Vec<Arc<ActorRecord>> {
        let mut state = self.state.lock();
        state.enabled = false;
        state.terminated = true;
        std::mem::take(&mut state.terminate_waiters)
            .into_iter()
            .filter_map(|w| w.upgrade())
            .collect()
    }

    pub(crate) fn status(&self) -> ActorStatus {
        let state = self.state.lock();
        ActorStatus {
            id: self.id,
            name: state.name.clone(),
            terminated: state.terminated,
            cancelled: state.cancelled,
            faults: state.faults.clone(),
            waiters: state.terminate_waiters.len(),
        }
    }
}

/// A summary of one actor after an execution.
#[derive(Clone, Debug, PartialEq)]
pub struct ActorStatus {
    pub id: ActorId,
    pub name: Option<String>,
    pub terminated: bool,
    pub cancelled: bool,
    pub faults: Vec<ActorError>,
    /// Actors still registered as waiting for this one to terminate.
    pub waiters: usize,
}
